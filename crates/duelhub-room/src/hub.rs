//! The matchmaking registry: every live room, which room each user is in,
//! and at most one waiting client per [`WaitingKey`].
//!
//! All three maps sit behind one async lock. Room member sets have their
//! own lock, always taken *after* the hub's. Channel sends to rooms happen
//! only once the hub lock is released, and always with a deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use duelhub_protocol::{RoomId, ServerMessage, UserId, WaitingKey};
use tokio::sync::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::room::{self, Departure};
use crate::store::Stores;
use crate::{ClientHandle, HubConfig, RoomConfig, RoomError, RoomHandle};

/// Process-wide matchmaking hub. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    room_config: RoomConfig,
    stores: Stores,
    registry: Mutex<Registry>,
    next_room_id: AtomicU64,
}

#[derive(Default)]
struct Registry {
    rooms: HashMap<RoomId, RoomHandle>,
    /// A user is a member of at most one room.
    user_rooms: HashMap<UserId, RoomId>,
    waiting: HashMap<WaitingKey, ClientHandle>,
}

impl Registry {
    /// Forgets a room and everything pointing at it, then tells its loop
    /// to stop. Returns whether the room was registered.
    fn drop_room(&mut self, room_id: RoomId) -> bool {
        let Some(room) = self.rooms.remove(&room_id) else {
            return false;
        };
        self.user_rooms.retain(|_, id| *id != room_id);
        self.waiting.retain(|_, waiter| !room.holds(waiter));
        room.shutdown();
        true
    }

    /// Clears any registration left by an earlier connection of the same
    /// user, so one user is never matchmade twice at once. Returns that
    /// earlier connection, which the caller must close.
    fn purge_user(&mut self, client: &ClientHandle) -> Option<ClientHandle> {
        let user_id = client.user_id();
        let mut stale = None;
        self.waiting.retain(|_, waiter| {
            if waiter.user_id() != user_id {
                return true;
            }
            stale = Some(waiter.clone());
            false
        });

        let Some(room_id) = self.user_rooms.remove(&user_id) else {
            return stale;
        };
        let Some(room) = self.rooms.get(&room_id) else {
            return stale;
        };
        let Some(member) = room.member(user_id) else {
            return stale;
        };
        tracing::info!(
            %room_id,
            %user_id,
            stale_client = %member.id(),
            "replacing earlier connection"
        );
        let departure = Departure {
            client: member.id(),
            user_id,
        };
        if let Err(TrySendError::Closed(_)) = room.notify_departure(departure) {
            self.drop_room(room_id);
        }
        Some(member)
    }

    /// Tries to seat `client` opposite the waiter for its key.
    fn pair_with_waiter(&mut self, client: &ClientHandle) -> Option<RoomHandle> {
        let key = client.key().clone();
        let waiter = self.waiting.get(&key)?.clone();
        if waiter.id() == client.id() {
            return None;
        }

        if !waiter.probe() {
            tracing::warn!(
                user_id = %waiter.user_id(),
                %key,
                "waiting client unresponsive, discarding"
            );
            self.waiting.remove(&key);
            if let Some(room_id) = self.user_rooms.get(&waiter.user_id()).copied() {
                self.drop_room(room_id);
            }
            return None;
        }

        let room = self
            .user_rooms
            .get(&waiter.user_id())
            .and_then(|id| self.rooms.get(id))
            .cloned();
        let paired = room.filter(|room| room.try_pair(&waiter, client));
        self.waiting.remove(&key);

        let Some(room) = paired else {
            tracing::debug!(user_id = %waiter.user_id(), %key, "stale waiting entry cleared");
            return None;
        };
        self.user_rooms.insert(client.user_id(), room.id());
        tracing::info!(
            room_id = %room.id(),
            waiter = %waiter.user_id(),
            joiner = %client.user_id(),
            %key,
            "paired"
        );
        Some(room)
    }
}

impl Hub {
    pub fn new(config: HubConfig, room_config: RoomConfig, stores: Stores) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                room_config,
                stores,
                registry: Mutex::new(Registry::default()),
                next_room_id: AtomicU64::new(1),
            }),
        }
    }

    /// Puts `client` into a room: opposite a live waiter with the same key
    /// if there is one, otherwise into a fresh room where it becomes the
    /// waiter.
    ///
    /// Fails only when the chosen room does not accept the registration
    /// within the register deadline. The caller should then close the
    /// connection.
    pub async fn assign_client(&self, client: ClientHandle) -> Result<RoomId, RoomError> {
        let (room, stale) = {
            let mut registry = self.inner.registry.lock().await;
            let stale = registry.purge_user(&client);
            let room = match registry.pair_with_waiter(&client) {
                Some(room) => room,
                None => self.open_room(&mut registry, &client),
            };
            (room, stale)
        };
        if let Some(stale) = stale.filter(|s| s.id() != client.id()) {
            self.retire(stale);
        }

        if let Err(err) = room.register(client.clone(), self.inner.config.register_deadline).await {
            tracing::warn!(
                room_id = %room.id(),
                user_id = %client.user_id(),
                error = %err,
                "registration failed, abandoning room"
            );
            self.remove_room(room.id()).await;
            return Err(err);
        }
        Ok(room.id())
    }

    /// Sends a replaced connection its terminal notice so its socket closes.
    fn retire(&self, stale: ClientHandle) {
        let send_deadline = self.inner.room_config.send_deadline;
        let ack_wait = self.inner.room_config.terminal_ack_wait;
        tokio::spawn(async move {
            let notice = ServerMessage::error("replaced by a newer connection");
            if !stale.deliver_final(notice, send_deadline, ack_wait).await {
                tracing::debug!(
                    user_id = %stale.user_id(),
                    client_id = %stale.id(),
                    "replaced connection already gone"
                );
            }
        });
    }

    fn open_room(&self, registry: &mut Registry, client: &ClientHandle) -> RoomHandle {
        let room_id = RoomId(self.inner.next_room_id.fetch_add(1, Ordering::Relaxed));
        let room = room::spawn(
            room_id,
            client,
            self.clone(),
            self.inner.room_config.clone(),
            self.inner.stores.clone(),
            self.inner.config.room_channel_capacity,
        );
        registry.rooms.insert(room_id, room.clone());
        registry.user_rooms.insert(client.user_id(), room_id);
        registry.waiting.insert(client.key().clone(), client.clone());
        tracing::info!(
            %room_id,
            user_id = %client.user_id(),
            key = %client.key(),
            "room created, client waiting"
        );
        room
    }

    /// Called once when a connection closes. Never blocks on the room.
    pub async fn on_disconnect(&self, client: &ClientHandle) {
        let room = {
            let mut registry = self.inner.registry.lock().await;
            if registry
                .waiting
                .get(client.key())
                .is_some_and(|w| w.id() == client.id())
            {
                registry.waiting.remove(client.key());
            }
            registry
                .user_rooms
                .get(&client.user_id())
                .and_then(|id| registry.rooms.get(id))
                .cloned()
        };
        let Some(room) = room else {
            return;
        };

        let departure = Departure {
            client: client.id(),
            user_id: client.user_id(),
        };
        match room.notify_departure(departure) {
            Ok(()) => {}
            Err(TrySendError::Full(departure)) => {
                let deadline = self.inner.config.register_deadline;
                tokio::spawn(async move {
                    if let Err(err) = room.send_departure(departure, deadline).await {
                        tracing::warn!(error = %err, "departure not delivered");
                    }
                });
            }
            Err(TrySendError::Closed(_)) => self.remove_room(room.id()).await,
        }
    }

    /// Removes a room from every registry. Called by the room on teardown.
    pub(crate) async fn remove_room(&self, room_id: RoomId) {
        let mut registry = self.inner.registry.lock().await;
        if registry.drop_room(room_id) {
            tracing::debug!(%room_id, "room deregistered");
        }
    }

    /// Reaps rooms that are empty past the grace period or whose loop has
    /// exited. Returns how many were removed.
    pub async fn reap_empty_rooms(&self) -> usize {
        let grace = self.inner.config.empty_room_grace;
        let now = Instant::now();
        let mut registry = self.inner.registry.lock().await;
        let stale: Vec<RoomId> = registry
            .rooms
            .values()
            .filter(|room| {
                let age = now.saturating_duration_since(room.created_at());
                room.is_closed() || (room.is_empty() && age >= grace)
            })
            .map(RoomHandle::id)
            .collect();
        for room_id in &stale {
            registry.drop_room(*room_id);
        }
        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "reaped empty rooms");
        }
        stale.len()
    }

    /// Probes every waiting client and purges the dead ones along with
    /// their half-formed rooms. Returns how many were purged.
    pub async fn probe_waiters(&self) -> usize {
        let mut registry = self.inner.registry.lock().await;
        let dead: Vec<(WaitingKey, ClientHandle)> = registry
            .waiting
            .iter()
            .filter(|(_, waiter)| !waiter.probe())
            .map(|(key, waiter)| (key.clone(), waiter.clone()))
            .collect();
        for (key, waiter) in &dead {
            tracing::warn!(
                user_id = %waiter.user_id(),
                %key,
                "waiting client unresponsive, purging"
            );
            registry.waiting.remove(key);
            if let Some(room_id) = registry.user_rooms.get(&waiter.user_id()).copied() {
                registry.drop_room(room_id);
            }
        }
        dead.len()
    }

    /// Starts the slow empty-room reaper and the fast waiter prober. Both
    /// stop when the returned [`Sweepers`] is dropped.
    pub fn spawn_sweepers(&self) -> Sweepers {
        let hub = self.clone();
        let reaper = tokio::spawn(async move {
            let mut ticks = time::interval(hub.inner.config.reap_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                hub.reap_empty_rooms().await;
            }
        });

        let hub = self.clone();
        let prober = tokio::spawn(async move {
            let mut ticks = time::interval(hub.inner.config.probe_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                hub.probe_waiters().await;
            }
        });

        Sweepers { reaper, prober }
    }

    // -- introspection -----------------------------------------------------

    pub async fn room_count(&self) -> usize {
        self.inner.registry.lock().await.rooms.len()
    }

    pub async fn waiting_count(&self) -> usize {
        self.inner.registry.lock().await.waiting.len()
    }

    /// The room `user_id` is currently in.
    pub async fn room_of(&self, user_id: UserId) -> Option<RoomId> {
        self.inner.registry.lock().await.user_rooms.get(&user_id).copied()
    }

    /// Member ids of a room, sorted.
    pub async fn members(&self, room_id: RoomId) -> Option<Vec<UserId>> {
        self.inner
            .registry
            .lock()
            .await
            .rooms
            .get(&room_id)
            .map(RoomHandle::member_ids)
    }
}

/// The hub's background sweeps. Aborted on drop.
#[derive(Debug)]
pub struct Sweepers {
    reaper: JoinHandle<()>,
    prober: JoinHandle<()>,
}

impl Drop for Sweepers {
    fn drop(&mut self) {
        self.reaper.abort();
        self.prober.abort();
    }
}
