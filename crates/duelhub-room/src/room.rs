//! Room actor: one match, driven by one Tokio task.
//!
//! The task is the only code that touches the [`Game`]. The hub talks to it
//! through three bounded queues (register, disconnect, inbound frames) and
//! a shutdown signal. The member set is the one piece of state shared with
//! the hub, since pairing has to reserve the second seat atomically under
//! the hub's lock.
//!
//! Nothing here holds the member lock across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use duelhub_protocol::{
    ClientEnvelope, Codec, InboundKind, JsonCodec, MatchedPayload, ResultPayload, RoomId,
    ServerMessage, StartPayload, UserId, WaitingKey,
};
use duelhub_timer::{Expiry, TurnTimer};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{Notify, mpsc};
use tokio::time::{self, Instant};

use crate::client::{ClientId, Inbound};
use crate::game::{Game, GameResult};
use crate::store::{HistoryRow, MatchRecord, Stores};
use crate::{ClientHandle, Hub, RoomConfig, RoomError, RoomPhase};

/// Frames kept per player while the room waits for its second member.
const HELD_FRAME_LIMIT: usize = 32;

/// A client's connection went away.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Departure {
    pub client: ClientId,
    pub user_id: UserId,
}

#[derive(Debug, Default)]
struct Members {
    clients: HashMap<UserId, ClientHandle>,
    /// Seat 0 is the creator, seat 1 is reserved by the hub on pairing.
    seats: [Option<UserId>; 2],
}

/// Handle to a running room. Held by the hub's registry.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    created_at: Instant,
    members: Arc<Mutex<Members>>,
    register_tx: mpsc::Sender<ClientHandle>,
    disconnect_tx: mpsc::Sender<Departure>,
    shutdown: Arc<Notify>,
}

impl RoomHandle {
    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Member user ids, sorted.
    pub fn member_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.members.lock().clients.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().clients.is_empty()
    }

    /// The room's loop has exited.
    pub fn is_closed(&self) -> bool {
        self.register_tx.is_closed()
    }

    /// Whether this exact connection is a member.
    pub(crate) fn holds(&self, client: &ClientHandle) -> bool {
        self.members
            .lock()
            .clients
            .get(&client.user_id())
            .is_some_and(|c| c.id() == client.id())
    }

    /// The member connection for `user_id`, if any.
    pub(crate) fn member(&self, user_id: UserId) -> Option<ClientHandle> {
        self.members.lock().clients.get(&user_id).cloned()
    }

    /// Reserves seat 1 for `joiner`, provided `waiter` is still the lone
    /// member. Called under the hub's lock.
    pub(crate) fn try_pair(&self, waiter: &ClientHandle, joiner: &ClientHandle) -> bool {
        let mut members = self.members.lock();
        let waiter_present = members
            .clients
            .get(&waiter.user_id())
            .is_some_and(|c| c.id() == waiter.id());
        if !waiter_present || members.seats[1].is_some() || members.clients.len() != 1 {
            return false;
        }
        members.seats[1] = Some(joiner.user_id());
        members.clients.insert(joiner.user_id(), joiner.clone());
        true
    }

    /// Hands `client` to the loop, waiting at most `deadline`.
    pub(crate) async fn register(
        &self,
        client: ClientHandle,
        deadline: Duration,
    ) -> Result<(), RoomError> {
        self.register_tx
            .send_timeout(client, deadline)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => RoomError::RegisterTimeout(self.id),
                SendTimeoutError::Closed(_) => RoomError::Unavailable(self.id),
            })
    }

    pub(crate) fn notify_departure(
        &self,
        departure: Departure,
    ) -> Result<(), TrySendError<Departure>> {
        self.disconnect_tx.try_send(departure)
    }

    pub(crate) async fn send_departure(
        &self,
        departure: Departure,
        deadline: Duration,
    ) -> Result<(), RoomError> {
        self.disconnect_tx
            .send_timeout(departure, deadline)
            .await
            .map_err(|_| RoomError::Unavailable(self.id))
    }

    /// Asks the loop to stop without a result.
    pub(crate) fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Spawns the loop for a new room with `first` in seat 0.
pub(crate) fn spawn(
    id: RoomId,
    first: &ClientHandle,
    hub: Hub,
    config: RoomConfig,
    stores: Stores,
    capacity: usize,
) -> RoomHandle {
    let capacity = capacity.max(1);
    let (register_tx, register_rx) = mpsc::channel(capacity);
    let (disconnect_tx, disconnect_rx) = mpsc::channel(capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

    let mut members = Members::default();
    members.seats[0] = Some(first.user_id());
    members.clients.insert(first.user_id(), first.clone());
    let members = Arc::new(Mutex::new(members));
    let shutdown = Arc::new(Notify::new());
    let key = first.key().clone();

    let room = Room {
        id,
        game: Game::new(key.variant, first.user_id()),
        key,
        config,
        hub,
        stores,
        phase: RoomPhase::Waiting,
        members: members.clone(),
        registered: HashMap::new(),
        held: HashMap::new(),
        finalized: HashSet::new(),
        register_rx,
        disconnect_rx,
        inbound_rx,
        inbound_tx,
        shutdown: shutdown.clone(),
        setup_timer: TurnTimer::new("setup"),
        turn_timer: TurnTimer::new("turn"),
    };
    tokio::spawn(room.run());

    RoomHandle {
        id,
        created_at: Instant::now(),
        members,
        register_tx,
        disconnect_tx,
        shutdown,
    }
}

struct Room {
    id: RoomId,
    key: WaitingKey,
    config: RoomConfig,
    hub: Hub,
    stores: Stores,
    game: Game,
    phase: RoomPhase,
    members: Arc<Mutex<Members>>,
    /// Members whose Register has been processed, so they receive broadcasts.
    registered: HashMap<UserId, ClientHandle>,
    /// Frames from registered players that arrived before the match formed.
    held: HashMap<UserId, Vec<Vec<u8>>>,
    /// Connections that already got their terminal frame.
    finalized: HashSet<ClientId>,
    register_rx: mpsc::Receiver<ClientHandle>,
    disconnect_rx: mpsc::Receiver<Departure>,
    inbound_rx: mpsc::Receiver<Inbound>,
    inbound_tx: mpsc::Sender<Inbound>,
    shutdown: Arc<Notify>,
    setup_timer: TurnTimer,
    turn_timer: TurnTimer,
}

impl Room {
    async fn run(mut self) {
        tracing::info!(
            room_id = %self.id,
            game = %self.game.variant(),
            key = %self.key,
            "room started"
        );

        while self.phase != RoomPhase::Finished {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    tracing::info!(
                        room_id = %self.id,
                        phase = %self.phase,
                        "room shut down by hub"
                    );
                    self.enter(RoomPhase::Finished);
                }
                Some(client) = self.register_rx.recv() => self.admit(client).await,
                Some(departure) = self.disconnect_rx.recv() => self.depart(departure).await,
                Some(inbound) = self.inbound_rx.recv() => self.on_inbound(inbound).await,
                expiry = self.setup_timer.expired() => self.on_setup_expired(expiry).await,
                expiry = self.turn_timer.expired() => self.on_turn_expired(expiry).await,
            }
        }

        self.teardown().await;
    }

    fn enter(&mut self, next: RoomPhase) {
        if self.phase.can_transition_to(next) {
            if self.phase != next {
                tracing::debug!(room_id = %self.id, from = %self.phase, to = %next, "phase change");
            }
            self.phase = next;
        } else {
            tracing::warn!(
                room_id = %self.id,
                from = %self.phase,
                to = %next,
                "ignored illegal phase change"
            );
        }
    }

    // -- registration and departure ----------------------------------------

    async fn admit(&mut self, client: ClientHandle) {
        let user_id = client.user_id();
        let is_member = self
            .members
            .lock()
            .clients
            .get(&user_id)
            .is_some_and(|c| c.id() == client.id());
        if !is_member || self.phase == RoomPhase::Finished {
            tracing::warn!(
                room_id = %self.id,
                %user_id,
                client_id = %client.id(),
                "register from non-member ignored"
            );
            return;
        }
        if self.game.players()[0] != Some(user_id) {
            if let Err(err) = self.game.set_opponent(user_id) {
                tracing::warn!(
                    room_id = %self.id,
                    %user_id,
                    error = %err,
                    "could not seat opponent"
                );
                return;
            }
        }

        let pending = client.attach(self.inbound_tx.clone());
        self.registered.insert(user_id, client.clone());
        tracing::info!(
            room_id = %self.id,
            %user_id,
            client_id = %client.id(),
            replay = pending.len(),
            "client registered"
        );

        self.send_to(user_id, ServerMessage::State(self.game.snapshot(user_id)))
            .await;

        for frame in pending {
            self.hold(user_id, frame);
        }
        if self.registered.len() == 2 && self.phase == RoomPhase::Waiting {
            self.begin_match().await;
            self.replay_held().await;
        }
    }

    /// Keeps a frame until the match forms.
    fn hold(&mut self, user_id: UserId, frame: Vec<u8>) {
        let frames = self.held.entry(user_id).or_default();
        if frames.len() >= HELD_FRAME_LIMIT {
            tracing::warn!(room_id = %self.id, %user_id, "too many early frames, dropping");
            return;
        }
        frames.push(frame);
    }

    /// Applies every held frame, each player's in arrival order.
    async fn replay_held(&mut self) {
        let backlog: Vec<(UserId, Vec<Vec<u8>>)> = self.held.drain().collect();
        for (user_id, frames) in backlog {
            for frame in frames {
                if self.phase == RoomPhase::Finished {
                    return;
                }
                self.handle_frame(user_id, frame).await;
            }
        }
    }

    async fn depart(&mut self, departure: Departure) {
        let Departure { client, user_id } = departure;
        let (survivors, paired) = {
            let mut members = self.members.lock();
            let matches = members
                .clients
                .get(&user_id)
                .is_some_and(|c| c.id() == client);
            if !matches {
                drop(members);
                tracing::debug!(
                    room_id = %self.id,
                    %user_id,
                    client_id = %client,
                    "departure for unknown connection ignored"
                );
                return;
            }
            members.clients.remove(&user_id);
            let survivors: Vec<ClientHandle> = members.clients.values().cloned().collect();
            (survivors, members.seats[1].is_some())
        };
        if self.registered.get(&user_id).is_some_and(|c| c.id() == client) {
            self.registered.remove(&user_id);
        }
        self.held.remove(&user_id);
        tracing::info!(
            room_id = %self.id,
            %user_id,
            client_id = %client,
            phase = %self.phase,
            "client left"
        );

        if self.phase == RoomPhase::Finished {
            return;
        }
        match survivors.as_slice() {
            [] => {
                tracing::info!(room_id = %self.id, "room empty");
                self.enter(RoomPhase::Finished);
            }
            [survivor] if paired => {
                let winner = survivor.user_id();
                if let Some(result) = self.game.forfeit(winner) {
                    tracing::info!(room_id = %self.id, %winner, "win by forfeit");
                    self.finish(result).await;
                }
            }
            _ => {}
        }
    }

    // -- match flow ----------------------------------------------------------

    async fn begin_match(&mut self) {
        let seated = self.seated();
        if seated.len() != 2 {
            return;
        }
        for &me in &seated {
            let Some(opponent_id) = self.game.opponent_of(me) else {
                continue;
            };
            let matched = ServerMessage::Matched(MatchedPayload {
                room_id: self.id,
                opponent_id,
            });
            self.send_to(me, matched).await;
        }
        tracing::info!(room_id = %self.id, players = ?seated, "match formed");

        match self.game.setup_timeout() {
            Some(timeout) if !self.game.setup_complete() => {
                self.enter(RoomPhase::Setup);
                self.setup_timer.arm(timeout);
            }
            _ => self.start_play().await,
        }
    }

    async fn finish_setup(&mut self) {
        self.setup_timer.cancel();
        self.broadcast(ServerMessage::SetupComplete).await;
        tracing::info!(room_id = %self.id, "setup complete");
        self.start_play().await;
    }

    /// Gives each write pump a bounded moment to come up, then opens round one.
    async fn start_play(&mut self) {
        let clients: Vec<ClientHandle> = self.registered.values().cloned().collect();
        for client in clients {
            if !client.wait_ready(self.config.ready_wait).await {
                tracing::debug!(
                    room_id = %self.id,
                    user_id = %client.user_id(),
                    "client not ready, starting anyway"
                );
            }
        }
        self.start_round().await;
    }

    async fn start_round(&mut self) {
        self.enter(RoomPhase::Playing);
        let round = self.game.begin_round();
        let timeout = self.game.turn_timeout();
        self.turn_timer.arm(timeout);
        tracing::info!(room_id = %self.id, round, "round started");

        for user_id in self.seated() {
            let start = ServerMessage::Start(StartPayload {
                round,
                timeout_secs: timeout.as_secs(),
                state: self.game.snapshot(user_id),
            });
            self.send_to(user_id, start).await;
        }
    }

    async fn on_setup_expired(&mut self, expiry: Expiry) {
        if self.phase != RoomPhase::Setup {
            return;
        }
        for user_id in self.seated() {
            if !self.game.is_set_up(user_id) {
                tracing::info!(
                    room_id = %self.id,
                    %user_id,
                    late_ms = expiry.late_by.as_millis() as u64,
                    "setup missed, placing for player"
                );
                self.game.force_setup(user_id);
            }
        }
        self.finish_setup().await;
    }

    async fn on_turn_expired(&mut self, expiry: Expiry) {
        if self.phase != RoomPhase::Playing {
            return;
        }
        for user_id in self.seated() {
            if self.game.has_moved(user_id) {
                continue;
            }
            tracing::info!(
                room_id = %self.id,
                %user_id,
                round = self.game.round(),
                generation = expiry.generation,
                "turn missed, forcing move"
            );
            if let Err(err) = self.game.handle_move(user_id, None) {
                tracing::warn!(room_id = %self.id, %user_id, error = %err, "forced move rejected");
            }
        }
        self.check_round().await;
    }

    async fn on_inbound(&mut self, inbound: Inbound) {
        let Inbound {
            client,
            user_id,
            frame,
        } = inbound;
        if !self.registered.get(&user_id).is_some_and(|c| c.id() == client) {
            tracing::debug!(
                room_id = %self.id,
                %user_id,
                client_id = %client,
                "frame from stale connection dropped"
            );
            return;
        }
        if self.phase == RoomPhase::Waiting {
            self.hold(user_id, frame);
            return;
        }
        self.handle_frame(user_id, frame).await;
    }

    /// Decodes one inbound frame and applies it. Problems go back to the
    /// sender only and never change match state.
    async fn handle_frame(&mut self, user_id: UserId, frame: Vec<u8>) {
        let envelope: ClientEnvelope = match JsonCodec.decode(&frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.reject(user_id, format!("malformed message: {err}")).await;
                return;
            }
        };
        let kind = match envelope.inbound_kind() {
            Ok(kind) => kind,
            Err(err) => {
                self.reject(user_id, err.to_string()).await;
                return;
            }
        };
        tracing::debug!(room_id = %self.id, %user_id, kind = %envelope.kind, "inbound");

        match (kind, self.phase) {
            (InboundKind::Setup, RoomPhase::Setup) => {
                match self.game.handle_setup(user_id, &envelope.value) {
                    Ok(()) if self.game.setup_complete() => self.finish_setup().await,
                    Ok(()) => {}
                    Err(err) => self.reject(user_id, err.to_string()).await,
                }
            }
            (InboundKind::Move, RoomPhase::Playing) => {
                match self.game.handle_move(user_id, Some(&envelope.value)) {
                    Ok(()) => self.check_round().await,
                    Err(err) => self.reject(user_id, err.to_string()).await,
                }
            }
            (InboundKind::Setup, _) => self.reject(user_id, "setup is not open").await,
            (InboundKind::Move, _) => self.reject(user_id, "no round in progress").await,
        }
    }

    async fn check_round(&mut self) {
        match self.game.check_result() {
            None => {
                if self.game.round_complete() {
                    self.start_round().await;
                }
            }
            Some(result) if self.game.is_finished() => self.finish(result).await,
            Some(result) => {
                for user_id in self.seated() {
                    let payload = ServerMessage::Result(result_payload(&result, user_id));
                    self.send_to(user_id, payload).await;
                }
                self.start_round().await;
            }
        }
    }

    /// Delivers the terminal result to every remaining member, waits for
    /// each acknowledgement, and kicks off persistence.
    async fn finish(&mut self, result: GameResult) {
        self.setup_timer.cancel();
        self.turn_timer.cancel();
        self.enter(RoomPhase::Finished);
        tracing::info!(
            room_id = %self.id,
            game = %self.game.variant(),
            winner = ?result.winner,
            reason = %result.reason,
            round = self.game.round(),
            "match finished"
        );

        let recipients: Vec<ClientHandle> =
            self.members.lock().clients.values().cloned().collect();
        for client in recipients {
            let message = ServerMessage::Result(result_payload(&result, client.user_id()));
            self.deliver_final(&client, message).await;
        }

        self.persist(&result);
    }

    async fn deliver_final(&mut self, client: &ClientHandle, message: ServerMessage) {
        if !self.finalized.insert(client.id()) {
            return;
        }
        let acked = client
            .deliver_final(message, self.config.send_deadline, self.config.terminal_ack_wait)
            .await;
        if !acked {
            tracing::warn!(
                room_id = %self.id,
                user_id = %client.user_id(),
                "terminal frame not acknowledged"
            );
        }
    }

    /// Writes the match record and both history rows from a detached task.
    fn persist(&self, result: &GameResult) {
        let [Some(a), Some(b)] = self.members.lock().seats else {
            return;
        };
        let record = MatchRecord {
            room_id: self.id,
            players: [a, b],
            moves: self.game.raw_moves(),
            winner: result.winner,
        };
        let rows = [
            HistoryRow::for_player(a, b, self.id, &self.key, result),
            HistoryRow::for_player(b, a, self.id, &self.key, result),
        ];
        let stores = self.stores.clone();
        let limit = self.config.persist_timeout;
        let room_id = self.id;

        tokio::spawn(async move {
            match time::timeout(limit, stores.matches.save_match(record)).await {
                Ok(Ok(())) => tracing::debug!(%room_id, "match record saved"),
                Ok(Err(err)) => {
                    tracing::warn!(%room_id, error = %err, "failed to save match record")
                }
                Err(_) => tracing::warn!(%room_id, "saving match record timed out"),
            }
            for row in rows {
                let user_id = row.user_id;
                match time::timeout(limit, stores.history.save_history(row)).await {
                    Ok(Ok(())) => tracing::debug!(%room_id, %user_id, "history row saved"),
                    Ok(Err(err)) => tracing::warn!(
                        %room_id,
                        %user_id,
                        error = %err,
                        "failed to save history row"
                    ),
                    Err(_) => {
                        tracing::warn!(%room_id, %user_id, "saving history row timed out")
                    }
                }
            }
        });
    }

    async fn teardown(&mut self) {
        self.setup_timer.cancel();
        self.turn_timer.cancel();
        self.register_rx.close();

        // Anyone still attached (or still queued for registration) never
        // got a result. Close them out so they can queue again.
        let mut stranded: Vec<ClientHandle> =
            self.members.lock().clients.values().cloned().collect();
        while let Ok(client) = self.register_rx.try_recv() {
            stranded.push(client);
        }
        for client in stranded {
            let notice = ServerMessage::error("match is no longer available");
            self.deliver_final(&client, notice).await;
        }

        self.hub.remove_room(self.id).await;
        tracing::info!(room_id = %self.id, "room torn down");
    }

    // -- delivery ------------------------------------------------------------

    fn seated(&self) -> Vec<UserId> {
        self.game.players().into_iter().flatten().collect()
    }

    async fn send_to(&self, user_id: UserId, message: ServerMessage) {
        let Some(client) = self.registered.get(&user_id) else {
            return;
        };
        let kind = message.kind();
        if let Err(err) = client.send(message, self.config.send_deadline).await {
            tracing::warn!(
                room_id = %self.id,
                %user_id,
                kind,
                error = %err,
                "dropped outbound frame"
            );
        }
    }

    async fn broadcast(&self, message: ServerMessage) {
        for user_id in self.seated() {
            self.send_to(user_id, message.clone()).await;
        }
    }

    async fn reject(&self, user_id: UserId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!(room_id = %self.id, %user_id, %reason, "inbound rejected");
        self.send_to(user_id, ServerMessage::error(reason)).await;
    }
}

fn result_payload(result: &GameResult, user_id: UserId) -> ResultPayload {
    ResultPayload {
        you: result.outcome_for(user_id),
        reason: result.reason.clone(),
        details: result.details.clone(),
    }
}

#[cfg(test)]
mod tests {
    use duelhub_protocol::{GameVariant, Outcome};
    use serde_json::{Value, json};

    use super::*;
    use crate::{ClientConfig, HubConfig, MemoryStore, Outbound};

    fn quick_draw() -> WaitingKey {
        WaitingKey::new(GameVariant::QuickDraw, 10, "gems")
    }

    /// A client whose write pump forwards frames to the returned receiver.
    fn client(user: u64) -> (ClientHandle, mpsc::UnboundedReceiver<ServerMessage>) {
        let (handle, mut link) =
            ClientHandle::new(UserId(user), quick_draw(), &ClientConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let _ = link.ready.send(true);
            while let Some(outbound) = link.outbound.recv().await {
                match outbound {
                    Outbound::Message(message) => {
                        let _ = tx.send(message);
                    }
                    Outbound::Probe => {}
                    Outbound::Final { message, delivered } => {
                        let _ = tx.send(message);
                        let _ = delivered.send(());
                        break;
                    }
                }
            }
        });
        (handle, rx)
    }

    async fn next_of(
        frames: &mut mpsc::UnboundedReceiver<ServerMessage>,
        kind: &str,
    ) -> ServerMessage {
        loop {
            let message = time::timeout(Duration::from_secs(60), frames.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("pump stopped");
            if message.kind() == kind {
                return message;
            }
        }
    }

    fn frame(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn room_for(first: &ClientHandle) -> RoomHandle {
        let stores = Stores::memory(Arc::new(MemoryStore::new()));
        let hub = Hub::new(HubConfig::default(), RoomConfig::default(), stores.clone());
        spawn(RoomId(900), first, hub, RoomConfig::default(), stores, 8)
    }

    #[tokio::test(start_paused = true)]
    async fn test_joiner_registered_first_keeps_early_move() {
        let (waiter, mut waiter_rx) = client(1);
        let (joiner, mut joiner_rx) = client(2);
        let room = room_for(&waiter);
        assert!(room.try_pair(&waiter, &joiner));

        // sent before any registration, so buffered in the client slot
        joiner
            .forward(frame(json!({"type": "move", "value": "paper"})), Duration::from_secs(1))
            .await
            .unwrap();

        room.register(joiner.clone(), Duration::from_secs(1)).await.unwrap();
        next_of(&mut joiner_rx, "state").await;
        room.register(waiter.clone(), Duration::from_secs(1)).await.unwrap();

        next_of(&mut waiter_rx, "start").await;
        waiter
            .forward(frame(json!({"type": "move", "value": "rock"})), Duration::from_secs(1))
            .await
            .unwrap();

        match next_of(&mut joiner_rx, "result").await {
            ServerMessage::Result(result) => {
                assert_eq!(result.you, Outcome::Win);
                assert_eq!(result.reason, "paper_beats_rock");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_while_waiting_for_opponent_is_held() {
        let (waiter, mut waiter_rx) = client(1);
        let (joiner, mut joiner_rx) = client(2);
        let room = room_for(&waiter);

        room.register(waiter.clone(), Duration::from_secs(1)).await.unwrap();
        next_of(&mut waiter_rx, "state").await;
        // attached, but nobody to play against yet
        waiter
            .forward(frame(json!({"type": "move", "value": "scissors"})), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(room.try_pair(&waiter, &joiner));
        room.register(joiner.clone(), Duration::from_secs(1)).await.unwrap();
        next_of(&mut joiner_rx, "start").await;
        joiner
            .forward(frame(json!({"type": "move", "value": "paper"})), Duration::from_secs(1))
            .await
            .unwrap();

        match next_of(&mut waiter_rx, "result").await {
            ServerMessage::Result(result) => {
                assert_eq!(result.you, Outcome::Win);
                assert_eq!(result.reason, "scissors_beats_paper");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
