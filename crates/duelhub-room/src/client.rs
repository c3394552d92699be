//! The room- and hub-facing side of a connected player.
//!
//! The connection layer owns the socket and its two pumps. What the rest of
//! the system holds is a [`ClientHandle`]: a bounded outbound queue, a
//! ready flag, and the slot through which inbound frames reach the room.
//!
//! Frames that arrive before the room has registered the client are
//! buffered in the slot, up to the outbound capacity, and replayed in order
//! by the room right after registration.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use duelhub_protocol::{ServerMessage, UserId, WaitingKey};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{ClientConfig, RoomError};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connection. A user who reconnects gets a new one, which
/// is how stale events from the old socket are told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl ClientId {
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// What the write pump drains.
#[derive(Debug)]
pub enum Outbound {
    /// An ordinary frame.
    Message(ServerMessage),
    /// Liveness sentinel from the hub. Never written to the socket.
    Probe,
    /// The terminal result. The pump signals `delivered` once it has been
    /// written, then shuts the connection down.
    Final {
        message: ServerMessage,
        delivered: oneshot::Sender<()>,
    },
}

/// An inbound frame on its way into a room.
#[derive(Debug)]
pub struct Inbound {
    pub client: ClientId,
    pub user_id: UserId,
    pub frame: Vec<u8>,
}

#[derive(Debug, Default)]
struct Slot {
    room: Option<mpsc::Sender<Inbound>>,
    pending: Vec<Vec<u8>>,
}

/// Shared handle to a connected player. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    user_id: UserId,
    key: WaitingKey,
    outbound: mpsc::Sender<Outbound>,
    ready: watch::Receiver<bool>,
    slot: Arc<Mutex<Slot>>,
    /// Most frames buffered before a room attaches.
    pending_cap: usize,
}

/// The connection-owned ends of a [`ClientHandle`]'s channels.
#[derive(Debug)]
pub struct ClientLink {
    /// Drained by the write pump.
    pub outbound: mpsc::Receiver<Outbound>,
    /// Set once the write pump is running.
    pub ready: watch::Sender<bool>,
}

impl ClientHandle {
    pub fn new(user_id: UserId, key: WaitingKey, config: &ClientConfig) -> (Self, ClientLink) {
        let capacity = config.outbound_capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (ready_tx, ready_rx) = watch::channel(false);
        let handle = Self {
            id: ClientId::next(),
            user_id,
            key,
            outbound: outbound_tx,
            ready: ready_rx,
            slot: Arc::new(Mutex::new(Slot::default())),
            pending_cap: capacity,
        };
        let link = ClientLink {
            outbound: outbound_rx,
            ready: ready_tx,
        };
        (handle, link)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn key(&self) -> &WaitingKey {
        &self.key
    }

    /// The write pump has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Non-blocking liveness check: `false` if the queue is full or closed.
    pub fn probe(&self) -> bool {
        match self.outbound.try_send(Outbound::Probe) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueues a frame, giving up after `deadline`.
    pub async fn send(&self, message: ServerMessage, deadline: Duration) -> Result<(), RoomError> {
        self.outbound
            .send_timeout(Outbound::Message(message), deadline)
            .await
            .map_err(|_| RoomError::ClientGone(self.id))
    }

    /// Enqueues the terminal frame and waits up to `ack_wait` for the
    /// write pump to confirm it hit the socket. Returns whether it did.
    pub async fn deliver_final(
        &self,
        message: ServerMessage,
        send_deadline: Duration,
        ack_wait: Duration,
    ) -> bool {
        let (delivered_tx, delivered_rx) = oneshot::channel();
        let queued = self
            .outbound
            .send_timeout(
                Outbound::Final {
                    message,
                    delivered: delivered_tx,
                },
                send_deadline,
            )
            .await;
        if queued.is_err() {
            return false;
        }
        matches!(tokio::time::timeout(ack_wait, delivered_rx).await, Ok(Ok(())))
    }

    /// Waits up to `timeout` for the write pump's ready signal.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.clone();
        matches!(
            tokio::time::timeout(timeout, ready.wait_for(|r| *r)).await,
            Ok(Ok(_))
        )
    }

    /// Hands an inbound frame to the room, or buffers it if no room has
    /// registered this client yet. A full buffer drops the frame.
    pub async fn forward(&self, frame: Vec<u8>, deadline: Duration) -> Result<(), RoomError> {
        let room = {
            let mut slot = self.slot.lock();
            match &slot.room {
                Some(tx) => tx.clone(),
                None => {
                    if slot.pending.len() >= self.pending_cap {
                        tracing::warn!(
                            client_id = %self.id,
                            user_id = %self.user_id,
                            "pre-assignment buffer full, frame dropped"
                        );
                    } else {
                        slot.pending.push(frame);
                    }
                    return Ok(());
                }
            }
        };
        let inbound = Inbound {
            client: self.id,
            user_id: self.user_id,
            frame,
        };
        match room.send_timeout(inbound, deadline).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    client_id = %self.id,
                    user_id = %self.user_id,
                    "room inbound queue full, frame dropped"
                );
                Ok(())
            }
            Err(SendTimeoutError::Closed(_)) => Err(RoomError::ClientGone(self.id)),
        }
    }

    /// Connects the slot to a room and returns the frames buffered so far.
    /// Called by the room while registering this client.
    pub(crate) fn attach(&self, room: mpsc::Sender<Inbound>) -> Vec<Vec<u8>> {
        let mut slot = self.slot.lock();
        slot.room = Some(room);
        std::mem::take(&mut slot.pending)
    }

    /// Number of frames waiting for a room.
    pub fn pending_len(&self) -> usize {
        self.slot.lock().pending.len()
    }
}
