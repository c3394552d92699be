//! Per-connection handler: admission, the two socket pumps, and hand-off
//! to the hub.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Admit: parse the upgrade query, verify the token, check the wallet.
//!      On failure the socket is closed with the matching 44xx/45xx code.
//!   2. Start the write pump (it raises the ready flag), enqueue `ready`.
//!   3. Start the read pump, which forwards frames toward the room.
//!   4. Ask the hub for a room.
//!   5. Wait for either pump to stop, report the disconnect, close.

use std::sync::Arc;
use std::time::Duration;

use duelhub_protocol::{Codec, JsonCodec, ProtocolError, ReadyPayload, ServerMessage};
use duelhub_room::{ClientHandle, ClientLink, Hub, Outbound};
use duelhub_session::{Authenticator, BalanceChecker, ConnectParams, SessionError, admit};
use duelhub_transport::{Connection, WebSocketConnection};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::DuelhubError;
use crate::server::ServerState;

/// Close code for a connection that could not be placed in a room.
const CLOSE_UNAVAILABLE: u16 = 1013;
const CLOSE_NORMAL: u16 = 1000;

/// How long a stopping write pump gets to finish the frame in hand.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Drop guard that reports the disconnect to the hub when the handler
/// exits, whichever way it exits.
struct DisconnectGuard {
    hub: Hub,
    client: ClientHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let client = self.client.clone();
        tokio::spawn(async move {
            hub.on_disconnect(&client).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, B>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, B>>,
) -> Result<(), DuelhubError>
where
    A: Authenticator,
    B: BalanceChecker,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, path = %conn.request().path, "handling new connection");

    // --- Step 1: Admission ---
    let admission = match admit_connection(&conn, &state).await {
        Ok(admission) => admission,
        Err(e) => {
            tracing::info!(%conn_id, error = %e, code = e.close_code(), "connection refused");
            let _ = conn.close(e.close_code(), e.close_reason()).await;
            return Err(e.into());
        }
    };

    let (client, link) =
        ClientHandle::new(admission.user_id, admission.key.clone(), &state.client_config);
    tracing::info!(
        %conn_id,
        client_id = %client.id(),
        user_id = %client.user_id(),
        key = %client.key(),
        "player admitted"
    );
    let _guard = DisconnectGuard {
        hub: state.hub.clone(),
        client: client.clone(),
    };

    // Either pump flips this when it stops.
    let (closed_tx, mut closed_rx) = watch::channel(false);

    // --- Step 2: Write pump ---
    let ClientLink { outbound, ready } = link;
    let mut writer = tokio::spawn(write_pump(
        Arc::clone(&conn),
        outbound,
        ready,
        closed_tx.clone(),
        state.client_config.ping_interval,
        state.codec,
    ));

    let hello = ServerMessage::Ready(ReadyPayload {
        user_id: admission.user_id,
        game: admission.key.variant,
        stake: admission.key.stake,
        currency: admission.key.currency.clone(),
    });
    if let Err(e) = client.send(hello, state.client_config.forward_deadline).await {
        tracing::debug!(client_id = %client.id(), error = %e, "ready frame not queued");
        closed_tx.send_replace(true);
    }

    // --- Step 3: Read pump ---
    let reader = tokio::spawn(read_pump(
        Arc::clone(&conn),
        client.clone(),
        closed_tx.clone(),
        state.client_config.forward_deadline,
    ));

    // --- Step 4: Matchmaking ---
    let assigned = state.hub.assign_client(client.clone()).await;
    let mut close_code = CLOSE_NORMAL;
    match &assigned {
        Ok(room_id) => {
            tracing::debug!(client_id = %client.id(), %room_id, "client assigned");
        }
        Err(e) => {
            tracing::warn!(client_id = %client.id(), error = %e, "could not place client");
            close_code = CLOSE_UNAVAILABLE;
            closed_tx.send_replace(true);
        }
    }

    // --- Step 5: Teardown ---
    let _ = closed_rx.wait_for(|closed| *closed).await;
    reader.abort();
    if time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    let _ = conn.close(close_code, "").await;
    tracing::info!(
        %conn_id,
        client_id = %client.id(),
        user_id = %client.user_id(),
        "connection closed"
    );

    // _guard drops here → hub.on_disconnect fires.
    assigned.map(|_| ()).map_err(DuelhubError::from)
}

async fn admit_connection<A, B>(
    conn: &WebSocketConnection,
    state: &ServerState<A, B>,
) -> Result<duelhub_session::Admission, SessionError>
where
    A: Authenticator,
    B: BalanceChecker,
{
    let params = ConnectParams::from_query(conn.request().query.as_deref())?;
    admit(params, &state.auth, &state.wallet).await
}

/// Drains the client's outbound queue onto the socket and keeps the peer
/// alive with pings. Stops after the terminal frame, on a write failure,
/// or when the read side goes away.
async fn write_pump(
    conn: Arc<WebSocketConnection>,
    mut outbound: mpsc::Receiver<Outbound>,
    ready: watch::Sender<bool>,
    closed: watch::Sender<bool>,
    ping_interval: Duration,
    codec: JsonCodec,
) {
    let conn_id = conn.id();
    let mut closed_rx = closed.subscribe();
    let mut pings = time::interval_at(Instant::now() + ping_interval, ping_interval);
    pings.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ready.send_replace(true);

    loop {
        tokio::select! {
            _ = async { closed_rx.wait_for(|closed| *closed).await.map(|_| ()) } => break,
            item = outbound.recv() => match item {
                Some(Outbound::Message(message)) => {
                    if let Err(e) = write_frame(&conn, &codec, &message).await {
                        tracing::debug!(%conn_id, error = %e, "write failed");
                        break;
                    }
                }
                Some(Outbound::Probe) => {}
                Some(Outbound::Final { message, delivered }) => {
                    match write_frame(&conn, &codec, &message).await {
                        Ok(()) => {
                            let _ = delivered.send(());
                        }
                        Err(e) => tracing::debug!(%conn_id, error = %e, "final write failed"),
                    }
                    break;
                }
                None => break,
            },
            _ = pings.tick() => {
                if let Err(e) = conn.ping().await {
                    tracing::debug!(%conn_id, error = %e, "ping failed");
                    break;
                }
            }
        }
    }

    closed.send_replace(true);
}

/// Forwards every inbound frame toward the client's room until the peer
/// goes away or the room stops listening.
async fn read_pump(
    conn: Arc<WebSocketConnection>,
    client: ClientHandle,
    closed: watch::Sender<bool>,
    forward_deadline: Duration,
) {
    let client_id = client.id();
    loop {
        match conn.recv().await {
            Ok(Some(frame)) => {
                if let Err(e) = client.forward(frame, forward_deadline).await {
                    tracing::debug!(%client_id, error = %e, "room no longer listening");
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!(%client_id, "peer closed connection");
                break;
            }
            Err(e) => {
                tracing::debug!(%client_id, error = %e, "recv error");
                break;
            }
        }
    }
    closed.send_replace(true);
}

async fn write_frame(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    message: &ServerMessage,
) -> Result<(), DuelhubError> {
    let bytes = codec.encode(message)?;
    let text =
        String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
    conn.send_text(&text).await?;
    Ok(())
}
