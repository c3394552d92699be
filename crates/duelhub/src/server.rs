//! `DuelhubServer` builder and accept loop.
//!
//! Ties the layers together: transport → admission → hub → rooms. The
//! server owns the listener and the hub; each accepted socket gets its own
//! task running [`handle_connection`].

use std::sync::Arc;

use duelhub_protocol::JsonCodec;
use duelhub_room::{ClientConfig, Hub, HubConfig, MemoryStore, RoomConfig, Stores};
use duelhub_session::{Authenticator, BalanceChecker};
use duelhub_transport::{Transport, WebSocketTransport};

use crate::DuelhubError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<A: Authenticator, B: BalanceChecker> {
    pub(crate) hub: Hub,
    pub(crate) auth: A,
    pub(crate) wallet: B,
    pub(crate) client_config: ClientConfig,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a duelhub server.
///
/// # Example
///
/// ```rust,ignore
/// use duelhub::prelude::*;
///
/// let server = DuelhubServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(my_auth, my_wallet)
///     .await?;
/// server.run().await
/// ```
pub struct DuelhubServerBuilder {
    bind_addr: String,
    hub_config: HubConfig,
    room_config: RoomConfig,
    client_config: ClientConfig,
    stores: Option<Stores>,
}

impl DuelhubServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            hub_config: HubConfig::default(),
            room_config: RoomConfig::default(),
            client_config: ClientConfig::default(),
            stores: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.hub_config = config;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    /// Where finished matches are written. Defaults to an in-memory store.
    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Binds the listener and builds the server around the given identity
    /// verifier and wallet.
    pub async fn build<A, B>(self, auth: A, wallet: B) -> Result<DuelhubServer<A, B>, DuelhubError>
    where
        A: Authenticator,
        B: BalanceChecker,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let stores = self
            .stores
            .unwrap_or_else(|| Stores::memory(Arc::new(MemoryStore::new())));

        let state = Arc::new(ServerState {
            hub: Hub::new(self.hub_config, self.room_config, stores),
            auth,
            wallet,
            client_config: self.client_config,
            codec: JsonCodec,
        });

        Ok(DuelhubServer { transport, state })
    }
}

impl Default for DuelhubServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound duelhub server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuelhubServer<A: Authenticator, B: BalanceChecker> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, B>>,
}

impl<A, B> DuelhubServer<A, B>
where
    A: Authenticator,
    B: BalanceChecker,
{
    /// Creates a new builder.
    pub fn builder() -> DuelhubServerBuilder {
        DuelhubServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The matchmaking hub, for introspection.
    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    /// Runs the accept loop until the process is terminated.
    ///
    /// Also starts the hub's empty-room reaper and waiter prober, which
    /// live as long as this future.
    pub async fn run(mut self) -> Result<(), DuelhubError> {
        let _sweepers = self.state.hub.spawn_sweepers();
        tracing::info!("duelhub server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
