//! `Take5Server` builder and server loop.
//!
//! This is the entry point for running a Take 5 server. It ties together
//! all the layers: transport → protocol → room engine → store.

use std::future::Future;
use std::sync::Arc;

use take5_protocol::{Codec, JsonCodec};
use take5_room::{GameConfig, RoomRegistry};
use take5_store::Store;
use take5_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::pacing::PacingConfig;
use crate::Take5Error;

/// Path lobby clients connect to. Every other path is a game connection.
pub const LOBBY_PATH: &str = "/lobby_ws";

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The registry
/// does its own locking.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: RoomRegistry,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) codec: C,
    pub(crate) pacing: PacingConfig,
}

impl<C: Codec> ServerState<C> {
    pub(crate) fn new(
        game_config: GameConfig,
        pacing: PacingConfig,
        store: Arc<dyn Store>,
        codec: C,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(game_config),
            store,
            codec,
            pacing,
        }
    }
}

/// Builder for configuring and starting a Take 5 server.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use take5::prelude::*;
///
/// # async fn run() -> Result<(), Take5Error> {
/// let store = Arc::new(SqliteStore::open("take5.db")?);
/// let server = Take5Server::builder()
///     .bind("0.0.0.0:8080")
///     .build(store)
///     .await?;
/// server.restore_rooms().await?;
/// server.run().await
/// # }
/// ```
pub struct Take5ServerBuilder {
    bind_addr: String,
    game_config: GameConfig,
    pacing: PacingConfig,
}

impl Take5ServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            game_config: GameConfig::default(),
            pacing: PacingConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the rules every room is created with.
    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Sets the end-of-game announcement timing.
    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Binds the listener and builds the server around `store`.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(
        self,
        store: Arc<dyn Store>,
    ) -> Result<Take5Server<JsonCodec>, Take5Error> {
        if !self.game_config.fits_deck() {
            return Err(Take5Error::Config(format!(
                "{} players with {} cards each do not fit one deck",
                self.game_config.max_players, self.game_config.hand_size
            )));
        }
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let state = Arc::new(ServerState::new(
            self.game_config,
            self.pacing,
            store,
            JsonCodec,
        ));
        Ok(Take5Server { transport, state })
    }
}

impl Default for Take5ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Take 5 server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct Take5Server<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl Take5Server<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> Take5ServerBuilder {
        Take5ServerBuilder::new()
    }
}

impl<C: Codec> Take5Server<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Loads every stored room into the registry. Call once, before
    /// accepting connections. Returns how many rooms were restored.
    pub async fn restore_rooms(&self) -> Result<usize, Take5Error> {
        let rooms = self
            .state
            .store
            .load_all_room_snapshots(self.state.registry.config())?;
        Ok(self.state.registry.restore(rooms.into_values()).await)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), Take5Error> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then closes every
    /// connection and empties the registry.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Take5Error> {
        tracing::info!(addr = ?self.local_addr().ok(), "Take 5 server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        self.state.registry.shutdown().await;
        Ok(())
    }
}
