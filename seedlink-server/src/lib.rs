//! SeedLink 4 protocol engine.
//!
//! Producers connect, optionally authenticate, and switch to `FEED`; their
//! record frames are numbered per station and published to every streaming
//! consumer whose `STATION`/`SELECT`/`ACCEPT` negotiation matches. Recent
//! records are held per stream so `DATA <seq>` can resume after a reconnect,
//! and `INFO` reports stations, sequence ranges and connections as JSON.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> seedlink4_server::Result<()> {
//! use seedlink4_server::SeedLinkServer;
//!
//! let server = SeedLinkServer::bind("0.0.0.0:18000").await?;
//! let handle = server.shutdown_handle();
//!
//! tokio::spawn(server.run());
//!
//! // Later:
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub(crate) mod connections;
pub(crate) mod dispatcher;
pub mod error;
pub(crate) mod fanout;
pub(crate) mod handshake;
pub mod identity;
pub(crate) mod info;
pub(crate) mod ingest;
pub mod lifecycle;
pub(crate) mod session;
pub(crate) mod store;
pub(crate) mod subscription;
pub mod transcode;

pub use auth::FeedAccess;
pub use config::{QueuePolicy, ServerConfig};
pub use error::{Result, ServerError};
pub use identity::StationKey;
pub use lifecycle::ServerContext;
pub use transcode::{Transcoded, Transcoder};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use connections::ConnectionRegistry;
use fanout::FanOut;
use ingest::{Gateway, StationCatalog};
use session::{Session, Shared};
use store::RecordStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use transcode::TranscoderChain;

/// Handle for triggering graceful server shutdown.
///
/// Obtained via [`SeedLinkServer::shutdown_handle()`]. Calling [`shutdown()`](Self::shutdown)
/// stops the accept loop and closes every connection.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Async SeedLink 4 server.
///
/// Binds to a TCP port and serves both consumers and `FEED` producers on it.
pub struct SeedLinkServer {
    listener: TcpListener,
    config: ServerConfig,
    pub(crate) transcoders: TranscoderChain,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SeedLinkServer {
    /// Bind to the given address with default configuration.
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, ServerConfig::default()).await
    }

    /// Bind to the given address with custom configuration.
    pub async fn bind_with_config(addr: &str, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(addr, "server bound");
        Ok(Self {
            listener,
            config,
            transcoders: TranscoderChain::default(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Returns the local address this server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(ServerError::Io)
    }

    /// Returns a handle that can be used to trigger graceful shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run `transcoder` on every ingested payload. Derived payloads are
    /// published after the original, in registration order.
    pub fn add_transcoder<T: Transcoder + 'static>(&mut self, transcoder: T) {
        self.transcoders.push(Arc::new(transcoder));
    }

    /// Run the accept loop until [`ShutdownHandle::shutdown`] is called.
    pub async fn run(self) {
        let shutdown_rx = self.shutdown_rx.clone();
        self.run_until(shutdown_rx).await;
    }

    /// Run the accept loop until `shutdown` changes or its sender is dropped.
    ///
    /// Every connection task watches the same receiver. Returns once all of
    /// them have finished.
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            listener,
            config,
            transcoders,
            shutdown_tx: _shutdown_tx,
            ..
        } = self;

        let fanout = FanOut::new();
        let catalog = Arc::new(StationCatalog::default());
        let store = RecordStore::new(config.ring_capacity);
        let gateway = Gateway::new(
            fanout.clone(),
            store.clone(),
            catalog.clone(),
            transcoders,
            config.max_payload_len,
        );
        let shared = Shared {
            config: Arc::new(config),
            fanout,
            catalog,
            gateway,
            store,
            connections: ConnectionRegistry::new(),
            started: SystemTime::now(),
        };
        let mut sessions = JoinSet::new();

        loop {
            let (stream, addr) = tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept error");
                            continue;
                        }
                    }
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => continue,
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            };

            debug!(%addr, "accepted connection");
            stream.set_nodelay(true).ok();
            sessions.spawn(Session::new(stream, addr, shared.clone(), shutdown.clone()).run());
        }

        drop(listener);
        debug!(remaining = sessions.len(), "waiting for connections to close");
        while sessions.join_next().await.is_some() {}
        info!("server stopped");
    }
}
