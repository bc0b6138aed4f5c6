//! Start/stop hooks for process supervisors.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::transcode::{Transcoder, TranscoderChain};
use crate::SeedLinkServer;

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns a server's listening address, configuration and shutdown channel.
///
/// The engine itself only receives the shutdown receiver; binding, stopping
/// and the running flag live here.
pub struct ServerContext {
    addr: String,
    config: ServerConfig,
    transcoders: TranscoderChain,
    running: Option<Running>,
}

impl ServerContext {
    pub fn new(addr: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            transcoders: TranscoderChain::default(),
            running: None,
        }
    }

    /// Register a transcoder for every server started from this context.
    pub fn with_transcoder<T: Transcoder + 'static>(mut self, transcoder: T) -> Self {
        self.transcoders.push(Arc::new(transcoder));
        self
    }

    /// Bind and spawn the engine. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }
        let mut server = SeedLinkServer::bind_with_config(&self.addr, self.config.clone()).await?;
        server.transcoders = self.transcoders.clone();
        let local_addr = server.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(server.run_until(shutdown_rx));
        info!(%local_addr, "server started");

        self.running = Some(Running {
            local_addr,
            shutdown_tx,
            task,
        });
        Ok(local_addr)
    }

    /// Signal shutdown and wait up to `timeout` for every connection to close.
    ///
    /// On timeout the engine task is aborted and [`ServerError::StopTimeout`]
    /// is returned.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        let mut running = self.running.take().ok_or(ServerError::NotRunning)?;
        let _ = running.shutdown_tx.send(true);

        match tokio::time::timeout(timeout, &mut running.task).await {
            Ok(_) => {
                info!(addr = %running.local_addr, "server stopped");
                Ok(())
            }
            Err(_) => {
                warn!(
                    addr = %running.local_addr,
                    ?timeout,
                    "server did not stop in time, aborting"
                );
                running.task.abort();
                Err(ServerError::StopTimeout(timeout))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Address the running server is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}
