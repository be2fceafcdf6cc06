//! Serving task supervision and reload
//!
//! The supervisor owns at most one [`RunningServer`]. A restart stops the
//! current server gracefully, asks the registry for a fresh application
//! instance, and binds the same address again.

use super::server::{start_server, RunningServer};
use super::state::ServerState;
use super::watcher::SourceWatcher;
use super::{AppRegistry, AppTarget, LaunchError};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// How often the supervisor checks that the serving task is still alive
const LIVENESS_INTERVAL: Duration = Duration::from_millis(500);

pub struct Supervisor {
    registry: Arc<AppRegistry>,
    target: AppTarget,
    bind_addr: SocketAddr,
    shutdown_timeout: Duration,
    state_tx: watch::Sender<ServerState>,
    current: Option<RunningServer>,
    restarts: u64,
}

enum Wake {
    Shutdown,
    Changed(Vec<PathBuf>),
    WatcherClosed,
    ServerExited,
}

impl Supervisor {
    pub fn new(
        registry: Arc<AppRegistry>,
        target: AppTarget,
        bind_addr: SocketAddr,
        shutdown_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        Self {
            registry,
            target,
            bind_addr,
            shutdown_timeout,
            state_tx,
            current: None,
            restarts: 0,
        }
    }

    /// Receiver observing every state transition
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    pub fn target(&self) -> &AppTarget {
        &self.target
    }

    /// Number of completed restarts
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Starts serving. A no-op returning the current address when already
    /// serving.
    ///
    /// When configured with port 0 the first bound port is kept, so restarts
    /// come back on the same address.
    pub async fn start(&mut self) -> Result<SocketAddr, LaunchError> {
        if let Some(server) = &self.current {
            return Ok(server.local_addr());
        }

        self.state_tx.send_replace(ServerState::Starting);
        match start_server(&self.registry, &self.target, self.bind_addr).await {
            Ok(server) => {
                let addr = server.local_addr();
                if self.bind_addr.port() == 0 {
                    self.bind_addr = addr;
                }
                self.current = Some(server);
                self.state_tx.send_replace(ServerState::Serving(addr));
                Ok(addr)
            }
            Err(e) => {
                self.state_tx.send_replace(ServerState::Stopped);
                Err(e)
            }
        }
    }

    /// Stops the current server, if any, within the shutdown timeout
    pub async fn stop(&mut self) -> Result<(), LaunchError> {
        let result = match self.current.take() {
            Some(server) => server.stop(self.shutdown_timeout).await,
            None => Ok(()),
        };
        self.state_tx.send_replace(ServerState::Stopped);
        result
    }

    /// Stops the current server and starts a fresh application instance
    pub async fn restart(&mut self) -> Result<SocketAddr, LaunchError> {
        if let Err(e) = self.stop().await {
            error!("Error while stopping {} for restart: {}", self.target, e);
        }
        let addr = self.start().await?;
        self.restarts += 1;
        info!("Restarted {} (restart #{})", self.target, self.restarts);
        Ok(addr)
    }

    /// Serves until `shutdown` resolves, restarting on source changes when a
    /// watcher is given.
    ///
    /// Failing to start the first time is fatal. A failed restart is logged
    /// and the supervisor waits for the next change to try again. A shutdown
    /// that arrives while the first start is still running abandons it.
    pub async fn run<F>(
        mut self,
        shutdown: F,
        mut watcher: Option<SourceWatcher>,
    ) -> Result<(), LaunchError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let started = tokio::select! {
            result = self.start() => Some(result),
            _ = &mut shutdown => None,
        };
        match started {
            Some(result) => {
                result?;
            }
            None => {
                info!("Shutdown requested while {} was starting", self.target);
                return self.stop().await;
            }
        }
        let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);

        loop {
            let wake = tokio::select! {
                _ = &mut shutdown => Wake::Shutdown,
                batch = next_change(&mut watcher) => match batch {
                    Some(paths) => Wake::Changed(paths),
                    None => Wake::WatcherClosed,
                },
                _ = liveness.tick() => {
                    if self.current.as_ref().map(RunningServer::is_finished).unwrap_or(false) {
                        Wake::ServerExited
                    } else {
                        continue;
                    }
                }
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Changed(paths) => {
                    info!(
                        "Detected changes in {} file(s), first: {}",
                        paths.len(),
                        paths
                            .first()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default()
                    );
                    if let Err(e) = self.restart().await {
                        error!("Restart of {} failed: {}", self.target, e);
                    }
                }
                Wake::WatcherClosed => {
                    error!("Source watcher stopped; reload disabled");
                    watcher = None;
                }
                Wake::ServerExited => {
                    error!("Serving task for {} exited unexpectedly", self.target);
                    self.stop().await?;
                    return Err(LaunchError::Serve(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "serving task exited",
                    )));
                }
            }
        }

        self.stop().await
    }
}

async fn next_change(watcher: &mut Option<SourceWatcher>) -> Option<Vec<PathBuf>> {
    match watcher {
        Some(w) => w.next_batch().await,
        None => std::future::pending().await,
    }
}
