//! HTTP serving task

use super::app::Application;
use super::{AppRegistry, AppTarget, LaunchError};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Resolves `target`, runs its startup hook, binds `addr` and spawns the
/// serving task.
///
/// The application is constructed before the socket is bound, so an
/// unresolvable target never leaves a listening socket behind.
pub async fn start_server(
    registry: &AppRegistry,
    target: &AppTarget,
    addr: SocketAddr,
) -> Result<RunningServer, LaunchError> {
    let app = registry.resolve(target)?;

    app.startup().await.map_err(|e| LaunchError::Startup {
        target: target.to_string(),
        message: format!("{:#}", e),
    })?;

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(source) => {
            if let Err(e) = app.shutdown().await {
                warn!("Shutdown hook for {} failed: {:#}", target, e);
            }
            return Err(LaunchError::Bind { addr, source });
        }
    };
    let local_addr = listener.local_addr().map_err(LaunchError::Serve)?;

    let router = app.router().layer(TraceLayer::new_for_http());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    info!("Serving {} on http://{}", target, local_addr);

    Ok(RunningServer {
        target: target.clone(),
        app,
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        handle,
    })
}

/// Handle to a spawned serving task
pub struct RunningServer {
    target: AppTarget,
    app: Arc<dyn Application>,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<io::Result<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn target(&self) -> &AppTarget {
        &self.target
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops accepting connections and waits up to `timeout` for in-flight
    /// requests, then aborts. The application's shutdown hook runs either way.
    pub async fn stop(mut self, timeout: Duration) -> Result<(), LaunchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let result = match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(LaunchError::Serve(e)),
            Ok(Err(join_err)) => Err(LaunchError::Serve(io::Error::new(
                io::ErrorKind::Other,
                join_err.to_string(),
            ))),
            Err(_) => {
                warn!(
                    "Graceful shutdown of {} exceeded {:?}; aborting open connections",
                    self.target, timeout
                );
                self.handle.abort();
                let _ = (&mut self.handle).await;
                Ok(())
            }
        };

        if let Err(e) = self.app.shutdown().await {
            warn!("Shutdown hook for {} failed: {:#}", self.target, e);
        }
        info!("Stopped serving {} on {}", self.target, self.local_addr);
        result
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        // No-op when stop() already joined the task
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct HookedApp {
        fail_startup: bool,
        shut_down: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Application for HookedApp {
        fn router(&self) -> Router {
            Router::new().route("/", get(|| async { "hooked" }))
        }

        async fn startup(&self) -> anyhow::Result<()> {
            if self.fail_startup {
                anyhow::bail!("database unreachable");
            }
            Ok(())
        }

        async fn shutdown(&self) -> anyhow::Result<()> {
            self.shut_down.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn registry(fail_startup: bool, shut_down: Arc<AtomicBool>) -> AppRegistry {
        let mut registry = AppRegistry::new();
        registry
            .register("svc.main:app", move || {
                let app: Arc<dyn Application> = Arc::new(HookedApp {
                    fail_startup,
                    shut_down: shut_down.clone(),
                });
                Ok(app)
            })
            .unwrap();
        registry
    }

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_start_and_stop_runs_hooks() {
        let shut_down = Arc::new(AtomicBool::new(false));
        let registry = registry(false, shut_down.clone());
        let target = AppTarget::parse("svc.main:app").unwrap();

        let server = start_server(&registry, &target, local()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(!server.is_finished());

        server.stop(Duration::from_secs(5)).await.unwrap();
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_startup_hook_failure() {
        let registry = registry(true, Arc::new(AtomicBool::new(false)));
        let target = AppTarget::parse("svc.main:app").unwrap();

        let err = start_server(&registry, &target, local()).await.err().unwrap();
        match err {
            LaunchError::Startup { message, .. } => assert!(message.contains("database unreachable")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();
        let shut_down = Arc::new(AtomicBool::new(false));
        let registry = registry(false, shut_down.clone());
        let target = AppTarget::parse("svc.main:app").unwrap();

        let err = start_server(&registry, &target, addr).await.err().unwrap();
        assert!(matches!(err, LaunchError::Bind { .. }));
        // the application was started, so it must be shut down again
        assert!(shut_down.load(Ordering::SeqCst));
    }
}
