//! Serving lifecycle states

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;

/// `Starting` while the application is constructed and the socket bound,
/// `Serving` while listening, `Stopped` before the first start, after a fatal
/// startup error, or after shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Serving(SocketAddr),
    Stopped,
}

impl ServerState {
    pub fn is_serving(&self) -> bool {
        matches!(self, ServerState::Serving(_))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            ServerState::Serving(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Starting => write!(f, "starting"),
            ServerState::Serving(addr) => write!(f, "serving on {}", addr),
            ServerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Waits up to `timeout` for the next `Serving` state and returns its address
pub async fn wait_until_serving(
    rx: &mut watch::Receiver<ServerState>,
    timeout: Duration,
) -> Option<SocketAddr> {
    match tokio::time::timeout(timeout, rx.wait_for(ServerState::is_serving)).await {
        Ok(Ok(state)) => state.local_addr(),
        _ => None,
    }
}
