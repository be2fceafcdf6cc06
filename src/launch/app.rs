//! Application seam
//!
//! The launcher never looks applications up by reflection. An application is
//! anything implementing [`Application`]; it is made reachable by registering
//! a factory under a target in [`super::AppRegistry`].

use async_trait::async_trait;
use axum::Router;
use std::sync::Arc;

/// An HTTP application the launcher can serve
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Request-handling entry point
    fn router(&self) -> Router;

    /// Runs before the socket is bound. An error aborts startup.
    async fn startup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after the server has stopped accepting connections
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Produces a fresh application instance. Called once per (re)start, so a
/// reload picks up whatever the factory reads at construction time.
pub type AppFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Application>> + Send + Sync>;

/// Application made of a router builder and no lifespan hooks
pub struct RouterApp<F>
where
    F: Fn() -> Router + Send + Sync + 'static,
{
    build: F,
}

impl<F> RouterApp<F>
where
    F: Fn() -> Router + Send + Sync + 'static,
{
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

#[async_trait]
impl<F> Application for RouterApp<F>
where
    F: Fn() -> Router + Send + Sync + 'static,
{
    fn router(&self) -> Router {
        (self.build)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_router_app_serves_routes() {
        let app = RouterApp::new(|| Router::new().route("/ping", get(|| async { "pong" })));
        assert!(app.startup().await.is_ok());

        let response = app
            .router()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"pong");
        assert!(app.shutdown().await.is_ok());
    }
}
