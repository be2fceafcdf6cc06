//! Applications shipped with the launcher
//!
//! `berth.builtin:health` answers liveness and health probes. It is the
//! default target, so a bare `berth serve` is useful for checking that an
//! image starts and binds correctly.

use crate::environment::RuntimeEnv;
use crate::launch::{AppRegistry, Application, LaunchError};
use async_trait::async_trait;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

pub const HEALTH_TARGET: &str = "berth.builtin:health";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub runtime_env: RuntimeEnv,
}

/// Health probe application
#[derive(Debug, Default)]
pub struct HealthApp {
    started: OnceLock<Instant>,
}

impl HealthApp {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Application for HealthApp {
    fn router(&self) -> Router {
        let started = *self.started.get_or_init(Instant::now);
        Router::new()
            .route("/health", get(health_check))
            .route("/live", get(liveness_check))
            .with_state(started)
    }

    async fn startup(&self) -> anyhow::Result<()> {
        self.started.get_or_init(Instant::now);
        debug!("Health application started");
        Ok(())
    }
}

async fn health_check(State(started): State<Instant>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: started.elapsed().as_secs(),
        runtime_env: RuntimeEnv::from_env(),
    })
}

async fn liveness_check() -> &'static str {
    "OK"
}

/// Registers every builtin application into `registry`
pub fn register_builtins(registry: &mut AppRegistry) -> Result<(), LaunchError> {
    registry.register(HEALTH_TARGET, || {
        let app: Arc<dyn Application> = Arc::new(HealthApp::new());
        Ok(app)
    })
}

/// Registry holding only the builtin applications
pub fn default_registry() -> Result<AppRegistry, LaunchError> {
    let mut registry = AppRegistry::new();
    register_builtins(&mut registry)?;
    Ok(registry)
}
