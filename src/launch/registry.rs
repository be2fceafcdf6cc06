use super::app::{AppFactory, Application, RouterApp};
use super::{AppTarget, LaunchError};
use axum::Router;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Explicit registration table from targets to application factories
#[derive(Default)]
pub struct AppRegistry {
    apps: BTreeMap<AppTarget, AppFactory>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory. Registering the same target twice replaces the
    /// earlier factory.
    pub fn register<F>(&mut self, target: &str, factory: F) -> Result<(), LaunchError>
    where
        F: Fn() -> anyhow::Result<Arc<dyn Application>> + Send + Sync + 'static,
    {
        let target = AppTarget::parse(target)?;
        if self.apps.contains_key(&target) {
            warn!("Replacing application registered at {}", target);
        }
        debug!("Registered application {}", target);
        self.apps.insert(target, Arc::new(factory));
        Ok(())
    }

    /// Registers a plain router builder with no lifespan hooks
    pub fn register_router<F>(&mut self, target: &str, build: F) -> Result<(), LaunchError>
    where
        F: Fn() -> Router + Send + Sync + Clone + 'static,
    {
        self.register(target, move || {
            let app: Arc<dyn Application> = Arc::new(RouterApp::new(build.clone()));
            Ok(app)
        })
    }

    /// Constructs the application registered at `target`.
    ///
    /// Distinguishes a module with nothing registered under it from a module
    /// that exists but lacks the attribute; a factory error is an
    /// application construction failure.
    pub fn resolve(&self, target: &AppTarget) -> Result<Arc<dyn Application>, LaunchError> {
        let factory = match self.apps.get(target) {
            Some(factory) => factory,
            None => {
                let module_known = self.apps.keys().any(|t| t.module() == target.module());
                return Err(if module_known {
                    LaunchError::AttributeNotFound {
                        module: target.module().to_string(),
                        attribute: target.attribute().to_string(),
                    }
                } else {
                    LaunchError::ModuleNotFound {
                        module: target.module().to_string(),
                    }
                });
            }
        };

        factory().map_err(|e| LaunchError::AppConstruction {
            target: target.to_string(),
            message: format!("{:#}", e),
        })
    }

    pub fn contains(&self, target: &AppTarget) -> bool {
        self.apps.contains_key(target)
    }

    /// Registered targets in sorted order
    pub fn targets(&self) -> Vec<AppTarget> {
        self.apps.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("targets", &self.apps.keys().map(ToString::to_string).collect::<Vec<_>>())
            .finish()
    }
}
