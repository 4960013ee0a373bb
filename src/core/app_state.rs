//! Application State Management
//!
//! This module defines the central AppState that holds all application
//! services. It is built once by [`crate::core::factory::create_app_state`]
//! and shared with every request handler behind an `Arc`.

use std::sync::Arc;

use crate::api::auth::{authenticator, Authenticator};
use crate::api::registry::PageRegistry;
use crate::core::config::Config;
use crate::query::{QueryEngine, QueryLimits};
use crate::storage::SharedStore;

/// Central application state holding all services and components
pub struct AppState {
    /// Entity store holding content and records
    pub store: SharedStore,

    /// Application configuration
    pub config: Config,

    /// Compiled page routes
    pub registry: PageRegistry,

    /// Editor authentication
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Create a new AppState with the given store and configuration
    pub fn new(store: SharedStore, config: Config) -> Self {
        let auth = authenticator(&config.auth);
        Self::with_auth(store, config, auth)
    }

    /// Create a new AppState with an explicit authenticator
    pub fn with_auth(store: SharedStore, config: Config, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            store,
            config,
            registry: PageRegistry::new(),
            auth,
        }
    }

    /// Query engine for one request, with a fresh round-trip budget
    pub fn engine(&self) -> QueryEngine {
        QueryEngine::new(self.store.clone(), QueryLimits::from(&self.config.limits))
    }
}
