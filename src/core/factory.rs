//! Factory for building the application state from configuration

use std::sync::Arc;
use tracing::info;

use crate::core::app_state::AppState;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::storage::create_store;

/// Build the shared application state: storage backend, page registry and
/// authenticator, as selected by `config`
pub fn create_app_state(config: Config) -> Result<Arc<AppState>> {
    let store = create_store(&config.storage)?;
    info!("Storage initialized: {:?}", config.storage.storage_type);
    info!("Editor authentication: {:?}", config.auth.mode);
    Ok(Arc::new(AppState::new(store, config)))
}
