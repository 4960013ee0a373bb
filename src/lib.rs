//! SCMS - a simple content management system
//!
//! Content lives in a schemaless, hierarchical record store: uploaded files,
//! page definitions and groups of free-form records. Pages are composed from
//! a base template and a content template and rendered per request against a
//! read-only query object (`site`) that can list, page through and walk record
//! trees. A small editor under `/editor` manages everything, including bulk
//! import and export as zip archives.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;
pub mod types;

// Storage and queries
pub mod query;
pub mod storage;

// Content, templates and transfer
pub mod content;
pub mod template;
pub mod transfer;

// HTTP surface
pub mod api;

// Re-export commonly used items for convenience
pub use crate::core::{create_app_state, AppState, Config, Error, Result};

use crate::core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing. `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={},tower_http=info", NAME, config.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format.as_str() {
        "compact" => builder.compact().try_init(),
        "full" => builder.try_init(),
        _ => builder.pretty().try_init(),
    };
    if installed.is_ok() {
        tracing::info!("Initializing {} v{}", NAME, VERSION);
    }
}
