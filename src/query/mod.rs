//! Query and cursor engine
//!
//! Everything templates and the editor read goes through [`QueryEngine`]:
//! exact-parent listings on top of the store's ancestor scans, lookups that
//! turn "not found" into a zero record, pagination arithmetic and recursive
//! tree materialization.

pub mod engine;
pub mod record;

pub use engine::{QueryEngine, QueryLimits};
pub use record::{Cursor, Paging, Record, RequestParams};
