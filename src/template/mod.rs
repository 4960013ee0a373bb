//! Page templates: the `site` query object, its result views and the
//! two-stage compiler.

pub mod compiler;
pub mod context;
pub mod helpers;
pub mod objects;

pub use compiler::{compile_page, CompiledPage};
pub use context::TemplateContext;
