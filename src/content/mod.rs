//! Site content: typed records for files, pages, groups and the site config,
//! plus the editor workflows that create, change and delete them.

pub mod editing;
pub mod records;

pub use editing::FormValues;
pub use records::{File, Group, Page, SiteConfig};
