//! Compiled page routes.
//!
//! The registry is built lazily on the first site request and rebuilt after
//! every editor change. One mutex guards both the "built" flag and the route
//! map, so concurrent first requests build it once. A failed rebuild leaves
//! the registry invalidated and the next site request tries again.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::content::records::{load_all, Page};
use crate::core::error::Result;
use crate::storage::EntityStore;
use crate::template::{compile_page, CompiledPage};

/// Outcome of a registry build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Routes mounted, e.g. `/about`
    pub mounted: Vec<String>,
    /// Pages that failed to compile, with the reason
    pub skipped: Vec<(String, String)>,
}

#[derive(Default)]
struct Routes {
    built: bool,
    pages: HashMap<String, Arc<CompiledPage>>,
}

/// Route path to compiled page
#[derive(Default)]
pub struct PageRegistry {
    routes: Mutex<Routes>,
    builds: AtomicUsize,
}

impl PageRegistry {
    /// Empty, unbuilt registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the store unless already built
    pub fn ensure_built(&self, store: &dyn EntityStore) -> Result<()> {
        let mut routes = self.routes.lock();
        if !routes.built {
            self.build(&mut routes, store)?;
        }
        Ok(())
    }

    /// Builds completed since creation
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn build(&self, routes: &mut Routes, store: &dyn EntityStore) -> Result<BuildReport> {
        let report = build_into(routes, store)?;
        let count = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Page registry build #{}", count);
        Ok(report)
    }

    /// Compiled page mounted at `path`
    pub fn lookup(&self, path: &str) -> Option<Arc<CompiledPage>> {
        self.routes.lock().pages.get(path).cloned()
    }

    /// Recompile every page, replacing the current routes
    pub fn rebuild(&self, store: &dyn EntityStore) -> Result<BuildReport> {
        let mut routes = self.routes.lock();
        self.build(&mut routes, store)
    }

    /// Drop all routes; the next `ensure_built` recompiles
    pub fn invalidate(&self) {
        let mut routes = self.routes.lock();
        routes.built = false;
        routes.pages.clear();
    }

    /// Whether no page is mounted
    pub fn is_empty(&self) -> bool {
        self.routes.lock().pages.is_empty()
    }
}

fn build_into(routes: &mut Routes, store: &dyn EntityStore) -> Result<BuildReport> {
    let pages = load_all::<Page>(store)?;
    let mut report = BuildReport::default();
    let mut mounted = HashMap::new();

    for page in pages {
        if page.name.is_empty() || page.template.is_empty() {
            continue;
        }
        match compile_page(store, &page) {
            Ok(compiled) => {
                report.mounted.push(compiled.path().to_string());
                mounted.insert(compiled.path().to_string(), Arc::new(compiled));
            }
            Err(e) => {
                warn!("Skipping page {:?}: {}", page.name, e);
                report.skipped.push((page.name, e.to_string()));
            }
        }
    }

    routes.pages = mounted;
    // An empty site stays unbuilt so the first page added is picked up
    routes.built = !routes.pages.is_empty();
    info!(
        "Page registry built: {} mounted, {} skipped",
        report.mounted.len(),
        report.skipped.len()
    );
    Ok(report)
}
