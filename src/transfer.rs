//! Bulk import and export of site content as zip archives
//!
//! - files archive: one entry per file, raw bytes
//! - pages archive: one `pages` entry holding a JSON array of pages
//! - groups archive: one entry per group holding its record tree as JSON
//! - site archive: `files.zip`, `pages.zip` and `groups.zip` nested inside
//!
//! Imports overwrite by natural key and are not transactional: the first
//! failing entry stops the import and everything before it stays applied.

use std::io::{Cursor as IoCursor, Read, Write};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::content::editing::check_file_size;
use crate::content::records::{load_all, save, File, Group, Page};
use crate::core::config::LimitsConfig;
use crate::core::error::{Error, Result};
use crate::query::{Cursor, QueryEngine};
use crate::storage::EntityStore;
use crate::types::Key;

/// Entry holding the page list inside a pages archive
pub const PAGES_ENTRY: &str = "pages";
/// Nested archive names inside a site archive
pub const FILES_ARCHIVE: &str = "files.zip";
/// Nested pages archive
pub const PAGES_ARCHIVE: &str = "pages.zip";
/// Nested groups archive
pub const GROUPS_ARCHIVE: &str = "groups.zip";

/// Outcome of a successful import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Entries written to the store
    pub applied: usize,
    /// Empty, directory or unknown entries passed over
    pub skipped: usize,
}

/// Size bounds applied while importing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportLimits {
    /// Exclusive bound for one stored file
    pub max_file_size: usize,
    /// Exclusive bound for any decompressed entry, nested archives included
    pub max_entry_size: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for ImportLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_file_size: limits.max_file_size,
            max_entry_size: limits.max_request_bytes,
        }
    }
}

/// One archive entry read into memory
struct Entry {
    name: String,
    data: Vec<u8>,
}

/// Read the archive entry by entry, calling `apply` for each non-empty file.
///
/// Entries at or above `limit` bytes are rejected; the declared size is
/// checked before reading and the decompressed stream is cut off at `limit`.
fn import_entries(
    archive: &[u8],
    limit: usize,
    mut apply: impl FnMut(Entry) -> Result<bool>,
) -> Result<ImportSummary> {
    let mut zip = ZipArchive::new(IoCursor::new(archive))?;
    let mut summary = ImportSummary::default();

    for index in 0..zip.len() {
        let mut file = zip.by_index(index)?;
        let name = file.name().trim_start_matches('/').to_string();
        if !file.is_file() || file.size() == 0 || name.is_empty() {
            summary.skipped += 1;
            continue;
        }

        let declared = file.size();
        let entry = read_entry(&mut file, &name, declared, limit).map(|data| Entry {
            name: name.clone(),
            data,
        });

        let outcome = entry.and_then(&mut apply);
        match outcome {
            Ok(true) => summary.applied += 1,
            Ok(false) => summary.skipped += 1,
            Err(source) => {
                warn!("Import stopped at {:?} after {} entries", name, summary.applied);
                return Err(Error::PartialImport {
                    entry: name,
                    applied: summary.applied,
                    source: Box::new(source),
                });
            }
        }
    }
    Ok(summary)
}

/// Run one import as a single store batch
fn in_batch(
    store: &dyn EntityStore,
    run: impl FnOnce() -> Result<ImportSummary>,
) -> Result<ImportSummary> {
    let mut run = Some(run);
    let mut summary = ImportSummary::default();
    store.batch(&mut || {
        if let Some(run) = run.take() {
            summary = run()?;
        }
        Ok(())
    })?;
    Ok(summary)
}

fn read_entry(file: &mut impl Read, name: &str, declared: u64, limit: usize) -> Result<Vec<u8>> {
    let declared = usize::try_from(declared).unwrap_or(usize::MAX);
    check_file_size(name, declared, limit)?;
    let mut data = Vec::with_capacity(declared.min(0x100000));
    // headers can lie about the size
    file.take(u64::try_from(limit).unwrap_or(u64::MAX))
        .read_to_end(&mut data)?;
    check_file_size(name, data.len(), limit)?;
    Ok(data)
}

fn write_archive<'a>(entries: impl IntoIterator<Item = (String, &'a [u8])>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(IoCursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(name, options)?;
        zip.write_all(data)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Every file as raw bytes
pub fn export_files(store: &dyn EntityStore) -> Result<Vec<u8>> {
    let files = load_all::<File>(store)?;
    write_archive(files.iter().map(|f| (f.name.clone(), f.data.as_slice())))
}

/// Store every file of the archive under its entry name
pub fn import_files(
    store: &dyn EntityStore,
    archive: &[u8],
    limits: ImportLimits,
) -> Result<ImportSummary> {
    let limit = limits.max_file_size.min(limits.max_entry_size);
    let summary = in_batch(store, || import_entries(archive, limit, |entry| {
        let file = File {
            name: entry.name,
            data: entry.data,
        };
        save(store, File::key(&file.name), &file)?;
        Ok(true)
    }))?;
    info!("Imported files: {:?}", summary);
    Ok(summary)
}

/// All pages as one JSON entry
pub fn export_pages(store: &dyn EntityStore) -> Result<Vec<u8>> {
    let pages = load_all::<Page>(store)?;
    let json = serde_json::to_vec_pretty(&pages)?;
    write_archive([(PAGES_ENTRY.to_string(), json.as_slice())])
}

/// Upsert the pages of every JSON entry, lower-casing their names
pub fn import_pages(
    store: &dyn EntityStore,
    archive: &[u8],
    limits: ImportLimits,
) -> Result<ImportSummary> {
    let summary = in_batch(store, || import_entries(archive, limits.max_entry_size, |entry| {
        let pages: Vec<Page> = serde_json::from_slice(&entry.data)?;
        for mut page in pages {
            page.name = page.name.to_lowercase();
            if page.name.is_empty() {
                return Err(Error::empty_field("Name"));
            }
            save(store, Page::key(&page.name), &page)?;
        }
        Ok(true)
    }))?;
    info!("Imported pages: {:?}", summary);
    Ok(summary)
}

/// Every group's record tree, one JSON entry per group.
///
/// Each tree is materialized with its own round-trip budget.
pub fn export_groups(engine: &QueryEngine) -> Result<Vec<u8>> {
    let groups = load_all::<Group>(engine.store().as_ref())?;
    let mut entries = Vec::with_capacity(groups.len());
    for group in groups {
        let tree = engine.with_fresh_budget().get_tree(&group.name)?;
        entries.push((group.name, serde_json::to_vec_pretty(&tree)?));
    }
    write_archive(entries.iter().map(|(name, json)| (name.clone(), json.as_slice())))
}

/// Create each group and store its tree under fresh keys
pub fn import_groups(
    store: &dyn EntityStore,
    archive: &[u8],
    limits: ImportLimits,
) -> Result<ImportSummary> {
    let summary = in_batch(store, || import_entries(archive, limits.max_entry_size, |entry| {
        let tree: Cursor = serde_json::from_slice(&entry.data)?;
        let group = Group { name: entry.name };
        save(store, Group::key(&group.name), &group)?;
        save_tree(store, &group.name, None, &tree)?;
        Ok(true)
    }))?;
    info!("Imported groups: {:?}", summary);
    Ok(summary)
}

fn save_tree(store: &dyn EntityStore, kind: &str, parent: Option<&Key>, tree: &Cursor) -> Result<()> {
    for record in tree {
        let key = store.put(Key::incomplete(kind, parent.cloned()), record.data.clone())?;
        save_tree(store, kind, Some(&key), &record.children)?;
    }
    Ok(())
}

/// The whole site: files, pages and groups archives nested in one archive
pub fn export_all(engine: &QueryEngine) -> Result<Vec<u8>> {
    let store = engine.store().as_ref();
    let files = export_files(store)?;
    let pages = export_pages(store)?;
    let groups = export_groups(engine)?;
    write_archive([
        (FILES_ARCHIVE.to_string(), files.as_slice()),
        (PAGES_ARCHIVE.to_string(), pages.as_slice()),
        (GROUPS_ARCHIVE.to_string(), groups.as_slice()),
    ])
}

/// Import a site archive; unknown entries are skipped
pub fn import_all(
    store: &dyn EntityStore,
    archive: &[u8],
    limits: ImportLimits,
) -> Result<ImportSummary> {
    let summary = in_batch(store, || import_entries(archive, limits.max_entry_size, |entry| {
        info!("Importing {:?}", entry.name);
        match entry.name.as_str() {
            FILES_ARCHIVE => import_files(store, &entry.data, limits)?,
            PAGES_ARCHIVE => import_pages(store, &entry.data, limits)?,
            GROUPS_ARCHIVE => import_groups(store, &entry.data, limits)?,
            _ => return Ok(false),
        };
        Ok(true)
    }))?;
    info!("Imported site: {:?}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::editing::{new_file, new_group, new_page};
    use crate::content::records::load;
    use crate::query::QueryLimits;
    use crate::storage::{FileStore, MemStore};
    use crate::types::{Fields, TypedValue};
    use std::sync::Arc;

    const MAX: usize = 0x100000;

    fn limits(max_file_size: usize) -> ImportLimits {
        ImportLimits {
            max_file_size,
            ..ImportLimits::default()
        }
    }

    fn archive_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        write_archive(entries.iter().map(|(n, d)| (n.to_string(), *d))).unwrap()
    }

    #[test]
    fn test_files_round_trip() {
        let source = MemStore::new();
        new_file(&source, "a.txt", b"hi", MAX).unwrap();
        new_file(&source, "b.html", b"<p>", MAX).unwrap();
        let archive = export_files(&source).unwrap();

        let target = MemStore::new();
        let summary = import_files(&target, &archive, limits(MAX)).unwrap();
        assert_eq!(summary.applied, 2);
        let a: File = load(&target, &File::key("a.txt")).unwrap();
        let b: File = load(&target, &File::key("b.html")).unwrap();
        assert_eq!(a.data, b"hi");
        assert_eq!(b.data, b"<p>");
    }

    #[test]
    fn test_import_files_skips_empty_and_stops_on_large() {
        let big = vec![1u8; 16];
        let archive = archive_of(&[
            ("empty.txt", &b""[..]),
            ("ok.txt", &b"ok"[..]),
            ("big.bin", big.as_slice()),
            ("late.txt", &b"x"[..]),
        ]);
        let store = MemStore::new();
        let err = import_files(&store, &archive, limits(16)).unwrap_err();
        match err {
            Error::PartialImport { entry, applied, source } => {
                assert_eq!(entry, "big.bin");
                assert_eq!(applied, 1);
                assert!(source.is_client_error());
            }
            other => panic!("unexpected error {other}"),
        }
        // earlier entries stay, later ones never ran
        assert!(store.get(&File::key("ok.txt")).is_ok());
        assert!(store.get(&File::key("late.txt")).is_err());
    }

    #[test]
    fn test_partial_import_is_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_of(&[
            ("ok.txt", &b"ok"[..]),
            ("also.txt", &b"yes"[..]),
            ("big.bin", &[1u8; 16][..]),
        ]);
        {
            let store = FileStore::open(dir.path()).unwrap();
            let err = import_files(&store, &archive, limits(16)).unwrap_err();
            assert!(matches!(err, Error::PartialImport { applied: 2, .. }));
            assert!(!store.is_dirty());
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        let also: File = load(&reopened, &File::key("also.txt")).unwrap();
        assert_eq!(also.data, b"yes");
        assert!(reopened.get(&File::key("big.bin")).is_err());
    }

    #[test]
    fn test_pages_import_lowercases_names() {
        let json = br#"[{"Name": "About", "Base": "base.html", "Template": "about.html"}]"#;
        let archive = archive_of(&[(PAGES_ENTRY, &json[..])]);
        let store = MemStore::new();
        import_pages(&store, &archive, ImportLimits::default()).unwrap();
        let page: Page = load(&store, &Page::key("about")).unwrap();
        assert_eq!(page.name, "about");
        assert_eq!(page.template, "about.html");
    }

    #[test]
    fn test_pages_export_reimports() {
        let source = MemStore::new();
        new_page(&source, "home", "base.html", "home.html").unwrap();
        let target = MemStore::new();
        import_pages(&target, &export_pages(&source).unwrap(), ImportLimits::default()).unwrap();
        assert_eq!(load_all::<Page>(&target).unwrap(), load_all::<Page>(&source).unwrap());
    }

    #[test]
    fn test_groups_round_trip_keeps_nesting() {
        let source = Arc::new(MemStore::new());
        new_group(source.as_ref(), "News").unwrap();
        let mut fields = Fields::new();
        fields.insert("Title".into(), TypedValue::from("root"));
        let root = source.put(Key::incomplete("News", None), fields.clone()).unwrap();
        fields.insert("Title".into(), TypedValue::from("child"));
        source.put(Key::incomplete("News", Some(root)), fields).unwrap();

        let engine = QueryEngine::new(source, QueryLimits::default());
        let archive = export_groups(&engine).unwrap();

        let target = Arc::new(MemStore::new());
        target.put(Key::incomplete("Filler", None), Fields::new()).unwrap();
        let summary = import_groups(target.as_ref(), &archive, ImportLimits::default()).unwrap();
        assert_eq!(summary.applied, 1);

        let engine = QueryEngine::new(target, QueryLimits::default());
        let tree = engine.get_tree("News").unwrap();
        assert_eq!(tree.len(), 1);
        let root = tree.get(0).unwrap();
        assert_eq!(root.data["Title"], TypedValue::from("root"));
        assert_eq!(root.children.get(0).unwrap().data["Title"], TypedValue::from("child"));
    }

    #[test]
    fn test_export_groups_budget_is_per_group() {
        let store = Arc::new(MemStore::new());
        for group in ["A", "B"] {
            new_group(store.as_ref(), group).unwrap();
            for i in 0..3 {
                let mut fields = Fields::new();
                fields.insert("N".into(), TypedValue::Integer(i));
                store.put(Key::incomplete(group, None), fields).unwrap();
            }
        }
        let limits = QueryLimits {
            max_tree_depth: 8,
            max_store_calls: 6,
        };
        let engine = QueryEngine::new(store, limits);
        assert_eq!(engine.with_fresh_budget().get_tree("A").unwrap().len(), 3);

        let archive = export_groups(&engine).unwrap();
        let mut zip = ZipArchive::new(IoCursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 2);
        assert!(zip.by_name("B").is_ok());
    }

    #[test]
    fn test_site_archive_round_trip() {
        let source = Arc::new(MemStore::new());
        new_file(source.as_ref(), "base.html", b"{{ content }}", MAX).unwrap();
        new_page(source.as_ref(), "home", "base.html", "base.html").unwrap();
        new_group(source.as_ref(), "Empty").unwrap();
        let archive = export_all(&QueryEngine::new(source, QueryLimits::default())).unwrap();

        let target = MemStore::new();
        let summary = import_all(&target, &archive, limits(MAX)).unwrap();
        assert_eq!(summary.applied, 3);
        assert!(target.get(&File::key("base.html")).is_ok());
        assert!(target.get(&Page::key("home")).is_ok());
        assert!(target.get(&Group::key("Empty")).is_ok());
    }

    #[test]
    fn test_oversized_json_entry_is_cut_off() {
        let mut json = b"[".to_vec();
        json.resize(4096, b' ');
        json.push(b']');
        let archive = archive_of(&[(PAGES_ENTRY, json.as_slice())]);
        let bounded = ImportLimits {
            max_file_size: MAX,
            max_entry_size: 1024,
        };
        let store = MemStore::new();
        match import_pages(&store, &archive, bounded).unwrap_err() {
            Error::PartialImport { entry, applied, source } => {
                assert_eq!(entry, PAGES_ENTRY);
                assert_eq!(applied, 0);
                assert!(source.is_client_error());
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(import_pages(&store, &archive, ImportLimits::default()).is_ok());
    }

    #[test]
    fn test_read_entry_ignores_understated_size() {
        let data = vec![7u8; 64];
        let err = read_entry(&mut data.as_slice(), "liar.bin", 4, 32).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(read_entry(&mut data.as_slice(), "ok.bin", 64, 65).unwrap().len(), 64);
    }

    #[test]
    fn test_bad_archive() {
        let store = MemStore::new();
        assert!(matches!(
            import_files(&store, b"not a zip", limits(MAX)),
            Err(Error::Archive(_))
        ));
    }
}
