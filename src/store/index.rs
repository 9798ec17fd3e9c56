//! Corpus indexes: where to find a dataset when a reference carries no usable hint

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::source::{DocumentSource, Location, SourceError};
use crate::config::CONFIG_FILE_NAME;
use crate::error::LoadError;
use crate::models::{DatasetKey, DatasetKind, Document};

/// Maps dataset identities to loadable locations
pub trait CorpusIndex: Send + Sync {
    /// Location registered for `key`, if any
    fn locate(&self, key: &DatasetKey) -> Option<Location>;

    /// Turn a reference's relative location hint into a reachable location
    fn resolve_hint(&self, hint: &str) -> Option<Location>;

    /// Every dataset the index knows about, in key order
    fn datasets(&self) -> Vec<DatasetKey>;

    /// Kinds under which `id` is registered
    fn kinds_of(&self, id: &Uuid) -> Vec<DatasetKind> {
        self.datasets()
            .into_iter()
            .filter(|key| key.id == *id)
            .map(|key| key.kind)
            .collect()
    }

    /// Datasets found at more than one location with differing content
    fn conflicts(&self) -> Vec<LoadError> {
        Vec::new()
    }
}

/// Normalize a relative hint such as `../flows/x.yml` to a corpus-root-relative path.
///
/// Hints are written relative to the referring document, which always sits one
/// directory below the corpus root, so leading `.` and `..` segments are dropped.
pub fn normalize_hint(hint: &str) -> Option<String> {
    let hint = hint.trim().replace('\\', "/");
    let hint = hint.strip_prefix("file://").unwrap_or(&hint);
    let segments: Vec<&str> = hint
        .split('/')
        .skip_while(|s| s.is_empty() || *s == "." || *s == "..")
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() || segments.contains(&"..") {
        return None;
    }
    Some(segments.join("/"))
}

/// Index built by scanning a corpus directory on disk
#[derive(Debug, Clone)]
pub struct FsCorpusIndex {
    root: PathBuf,
    entries: BTreeMap<DatasetKey, Location>,
    conflicts: Vec<LoadError>,
}

impl FsCorpusIndex {
    /// Walk `root` and register every parseable document with one of `extensions`.
    /// Unparseable files are skipped here; they surface again if something references them.
    /// The first path in sorted order is indexed; later copies with other content are conflicts.
    pub fn scan(root: &Path, extensions: &[String], source: &dyn DocumentSource) -> Result<Self> {
        let mut entries: BTreeMap<DatasetKey, Location> = BTreeMap::new();
        let mut digests: HashMap<DatasetKey, String> = HashMap::new();
        let mut conflicts = Vec::new();

        if !root.is_dir() {
            anyhow::bail!("Corpus root {} is not a directory", root.display());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            let path = entry.path();
            if entry.file_type().is_file()
                && entry.file_name() != CONFIG_FILE_NAME
                && Self::has_extension(path, extensions)
            {
                files.push(path.to_path_buf());
            }
        }
        files.sort();

        for path in files {
            let location = Location::from_path(&path);
            match source.read(&location) {
                Ok(doc) => {
                    let key = doc.key();
                    let digest = doc.content_digest();
                    match (entries.get(&key), digests.get(&key)) {
                        (Some(existing), Some(first)) if *first != digest => {
                            warn!("{key} differs between {existing} and {location}");
                            conflicts.push(LoadError::ConflictingContent {
                                key,
                                first: existing.to_string(),
                                second: location.to_string(),
                            });
                        }
                        (Some(existing), _) => {
                            debug!("{key} also found at {location}, keeping {existing}");
                        }
                        (None, _) => {
                            digests.insert(key, digest);
                            entries.insert(key, location);
                        }
                    }
                }
                Err(SourceError::Parse(reason)) => {
                    warn!("Skipping {}: {reason}", path.display());
                }
                Err(e) => {
                    warn!("Skipping {}: {e:?}", path.display());
                }
            }
        }

        debug!("Indexed {} datasets under {}", entries.len(), root.display());

        Ok(Self {
            root: root.to_path_buf(),
            entries,
            conflicts,
        })
    }

    fn has_extension(path: &Path, extensions: &[String]) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

}

impl CorpusIndex for FsCorpusIndex {
    fn locate(&self, key: &DatasetKey) -> Option<Location> {
        self.entries.get(key).cloned()
    }

    fn resolve_hint(&self, hint: &str) -> Option<Location> {
        let relative = normalize_hint(hint)?;
        let path = self.root.join(relative);
        path.is_file().then(|| Location::from_path(&path))
    }

    fn datasets(&self) -> Vec<DatasetKey> {
        self.entries.keys().copied().collect()
    }

    fn conflicts(&self) -> Vec<LoadError> {
        self.conflicts.clone()
    }
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    Document(Document),
    Broken(String),
}

/// An in-memory corpus acting as both index and source.
///
/// Documents inserted with [`MemoryCorpus::insert`] live at `<kind dir>/<id>.yml`, so
/// ILCD-style hints such as `../flows/<id>.yml` resolve against it.
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    entries: Mutex<HashMap<Location, MemoryEntry>>,
    index: Mutex<BTreeMap<DatasetKey, Location>>,
    reads: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read sleep, to simulate slow storage
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn canonical_location(key: &DatasetKey) -> Location {
        Location::new(format!("{}/{}.yml", key.kind.directory_name(), key.id))
    }

    /// Store `doc` at its canonical location and index it
    pub fn insert(&self, doc: Document) -> Location {
        let key = doc.key();
        let location = Self::canonical_location(&key);
        self.insert_at(location.clone(), doc);
        if let Ok(mut index) = self.index.lock() {
            index.insert(key, location.clone());
        }
        location
    }

    /// Store `doc` at an arbitrary location without indexing it
    pub fn insert_at(&self, location: Location, doc: Document) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(location, MemoryEntry::Document(doc));
        }
    }

    /// Register an unparseable file for `key`
    pub fn insert_broken(&self, key: DatasetKey, reason: &str) -> Location {
        let location = Self::canonical_location(&key);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(location.clone(), MemoryEntry::Broken(reason.to_string()));
        }
        if let Ok(mut index) = self.index.lock() {
            index.insert(key, location.clone());
        }
        location
    }

    pub fn remove(&self, key: &DatasetKey) {
        let location = self.index.lock().ok().and_then(|mut index| index.remove(key));
        if let (Some(location), Ok(mut entries)) = (location, self.entries.lock()) {
            entries.remove(&location);
        }
    }

    /// Number of reads served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DocumentSource for MemoryCorpus {
    fn read(&self, location: &Location) -> Result<Document, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        let entries = self
            .entries
            .lock()
            .map_err(|_| SourceError::Io("memory corpus lock poisoned".to_string()))?;
        match entries.get(location) {
            Some(MemoryEntry::Document(doc)) => Ok(doc.clone()),
            Some(MemoryEntry::Broken(reason)) => Err(SourceError::Parse(reason.clone())),
            None => Err(SourceError::NotFound),
        }
    }
}

impl CorpusIndex for MemoryCorpus {
    fn locate(&self, key: &DatasetKey) -> Option<Location> {
        self.index.lock().ok()?.get(key).cloned()
    }

    fn resolve_hint(&self, hint: &str) -> Option<Location> {
        let location = Location::new(normalize_hint(hint)?);
        let entries = self.entries.lock().ok()?;
        entries.contains_key(&location).then_some(location)
    }

    fn datasets(&self) -> Vec<DatasetKey> {
        self.index
            .lock()
            .map(|index| index.keys().copied().collect())
            .unwrap_or_default()
    }
}
