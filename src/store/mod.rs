//! Loading and caching of dataset documents, keyed by identity

pub mod index;
pub mod source;

#[cfg(test)]
mod tests;

use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use self::index::{CorpusIndex, FsCorpusIndex, MemoryCorpus};
use self::source::{DocumentSource, FsSource, Location, SourceError};
use crate::config::VellumConfig;
use crate::error::LoadError;
use crate::models::{DatasetKey, DatasetRef, Document};

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

pub type LoadOutcome = Result<Arc<Document>, LoadError>;

struct CachedDocument {
    document: Arc<Document>,
    origin: Location,
    digest: String,
    /// Locations already compared against this entry
    verified: HashSet<Location>,
}

struct InFlight {
    hint: Option<Location>,
    rx: watch::Receiver<Option<LoadOutcome>>,
}

#[derive(Default)]
struct StoreState {
    cache: HashMap<DatasetKey, CachedDocument>,
    in_flight: HashMap<DatasetKey, InFlight>,
    /// Copies that differ from the cached one, by the location they were read from
    conflicts: HashMap<DatasetKey, BTreeMap<Location, LoadError>>,
}

/// One in-flight load. The flight is unregistered before waiters are woken.
struct Flight<'a> {
    store: &'a DocumentStore,
    key: DatasetKey,
    tx: watch::Sender<Option<LoadOutcome>>,
    finished: bool,
}

impl Flight<'_> {
    fn finish(mut self, outcome: &LoadOutcome) {
        self.store.state().in_flight.remove(&self.key);
        self.finished = true;
        self.tx.send_replace(Some(outcome.clone()));
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.state().in_flight.remove(&self.key);
        }
    }
}

enum Role<'a> {
    Cached(Arc<Document>),
    Leader(Flight<'a>),
    Follower {
        rx: watch::Receiver<Option<LoadOutcome>>,
        /// The leader reads every location this caller would
        covers_hint: bool,
    },
}

/// What a leader fetched from storage
struct Fetched {
    document: Document,
    origin: Location,
    read: Vec<Location>,
}

/// Process-scoped document cache over a corpus index and a parsing source.
///
/// Concurrent loads of one key share a single read. Failed loads are never cached.
/// When the index knows a dataset, its indexed copy is the one cached; a hinted copy
/// at another location is read and compared against it, whichever load comes first.
pub struct DocumentStore {
    index: Arc<dyn CorpusIndex>,
    source: Arc<dyn DocumentSource>,
    timeout: Duration,
    state: Mutex<StoreState>,
}

impl DocumentStore {
    pub fn new(index: Arc<dyn CorpusIndex>, source: Arc<dyn DocumentSource>) -> Self {
        Self {
            index,
            source,
            timeout: DEFAULT_LOAD_TIMEOUT,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// A store serving an in-memory corpus
    pub fn in_memory(corpus: Arc<MemoryCorpus>) -> Self {
        Self::new(corpus.clone(), corpus)
    }

    /// Scan a corpus directory and open a store over it
    pub fn open_dir(root: &Path, config: &VellumConfig) -> Result<Self> {
        let source = FsSource::new();
        let index = FsCorpusIndex::scan(root, &config.extensions, &source)?;
        Ok(Self::new(Arc::new(index), Arc::new(source)).with_timeout(config.load_timeout()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn index(&self) -> &dyn CorpusIndex {
        self.index.as_ref()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load the document `reference` points at.
    ///
    /// The location hint is read first and the indexed location after it. When both hold
    /// the dataset, the indexed copy is returned and the hinted one is compared against it.
    pub async fn load(&self, reference: &DatasetRef) -> LoadOutcome {
        let key = reference.key();
        let hint = reference
            .location_hint
            .as_deref()
            .and_then(|hint| self.index.resolve_hint(hint));

        loop {
            match self.claim(key, hint.as_ref()) {
                Role::Cached(document) => return Ok(document),
                Role::Follower { mut rx, covers_hint } => {
                    debug!("Waiting on in-flight load of {key}");
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        // The leader was dropped before finishing
                        Err(_) => None,
                    };
                    match outcome {
                        Some(outcome) if covers_hint => return outcome,
                        // Claim again; our own hint still has to be read
                        _ => {}
                    }
                }
                Role::Leader(flight) => {
                    let outcome = self.lead(key, hint.clone()).await;
                    flight.finish(&outcome);
                    return outcome;
                }
            }
        }
    }

    fn claim(&self, key: DatasetKey, hint: Option<&Location>) -> Role<'_> {
        let mut state = self.state();

        if let Some(cached) = state.cache.get(&key) {
            let unverified_hint = hint.is_some_and(|location| !cached.verified.contains(location));
            if !unverified_hint {
                return Role::Cached(cached.document.clone());
            }
        }

        if let Some(flight) = state.in_flight.get(&key) {
            return Role::Follower {
                rx: flight.rx.clone(),
                covers_hint: hint.is_none() || flight.hint.as_ref() == hint,
            };
        }

        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(
            key,
            InFlight {
                hint: hint.cloned(),
                rx,
            },
        );
        Role::Leader(Flight {
            store: self,
            key,
            tx,
            finished: false,
        })
    }

    async fn lead(&self, key: DatasetKey, hint: Option<Location>) -> LoadOutcome {
        let cached = self
            .state()
            .cache
            .get(&key)
            .map(|c| (c.document.clone(), c.origin.clone(), c.digest.clone()));

        match (cached, hint) {
            (Some((document, origin, digest)), Some(location)) => {
                self.verify(key, document, &origin, &digest, location).await
            }
            (Some((document, _, _)), None) => Ok(document),
            (None, hint) => {
                let fetched = self.fetch(key, hint).await?;
                let document = Arc::new(fetched.document);
                let digest = document.content_digest();
                debug!("Cached {key} from {}", fetched.origin);
                let mut state = self.state();
                state.cache.insert(
                    key,
                    CachedDocument {
                        document: document.clone(),
                        origin: fetched.origin,
                        digest,
                        verified: fetched.read.into_iter().collect(),
                    },
                );
                Ok(document)
            }
        }
    }

    /// Compare the copy at `location` with the cached one; the cached document always wins
    async fn verify(
        &self,
        key: DatasetKey,
        document: Arc<Document>,
        origin: &Location,
        digest: &str,
        location: Location,
    ) -> LoadOutcome {
        match self.read(key, &location).await {
            Ok(other) if other.key() == key => self.compare(key, origin, digest, &location, &other),
            Ok(_) => debug!("{location} does not hold {key}"),
            Err(e) => debug!("Could not compare {key} at {location}: {e}"),
        }

        if let Some(cached) = self.state().cache.get_mut(&key) {
            cached.verified.insert(location);
        }
        Ok(document)
    }

    /// Record a conflict when `copy`, read from `location`, differs from the copy at `origin`
    fn compare(&self, key: DatasetKey, origin: &Location, digest: &str, location: &Location, copy: &Document) {
        if copy.content_digest() == digest {
            debug!("{key} at {location} matches the copy at {origin}");
            return;
        }
        warn!("{key} differs between {origin} and {location}");
        self.state()
            .conflicts
            .entry(key)
            .or_default()
            .entry(location.clone())
            .or_insert_with(|| LoadError::ConflictingContent {
                key,
                first: origin.to_string(),
                second: location.to_string(),
            });
    }

    async fn fetch(&self, key: DatasetKey, hint: Option<Location>) -> Result<Fetched, LoadError> {
        let indexed = self.index.locate(&key);
        let mut candidates: Vec<Location> = hint
            .into_iter()
            .filter(|location| Some(location) != indexed.as_ref())
            .collect();
        candidates.extend(indexed.clone());

        let mut read = Vec::new();
        let mut found: Vec<(Location, Document)> = Vec::new();
        let mut failure = None;
        for location in candidates {
            let result = self.read(key, &location).await;
            read.push(location.clone());
            match result {
                Ok(document) if document.id != key.id => {
                    debug!("{location} declares {}, not {key}", document.id);
                }
                Ok(document) if document.kind() != key.kind => {
                    failure.get_or_insert(LoadError::KindMismatch {
                        id: key.id,
                        expected: key.kind,
                        found: document.kind(),
                    });
                }
                Ok(document) => found.push((location, document)),
                Err(LoadError::NotFound { .. }) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        // The indexed copy wins so the cached content never depends on which hint came first
        let preferred = found
            .iter()
            .position(|(location, _)| Some(location) == indexed.as_ref())
            .or_else(|| (!found.is_empty()).then_some(0));
        if let Some(position) = preferred {
            let (origin, document) = found.swap_remove(position);
            if let Some((location, copy)) = found.pop() {
                self.compare(key, &origin, &document.content_digest(), &location, &copy);
            }
            return Ok(Fetched {
                document,
                origin,
                read,
            });
        }

        if let Some(failure) = failure {
            return Err(failure);
        }

        // The id may exist under another kind
        if let Some(found) = self.index.kinds_of(&key.id).into_iter().find(|k| *k != key.kind) {
            return Err(LoadError::KindMismatch {
                id: key.id,
                expected: key.kind,
                found,
            });
        }

        Err(LoadError::NotFound {
            key,
            searched: read.iter().map(Location::to_string).collect(),
        })
    }

    /// One bounded read through the source, on a blocking worker thread
    async fn read(&self, key: DatasetKey, location: &Location) -> Result<Document, LoadError> {
        debug!("Reading {key} from {location}");
        let source = self.source.clone();
        let target = location.clone();
        let task = tokio::task::spawn_blocking(move || source.read(&target));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                warn!("Reading {key} from {location} timed out");
                Err(LoadError::Timeout {
                    key,
                    after_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(join_error)) => Err(LoadError::Unparseable {
                key,
                location: location.to_string(),
                reason: format!("reader failed: {join_error}"),
            }),
            Ok(Ok(Err(SourceError::NotFound))) => Err(LoadError::NotFound {
                key,
                searched: vec![location.to_string()],
            }),
            Ok(Ok(Err(SourceError::Io(reason) | SourceError::Parse(reason)))) => {
                Err(LoadError::Unparseable {
                    key,
                    location: location.to_string(),
                    reason,
                })
            }
            Ok(Ok(Ok(document))) => Ok(document),
        }
    }

    /// Drop the cached document for `key`, if any
    pub fn invalidate(&self, key: &DatasetKey) {
        let mut state = self.state();
        state.cache.remove(key);
        state.conflicts.remove(key);
    }

    /// Drop every cached document, for a corpus reload
    pub fn invalidate_all(&self) {
        let mut state = self.state();
        state.cache.clear();
        state.conflicts.clear();
    }

    pub fn cached(&self, key: &DatasetKey) -> Option<Arc<Document>> {
        self.state().cache.get(key).map(|c| c.document.clone())
    }

    pub fn cached_count(&self) -> usize {
        self.state().cache.len()
    }

    /// The content conflict recorded for `key`: one found by the index scan, or else one
    /// found while loading, by location order
    pub fn conflict(&self, key: &DatasetKey) -> Option<LoadError> {
        if let Some(conflict) = self.index.conflicts().into_iter().find(|c| conflict_key(c) == Some(*key)) {
            return Some(conflict);
        }
        self.state()
            .conflicts
            .get(key)
            .and_then(|by_location| by_location.values().next().cloned())
    }

    /// The conflict between the copy `reference`'s location hint points at and the cached copy
    pub fn reference_conflict(&self, reference: &DatasetRef) -> Option<LoadError> {
        let location = self.index.resolve_hint(reference.location_hint.as_deref()?)?;
        self.state()
            .conflicts
            .get(&reference.key())?
            .get(&location)
            .cloned()
    }

    /// Every recorded conflict, index scan first, each reported once
    pub fn conflicts(&self) -> Vec<LoadError> {
        let mut all = self.index.conflicts();
        let state = self.state();
        let mut keys: Vec<&DatasetKey> = state.conflicts.keys().collect();
        keys.sort();
        for conflict in keys.into_iter().flat_map(|key| state.conflicts[key].values()) {
            if !all.contains(conflict) {
                all.push(conflict.clone());
            }
        }
        all
    }
}

fn conflict_key(error: &LoadError) -> Option<DatasetKey> {
    match error {
        LoadError::ConflictingContent { key, .. } => Some(*key),
        _ => None,
    }
}
