//! The vector store manager.
//!
//! Owns the embedding generator, the record store and the lifecycle of
//! the shared approximate index: lazily created once the record count
//! crosses the high-water mark, kept in sync with record create/update/
//! delete events, persisted to disk and restored across restarts.
//!
//! All structural index mutations are serialized behind one writer lock;
//! searches share a read lock. Record-store writes and index writes are
//! not transactional with each other: a crash in between leaves the index
//! stale for that one record until the next full resync.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::Settings;
use crate::embedding::EmbeddingGenerator;
use crate::error::{ConfigError, IndexError, StoreResult};
use crate::index::{HnswIndex, HnswParams, INDEX_META_FILE, IndexRegistry};
use crate::store::query::{self, SearchOptions, SearchOutcome, SearchQuery};
use crate::store::record::{RecordStore, VectorRecord};
use crate::store::source::{VectorSource, extract_metadata};
use crate::store::validate::{ContentRef, NewVector, validate_new_vector};
use crate::tasks::{IndexTask, TaskQueue};
use crate::types::{JsonMap, VectorDimension, VectorId};

/// Subdirectory of the persist dir holding the shared approximate index.
pub const INDEX_SUBDIR: &str = "hnsw_index";

/// Dereferences a source-object id back to application data.
///
/// Registered explicitly per collection kind at startup; used by the
/// search `unwrap` mode.
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, object_id: u64) -> Option<serde_json::Value>;
}

impl<F> SourceResolver for F
where
    F: Fn(u64) -> Option<serde_json::Value> + Send + Sync,
{
    fn resolve(&self, object_id: u64) -> Option<serde_json::Value> {
        self(object_id)
    }
}

/// What a source-saved event did to the stored vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedOutcome {
    /// No record existed; one was created and indexed.
    Created,
    /// The text changed: re-embedded and the index entry updated.
    Reembedded,
    /// The text was unchanged: metadata persisted, embedding and index
    /// entry untouched.
    MetadataOnly,
}

/// Counts reported by a bulk resync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
}

struct Inner {
    settings: Settings,
    dimension: VectorDimension,
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingGenerator>,
    registry: Arc<IndexRegistry>,
    /// The shared approximate index, `None` until activated.
    ann: RwLock<Option<Arc<RwLock<HnswIndex>>>>,
    resolvers: RwLock<HashMap<String, Arc<dyn SourceResolver>>>,
    tasks: RwLock<Option<TaskQueue>>,
    /// Serializes record mutations so the text-equality compare on the
    /// update path never races another writer.
    write_serial: Mutex<()>,
}

/// Manager owning vector records and their indexes. Cheap to clone.
#[derive(Clone)]
pub struct VectorStore {
    inner: Arc<Inner>,
}

impl VectorStore {
    /// Builds a manager over a record store and an embedding generator.
    ///
    /// Fatal at construction: settings that fail validation, or a
    /// configured dimension that conflicts with the generator's. A
    /// persisted index is restored when present; an unloadable one is
    /// logged and rebuilt from the record store.
    pub fn new(
        settings: Settings,
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> StoreResult<Self> {
        settings.validate()?;
        let dimension = embedder.dimension();
        if dimension.get() != settings.embedding.dimension {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "configured embedding dimension {} does not match the generator's {}",
                    settings.embedding.dimension,
                    dimension.get()
                ),
            }
            .into());
        }

        let manager = Self {
            inner: Arc::new(Inner {
                settings,
                dimension,
                store,
                embedder,
                registry: Arc::new(IndexRegistry::new()),
                ann: RwLock::new(None),
                resolvers: RwLock::new(HashMap::new()),
                tasks: RwLock::new(None),
                write_serial: Mutex::new(()),
            }),
        };
        manager.restore_or_activate()?;
        Ok(manager)
    }

    fn restore_or_activate(&self) -> StoreResult<()> {
        let dir = self.index_dir();
        if dir.join(INDEX_META_FILE).exists() {
            match HnswIndex::load_expecting(&dir, self.inner.dimension, self.inner.settings.index.space)
            {
                Ok(index) => {
                    info!(
                        path = %dir.display(),
                        items = index.item_count(),
                        "restored persisted approximate index"
                    );
                    let capacity = index.capacity();
                    let handle = Arc::new(RwLock::new(index));
                    self.inner
                        .registry
                        .insert_hnsw(&self.hnsw_params(capacity), handle.clone());
                    *self.inner.ann.write() = Some(handle);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        path = %dir.display(),
                        error = %e,
                        "failed to load persisted index, falling back to a rebuild"
                    );
                }
            }
        }

        if self.inner.store.count() > self.inner.settings.index.high_water_mark {
            let _ = self.ensure_ann_ready()?;
        }
        Ok(())
    }

    /// Directory the shared index persists into.
    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.inner.settings.persist_dir.join(INDEX_SUBDIR)
    }

    fn hnsw_params(&self, capacity: usize) -> HnswParams {
        let index = &self.inner.settings.index;
        HnswParams {
            dimension: self.inner.dimension,
            capacity,
            space: index.space,
            m: index.m,
            ef_construction: index.ef_construction,
            ef: index.ef,
            should_not_cache: false,
        }
    }

    // --- accessors used by the query layer ---

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn record_store(&self) -> &dyn RecordStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn embedder(&self) -> &dyn EmbeddingGenerator {
        self.inner.embedder.as_ref()
    }

    pub(crate) fn registry(&self) -> &IndexRegistry {
        &self.inner.registry
    }

    pub(crate) fn dimension(&self) -> VectorDimension {
        self.inner.dimension
    }

    /// The shared approximate index, if active.
    #[must_use]
    pub fn ann_handle(&self) -> Option<Arc<RwLock<HnswIndex>>> {
        self.inner.ann.read().clone()
    }

    /// Number of stored records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.store.count()
    }

    /// Fetches a record by surrogate id.
    #[must_use]
    pub fn get(&self, id: VectorId) -> Option<VectorRecord> {
        self.inner.store.get(id)
    }

    /// Fetches a record by its `(collection_kind, object_id)` identity.
    #[must_use]
    pub fn get_by_ref(&self, kind: Option<&str>, object_id: u64) -> Option<VectorRecord> {
        self.inner.store.get_by_ref(kind, object_id)
    }

    // --- index lifecycle ---

    fn activate_handle(&self) -> StoreResult<Arc<RwLock<HnswIndex>>> {
        let count = self.inner.store.count();
        let capacity = ((count as f64 * 1.3).ceil() as usize)
            .max(self.inner.settings.index.high_water_mark);
        let handle = self.inner.registry.hnsw(&self.hnsw_params(capacity));
        *self.inner.ann.write() = Some(handle.clone());
        info!(count, capacity, "approximate index activated");
        Ok(handle)
    }

    /// Activates the shared index and schedules its backfill off the
    /// request path.
    pub(crate) fn activate_index(&self) -> StoreResult<()> {
        let _ = self.activate_handle()?;
        self.enqueue(IndexTask::Backfill);
        Ok(())
    }

    /// Activates the shared index and backfills it before returning,
    /// for callers about to search it.
    pub(crate) fn ensure_ann_ready(&self) -> StoreResult<Arc<RwLock<HnswIndex>>> {
        if let Some(handle) = self.ann_handle() {
            return Ok(handle);
        }
        let handle = self.activate_handle()?;
        self.apply_task(&IndexTask::Backfill)?;
        Ok(handle)
    }

    /// Persists the shared index under the persist directory, holding its
    /// write lock for the duration so no mutation can interleave.
    ///
    /// Returns `None` when no index is active.
    pub fn persist_index(&self) -> StoreResult<Option<PathBuf>> {
        let Some(handle) = self.ann_handle() else {
            return Ok(None);
        };
        let dir = self.index_dir();
        let guard = handle.write();
        guard.persist(&dir)?;
        info!(path = %dir.display(), items = guard.item_count(), "approximate index persisted");
        Ok(Some(dir))
    }

    // --- background work ---

    /// Starts the background worker. Until this is called, index tasks
    /// apply inline on the calling thread.
    pub fn start_worker(&self) {
        let weak = Arc::downgrade(&self.inner);
        let queue = TaskQueue::start(move |task| match weak.upgrade() {
            Some(inner) => VectorStore { inner }.apply_task(task),
            None => Ok(()),
        });
        *self.inner.tasks.write() = Some(queue);
        info!("index maintenance worker started");
    }

    /// Stops the background worker, draining queued tasks first.
    pub fn stop_worker(&self) {
        *self.inner.tasks.write() = None;
    }

    pub(crate) fn enqueue(&self, task: IndexTask) {
        let tasks = self.inner.tasks.read();
        match tasks.as_ref() {
            Some(queue) => queue.submit(task),
            None => {
                drop(tasks);
                if let Err(e) = self.apply_task(&task) {
                    warn!(?task, error = %e, "inline index task failed");
                }
            }
        }
    }

    pub(crate) fn apply_task(&self, task: &IndexTask) -> StoreResult<()> {
        let Some(handle) = self.ann_handle() else {
            return Ok(());
        };
        match task {
            IndexTask::Backfill => {
                let records = self.inner.store.all();
                let ids: Vec<VectorId> = records.iter().map(|r| r.id).collect();
                let embeddings: Vec<Vec<f32>> =
                    records.into_iter().map(|r| r.embedding).collect();
                handle.write().add(&embeddings, &ids)?;
                info!(count = ids.len(), "approximate index backfilled");
                Ok(())
            }
            IndexTask::Add(id) => {
                let Some(record) = self.inner.store.get(*id) else {
                    return Ok(());
                };
                handle.write().add(&[record.embedding], &[record.id])?;
                Ok(())
            }
            IndexTask::Update(id) => {
                let Some(record) = self.inner.store.get(*id) else {
                    return Ok(());
                };
                let mut guard = handle.write();
                match guard.update(&[record.embedding.clone()], &[record.id]) {
                    // Not yet in the index (added before activation): add it.
                    Err(IndexError::UnknownId(_)) => {
                        guard.add(&[record.embedding], &[record.id])?;
                        Ok(())
                    }
                    other => Ok(other?),
                }
            }
            IndexTask::Remove(id) => {
                let mut guard = handle.write();
                match guard.delete(&[*id]) {
                    // Never made it into the index; nothing to retract.
                    Err(IndexError::UnknownId(_)) => Ok(()),
                    other => Ok(other?),
                }
            }
        }
    }

    // --- record lifecycle ---

    /// Low-level validated insert. Most callers want [`Self::add_text`]
    /// or [`Self::add_instance`].
    pub fn create(&self, new: NewVector) -> StoreResult<VectorRecord> {
        let _guard = self.inner.write_serial.lock();
        self.create_locked(new)
    }

    fn create_locked(&self, new: NewVector) -> StoreResult<VectorRecord> {
        let text = validate_new_vector(self.inner.store.as_ref(), &new)?;

        let embedding = match new.embedding {
            Some(embedding) => embedding,
            None => self.inner.embedder.embed(&text)?,
        };
        self.inner.dimension.validate_vector(&embedding)?;

        let (collection_kind, object_id, content_metadata) = match new.content {
            Some(content) => (Some(content.kind), Some(content.object_id), content.metadata),
            None => (None, new.object_id, None),
        };
        let metadata = new
            .metadata
            .or(content_metadata)
            .unwrap_or_default();

        let now = Utc::now();
        let record = VectorRecord {
            id: self.inner.store.allocate_id(),
            embedding,
            text,
            metadata,
            collection_kind,
            object_id,
            created_at: now,
            updated_at: now,
        };
        let record = self.inner.store.insert(record)?;
        self.after_insert(&record);
        Ok(record)
    }

    fn after_insert(&self, record: &VectorRecord) {
        if self.ann_handle().is_some() {
            self.enqueue(IndexTask::Add(record.id));
        } else if self.inner.store.count() > self.inner.settings.index.high_water_mark {
            if let Err(e) = self.activate_index() {
                warn!(error = %e, "failed to activate approximate index");
            }
        }
    }

    /// Adds a bare text with an explicit object id, embedding it unless
    /// an embedding is supplied.
    pub fn add_text(
        &self,
        object_id: u64,
        text: &str,
        metadata: Option<JsonMap>,
        embedding: Option<Vec<f32>>,
    ) -> StoreResult<VectorRecord> {
        self.create(NewVector {
            text: Some(text.to_string()),
            embedding,
            metadata,
            content: None,
            object_id: Some(object_id),
        })
    }

    /// Batch variant of [`Self::add_text`]: one embedding call for the
    /// whole batch.
    pub fn add_texts(
        &self,
        items: &[(u64, String, Option<JsonMap>)],
    ) -> StoreResult<Vec<VectorRecord>> {
        let texts: Vec<&str> = items.iter().map(|(_, text, _)| text.as_str()).collect();
        let embeddings = self.inner.embedder.embed_batch(&texts)?;

        let _guard = self.inner.write_serial.lock();
        items
            .iter()
            .zip(embeddings)
            .map(|((object_id, text, metadata), embedding)| {
                self.create_locked(NewVector {
                    text: Some(text.clone()),
                    embedding: Some(embedding),
                    metadata: metadata.clone(),
                    content: None,
                    object_id: Some(*object_id),
                })
            })
            .collect()
    }

    /// Indexes a source object, extracting its text and metadata through
    /// the capability interface.
    pub fn add_instance<T: VectorSource>(&self, source: &T) -> StoreResult<VectorRecord> {
        let _guard = self.inner.write_serial.lock();
        self.add_instance_locked(source)
    }

    fn add_instance_locked<T: VectorSource>(&self, source: &T) -> StoreResult<VectorRecord> {
        let metadata = extract_metadata(source)?;
        self.create_locked(NewVector {
            text: None,
            embedding: None,
            metadata: None,
            content: Some(ContentRef {
                kind: source.collection_kind().to_string(),
                object_id: source.object_id(),
                text: source.get_text(),
                metadata: Some(metadata),
            }),
            object_id: None,
        })
    }

    /// Batch variant of [`Self::add_instance`].
    pub fn add_instances<T: VectorSource>(&self, sources: &[T]) -> StoreResult<Vec<VectorRecord>> {
        let _guard = self.inner.write_serial.lock();
        sources
            .iter()
            .map(|source| self.add_instance_locked(source))
            .collect()
    }

    /// Observer for source-record saves, registered by the application.
    ///
    /// Creates the vector on first sight. On later saves, metadata is
    /// always persisted; the embedding and index entry are only touched
    /// when the extracted text actually changed.
    pub fn on_source_saved<T: VectorSource>(&self, source: &T) -> StoreResult<SavedOutcome> {
        let _guard = self.inner.write_serial.lock();
        self.saved_locked(source)
    }

    fn saved_locked<T: VectorSource>(&self, source: &T) -> StoreResult<SavedOutcome> {
        let kind = source.collection_kind();
        let Some(mut record) = self
            .inner
            .store
            .get_by_ref(Some(kind), source.object_id())
        else {
            self.add_instance_locked(source)?;
            return Ok(SavedOutcome::Created);
        };

        let text = source.get_text();
        record.metadata = extract_metadata(source)?;
        record.updated_at = Utc::now();

        if text == record.text {
            // Unchanged text: persist the metadata, leave the embedding
            // and the index entry alone.
            self.inner.store.update(record)?;
            return Ok(SavedOutcome::MetadataOnly);
        }

        record.text = text;
        record.embedding = self.inner.embedder.embed(&record.text)?;
        let record = self.inner.store.update(record)?;
        if self.ann_handle().is_some() {
            self.enqueue(IndexTask::Update(record.id));
        }
        Ok(SavedOutcome::Reembedded)
    }

    /// Observer for source-record deletions: removes the vector record
    /// and retracts its id from the approximate index if active.
    pub fn on_source_deleted(&self, kind: &str, object_id: u64) -> StoreResult<Option<VectorId>> {
        let _guard = self.inner.write_serial.lock();
        self.deleted_locked(kind, object_id)
    }

    fn deleted_locked(&self, kind: &str, object_id: u64) -> StoreResult<Option<VectorId>> {
        let Some(record) = self.inner.store.get_by_ref(Some(kind), object_id) else {
            return Ok(None);
        };
        self.inner.store.remove(record.id);
        if self.ann_handle().is_some() {
            self.enqueue(IndexTask::Remove(record.id));
        }
        Ok(Some(record.id))
    }

    /// Explicitly removes a record by surrogate id, retracting it from
    /// the approximate index if active.
    pub fn remove(&self, id: VectorId) -> StoreResult<Option<VectorRecord>> {
        let _guard = self.inner.write_serial.lock();
        let removed = self.inner.store.remove(id);
        if removed.is_some() && self.ann_handle().is_some() {
            self.enqueue(IndexTask::Remove(id));
        }
        Ok(removed)
    }

    /// Bulk resync of one collection against the current set of source
    /// records: orphaned vectors are deleted, missing ones added,
    /// changed ones updated.
    pub fn sync_collection<T: VectorSource>(
        &self,
        kind: &str,
        sources: &[T],
    ) -> StoreResult<SyncReport> {
        let _guard = self.inner.write_serial.lock();
        let mut report = SyncReport::default();

        let live_ids: HashSet<u64> = sources.iter().map(VectorSource::object_id).collect();
        for record in self.inner.store.by_kind(kind) {
            let orphaned = record.object_id.is_none_or(|oid| !live_ids.contains(&oid));
            if orphaned {
                self.inner.store.remove(record.id);
                if self.ann_handle().is_some() {
                    self.enqueue(IndexTask::Remove(record.id));
                }
                report.removed += 1;
            }
        }

        for source in sources {
            match self.saved_locked(source)? {
                SavedOutcome::Created => report.added += 1,
                SavedOutcome::Reembedded => report.updated += 1,
                SavedOutcome::MetadataOnly => report.skipped += 1,
            }
        }

        info!(
            kind,
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            removed = report.removed,
            "collection resynced"
        );
        Ok(report)
    }

    /// Deletes every record and resets the approximate index.
    pub fn reset(&self) {
        let _guard = self.inner.write_serial.lock();
        self.inner.store.clear();
        if let Some(handle) = self.ann_handle() {
            handle.write().reset();
        }
        info!("vector store reset");
    }

    // --- search ---

    /// Full search entry point; see [`SearchQuery`] and [`SearchOptions`].
    pub fn search(&self, query: SearchQuery, opts: SearchOptions) -> StoreResult<SearchOutcome> {
        query::execute(self, &query, &opts)
    }

    /// Searches records related to a raw text query.
    pub fn search_text(&self, text: &str, k: Option<usize>) -> StoreResult<SearchOutcome> {
        self.search(
            SearchQuery::Text(text.to_string()),
            SearchOptions {
                k,
                ..SearchOptions::default()
            },
        )
    }

    /// Searches records related to an already-indexed source object,
    /// reusing its stored embedding when possible and excluding the
    /// object itself from the results.
    pub fn search_related<T: VectorSource>(
        &self,
        source: &T,
        k: Option<usize>,
    ) -> StoreResult<SearchOutcome> {
        self.search(
            SearchQuery::Source {
                kind: source.collection_kind().to_string(),
                object_id: source.object_id(),
                text_fallback: Some(source.get_text()),
            },
            SearchOptions {
                k,
                ..SearchOptions::default()
            },
        )
    }

    // --- source resolution (unwrap mode) ---

    /// Registers the resolver that dereferences ids of one collection
    /// kind back to application data.
    pub fn register_resolver(&self, kind: &str, resolver: Arc<dyn SourceResolver>) {
        self.inner
            .resolvers
            .write()
            .insert(kind.to_string(), resolver);
    }

    pub(crate) fn resolve_source(&self, kind: &str, object_id: u64) -> Option<serde_json::Value> {
        let resolvers = self.inner.resolvers.read();
        resolvers.get(kind).and_then(|r| r.resolve(object_id))
    }
}
