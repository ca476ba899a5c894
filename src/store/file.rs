use chrono::{DateTime, Utc};
use fs2::FileExt;
use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{debug, info};

use crate::attributes::AttributeFilter;
use crate::constants::store::{
    BITCODE_PREFIX, DEFAULT_STORE_DIR, DEFAULT_STORE_FILENAME, IMAGE_CATALOG_KEY, IMAGE_PREFIX,
    META_KEY, PAIR_PREFIX, PARTNERS_PREFIX, RECORD_VERSION, STORE_LOCK_EXTENSION, STORE_VERSION,
    TASK_PREFIX,
};
use crate::data::{
    Block, BlockKind, ImageRecord, PairKey, PairRecord, PairSet, TaskDraft, TaskRecord,
};
use crate::errors::DesignError;
use crate::history::first_conflict;
use crate::metrics::ExposureSummary;
use crate::types::{AttributeTag, ImageId};

use super::{
    PoolAdmin, RecordStore, RegistrationSummary, ScanCursor, ScanPage, StoreState, TaskLedger,
    duplicate_task,
};

/// Key/value pair staged for a single batch write.
type StoreEntry = (Vec<u8>, Vec<u8>);

/// Stores opened by this process, keyed by canonical file path.
///
/// A second `open` of a live path shares the first handle's `DataStore` and
/// index instead of mapping the file twice.
static OPEN_STORES: LazyLock<Mutex<HashMap<PathBuf, Weak<SharedRecords>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Clone, Copy, Debug, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored in file-backed record stores.
struct StoreMeta {
    version: u8,
}

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedCatalog {
    ids: Vec<String>,
}

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedImage {
    id: String,
    url: Option<String>,
    attributes: Vec<String>,
    active: bool,
    times_seen: u64,
    sampling_surplus: i64,
    registered_at_ms: i64,
}

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedPair {
    task_id: String,
    attribute: String,
}

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedPartners {
    seconds: Vec<String>,
}

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedBlock {
    kind: u8,
    prompt: String,
    instructions: String,
    tuples: Vec<Vec<String>>,
    image_index_map: Vec<Vec<u64>>,
    design_tuple_indices: Vec<u64>,
}

#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct PersistedTask {
    id: String,
    practice: bool,
    attribute: String,
    image_attributes: Vec<String>,
    blocks: Vec<PersistedBlock>,
    registered_at_ms: i64,
}

/// One open data store plus the image and pair index loaded from it.
struct SharedRecords {
    path: PathBuf,
    store: DataStore,
    state: RwLock<StoreState>,
    /// Exclusive lock on the sidecar file; released when the last handle drops.
    _process_lock: File,
}

/// File-backed record store for persistent pools.
///
/// Every image, pair, and task lives under its own key in a `simd_r_drive`
/// data store. Images and pairs are also indexed in memory for scans; tasks
/// are read from disk on demand. Each mutation is staged, written as one
/// batch, and only then applied to the in-memory index.
///
/// Opening a path that is already open in this process returns a handle to
/// the same underlying store. Another process opening the same path waits
/// until every handle here has been dropped.
#[derive(Clone)]
pub struct FileRecordStore {
    inner: Arc<SharedRecords>,
}

impl fmt::Debug for FileRecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("FileRecordStore");
        out.field("path", &self.inner.path);
        if let Ok(state) = self.inner.state.read() {
            out.field("images", &state.images.len())
                .field("pairs", &state.pairs.len());
        }
        out.finish()
    }
}

impl FileRecordStore {
    /// Open (or create) a file-backed record store at `path`.
    ///
    /// A directory path is resolved to the default file name inside it.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, DesignError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let key = registry_key(&path)?;
        let mut open_stores = OPEN_STORES
            .lock()
            .map_err(|_| DesignError::store("record store registry lock poisoned"))?;
        open_stores.retain(|_, shared| shared.strong_count() > 0);
        if let Some(inner) = open_stores.get(&key).and_then(Weak::upgrade) {
            debug!(path = %path.display(), "sharing open record store");
            return Ok(Self { inner });
        }

        let process_lock = acquire_process_lock(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        verify_metadata(&store)?;
        let state = load_state(&store)?;
        debug!(
            path = %path.display(),
            images = state.images.len(),
            pairs = state.pairs.len(),
            "opened record store"
        );
        let inner = Arc::new(SharedRecords {
            path,
            store,
            state: RwLock::new(state),
            _process_lock: process_lock,
        });
        open_stores.insert(key, Arc::downgrade(&inner));
        Ok(Self { inner })
    }

    /// Default record-store file path under the crate's default store directory.
    pub fn default_path() -> PathBuf {
        Self::default_path_in_dir(DEFAULT_STORE_DIR)
    }

    /// Default record-store file path inside a custom directory.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_STORE_FILENAME)
    }

    /// Data file backing this store.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, DesignError> {
        self.inner
            .state
            .read()
            .map_err(|_| DesignError::store("record store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, DesignError> {
        self.inner
            .state
            .write()
            .map_err(|_| DesignError::store("record store lock poisoned"))
    }

    fn update_images<T>(
        &self,
        apply: impl FnOnce(&mut StoreState) -> T,
    ) -> Result<T, DesignError> {
        self.update_images_with(apply, |entries| write_entries(&self.inner.store, entries))
    }

    /// Run `apply` against a copy of the image index, persist every changed
    /// image through `persist`, and swap the copy in once that succeeds.
    fn update_images_with<T>(
        &self,
        apply: impl FnOnce(&mut StoreState) -> T,
        persist: impl FnOnce(&[StoreEntry]) -> Result<(), DesignError>,
    ) -> Result<T, DesignError> {
        let mut state = self.write()?;
        let mut staged = StoreState {
            images: state.images.clone(),
            ..StoreState::default()
        };
        let out = apply(&mut staged);
        let entries = image_changes(&state.images, &staged.images);
        if !entries.is_empty() {
            persist(&entries)?;
        }
        state.images = staged.images;
        Ok(out)
    }

    /// Validate `draft` against the durable records, write the task, its
    /// exposure updates and its pairs through `persist` as one batch, then
    /// index them.
    fn commit_task_with(
        &self,
        draft: &TaskDraft,
        store_pairs: bool,
        persist: impl FnOnce(&[StoreEntry]) -> Result<(), DesignError>,
    ) -> Result<TaskRecord, DesignError> {
        let mut state = self.write()?;
        let store = &self.inner.store;
        if read_bytes(store, &task_key(&draft.id))?.is_some() {
            return Err(duplicate_task(&draft.id));
        }
        if store_pairs && let Some(pair) = durable_conflict(store, draft)? {
            return Err(DesignError::PairConflict { pair });
        }
        let prepared = state.prepare_task(draft, store_pairs)?;

        let mut entries: Vec<StoreEntry> = Vec::new();
        for record in &prepared.exposed {
            entries.push((image_key(&record.id), encode_record(&persist_image(record))));
        }
        let mut partners: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for record in &prepared.pairs {
            let persisted = PersistedPair {
                task_id: record.task_id.clone(),
                attribute: record.attribute.clone(),
            };
            entries.push((pair_key(&record.pair), encode_record(&persisted)));
            partners
                .entry(record.pair.first())
                .or_default()
                .push(record.pair.second().to_string());
        }
        for (first, mut added) in partners {
            let mut seconds: Vec<String> = state
                .pairs_with_prefix(first)
                .into_iter()
                .map(|pair| pair.second().to_string())
                .collect();
            seconds.append(&mut added);
            entries.push((
                partners_key(first),
                encode_record(&PersistedPartners { seconds }),
            ));
        }
        entries.push((
            task_key(&prepared.record.id),
            encode_record(&persist_task(&prepared.record)),
        ));
        persist(&entries)?;

        state.apply_task_effects(&prepared);
        info!(
            task = %prepared.record.id,
            trials = prepared.record.tuples.len(),
            pairs = prepared.pairs.len(),
            "committed task to record store"
        );
        Ok(prepared.record)
    }
}

impl RecordStore for FileRecordStore {
    fn count_active(&self, filter: &AttributeFilter) -> Result<usize, DesignError> {
        Ok(self.read()?.count_active(filter))
    }

    fn scan_active(
        &self,
        filter: &AttributeFilter,
        cursor: &ScanCursor,
        limit: usize,
    ) -> Result<ScanPage, DesignError> {
        Ok(self.read()?.scan_active(filter, cursor, limit))
    }

    fn get_surplus(&self, id: &str) -> Result<i64, DesignError> {
        self.read()?.surplus(id)
    }

    fn decrement_surplus(&self, id: &str) -> Result<i64, DesignError> {
        let mut state = self.write()?;
        let record = state
            .image(id)
            .cloned()
            .ok_or_else(|| DesignError::UnknownImage(id.to_string()))?;
        let mut staged = StoreState::default();
        staged.images.insert(record.id.clone(), record);
        let value = staged.decrement_surplus(id)?;
        let entries = image_changes(&state.images, &staged.images);
        write_entries(&self.inner.store, &entries)?;
        state.images.extend(staged.images);
        Ok(value)
    }

    fn pairs_with_prefix(&self, id: &str) -> Result<Vec<PairKey>, DesignError> {
        Ok(self.read()?.pairs_with_prefix(id))
    }

    fn pair_exists(&self, pair: &PairKey) -> Result<bool, DesignError> {
        Ok(self.read()?.pair_exists(pair))
    }
}

impl PoolAdmin for FileRecordStore {
    fn image(&self, id: &str) -> Result<Option<ImageRecord>, DesignError> {
        Ok(self.read()?.image(id).cloned())
    }

    fn register_images(
        &self,
        images: Vec<ImageRecord>,
    ) -> Result<RegistrationSummary, DesignError> {
        self.update_images(|state| state.register_images(images))
    }

    fn add_attributes(
        &self,
        ids: &[ImageId],
        tags: &[AttributeTag],
    ) -> Result<usize, DesignError> {
        self.update_images(|state| state.add_attributes(ids, tags))
    }

    fn activate_images(&self, ids: &[ImageId]) -> Result<usize, DesignError> {
        self.update_images(|state| state.activate_images(ids))
    }

    fn activate_n_images(
        &self,
        n: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ImageId>, DesignError> {
        self.update_images(|state| state.activate_n_images(n, filter))
    }

    fn deactivate_images(&self, ids: &[ImageId]) -> Result<usize, DesignError> {
        self.update_images(|state| state.deactivate_images(ids))
    }

    fn exposure_stats(
        &self,
        filter: &AttributeFilter,
    ) -> Result<Option<ExposureSummary>, DesignError> {
        Ok(self.read()?.exposure_stats(filter))
    }
}

impl TaskLedger for FileRecordStore {
    fn register_task(
        &self,
        draft: &TaskDraft,
        store_pairs: bool,
    ) -> Result<TaskRecord, DesignError> {
        self.commit_task_with(draft, store_pairs, |entries| {
            write_entries(&self.inner.store, entries)
        })
    }

    fn task(&self, id: &str) -> Result<Option<TaskRecord>, DesignError> {
        read_bytes(&self.inner.store, &task_key(id))?
            .map(|bytes| restore_task(decode_record(&bytes, "task")?))
            .transpose()
    }
}

fn verify_metadata(store: &DataStore) -> Result<(), DesignError> {
    match read_bytes(store, META_KEY)? {
        Some(bytes) => {
            let meta = decode_store_meta(&bytes)?;
            if meta.version != STORE_VERSION {
                return Err(DesignError::store(format!(
                    "record store version mismatch (expected {}, found {})",
                    STORE_VERSION, meta.version
                )));
            }
        }
        None => {
            let payload = encode_store_meta(&StoreMeta {
                version: STORE_VERSION,
            });
            write_bytes(store, META_KEY, &payload)?;
        }
    }
    Ok(())
}

fn encode_store_meta(meta: &StoreMeta) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(meta))
}

fn decode_store_meta(bytes: &[u8]) -> Result<StoreMeta, DesignError> {
    let raw = decode_bitcode_payload(bytes)?;
    bitcode::decode(&raw).map_err(|err| {
        DesignError::store(format!("failed to decode record store metadata: {err}"))
    })
}

/// Rebuild the image and pair index from the catalog and partner lists.
fn load_state(store: &DataStore) -> Result<StoreState, DesignError> {
    let mut state = StoreState::default();
    let Some(bytes) = read_bytes(store, IMAGE_CATALOG_KEY)? else {
        return Ok(state);
    };
    let catalog: PersistedCatalog = decode_record(&bytes, "image catalog")?;

    let keys: Vec<Vec<u8>> = catalog.ids.iter().map(|id| image_key(id)).collect();
    for (id, entry) in catalog.ids.iter().zip(read_many(store, &keys)?) {
        let bytes = entry.ok_or_else(|| {
            DesignError::store(format!("image catalog lists missing image '{id}'"))
        })?;
        let record = restore_image(decode_record(&bytes, "image")?)?;
        state.images.insert(record.id.clone(), record);
    }

    let keys: Vec<Vec<u8>> = catalog.ids.iter().map(|id| partners_key(id)).collect();
    let mut pairs: Vec<PairKey> = Vec::new();
    for (id, entry) in catalog.ids.iter().zip(read_many(store, &keys)?) {
        let Some(bytes) = entry else {
            continue;
        };
        let partners: PersistedPartners = decode_record(&bytes, "pair partners")?;
        pairs.extend(
            partners
                .seconds
                .into_iter()
                .map(|second| PairKey::new(id.clone(), second)),
        );
    }

    let keys: Vec<Vec<u8>> = pairs.iter().map(pair_key).collect();
    for (pair, entry) in pairs.into_iter().zip(read_many(store, &keys)?) {
        let bytes = entry
            .ok_or_else(|| DesignError::store(format!("pair index lists missing pair {pair}")))?;
        let persisted: PersistedPair = decode_record(&bytes, "pair")?;
        state.pairs.insert(
            pair.clone(),
            PairRecord {
                pair,
                task_id: persisted.task_id,
                attribute: persisted.attribute,
            },
        );
    }
    Ok(state)
}

/// First stored pair the draft would reuse, checked against the data file.
fn durable_conflict(store: &DataStore, draft: &TaskDraft) -> Result<Option<PairKey>, DesignError> {
    let pairs: Vec<PairKey> = draft.pairs().into_iter().collect();
    let keys: Vec<Vec<u8>> = pairs.iter().map(pair_key).collect();
    let observed: PairSet = pairs
        .into_iter()
        .zip(read_many(store, &keys)?)
        .filter_map(|(pair, entry)| entry.map(|_| pair))
        .collect();
    Ok(draft
        .design
        .iter()
        .find_map(|tuple| first_conflict(tuple, &observed))
        .cloned())
}

/// Records that differ between two image indexes, plus the catalog when the
/// set of ids changed.
fn image_changes(
    before: &BTreeMap<ImageId, ImageRecord>,
    after: &BTreeMap<ImageId, ImageRecord>,
) -> Vec<StoreEntry> {
    let mut entries: Vec<StoreEntry> = after
        .iter()
        .filter(|(id, record)| before.get(*id) != Some(*record))
        .map(|(id, record)| (image_key(id), encode_record(&persist_image(record))))
        .collect();
    if after.keys().any(|id| !before.contains_key(id)) {
        let ids = before.keys().chain(after.keys()).cloned();
        let mut ids: Vec<String> = ids.collect();
        ids.sort();
        ids.dedup();
        entries.push((
            IMAGE_CATALOG_KEY.to_vec(),
            encode_record(&PersistedCatalog { ids }),
        ));
    }
    entries
}

fn persist_image(record: &ImageRecord) -> PersistedImage {
    PersistedImage {
        id: record.id.clone(),
        url: record.url.clone(),
        attributes: record.attributes.iter().cloned().collect(),
        active: record.active,
        times_seen: record.times_seen,
        sampling_surplus: record.sampling_surplus,
        registered_at_ms: record.registered_at.timestamp_millis(),
    }
}

fn restore_image(image: PersistedImage) -> Result<ImageRecord, DesignError> {
    Ok(ImageRecord {
        registered_at: restore_timestamp(image.registered_at_ms)?,
        id: image.id,
        url: image.url,
        attributes: image.attributes.into_iter().collect(),
        active: image.active,
        times_seen: image.times_seen,
        sampling_surplus: image.sampling_surplus,
    })
}

fn persist_task(record: &TaskRecord) -> PersistedTask {
    PersistedTask {
        id: record.id.clone(),
        practice: record.practice,
        attribute: record.attribute.clone(),
        image_attributes: record.image_attributes.clone(),
        blocks: record
            .blocks
            .iter()
            .map(|block| PersistedBlock {
                kind: encode_kind(block.kind),
                prompt: block.prompt.clone(),
                instructions: block.instructions.clone(),
                tuples: block.tuples.clone(),
                image_index_map: block
                    .image_index_map
                    .iter()
                    .map(|row| row.iter().map(|idx| *idx as u64).collect())
                    .collect(),
                design_tuple_indices: block
                    .design_tuple_indices
                    .iter()
                    .map(|idx| *idx as u64)
                    .collect(),
            })
            .collect(),
        registered_at_ms: record.registered_at.timestamp_millis(),
    }
}

fn restore_task(task: PersistedTask) -> Result<TaskRecord, DesignError> {
    let mut blocks = Vec::with_capacity(task.blocks.len());
    for block in task.blocks {
        blocks.push(Block {
            kind: decode_kind(block.kind)?,
            prompt: block.prompt,
            instructions: block.instructions,
            tuples: block.tuples,
            image_index_map: block
                .image_index_map
                .into_iter()
                .map(|row| row.into_iter().map(|idx| idx as usize).collect())
                .collect(),
            design_tuple_indices: block
                .design_tuple_indices
                .into_iter()
                .map(|idx| idx as usize)
                .collect(),
        });
    }
    let tuples = blocks
        .iter()
        .flat_map(|block| block.tuples.iter().cloned())
        .collect();
    let tuple_kinds = blocks
        .iter()
        .flat_map(|block| std::iter::repeat_n(block.kind, block.len()))
        .collect();
    Ok(TaskRecord {
        id: task.id,
        practice: task.practice,
        attribute: task.attribute,
        image_attributes: task.image_attributes,
        tuples,
        tuple_kinds,
        blocks,
        registered_at: restore_timestamp(task.registered_at_ms)?,
    })
}

fn encode_kind(kind: BlockKind) -> u8 {
    match kind {
        BlockKind::Keep => 0,
        BlockKind::Reject => 1,
    }
}

fn decode_kind(byte: u8) -> Result<BlockKind, DesignError> {
    match byte {
        0 => Ok(BlockKind::Keep),
        1 => Ok(BlockKind::Reject),
        other => Err(DesignError::store(format!("unknown block kind tag {other}"))),
    }
}

fn restore_timestamp(millis: i64) -> Result<DateTime<Utc>, DesignError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DesignError::store(format!("timestamp out of range: {millis}")))
}

fn prefixed_key(prefix: &[u8], suffix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix.as_bytes());
    key
}

fn image_key(id: &str) -> Vec<u8> {
    prefixed_key(IMAGE_PREFIX, id)
}

fn pair_key(pair: &PairKey) -> Vec<u8> {
    prefixed_key(PAIR_PREFIX, &pair.row_key())
}

fn partners_key(id: &str) -> Vec<u8> {
    prefixed_key(PARTNERS_PREFIX, id)
}

fn task_key(id: &str) -> Vec<u8> {
    prefixed_key(TASK_PREFIX, id)
}

fn encode_record<T: bitcode::Encode + ?Sized>(value: &T) -> Vec<u8> {
    let payload = encode_bitcode_payload(&bitcode::encode(value));
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(RECORD_VERSION);
    buf.extend_from_slice(&payload);
    buf
}

fn decode_record<T: bitcode::DecodeOwned>(bytes: &[u8], label: &str) -> Result<T, DesignError> {
    if bytes.first().copied() != Some(RECORD_VERSION) {
        return Err(DesignError::store(format!(
            "{label} record version mismatch"
        )));
    }
    let raw = decode_bitcode_payload(&bytes[1..])?;
    bitcode::decode(&raw)
        .map_err(|err| DesignError::store(format!("corrupt {label} record: {err}")))
}

fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, DesignError> {
    store
        .read(key)
        .map_err(map_store_err)?
        .map(|entry| Ok(entry.as_ref().to_vec()))
        .transpose()
}

fn read_many(store: &DataStore, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>, DesignError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let key_refs: Vec<&[u8]> = keys.iter().map(|key| key.as_slice()).collect();
    let entries = store.batch_read(&key_refs).map_err(map_store_err)?;
    Ok(entries
        .into_iter()
        .map(|entry| entry.map(|entry| entry.as_ref().to_vec()))
        .collect())
}

fn write_bytes(store: &DataStore, key: &[u8], payload: &[u8]) -> Result<(), DesignError> {
    store.write(key, payload).map_err(map_store_err)?;
    Ok(())
}

/// Write staged entries in a single batch append.
fn write_entries(store: &DataStore, entries: &[StoreEntry]) -> Result<(), DesignError> {
    if entries.is_empty() {
        return Ok(());
    }
    let entry_refs: Vec<(&[u8], &[u8])> = entries
        .iter()
        .map(|(key, value)| (key.as_slice(), value.as_slice()))
        .collect();
    store.batch_write(&entry_refs).map_err(map_store_err)?;
    Ok(())
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<Vec<u8>, DesignError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(DesignError::store(
            "bitcode payload missing expected prefix",
        ));
    }
    Ok(bytes[1..].to_vec())
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), DesignError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Lock the sidecar next to `path`, blocking while another process holds it.
fn acquire_process_lock(path: &Path) -> Result<File, DesignError> {
    let lock_path = path.with_extension(STORE_LOCK_EXTENSION);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)?;
    if file.try_lock_exclusive().is_err() {
        info!(path = %lock_path.display(), "waiting for record store held by another process");
        file.lock_exclusive()?;
    }
    Ok(file)
}

/// Canonical identity of a store file, valid before the file exists.
fn registry_key(path: &Path) -> Result<PathBuf, DesignError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = fs::canonicalize(parent)?;
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

fn map_store_err(err: io::Error) -> DesignError {
    DesignError::store(err.to_string())
}
