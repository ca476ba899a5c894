//! Record store interfaces and built-in stores.
//!
//! Ownership model:
//! - `RecordStore` is the narrow contract the allocator and pair history index
//!   consume: active-image counting and scanning, surplus counters, and pair
//!   lookups.
//! - `PoolAdmin` manages the image pool lifecycle (registration, activation,
//!   deactivation, tagging).
//! - `TaskLedger` commits generated tasks, which is the only way pair history
//!   grows.
//!
//! Both built-in stores keep all state behind a single lock so each operation
//! is atomic with respect to concurrent generators sharing the store.

use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::attributes::AttributeFilter;
use crate::data::{ImageRecord, PairKey, TaskDraft, TaskRecord};
use crate::errors::DesignError;
use crate::metrics::ExposureSummary;
use crate::types::{AttributeTag, ImageId};

mod file;
mod state;

pub use file::FileRecordStore;
pub(crate) use state::{StoreState, duplicate_task};

/// Resumable position in the active-image scan.
///
/// The allocator stores and returns this value between calls. A scan resumes
/// strictly after `last_visited` and wraps around to the start of the pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    last_visited: Option<ImageId>,
}

impl ScanCursor {
    /// Cursor positioned before the first image.
    pub fn start() -> Self {
        Self::default()
    }

    /// Cursor that resumes right after `id`.
    pub fn after(id: impl Into<ImageId>) -> Self {
        Self {
            last_visited: Some(id.into()),
        }
    }

    /// Last image handed out by the previous page, if any.
    pub fn last_visited(&self) -> Option<&str> {
        self.last_visited.as_deref()
    }
}

/// Result of a single scan call.
///
/// Pass the returned `cursor` into the next scan to continue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanPage {
    /// Active image ids in scan order (at most one full cycle of the pool).
    pub images: Vec<ImageId>,
    /// Next cursor to pass into a future scan call.
    pub cursor: ScanCursor,
}

/// Outcome of an image registration batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSummary {
    /// Images newly inserted.
    pub registered: usize,
    /// Ids that already existed and were left untouched.
    pub skipped: Vec<ImageId>,
}

/// Narrow store contract consumed by the sampling allocator and pair history index.
pub trait RecordStore: Send + Sync {
    /// Number of active images matching `filter`.
    fn count_active(&self, filter: &AttributeFilter) -> Result<usize, DesignError>;

    /// Up to `limit` active image ids matching `filter`, resuming after `cursor`.
    ///
    /// Scan order is stable for a fixed pool. A single page never visits an
    /// image twice; it wraps around to the start of the pool at most once.
    fn scan_active(
        &self,
        filter: &AttributeFilter,
        cursor: &ScanCursor,
        limit: usize,
    ) -> Result<ScanPage, DesignError>;

    /// Current sampling-surplus credit for `id`.
    fn get_surplus(&self, id: &str) -> Result<i64, DesignError>;

    /// Atomically decrement the surplus credit for `id`, returning the new value.
    fn decrement_surplus(&self, id: &str) -> Result<i64, DesignError>;

    /// Historical pairs whose canonical first member is `id`.
    fn pairs_with_prefix(&self, id: &str) -> Result<Vec<PairKey>, DesignError>;

    /// True when `pair` already exists in the pair history.
    fn pair_exists(&self, pair: &PairKey) -> Result<bool, DesignError>;
}

/// Image pool lifecycle operations.
pub trait PoolAdmin: Send + Sync {
    /// Look up a single image record.
    fn image(&self, id: &str) -> Result<Option<ImageRecord>, DesignError>;

    /// Insert new images. Existing ids are left untouched and reported as skipped.
    fn register_images(
        &self,
        images: Vec<ImageRecord>,
    ) -> Result<RegistrationSummary, DesignError>;

    /// Add attribute tags to existing images. Returns how many images were updated.
    fn add_attributes(&self, ids: &[ImageId], tags: &[AttributeTag])
    -> Result<usize, DesignError>;

    /// Activate images, then reset every active image's surplus to its exposure count.
    ///
    /// Returns how many images were newly activated. The reset only runs when
    /// at least one image changed state.
    fn activate_images(&self, ids: &[ImageId]) -> Result<usize, DesignError>;

    /// Activate up to `n` inactive images matching `filter`, in store order.
    fn activate_n_images(
        &self,
        n: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ImageId>, DesignError>;

    /// Deactivate images. Returns how many images changed state.
    fn deactivate_images(&self, ids: &[ImageId]) -> Result<usize, DesignError>;

    /// Exposure summary across active images matching `filter`.
    fn exposure_stats(
        &self,
        filter: &AttributeFilter,
    ) -> Result<Option<ExposureSummary>, DesignError>;
}

/// Task registration backend.
pub trait TaskLedger: Send + Sync {
    /// Commit a generated task.
    ///
    /// When `store_pairs` is true every pair of the design is created in the
    /// pair history; if any already exists the call fails with
    /// `DesignError::PairConflict` and nothing is written. Exposure counts are
    /// incremented once per design tuple occurrence for non-practice tasks.
    fn register_task(&self, draft: &TaskDraft, store_pairs: bool)
    -> Result<TaskRecord, DesignError>;

    /// Look up a registered task.
    fn task(&self, id: &str) -> Result<Option<TaskRecord>, DesignError>;
}

/// In-memory record store for tests and short-lived pools.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<StoreState>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with `images` already registered (as given, including active flags).
    pub fn with_images<I>(images: I) -> Self
    where
        I: IntoIterator<Item = ImageRecord>,
    {
        let mut state = StoreState::default();
        state.register_images(images.into_iter().collect());
        Self {
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, DesignError> {
        self.state
            .read()
            .map_err(|_| DesignError::store("record store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, DesignError> {
        self.state
            .write()
            .map_err(|_| DesignError::store("record store lock poisoned"))
    }
}

impl RecordStore for InMemoryRecordStore {
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
        self.write()?.decrement_surplus(id)
    }

    fn pairs_with_prefix(&self, id: &str) -> Result<Vec<PairKey>, DesignError> {
        Ok(self.read()?.pairs_with_prefix(id))
    }

    fn pair_exists(&self, pair: &PairKey) -> Result<bool, DesignError> {
        Ok(self.read()?.pair_exists(pair))
    }
}

impl PoolAdmin for InMemoryRecordStore {
    fn image(&self, id: &str) -> Result<Option<ImageRecord>, DesignError> {
        Ok(self.read()?.image(id).cloned())
    }

    fn register_images(
        &self,
        images: Vec<ImageRecord>,
    ) -> Result<RegistrationSummary, DesignError> {
        Ok(self.write()?.register_images(images))
    }

    fn add_attributes(
        &self,
        ids: &[ImageId],
        tags: &[AttributeTag],
    ) -> Result<usize, DesignError> {
        Ok(self.write()?.add_attributes(ids, tags))
    }

    fn activate_images(&self, ids: &[ImageId]) -> Result<usize, DesignError> {
        Ok(self.write()?.activate_images(ids))
    }

    fn activate_n_images(
        &self,
        n: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ImageId>, DesignError> {
        Ok(self.write()?.activate_n_images(n, filter))
    }

    fn deactivate_images(&self, ids: &[ImageId]) -> Result<usize, DesignError> {
        Ok(self.write()?.deactivate_images(ids))
    }

    fn exposure_stats(
        &self,
        filter: &AttributeFilter,
    ) -> Result<Option<ExposureSummary>, DesignError> {
        Ok(self.read()?.exposure_stats(filter))
    }
}

impl TaskLedger for InMemoryRecordStore {
    fn register_task(
        &self,
        draft: &TaskDraft,
        store_pairs: bool,
    ) -> Result<TaskRecord, DesignError> {
        self.write()?.register_task(draft, store_pairs)
    }

    fn task(&self, id: &str) -> Result<Option<TaskRecord>, DesignError> {
        Ok(self.read()?.task(id).cloned())
    }
}
