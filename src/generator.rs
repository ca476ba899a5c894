use rand::RngCore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::allocator::{AllocationRequest, allocate_images};
use crate::blocks::assemble_blocks;
use crate::config::TaskConfig;
use crate::constants::task::{PRACTICE_ID_PREFIX, TASK_ID_PREFIX};
use crate::data::{TaskDraft, TaskRecord};
use crate::design::build_design;
use crate::errors::DesignError;
use crate::history::preexisting_pairs;
use crate::rng::DeterministicRng;
use crate::store::{RecordStore, ScanCursor, TaskLedger};
use chrono::Utc;

/// Resumable generator state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorCheckpoint {
    /// Internal RNG state.
    pub rng_state: u64,
    /// Scan position the next allocation resumes from.
    pub cursor: ScanCursor,
}

/// Produces task drafts from a shared record store and commits them back.
///
/// One generator serializes its own requests; several generators may share a
/// store, each with its own cursor and RNG stream.
pub struct TaskGenerator<S: RecordStore + TaskLedger + 'static> {
    inner: Mutex<TaskGeneratorInner<S>>,
}

struct TaskGeneratorInner<S: RecordStore + TaskLedger + 'static> {
    store: Arc<S>,
    rng: DeterministicRng,
    cursor: ScanCursor,
}

impl<S: RecordStore + TaskLedger + 'static> TaskGeneratorInner<S> {
    fn generate(&mut self, config: &TaskConfig) -> Result<TaskDraft, DesignError> {
        config.validate()?;

        let request = AllocationRequest {
            count: config.num_images,
            filter: config.image_filter.clone(),
            practice: config.practice,
        };
        let allocation = allocate_images(self.store.as_ref(), &request, &self.cursor, &mut self.rng)?;
        self.cursor = allocation.cursor;

        let mut candidates = allocation.images;
        candidates.shuffle(&mut self.rng);

        let excluded = preexisting_pairs(self.store.as_ref(), &candidates)?;
        let design = build_design(&candidates, config.design_params(), &excluded)?;
        let assembled = assemble_blocks(&design.tuples, &config.block_plan(), &mut self.rng)?;

        let prefix = if config.practice {
            PRACTICE_ID_PREFIX
        } else {
            TASK_ID_PREFIX
        };
        let id = format!("{prefix}{:016x}", self.rng.next_u64());

        let draft = TaskDraft {
            id,
            practice: config.practice,
            attribute: config.attribute.to_string(),
            image_filter: config.image_filter.clone(),
            design: design.tuples,
            blocks: assembled.blocks,
            image_indices: assembled.image_indices,
            created_at: Utc::now(),
        };
        info!(
            task = %draft.id,
            practice = draft.practice,
            images = draft.image_indices.len(),
            tuples = draft.design.len(),
            trials = draft.trial_count(),
            throttled = allocation.throttled,
            excluded = excluded.len(),
            "generated task"
        );
        Ok(draft)
    }
}

impl<S: RecordStore + TaskLedger + 'static> TaskGenerator<S> {
    /// Create a generator over `store` with a deterministic `seed`.
    pub fn new(store: Arc<S>, seed: u64) -> Self {
        Self::from_parts(store, DeterministicRng::new(seed), ScanCursor::start())
    }

    /// Recreate a generator from a previously taken checkpoint.
    pub fn resume(store: Arc<S>, checkpoint: GeneratorCheckpoint) -> Self {
        Self::from_parts(
            store,
            DeterministicRng::from_state(checkpoint.rng_state),
            checkpoint.cursor,
        )
    }

    fn from_parts(store: Arc<S>, rng: DeterministicRng, cursor: ScanCursor) -> Self {
        Self {
            inner: Mutex::new(TaskGeneratorInner { store, rng, cursor }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TaskGeneratorInner<S>>, DesignError> {
        self.inner
            .lock()
            .map_err(|_| DesignError::Configuration("task generator lock poisoned".into()))
    }

    /// Shared record store.
    pub fn store(&self) -> Result<Arc<S>, DesignError> {
        Ok(Arc::clone(&self.lock()?.store))
    }

    /// Capture RNG and scan position so a later generator can continue the same stream.
    pub fn checkpoint(&self) -> Result<GeneratorCheckpoint, DesignError> {
        let inner = self.lock()?;
        Ok(GeneratorCheckpoint {
            rng_state: inner.rng.state(),
            cursor: inner.cursor.clone(),
        })
    }

    /// Allocate images, build a design and arrange it into blocks.
    ///
    /// Nothing is written to the store apart from surplus decrements made by
    /// the allocator; call [`TaskGenerator::register`] to commit the draft.
    pub fn generate(&self, config: &TaskConfig) -> Result<TaskDraft, DesignError> {
        self.lock()?.generate(config)
    }

    /// Commit `draft`, writing its pairs when [`TaskConfig::stores_pairs`] says so.
    ///
    /// `config` must be the one the draft was generated with; a practice
    /// mismatch is rejected before anything is written.
    pub fn register(
        &self,
        draft: &TaskDraft,
        config: &TaskConfig,
    ) -> Result<TaskRecord, DesignError> {
        if draft.practice != config.practice {
            return Err(DesignError::Configuration(format!(
                "task '{}' was drafted with practice={} but registered with practice={}",
                draft.id, draft.practice, config.practice
            )));
        }
        let store = self.store()?;
        let store_pairs = config.stores_pairs();
        let record = store.register_task(draft, store_pairs)?;
        debug!(task = %record.id, store_pairs, "committed task");
        Ok(record)
    }

    /// Generate a task and commit it in one step.
    pub fn generate_and_register(
        &self,
        config: &TaskConfig,
    ) -> Result<(TaskDraft, TaskRecord), DesignError> {
        let draft = self.generate(config)?;
        let record = self.register(&draft, config)?;
        Ok((draft, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ImageRecord;
    use crate::store::{InMemoryRecordStore, PoolAdmin};
    use crate::types::ImageId;

    fn store_with_pool(size: usize) -> Arc<InMemoryRecordStore> {
        let store = InMemoryRecordStore::new();
        let ids: Vec<ImageId> = (0..size).map(|idx| format!("img_{idx:03}")).collect();
        store
            .register_images(ids.iter().map(ImageRecord::new).collect())
            .unwrap();
        store.activate_images(&ids).unwrap();
        Arc::new(store)
    }

    fn small_config() -> TaskConfig {
        TaskConfig {
            num_images: 6,
            tuple_size: 2,
            min_occurrences: 1,
            keep_blocks: Some(1),
            reject_blocks: Some(1),
            ..TaskConfig::default()
        }
    }

    #[test]
    fn generated_draft_has_prefixed_id_and_full_blocks() {
        let generator = TaskGenerator::new(store_with_pool(12), 17);
        let draft = generator.generate(&small_config()).unwrap();
        assert!(draft.id.starts_with(TASK_ID_PREFIX));
        assert_eq!(draft.id.len(), TASK_ID_PREFIX.len() + 16);
        assert_eq!(draft.design.len(), 3);
        assert_eq!(draft.blocks.len(), 2);
        assert_eq!(draft.trial_count(), 6);
        assert_eq!(draft.image_indices.len(), 6);
    }

    #[test]
    fn practice_ids_use_practice_prefix() {
        let generator = TaskGenerator::new(store_with_pool(12), 17);
        let config = TaskConfig {
            practice: true,
            ..small_config()
        };
        let draft = generator.generate(&config).unwrap();
        assert!(draft.id.starts_with(PRACTICE_ID_PREFIX));
        assert!(draft.practice);
    }

    #[test]
    fn same_seed_and_pool_reproduce_the_draft() {
        let first = TaskGenerator::new(store_with_pool(20), 99)
            .generate(&small_config())
            .unwrap();
        let second = TaskGenerator::new(store_with_pool(20), 99)
            .generate(&small_config())
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.design, second.design);
        assert_eq!(first.blocks, second.blocks);
    }

    #[test]
    fn checkpoint_resumes_the_same_stream() {
        let store = store_with_pool(30);
        let original = TaskGenerator::new(Arc::clone(&store), 5);
        original.generate(&small_config()).unwrap();
        let checkpoint = original.checkpoint().unwrap();

        let resumed = TaskGenerator::resume(Arc::clone(&store), checkpoint.clone());
        assert_eq!(resumed.checkpoint().unwrap(), checkpoint);
        assert!(checkpoint.cursor.last_visited().is_some());
    }

    #[test]
    fn invalid_config_fails_before_touching_the_pool() {
        let store = store_with_pool(4);
        let generator = TaskGenerator::new(Arc::clone(&store), 1);
        let config = TaskConfig {
            num_images: 4,
            tuple_size: 5,
            ..TaskConfig::default()
        };
        assert!(matches!(
            generator.generate(&config),
            Err(DesignError::Configuration(_))
        ));
        assert_eq!(generator.checkpoint().unwrap().cursor, ScanCursor::start());
    }

    #[test]
    fn registration_commits_pairs_and_exposure() {
        let store = store_with_pool(12);
        let generator = TaskGenerator::new(Arc::clone(&store), 8);
        let (draft, record) = generator.generate_and_register(&small_config()).unwrap();
        assert_eq!(record.id, draft.id);
        for pair in draft.pairs() {
            assert!(store.pair_exists(&pair).unwrap());
        }
        for image in draft.images() {
            assert_eq!(store.image(image).unwrap().unwrap().times_seen, 1);
        }
        // The same draft cannot be committed twice.
        assert!(generator.register(&draft, &small_config()).is_err());
    }

    #[test]
    fn registration_rejects_a_config_with_another_practice_flag() {
        let store = store_with_pool(12);
        let generator = TaskGenerator::new(Arc::clone(&store), 12);
        let draft = generator.generate(&small_config()).unwrap();
        let practice = TaskConfig {
            practice: true,
            ..small_config()
        };
        assert!(matches!(
            generator.register(&draft, &practice),
            Err(DesignError::Configuration(_))
        ));
        assert!(store.task(&draft.id).unwrap().is_none());
        for pair in draft.pairs() {
            assert!(!store.pair_exists(&pair).unwrap());
        }
    }
}
