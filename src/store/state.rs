use chrono::Utc;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::{debug, warn};

use crate::attributes::AttributeFilter;
use crate::data::{
    BlockKind, ImageRecord, PairKey, PairRecord, PairSet, TaskDraft, TaskRecord,
};
use crate::errors::DesignError;
use crate::history::first_conflict;
use crate::metrics::{ExposureSummary, exposure_summary};
use crate::types::{AttributeTag, ImageId, TaskId};

use super::{RegistrationSummary, ScanCursor, ScanPage};

/// Complete record store contents shared by the in-memory and file-backed stores.
///
/// Every map is ordered so scans and the persisted image catalog are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct StoreState {
    pub(crate) images: BTreeMap<ImageId, ImageRecord>,
    pub(crate) pairs: BTreeMap<PairKey, PairRecord>,
    pub(crate) tasks: BTreeMap<TaskId, TaskRecord>,
}

impl StoreState {
    fn eligible(record: &ImageRecord, filter: &AttributeFilter) -> bool {
        record.active && filter.matches(&record.attributes)
    }

    pub(crate) fn count_active(&self, filter: &AttributeFilter) -> usize {
        self.images
            .values()
            .filter(|record| Self::eligible(record, filter))
            .count()
    }

    pub(crate) fn scan_active(
        &self,
        filter: &AttributeFilter,
        cursor: &ScanCursor,
        limit: usize,
    ) -> ScanPage {
        if limit == 0 {
            return ScanPage {
                images: Vec::new(),
                cursor: cursor.clone(),
            };
        }

        let images: Vec<ImageId> = match cursor.last_visited() {
            Some(last) => {
                let tail = self
                    .images
                    .range::<str, _>((Bound::Excluded(last), Bound::Unbounded));
                let head = self
                    .images
                    .range::<str, _>((Bound::Unbounded, Bound::Included(last)));
                tail.chain(head)
                    .map(|(_, record)| record)
                    .filter(|record| Self::eligible(record, filter))
                    .take(limit)
                    .map(|record| record.id.clone())
                    .collect()
            }
            None => self
                .images
                .values()
                .filter(|record| Self::eligible(record, filter))
                .take(limit)
                .map(|record| record.id.clone())
                .collect(),
        };

        let cursor = images
            .last()
            .map(|id| ScanCursor::after(id.clone()))
            .unwrap_or_else(|| cursor.clone());
        ScanPage { images, cursor }
    }

    pub(crate) fn image(&self, id: &str) -> Option<&ImageRecord> {
        self.images.get(id)
    }

    fn image_mut(&mut self, id: &str) -> Result<&mut ImageRecord, DesignError> {
        self.images
            .get_mut(id)
            .ok_or_else(|| DesignError::UnknownImage(id.to_string()))
    }

    pub(crate) fn surplus(&self, id: &str) -> Result<i64, DesignError> {
        self.image(id)
            .map(|record| record.sampling_surplus)
            .ok_or_else(|| DesignError::UnknownImage(id.to_string()))
    }

    pub(crate) fn decrement_surplus(&mut self, id: &str) -> Result<i64, DesignError> {
        let record = self.image_mut(id)?;
        record.sampling_surplus = record.sampling_surplus.saturating_sub(1);
        Ok(record.sampling_surplus)
    }

    pub(crate) fn pairs_with_prefix(&self, id: &str) -> Vec<PairKey> {
        self.pairs
            .range(PairKey::prefix_start(id)..)
            .take_while(|(pair, _)| pair.first() == id)
            .map(|(pair, _)| pair.clone())
            .collect()
    }

    pub(crate) fn pair_exists(&self, pair: &PairKey) -> bool {
        self.pairs.contains_key(pair)
    }

    pub(crate) fn register_images(&mut self, images: Vec<ImageRecord>) -> RegistrationSummary {
        let mut summary = RegistrationSummary::default();
        for image in images {
            if self.images.contains_key(&image.id) {
                summary.skipped.push(image.id);
                continue;
            }
            self.images.insert(image.id.clone(), image);
            summary.registered += 1;
        }
        if !summary.skipped.is_empty() {
            debug!(
                skipped = summary.skipped.len(),
                "skipped already registered images"
            );
        }
        summary
    }

    pub(crate) fn add_attributes(&mut self, ids: &[ImageId], tags: &[AttributeTag]) -> usize {
        let mut updated = 0;
        for id in ids {
            let Some(record) = self.images.get_mut(id) else {
                warn!(image = %id, "cannot tag unknown image");
                continue;
            };
            let before = record.attributes.len();
            record.attributes.extend(
                tags.iter()
                    .filter(|tag| !tag.trim().is_empty())
                    .cloned(),
            );
            if record.attributes.len() != before {
                updated += 1;
            }
        }
        updated
    }

    pub(crate) fn activate_images(&mut self, ids: &[ImageId]) -> usize {
        let mut activated = 0;
        for id in ids {
            match self.images.get_mut(id) {
                Some(record) if !record.active => {
                    record.active = true;
                    activated += 1;
                }
                Some(_) => {}
                None => warn!(image = %id, "cannot activate unknown image"),
            }
        }
        if activated > 0 {
            self.reset_sampling_surplus();
        }
        activated
    }

    /// Newly active images have no exposure, so every active image gets
    /// credit equal to its exposure to let the newcomers catch up.
    fn reset_sampling_surplus(&mut self) {
        for record in self.images.values_mut().filter(|record| record.active) {
            record.sampling_surplus = i64::try_from(record.times_seen).unwrap_or(i64::MAX);
        }
    }

    pub(crate) fn activate_n_images(&mut self, n: usize, filter: &AttributeFilter) -> Vec<ImageId> {
        let ids: Vec<ImageId> = self
            .images
            .values()
            .filter(|record| !record.active && filter.matches(&record.attributes))
            .take(n)
            .map(|record| record.id.clone())
            .collect();
        if ids.len() < n {
            warn!(
                requested = n,
                found = ids.len(),
                "fewer inactive images than requested"
            );
        }
        self.activate_images(&ids);
        ids
    }

    pub(crate) fn deactivate_images(&mut self, ids: &[ImageId]) -> usize {
        let mut deactivated = 0;
        for id in ids {
            match self.images.get_mut(id) {
                Some(record) if record.active => {
                    record.active = false;
                    deactivated += 1;
                }
                Some(_) => {}
                None => warn!(image = %id, "cannot deactivate unknown image"),
            }
        }
        deactivated
    }

    pub(crate) fn exposure_stats(&self, filter: &AttributeFilter) -> Option<ExposureSummary> {
        exposure_summary(
            self.images
                .values()
                .filter(|record| Self::eligible(record, filter))
                .map(|record| record.times_seen),
        )
    }

    pub(crate) fn task(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    /// First stored pair the draft would reuse, reported in design order.
    pub(crate) fn conflicting_pair(&self, draft: &TaskDraft) -> Option<PairKey> {
        let observed: PairSet = draft
            .pairs()
            .into_iter()
            .filter(|pair| self.pairs.contains_key(pair))
            .collect();
        draft
            .design
            .iter()
            .find_map(|tuple| first_conflict(tuple, &observed))
            .cloned()
    }

    /// Validate a draft and stage its effects without touching the state.
    pub(crate) fn prepare_task(
        &self,
        draft: &TaskDraft,
        store_pairs: bool,
    ) -> Result<PreparedTask, DesignError> {
        if self.tasks.contains_key(&draft.id) {
            return Err(duplicate_task(&draft.id));
        }
        for image in draft.design.iter().flatten() {
            match self.images.get(image) {
                Some(record) if !record.active => {
                    warn!(image = %image, task = %draft.id, "registering task with inactive image");
                }
                Some(_) => {}
                None => return Err(DesignError::UnknownImage(image.clone())),
            }
        }
        if store_pairs && let Some(pair) = self.conflicting_pair(draft) {
            return Err(DesignError::PairConflict { pair });
        }

        let mut exposed: BTreeMap<ImageId, ImageRecord> = BTreeMap::new();
        if !draft.practice {
            for image in draft.design.iter().flatten() {
                if !exposed.contains_key(image) {
                    let record = self
                        .image(image)
                        .cloned()
                        .ok_or_else(|| DesignError::UnknownImage(image.clone()))?;
                    exposed.insert(image.clone(), record);
                }
                if let Some(record) = exposed.get_mut(image) {
                    record.times_seen = record.times_seen.saturating_add(1);
                }
            }
        }
        let pairs = if store_pairs {
            draft
                .pairs()
                .into_iter()
                .map(|pair| PairRecord {
                    pair,
                    task_id: draft.id.clone(),
                    attribute: draft.attribute.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut tuples = Vec::with_capacity(draft.trial_count());
        let mut tuple_kinds: Vec<BlockKind> = Vec::with_capacity(draft.trial_count());
        for block in &draft.blocks {
            tuples.extend(block.tuples.iter().cloned());
            tuple_kinds.extend(std::iter::repeat_n(block.kind, block.len()));
        }
        let record = TaskRecord {
            id: draft.id.clone(),
            practice: draft.practice,
            attribute: draft.attribute.clone(),
            image_attributes: draft.image_filter.tags().map(str::to_string).collect(),
            tuples,
            tuple_kinds,
            blocks: draft.blocks.clone(),
            registered_at: Utc::now(),
        };
        Ok(PreparedTask {
            record,
            exposed: exposed.into_values().collect(),
            pairs,
        })
    }

    /// Apply the exposure and pair effects of a prepared task.
    pub(crate) fn apply_task_effects(&mut self, prepared: &PreparedTask) {
        for record in &prepared.exposed {
            self.images.insert(record.id.clone(), record.clone());
        }
        for record in &prepared.pairs {
            self.pairs.insert(record.pair.clone(), record.clone());
        }
    }

    /// Validate everything first, then apply; a failed registration leaves no trace.
    pub(crate) fn register_task(
        &mut self,
        draft: &TaskDraft,
        store_pairs: bool,
    ) -> Result<TaskRecord, DesignError> {
        let prepared = self.prepare_task(draft, store_pairs)?;
        self.apply_task_effects(&prepared);
        let record = prepared.record;
        self.tasks.insert(record.id.clone(), record.clone());
        debug!(task = %record.id, trials = record.tuples.len(), "registered task");
        Ok(record)
    }
}

/// Validated task registration: the record plus the state changes it implies.
#[derive(Clone, Debug)]
pub(crate) struct PreparedTask {
    pub(crate) record: TaskRecord,
    /// Image records with their exposure already bumped.
    pub(crate) exposed: Vec<ImageRecord>,
    /// New pair history rows (empty when pairs are not stored).
    pub(crate) pairs: Vec<PairRecord>,
}

pub(crate) fn duplicate_task(id: &str) -> DesignError {
    DesignError::Configuration(format!("task '{id}' is already registered"))
}
