use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::attributes::AttributeFilter;
use crate::constants::store::PAIR_KEY_DELIMITER;

pub use crate::types::{
    AttributeTag, ImageId, ImageTuple, TaskAttribute, TaskId, TaskImageIndex,
};

/// Stored state for a single image.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageRecord {
    /// Stable image identifier (store row key).
    pub id: ImageId,
    /// Where the image can be fetched from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Free-form tags used to build candidate pools.
    pub attributes: BTreeSet<AttributeTag>,
    /// Whether the image is eligible for new designs.
    pub active: bool,
    /// Number of non-practice tuples this image has been placed into.
    pub times_seen: u64,
    /// Throttling credit; positive values make the allocator skip the image.
    pub sampling_surplus: i64,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

impl ImageRecord {
    /// New inactive image with no exposure history.
    pub fn new(id: impl Into<ImageId>) -> Self {
        Self {
            id: id.into(),
            url: None,
            attributes: BTreeSet::new(),
            active: false,
            times_seen: 0,
            sampling_surplus: 0,
            registered_at: Utc::now(),
        }
    }

    /// Attach a source URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add attribute tags.
    pub fn with_attributes<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AttributeTag>,
    {
        self.attributes.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Seed an exposure count (used when importing legacy history).
    pub fn with_times_seen(mut self, times_seen: u64) -> Self {
        self.times_seen = times_seen;
        self
    }
}

/// Unordered image pair in canonical (lexicographic) order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    first: ImageId,
    second: ImageId,
}

impl PairKey {
    /// Canonicalize two image ids into a pair key. Argument order does not matter.
    pub fn new(a: impl Into<ImageId>, b: impl Into<ImageId>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// Smallest key whose first member is `id`; used as a range bound for prefix scans.
    pub(crate) fn prefix_start(id: &str) -> Self {
        Self {
            first: id.to_string(),
            second: String::new(),
        }
    }

    /// Lexicographically first member.
    pub fn first(&self) -> &str {
        &self.first
    }

    /// Lexicographically second member.
    pub fn second(&self) -> &str {
        &self.second
    }

    /// True when `id` is one of the two members.
    pub fn contains(&self, id: &str) -> bool {
        self.first == id || self.second == id
    }

    /// The member that is not `id`, if `id` is part of the pair.
    pub fn other(&self, id: &str) -> Option<&str> {
        if self.first == id {
            Some(&self.second)
        } else if self.second == id {
            Some(&self.first)
        } else {
            None
        }
    }

    /// Row key used by stores (`first,second`).
    pub fn row_key(&self) -> String {
        format!("{}{}{}", self.first, PAIR_KEY_DELIMITER, self.second)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.row_key())
    }
}

/// Flat set of canonical pairs used for membership tests during design construction.
pub type PairSet = HashSet<PairKey>;

/// All unordered pairs inside a tuple, canonicalized.
pub fn tuple_pairs(tuple: &[ImageId]) -> impl Iterator<Item = PairKey> + '_ {
    tuple.iter().enumerate().flat_map(move |(idx, a)| {
        tuple[idx + 1..]
            .iter()
            .map(move |b| PairKey::new(a.clone(), b.clone()))
    })
}

/// Persisted pair history entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairRecord {
    /// Canonical pair.
    pub pair: PairKey,
    /// Task whose registration created the pair.
    pub task_id: TaskId,
    /// Attribute of that task.
    pub attribute: TaskAttribute,
}

/// Output of one design run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Design {
    /// Tuples in generation order.
    pub tuples: Vec<ImageTuple>,
    /// Candidate images in the order the builder indexed them.
    pub candidates: Vec<ImageId>,
    /// Appearances per candidate, aligned with `candidates`.
    pub occurrences: Vec<usize>,
    /// Images per tuple.
    pub tuple_size: usize,
    /// Occurrence target the design reached.
    pub min_occurrences: usize,
}

impl Design {
    /// Number of tuples in the design.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// True when the design has no tuples.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Every unordered pair the design introduces.
    pub fn pairs(&self) -> BTreeSet<PairKey> {
        self.tuples.iter().flat_map(|tuple| tuple_pairs(tuple)).collect()
    }
}

/// Presentation category of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Worker picks the image to keep.
    Keep,
    /// Worker picks the image to throw away.
    Reject,
}

impl BlockKind {
    /// Lowercase label used in serialized task payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Keep => "keep",
            BlockKind::Reject => "reject",
        }
    }
}

/// Contiguous run of trials sharing a category and instructions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Keep or reject.
    pub kind: BlockKind,
    /// Prompt shown above every trial.
    pub prompt: String,
    /// Category-specific instructions.
    pub instructions: String,
    /// Trials in presentation order; image order within each tuple is shuffled.
    pub tuples: Vec<ImageTuple>,
    /// Per trial, the task-local image index of each in-tuple position.
    pub image_index_map: Vec<Vec<TaskImageIndex>>,
    /// Per trial, the tuple's position in the source design.
    pub design_tuple_indices: Vec<usize>,
}

impl Block {
    /// Number of trials in the block.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// True when the block has no trials.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

/// A generated, not yet registered, task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Prefixed random identifier.
    pub id: TaskId,
    /// Practice tasks use the practice id prefix and defaults.
    pub practice: bool,
    /// Judgement workers are asked to make.
    pub attribute: TaskAttribute,
    /// Filter used to select the candidate pool.
    pub image_filter: AttributeFilter,
    /// Source design tuples (one entry per design tuple, not per presentation).
    pub design: Vec<ImageTuple>,
    /// Blocks in presentation order.
    pub blocks: Vec<Block>,
    /// Task-local image index space (first occurrence across the design).
    pub image_indices: IndexMap<ImageId, TaskImageIndex>,
    /// Generation time.
    pub created_at: DateTime<Utc>,
}

impl TaskDraft {
    /// Category and tuples per block, in presentation order.
    pub fn experiment_sequence(&self) -> Vec<(BlockKind, Vec<ImageTuple>)> {
        self.blocks
            .iter()
            .map(|block| (block.kind, block.tuples.clone()))
            .collect()
    }

    /// Total trials across all blocks.
    pub fn trial_count(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    /// Distinct images used by the task.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.image_indices.keys().map(String::as_str)
    }

    /// Pairs the task will add to the pair history once registered.
    pub fn pairs(&self) -> BTreeSet<PairKey> {
        self.design.iter().flat_map(|tuple| tuple_pairs(tuple)).collect()
    }
}

/// A task as persisted by a record store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    /// Task identifier.
    pub id: TaskId,
    /// Whether the task was a practice run.
    pub practice: bool,
    /// Judgement workers were asked to make.
    pub attribute: TaskAttribute,
    /// Filter tags the candidate pool was drawn with.
    pub image_attributes: Vec<AttributeTag>,
    /// Tuples in presentation order, across all blocks.
    pub tuples: Vec<ImageTuple>,
    /// Block category of each entry in `tuples`.
    pub tuple_kinds: Vec<BlockKind>,
    /// Blocks as they will be presented.
    pub blocks: Vec<Block>,
    /// Commit time.
    pub registered_at: DateTime<Utc>,
}
