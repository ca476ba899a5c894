//! Presentation blocks and response consistency checks.
//!
//! Every design tuple is shown once per enabled category. Each category gets
//! its own shuffle of tuple order and within-tuple image order, is split into
//! evenly sized blocks, and the categories are interleaved keep-first. The
//! per-trial index maps tie every shown position back to a task-local image
//! index and to the tuple's position in the design, which is what
//! [`find_contradictions`] uses to compare keep and reject answers.

use indexmap::IndexMap;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::constants::blocks::{
    DEFAULT_KEEP_BLOCKS, DEFAULT_PROMPT, DEFAULT_REJECT_BLOCKS, KEEP_INSTRUCTIONS,
    REJECT_INSTRUCTIONS,
};
use crate::data::{Block, BlockKind, ImageTuple};
use crate::errors::DesignError;
use crate::types::{ImageId, TaskImageIndex};
use crate::utils::split_evenly;

/// Block layout and worker-facing text for one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPlan {
    /// Keep blocks; `0` disables the keep category.
    pub keep_blocks: usize,
    /// Reject blocks; `0` disables the reject category.
    pub reject_blocks: usize,
    /// Prompt shown above every trial.
    pub prompt: String,
    /// Text attached to keep blocks.
    pub keep_instructions: String,
    /// Text attached to reject blocks.
    pub reject_instructions: String,
    /// Shuffle the interleaved block sequence as a whole.
    pub randomize_block_order: bool,
}

impl Default for BlockPlan {
    fn default() -> Self {
        Self {
            keep_blocks: DEFAULT_KEEP_BLOCKS,
            reject_blocks: DEFAULT_REJECT_BLOCKS,
            prompt: DEFAULT_PROMPT.to_string(),
            keep_instructions: KEEP_INSTRUCTIONS.to_string(),
            reject_instructions: REJECT_INSTRUCTIONS.to_string(),
            randomize_block_order: false,
        }
    }
}

impl BlockPlan {
    fn instructions(&self, kind: BlockKind) -> &str {
        match kind {
            BlockKind::Keep => &self.keep_instructions,
            BlockKind::Reject => &self.reject_instructions,
        }
    }
}

/// Blocks in presentation order plus the task-local image index space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledBlocks {
    /// Blocks in presentation order.
    pub blocks: Vec<Block>,
    /// Image to task-local index, by first occurrence across the design.
    pub image_indices: IndexMap<ImageId, TaskImageIndex>,
}

/// Arrange design `tuples` into keep and reject blocks according to `plan`.
pub fn assemble_blocks<R>(
    tuples: &[ImageTuple],
    plan: &BlockPlan,
    rng: &mut R,
) -> Result<AssembledBlocks, DesignError>
where
    R: Rng,
{
    if tuples.is_empty() {
        return Err(DesignError::Configuration(
            "cannot assemble blocks from an empty design".into(),
        ));
    }
    if plan.keep_blocks + plan.reject_blocks == 0 {
        return Err(DesignError::Configuration(
            "block plan needs at least one keep or reject block".into(),
        ));
    }

    let mut image_indices: IndexMap<ImageId, TaskImageIndex> = IndexMap::new();
    for image in tuples.iter().flatten() {
        let next = image_indices.len();
        image_indices.entry(image.clone()).or_insert(next);
    }

    let keep = category_blocks(BlockKind::Keep, plan.keep_blocks, tuples, plan, &image_indices, rng);
    let reject = category_blocks(
        BlockKind::Reject,
        plan.reject_blocks,
        tuples,
        plan,
        &image_indices,
        rng,
    );

    let mut blocks = Vec::with_capacity(keep.len() + reject.len());
    let mut keep = keep.into_iter();
    let mut reject = reject.into_iter();
    loop {
        let next_keep = keep.next();
        let next_reject = reject.next();
        if next_keep.is_none() && next_reject.is_none() {
            break;
        }
        blocks.extend(next_keep);
        blocks.extend(next_reject);
    }
    if plan.randomize_block_order {
        blocks.shuffle(rng);
    }

    debug!(
        tuples = tuples.len(),
        blocks = blocks.len(),
        images = image_indices.len(),
        "assembled blocks"
    );
    Ok(AssembledBlocks {
        blocks,
        image_indices,
    })
}

fn category_blocks<R: Rng>(
    kind: BlockKind,
    count: usize,
    tuples: &[ImageTuple],
    plan: &BlockPlan,
    image_indices: &IndexMap<ImageId, TaskImageIndex>,
    rng: &mut R,
) -> Vec<Block> {
    if count == 0 {
        return Vec::new();
    }
    let shuffled = shuffle_tuples(tuples, rng);
    split_evenly(shuffled, count)
        .into_iter()
        .map(|chunk| {
            let mut block = Block {
                kind,
                prompt: plan.prompt.clone(),
                instructions: plan.instructions(kind).to_string(),
                tuples: Vec::with_capacity(chunk.len()),
                image_index_map: Vec::with_capacity(chunk.len()),
                design_tuple_indices: Vec::with_capacity(chunk.len()),
            };
            for (design_idx, tuple) in chunk {
                block.image_index_map.push(
                    tuple
                        .iter()
                        .map(|image| image_indices.get(image).copied().unwrap_or_default())
                        .collect(),
                );
                block.design_tuple_indices.push(design_idx);
                block.tuples.push(tuple);
            }
            block
        })
        .collect()
}

/// Shuffle tuple order and the image order inside every tuple, keeping each tuple's design index.
fn shuffle_tuples<R: Rng>(tuples: &[ImageTuple], rng: &mut R) -> Vec<(usize, ImageTuple)> {
    let mut order: Vec<usize> = (0..tuples.len()).collect();
    order.shuffle(rng);
    order
        .into_iter()
        .map(|idx| {
            let mut tuple = tuples[idx].clone();
            tuple.shuffle(rng);
            (idx, tuple)
        })
        .collect()
}

/// One worker answer for a single trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResponse {
    /// Block position in presentation order.
    pub block: usize,
    /// Trial position inside the block.
    pub trial: usize,
    /// In-tuple position of the chosen image; `None` when the trial went unanswered.
    pub choice: Option<usize>,
}

/// Keep/reject agreement summary for one set of responses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContradictionReport {
    /// Trials across all blocks.
    pub trials: usize,
    /// Trials with a recorded choice.
    pub answered: usize,
    /// Trials without a response or with an empty choice.
    pub unanswered: usize,
    /// Design tuples answered in both a keep and a reject trial.
    pub compared: usize,
    /// Compared tuples where the same image was both kept and rejected.
    pub contradictions: usize,
    /// Design indices of the contradicting tuples, ascending.
    pub contradicting_tuples: Vec<usize>,
}

impl ContradictionReport {
    /// Share of compared tuples that contradict, or `None` when nothing was compared.
    pub fn contradiction_rate(&self) -> Option<f64> {
        (self.compared > 0).then(|| self.contradictions as f64 / self.compared as f64)
    }

    /// Share of trials left unanswered, or `None` for an empty task.
    pub fn unanswered_rate(&self) -> Option<f64> {
        (self.trials > 0).then(|| self.unanswered as f64 / self.trials as f64)
    }
}

#[derive(Default)]
struct TupleAnswers {
    keep: Option<TaskImageIndex>,
    reject: Option<TaskImageIndex>,
}

/// Compare keep and reject answers for every design tuple shown in both categories.
///
/// Responses must address existing trials, choose an in-range position, and
/// appear at most once per trial; anything else is
/// [`DesignError::MalformedResponse`].
pub fn find_contradictions(
    blocks: &[Block],
    responses: &[TrialResponse],
) -> Result<ContradictionReport, DesignError> {
    let trials = blocks.iter().map(Block::len).sum();
    let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(responses.len());
    let mut answers: BTreeMap<usize, TupleAnswers> = BTreeMap::new();
    let mut answered = 0usize;

    for response in responses {
        let block = blocks.get(response.block).ok_or_else(|| {
            DesignError::MalformedResponse(format!(
                "block {} out of range ({} blocks)",
                response.block,
                blocks.len()
            ))
        })?;
        let tuple = block.tuples.get(response.trial).ok_or_else(|| {
            DesignError::MalformedResponse(format!(
                "trial {} out of range for block {} ({} trials)",
                response.trial,
                response.block,
                block.len()
            ))
        })?;
        if !seen.insert((response.block, response.trial)) {
            return Err(DesignError::MalformedResponse(format!(
                "duplicate response for block {} trial {}",
                response.block, response.trial
            )));
        }
        let Some(choice) = response.choice else {
            continue;
        };
        if choice >= tuple.len() {
            return Err(DesignError::MalformedResponse(format!(
                "choice {choice} out of range for a tuple of {}",
                tuple.len()
            )));
        }
        let image = block
            .image_index_map
            .get(response.trial)
            .and_then(|row| row.get(choice))
            .copied()
            .ok_or_else(|| {
                DesignError::MalformedResponse(format!(
                    "block {} is missing its image index map for trial {}",
                    response.block, response.trial
                ))
            })?;
        let design_idx = block
            .design_tuple_indices
            .get(response.trial)
            .copied()
            .ok_or_else(|| {
                DesignError::MalformedResponse(format!(
                    "block {} is missing its design index for trial {}",
                    response.block, response.trial
                ))
            })?;
        answered += 1;
        let entry = answers.entry(design_idx).or_default();
        match block.kind {
            BlockKind::Keep => entry.keep = Some(image),
            BlockKind::Reject => entry.reject = Some(image),
        }
    }

    let mut report = ContradictionReport {
        trials,
        answered,
        unanswered: trials.saturating_sub(answered),
        ..ContradictionReport::default()
    };
    for (design_idx, tuple_answers) in answers {
        if let (Some(kept), Some(rejected)) = (tuple_answers.keep, tuple_answers.reject) {
            report.compared += 1;
            if kept == rejected {
                report.contradictions += 1;
                report.contradicting_tuples.push(design_idx);
            }
        }
    }
    Ok(report)
}
