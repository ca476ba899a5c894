use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::attributes::AttributeFilter;
use crate::blocks::BlockPlan;
use crate::constants::blocks::{
    DEFAULT_KEEP_BLOCKS, DEFAULT_PROMPT, DEFAULT_REJECT_BLOCKS, DEFAULT_TASK_ATTRIBUTE,
    KEEP_INSTRUCTIONS, PRACTICE_KEEP_BLOCKS, PRACTICE_PROMPT, PRACTICE_REJECT_BLOCKS,
    REJECT_INSTRUCTIONS,
};
use crate::constants::design::{
    DEFAULT_MIN_OCCURRENCES, DEFAULT_NUM_IMAGES, DEFAULT_TUPLE_SIZE, PRACTICE_NUM_IMAGES,
};
use crate::design::DesignParams;
use crate::errors::DesignError;

/// Settings for generating one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Candidate images drawn from the active pool (`n`).
    pub num_images: usize,
    /// Images per trial (`t`).
    pub tuple_size: usize,
    /// Minimum appearances per candidate (`j`).
    pub min_occurrences: usize,
    /// Keep blocks; `None` uses the practice or real-task default.
    pub keep_blocks: Option<usize>,
    /// Reject blocks; `None` uses the practice or real-task default.
    pub reject_blocks: Option<usize>,
    /// Prompt shown above every trial; `None` uses the practice or real-task default.
    pub prompt: Option<Cow<'static, str>>,
    /// Instructions attached to keep blocks.
    pub keep_instructions: Cow<'static, str>,
    /// Instructions attached to reject blocks.
    pub reject_instructions: Cow<'static, str>,
    /// Shuffle the interleaved block sequence.
    pub randomize_block_order: bool,
    /// Candidate pool predicate.
    pub image_filter: AttributeFilter,
    /// Label of the judgement workers are asked to make.
    pub attribute: Cow<'static, str>,
    /// Practice tasks skip surplus throttling and exposure counting.
    pub practice: bool,
    /// Record pairs from practice tasks in the pair history too.
    pub store_practice_pairs: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            num_images: DEFAULT_NUM_IMAGES,
            tuple_size: DEFAULT_TUPLE_SIZE,
            min_occurrences: DEFAULT_MIN_OCCURRENCES,
            keep_blocks: None,
            reject_blocks: None,
            prompt: None,
            keep_instructions: Cow::Borrowed(KEEP_INSTRUCTIONS),
            reject_instructions: Cow::Borrowed(REJECT_INSTRUCTIONS),
            randomize_block_order: false,
            image_filter: AttributeFilter::any(),
            attribute: Cow::Borrowed(DEFAULT_TASK_ATTRIBUTE),
            practice: false,
            store_practice_pairs: false,
        }
    }
}

impl TaskConfig {
    /// Defaults for a practice task.
    pub fn practice() -> Self {
        Self {
            num_images: PRACTICE_NUM_IMAGES,
            practice: true,
            ..Self::default()
        }
    }

    /// Keep blocks after applying the practice or real-task default.
    pub fn resolved_keep_blocks(&self) -> usize {
        self.keep_blocks.unwrap_or(if self.practice {
            PRACTICE_KEEP_BLOCKS
        } else {
            DEFAULT_KEEP_BLOCKS
        })
    }

    /// Reject blocks after applying the practice or real-task default.
    pub fn resolved_reject_blocks(&self) -> usize {
        self.reject_blocks.unwrap_or(if self.practice {
            PRACTICE_REJECT_BLOCKS
        } else {
            DEFAULT_REJECT_BLOCKS
        })
    }

    /// Prompt after applying the practice or real-task default.
    pub fn resolved_prompt(&self) -> &str {
        match &self.prompt {
            Some(prompt) => prompt.as_ref(),
            None if self.practice => PRACTICE_PROMPT,
            None => DEFAULT_PROMPT,
        }
    }

    /// Whether registering this task writes its pairs to the history.
    pub fn stores_pairs(&self) -> bool {
        !self.practice || self.store_practice_pairs
    }

    /// Design shape for the builder.
    pub fn design_params(&self) -> DesignParams {
        DesignParams::new(self.tuple_size, self.min_occurrences)
    }

    /// Block layout and text for the assembler.
    pub fn block_plan(&self) -> BlockPlan {
        BlockPlan {
            keep_blocks: self.resolved_keep_blocks(),
            reject_blocks: self.resolved_reject_blocks(),
            prompt: self.resolved_prompt().to_string(),
            keep_instructions: self.keep_instructions.to_string(),
            reject_instructions: self.reject_instructions.to_string(),
            randomize_block_order: self.randomize_block_order,
        }
    }

    /// Reject settings that can never produce a task.
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.resolved_keep_blocks() + self.resolved_reject_blocks() == 0 {
            return Err(DesignError::Configuration(
                "task needs at least one keep or reject block".into(),
            ));
        }
        if self.attribute.trim().is_empty() {
            return Err(DesignError::Configuration(
                "task attribute must not be empty".into(),
            ));
        }
        self.design_params().validate(self.num_images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_by_practice_flag() {
        let real = TaskConfig::default();
        assert_eq!(real.resolved_keep_blocks(), DEFAULT_KEEP_BLOCKS);
        assert_eq!(real.resolved_reject_blocks(), DEFAULT_REJECT_BLOCKS);
        assert_eq!(real.resolved_prompt(), DEFAULT_PROMPT);
        assert!(real.stores_pairs());

        let practice = TaskConfig::practice();
        assert_eq!(practice.num_images, PRACTICE_NUM_IMAGES);
        assert_eq!(practice.resolved_keep_blocks(), PRACTICE_KEEP_BLOCKS);
        assert_eq!(practice.resolved_prompt(), PRACTICE_PROMPT);
        assert!(!practice.stores_pairs());
        assert!(
            TaskConfig {
                store_practice_pairs: true,
                ..TaskConfig::practice()
            }
            .stores_pairs()
        );
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = TaskConfig {
            keep_blocks: Some(0),
            reject_blocks: Some(3),
            prompt: Some("Which is sharper?".into()),
            randomize_block_order: true,
            ..TaskConfig::default()
        };
        let plan = config.block_plan();
        assert_eq!(plan.keep_blocks, 0);
        assert_eq!(plan.reject_blocks, 3);
        assert_eq!(plan.prompt, "Which is sharper?");
        assert!(plan.randomize_block_order);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let no_blocks = TaskConfig {
            keep_blocks: Some(0),
            reject_blocks: Some(0),
            ..TaskConfig::default()
        };
        let tiny_tuples = TaskConfig {
            tuple_size: 1,
            ..TaskConfig::default()
        };
        let no_target = TaskConfig {
            min_occurrences: 0,
            ..TaskConfig::default()
        };
        let small_pool = TaskConfig {
            num_images: 2,
            tuple_size: 3,
            ..TaskConfig::default()
        };
        let blank_attribute = TaskConfig {
            attribute: "  ".into(),
            ..TaskConfig::default()
        };
        for config in [no_blocks, tiny_tuples, no_target, small_pool, blank_attribute] {
            assert!(matches!(
                config.validate(),
                Err(DesignError::Configuration(_))
            ));
        }
    }
}
