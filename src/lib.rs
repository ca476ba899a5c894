#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Exposure-balancing image allocation.
pub mod allocator;
/// Reusable command-line runners backing the crate binaries.
pub mod apps;
/// Attribute predicates for candidate pools.
pub mod attributes;
/// Block assembly and response contradiction checks.
pub mod blocks;
/// Task generation configuration.
pub mod config;
/// Centralized constants used across the allocator, design builder, blocks, and stores.
pub mod constants;
/// Image, pair, design, block, and task record types.
pub mod data;
/// Pair-disjoint design construction.
pub mod design;
/// Task generation pipeline.
pub mod generator;
/// Combinatorial capacity estimation helpers.
pub mod heuristics;
/// Pair history lookups.
pub mod history;
/// Aggregate metrics helpers.
pub mod metrics;
/// Record store traits and built-in stores.
pub mod store;
/// Shared type aliases.
pub mod types;
/// Collection helpers.
pub mod utils;

mod errors;
mod rng;

pub use allocator::{Allocation, AllocationRequest, allocate_images};
pub use attributes::AttributeFilter;
pub use blocks::{
    AssembledBlocks, BlockPlan, ContradictionReport, TrialResponse, assemble_blocks,
    find_contradictions,
};
pub use config::TaskConfig;
pub use data::{
    Block, BlockKind, Design, ImageRecord, PairKey, PairRecord, PairSet, TaskDraft, TaskRecord,
};
pub use design::{DesignParams, build_design};
pub use errors::DesignError;
pub use generator::{GeneratorCheckpoint, TaskGenerator};
pub use history::{preexisting_pairs, tuple_permitted};
pub use store::{
    FileRecordStore, InMemoryRecordStore, PoolAdmin, RecordStore, RegistrationSummary,
    ScanCursor, ScanPage, TaskLedger,
};
pub use types::{AttributeTag, ImageId, ImageTuple, TaskAttribute, TaskId, TaskImageIndex};
