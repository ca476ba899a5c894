/// Constants used by the sampling allocator.
pub mod allocator {
    /// Number of active image ids requested from the store per scan page.
    pub const SCAN_PAGE_SIZE: usize = 256;
}

/// Default design parameters.
pub mod design {
    /// Images drawn into a real task's candidate pool.
    pub const DEFAULT_NUM_IMAGES: usize = 24;
    /// Images drawn into a practice task's candidate pool.
    pub const PRACTICE_NUM_IMAGES: usize = 9;
    /// Images shown per trial.
    pub const DEFAULT_TUPLE_SIZE: usize = 3;
    /// Minimum number of appearances per candidate image.
    pub const DEFAULT_MIN_OCCURRENCES: usize = 2;
}

/// Default block layout and worker-facing text.
pub mod blocks {
    /// Keep blocks per real task.
    pub const DEFAULT_KEEP_BLOCKS: usize = 2;
    /// Reject blocks per real task.
    pub const DEFAULT_REJECT_BLOCKS: usize = 2;
    /// Keep blocks per practice task.
    pub const PRACTICE_KEEP_BLOCKS: usize = 1;
    /// Reject blocks per practice task.
    pub const PRACTICE_REJECT_BLOCKS: usize = 1;
    /// Prompt shown above every trial of a real task.
    pub const DEFAULT_PROMPT: &str = "Which image is the most interesting?";
    /// Prompt shown above every trial of a practice task.
    pub const PRACTICE_PROMPT: &str = "Practice: which image is the most interesting?";
    /// Instructions attached to keep blocks.
    pub const KEEP_INSTRUCTIONS: &str = "Click the image you would most like to keep.";
    /// Instructions attached to reject blocks.
    pub const REJECT_INSTRUCTIONS: &str = "Click the image you would most like to throw away.";
    /// Task attribute used when none is configured.
    pub const DEFAULT_TASK_ATTRIBUTE: &str = "interesting";
}

/// Task identifier prefixes.
pub mod task {
    /// Prefix for real task ids.
    pub const TASK_ID_PREFIX: &str = "task_";
    /// Prefix for practice task ids.
    pub const PRACTICE_ID_PREFIX: &str = "practice_";
}

/// Constants used by record store keys and on-disk persistence.
pub mod store {
    /// Separator placed between the two image ids of a pair row key.
    pub const PAIR_KEY_DELIMITER: &str = ",";
    /// Default directory used for file-backed record stores.
    pub const DEFAULT_STORE_DIR: &str = ".design_store";
    /// Default file name used for file-backed record stores.
    pub const DEFAULT_STORE_FILENAME: &str = "records.bin";
    /// Extension of the sidecar file locked while a process has the store open.
    pub const STORE_LOCK_EXTENSION: &str = "lock";
    /// Version tag stored in the record-store metadata entry.
    pub const STORE_VERSION: u8 = 1;
    /// Key holding the record-store metadata header.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key holding the catalog of registered image ids.
    pub const IMAGE_CATALOG_KEY: &[u8] = b"image_catalog";
    /// Prefix for per-image records.
    pub const IMAGE_PREFIX: &[u8] = b"image:";
    /// Prefix for per-pair history records (followed by the pair row key).
    pub const PAIR_PREFIX: &[u8] = b"pair:";
    /// Prefix for the per-image list of pair partners that sort after it.
    pub const PARTNERS_PREFIX: &[u8] = b"partners:";
    /// Prefix for committed task records.
    pub const TASK_PREFIX: &[u8] = b"task:";
    /// Version byte leading every image, pair, and task record.
    pub const RECORD_VERSION: u8 = 1;
    /// Prefix byte marking a bitcode-encoded payload.
    pub const BITCODE_PREFIX: u8 = b'B';
}
