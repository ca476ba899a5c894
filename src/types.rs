/// Opaque image identifier (stable across runs, used as the store row key).
/// Example: `ava_953619`
pub type ImageId = String;
/// Identifier for a generated task.
/// Examples: `task_5f0c2a9be41d7783`, `practice_00b1f3c4a2e9d815`
pub type TaskId = String;
/// Free-form attribute tag attached to images (used to select candidate pools).
/// Examples: `people`, `landscape`, `test`
pub type AttributeTag = String;
/// Label describing what a task asks workers to judge.
/// Example: `interesting`
pub type TaskAttribute = String;
/// Ordered group of images shown together in a single trial.
/// Example: `["ava_1", "ava_7", "ava_12"]`
pub type ImageTuple = Vec<ImageId>;
/// Position of an image inside a task's first-occurrence index space.
pub type TaskImageIndex = usize;
