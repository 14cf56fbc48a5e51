// Error types: stage loading, policy validation, checkpoint persistence

use thiserror::Error;

/// Stage descriptor errors. All of them are fatal at load time.
#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Stage descriptor not found: {0}")]
    MissingDescriptor(String),
    #[error("Failed to read stage descriptor: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stage descriptor is empty")]
    Empty,
    #[error("Row {row} has {found} tiles, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("Stage has {found} rows, expected {expected}")]
    GridSize { found: usize, expected: usize },
    #[error("Stage has no spawn marker for side {0}")]
    MissingSpawn(usize),
    #[error("Stage has no base")]
    MissingBase,
}

/// Policy model errors.
#[derive(Error, Debug, PartialEq)]
pub enum PolicyError {
    #[error("Action probabilities do not sum to 1 (sum = {sum}): {probabilities:?}")]
    InvalidDistribution { sum: f32, probabilities: Vec<f32> },
    #[error("Feature vector has {found} values, model expects {expected}")]
    InputWidth { found: usize, expected: usize },
    #[error("Checkpoint is missing tensor '{0}'")]
    MissingTensor(String),
    #[error("Tensor '{name}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        found: Vec<usize>,
        expected: Vec<usize>,
    },
}

/// Checkpoint file errors. A missing file is not an error; see `checkpoint::load_checkpoint`.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Checkpoint is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Cannot merge checkpoints: {0}")]
    Incompatible(String),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Anything that can stop a running game.
#[derive(Error, Debug)]
pub enum GameError {
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
