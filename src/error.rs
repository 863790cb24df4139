use crate::types::Language;
use thiserror::Error;

/// Crate-wide error type.
///
/// Submission outcomes (wrong answer, time limit, ...) are never errors; they
/// are [`crate::types::Verdict`] values. `JudgeError` covers infrastructure
/// faults only: a failed judging run surfaces as `Err` and the caller may
/// retry.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cgroup error: {0}")]
    Cgroup(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported language combination: solution {0:?} / checker {1:?}")]
    Unsupported(Language, Language),
}

/// Result type alias for judgebox operations.
pub type Result<T> = std::result::Result<T, JudgeError>;
