use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("checkpoint is empty, expected header {expected:?}", expected = crate::checkpoint::CHECKPOINT_HEADER)]
    MissingHeader,
    #[error("checkpoint header mismatch: expected {expected:?} but found {found:?}", expected = crate::checkpoint::CHECKPOINT_HEADER)]
    BadHeader { found: String },
    #[error("malformed checkpoint record on line {line} ({content:?}): {reason}")]
    MalformedRecord {
        line: usize,
        content: String,
        reason: String,
    },
    #[error("no step map entry for odd value {0} (every odd value below stop must be resolved before export)")]
    MissingEntry(u64),
    #[error("step count {steps} for {value} does not fit a checkpoint record")]
    StepCountOverflow { value: u64, steps: u64 },
    #[error("counterexample found: trajectory of {start} never reaches 1 (peak {peak})")]
    Counterexample { start: u64, peak: u64 },
    #[error("invalid range: start {start} is greater than stop {stop}")]
    InvalidRange { start: u64, stop: u64 },
    #[error("{}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VerifyError {
    pub(crate) fn file(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| VerifyError::File { path, source }
    }

    /// True for the one in-loop failure: a traced value that cycles without reaching 1.
    pub fn is_counterexample(&self) -> bool {
        matches!(self, VerifyError::Counterexample { .. })
    }
}
