//! Memoized Collatz step counting over ranges of odd starting values, with
//! plain-text checkpoints so long verifications can be resumed across runs.

pub mod checkpoint;
pub mod errors;
pub mod step_map;
pub mod trace;
pub mod verifier;

pub use checkpoint::{load_checkpoint, save_checkpoint, CHECKPOINT_HEADER};
pub use errors::VerifyError;
pub use step_map::{StepMap, StepResult};
pub use trace::{trace, Tracer};
pub use verifier::{RunStats, Verifier, VerifyRange};
