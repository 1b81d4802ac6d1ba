//! Error types and failure classification for property runs.

use std::fmt;
use std::time::Duration;

/// Failure kinds surfaced by arbitraries, properties, and the runner.
///
/// The runner treats these differently: `PropertyFailed` triggers the shrink
/// search, `PreconditionFailed` discards the trial and re-draws,
/// `GenerationExhausted` and `ContractViolation` abort the run as
/// configuration errors, and `Timeout` stops the search at the best-known
/// counterexample.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The predicate threw, returned false, or rejected.
    PropertyFailed {
        message: String,
        run: Option<usize>,
    },

    /// A `pre(..)` condition was false; the trial is discarded, not failed.
    PreconditionFailed { label: Option<String> },

    /// A constrained arbitrary could not produce a valid value within its
    /// attempt budget. The constraints are likely too narrow.
    GenerationExhausted { attempts: usize, what: String },

    /// A user-supplied configuration or callback violated a documented
    /// invariant (e.g. an unmapper failing the round-trip law).
    ContractViolation { message: String },

    /// A trial exceeded its per-predicate time limit.
    Timeout { limit: Duration },

    /// The run stopped issuing trials after a wall-clock budget.
    Interrupted {
        after: Duration,
        completed_runs: usize,
    },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyError::PropertyFailed { message, run } => {
                write!(f, "Property failed: {}", message)?;
                if let Some(run) = run {
                    write!(f, " (run: {})", run)?;
                }
                Ok(())
            }
            PropertyError::PreconditionFailed { label } => {
                write!(f, "Precondition failed")?;
                if let Some(label) = label {
                    write!(f, ": {}", label)?;
                }
                Ok(())
            }
            PropertyError::GenerationExhausted { attempts, what } => {
                write!(
                    f,
                    "Generation exhausted after {} attempts: {}",
                    attempts, what
                )
            }
            PropertyError::ContractViolation { message } => {
                write!(f, "Contract violation: {}", message)
            }
            PropertyError::Timeout { limit } => {
                write!(f, "Property timeout: exceeded limit of {:?}", limit)
            }
            PropertyError::Interrupted {
                after,
                completed_runs,
            } => {
                write!(
                    f,
                    "Run interrupted after {:?} ({} run(s) completed)",
                    after, completed_runs
                )
            }
        }
    }
}

impl std::error::Error for PropertyError {}

impl PropertyError {
    /// Create a simple property failed error.
    pub fn property_failed(message: impl Into<String>) -> Self {
        Self::PropertyFailed {
            message: message.into(),
            run: None,
        }
    }

    /// Create a property failed error tagged with the run it occurred in.
    pub fn property_failed_at(message: impl Into<String>, run: usize) -> Self {
        Self::PropertyFailed {
            message: message.into(),
            run: Some(run),
        }
    }

    /// Create an unlabeled precondition failure.
    pub fn precondition_failed() -> Self {
        Self::PreconditionFailed { label: None }
    }

    /// Create a labeled precondition failure.
    pub fn precondition_failed_with(label: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            label: Some(label.into()),
        }
    }

    /// Create a generation exhaustion error naming the exhausted arbitrary.
    pub fn generation_exhausted(attempts: usize, what: impl Into<String>) -> Self {
        Self::GenerationExhausted {
            attempts,
            what: what.into(),
        }
    }

    /// Create a contract violation naming the violated invariant.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// Create a timeout error for the given limit.
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout { limit }
    }

    /// True when this error discards the current trial instead of failing it.
    pub fn is_precondition(&self) -> bool {
        matches!(self, PropertyError::PreconditionFailed { .. })
    }

    /// True when this error must stop the shrink search where it stands.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PropertyError::Timeout { .. })
    }
}

/// Abort the current trial when `condition` is false.
///
/// Intended for use with `?` inside predicates:
///
/// ```rust
/// use propforge::{pre, PropertyError};
///
/// fn predicate(a: i64, b: i64) -> Result<(), PropertyError> {
///     pre(b != 0)?;
///     assert_eq!((a / b) * b + (a % b), a);
///     Ok(())
/// }
/// ```
///
/// An aborted trial is re-drawn by the runner and never counts toward the
/// configured number of runs.
pub fn pre(condition: bool) -> Result<(), PropertyError> {
    if condition {
        Ok(())
    } else {
        Err(PropertyError::precondition_failed())
    }
}

/// Labeled variant of [`pre`], for telling apart multiple preconditions in
/// skip statistics.
pub fn pre_labeled(condition: bool, label: impl Into<String>) -> Result<(), PropertyError> {
    if condition {
        Ok(())
    } else {
        Err(PropertyError::precondition_failed_with(label))
    }
}
