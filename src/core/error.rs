//! The error type shared by all integrators.

use thiserror::Error;

/// Errors reported by the integrators. Configuration errors are detected before the first
/// integrand evaluation; only [`Error::Coordination`] can occur in the middle of a run.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// The iteration schedule did not contain a single iteration.
    #[error("the iteration schedule is empty")]
    EmptySchedule,

    /// An iteration of the schedule requested zero integrand evaluations.
    #[error("iteration {iteration} requests zero calls")]
    ZeroCalls {
        /// Zero-based index of the offending iteration.
        iteration: usize,
    },

    /// Two collaborators disagree on the number of dimensions.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// The number of dimensions the integrator expected.
        expected: usize,
        /// The number of dimensions that was supplied.
        found: usize,
    },

    /// An iteration requests fewer calls than the per-channel minimum demands.
    #[error("{calls} calls are too few, at least {required} are required")]
    TooFewCalls {
        /// The number of calls requested for the iteration.
        calls: usize,
        /// The smallest admissible number of calls.
        required: usize,
    },

    /// A configuration parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel weights are negative, non-finite or do not sum to one.
    #[error("invalid channel weights: {0}")]
    InvalidWeights(String),

    /// A VEGAS grid is malformed.
    #[error("invalid VEGAS grid: {0}")]
    InvalidPdf(String),

    /// A peer did not take part in a collective reduction.
    #[error("collective reduction failed: {0}")]
    Coordination(String),
}
