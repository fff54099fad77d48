use thiserror::Error;

/// Simplified `Result` using [`GlmError`] as error type
pub type Result<T> = std::result::Result<T, GlmError>;

/// Error variants raised while assembling penalties, evaluating functions or
/// running the solvers
#[derive(Debug, Clone, Error)]
pub enum GlmError {
    /// The penalty, loss or solver configuration cannot be assembled
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The requested operation is not defined for this function or object
    #[error("operation not applicable: {0}")]
    NotApplicable(String),
    /// A numerical routine produced non-finite values or did not converge
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    /// The weighted subproblem failed during an LLA step
    #[error("subproblem failed at LLA step {iteration}")]
    SubproblemFailure {
        iteration: usize,
        #[source]
        source: Box<GlmError>,
    },
    /// The non-convex reweighting produced an unusable value
    #[error("invalid penalty state: {0}")]
    InvalidPenaltyState(String),
}
