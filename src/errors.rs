// Error types and error handling module
// This file defines the aggregation error taxonomy shared by the optimizer,
// the orchestrator and the external collaborators
//
// Numan Thabit 2025 Nov

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggrError {
    /// No path could be built from any source after both routing phases.
    #[error("no optimal path")]
    NoOptimalPath,
    /// The caller supplied no reference orders to derive the pair from.
    #[error("empty orders")]
    EmptyOrders,
    #[error("paths have different target inputs: {0} vs {1}")]
    TargetInputMismatch(String, String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("solver error: {0}")]
    Solver(String),
    #[error("report error: {0}")]
    Report(String),
    #[error("backoff exhausted")]
    BackoffExhausted,
}

impl AggrError {
    /// Only these two kinds may terminate a quote request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AggrError::NoOptimalPath | AggrError::EmptyOrders)
    }
}
