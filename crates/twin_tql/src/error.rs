//! Crate-level error type.

use crate::eval::EvalError;
use crate::parser::ParseError;

/// Errors returned by [`Mapper`](crate::Mapper).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TqlError {
    /// The statement text is malformed.
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),

    /// A single expression failed to evaluate.
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    /// No select field could be computed from the binding. Carries the first
    /// field's failure.
    #[error("no field could be computed: {0}")]
    NothingComputed(EvalError),
}
