//! Value-layer error types.

use crate::node::Kind;

/// Errors raised while addressing, combining, or validating property values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    /// The path is empty or contains an empty segment.
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    /// A write tried to descend through a value that is not a container.
    #[error("cannot write '{path}' through a {kind} value")]
    PathConflict {
        /// The full path being written.
        path: String,
        /// The kind of the value blocking the write.
        kind: Kind,
    },

    /// The operands do not support the operator.
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        /// Operator symbol.
        op: &'static str,
        /// Kind of the left operand.
        left: Kind,
        /// Kind of the right operand.
        right: Kind,
    },

    /// Integer or float division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A known schema key carried a value of the wrong kind.
    #[error("invalid config field '{key}': expected {expected}, got {got}")]
    InvalidConfig {
        /// The offending key.
        key: &'static str,
        /// Human-readable expected kind.
        expected: &'static str,
        /// The kind actually found.
        got: Kind,
    },

    /// A value does not satisfy the property's declared constraints.
    #[error("property '{id}' violates constraint: {reason}")]
    ConstraintViolation {
        /// Property identifier.
        id: String,
        /// What was violated.
        reason: String,
    },

    /// Bytes could not be decoded as a JSON value.
    #[error("invalid JSON value: {0}")]
    Json(String),
}
