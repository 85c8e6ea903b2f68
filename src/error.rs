//! Optimizer error types.
//!
//! This module defines [`OptimizerError`] and [`OptimizerResult`] for the
//! fusion engine and the optimization processor.

use std::fmt;

/// Error types surfaced by the synchronous optimizer API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerError {
    /// Opcode optimization is switched off. A gating signal, not a failure:
    /// the caller executes the raw bytecode instead.
    Disabled,

    /// The fusion pass could not rewrite the input without breaking
    /// byte offsets. The raw bytecode is left untouched.
    Preprocessing { reason: String },
}

impl OptimizerError {
    /// Build a preprocessing error from any displayable reason
    pub fn preprocessing(reason: impl Into<String>) -> Self {
        OptimizerError::Preprocessing {
            reason: reason.into(),
        }
    }

    /// True for the disabled gating signal
    pub fn is_disabled(&self) -> bool {
        matches!(self, OptimizerError::Disabled)
    }
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerError::Disabled => write!(f, "Opcode optimization is disabled"),
            OptimizerError::Preprocessing { reason } => {
                write!(f, "Fail to do preprocessing: {}", reason)
            }
        }
    }
}

impl std::error::Error for OptimizerError {}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            OptimizerError::Disabled.to_string(),
            "Opcode optimization is disabled"
        );
        let err = OptimizerError::preprocessing("length changed from 4 to 3");
        assert_eq!(
            err.to_string(),
            "Fail to do preprocessing: length changed from 4 to 3"
        );
    }

    #[test]
    fn test_is_disabled() {
        assert!(OptimizerError::Disabled.is_disabled());
        assert!(!OptimizerError::preprocessing("x").is_disabled());
    }
}
