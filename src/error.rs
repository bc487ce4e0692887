//! Error types for gentrace
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

use crate::address::Address;

/// Errors raised while reading or combining choice maps
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChoiceError {
    /// A lookup referenced an address with no recorded value
    #[error("address not found: {0}")]
    AddressNotFound(Address),

    /// Two values (or a value and a sub-map) landed on the same address
    #[error("address conflict at {0}")]
    AddressConflict(Address),

    /// A recorded value had a different type than the caller expected
    #[error("type mismatch at {address}: expected {expected}, got {actual}")]
    TypeMismatch {
        address: Address,
        expected: &'static str,
        actual: &'static str,
    },
}

impl ChoiceError {
    /// Re-root the error's address under `head`, used when recursing into sub-maps
    pub(crate) fn prefixed(self, head: &Address) -> Self {
        match self {
            Self::AddressNotFound(a) => Self::AddressNotFound(Address::pair(head.clone(), a)),
            Self::AddressConflict(a) => Self::AddressConflict(Address::pair(head.clone(), a)),
            Self::TypeMismatch {
                address,
                expected,
                actual,
            } => Self::TypeMismatch {
                address: Address::pair(head.clone(), address),
                expected,
                actual,
            },
        }
    }
}

/// Errors raised while executing a generative function
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// The model bound the same address twice in one execution
    #[error("duplicate address: {0}")]
    DuplicateAddress(Address),

    /// A constraint referenced an address the model never visited
    #[error("unused constraint at {0}")]
    UnusedConstraint(Address),

    /// A distribution was constructed with invalid parameters
    #[error("invalid distribution parameters: {0}")]
    InvalidParams(String),
}

/// Errors raised by inference drivers
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    /// Every particle's log-weight underflowed to negative infinity
    #[error("particle filter collapsed: all particle weights are -inf")]
    FilterCollapse,

    /// A particle filter needs at least one particle
    #[error("invalid particle count: {0}")]
    InvalidParticleCount(usize),

    /// The weight vector contains NaN and cannot be normalized
    #[error("degenerate weight vector (NaN log-weight)")]
    DegenerateWeights,
}

/// Top-level error type for trace and inference operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenError {
    /// Choice map error
    #[error("choice map error: {0}")]
    Choice(#[from] ChoiceError),

    /// Model execution error
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Inference error
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
}

/// Result type alias for trace and inference operations
pub type GenResult<T> = Result<T, GenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_error_display() {
        let err = ChoiceError::AddressNotFound(Address::from("x"));
        assert_eq!(err.to_string(), "address not found: x");

        let err = ChoiceError::TypeMismatch {
            address: Address::from("mu"),
            expected: "f64",
            actual: "bool",
        };
        assert_eq!(err.to_string(), "type mismatch at mu: expected f64, got bool");
    }

    #[test]
    fn test_prefixed_reroots_address() {
        let err = ChoiceError::AddressConflict(Address::from("x"));
        let prefixed = err.prefixed(&Address::from(3usize));
        assert_eq!(
            prefixed,
            ChoiceError::AddressConflict(Address::pair(Address::from(3usize), Address::from("x")))
        );
    }

    #[test]
    fn test_gen_error_from_model_error() {
        let model_err = ModelError::DuplicateAddress(Address::from("x"));
        let err: GenError = model_err.into();
        assert!(matches!(err, GenError::Model(_)));
    }

    #[test]
    fn test_inference_error_display() {
        let err = InferenceError::FilterCollapse;
        assert_eq!(
            err.to_string(),
            "particle filter collapsed: all particle weights are -inf"
        );
    }
}
