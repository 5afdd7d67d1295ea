// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor operators, layers and checkpoint helpers.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TensorError {
    /// A constructor or operator received a zero-sized or otherwise invalid extent.
    #[error("invalid dimension for {label}: {value}")]
    InvalidDimensions { label: &'static str, value: usize },
    /// Two tensors that must share a shape (or broadcast) do not.
    #[error("shape mismatch: left={left:?}, right={right:?} cannot be combined")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },
    /// An operator expected a tensor of a different rank.
    #[error("{label} expects rank {expected}, got rank {got}")]
    InvalidRank {
        label: &'static str,
        expected: usize,
        got: usize,
    },
    /// Data provided to a constructor does not match the requested shape.
    #[error("data length mismatch: expected {expected}, got {got}")]
    DataLength { expected: usize, got: usize },
    /// Generic argument violation.
    #[error("invalid value: {label}")]
    InvalidValue { label: &'static str },
    /// A scalar hyper-parameter was non-finite or out of range.
    #[error("invalid scalar for {label}: {value}")]
    InvalidScalar { label: &'static str, value: f32 },
    /// A layer was constructed with an inconsistent set of options.
    #[error("configuration error: {message}")]
    Configuration { message: String },
    /// Attempted to load a parameter that was missing from the state dict.
    #[error("missing parameter '{name}' while loading module state")]
    MissingParameter { name: String },
    /// ndarray refused a reshape or view.
    #[error("layout error: {message}")]
    Layout { message: String },
    /// Wrapper around I/O failures when persisting or restoring tensors.
    #[error("i/o error while handling tensor data: {message}")]
    IoError { message: String },
    /// Wrapper around serde failures when (de)serialising tensors.
    #[error("serialization error while handling tensor data: {message}")]
    SerializationError { message: String },
}

impl TensorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        TensorError::Configuration {
            message: message.into(),
        }
    }

    pub fn shape_mismatch(left: &[usize], right: &[usize]) -> Self {
        TensorError::ShapeMismatch {
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }
}

impl From<ndarray::ShapeError> for TensorError {
    fn from(err: ndarray::ShapeError) -> Self {
        TensorError::Layout {
            message: err.to_string(),
        }
    }
}

/// Fails unless `value` is non-zero.
pub fn validate_positive(value: usize, label: &'static str) -> PureResult<()> {
    if value == 0 {
        return Err(TensorError::InvalidDimensions { label, value });
    }
    Ok(())
}

/// Fails unless `value` is finite and strictly positive.
pub fn validate_epsilon(value: f32, label: &'static str) -> PureResult<()> {
    if value <= 0.0 || !value.is_finite() {
        return Err(TensorError::InvalidScalar { label, value });
    }
    Ok(())
}

/// Fails unless `shape` has exactly `expected` axes.
pub(crate) fn expect_rank(label: &'static str, shape: &[usize], expected: usize) -> PureResult<()> {
    if shape.len() != expected {
        return Err(TensorError::InvalidRank {
            label,
            expected,
            got: shape.len(),
        });
    }
    Ok(())
}
