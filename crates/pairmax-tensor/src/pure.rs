// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Pairmax — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dense row-major tensors and the error taxonomy shared by every pairmax
//! crate.
//!
//! Tensors are deliberately small: an N-D shape plus a reference-counted
//! `f32` buffer that is copied on first mutation. Layers receive tensors by
//! reference and hand back freshly owned results, so no reference outlives the
//! call that produced it.

use pairmax_config::determinism;
use rand::distributions::{Distribution, Uniform};
use std::sync::Arc;

/// Result alias used throughout the pure module.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor utilities and layers.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TensorError {
    /// A tensor constructor received an empty shape or a zero-sized axis.
    #[error("invalid tensor shape {shape:?}; at least one axis is required and every axis must be non-zero")]
    InvalidShape { shape: Vec<usize> },
    /// Data provided to a constructor or operator does not match the tensor shape.
    #[error("data length mismatch: expected {expected}, got {got}")]
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    #[error("shape mismatch: left={left:?}, right={right:?} cannot be combined")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },
    /// A relative axis could not be resolved against the tensor rank.
    #[error("axis {axis} is out of range for a tensor with {ndim} dimensions")]
    AxisOutOfRange { axis: isize, ndim: usize },
    /// Pairwise operators consume the axis two lanes at a time.
    #[error("axis {axis} has odd extent {extent}; pairwise operators need an even extent")]
    OddPairExtent { axis: usize, extent: usize },
    /// Numeric guard detected a non-finite value that would otherwise propagate NaNs.
    #[error("{label} saw non-finite value {value} at flat offset {offset}")]
    NumericAnomaly {
        label: &'static str,
        offset: usize,
        value: f32,
    },
    /// Wrapper around serde failures when parsing configuration.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
    /// Generic configuration violation.
    #[error("invalid value: {label}")]
    InvalidValue { label: &'static str },
    /// A dense kernel rejected its arguments.
    #[error("{backend} backend failure: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },
}

impl TensorError {
    /// Returns `true` for every error caused by inconsistent shapes or axes.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            TensorError::InvalidShape { .. }
                | TensorError::DataLength { .. }
                | TensorError::ShapeMismatch { .. }
                | TensorError::AxisOutOfRange { .. }
                | TensorError::OddPairExtent { .. }
        )
    }

    /// Wraps a message returned by the CPU dense kernels.
    pub fn cpu(message: String) -> Self {
        TensorError::BackendFailure {
            backend: "cpu",
            message,
        }
    }
}

/// A dense row-major tensor backed by a reference-counted buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: Arc<Vec<f32>>,
    shape: Vec<usize>,
}

fn volume(shape: &[usize]) -> PureResult<usize> {
    if shape.is_empty() || shape.iter().any(|&dim| dim == 0) {
        return Err(TensorError::InvalidShape {
            shape: shape.to_vec(),
        });
    }
    Ok(shape.iter().product())
}

impl Tensor {
    /// Create a tensor from raw data. The vector must hold exactly
    /// `shape.iter().product()` elements.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> PureResult<Self> {
        let expected = volume(shape)?;
        if expected != data.len() {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data: Arc::new(data),
            shape: shape.to_vec(),
        })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: &[usize]) -> PureResult<Self> {
        let len = volume(shape)?;
        Self::from_vec(shape, vec![0.0; len])
    }

    /// Construct a tensor by applying a generator to each flat row-major offset.
    pub fn from_fn<F>(shape: &[usize], f: F) -> PureResult<Self>
    where
        F: FnMut(usize) -> f32,
    {
        let len = volume(shape)?;
        Self::from_vec(shape, (0..len).map(f).collect())
    }

    /// Construct a tensor by sampling a uniform distribution in `[min, max)`.
    ///
    /// When `seed` is provided the RNG becomes deterministic which makes tests
    /// and benchmarks reproducible. Otherwise the determinism config decides.
    pub fn random_uniform(
        shape: &[usize],
        min: f32,
        max: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let len = volume(shape)?;
        if !(min < max) || !min.is_finite() || !max.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "random_uniform_bounds",
            });
        }
        let mut rng = determinism::rng_from_optional(seed, "pairmax-tensor/tensor/uniform");
        let distribution = Uniform::new(min, max);
        let data = (0..len).map(|_| distribution.sample(&mut rng)).collect();
        Self::from_vec(shape, data)
    }

    /// Returns the tensor shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements stored in the tensor.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Resolves a possibly negative axis (`-1` is the last axis).
    pub fn canonical_axis(&self, axis: isize) -> PureResult<usize> {
        canonical_axis(&self.shape, axis)
    }

    pub fn data(&self) -> &[f32] {
        self.data.as_slice()
    }

    /// Mutable access; clones the buffer first if it is shared.
    pub fn data_mut(&mut self) -> &mut [f32] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Consumes the tensor and returns its buffer.
    pub fn into_vec(self) -> Vec<f32> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    /// Fails with [`TensorError::ShapeMismatch`] unless both shapes agree.
    pub fn expect_same_shape(&self, other: &Tensor) -> PureResult<()> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            });
        }
        Ok(())
    }

    /// Sum of `self * other` accumulated in `f64`.
    pub fn weighted_sum(&self, weights: &Tensor) -> PureResult<f64> {
        self.expect_same_shape(weights)?;
        Ok(self
            .data()
            .iter()
            .zip(weights.data().iter())
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum())
    }
}

/// Product of `shape[start..end]`; an empty range counts as 1.
pub fn count_range(shape: &[usize], start: usize, end: usize) -> PureResult<usize> {
    if start > end || end > shape.len() {
        return Err(TensorError::AxisOutOfRange {
            axis: end as isize,
            ndim: shape.len(),
        });
    }
    Ok(shape[start..end].iter().product())
}

/// Resolves `axis` against `shape`, accepting negative indices counted from the end.
pub fn canonical_axis(shape: &[usize], axis: isize) -> PureResult<usize> {
    let ndim = shape.len() as isize;
    let resolved = if axis < 0 { axis + ndim } else { axis };
    if resolved < 0 || resolved >= ndim {
        return Err(TensorError::AxisOutOfRange {
            axis,
            ndim: shape.len(),
        });
    }
    Ok(resolved as usize)
}
