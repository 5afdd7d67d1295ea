// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Complex-valued tensor algebra used by invariant Gabor convolutions.
//!
//! A [`ComplexTensor`] keeps its real and imaginary parts stacked on a leading
//! axis of size two. Everything else in this crate is built around that
//! layout: the four-convolution complex product, magnitude-consistent pooling,
//! pooling across the Gabor orientation axis, complex batch normalisation,
//! complex ReLUs and the Rayleigh/uniform-phase weight initialiser.
//!
//! The real convolution and pooling primitives are plain CPU reference
//! kernels over [`ndarray`] arrays.

pub mod activation;
pub mod complex;
pub mod conv;
pub mod error;
pub mod init;
pub mod norm;
pub mod pool;
pub mod resample;
pub mod shape;

pub use activation::{relu_c, relu_mod, relu_z};
pub use complex::{exp_cmplx, new_cmplx, ComplexTensor, DEFAULT_EPS};
pub use conv::{complex_conv, complex_linear, conv2d, conv_transpose2d, linear, ConvParams};
pub use error::{PureResult, TensorError};
pub use init::{complex_weights, fan_in_fan_out, uniform_weights, InitMode, InitStorage};
pub use norm::batch_norm_cmplx;
pub use pool::{
    max_mag_pool, pool_cmplx, pool_orientation, GaborPooling, OrientationPoolFn, PoolParams, SpatialPool,
};
pub use resample::{resample_cmplx, ResampleMode};
pub use shape::{compress_shape, recover_shape, CompressedShape};
