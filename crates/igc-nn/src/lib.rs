// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Invariant Gabor convolution layers.
//!
//! Layers implement [`Module`]: a forward pass over [`ComplexTensor`]s plus
//! parameter visitation, state dictionaries and a plain gradient step for
//! gradients supplied by the host. [`IGConvCmplx`] keeps a cached Gabor
//! filter bank that is rebuilt only after its parameters change, which the
//! module API signals through [`Module::on_gradient_computed`].

pub mod io;
pub mod layers;
pub mod module;

pub use igc_tensor::{
    ComplexTensor, ConvParams, GaborPooling, InitMode, PoolParams, PureResult, TensorError,
};
pub use layers::{
    AvgPoolCmplx, BatchNormCmplx, ConvCmplx, ConvCmplxConfig, FilterCacheState, GaborFilterBank, IGConvCmplx,
    IGConvConfig, LinearCmplx, MaxPoolCmplx, ReLUCmplx, ReluKind, Sequential,
};
pub use module::{Module, Parameter, StateDict};
