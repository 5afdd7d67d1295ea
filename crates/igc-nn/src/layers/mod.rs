// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

pub mod activation;
pub mod conv;
pub mod gabor;
pub mod igconv;
pub mod linear;
pub mod norm;
pub mod pool;
pub mod sequential;

pub use activation::{ReLUCmplx, ReluKind};
pub use conv::{ConvCmplx, ConvCmplxConfig};
pub use gabor::{gabor_filters, init_gabor_params, FilterCacheState, GaborFilterBank};
pub use igconv::{IGConvCmplx, IGConvConfig};
pub use linear::LinearCmplx;
pub use norm::BatchNormCmplx;
pub use pool::{AvgPoolCmplx, MaxPoolCmplx};
pub use sequential::Sequential;
