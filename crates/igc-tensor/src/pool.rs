// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Spatial and orientation pooling over complex feature maps.
//!
//! Spatial pools work on `[batch, channels, h, w]` components; anything with
//! extra axes between batch and the spatial extent is folded into channels
//! first. Orientation pools reduce axis 2 of a `[batch, channels, no_g, h, w]`
//! component, i.e. axis 3 of the stacked `[2, batch, channels, no_g, h, w]`
//! layout.

use crate::complex::{ComplexTensor, DEFAULT_EPS};
use crate::error::{validate_positive, PureResult, TensorError};
use crate::shape::{compress_shape, recover_shape};
use ndarray::{Array4, ArrayD, ArrayView4, ArrayView5, ArrayViewD, Axis, Ix4, Ix5};
use serde::{Deserialize, Serialize};

/// Window geometry of a spatial pool. `stride` defaults to `kernel`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    pub kernel: (usize, usize),
    pub stride: (usize, usize),
    pub padding: (usize, usize),
}

impl PoolParams {
    pub fn new(kernel: usize) -> Self {
        Self {
            kernel: (kernel, kernel),
            stride: (kernel, kernel),
            padding: (0, 0),
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = (stride, stride);
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = (padding, padding);
        self
    }

    pub fn validate(&self) -> PureResult<()> {
        validate_positive(self.kernel.0, "pool_kernel_h")?;
        validate_positive(self.kernel.1, "pool_kernel_w")?;
        validate_positive(self.stride.0, "pool_stride_h")?;
        validate_positive(self.stride.1, "pool_stride_w")?;
        if 2 * self.padding.0 > self.kernel.0 || 2 * self.padding.1 > self.kernel.1 {
            return Err(TensorError::InvalidValue {
                label: "pool_padding_exceeds_half_kernel",
            });
        }
        Ok(())
    }

    pub fn output_hw(&self, input_hw: (usize, usize)) -> PureResult<(usize, usize)> {
        let (h, w) = input_hw;
        let (kh, kw) = self.kernel;
        let (ph, pw) = self.padding;
        if h + 2 * ph < kh {
            return Err(TensorError::InvalidDimensions {
                label: "pool_input_height",
                value: h,
            });
        }
        if w + 2 * pw < kw {
            return Err(TensorError::InvalidDimensions {
                label: "pool_input_width",
                value: w,
            });
        }
        Ok(((h + 2 * ph - kh) / self.stride.0 + 1, (w + 2 * pw - kw) / self.stride.1 + 1))
    }

    /// In-bounds input coordinates covered by output cell `(oy, ox)`.
    fn window(&self, oy: usize, ox: usize, hw: (usize, usize)) -> impl Iterator<Item = (usize, usize)> {
        let (h, w) = hw;
        let top = (oy * self.stride.0) as isize - self.padding.0 as isize;
        let left = (ox * self.stride.1) as isize - self.padding.1 as isize;
        let (kh, kw) = self.kernel;
        (0..kh).flat_map(move |i| {
            (0..kw).filter_map(move |j| {
                let y = top + i as isize;
                let x = left + j as isize;
                (y >= 0 && x >= 0 && (y as usize) < h && (x as usize) < w).then(|| (y as usize, x as usize))
            })
        })
    }
}

fn as_rank4<'a>(label: &'static str, x: ArrayViewD<'a, f32>) -> PureResult<ArrayView4<'a, f32>> {
    let got = x.ndim();
    x.into_dimensionality::<Ix4>()
        .map_err(|_| TensorError::InvalidRank { label, expected: 4, got })
}

fn as_rank5<'a, T>(label: &'static str, x: ArrayViewD<'a, T>) -> PureResult<ArrayView5<'a, T>> {
    let got = x.ndim();
    x.into_dimensionality::<Ix5>()
        .map_err(|_| TensorError::InvalidRank { label, expected: 5, got })
}

/// Max pool returning the flat `y * w + x` input index chosen per window.
/// Ties resolve to the first maximum in row-major window order.
pub fn max_pool2d_with_indices(
    input: ArrayViewD<'_, f32>,
    params: &PoolParams,
) -> PureResult<(ArrayD<f32>, ArrayD<usize>)> {
    params.validate()?;
    let input = as_rank4("max_pool2d_input", input)?;
    let (batch, channels, h, w) = input.dim();
    let (oh, ow) = params.output_hw((h, w))?;
    let mut out = Array4::<f32>::zeros((batch, channels, oh, ow));
    let mut indices = Array4::<usize>::zeros((batch, channels, oh, ow));
    for b in 0..batch {
        for c in 0..channels {
            let plane = input.slice(ndarray::s![b, c, .., ..]);
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = 0;
                    for (y, x) in params.window(oy, ox, (h, w)) {
                        let value = plane[[y, x]];
                        if value > best {
                            best = value;
                            best_idx = y * w + x;
                        }
                    }
                    out[[b, c, oy, ox]] = best;
                    indices[[b, c, oy, ox]] = best_idx;
                }
            }
        }
    }
    Ok((out.into_dyn(), indices.into_dyn()))
}

/// Average pool; zero padding counts towards the divisor.
pub fn avg_pool2d(input: ArrayViewD<'_, f32>, params: &PoolParams) -> PureResult<ArrayD<f32>> {
    params.validate()?;
    let input = as_rank4("avg_pool2d_input", input)?;
    let (batch, channels, h, w) = input.dim();
    let (oh, ow) = params.output_hw((h, w))?;
    let area = (params.kernel.0 * params.kernel.1) as f32;
    let mut out = Array4::<f32>::zeros((batch, channels, oh, ow));
    for b in 0..batch {
        for c in 0..channels {
            let plane = input.slice(ndarray::s![b, c, .., ..]);
            for oy in 0..oh {
                for ox in 0..ow {
                    let sum: f32 = params.window(oy, ox, (h, w)).map(|(y, x)| plane[[y, x]]).sum();
                    out[[b, c, oy, ox]] = sum / area;
                }
            }
        }
    }
    Ok(out.into_dyn())
}

/// Reads `input[b, c]` at the flat spatial positions stored in `indices`.
pub fn gather_spatial(input: ArrayViewD<'_, f32>, indices: &ArrayD<usize>) -> PureResult<ArrayD<f32>> {
    let input = as_rank4("gather_spatial_input", input)?;
    let got = indices.ndim();
    let indices = indices
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| TensorError::InvalidRank {
            label: "gather_spatial_indices",
            expected: 4,
            got,
        })?;
    let (batch, channels, h, w) = input.dim();
    let (ib, ic, oh, ow) = indices.dim();
    if ib != batch || ic != channels {
        return Err(TensorError::shape_mismatch(input.shape(), indices.shape()));
    }
    let mut out = Array4::<f32>::zeros((batch, channels, oh, ow));
    for ((b, c, y, x), &flat) in indices.indexed_iter() {
        if flat >= h * w {
            return Err(TensorError::InvalidValue {
                label: "gather_spatial_index_out_of_range",
            });
        }
        out[[b, c, y, x]] = input[[b, c, flat / w, flat % w]];
    }
    Ok(out.into_dyn())
}

/// Spatial pooling flavour of a complex pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialPool {
    /// Real max pool on each component independently; the two parts may pick
    /// different locations.
    Max,
    /// Real average pool on each component.
    Avg,
    /// One location per window, chosen by magnitude, shared by both parts.
    MaxMagnitude,
}

/// Pools the spatial axes of `x`. Inputs of rank above four are folded into
/// `[batch, channels, h, w]` and restored afterwards.
pub fn pool_cmplx(x: &ComplexTensor, kind: SpatialPool, params: &PoolParams) -> PureResult<ComplexTensor> {
    let (folded, remembered) = compress_shape(x)?;
    let pooled = match kind {
        SpatialPool::Max => folded.map_parts(|part| Ok(max_pool2d_with_indices(part, params)?.0))?,
        SpatialPool::Avg => folded.map_parts(|part| avg_pool2d(part, params))?,
        SpatialPool::MaxMagnitude => max_mag_pool(&folded, params)?.0,
    };
    recover_shape(pooled, remembered)
}

/// Magnitude-consistent max pool on a rank-4 complex tensor. Returns the
/// pooled tensor and the flat spatial index chosen per window.
pub fn max_mag_pool(x: &ComplexTensor, params: &PoolParams) -> PureResult<(ComplexTensor, ArrayD<usize>)> {
    x.expect_rank("max_mag_pool", 4)?;
    let magnitude = x.magnitude(DEFAULT_EPS);
    let (_, indices) = max_pool2d_with_indices(magnitude.view(), params)?;
    let pooled = x.map_parts(|part| gather_spatial(part, &indices))?;
    Ok((pooled, indices))
}

/// Bound orientation reduction. Returns the pooled `[batch, channels, h, w]`
/// tensor and, for argmax variants, the winning orientation laid out as
/// `[2, batch, channels, h, w]`.
pub type OrientationPoolFn = fn(&ComplexTensor) -> PureResult<(ComplexTensor, Option<ArrayD<usize>>)>;

/// Reduction applied across the orientation axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaborPooling {
    Max,
    Avg,
    Mag,
    SummedMag,
}

impl GaborPooling {
    pub fn operator(self) -> OrientationPoolFn {
        match self {
            GaborPooling::Max => orientation_max,
            GaborPooling::Avg => orientation_avg,
            GaborPooling::Mag => orientation_mag,
            GaborPooling::SummedMag => orientation_summed_mag,
        }
    }
}

const ORIENTATION_AXIS: usize = 2;

fn orientation_max(x: &ComplexTensor) -> PureResult<(ComplexTensor, Option<ArrayD<usize>>)> {
    x.expect_rank("orientation_max_pool", 5)?;
    let pooled = x.map_parts(|part| {
        Ok(part.fold_axis(Axis(ORIENTATION_AXIS), f32::NEG_INFINITY, |acc, &v| acc.max(v)))
    })?;
    Ok((pooled, None))
}

fn orientation_avg(x: &ComplexTensor) -> PureResult<(ComplexTensor, Option<ArrayD<usize>>)> {
    x.expect_rank("orientation_avg_pool", 5)?;
    let pooled = x.map_parts(|part| {
        part.mean_axis(Axis(ORIENTATION_AXIS)).ok_or(TensorError::InvalidDimensions {
            label: "orientation_axis",
            value: 0,
        })
    })?;
    Ok((pooled, None))
}

fn argmax_first(values: impl Iterator<Item = f32>) -> usize {
    let mut best = f32::NEG_INFINITY;
    let mut best_idx = 0;
    for (idx, value) in values.enumerate() {
        if value > best {
            best = value;
            best_idx = idx;
        }
    }
    best_idx
}

/// Gathers both components at `winner[b, c, y, x]` along the orientation axis
/// and duplicates the winners over the leading complex axis.
fn gather_orientation(
    x: &ComplexTensor,
    winner: &Array4<usize>,
) -> PureResult<(ComplexTensor, Option<ArrayD<usize>>)> {
    let pooled = x.map_parts(|part| {
        let part = as_rank5("orientation_gather", part)?;
        let mut out = Array4::<f32>::zeros(winner.raw_dim());
        for ((b, c, y, xx), &g) in winner.indexed_iter() {
            out[[b, c, y, xx]] = part[[b, c, g, y, xx]];
        }
        Ok(out.into_dyn())
    })?;
    let indices = ndarray::stack(Axis(0), &[winner.view(), winner.view()])?.into_dyn();
    Ok((pooled, Some(indices)))
}

fn orientation_mag(x: &ComplexTensor) -> PureResult<(ComplexTensor, Option<ArrayD<usize>>)> {
    x.expect_rank("orientation_mag_pool", 5)?;
    let magnitude = x.magnitude(DEFAULT_EPS);
    let magnitude = as_rank5("orientation_mag_pool", magnitude.view())?;
    let (batch, channels, _, h, w) = magnitude.dim();
    let winner = Array4::from_shape_fn((batch, channels, h, w), |(b, c, y, xx)| {
        argmax_first(magnitude.slice(ndarray::s![b, c, .., y, xx]).iter().copied())
    });
    gather_orientation(x, &winner)
}

fn orientation_summed_mag(x: &ComplexTensor) -> PureResult<(ComplexTensor, Option<ArrayD<usize>>)> {
    x.expect_rank("orientation_summed_mag_pool", 5)?;
    let magnitude = x.magnitude(DEFAULT_EPS);
    // [b, c, g, h, w] -> [b, c, g]
    let energy = magnitude.sum_axis(Axis(4)).sum_axis(Axis(3));
    let shape = x.shape();
    let (h, w) = (shape[3], shape[4]);
    let winner = Array4::from_shape_fn((shape[0], shape[1], h, w), |(b, c, _, _)| {
        argmax_first(energy.slice(ndarray::s![b, c, ..]).iter().copied())
    });
    gather_orientation(x, &winner)
}

/// Applies an orientation pool and drops the winning indices.
pub fn pool_orientation(x: &ComplexTensor, pooling: GaborPooling) -> PureResult<ComplexTensor> {
    Ok((pooling.operator())(x)?.0)
}
