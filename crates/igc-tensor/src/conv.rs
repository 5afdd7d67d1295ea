// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::complex::ComplexTensor;
use crate::error::{validate_positive, PureResult, TensorError};
use ndarray::{s, Array2, Array3, Array4, ArrayD, ArrayView3, ArrayView4, ArrayViewD, Ix2, Ix4};
use serde::{Deserialize, Serialize};

/// Options forwarded verbatim to the real convolution primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvParams {
    pub stride: (usize, usize),
    pub padding: (usize, usize),
    pub dilation: (usize, usize),
    pub groups: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride: (1, 1),
            padding: (0, 0),
            dilation: (1, 1),
            groups: 1,
        }
    }
}

impl ConvParams {
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = (stride, stride);
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = (padding, padding);
        self
    }

    pub fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = (dilation, dilation);
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn validate(&self) -> PureResult<()> {
        validate_positive(self.stride.0, "stride_h")?;
        validate_positive(self.stride.1, "stride_w")?;
        validate_positive(self.dilation.0, "dilation_h")?;
        validate_positive(self.dilation.1, "dilation_w")?;
        validate_positive(self.groups, "groups")?;
        Ok(())
    }

    /// Spatial output extent of a forward convolution.
    pub fn output_hw(&self, input_hw: (usize, usize), kernel: (usize, usize)) -> PureResult<(usize, usize)> {
        let oh = conv_extent(input_hw.0, kernel.0, self.stride.0, self.padding.0, self.dilation.0)?;
        let ow = conv_extent(input_hw.1, kernel.1, self.stride.1, self.padding.1, self.dilation.1)?;
        Ok((oh, ow))
    }

    /// Spatial output extent of a transposed convolution.
    pub fn transposed_output_hw(
        &self,
        input_hw: (usize, usize),
        kernel: (usize, usize),
    ) -> PureResult<(usize, usize)> {
        let oh = transposed_extent(input_hw.0, kernel.0, self.stride.0, self.padding.0, self.dilation.0)?;
        let ow = transposed_extent(input_hw.1, kernel.1, self.stride.1, self.padding.1, self.dilation.1)?;
        Ok((oh, ow))
    }
}

fn dilated_extent(size: usize, dilation: usize) -> PureResult<usize> {
    size.checked_sub(1)
        .and_then(|value| value.checked_mul(dilation))
        .and_then(|value| value.checked_add(1))
        .ok_or(TensorError::InvalidDimensions {
            label: "kernel",
            value: size,
        })
}

fn conv_extent(input: usize, kernel: usize, stride: usize, padding: usize, dilation: usize) -> PureResult<usize> {
    let eff = dilated_extent(kernel, dilation)?;
    let padded = input + 2 * padding;
    if padded < eff {
        return Err(TensorError::InvalidDimensions {
            label: "conv_input_extent",
            value: input,
        });
    }
    Ok((padded - eff) / stride + 1)
}

fn transposed_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> PureResult<usize> {
    let eff = dilated_extent(kernel, dilation)?;
    let full = input
        .checked_sub(1)
        .map(|v| v * stride + eff)
        .ok_or(TensorError::InvalidDimensions {
            label: "conv_transpose_input_extent",
            value: input,
        })?;
    full.checked_sub(2 * padding)
        .filter(|&v| v > 0)
        .ok_or(TensorError::InvalidDimensions {
            label: "conv_transpose_padding",
            value: padding,
        })
}

fn as_rank4<'a>(label: &'static str, x: ArrayViewD<'a, f32>) -> PureResult<ArrayView4<'a, f32>> {
    let got = x.ndim();
    x.into_dimensionality::<Ix4>()
        .map_err(|_| TensorError::InvalidRank {
            label,
            expected: 4,
            got,
        })
}

/// Unfolds a `[channels, h, w]` plane into `[channels * kh * kw, oh * ow]` patches.
fn im2col(
    input: ArrayView3<'_, f32>,
    kernel: (usize, usize),
    params: &ConvParams,
    out_hw: (usize, usize),
) -> Array2<f32> {
    let (channels, h, w) = input.dim();
    let (kh, kw) = kernel;
    let (oh, ow) = out_hw;
    let pad_h = params.padding.0 as isize;
    let pad_w = params.padding.1 as isize;
    let mut columns = Array2::zeros((channels * kh * kw, oh * ow));
    for ic in 0..channels {
        for ki in 0..kh {
            for kj in 0..kw {
                let row = (ic * kh + ki) * kw + kj;
                for oy in 0..oh {
                    let iy = (oy * params.stride.0 + ki * params.dilation.0) as isize - pad_h;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for ox in 0..ow {
                        let ix = (ox * params.stride.1 + kj * params.dilation.1) as isize - pad_w;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        columns[[row, oy * ow + ox]] = input[[ic, iy as usize, ix as usize]];
                    }
                }
            }
        }
    }
    columns
}

/// Folds `[channels * kh * kw, h * w]` patches of a transposed convolution
/// back onto a `[channels, oh, ow]` plane.
fn col2im(
    columns: &Array2<f32>,
    channels: usize,
    kernel: (usize, usize),
    params: &ConvParams,
    in_hw: (usize, usize),
    out_hw: (usize, usize),
) -> Array3<f32> {
    let (kh, kw) = kernel;
    let (h, w) = in_hw;
    let (oh, ow) = out_hw;
    let pad_h = params.padding.0 as isize;
    let pad_w = params.padding.1 as isize;
    let mut output = Array3::zeros((channels, oh, ow));
    for oc in 0..channels {
        for ki in 0..kh {
            for kj in 0..kw {
                let row = (oc * kh + ki) * kw + kj;
                for iy in 0..h {
                    let oy = (iy * params.stride.0 + ki * params.dilation.0) as isize - pad_h;
                    if oy < 0 || oy >= oh as isize {
                        continue;
                    }
                    for ix in 0..w {
                        let ox = (ix * params.stride.1 + kj * params.dilation.1) as isize - pad_w;
                        if ox < 0 || ox >= ow as isize {
                            continue;
                        }
                        output[[oc, oy as usize, ox as usize]] += columns[[row, iy * w + ix]];
                    }
                }
            }
        }
    }
    output
}

/// Cross-correlation of `[batch, in, h, w]` with `[out, in / groups, kh, kw]`.
pub fn conv2d(
    input: ArrayViewD<'_, f32>,
    weight: ArrayViewD<'_, f32>,
    params: &ConvParams,
) -> PureResult<ArrayD<f32>> {
    params.validate()?;
    let input = as_rank4("conv2d_input", input)?;
    let weight = as_rank4("conv2d_weight", weight)?;
    let (batch, in_channels, h, w) = input.dim();
    let (out_channels, in_per_group, kh, kw) = weight.dim();
    let groups = params.groups;
    if in_channels != in_per_group * groups || out_channels % groups != 0 {
        return Err(TensorError::shape_mismatch(input.shape(), weight.shape()));
    }
    let out_per_group = out_channels / groups;
    let (oh, ow) = params.output_hw((h, w), (kh, kw))?;
    let span = in_per_group * kh * kw;
    let kernels = (0..groups)
        .map(|g| {
            weight
                .slice(s![g * out_per_group..(g + 1) * out_per_group, .., .., ..])
                .as_standard_layout()
                .into_owned()
                .into_shape((out_per_group, span))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut output = Array4::zeros((batch, out_channels, oh, ow));
    for b in 0..batch {
        for (g, kernel) in kernels.iter().enumerate() {
            let plane = input.slice(s![b, g * in_per_group..(g + 1) * in_per_group, .., ..]);
            let patches = im2col(plane, (kh, kw), params, (oh, ow));
            let response = kernel.dot(&patches).into_shape((out_per_group, oh, ow))?;
            output
                .slice_mut(s![b, g * out_per_group..(g + 1) * out_per_group, .., ..])
                .assign(&response);
        }
    }
    Ok(output.into_dyn())
}

/// Transposed convolution of `[batch, in, h, w]` with `[in, out / groups, kh, kw]`.
pub fn conv_transpose2d(
    input: ArrayViewD<'_, f32>,
    weight: ArrayViewD<'_, f32>,
    params: &ConvParams,
) -> PureResult<ArrayD<f32>> {
    params.validate()?;
    let input = as_rank4("conv_transpose2d_input", input)?;
    let weight = as_rank4("conv_transpose2d_weight", weight)?;
    let (batch, in_channels, h, w) = input.dim();
    let (weight_in, out_per_group, kh, kw) = weight.dim();
    let groups = params.groups;
    if in_channels != weight_in || in_channels % groups != 0 {
        return Err(TensorError::shape_mismatch(input.shape(), weight.shape()));
    }
    let in_per_group = in_channels / groups;
    let (oh, ow) = params.transposed_output_hw((h, w), (kh, kw))?;
    let kernels = (0..groups)
        .map(|g| {
            weight
                .slice(s![g * in_per_group..(g + 1) * in_per_group, .., .., ..])
                .as_standard_layout()
                .into_owned()
                .into_shape((in_per_group, out_per_group * kh * kw))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut output = Array4::zeros((batch, out_per_group * groups, oh, ow));
    for b in 0..batch {
        for (g, kernel) in kernels.iter().enumerate() {
            let plane = input
                .slice(s![b, g * in_per_group..(g + 1) * in_per_group, .., ..])
                .as_standard_layout()
                .into_owned()
                .into_shape((in_per_group, h * w))?;
            let columns = kernel.t().dot(&plane);
            let folded = col2im(&columns, out_per_group, (kh, kw), params, (h, w), (oh, ow));
            output
                .slice_mut(s![b, g * out_per_group..(g + 1) * out_per_group, .., ..])
                .assign(&folded);
        }
    }
    Ok(output.into_dyn())
}

/// Dense transform `x · wᵀ` over the trailing axis; `w` is `[out, in]`.
pub fn linear(input: ArrayViewD<'_, f32>, weight: ArrayViewD<'_, f32>) -> PureResult<ArrayD<f32>> {
    let got = weight.ndim();
    let weight = weight
        .into_dimensionality::<Ix2>()
        .map_err(|_| TensorError::InvalidRank {
            label: "linear_weight",
            expected: 2,
            got,
        })?;
    let (out_features, in_features) = weight.dim();
    validate_positive(in_features, "linear_in_features")?;
    let shape = input.shape().to_vec();
    match shape.last() {
        Some(&last) if last == in_features => {}
        _ => return Err(TensorError::shape_mismatch(&shape, weight.shape())),
    }
    let rows = input.len() / in_features;
    let flat = input
        .as_standard_layout()
        .into_owned()
        .into_shape((rows, in_features))?;
    let product = flat.dot(&weight.t());
    let mut out_shape = shape;
    if let Some(last) = out_shape.last_mut() {
        *last = out_features;
    }
    Ok(product.into_shape(out_shape)?.into_dyn())
}

type RealConv = fn(ArrayViewD<'_, f32>, ArrayViewD<'_, f32>, &ConvParams) -> PureResult<ArrayD<f32>>;

/// Complex convolution assembled from four real convolutions:
/// `(x_re * w_re − x_im * w_im, x_re * w_im + x_im * w_re)`.
///
/// With `transposed` the weight is read as `[out, in, kh, kw]`, its first two
/// axes are swapped and a transposed convolution is used instead.
pub fn complex_conv(
    x: &ComplexTensor,
    w: &ComplexTensor,
    transposed: bool,
    params: &ConvParams,
) -> PureResult<ComplexTensor> {
    let conv: RealConv = if transposed { conv_transpose2d } else { conv2d };
    let (mut w_re, mut w_im) = w.parts();
    if transposed {
        if w.ndim() < 2 {
            return Err(TensorError::InvalidRank {
                label: "complex_conv_weight",
                expected: 4,
                got: w.ndim(),
            });
        }
        w_re.swap_axes(0, 1);
        w_im.swap_axes(0, 1);
    }
    let (x_re, x_im) = x.parts();
    let rr = conv(x_re.view(), w_re.view(), params)?;
    let ii = conv(x_im.view(), w_im.view(), params)?;
    let ri = conv(x_re.view(), w_im.view(), params)?;
    let ir = conv(x_im.view(), w_re.view(), params)?;
    ComplexTensor::from_parts(rr - ii, ri + ir)
}

/// Complex dense transform over the trailing axis.
///
/// When present the bias is *subtracted* from the product.
pub fn complex_linear(
    x: &ComplexTensor,
    w: &ComplexTensor,
    bias: Option<&ComplexTensor>,
) -> PureResult<ComplexTensor> {
    let (x_re, x_im) = x.parts();
    let (w_re, w_im) = w.parts();
    let real = linear(x_re.view(), w_re.view())? - linear(x_im.view(), w_im.view())?;
    let imag = linear(x_re.view(), w_im.view())? + linear(x_im.view(), w_re.view())?;
    let Some(bias) = bias else {
        return ComplexTensor::from_parts(real, imag);
    };
    let shape = real.shape().to_vec();
    let broadcast = |b: ArrayViewD<'_, f32>| {
        b.broadcast(shape.as_slice())
            .map(|view| view.to_owned())
            .ok_or_else(|| TensorError::shape_mismatch(bias.shape(), &shape))
    };
    let b_re = broadcast(bias.re())?;
    let b_im = broadcast(bias.im())?;
    ComplexTensor::from_parts(real - b_re, imag - b_im)
}
