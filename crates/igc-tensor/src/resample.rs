// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::complex::ComplexTensor;
use crate::error::{validate_positive, PureResult, TensorError};
use crate::shape::{compress_shape, recover_shape};
use ndarray::{Array4, ArrayD, ArrayViewD, Ix4};
use serde::{Deserialize, Serialize};

/// Interpolation used by [`resample_cmplx`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMode {
    /// Bilinear with corner pixels aligned between input and output grids.
    #[default]
    Bilinear,
    Nearest,
}

/// Source coordinate of output index `dst` under corner alignment.
fn aligned_source(dst: usize, input: usize, output: usize) -> f32 {
    if output <= 1 {
        0.0
    } else {
        dst as f32 * (input - 1) as f32 / (output - 1) as f32
    }
}

fn resample_plane(input: ArrayViewD<'_, f32>, size: (usize, usize), mode: ResampleMode) -> PureResult<ArrayD<f32>> {
    let got = input.ndim();
    let input = input
        .into_dimensionality::<Ix4>()
        .map_err(|_| TensorError::InvalidRank {
            label: "resample_input",
            expected: 4,
            got,
        })?;
    let (batch, channels, h, w) = input.dim();
    let (oh, ow) = size;
    let out = match mode {
        ResampleMode::Nearest => Array4::from_shape_fn((batch, channels, oh, ow), |(b, c, y, x)| {
            let sy = (y * h / oh).min(h - 1);
            let sx = (x * w / ow).min(w - 1);
            input[[b, c, sy, sx]]
        }),
        ResampleMode::Bilinear => Array4::from_shape_fn((batch, channels, oh, ow), |(b, c, y, x)| {
            let fy = aligned_source(y, h, oh);
            let fx = aligned_source(x, w, ow);
            let y0 = fy.floor() as usize;
            let x0 = fx.floor() as usize;
            let y1 = (y0 + 1).min(h - 1);
            let x1 = (x0 + 1).min(w - 1);
            let dy = fy - y0 as f32;
            let dx = fx - x0 as f32;
            let top = input[[b, c, y0, x0]] * (1.0 - dx) + input[[b, c, y0, x1]] * dx;
            let bottom = input[[b, c, y1, x0]] * (1.0 - dx) + input[[b, c, y1, x1]] * dx;
            top * (1.0 - dy) + bottom * dy
        }),
    };
    Ok(out.into_dyn())
}

/// Resizes the spatial axes of each component to `size`. Inputs above rank
/// four are folded into channels and restored with the new extent.
pub fn resample_cmplx(x: &ComplexTensor, size: (usize, usize), mode: ResampleMode) -> PureResult<ComplexTensor> {
    validate_positive(size.0, "resample_height")?;
    validate_positive(size.1, "resample_width")?;
    let (folded, remembered) = compress_shape(x)?;
    let spatial = &folded.shape()[2..];
    validate_positive(spatial[0], "resample_input_height")?;
    validate_positive(spatial[1], "resample_input_width")?;
    tracing::trace!(from = ?spatial, to = ?size, ?mode, "resampling complex tensor");
    let resized = folded.map_parts(|part| resample_plane(part, size, mode))?;
    recover_shape(resized, remembered)
}
