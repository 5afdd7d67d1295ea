// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::complex::ComplexTensor;
use crate::error::{PureResult, TensorError};
use ndarray::{ArrayD, IxDyn, Zip};

/// Rectifies real and imaginary parts independently.
pub fn relu_c(x: &ComplexTensor) -> PureResult<ComplexTensor> {
    x.map_parts(|part| Ok(part.mapv(|v| v.max(0.0))))
}

/// Keeps a value only when both of its parts are strictly positive.
pub fn relu_z(x: &ComplexTensor) -> PureResult<ComplexTensor> {
    let (re, im) = x.parts();
    let keep = Zip::from(&re).and(&im).map_collect(|&a, &b| a > 0.0 && b > 0.0);
    x.map_parts(|part| {
        Ok(Zip::from(&part)
            .and(&keep)
            .map_collect(|&v, &k| if k { v } else { 0.0 }))
    })
}

/// Modulus ReLU `relu(|x| + b) · x / |x|`.
///
/// `bias` holds one value per channel (axis 1 of the component shape) and may
/// be stored with trailing singleton axes such as `[channels, 1, 1]`.
pub fn relu_mod(x: &ComplexTensor, bias: &ArrayD<f32>, eps: f32) -> PureResult<ComplexTensor> {
    let shape = x.shape().to_vec();
    let channels = *shape.get(1).ok_or(TensorError::InvalidRank {
        label: "relu_mod_input",
        expected: 4,
        got: shape.len(),
    })?;
    if bias.len() != channels {
        return Err(TensorError::shape_mismatch(bias.shape(), &shape));
    }
    let mut aligned = vec![1; shape.len()];
    aligned[1] = channels;
    let bias = bias
        .as_standard_layout()
        .into_owned()
        .into_shape(IxDyn(&aligned))?;
    let bias = bias
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| TensorError::shape_mismatch(&aligned, &shape))?;

    let radius = x.magnitude(eps);
    let gain = Zip::from(&radius)
        .and(&bias)
        .map_collect(|&r, &b| (r + b).max(0.0) / r);
    x.map_parts(|part| Ok(&part * &gain))
}
