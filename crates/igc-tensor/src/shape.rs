// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Folding of the orientation axis into channels so that spatial operators only
//! ever see `[batch, channels, height, width]` components.

use crate::complex::ComplexTensor;
use crate::error::{PureResult, TensorError};

/// Original component shape remembered by [`compress_shape`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedShape {
    original: Vec<usize>,
}

impl CompressedShape {
    pub fn original(&self) -> &[usize] {
        &self.original
    }
}

/// Folds every axis between batch and the two spatial axes into the channel
/// axis. Rank-4 tensors pass through untouched.
pub fn compress_shape(x: &ComplexTensor) -> PureResult<(ComplexTensor, Option<CompressedShape>)> {
    let shape = x.shape();
    match shape.len() {
        4 => Ok((x.clone(), None)),
        n if n > 4 => {
            let channels: usize = shape[1..n - 2].iter().product();
            let folded = [shape[0], channels, shape[n - 2], shape[n - 1]];
            let compressed = x.reshape(&folded)?;
            Ok((
                compressed,
                Some(CompressedShape {
                    original: shape.to_vec(),
                }),
            ))
        }
        n => Err(TensorError::InvalidRank {
            label: "compress_shape",
            expected: 4,
            got: n,
        }),
    }
}

/// Undoes [`compress_shape`], taking the (possibly resized) spatial extent from
/// `x` and every other axis from the remembered shape.
pub fn recover_shape(x: ComplexTensor, shape: Option<CompressedShape>) -> PureResult<ComplexTensor> {
    let Some(shape) = shape else {
        return Ok(x);
    };
    x.expect_rank("recover_shape", 4)?;
    let current = x.shape();
    let n = shape.original.len();
    let mut target = shape.original.clone();
    target[n - 2] = current[2];
    target[n - 1] = current[3];
    x.reshape(&target)
}
