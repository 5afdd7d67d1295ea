// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{ComplexTensor, PureResult};
use igc_tensor::{batch_norm_cmplx, DEFAULT_EPS};
use igc_tensor::error::validate_epsilon;

/// Complex batch normalisation over the current batch. Keeps no running
/// statistics and has no affine terms.
#[derive(Clone, Debug)]
pub struct BatchNormCmplx {
    epsilon: f32,
}

impl BatchNormCmplx {
    pub const DEFAULT_EPSILON: f32 = DEFAULT_EPS;

    pub fn new(epsilon: f32) -> PureResult<Self> {
        validate_epsilon(epsilon, "batch_norm_epsilon")?;
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl Default for BatchNormCmplx {
    fn default() -> Self {
        Self {
            epsilon: Self::DEFAULT_EPSILON,
        }
    }
}

impl Module for BatchNormCmplx {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        batch_norm_cmplx(input, self.epsilon)
    }

    fn visit_parameters(&self, _visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>) -> PureResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex32;

    #[test]
    fn channels_are_centred() {
        let x = ComplexTensor::from_fn(&[4, 2, 3, 3], |idx| {
            Complex32::new((idx[0] * 3 + idx[2]) as f32 + 10.0 * idx[1] as f32, idx[3] as f32 - 1.0)
        });
        let y = BatchNormCmplx::default().forward(&x).unwrap();
        for c in 0..2 {
            let re = y.re();
            let mean: f32 = re.index_axis(ndarray::Axis(1), c).mean().unwrap();
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn invalid_epsilon_is_rejected() {
        assert!(BatchNormCmplx::new(0.0).is_err());
        assert!(BatchNormCmplx::new(f32::NAN).is_err());
        assert_abs_diff_eq!(BatchNormCmplx::new(1e-3).unwrap().epsilon(), 1e-3);
    }
}
