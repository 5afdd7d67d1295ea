// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::complex::ComplexTensor;
use crate::error::{validate_epsilon, PureResult, TensorError};
use crate::shape::{compress_shape, recover_shape};
use ndarray::{Array1, ArrayD, Axis, Ix4};

/// Complex batch normalisation without affine terms.
///
/// Each channel is centred by its complex mean over batch and spatial axes,
/// then both parts are divided by the unbiased standard deviation of the
/// centred magnitude, clamped below by `eps`. Extra axes between batch and
/// the spatial extent are folded into channels and share nothing.
pub fn batch_norm_cmplx(x: &ComplexTensor, eps: f32) -> PureResult<ComplexTensor> {
    validate_epsilon(eps, "batch_norm_epsilon")?;
    let (folded, remembered) = compress_shape(x)?;
    let centred = folded.map_parts(|part| {
        let part = part.into_dimensionality::<Ix4>()?;
        let means = channel_means(&part.to_owned().into_dyn())?;
        let channels = means.len();
        let means = means.into_shape((1, channels, 1, 1))?;
        Ok((&part - &means).into_dyn())
    })?;

    let magnitude = centred.magnitude(eps);
    let stds = channel_stds(&magnitude)?.mapv(|s| s.max(eps));
    let stds = stds.into_shape((1, centred.shape()[1], 1, 1))?;
    let scaled = centred.map_parts(|part| {
        let part = part.into_dimensionality::<Ix4>()?;
        Ok((&part / &stds).into_dyn())
    })?;
    recover_shape(scaled, remembered)
}

fn reduce_per_channel(values: &ArrayD<f32>) -> PureResult<Vec<ArrayD<f32>>> {
    let channels = values.shape().get(1).copied().ok_or(TensorError::InvalidRank {
        label: "batch_norm_input",
        expected: 4,
        got: values.ndim(),
    })?;
    Ok((0..channels)
        .map(|c| values.index_axis(Axis(1), c).to_owned())
        .collect())
}

fn channel_means(values: &ArrayD<f32>) -> PureResult<Array1<f32>> {
    let lanes = reduce_per_channel(values)?;
    Ok(lanes
        .iter()
        .map(|lane| lane.mean().unwrap_or(0.0))
        .collect())
}

/// Sample standard deviation per channel, denominator `max(n − 1, 1)`.
fn channel_stds(values: &ArrayD<f32>) -> PureResult<Array1<f32>> {
    let lanes = reduce_per_channel(values)?;
    Ok(lanes
        .iter()
        .map(|lane| {
            let n = lane.len();
            let mean = lane.mean().unwrap_or(0.0);
            let ss: f32 = lane.iter().map(|v| (v - mean) * (v - mean)).sum();
            (ss / n.saturating_sub(1).max(1) as f32).sqrt()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::DEFAULT_EPS;
    use approx::assert_abs_diff_eq;
    use ndarray::IxDyn;

    fn fixture() -> ComplexTensor {
        let shape = [3, 2, 2, 2];
        let len: usize = shape.iter().product();
        let re = ArrayD::from_shape_vec(IxDyn(&shape), (0..len).map(|i| (i as f32 * 0.9).sin() * 3.0 + 1.0).collect())
            .unwrap();
        let im = ArrayD::from_shape_vec(IxDyn(&shape), (0..len).map(|i| (i as f32 * 0.4).cos() - 2.0).collect())
            .unwrap();
        ComplexTensor::from_parts(re, im).unwrap()
    }

    #[test]
    fn output_is_centred_per_channel() {
        let out = batch_norm_cmplx(&fixture(), DEFAULT_EPS).unwrap();
        for c in 0..2 {
            assert_abs_diff_eq!(out.re().index_axis(Axis(1), c).mean().unwrap(), 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(out.im().index_axis(Axis(1), c).mean().unwrap(), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn magnitude_has_unit_sample_deviation() {
        let out = batch_norm_cmplx(&fixture(), DEFAULT_EPS).unwrap();
        let stds = channel_stds(&out.magnitude(DEFAULT_EPS)).unwrap();
        for s in stds.iter() {
            assert_abs_diff_eq!(*s, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn constant_channels_stay_finite() {
        let x = ComplexTensor::from_parts(
            ArrayD::from_elem(IxDyn(&[2, 1, 2, 2]), 5.0),
            ArrayD::from_elem(IxDyn(&[2, 1, 2, 2]), -1.0),
        )
        .unwrap();
        let out = batch_norm_cmplx(&x, DEFAULT_EPS).unwrap();
        assert!(out.stacked().iter().all(|v| v.is_finite() && v.abs() < 1e-3));
    }

    #[test]
    fn rank_five_is_folded_and_restored() {
        let x = fixture().reshape(&[3, 1, 2, 2, 2]).unwrap();
        let out = batch_norm_cmplx(&x, DEFAULT_EPS).unwrap();
        assert_eq!(out.shape(), &[3, 1, 2, 2, 2]);
        assert!(batch_norm_cmplx(&x, 0.0).is_err());
    }
}
