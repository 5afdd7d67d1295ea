// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Complex weight initialisation after Trabelsi et al., *Deep Complex
//! Networks*: Rayleigh-distributed magnitude with a uniform phase.

use crate::complex::ComplexTensor;
use crate::error::{validate_positive, PureResult, TensorError};
use ndarray::{ArrayD, IxDyn};
use rand::distributions::Uniform;
use rand::Rng;
use rand_distr::{Distribution, Weibull};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Variance scaling rule for the Rayleigh magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitMode {
    /// Scale `1 / fan_in`.
    He,
    /// Scale `1 / (fan_in + fan_out)`.
    Glorot,
}

/// How the sampled complex weight is written back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitStorage {
    /// `(m cos φ, m sin φ)`.
    #[default]
    Cartesian,
    /// `(m, φ)` stored verbatim in the real/imaginary slots.
    Polar,
}

/// Fan-in and fan-out of a real kernel shaped `[out, in, k...]`.
pub fn fan_in_fan_out(shape: &[usize]) -> PureResult<(usize, usize)> {
    if shape.len() < 2 {
        return Err(TensorError::InvalidRank {
            label: "fan_in_fan_out",
            expected: 2,
            got: shape.len(),
        });
    }
    let receptive: usize = shape[2..].iter().product();
    let fan_in = shape[1] * receptive;
    let fan_out = shape[0] * receptive;
    validate_positive(fan_in, "fan_in")?;
    validate_positive(fan_out, "fan_out")?;
    Ok((fan_in, fan_out))
}

/// Rayleigh scale for the given rule. The value is used directly as the
/// distribution's scale parameter.
pub fn rayleigh_scale(mode: InitMode, fan_in: usize, fan_out: usize) -> f32 {
    match mode {
        InitMode::He => 1.0 / fan_in as f32,
        InitMode::Glorot => 1.0 / (fan_in + fan_out) as f32,
    }
}

/// Rayleigh(σ) expressed as Weibull(σ·√2, 2).
fn rayleigh(scale: f32) -> PureResult<Weibull<f32>> {
    Weibull::new(scale * std::f32::consts::SQRT_2, 2.0).map_err(|_| TensorError::InvalidScalar {
        label: "rayleigh_scale",
        value: scale,
    })
}

/// Draws one Rayleigh-distributed magnitude.
pub fn sample_rayleigh<R: Rng + ?Sized>(rng: &mut R, scale: f32) -> PureResult<f32> {
    Ok(rayleigh(scale)?.sample(rng))
}

/// Samples a complex weight with component shape `shape` (`[out, in, k...]`).
pub fn complex_weights<R: Rng + ?Sized>(
    shape: &[usize],
    mode: InitMode,
    storage: InitStorage,
    rng: &mut R,
) -> PureResult<ComplexTensor> {
    let (fan_in, fan_out) = fan_in_fan_out(shape)?;
    let scale = rayleigh_scale(mode, fan_in, fan_out);
    let magnitude_dist = rayleigh(scale)?;
    let phase_dist = Uniform::new_inclusive(-PI, PI);
    let len: usize = shape.iter().product();
    let mut real = Vec::with_capacity(len);
    let mut imag = Vec::with_capacity(len);
    for _ in 0..len {
        let m = magnitude_dist.sample(rng);
        let phi = phase_dist.sample(rng);
        match storage {
            InitStorage::Cartesian => {
                real.push(m * phi.cos());
                imag.push(m * phi.sin());
            }
            InitStorage::Polar => {
                real.push(m);
                imag.push(phi);
            }
        }
    }
    tracing::trace!(?shape, ?mode, ?storage, scale, "sampled complex weights");
    ComplexTensor::from_parts(
        ArrayD::from_shape_vec(IxDyn(shape), real)?,
        ArrayD::from_shape_vec(IxDyn(shape), imag)?,
    )
}

/// Independent uniform `[-bound, bound)` draws per component.
pub fn uniform_weights<R: Rng + ?Sized>(shape: &[usize], bound: f32, rng: &mut R) -> PureResult<ComplexTensor> {
    if bound <= 0.0 || !bound.is_finite() {
        return Err(TensorError::InvalidScalar {
            label: "uniform_bound",
            value: bound,
        });
    }
    let dist = Uniform::new(-bound, bound);
    let len: usize = shape.iter().product();
    let mut real = Vec::with_capacity(len);
    for _ in 0..len {
        real.push(dist.sample(rng));
    }
    let mut imag = Vec::with_capacity(len);
    for _ in 0..len {
        imag.push(dist.sample(rng));
    }
    ComplexTensor::from_parts(
        ArrayD::from_shape_vec(IxDyn(shape), real)?,
        ArrayD::from_shape_vec(IxDyn(shape), imag)?,
    )
}
