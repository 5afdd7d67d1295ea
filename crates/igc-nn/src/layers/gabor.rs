// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Learnable bank of oriented complex Gabor filters.
//!
//! Each filter `g` is described by two scalars stored in a `[2, no_g]`
//! parameter: an orientation `θ_g` and a log-aspect `s_g`. The bank is derived
//! from those parameters on demand and cached until the owner reports a
//! gradient update.

use crate::module::{Parameter, StateDict};
use crate::{ComplexTensor, PureResult, TensorError};
use ndarray::{Array2, ArrayD};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::cell::{Cell, RefCell};
use std::f32::consts::{FRAC_PI_2, PI};

/// Envelope width on the normalised grid.
const SIGMA: f32 = 1.0;
/// Carrier frequency along the rotated x axis.
const OMEGA: f32 = FRAC_PI_2;

/// Whether the cached filter bank reflects the current parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterCacheState {
    Stale,
    Valid,
}

/// Normalised coordinate of tap `j` on an axis of `k` taps, in `[-1, 1]`.
fn grid(j: usize, k: usize) -> f32 {
    let centre = (k as f32 - 1.0) / 2.0;
    (j as f32 - centre) / centre.max(1.0)
}

/// Builds the `[no_g, 1, 1, kh, kw]` complex filter bank for `params`
/// (`[2, no_g]`: orientations then log-aspects). Pure function of its inputs.
pub fn gabor_filters(params: &ArrayD<f32>, kernel: (usize, usize)) -> PureResult<ComplexTensor> {
    let got = params.ndim();
    let params = params
        .view()
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|_| TensorError::InvalidRank {
            label: "gabor_params",
            expected: 2,
            got,
        })?;
    if params.nrows() != 2 {
        return Err(TensorError::shape_mismatch(params.shape(), &[2, params.ncols()]));
    }
    let (kh, kw) = kernel;
    if kh == 0 || kw == 0 {
        return Err(TensorError::InvalidDimensions {
            label: "gabor_kernel",
            value: kh.min(kw),
        });
    }
    let no_g = params.ncols();
    Ok(ComplexTensor::from_fn(&[no_g, 1, 1, kh, kw], |idx| {
        let (g, i, j) = (idx[0], idx[3], idx[4]);
        let theta = params[[0, g]];
        let aspect = (2.0 * params[[1, g]]).exp();
        let (sin, cos) = theta.sin_cos();
        let x = grid(j, kw);
        let y = grid(i, kh);
        let xr = x * cos + y * sin;
        let yr = -x * sin + y * cos;
        let envelope = (-(xr * xr + aspect * yr * yr) / (2.0 * SIGMA * SIGMA)).exp();
        let phase = OMEGA * xr;
        num_complex::Complex32::new(envelope * phase.cos(), envelope * phase.sin())
    }))
}

/// Orientation sweep `g·π/no_g` and log-aspects uniform in `±1/√no_g`.
pub fn init_gabor_params<R: Rng + ?Sized>(no_g: usize, rng: &mut R) -> PureResult<ArrayD<f32>> {
    if no_g == 0 {
        return Err(TensorError::InvalidDimensions {
            label: "no_g",
            value: no_g,
        });
    }
    let bound = 1.0 / (no_g as f32).sqrt();
    let spread = Uniform::new_inclusive(-bound, bound);
    let mut params = Array2::<f32>::zeros((2, no_g));
    for g in 0..no_g {
        params[[0, g]] = g as f32 / no_g as f32 * PI;
        params[[1, g]] = spread.sample(rng);
    }
    Ok(params.into_dyn())
}

/// Parameters, cached bank and cache state of one layer's Gabor modulation.
#[derive(Clone, Debug)]
pub struct GaborFilterBank {
    no_g: usize,
    kernel: (usize, usize),
    params: Parameter,
    filters_key: String,
    filters: RefCell<ComplexTensor>,
    state: Cell<FilterCacheState>,
    generations: Cell<u64>,
}

impl GaborFilterBank {
    /// `prefix` is the owning layer's key, e.g. `"conv1.gabor"`.
    pub fn new<R: Rng + ?Sized>(
        prefix: &str,
        no_g: usize,
        kernel: (usize, usize),
        rng: &mut R,
    ) -> PureResult<Self> {
        let params = init_gabor_params(no_g, rng)?;
        if kernel.0 == 0 || kernel.1 == 0 {
            return Err(TensorError::InvalidDimensions {
                label: "gabor_kernel",
                value: 0,
            });
        }
        Ok(Self {
            no_g,
            kernel,
            params: Parameter::new(format!("{prefix}.gabor_params"), params)
                .with_alias(format!("{prefix}.gabor")),
            filters_key: format!("{prefix}.gabor_filters"),
            filters: RefCell::new(ComplexTensor::zeros(&[no_g, 1, 1, kernel.0, kernel.1])),
            state: Cell::new(FilterCacheState::Stale),
            generations: Cell::new(0),
        })
    }

    pub fn no_g(&self) -> usize {
        self.no_g
    }

    pub fn kernel(&self) -> (usize, usize) {
        self.kernel
    }

    pub fn params(&self) -> &Parameter {
        &self.params
    }

    /// Mutable access to `[θ; s]`. Marks the cache stale, since the caller
    /// may rewrite the values.
    pub fn params_mut(&mut self) -> &mut Parameter {
        self.invalidate();
        &mut self.params
    }

    pub fn state(&self) -> FilterCacheState {
        self.state.get()
    }

    /// How many times the bank has been rebuilt since construction.
    pub fn generations(&self) -> u64 {
        self.generations.get()
    }

    /// Returns the cached bank, rebuilding it first when stale.
    pub fn generate_or_reuse_filters(&self) -> PureResult<ComplexTensor> {
        if self.state.get() == FilterCacheState::Valid {
            tracing::trace!(key = %self.filters_key, "reusing cached gabor filters");
            return Ok(self.filters.borrow().clone());
        }
        let filters = gabor_filters(self.params.value(), self.kernel)?;
        *self.filters.borrow_mut() = filters.clone();
        self.state.set(FilterCacheState::Valid);
        self.generations.set(self.generations.get() + 1);
        tracing::debug!(
            key = %self.filters_key,
            no_g = self.no_g,
            generation = self.generations.get(),
            "regenerated gabor filters"
        );
        Ok(filters)
    }

    /// Marks the cache stale so the next use rebuilds it.
    pub fn invalidate(&self) {
        self.state.set(FilterCacheState::Stale);
    }

    /// Complex product of the bank with a `[out, in, kh, kw]` weight,
    /// flattened orientation-major to `[no_g * out, in, kh, kw]`.
    pub fn modulate(&self, weight: &ComplexTensor) -> PureResult<ComplexTensor> {
        weight.expect_rank("gabor_modulate_weight", 4)?;
        let (out, inputs, kh, kw) = (weight.shape()[0], weight.shape()[1], weight.shape()[2], weight.shape()[3]);
        if (kh, kw) != self.kernel {
            return Err(TensorError::shape_mismatch(&[kh, kw], &[self.kernel.0, self.kernel.1]));
        }
        let filters = self.generate_or_reuse_filters()?;
        let product = filters.mul(&weight.insert_axis(0)?)?;
        product.reshape(&[self.no_g * out, inputs, kh, kw])
    }

    /// Stacked `[2, no_g, 1, 1, kh, kw]` view of the cached bank under its key.
    pub(crate) fn visit_buffer(
        &self,
        visitor: &mut dyn FnMut(&str, &ArrayD<f32>) -> PureResult<()>,
    ) -> PureResult<()> {
        let filters = self.filters.borrow();
        visitor(&self.filters_key, filters.stacked())
    }

    /// Restores the cached bank when present; the cache stays stale either
    /// way so the bank is rebuilt from the loaded parameters.
    pub(crate) fn load_buffer(&mut self, state: &StateDict) -> PureResult<()> {
        if let Some(stored) = state.get(&self.filters_key) {
            let expected = [2, self.no_g, 1, 1, self.kernel.0, self.kernel.1];
            if stored.shape() != &expected[..] {
                return Err(TensorError::shape_mismatch(stored.shape(), &expected));
            }
            *self.filters.get_mut() = ComplexTensor::from_stacked(stored.clone())?;
        }
        self.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use igc_tensor::DEFAULT_EPS;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bank(no_g: usize) -> GaborFilterBank {
        GaborFilterBank::new("layer.gabor", no_g, (3, 3), &mut StdRng::seed_from_u64(5)).unwrap()
    }

    #[test]
    fn initial_parameters_sweep_orientations() {
        let params = init_gabor_params(4, &mut StdRng::seed_from_u64(1)).unwrap();
        for g in 0..4 {
            assert_abs_diff_eq!(params[[0, g]], g as f32 * PI / 4.0, epsilon = 1e-6);
            assert!(params[[1, g]].abs() <= 0.5);
        }
        assert!(init_gabor_params(0, &mut StdRng::seed_from_u64(1)).is_err());
    }

    #[test]
    fn generator_is_pure() {
        let params = init_gabor_params(3, &mut StdRng::seed_from_u64(9)).unwrap();
        let a = gabor_filters(&params, (5, 3)).unwrap();
        let b = gabor_filters(&params, (5, 3)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.stacked().shape(), &[2, 3, 1, 1, 5, 3]);
    }

    #[test]
    fn filters_are_nontrivial_and_peak_at_centre() {
        let params = init_gabor_params(4, &mut StdRng::seed_from_u64(2)).unwrap();
        let filters = gabor_filters(&params, (3, 3)).unwrap();
        assert!(filters.im().iter().any(|v| v.abs() > 1e-3));
        let magnitude = filters.magnitude(DEFAULT_EPS);
        for g in 0..4 {
            assert_abs_diff_eq!(magnitude[[g, 0, 0, 1, 1]], 1.0, epsilon = 1e-6);
            assert!(magnitude[[g, 0, 0, 0, 0]] < 1.0);
        }
    }

    #[test]
    fn one_tap_kernel_is_a_unit_impulse() {
        let params = init_gabor_params(2, &mut StdRng::seed_from_u64(2)).unwrap();
        let filters = gabor_filters(&params, (1, 1)).unwrap();
        assert_eq!(filters.get(&[1, 0, 0, 0, 0]), Some(num_complex::Complex32::new(1.0, 0.0)));
    }

    #[test]
    fn cache_is_reused_until_invalidated() {
        let bank = bank(4);
        assert_eq!(bank.state(), FilterCacheState::Stale);
        let first = bank.generate_or_reuse_filters().unwrap();
        assert_eq!(bank.state(), FilterCacheState::Valid);
        let second = bank.generate_or_reuse_filters().unwrap();
        assert_eq!(first, second);
        assert_eq!(bank.generations(), 1);
        bank.invalidate();
        assert_eq!(bank.state(), FilterCacheState::Stale);
        bank.generate_or_reuse_filters().unwrap();
        assert_eq!(bank.generations(), 2);
    }

    #[test]
    fn modulation_is_orientation_major() {
        let bank = bank(2);
        let weight = ComplexTensor::from_fn(&[3, 2, 3, 3], |idx| {
            num_complex::Complex32::new(1.0 + idx[0] as f32, idx[1] as f32)
        });
        let enhanced = bank.modulate(&weight).unwrap();
        assert_eq!(enhanced.shape(), &[6, 2, 3, 3]);
        let filters = bank.generate_or_reuse_filters().unwrap();
        let (g, o, i, y, x) = (1, 2, 1, 0, 2);
        let expected = filters.get(&[g, 0, 0, y, x]).unwrap() * weight.get(&[o, i, y, x]).unwrap();
        let got = enhanced.get(&[g * 3 + o, i, y, x]).unwrap();
        assert_abs_diff_eq!(got.re, expected.re, epsilon = 1e-6);
        assert_abs_diff_eq!(got.im, expected.im, epsilon = 1e-6);
        assert!(bank.modulate(&ComplexTensor::zeros(&[3, 2, 5, 5])).is_err());
    }
}
