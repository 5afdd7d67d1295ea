// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Invariant Gabor convolution.
//!
//! The learned complex kernel `[out / no_g, in, kh, kw]` is multiplied by a
//! bank of `no_g` oriented Gabor filters, giving an orientation-major kernel of
//! `out` channels (`channel = g * (out / no_g) + o`) when no orientation pool
//! is configured. With a pool, the base kernel keeps all `out` channels, the
//! convolution produces `no_g * out` maps and the pool folds the orientation
//! axis back down to `out`.

use super::conv::{init_complex_weight, ComplexKernel};
use super::gabor::{FilterCacheState, GaborFilterBank};
use crate::module::{Module, Parameter, StateDict};
use crate::{ComplexTensor, PureResult, TensorError};
use igc_tensor::init::InitMode;
use igc_tensor::error::validate_positive;
use igc_tensor::{complex_conv, ConvParams, GaborPooling, OrientationPoolFn};
use ndarray::ArrayD;
use std::cell::RefCell;

/// Construction options of [`IGConvCmplx`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IGConvConfig {
    pub in_features: usize,
    pub out_features: usize,
    pub kernel_size: (usize, usize),
    /// Number of Gabor orientations.
    pub no_g: usize,
    pub gabor_pooling: Option<GaborPooling>,
    /// Accepted for compatibility; it has no effect on the layer.
    pub include_gparams: bool,
    pub weight_init: Option<InitMode>,
    pub conv: ConvParams,
    pub seed: Option<u64>,
}

impl IGConvConfig {
    pub fn new(in_features: usize, out_features: usize, kernel_size: usize) -> Self {
        Self {
            in_features,
            out_features,
            kernel_size: (kernel_size, kernel_size),
            no_g: 2,
            gabor_pooling: None,
            include_gparams: false,
            weight_init: None,
            conv: ConvParams::default(),
            seed: None,
        }
    }

    pub fn with_kernel(mut self, kh: usize, kw: usize) -> Self {
        self.kernel_size = (kh, kw);
        self
    }

    pub fn with_no_g(mut self, no_g: usize) -> Self {
        self.no_g = no_g;
        self
    }

    pub fn with_gabor_pooling(mut self, pooling: GaborPooling) -> Self {
        self.gabor_pooling = Some(pooling);
        self
    }

    pub fn with_include_gparams(mut self, include: bool) -> Self {
        self.include_gparams = include;
        self
    }

    pub fn with_weight_init(mut self, mode: InitMode) -> Self {
        self.weight_init = Some(mode);
        self
    }

    pub fn with_conv(mut self, conv: ConvParams) -> Self {
        self.conv = conv;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Output channels of the learned base kernel.
    fn weight_out_features(&self) -> usize {
        match self.gabor_pooling {
            Some(_) => self.out_features,
            None => self.out_features / self.no_g,
        }
    }

    fn validate(&self) -> PureResult<()> {
        validate_positive(self.in_features, "in_features")?;
        validate_positive(self.out_features, "out_features")?;
        validate_positive(self.kernel_size.0, "kernel_h")?;
        validate_positive(self.kernel_size.1, "kernel_w")?;
        validate_positive(self.no_g, "no_g")?;
        self.conv.validate()?;
        if self.gabor_pooling.is_none() && self.out_features % self.no_g != 0 {
            return Err(TensorError::configuration(format!(
                "out_features ({}) must be divisible by no_g ({}) when no gabor pooling is used",
                self.out_features, self.no_g
            )));
        }
        let groups = self.conv.groups;
        let conv_out = self.no_g * self.weight_out_features();
        if self.in_features % groups != 0 || conv_out % groups != 0 {
            return Err(TensorError::configuration(format!(
                "groups ({groups}) must divide in_features ({}) and the modulated channel count ({conv_out})",
                self.in_features
            )));
        }
        Ok(())
    }
}

/// Complex convolution whose kernel is modulated by learned Gabor filters.
#[derive(Clone)]
pub struct IGConvCmplx {
    name: String,
    config: IGConvConfig,
    kernel: ComplexKernel,
    gabor: GaborFilterBank,
    pool: Option<OrientationPoolFn>,
    last_orientation_indices: RefCell<Option<ArrayD<usize>>>,
}

impl core::fmt::Debug for IGConvCmplx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "IGConvCmplx(name={},in={},out={},kernel={:?},no_g={},pooling={:?},filters={:?})",
            self.name,
            self.config.in_features,
            self.config.out_features,
            self.config.kernel_size,
            self.config.no_g,
            self.config.gabor_pooling,
            self.gabor.state()
        )
    }
}

impl IGConvCmplx {
    pub fn new(name: impl Into<String>, config: IGConvConfig) -> PureResult<Self> {
        let name = name.into();
        config.validate()?;
        let (kh, kw) = config.kernel_size;
        let shape = [
            config.weight_out_features(),
            config.in_features / config.conv.groups,
            kh,
            kw,
        ];
        let mut rng = igc_config::rng_from_optional(config.seed, &format!("igc-nn/igconv/{name}"));
        let weight = init_complex_weight(&shape, config.weight_init, &mut rng)?;
        let gabor = GaborFilterBank::new(&format!("{name}.gabor"), config.no_g, config.kernel_size, &mut rng)?;
        tracing::debug!(
            layer = %name,
            weight = ?shape,
            no_g = config.no_g,
            pooling = ?config.gabor_pooling,
            "constructed igconv layer"
        );
        Ok(Self {
            kernel: ComplexKernel::new(&name, weight),
            gabor,
            pool: config.gabor_pooling.map(GaborPooling::operator),
            last_orientation_indices: RefCell::new(None),
            name,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &IGConvConfig {
        &self.config
    }

    pub fn gabor(&self) -> &GaborFilterBank {
        &self.gabor
    }

    pub fn gabor_mut(&mut self) -> &mut GaborFilterBank {
        &mut self.gabor
    }

    pub fn filter_state(&self) -> FilterCacheState {
        self.gabor.state()
    }

    /// Unmodulated learned kernel.
    pub fn weight(&self) -> PureResult<ComplexTensor> {
        self.kernel.weight()
    }

    /// Gabor-modulated kernel used by the convolution,
    /// `[no_g * weight_out, in / groups, kh, kw]`.
    pub fn enhanced_weight(&self) -> PureResult<ComplexTensor> {
        self.gabor.modulate(&self.kernel.weight()?)
    }

    /// Winning orientation per output location from the last forward pass of
    /// an argmax pool (`Mag`, `SummedMag`), laid out `[2, b, out, h, w]`.
    pub fn last_orientation_indices(&self) -> Option<ArrayD<usize>> {
        self.last_orientation_indices.borrow().clone()
    }

    /// Marks the cached filter bank stale.
    pub fn invalidate(&self) {
        self.gabor.invalidate();
    }

    fn pool_orientations(&self, pool: OrientationPoolFn, out: ComplexTensor) -> PureResult<ComplexTensor> {
        let shape = out.shape().to_vec();
        let (batch, channels, h, w) = (shape[0], shape[1], shape[2], shape[3]);
        let no_g = self.config.no_g;
        // [b, g * c, h, w] -> [b, g, c, h, w] -> [b, c, g, h, w]
        let split = out
            .reshape(&[batch, no_g, channels / no_g, h, w])?
            .swap_axes(1, 2)?;
        let (pooled, indices) = pool(&split)?;
        *self.last_orientation_indices.borrow_mut() = indices;
        Ok(pooled)
    }
}

impl Module for IGConvCmplx {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        input.expect_rank("igconv_input", 4)?;
        let enhanced = self.enhanced_weight()?;
        let out = complex_conv(input, &enhanced, false, &self.config.conv)?;
        tracing::debug!(
            layer = %self.name,
            input = ?input.shape(),
            output = ?out.shape(),
            generation = self.gabor.generations(),
            "igconv forward"
        );
        match self.pool {
            Some(pool) => self.pool_orientations(pool, out),
            None => Ok(out),
        }
    }

    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>) -> PureResult<()> {
        self.kernel.visit(visitor)?;
        visitor(self.gabor.params())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.kernel.visit_mut(visitor)?;
        visitor(self.gabor.params_mut())
    }

    fn visit_buffers(
        &self,
        visitor: &mut dyn FnMut(&str, &ArrayD<f32>) -> PureResult<()>,
    ) -> PureResult<()> {
        self.gabor.visit_buffer(visitor)
    }

    fn load_buffers(&mut self, state: &StateDict) -> PureResult<()> {
        self.gabor.load_buffer(state)
    }

    fn on_gradient_computed(&self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    fn ramp(shape: &[usize]) -> ComplexTensor {
        ComplexTensor::from_fn(shape, |idx| {
            let t = idx.iter().enumerate().map(|(a, &i)| (a + 1) as f32 * i as f32).sum::<f32>();
            Complex32::new((0.37 * t).sin(), (0.23 * t).cos())
        })
    }

    #[test]
    fn unpooled_layer_splits_out_features_over_orientations() {
        let layer = IGConvCmplx::new("ig", IGConvConfig::new(3, 8, 3).with_no_g(4).with_seed(1)).unwrap();
        assert_eq!(layer.weight().unwrap().shape(), &[2, 3, 3, 3]);
        assert_eq!(layer.enhanced_weight().unwrap().shape(), &[8, 3, 3, 3]);
        let y = layer.forward(&ramp(&[2, 3, 7, 7])).unwrap();
        assert_eq!(y.shape(), &[2, 8, 5, 5]);
        assert!(layer.last_orientation_indices().is_none());
    }

    #[test]
    fn pooled_layer_keeps_out_features() {
        let config = IGConvConfig::new(2, 5, 3)
            .with_no_g(3)
            .with_gabor_pooling(GaborPooling::Mag)
            .with_conv(ConvParams::default().with_padding(1))
            .with_seed(2);
        let layer = IGConvCmplx::new("ig", config).unwrap();
        assert_eq!(layer.enhanced_weight().unwrap().shape(), &[15, 2, 3, 3]);
        let y = layer.forward(&ramp(&[1, 2, 6, 6])).unwrap();
        assert_eq!(y.shape(), &[1, 5, 6, 6]);
        let indices = layer.last_orientation_indices().unwrap();
        assert_eq!(indices.shape(), &[2, 1, 5, 6, 6]);
        assert!(indices.iter().all(|&g| g < 3));
    }

    #[test]
    fn indivisible_out_features_are_rejected_without_pooling() {
        let err = IGConvCmplx::new("ig", IGConvConfig::new(1, 10, 3).with_no_g(4)).unwrap_err();
        assert!(matches!(err, TensorError::Configuration { .. }));
        assert!(IGConvCmplx::new("ig", IGConvConfig::new(1, 12, 3).with_no_g(4)).is_ok());
        let pooled = IGConvConfig::new(1, 10, 3).with_no_g(4).with_gabor_pooling(GaborPooling::Avg);
        assert!(IGConvCmplx::new("ig", pooled).is_ok());
    }

    #[test]
    fn gradient_step_invalidates_the_filter_bank() {
        let mut layer = IGConvCmplx::new("ig", IGConvConfig::new(1, 2, 3).with_seed(4)).unwrap();
        assert_eq!(layer.filter_state(), FilterCacheState::Stale);
        layer.forward(&ramp(&[1, 1, 4, 4])).unwrap();
        assert_eq!(layer.filter_state(), FilterCacheState::Valid);
        layer.apply_step(0.1).unwrap();
        assert_eq!(layer.filter_state(), FilterCacheState::Stale);
    }

    #[test]
    fn state_dict_carries_weights_gabor_aliases_and_filters() {
        let layer = IGConvCmplx::new("conv1", IGConvConfig::new(1, 4, 3).with_no_g(4).with_seed(6)).unwrap();
        let state = layer.state_dict().unwrap();
        for key in [
            "conv1.ReConv.weight",
            "conv1.ImConv.weight",
            "conv1.gabor.gabor_params",
            "conv1.gabor.gabor",
            "conv1.gabor.gabor_filters",
        ] {
            assert!(state.contains_key(key), "missing {key}");
        }
        assert_eq!(state["conv1.gabor.gabor_filters"].shape(), &[2, 4, 1, 1, 3, 3]);
        assert_eq!(layer.num_parameters().unwrap(), 2 * 9 + 8);
    }

    #[test]
    fn clones_own_their_filter_cache() {
        let layer = IGConvCmplx::new("ig", IGConvConfig::new(1, 4, 3).with_no_g(2).with_seed(8)).unwrap();
        let x = ramp(&[1, 1, 5, 5]);
        let y = layer.forward(&x).unwrap();
        let copy = layer.clone();
        layer.invalidate();
        assert_eq!(layer.filter_state(), FilterCacheState::Stale);
        assert_eq!(copy.filter_state(), FilterCacheState::Valid);
        assert_eq!(copy.forward(&x).unwrap(), y);
        assert_eq!(copy.gabor().generations(), 1);
    }

    #[test]
    fn editing_gabor_params_through_the_layer_refreshes_filters() {
        let mut layer = IGConvCmplx::new("ig", IGConvConfig::new(1, 2, 3).with_seed(9)).unwrap();
        let x = ramp(&[1, 1, 4, 4]);
        let y = layer.forward(&x).unwrap();
        layer.gabor_mut().params_mut().value_mut()[[0, 0]] += 0.7;
        assert_eq!(layer.filter_state(), FilterCacheState::Stale);
        assert_ne!(layer.forward(&x).unwrap(), y);
    }
}
