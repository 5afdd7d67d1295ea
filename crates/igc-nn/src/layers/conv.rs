// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{ComplexTensor, PureResult, TensorError};
use igc_tensor::init::{complex_weights, fan_in_fan_out, uniform_weights, InitMode, InitStorage};
use igc_tensor::error::validate_positive;
use igc_tensor::{complex_conv, ConvParams};
use rand::Rng;

/// Samples a `[out, in, k...]` complex kernel: Rayleigh/uniform-phase for an
/// explicit mode, otherwise independent `±1/√fan_in` draws per part.
pub(crate) fn init_complex_weight<R: Rng + ?Sized>(
    shape: &[usize],
    weight_init: Option<InitMode>,
    rng: &mut R,
) -> PureResult<ComplexTensor> {
    match weight_init {
        Some(mode) => complex_weights(shape, mode, InitStorage::Cartesian, rng),
        None => {
            let (fan_in, _) = fan_in_fan_out(shape)?;
            uniform_weights(shape, 1.0 / (fan_in as f32).sqrt(), rng)
        }
    }
}

/// The `ReConv.weight` / `ImConv.weight` pair shared by the complex
/// convolution layers.
#[derive(Clone, Debug)]
pub(crate) struct ComplexKernel {
    pub(crate) re: Parameter,
    pub(crate) im: Parameter,
}

impl ComplexKernel {
    pub(crate) fn new(name: &str, weight: ComplexTensor) -> Self {
        Self {
            re: Parameter::new(format!("{name}.ReConv.weight"), weight.re().to_owned()),
            im: Parameter::new(format!("{name}.ImConv.weight"), weight.im().to_owned()),
        }
    }

    pub(crate) fn weight(&self) -> PureResult<ComplexTensor> {
        ComplexTensor::from_parts(self.re.value().clone(), self.im.value().clone())
    }

    pub(crate) fn visit(&self, visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>) -> PureResult<()> {
        visitor(&self.re)?;
        visitor(&self.im)
    }

    pub(crate) fn visit_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>) -> PureResult<()> {
        visitor(&mut self.re)?;
        visitor(&mut self.im)
    }
}

/// Options of a plain complex convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvCmplxConfig {
    pub in_features: usize,
    pub out_features: usize,
    pub kernel_size: (usize, usize),
    pub weight_init: Option<InitMode>,
    pub conv: ConvParams,
    /// Runs a transposed convolution; the stored weight keeps its
    /// `[out, in, kh, kw]` layout.
    pub transposed: bool,
    pub seed: Option<u64>,
}

impl ConvCmplxConfig {
    pub fn new(in_features: usize, out_features: usize, kernel_size: usize) -> Self {
        Self {
            in_features,
            out_features,
            kernel_size: (kernel_size, kernel_size),
            weight_init: None,
            conv: ConvParams::default(),
            transposed: false,
            seed: None,
        }
    }

    pub fn with_weight_init(mut self, mode: InitMode) -> Self {
        self.weight_init = Some(mode);
        self
    }

    pub fn with_conv(mut self, conv: ConvParams) -> Self {
        self.conv = conv;
        self
    }

    pub fn transposed(mut self) -> Self {
        self.transposed = true;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Complex convolution without Gabor modulation.
#[derive(Clone, Debug)]
pub struct ConvCmplx {
    name: String,
    config: ConvCmplxConfig,
    kernel: ComplexKernel,
}

impl ConvCmplx {
    pub fn new(name: impl Into<String>, config: ConvCmplxConfig) -> PureResult<Self> {
        let name = name.into();
        validate_positive(config.in_features, "in_features")?;
        validate_positive(config.out_features, "out_features")?;
        validate_positive(config.kernel_size.0, "kernel_h")?;
        validate_positive(config.kernel_size.1, "kernel_w")?;
        config.conv.validate()?;
        let groups = config.conv.groups;
        if config.in_features % groups != 0 || config.out_features % groups != 0 {
            return Err(TensorError::configuration(format!(
                "groups ({groups}) must divide in_features ({}) and out_features ({})",
                config.in_features, config.out_features
            )));
        }
        let (kh, kw) = config.kernel_size;
        let shape = if config.transposed {
            [config.out_features / groups, config.in_features, kh, kw]
        } else {
            [config.out_features, config.in_features / groups, kh, kw]
        };
        let mut rng = igc_config::rng_from_optional(config.seed, &format!("igc-nn/conv/{name}"));
        let weight = init_complex_weight(&shape, config.weight_init, &mut rng)?;
        Ok(Self {
            kernel: ComplexKernel::new(&name, weight),
            name,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ConvCmplxConfig {
        &self.config
    }

    pub fn weight(&self) -> PureResult<ComplexTensor> {
        self.kernel.weight()
    }
}

impl Module for ConvCmplx {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        input.expect_rank("conv_cmplx_input", 4)?;
        complex_conv(input, &self.kernel.weight()?, self.config.transposed, &self.config.conv)
    }

    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>) -> PureResult<()> {
        self.kernel.visit(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.kernel.visit_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_channels_and_keys() {
        let layer = ConvCmplx::new("conv", ConvCmplxConfig::new(2, 3, 3).with_seed(1)).unwrap();
        let x = ComplexTensor::from_fn(&[1, 2, 6, 6], |idx| {
            num_complex::Complex32::new(idx[2] as f32 * 0.1, idx[3] as f32 * -0.2)
        });
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape(), &[1, 3, 4, 4]);
        let state = layer.state_dict().unwrap();
        assert_eq!(state["conv.ReConv.weight"].shape(), &[3, 2, 3, 3]);
        assert!(state.contains_key("conv.ImConv.weight"));
    }

    #[test]
    fn transposed_layer_upsamples() {
        let config = ConvCmplxConfig::new(4, 2, 2)
            .transposed()
            .with_conv(ConvParams::default().with_stride(2))
            .with_weight_init(InitMode::Glorot)
            .with_seed(3);
        let layer = ConvCmplx::new("up", config).unwrap();
        assert_eq!(layer.weight().unwrap().shape(), &[2, 4, 2, 2]);
        let x = ComplexTensor::zeros(&[1, 4, 3, 3]);
        assert_eq!(layer.forward(&x).unwrap().shape(), &[1, 2, 6, 6]);
    }

    #[test]
    fn default_init_is_bounded_by_fan_in() {
        let layer = ConvCmplx::new("c", ConvCmplxConfig::new(4, 4, 3).with_seed(8)).unwrap();
        let bound = 1.0 / 36.0f32.sqrt();
        assert!(layer.weight().unwrap().stacked().iter().all(|v| v.abs() <= bound));
        let bad = ConvCmplxConfig::new(3, 4, 3).with_conv(ConvParams::default().with_groups(2));
        assert!(matches!(ConvCmplx::new("c", bad), Err(TensorError::Configuration { .. })));
    }
}
