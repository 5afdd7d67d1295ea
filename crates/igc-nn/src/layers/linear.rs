// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::conv::init_complex_weight;
use crate::module::{Module, Parameter};
use crate::{ComplexTensor, PureResult};
use igc_tensor::complex_linear;
use igc_tensor::error::validate_positive;
use igc_tensor::init::{uniform_weights, InitMode};

/// Complex dense layer over the trailing axis.
///
/// The optional bias is subtracted from the product.
#[derive(Clone, Debug)]
pub struct LinearCmplx {
    name: String,
    re_weight: Parameter,
    im_weight: Parameter,
    bias: Option<(Parameter, Parameter)>,
}

impl LinearCmplx {
    pub fn new(
        name: impl Into<String>,
        in_features: usize,
        out_features: usize,
        bias: bool,
        weight_init: Option<InitMode>,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let name = name.into();
        validate_positive(in_features, "in_features")?;
        validate_positive(out_features, "out_features")?;
        let mut rng = igc_config::rng_from_optional(seed, &format!("igc-nn/linear/{name}"));
        let weight = init_complex_weight(&[out_features, in_features], weight_init, &mut rng)?;
        let bias = if bias {
            let b = uniform_weights(&[out_features], 1.0 / (in_features as f32).sqrt(), &mut rng)?;
            Some((
                Parameter::new(format!("{name}.ReLinear.bias"), b.re().to_owned()),
                Parameter::new(format!("{name}.ImLinear.bias"), b.im().to_owned()),
            ))
        } else {
            None
        };
        Ok(Self {
            re_weight: Parameter::new(format!("{name}.ReLinear.weight"), weight.re().to_owned()),
            im_weight: Parameter::new(format!("{name}.ImLinear.weight"), weight.im().to_owned()),
            bias,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> PureResult<ComplexTensor> {
        ComplexTensor::from_parts(self.re_weight.value().clone(), self.im_weight.value().clone())
    }

    pub fn bias(&self) -> PureResult<Option<ComplexTensor>> {
        self.bias
            .as_ref()
            .map(|(re, im)| ComplexTensor::from_parts(re.value().clone(), im.value().clone()))
            .transpose()
    }
}

impl Module for LinearCmplx {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        let bias = self.bias()?;
        complex_linear(input, &self.weight()?, bias.as_ref())
    }

    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>) -> PureResult<()> {
        visitor(&self.re_weight)?;
        visitor(&self.im_weight)?;
        if let Some((re, im)) = &self.bias {
            visitor(re)?;
            visitor(im)?;
        }
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.re_weight)?;
        visitor(&mut self.im_weight)?;
        if let Some((re, im)) = &mut self.bias {
            visitor(re)?;
            visitor(im)?;
        }
        Ok(())
    }
}
