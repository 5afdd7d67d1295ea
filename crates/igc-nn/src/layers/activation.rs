// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{ComplexTensor, PureResult, TensorError};
use igc_tensor::{relu_c, relu_mod, relu_z, DEFAULT_EPS};
use ndarray::{ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Complex ReLU flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReluKind {
    /// Rectify real and imaginary parts independently.
    C,
    /// Keep values whose parts are both positive.
    Z,
    /// Shift the modulus by a per-channel bias, keep the phase.
    Mod,
}

type ReluFn = fn(&ReLUCmplx, &ComplexTensor) -> PureResult<ComplexTensor>;

fn apply_c(_: &ReLUCmplx, x: &ComplexTensor) -> PureResult<ComplexTensor> {
    relu_c(x)
}

fn apply_z(_: &ReLUCmplx, x: &ComplexTensor) -> PureResult<ComplexTensor> {
    relu_z(x)
}

fn apply_mod(layer: &ReLUCmplx, x: &ComplexTensor) -> PureResult<ComplexTensor> {
    let bias = layer.bias.as_ref().ok_or_else(|| {
        TensorError::configuration("modulus relu is missing its bias")
    })?;
    relu_mod(x, bias.value(), DEFAULT_EPS)
}

/// Complex ReLU layer. The modulus variant owns a frozen per-channel bias
/// `<name>.b` of shape `[channels, 1, 1]`, drawn from `[-2/√channels, 0)`.
#[derive(Clone)]
pub struct ReLUCmplx {
    kind: ReluKind,
    bias: Option<Parameter>,
    apply: ReluFn,
}

impl core::fmt::Debug for ReLUCmplx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.bias {
            Some(bias) => write!(f, "ReLUCmplx(kind={:?},bias={:?})", self.kind, bias),
            None => write!(f, "ReLUCmplx(kind={:?})", self.kind),
        }
    }
}

impl ReLUCmplx {
    pub fn new(name: &str, kind: ReluKind, channels: Option<usize>, seed: Option<u64>) -> PureResult<Self> {
        let (bias, apply): (Option<Parameter>, ReluFn) = match kind {
            ReluKind::C => (None, apply_c),
            ReluKind::Z => (None, apply_z),
            ReluKind::Mod => {
                let channels = channels.filter(|&c| c > 0).ok_or_else(|| {
                    TensorError::configuration("the modulus relu requires a positive `channels` count")
                })?;
                let mut rng = igc_config::rng_from_optional(seed, &format!("igc-nn/relu/{name}"));
                let low = -2.0 / (channels as f32).sqrt();
                let dist = Uniform::new(low, 0.0);
                let values: Vec<f32> = (0..channels).map(|_| dist.sample(&mut rng)).collect();
                let value = ArrayD::from_shape_vec(IxDyn(&[channels, 1, 1]), values)?;
                (Some(Parameter::frozen(format!("{name}.b"), value)), apply_mod)
            }
        };
        Ok(Self { kind, bias, apply })
    }

    pub fn kind(&self) -> ReluKind {
        self.kind
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }
}

impl Module for ReLUCmplx {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        (self.apply)(self, input)
    }

    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>) -> PureResult<()> {
        match &self.bias {
            Some(bias) => visitor(bias),
            None => Ok(()),
        }
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        match &mut self.bias {
            Some(bias) => visitor(bias),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    #[test]
    fn modulus_relu_needs_channels() {
        let err = ReLUCmplx::new("act", ReluKind::Mod, None, None).unwrap_err();
        assert!(matches!(err, TensorError::Configuration { .. }));
        assert!(ReLUCmplx::new("act", ReluKind::Mod, Some(0), None).is_err());
        assert!(ReLUCmplx::new("act", ReluKind::C, None, None).is_ok());
    }

    #[test]
    fn modulus_bias_is_frozen_and_in_range() {
        let mut act = ReLUCmplx::new("act", ReluKind::Mod, Some(4), Some(11)).unwrap();
        let bias = act.bias().unwrap().value().clone();
        assert_eq!(bias.shape(), &[4, 1, 1]);
        assert!(bias.iter().all(|&b| (-1.0..=0.0).contains(&b)));
        act.visit_parameters_mut(&mut |p| p.accumulate(&ArrayD::ones(IxDyn(&[4, 1, 1]))))
            .unwrap();
        act.apply_step(1.0).unwrap();
        assert_eq!(act.bias().unwrap().value(), &bias);
        assert!(act.state_dict().unwrap().contains_key("act.b"));
    }

    #[test]
    fn variants_dispatch_to_their_kernels() {
        let x = ComplexTensor::from_fn(&[1, 2, 1, 2], |idx| {
            if idx[3] == 0 {
                Complex32::new(3.0, 4.0)
            } else {
                Complex32::new(-1.0, 2.0)
            }
        });
        let c = ReLUCmplx::new("a", ReluKind::C, None, None).unwrap().forward(&x).unwrap();
        assert_eq!(c.get(&[0, 1, 0, 1]), Some(Complex32::new(0.0, 2.0)));
        let z = ReLUCmplx::new("a", ReluKind::Z, None, None).unwrap().forward(&x).unwrap();
        assert_eq!(z.get(&[0, 1, 0, 1]), Some(Complex32::new(0.0, 0.0)));
        assert_eq!(z.get(&[0, 0, 0, 0]), Some(Complex32::new(3.0, 4.0)));
        let m = ReLUCmplx::new("a", ReluKind::Mod, Some(2), Some(1)).unwrap().forward(&x).unwrap();
        let out = m.get(&[0, 0, 0, 0]).unwrap();
        assert!(out.norm() <= 5.0 + 1e-4 && out.norm() > 5.0 - 2.0 / 2.0f32.sqrt() - 1e-4);
        assert!((out.arg() - Complex32::new(3.0, 4.0).arg()).abs() < 1e-4);
    }

    #[test]
    fn clone_carries_an_independent_bias() {
        let act = ReLUCmplx::new("act", ReluKind::Mod, Some(2), Some(4)).unwrap();
        let mut copy = act.clone();
        copy.visit_parameters_mut(&mut |p| p.load_value(&ArrayD::zeros(IxDyn(&[2, 1, 1]))))
            .unwrap();
        assert!(act.bias().unwrap().value().iter().all(|&b| b < 0.0));
        assert!(copy.bias().unwrap().value().iter().all(|&b| b == 0.0));
        assert_eq!(copy.kind(), ReluKind::Mod);
    }
}
