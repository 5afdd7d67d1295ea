// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter, StateDict};
use crate::{ComplexTensor, PureResult};
use ndarray::ArrayD;

/// Ordered chain of complex modules.
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Module>>,
}

impl core::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Sequential(num_layers={})", self.layers.len())
    }
}

impl Sequential {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a new layer to the sequence.
    pub fn push<M>(&mut self, layer: M)
    where
        M: Module + 'static,
    {
        self.layers.push(Box::new(layer));
    }

    /// Appends a pre-boxed module to the sequence.
    pub fn push_boxed(&mut self, layer: Box<dyn Module>) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Module for Sequential {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        let mut activ = input.clone();
        for layer in &self.layers {
            activ = layer.forward(&activ)?;
        }
        Ok(activ)
    }

    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>) -> PureResult<()> {
        for layer in &self.layers {
            layer.visit_parameters(visitor)?;
        }
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        for layer in &mut self.layers {
            layer.visit_parameters_mut(visitor)?;
        }
        Ok(())
    }

    fn visit_buffers(
        &self,
        visitor: &mut dyn FnMut(&str, &ArrayD<f32>) -> PureResult<()>,
    ) -> PureResult<()> {
        for layer in &self.layers {
            layer.visit_buffers(visitor)?;
        }
        Ok(())
    }

    fn load_buffers(&mut self, state: &StateDict) -> PureResult<()> {
        for layer in &mut self.layers {
            layer.load_buffers(state)?;
        }
        Ok(())
    }

    fn on_gradient_computed(&self) {
        for layer in &self.layers {
            layer.on_gradient_computed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::activation::{ReLUCmplx, ReluKind};
    use crate::layers::igconv::{IGConvCmplx, IGConvConfig};
    use crate::layers::norm::BatchNormCmplx;
    use crate::layers::pool::MaxPoolCmplx;
    use igc_tensor::{GaborPooling, PoolParams};
    use num_complex::Complex32;

    #[test]
    fn pipeline_runs_and_reloads() {
        let mut seq = Sequential::new();
        let config = IGConvConfig::new(1, 4, 3)
            .with_no_g(2)
            .with_gabor_pooling(GaborPooling::Max)
            .with_seed(21);
        seq.push(IGConvCmplx::new("conv1", config).unwrap());
        seq.push(BatchNormCmplx::default());
        seq.push(ReLUCmplx::new("act1", ReluKind::Mod, Some(4), Some(22)).unwrap());
        seq.push(MaxPoolCmplx::new(PoolParams::new(2), true).unwrap());
        assert_eq!(seq.len(), 4);
        assert!(format!("{seq:?}").contains("num_layers=4"));

        let x = ComplexTensor::from_fn(&[2, 1, 10, 10], |idx| {
            Complex32::new(((idx[2] * 10 + idx[3]) as f32 * 0.3).sin(), 0.0)
        });
        let y = seq.forward(&x).unwrap();
        assert_eq!(y.shape(), &[2, 4, 4, 4]);

        let state = seq.state_dict().unwrap();
        assert!(state.contains_key("conv1.gabor.gabor_filters"));
        assert!(state.contains_key("act1.b"));

        seq.apply_step(0.0).unwrap();
        seq.load_state_dict(&state).unwrap();
        assert_eq!(seq.forward(&x).unwrap(), y);
    }
}
