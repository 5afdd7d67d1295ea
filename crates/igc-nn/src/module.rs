// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{ComplexTensor, PureResult, TensorError};
use ndarray::ArrayD;
use std::collections::HashMap;

/// Flat name → array mapping used for checkpoints.
pub type StateDict = HashMap<String, ArrayD<f32>>;

/// Named real array that receives host-computed gradients.
///
/// Frozen parameters are registered (they show up in state dicts and visits)
/// but ignore gradient updates.
#[derive(Clone)]
pub struct Parameter {
    name: String,
    aliases: Vec<String>,
    value: ArrayD<f32>,
    gradient: Option<ArrayD<f32>>,
    trainable: bool,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Parameter(name={},shape={:?},trainable={},has_grad={})",
            self.name,
            self.value.shape(),
            self.trainable,
            self.gradient.is_some()
        )
    }
}

impl Parameter {
    /// Creates a trainable parameter with the provided value.
    pub fn new(name: impl Into<String>, value: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            value,
            gradient: None,
            trainable: true,
        }
    }

    /// Creates a registered parameter that [`Parameter::apply_step`] never moves.
    pub fn frozen(name: impl Into<String>, value: ArrayD<f32>) -> Self {
        Self {
            trainable: false,
            ..Self::new(name, value)
        }
    }

    /// Adds a secondary key under which the parameter is persisted and that is
    /// accepted when loading.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.value
    }

    pub fn gradient(&self) -> Option<&ArrayD<f32>> {
        self.gradient.as_ref()
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    fn assert_shape(&self, other: &ArrayD<f32>) -> PureResult<()> {
        if self.value.shape() != other.shape() {
            return Err(TensorError::shape_mismatch(self.value.shape(), other.shape()));
        }
        Ok(())
    }

    /// Adds `update` to the local gradient buffer.
    pub fn accumulate(&mut self, update: &ArrayD<f32>) -> PureResult<()> {
        self.assert_shape(update)?;
        if !self.trainable {
            tracing::trace!(name = %self.name, "ignoring gradient for frozen parameter");
            return Ok(());
        }
        match self.gradient.as_mut() {
            Some(existing) => *existing += update,
            None => self.gradient = Some(update.clone()),
        }
        Ok(())
    }

    pub fn zero_gradient(&mut self) {
        if let Some(grad) = self.gradient.as_mut() {
            grad.fill(0.0);
        }
    }

    /// Plain gradient descent step; clears the buffer afterwards.
    pub fn apply_step(&mut self, learning_rate: f32) -> PureResult<()> {
        if !learning_rate.is_finite() {
            return Err(TensorError::InvalidScalar {
                label: "learning_rate",
                value: learning_rate,
            });
        }
        if !self.trainable {
            return Ok(());
        }
        if let Some(grad) = self.gradient.as_mut() {
            self.value.scaled_add(-learning_rate, grad);
            grad.fill(0.0);
        }
        Ok(())
    }

    /// Replaces the value, keeping the shape.
    pub fn load_value(&mut self, value: &ArrayD<f32>) -> PureResult<()> {
        self.assert_shape(value)?;
        self.value.assign(value);
        Ok(())
    }

    /// Looks the parameter up in `state` under its name, then its aliases.
    fn find_in<'a>(&self, state: &'a StateDict) -> Option<&'a ArrayD<f32>> {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .find_map(|key| state.get(key))
    }
}

/// Layer interface over complex feature maps.
///
/// `forward` borrows the module immutably; layers with derived caches keep
/// them behind interior mutability and drop them in
/// [`Module::on_gradient_computed`].
pub trait Module {
    /// Runs a forward pass.
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor>;

    /// Visits immutable parameters.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Visits mutable parameters.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Visits derived, non-trainable tensors that are persisted alongside
    /// parameters.
    fn visit_buffers(
        &self,
        _visitor: &mut dyn FnMut(&str, &ArrayD<f32>) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }

    /// Restores buffers from a state dictionary. Missing buffers are not an
    /// error since they are recomputed on demand.
    fn load_buffers(&mut self, _state: &StateDict) -> PureResult<()> {
        Ok(())
    }

    /// Signals that this module's parameters just received a gradient update.
    fn on_gradient_computed(&self) {}

    /// Applies every parameter update, then invalidates derived caches.
    fn apply_step(&mut self, learning_rate: f32) -> PureResult<()> {
        self.visit_parameters_mut(&mut |param| param.apply_step(learning_rate))?;
        self.on_gradient_computed();
        Ok(())
    }

    /// Clears accumulators across every parameter.
    fn zero_accumulators(&mut self) -> PureResult<()> {
        self.visit_parameters_mut(&mut |param| {
            param.zero_gradient();
            Ok(())
        })
    }

    /// Number of scalar entries over all parameters.
    fn num_parameters(&self) -> PureResult<usize> {
        let mut total = 0;
        self.visit_parameters(&mut |param| {
            total += param.value().len();
            Ok(())
        })?;
        Ok(total)
    }

    /// Captures every parameter (under its name and aliases) and buffer.
    fn state_dict(&self) -> PureResult<StateDict> {
        let mut state = HashMap::new();
        self.visit_parameters(&mut |param| {
            for key in std::iter::once(param.name()).chain(param.aliases().iter().map(String::as_str)) {
                state.insert(key.to_string(), param.value().clone());
            }
            Ok(())
        })?;
        self.visit_buffers(&mut |name, buffer| {
            state.insert(name.to_string(), buffer.clone());
            Ok(())
        })?;
        Ok(state)
    }

    /// Restores parameters and buffers from a state dictionary produced by
    /// [`Module::state_dict`]. Unknown keys are ignored. Every parameter is
    /// checked before any is written, so a missing or misshapen entry leaves
    /// the module untouched.
    fn load_state_dict(&mut self, state: &StateDict) -> PureResult<()> {
        self.visit_parameters(&mut |param| {
            let Some(value) = param.find_in(state) else {
                return Err(TensorError::MissingParameter {
                    name: param.name().to_string(),
                });
            };
            param.assert_shape(value)
        })?;
        let loaded = self.visit_parameters_mut(&mut |param| match param.find_in(state) {
            Some(value) => param.load_value(value),
            None => Ok(()),
        });
        let loaded = loaded.and_then(|()| self.load_buffers(state));
        self.on_gradient_computed();
        loaded
    }
}
