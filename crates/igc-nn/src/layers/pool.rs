// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{ComplexTensor, PureResult};
use igc_tensor::{compress_shape, max_mag_pool, pool_cmplx, recover_shape, PoolParams, SpatialPool};
use ndarray::ArrayD;
use std::cell::RefCell;

/// Complex max pool.
///
/// With `maxmag` the window winner is picked by magnitude and both parts are
/// read at that location; otherwise each part is pooled on its own.
#[derive(Clone, Debug)]
pub struct MaxPoolCmplx {
    params: PoolParams,
    maxmag: bool,
    last_indices: RefCell<Option<ArrayD<usize>>>,
}

impl MaxPoolCmplx {
    pub fn new(params: PoolParams, maxmag: bool) -> PureResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            maxmag,
            last_indices: RefCell::new(None),
        })
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn is_maxmag(&self) -> bool {
        self.maxmag
    }

    /// Flat `y * w + x` winners of the last magnitude-consistent pass, over
    /// the folded `[batch, channels, oh, ow]` grid.
    pub fn last_indices(&self) -> Option<ArrayD<usize>> {
        self.last_indices.borrow().clone()
    }
}

impl Module for MaxPoolCmplx {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        if !self.maxmag {
            return pool_cmplx(input, SpatialPool::Max, &self.params);
        }
        let (folded, remembered) = compress_shape(input)?;
        let (pooled, indices) = max_mag_pool(&folded, &self.params)?;
        *self.last_indices.borrow_mut() = Some(indices);
        recover_shape(pooled, remembered)
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

/// Complex average pool; padding counts towards the divisor.
#[derive(Clone, Debug)]
pub struct AvgPoolCmplx {
    params: PoolParams,
}

impl AvgPoolCmplx {
    pub fn new(params: PoolParams) -> PureResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl Module for AvgPoolCmplx {
    fn forward(&self, input: &ComplexTensor) -> PureResult<ComplexTensor> {
        pool_cmplx(input, SpatialPool::Avg, &self.params)
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
