// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{expect_rank, PureResult, TensorError};
use ndarray::{concatenate, stack, ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Zip};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Default clamp applied under square roots and divisions.
pub const DEFAULT_EPS: f32 = 1e-8;

/// Complex tensor whose real and imaginary parts are stacked on a leading axis
/// of size two.
///
/// Shapes reported by [`ComplexTensor::shape`] are *component* shapes, i.e.
/// the shape of either part without the leading axis.
///
/// Serialises as the stacked array; deserialising goes through
/// [`ComplexTensor::from_stacked`] so a missing leading axis is rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArrayD<f32>", into = "ArrayD<f32>")]
pub struct ComplexTensor {
    data: ArrayD<f32>,
}

impl TryFrom<ArrayD<f32>> for ComplexTensor {
    type Error = TensorError;

    fn try_from(data: ArrayD<f32>) -> PureResult<Self> {
        Self::from_stacked(data)
    }
}

impl From<ComplexTensor> for ArrayD<f32> {
    fn from(tensor: ComplexTensor) -> Self {
        tensor.into_stacked()
    }
}

impl ComplexTensor {
    /// Stacks equally shaped real and imaginary parts.
    pub fn from_parts(real: ArrayD<f32>, imag: ArrayD<f32>) -> PureResult<Self> {
        if real.shape() != imag.shape() {
            return Err(TensorError::shape_mismatch(real.shape(), imag.shape()));
        }
        let data = stack(Axis(0), &[real.view(), imag.view()])?;
        Ok(Self { data })
    }

    /// Builds a trivial complex tensor with a zero imaginary part.
    pub fn from_real(real: ArrayD<f32>) -> PureResult<Self> {
        let imag = ArrayD::zeros(real.raw_dim());
        Self::from_parts(real, imag)
    }

    /// Wraps an array that already carries the `[2, ...]` layout.
    pub fn from_stacked(data: ArrayD<f32>) -> PureResult<Self> {
        match data.shape().first() {
            Some(2) => Ok(Self { data }),
            _ => Err(TensorError::InvalidValue {
                label: "complex_leading_axis",
            }),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let mut full = Vec::with_capacity(shape.len() + 1);
        full.push(2);
        full.extend_from_slice(shape);
        Self {
            data: ArrayD::zeros(IxDyn(&full)),
        }
    }

    /// Builds a tensor by evaluating `f` at every component index.
    pub fn from_fn(shape: &[usize], mut f: impl FnMut(&[usize]) -> Complex32) -> Self {
        let mut out = Self::zeros(shape);
        {
            let (real, imag) = out.data.view_mut().split_at(Axis(0), 1);
            let mut real = real.index_axis_move(Axis(0), 0);
            let mut imag = imag.index_axis_move(Axis(0), 0);
            real.indexed_iter_mut()
                .zip(imag.iter_mut())
                .for_each(|((index, re), im)| {
                    let value = f(index.slice());
                    *re = value.re;
                    *im = value.im;
                });
        }
        out
    }

    /// Component shape (excluding the leading real/imaginary axis).
    pub fn shape(&self) -> &[usize] {
        &self.data.shape()[1..]
    }

    /// Component rank.
    pub fn ndim(&self) -> usize {
        self.data.ndim() - 1
    }

    pub fn len(&self) -> usize {
        self.data.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn re(&self) -> ArrayViewD<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }

    pub fn im(&self) -> ArrayViewD<'_, f32> {
        self.data.index_axis(Axis(0), 1)
    }

    pub fn parts(&self) -> (ArrayViewD<'_, f32>, ArrayViewD<'_, f32>) {
        (self.re(), self.im())
    }

    /// The stacked `[2, ...]` representation.
    pub fn stacked(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn into_stacked(self) -> ArrayD<f32> {
        self.data
    }

    /// Reads a single complex element at a component index.
    pub fn get(&self, index: &[usize]) -> Option<Complex32> {
        let re = self.re().get(IxDyn(index)).copied()?;
        let im = self.im().get(IxDyn(index)).copied()?;
        Some(Complex32::new(re, im))
    }

    /// Applies the same real operator to both components.
    pub fn map_parts(
        &self,
        mut f: impl FnMut(ArrayViewD<'_, f32>) -> PureResult<ArrayD<f32>>,
    ) -> PureResult<Self> {
        let real = f(self.re())?;
        let imag = f(self.im())?;
        Self::from_parts(real, imag)
    }

    /// Applies a scalar complex function elementwise.
    pub fn map_elements(&self, f: impl Fn(Complex32) -> Complex32) -> Self {
        let mut out = Self::zeros(self.shape());
        {
            let (re, im) = self.parts();
            let (real, imag) = out.data.view_mut().split_at(Axis(0), 1);
            let mut real = real.index_axis_move(Axis(0), 0);
            let mut imag = imag.index_axis_move(Axis(0), 0);
            Zip::from(&mut real)
                .and(&mut imag)
                .and(&re)
                .and(&im)
                .for_each(|out_re, out_im, &a, &b| {
                    let value = f(Complex32::new(a, b));
                    *out_re = value.re;
                    *out_im = value.im;
                });
        }
        out
    }

    /// `re² + im²` without clamping.
    pub fn magnitude_sq(&self) -> ArrayD<f32> {
        let (re, im) = self.parts();
        Zip::from(&re).and(&im).map_collect(|&a, &b| a * a + b * b)
    }

    /// `sqrt(max(re² + im², eps))`.
    ///
    /// The clamp keeps the gradient of the square root finite at the origin,
    /// so zero inputs report `sqrt(eps)` rather than zero.
    pub fn magnitude(&self, eps: f32) -> ArrayD<f32> {
        let (re, im) = self.parts();
        Zip::from(&re)
            .and(&im)
            .map_collect(|&a, &b| (a * a + b * b).max(eps).sqrt())
    }

    /// `atan(im / max(re, eps))`.
    pub fn phase(&self, eps: f32) -> ArrayD<f32> {
        let (re, im) = self.parts();
        Zip::from(&re)
            .and(&im)
            .map_collect(|&a, &b| (b / a.max(eps)).atan())
    }

    /// Complex product `(a·c − b·d, a·d + b·c)`.
    ///
    /// `other` may broadcast onto `self` (and vice versa) under the usual
    /// trailing-axis rules; incompatible shapes fail instead of panicking.
    pub fn mul(&self, other: &ComplexTensor) -> PureResult<Self> {
        let shape = broadcast_shape(self.shape(), other.shape())?;
        let dim = IxDyn(&shape);
        let broadcast = |view: ArrayViewD<'_, f32>, left: &[usize]| {
            view.broadcast(dim.clone())
                .ok_or_else(|| TensorError::shape_mismatch(left, &shape))
                .map(|v| v.to_owned())
        };
        let a = broadcast(self.re(), self.shape())?;
        let b = broadcast(self.im(), self.shape())?;
        let c = broadcast(other.re(), other.shape())?;
        let d = broadcast(other.im(), other.shape())?;
        let real = &a * &c - &b * &d;
        let imag = &a * &d + &b * &c;
        Self::from_parts(real, imag)
    }

    /// Left fold of [`ComplexTensor::mul`] over several factors.
    pub fn mul_all(factors: &[&ComplexTensor]) -> PureResult<Self> {
        let (first, rest) = factors.split_first().ok_or(TensorError::InvalidValue {
            label: "complex_product_factors",
        })?;
        rest.iter()
            .try_fold((*first).clone(), |acc, factor| acc.mul(factor))
    }

    /// Complex exponential `e^re · (cos im, sin im)`.
    pub fn exp(&self) -> Self {
        self.map_elements(|z| z.exp())
    }

    pub fn add(&self, other: &ComplexTensor) -> PureResult<Self> {
        self.ensure_same_shape(other)?;
        Ok(Self {
            data: &self.data + &other.data,
        })
    }

    pub fn sub(&self, other: &ComplexTensor) -> PureResult<Self> {
        self.ensure_same_shape(other)?;
        Ok(Self {
            data: &self.data - &other.data,
        })
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self {
            data: &self.data * factor,
        }
    }

    /// Concatenates real and imaginary parts along the channel axis, producing
    /// a real `[batch, 2 * channels, ...]` tensor for purely real heads.
    pub fn concatenate(&self) -> PureResult<ArrayD<f32>> {
        if self.ndim() < 2 {
            return Err(TensorError::InvalidRank {
                label: "complex_concatenate",
                expected: 2,
                got: self.ndim(),
            });
        }
        Ok(concatenate(Axis(1), &[self.re(), self.im()])?)
    }

    /// Softmax of `|x|²` along a component axis.
    pub fn softmax(&self, axis: usize) -> PureResult<ArrayD<f32>> {
        if axis >= self.ndim() {
            return Err(TensorError::InvalidValue {
                label: "softmax_axis",
            });
        }
        let mut energy = self.magnitude_sq();
        for mut lane in energy.lanes_mut(Axis(axis)) {
            let max = lane.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            lane.mapv_inplace(|v| (v - max).exp());
            let total = lane.sum();
            lane.mapv_inplace(|v| v / total);
        }
        Ok(energy)
    }

    /// Reshapes the component shape, keeping the leading real/imaginary axis.
    pub fn reshape(&self, shape: &[usize]) -> PureResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != self.len() {
            return Err(TensorError::DataLength {
                expected,
                got: self.len(),
            });
        }
        let mut full = Vec::with_capacity(shape.len() + 1);
        full.push(2);
        full.extend_from_slice(shape);
        let data = self
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(&full))?;
        Ok(Self { data })
    }

    /// Swaps two component axes and returns a standard-layout copy.
    pub fn swap_axes(&self, a: usize, b: usize) -> PureResult<Self> {
        if a >= self.ndim() || b >= self.ndim() {
            return Err(TensorError::InvalidValue {
                label: "complex_swap_axes",
            });
        }
        let mut view = self.data.view();
        view.swap_axes(a + 1, b + 1);
        Ok(Self {
            data: view.as_standard_layout().into_owned(),
        })
    }

    /// Inserts a singleton component axis.
    pub fn insert_axis(&self, axis: usize) -> PureResult<Self> {
        if axis > self.ndim() {
            return Err(TensorError::InvalidValue {
                label: "complex_insert_axis",
            });
        }
        Ok(Self {
            data: self.data.clone().insert_axis(Axis(axis + 1)),
        })
    }

    /// Requires the component rank to match `expected`.
    pub fn expect_rank(&self, label: &'static str, expected: usize) -> PureResult<()> {
        expect_rank(label, self.shape(), expected)
    }

    fn ensure_same_shape(&self, other: &ComplexTensor) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::shape_mismatch(self.shape(), other.shape()));
        }
        Ok(())
    }
}

/// Shape obtained by broadcasting `left` and `right` from the trailing axis.
pub fn broadcast_shape(left: &[usize], right: &[usize]) -> PureResult<Vec<usize>> {
    let rank = left.len().max(right.len());
    let mut shape = vec![0; rank];
    for axis in 0..rank {
        let l = axis
            .checked_sub(rank - left.len())
            .map(|i| left[i])
            .unwrap_or(1);
        let r = axis
            .checked_sub(rank - right.len())
            .map(|i| right[i])
            .unwrap_or(1);
        shape[axis] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => return Err(TensorError::shape_mismatch(left, right)),
        };
    }
    Ok(shape)
}

/// Creates a trivial complex tensor from a real one.
pub fn new_cmplx(real: ArrayD<f32>) -> PureResult<ComplexTensor> {
    ComplexTensor::from_real(real)
}

/// Complex exponential, used to build complex softmax variants.
pub fn exp_cmplx(x: &ComplexTensor) -> ComplexTensor {
    x.exp()
}
