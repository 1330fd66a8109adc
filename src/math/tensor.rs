use rand::prelude::*;
use serde::{Serialize, Deserialize};

use crate::error::{LossError, Result};

/// Dense row-major array with an explicit shape.
///
/// The last axis is the "class" (or feature) axis; every axis before it is a
/// batch axis.  Losses therefore walk a tensor as `rows()` rows of `cols()`
/// values each, no matter how many leading dimensions there are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor<T>", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Tensor<T = f64> {
    shape: Vec<usize>,
    data: Vec<T>,
}

/// Unchecked wire form; every deserialized tensor goes through `Tensor::new`.
#[derive(Deserialize)]
struct RawTensor<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> TryFrom<RawTensor<T>> for Tensor<T> {
    type Error = LossError;

    fn try_from(raw: RawTensor<T>) -> Result<Tensor<T>> {
        Tensor::new(raw.shape, raw.data)
    }
}

/// Integer tensor used for class-index targets.
pub type IndexTensor = Tensor<i64>;

impl<T> Tensor<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Tensor<T>> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(LossError::shape("Tensor::new", &[expected], &[data.len()]));
        }
        Ok(Tensor { shape, data })
    }

    /// One-dimensional tensor of length `data.len()`.
    pub fn from_vec(data: Vec<T>) -> Tensor<T> {
        Tensor { shape: vec![data.len()], data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the last axis (1 for a rank-0 tensor).
    pub fn cols(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Number of last-axis rows, i.e. the product of every leading dimension.
    pub fn rows(&self) -> usize {
        self.leading_shape().iter().product()
    }

    pub fn leading_shape(&self) -> &[usize] {
        match self.shape.split_last() {
            Some((_, leading)) => leading,
            None => &[],
        }
    }

    pub fn row(&self, i: usize) -> &[T] {
        let c = self.cols();
        &self.data[i * c..(i + 1) * c]
    }

    /// Iterates rows along the last axis.  Yields nothing when the last axis is empty.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> {
        let c = self.cols().max(1);
        let n = if self.cols() == 0 { 0 } else { self.rows() };
        self.data.chunks(c).take(n)
    }
}

impl<T: Clone> Tensor<T> {
    /// Builds a 2-D tensor from nested rows; ragged input is rejected.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Tensor<T>> {
        let n = rows.len();
        let c = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != c) {
            return Err(LossError::shape("Tensor::from_rows", &[c], &[bad.len()]));
        }
        let data = rows.into_iter().flatten().collect();
        Ok(Tensor { shape: vec![n, c], data })
    }

    /// Selects whole rows (last-axis slices) by index into a new `[k, cols]` tensor.
    /// Indices must be below `rows()`.
    pub(crate) fn select_rows(&self, indices: &[usize]) -> Tensor<T> {
        let c = self.cols();
        let mut data = Vec::with_capacity(indices.len() * c);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Tensor { shape: vec![indices.len(), c], data }
    }

    /// Contiguous row range `[start, end)` as a `[end - start, cols]` tensor.
    /// Requires `start <= end <= rows()`.
    pub(crate) fn slice_rows(&self, start: usize, end: usize) -> Tensor<T> {
        let c = self.cols();
        Tensor {
            shape: vec![end - start, c],
            data: self.data[start * c..end * c].to_vec(),
        }
    }
}

impl Tensor<f64> {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// Rank-0 tensor holding a single value.
    pub fn scalar(value: f64) -> Tensor {
        Tensor { shape: vec![], data: vec![value] }
    }

    /// Uniform samples in [-1, 1).
    pub fn random<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Tensor {
        let mut res = Tensor::zeros(shape);
        for x in res.data.iter_mut() {
            *x = rng.gen::<f64>() * 2.0 - 1.0;
        }
        res
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// The single value of a one-element tensor.
    pub fn item(&self) -> Option<f64> {
        match self.data.as_slice() {
            [x] => Some(*x),
            _ => None,
        }
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let c = self.cols();
        &mut self.data[i * c..(i + 1) * c]
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Default for Tensor<f64> {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}
