//! Tensor Operations for Recurrent Networks
//!
//! A minimal row-major tensor used as the execution runtime for the
//! character model. Every tensor the recurrent stack touches is 2D:
//! `[batch, features]` per time step, `[rows, vocab]` for logits and
//! `[in, out]` for weight matrices, so only 2D operations are provided.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, cell_size]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! ## Example
//!
//! ```rust
//! use yorick::Tensor;
//!
//! let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let w = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let y = x.matmul(&w);
//! assert_eq!(y.shape, vec![2, 2]);
//! assert_eq!(y.data, vec![4.0, 5.0, 10.0, 11.0]);
//! ```
//!
//! ## Performance
//!
//! Matrix multiplication switches to a parallel cache-blocked kernel once
//! the product exceeds ~1K multiply-adds; element-wise maps and the row
//! softmax run through Rayon.

use rayon::prelude::*;

#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    ///
    /// ```rust
    /// # use yorick::Tensor;
    /// let tensor = Tensor::zeros(vec![3, 4]);
    /// assert_eq!(tensor.data.len(), 12);
    /// assert!(tensor.data.iter().all(|&x| x == 0.0));
    /// ```
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    /// Borrow row `i` of a 2D tensor
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }

    /// Copy a column range `[start, end)` of a 2D tensor into a new tensor
    ///
    /// Used to split fused LSTM gate pre-activations into per-gate blocks.
    pub fn columns(&self, start: usize, end: usize) -> Tensor {
        let rows = self.rows();
        let width = end - start;
        let mut result = Vec::with_capacity(rows * width);
        for i in 0..rows {
            result.extend_from_slice(&self.row(i)[start..end]);
        }
        Tensor::new(result, vec![rows, width])
    }

    /// Concatenate 2D tensors with equal row counts along the column axis
    pub fn concat_columns(parts: &[&Tensor]) -> Tensor {
        let rows = parts[0].rows();
        let width: usize = parts.iter().map(|p| p.cols()).sum();
        let mut result = Vec::with_capacity(rows * width);
        for i in 0..rows {
            for part in parts {
                assert_eq!(part.rows(), rows, "Row counts must match for concat");
                result.extend_from_slice(part.row(i));
            }
        }
        Tensor::new(result, vec![rows, width])
    }

    #[inline(always)]
    fn matmul_inner_simd(a_val: f32, b: &[f32], result: &mut [f32]) {
        // Simple loop that LLVM can auto-vectorize
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// 2D matrix multiplication: `[m, k] @ [k, n] -> [m, n]`
    ///
    /// # Panics
    ///
    /// Panics if either operand is not 2D or the inner dimensions differ
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert!(
            self.shape.len() == 2 && other.shape.len() == 2,
            "Unsupported matmul shapes: {:?} @ {:?}",
            self.shape,
            other.shape
        );
        assert_eq!(
            self.shape[1], other.shape[0],
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            self.shape[0], self.shape[1], other.shape[0], other.shape[1]
        );

        let m = self.shape[0];
        let n = other.shape[1];
        let k = self.shape[1];

        if m * n * k >= 1_000 {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a_val = self.data[i * k + l];
                Self::matmul_inner_simd(
                    a_val,
                    &other.data[l * n..(l + 1) * n],
                    &mut result[i * n..(i + 1) * n],
                );
            }
        }

        Tensor::new(result, vec![m, n])
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Row blocks of 8 are distributed across threads; within a block the
    /// column and inner dimensions are tiled 8×8 so the working set stays in L1.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                let a_val = self.data[i * k + k_idx];
                                Self::matmul_inner_simd(
                                    a_val,
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Softmax over the last axis of a 2D tensor, one row per prediction
    ///
    /// Uses the max-subtraction form so large logits never overflow `exp`.
    ///
    /// ```rust
    /// # use yorick::Tensor;
    /// let probs = Tensor::new(vec![1.0, 2.0, 3.0], vec![1, 3]).softmax_rows();
    /// let total: f32 = probs.data.iter().sum();
    /// assert!((total - 1.0).abs() < 1e-6);
    /// ```
    pub fn softmax_rows(&self) -> Tensor {
        let cols = self.cols();
        let result: Vec<f32> = self
            .data
            .par_chunks(cols)
            .flat_map_iter(|row| {
                let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                let exp_values: Vec<f32> = row.iter().map(|&x| (x - max).exp()).collect();
                let sum: f32 = exp_values.iter().sum();
                exp_values.into_iter().map(move |val| val / sum)
            })
            .collect();

        Tensor::new(result, self.shape.clone())
    }

    /// Index of the largest element in each row (first one wins on ties)
    pub fn argmax_rows(&self) -> Vec<usize> {
        self.data
            .chunks(self.cols())
            .map(|row| {
                let mut best = 0;
                for (j, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }

    /// Element-wise addition; `[rows, n] + [n]` broadcasts a bias vector
    pub fn add(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        if self.shape.len() > other.shape.len() {
            let last_dim = *self.shape.last().unwrap_or(&0);
            if other.data.len() == last_dim {
                let result: Vec<f32> = (0..self.data.len())
                    .into_par_iter()
                    .map(|i| self.data[i] + other.data[i % last_dim])
                    .collect();
                return Tensor::new(result, self.shape.clone());
            }
        }

        panic!(
            "Unsupported broadcast for add: {:?} + {:?}",
            self.shape, other.shape
        );
    }

    /// In-place accumulation, used to sum gradients across time steps
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(self.shape, other.shape, "Shapes must match for add_assign");
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Element-wise multiplication (shapes must match)
    pub fn mul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.shape, other.shape, "Shapes must match for mul");
        let result = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a * b)
            .collect();
        Tensor::new(result, self.shape.clone())
    }

    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        self.map(|x| x * scalar)
    }

    /// Apply `f` to every element
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Column sums of a 2D tensor (`[rows, n] -> [n]`), the bias gradient
    pub fn sum_rows(&self) -> Tensor {
        let cols = self.cols();
        let mut result = vec![0.0; cols];
        for row in self.data.chunks(cols) {
            for (acc, &v) in result.iter_mut().zip(row) {
                *acc += v;
            }
        }
        Tensor::new(result, vec![cols])
    }

    /// Swap the two axes of a 2D tensor
    ///
    /// ```rust
    /// # use yorick::Tensor;
    /// let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    /// let tt = t.transpose();
    /// assert_eq!(tt.shape, vec![3, 2]);
    /// assert_eq!(tt.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn transpose(&self) -> Tensor {
        let rows = self.rows();
        let cols = self.cols();
        let mut result = vec![0.0; rows * cols];

        for i in 0..rows {
            for j in 0..cols {
                result[j * rows + i] = self.data[i * cols + j];
            }
        }

        Tensor::new(result, vec![cols, rows])
    }

    /// Sum of squared elements, the building block of the global grad norm
    ///
    /// Sequential: a fixed summation order keeps equal-seed runs bit-identical.
    pub fn sum_squares(&self) -> f32 {
        self.data.iter().map(|&v| v * v).sum()
    }
}
