//! LSTM Cell
//!
//! One gated recurrent cell, advanced one time step at a time. The stack in
//! [`crate::recurrent`] unrolls these over a window.
//!
//! ## Forward Step
//!
//! ```text
//! z = x @ W_x + h_prev @ W_h + b        [batch, 4 * cell]
//! i = σ(z_i)   input gate
//! f = σ(z_f)   forget gate
//! g = tanh(z_g) candidate
//! o = σ(z_o)   output gate
//! c = f ⊙ c_prev + i ⊙ g                cell memory
//! h = o ⊙ tanh(c)                       hidden output
//! ```
//!
//! Gate blocks are laid out `[i | f | g | o]` along the columns of `W_x`,
//! `W_h` and `b`.
//!
//! ## Backward Step
//!
//! Given `dh` (from the layer above plus the next time step) and `dc` (from
//! the next time step):
//!
//! ```text
//! dc_total = dc + dh ⊙ o ⊙ (1 - tanh²(c))
//! dz_i = dc_total ⊙ g ⊙ i(1 - i)
//! dz_f = dc_total ⊙ c_prev ⊙ f(1 - f)
//! dz_g = dc_total ⊙ i ⊙ (1 - g²)
//! dz_o = dh ⊙ tanh(c) ⊙ o(1 - o)
//! dW_x += x^T @ dz     dW_h += h_prev^T @ dz     db += Σ_rows dz
//! dx = dz @ W_x^T      dh_prev = dz @ W_h^T      dc_prev = dc_total ⊙ f
//! ```
//!
//! ## Initialization
//!
//! - `W_x`: Glorot uniform
//! - `W_h`: orthogonal, one `[cell, cell]` block per gate
//! - `b`: zero, except the forget gate which starts at 1.0 so the cell
//!   initially keeps its memory

use super::init::{orthogonal_init, uniform_init};
use crate::tensor::Tensor;
use rand::Rng;

pub const FORGET_BIAS: f32 = 1.0;

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub struct TrainableLstmCell {
    pub w_input: Tensor,
    pub w_recurrent: Tensor,
    pub bias: Tensor,
    pub cell_size: usize,
}

impl TrainableLstmCell {
    pub fn new(input_size: usize, cell_size: usize, rng: &mut impl Rng) -> Self {
        let gates = 4 * cell_size;
        let limit = (6.0 / (input_size + gates) as f32).sqrt();
        let w_input = Tensor::new(
            uniform_init(input_size * gates, limit, rng),
            vec![input_size, gates],
        );

        let mut w_recurrent = Tensor::zeros(vec![cell_size, gates]);
        for gate in 0..4 {
            let block = orthogonal_init(cell_size, cell_size, rng);
            for r in 0..cell_size {
                let dst = r * gates + gate * cell_size;
                w_recurrent.data[dst..dst + cell_size]
                    .copy_from_slice(&block[r * cell_size..(r + 1) * cell_size]);
            }
        }

        let mut bias = Tensor::zeros(vec![gates]);
        bias.data[cell_size..2 * cell_size].fill(FORGET_BIAS);

        Self {
            w_input,
            w_recurrent,
            bias,
            cell_size,
        }
    }

    /// A cell whose weights and biases are all zero
    pub fn zeroed(input_size: usize, cell_size: usize) -> Self {
        let gates = 4 * cell_size;
        Self {
            w_input: Tensor::zeros(vec![input_size, gates]),
            w_recurrent: Tensor::zeros(vec![cell_size, gates]),
            bias: Tensor::zeros(vec![gates]),
            cell_size,
        }
    }

    pub fn input_size(&self) -> usize {
        self.w_input.rows()
    }

    /// Advance one time step
    ///
    /// Returns `(h, c, cache)`; `h` and `c` are `[batch, cell_size]`.
    pub fn forward(&self, x: &Tensor, h_prev: &Tensor, c_prev: &Tensor) -> (Tensor, Tensor, LstmCache) {
        let h_size = self.cell_size;
        let z = x
            .matmul(&self.w_input)
            .add(&h_prev.matmul(&self.w_recurrent))
            .add(&self.bias);

        let i = z.columns(0, h_size).map(sigmoid);
        let f = z.columns(h_size, 2 * h_size).map(sigmoid);
        let g = z.columns(2 * h_size, 3 * h_size).map(f32::tanh);
        let o = z.columns(3 * h_size, 4 * h_size).map(sigmoid);

        let c = f.mul(c_prev).add(&i.mul(&g));
        let tanh_c = c.map(f32::tanh);
        let h = o.mul(&tanh_c);

        let cache = LstmCache {
            x: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            i,
            f,
            g,
            o,
            tanh_c,
        };
        (h, c, cache)
    }

    /// Backward through one time step, accumulating parameter gradients
    ///
    /// Returns `(dx, dh_prev, dc_prev)`.
    pub fn backward(
        &self,
        dh: &Tensor,
        dc: &Tensor,
        cache: &LstmCache,
        grads: &mut LstmGradients,
    ) -> (Tensor, Tensor, Tensor) {
        let n = dh.data.len();
        let mut dz_i = vec![0.0; n];
        let mut dz_f = vec![0.0; n];
        let mut dz_g = vec![0.0; n];
        let mut dz_o = vec![0.0; n];
        let mut dc_prev = vec![0.0; n];

        for k in 0..n {
            let (i, f, g, o) = (
                cache.i.data[k],
                cache.f.data[k],
                cache.g.data[k],
                cache.o.data[k],
            );
            let tanh_c = cache.tanh_c.data[k];
            let dh_k = dh.data[k];

            let dc_total = dc.data[k] + dh_k * o * (1.0 - tanh_c * tanh_c);
            dz_i[k] = dc_total * g * i * (1.0 - i);
            dz_f[k] = dc_total * cache.c_prev.data[k] * f * (1.0 - f);
            dz_g[k] = dc_total * i * (1.0 - g * g);
            dz_o[k] = dh_k * tanh_c * o * (1.0 - o);
            dc_prev[k] = dc_total * f;
        }

        let shape = dh.shape.clone();
        let dz = Tensor::concat_columns(&[
            &Tensor::new(dz_i, shape.clone()),
            &Tensor::new(dz_f, shape.clone()),
            &Tensor::new(dz_g, shape.clone()),
            &Tensor::new(dz_o, shape.clone()),
        ]);

        grads.w_input.add_assign(&cache.x.transpose().matmul(&dz));
        grads.w_recurrent.add_assign(&cache.h_prev.transpose().matmul(&dz));
        grads.bias.add_assign(&dz.sum_rows());

        let dx = dz.matmul(&self.w_input.transpose());
        let dh_prev = dz.matmul(&self.w_recurrent.transpose());
        (dx, dh_prev, Tensor::new(dc_prev, shape))
    }
}

/// Values from one forward step needed by its backward step
pub struct LstmCache {
    pub x: Tensor,
    pub h_prev: Tensor,
    pub c_prev: Tensor,
    pub i: Tensor,
    pub f: Tensor,
    pub g: Tensor,
    pub o: Tensor,
    pub tanh_c: Tensor,
}

/// Parameter gradients for one cell, summed over a window
pub struct LstmGradients {
    pub w_input: Tensor,
    pub w_recurrent: Tensor,
    pub bias: Tensor,
}

impl LstmGradients {
    pub fn zeros_like(cell: &TrainableLstmCell) -> Self {
        Self {
            w_input: Tensor::zeros(cell.w_input.shape.clone()),
            w_recurrent: Tensor::zeros(cell.w_recurrent.shape.clone()),
            bias: Tensor::zeros(cell.bias.shape.clone()),
        }
    }
}
