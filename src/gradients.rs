//! Gradient Utilities
//!
//! Global-norm measurement and clipping over every gradient of a
//! [`ModelGradients`].
//!
//! ## Algorithm
//!
//! ```text
//! norm = √(Σ gradient²)  // over embedding, every LSTM cell, output projection
//! if norm > max_norm:
//!     gradients *= (max_norm / norm)
//! ```
//!
//! Every gradient is scaled by the same factor, so the update direction is
//! unchanged and only its length is capped. Recurrent nets need this more
//! than most: one bad window can multiply through many time steps.
//!
//! ## Example
//!
//! ```rust,no_run
//! use yorick::gradients::{clip_gradients, compute_grad_norm};
//! # use yorick::model::ModelGradients;
//! # let mut grads: ModelGradients = todo!();
//! let before = clip_gradients(&mut grads, 5.0);
//! println!("grad norm {:.3} -> {:.3}", before, compute_grad_norm(&grads));
//! ```

use crate::model::ModelGradients;
use crate::tensor::Tensor;
use rayon::prelude::*;

impl ModelGradients {
    fn tensors(&self) -> Vec<&Tensor> {
        let mut all = vec![&self.embedding];
        for cell in &self.cells {
            all.push(&cell.w_input);
            all.push(&cell.w_recurrent);
            all.push(&cell.bias);
        }
        all.push(&self.output_weight);
        all.push(&self.output_bias);
        all
    }

    fn tensors_mut(&mut self) -> Vec<&mut Tensor> {
        let mut all = vec![&mut self.embedding];
        for cell in &mut self.cells {
            all.push(&mut cell.w_input);
            all.push(&mut cell.w_recurrent);
            all.push(&mut cell.bias);
        }
        all.push(&mut self.output_weight);
        all.push(&mut self.output_bias);
        all
    }
}

/// L2 norm over all gradient values: √(Σ g²)
pub fn compute_grad_norm(grads: &ModelGradients) -> f32 {
    let sum_sq: f32 = grads.tensors().into_iter().map(Tensor::sum_squares).sum();
    sum_sq.sqrt()
}

/// Scale all gradients so their global norm is at most `max_norm`
///
/// Scaling runs in parallel within each tensor via Rayon. Returns the norm measured before clipping. Nothing is touched when the
/// norm is already within bounds.
pub fn clip_gradients(grads: &mut ModelGradients, max_norm: f32) -> f32 {
    let norm = compute_grad_norm(grads);

    if norm > max_norm {
        let scale = max_norm / norm;
        for tensor in grads.tensors_mut() {
            tensor.data.par_iter_mut().for_each(|val| *val *= scale);
        }
    }

    norm
}
