//! Linear Layer (Fully Connected)
//!
//! Projects the top recurrent layer's outputs to vocabulary logits:
//! `y = x @ W + b`.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [rows, in_features]        rows = batch_size * seq_len
//! Weight: W [in_features, out_features]
//! Bias:   b [out_features]
//! Output: y = x @ W + b [rows, out_features]
//! ```
//!
//! ## Backward Pass
//!
//! ```text
//! grad_W = x^T @ grad_y
//! grad_b = sum(grad_y, axis=0)
//! grad_x = grad_y @ W^T
//! ```

use super::init::uniform_init;
use crate::tensor::Tensor;
use rand::Rng;

/// Linear layer (fully connected)
pub struct TrainableLinear {
    pub weight: Tensor,
    pub bias: Tensor,
}

impl TrainableLinear {
    /// Create a new linear layer
    ///
    /// Weights use Glorot-uniform scaling, √(6/(in+out)); bias starts at zero.
    pub fn new(in_features: usize, out_features: usize, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (in_features + out_features) as f32).sqrt();
        Self {
            weight: Tensor::new(
                uniform_init(in_features * out_features, limit, rng),
                vec![in_features, out_features],
            ),
            bias: Tensor::zeros(vec![out_features]),
        }
    }

    /// A layer whose weights and bias are all zero
    pub fn zeroed(in_features: usize, out_features: usize) -> Self {
        Self {
            weight: Tensor::zeros(vec![in_features, out_features]),
            bias: Tensor::zeros(vec![out_features]),
        }
    }

    /// Forward pass; caches `x` for the backward pass
    pub fn forward(&self, x: &Tensor) -> (Tensor, LinearCache) {
        let y = self.infer(x);
        let cache = LinearCache { x: x.clone() };
        (y, cache)
    }

    /// Forward pass without a cache, for inference
    pub fn infer(&self, x: &Tensor) -> Tensor {
        x.matmul(&self.weight).add(&self.bias)
    }

    pub fn backward(&self, grad_out: &Tensor, cache: &LinearCache) -> LinearGradients {
        LinearGradients {
            weight: cache.x.transpose().matmul(grad_out),
            bias: grad_out.sum_rows(),
            x: grad_out.matmul(&self.weight.transpose()),
        }
    }
}

/// Cache for linear layer backward pass
pub struct LinearCache {
    pub x: Tensor,
}

/// Gradients for linear layer
pub struct LinearGradients {
    pub weight: Tensor,
    pub bias: Tensor,
    pub x: Tensor, // Gradient to pass to previous layer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_shapes_and_bias_grad() {
        let layer = TrainableLinear {
            weight: Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]),
            bias: Tensor::new(vec![0.5, 0.5, 0.5], vec![3]),
        };
        let x = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]);
        let (y, cache) = layer.forward(&x);
        assert_eq!(y.data, vec![1.5, 2.5, 3.5, 4.5, 5.5, 6.5]);

        let grad_out = Tensor::new(vec![1.0; 6], vec![2, 3]);
        let grads = layer.backward(&grad_out, &cache);
        assert_eq!(grads.weight.shape, vec![2, 3]);
        assert_eq!(grads.bias.data, vec![2.0, 2.0, 2.0]);
        assert_eq!(grads.x.data, vec![6.0, 15.0, 6.0, 15.0]);
    }
}
