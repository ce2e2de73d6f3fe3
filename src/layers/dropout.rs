//! Dropout Layer
//!
//! Randomly zeros embedding activations during training and rescales the
//! survivors by `1 / (1 - rate)`. In inference mode values pass through
//! unchanged. Masks are drawn from a caller-supplied RNG so a seeded
//! context replays the same masks.

use crate::tensor::Tensor;
use rand::Rng;

pub struct TrainableDropout {
    pub rate: f32,
}

impl TrainableDropout {
    /// Create a new dropout layer
    ///
    /// # Arguments
    ///
    /// * `rate` - Dropout probability in `[0.0, 1.0)`
    pub fn new(rate: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be in [0.0, 1.0)"
        );
        Self { rate }
    }

    /// Forward pass with caching for backward
    ///
    /// Returns the output and the mask needed by [`TrainableDropout::backward`].
    pub fn forward(&self, x: &Tensor, training: bool, rng: &mut impl Rng) -> (Tensor, DropoutCache) {
        if !training || self.rate == 0.0 {
            let cache = DropoutCache {
                mask: None,
                scale: 1.0,
            };
            return (x.clone(), cache);
        }

        let scale = 1.0 / (1.0 - self.rate);
        let mut mask = Vec::with_capacity(x.data.len());
        let mut output = Tensor::zeros(x.shape.clone());

        for (i, &val) in x.data.iter().enumerate() {
            let keep = rng.gen::<f32>() >= self.rate;
            mask.push(keep);
            if keep {
                output.data[i] = val * scale;
            }
        }

        let cache = DropoutCache {
            mask: Some(mask),
            scale,
        };
        (output, cache)
    }

    pub fn backward(&self, grad_output: &Tensor, cache: &DropoutCache) -> Tensor {
        match &cache.mask {
            Some(mask) => {
                let mut grad_input = Tensor::zeros(grad_output.shape.clone());
                for (i, &keep) in mask.iter().enumerate() {
                    if keep {
                        grad_input.data[i] = grad_output.data[i] * cache.scale;
                    }
                }
                grad_input
            }
            None => grad_output.clone(),
        }
    }
}

/// Cache for dropout backward pass
pub struct DropoutCache {
    /// true = kept; None when dropout was not applied
    pub mask: Option<Vec<bool>>,
    pub scale: f32,
}
