//! Adam Optimizer
//!
//! Adam with optional decoupled weight decay (AdamW). With `weight_decay`
//! at zero, which is what training uses unless told otherwise, this is
//! plain Adam.
//!
//! ## Algorithm
//!
//! For each parameter θ with gradient g:
//!
//! ```text
//! θ = θ * (1 - α * λ)              # Weight decay (2D weight matrices only)
//! m = β₁ * m + (1 - β₁) * g        # First moment
//! v = β₂ * v + (1 - β₂) * g²       # Second moment
//! m_hat = m / (1 - β₁^t)           # Bias correction
//! v_hat = v / (1 - β₂^t)
//! θ = θ - α * m_hat / (√v_hat + ε)
//! ```
//!
//! with β₁ = 0.9, β₂ = 0.999, ε = 1e-8. Decay never touches the embedding
//! table or any bias vector, including the LSTM gate biases.
//!
//! The moment tensors mirror the model layout one-to-one: one pair for the
//! embedding, three pairs per LSTM cell, two for the output projection.

use crate::model::{CharRnn, ModelGradients};
use crate::tensor::Tensor;
use rayon::prelude::*;

/// First and second moments for one LSTM cell
pub struct CellAdamState {
    pub w_input: Tensor,
    pub w_recurrent: Tensor,
    pub bias: Tensor,
}

impl CellAdamState {
    fn zeros_like(cell: &crate::layers::TrainableLstmCell) -> Self {
        Self {
            w_input: Tensor::zeros(cell.w_input.shape.clone()),
            w_recurrent: Tensor::zeros(cell.w_recurrent.shape.clone()),
            bias: Tensor::zeros(cell.bias.shape.clone()),
        }
    }
}

pub struct AdamOptimizer {
    pub m_embedding: Tensor,
    pub m_cells: Vec<CellAdamState>,
    pub m_output_weight: Tensor,
    pub m_output_bias: Tensor,
    pub v_embedding: Tensor,
    pub v_cells: Vec<CellAdamState>,
    pub v_output_weight: Tensor,
    pub v_output_bias: Tensor,
    pub step: usize,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl AdamOptimizer {
    /// Zeroed moments shaped like `model`
    pub fn new(model: &CharRnn) -> Self {
        let cells = || model.stack.cells.iter().map(CellAdamState::zeros_like).collect();
        Self {
            m_embedding: Tensor::zeros(model.embedding.table.shape.clone()),
            m_cells: cells(),
            m_output_weight: Tensor::zeros(model.output.weight.shape.clone()),
            m_output_bias: Tensor::zeros(model.output.bias.shape.clone()),
            v_embedding: Tensor::zeros(model.embedding.table.shape.clone()),
            v_cells: cells(),
            v_output_weight: Tensor::zeros(model.output.weight.shape.clone()),
            v_output_bias: Tensor::zeros(model.output.bias.shape.clone()),
            step: 0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Apply one Adam(W) step to every parameter of `model`
pub fn adamw_update(
    model: &mut CharRnn,
    grads: &ModelGradients,
    optimizer: &mut AdamOptimizer,
    lr: f32,
    weight_decay: f32,
) {
    optimizer.step += 1;
    let step = optimizer.step as f32;

    let bias_correction1 = 1.0 - optimizer.beta1.powf(step);
    let bias_correction2 = 1.0 - optimizer.beta2.powf(step);

    let beta1 = optimizer.beta1;
    let beta2 = optimizer.beta2;
    let epsilon = optimizer.epsilon;

    // Parallel above 1000 elements, sequential below
    macro_rules! adamw_update_param {
        ($param:expr, $grad:expr, $m:expr, $v:expr, $apply_decay:expr) => {
            if $param.data.len() > 1000 {
                $param
                    .data
                    .par_iter_mut()
                    .zip($grad.data.par_iter())
                    .zip($m.data.par_iter_mut().zip($v.data.par_iter_mut()))
                    .for_each(|((param_val, &grad_val), (m_val, v_val))| {
                        if $apply_decay {
                            *param_val *= 1.0 - lr * weight_decay;
                        }
                        *m_val = beta1 * *m_val + (1.0 - beta1) * grad_val;
                        *v_val = beta2 * *v_val + (1.0 - beta2) * grad_val * grad_val;
                        let m_hat = *m_val / bias_correction1;
                        let v_hat = *v_val / bias_correction2;
                        *param_val -= lr * m_hat / (v_hat.sqrt() + epsilon);
                    });
            } else {
                for i in 0..$param.data.len() {
                    if $apply_decay {
                        $param.data[i] *= 1.0 - lr * weight_decay;
                    }
                    let g = $grad.data[i];
                    $m.data[i] = beta1 * $m.data[i] + (1.0 - beta1) * g;
                    $v.data[i] = beta2 * $v.data[i] + (1.0 - beta2) * g * g;
                    let m_hat = $m.data[i] / bias_correction1;
                    let v_hat = $v.data[i] / bias_correction2;
                    $param.data[i] -= lr * m_hat / (v_hat.sqrt() + epsilon);
                }
            }
        };
    }

    adamw_update_param!(
        model.embedding.table,
        grads.embedding,
        optimizer.m_embedding,
        optimizer.v_embedding,
        false
    );

    for (l, cell) in model.stack.cells.iter_mut().enumerate() {
        let g = &grads.cells[l];
        let m = &mut optimizer.m_cells[l];
        let v = &mut optimizer.v_cells[l];
        adamw_update_param!(cell.w_input, g.w_input, m.w_input, v.w_input, true);
        adamw_update_param!(cell.w_recurrent, g.w_recurrent, m.w_recurrent, v.w_recurrent, true);
        adamw_update_param!(cell.bias, g.bias, m.bias, v.bias, false);
    }

    adamw_update_param!(
        model.output.weight,
        grads.output_weight,
        optimizer.m_output_weight,
        optimizer.v_output_weight,
        true
    );
    adamw_update_param!(
        model.output.bias,
        grads.output_bias,
        optimizer.m_output_bias,
        optimizer.v_output_bias,
        false
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_step_moves_by_lr() {
        // On step 1, m_hat = g and v_hat = g², so each parameter moves by ~lr·sign(g)
        let config = ModelConfig::tiny();
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = CharRnn::new(&config, 5, &mut rng);
        let mut opt = AdamOptimizer::new(&model);

        let (inputs, targets) = (vec![vec![0, 1, 2, 3]], vec![vec![1, 2, 3, 4]]);
        let state = model.zero_state(1);
        let (logits, _, cache) = model.forward(&inputs, &state, None);
        let grads = model.backward(&logits, &targets, &cache);

        let before = model.output.bias.data.clone();
        adamw_update(&mut model, &grads, &mut opt, 0.01, 0.0);

        assert_eq!(opt.step, 1);
        for ((b, a), g) in before.iter().zip(&model.output.bias.data).zip(&grads.output_bias.data) {
            if g.abs() > 1e-4 {
                assert!(((b - a) - 0.01 * g.signum()).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_weight_decay_skips_biases() {
        let config = ModelConfig::tiny();
        let mut model = CharRnn::zeroed(&config, 3);
        model.output.weight.data.iter_mut().for_each(|w| *w = 1.0);
        model.output.bias.data.iter_mut().for_each(|b| *b = 1.0);
        let mut opt = AdamOptimizer::new(&model);

        let grads = ModelGradients {
            embedding: Tensor::zeros(model.embedding.table.shape.clone()),
            cells: model
                .stack
                .cells
                .iter()
                .map(crate::layers::LstmGradients::zeros_like)
                .collect(),
            output_weight: Tensor::zeros(model.output.weight.shape.clone()),
            output_bias: Tensor::zeros(model.output.bias.shape.clone()),
        };
        adamw_update(&mut model, &grads, &mut opt, 0.1, 0.5);

        assert!(model.output.weight.data.iter().all(|&w| (w - 0.95).abs() < 1e-6));
        assert!(model.output.bias.data.iter().all(|&b| b == 1.0));
    }
}
