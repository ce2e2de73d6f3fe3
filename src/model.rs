//! Character RNN Model
//!
//! The full network that the execution context trains and the decoder reads:
//!
//! ```text
//! Input window [batch, seq_len] of symbol indices
//!     ↓
//! Embedding lookup [vocab_size, embedding_dims]
//!     ↓
//! Dropout (training only)
//!     ↓
//! LSTM layer 1 .. n_layer (cell_size each), state carried in and out
//!     ↓
//! Linear → logits [batch * seq_len, vocab_size]
//! ```
//!
//! Logit row `b * seq_len + t` belongs to batch row `b`, position `t`, the
//! same order as the flattened target window. Training minimises the mean
//! cross-entropy over every position of the window.

use crate::error::{Result, YorickError};
use crate::layers::{
    DropoutCache, LinearCache, LstmGradients, TrainableDropout, TrainableEmbedding, TrainableLinear,
};
use crate::recurrent::{RecurrentStack, RecurrentState, StackCache};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Model configuration
///
/// # Fields
///
/// - `seq_len`: Time steps per training window
/// - `embedding_dims`: Width of each symbol's embedding vector
/// - `cell_size`: Units per LSTM cell
/// - `n_layer`: Number of stacked LSTM cells
/// - `grad_clip`: Global gradient-norm ceiling applied before every update
/// - `dropout_rate`: Dropout on embeddings during training
/// - `seed`: Seed for initialization, dropout masks and sampling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub seq_len: usize,
    pub embedding_dims: usize,
    pub cell_size: usize,
    pub n_layer: usize,
    pub grad_clip: f32,
    pub dropout_rate: f32,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seq_len: 50,
            embedding_dims: 128,
            cell_size: 128,
            n_layer: 2,
            grad_clip: 5.0,
            dropout_rate: 0.2,
            seed: 42,
        }
    }
}

impl ModelConfig {
    /// Small enough to train in seconds; used by tests and quick checks
    pub fn tiny() -> Self {
        Self {
            seq_len: 8,
            embedding_dims: 8,
            cell_size: 16,
            n_layer: 1,
            ..Self::default()
        }
    }

    pub fn small() -> Self {
        Self {
            seq_len: 32,
            embedding_dims: 32,
            cell_size: 64,
            n_layer: 2,
            ..Self::default()
        }
    }

    /// Load a configuration from JSON; missing fields take default values
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: ModelConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.seq_len == 0 {
            return Err(YorickError::config("seq_len must be > 0"));
        }
        if self.embedding_dims == 0 {
            return Err(YorickError::config("embedding_dims must be > 0"));
        }
        if self.cell_size == 0 {
            return Err(YorickError::config("cell_size must be > 0"));
        }
        if self.n_layer == 0 {
            return Err(YorickError::config("n_layer must be > 0"));
        }
        if !(self.grad_clip.is_finite() && self.grad_clip > 0.0) {
            return Err(YorickError::config(format!(
                "grad_clip must be finite and > 0, got {}",
                self.grad_clip
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(YorickError::config(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }
}

pub struct CharRnn {
    pub(crate) embedding: TrainableEmbedding,
    pub(crate) dropout: TrainableDropout,
    pub(crate) stack: RecurrentStack,
    pub(crate) output: TrainableLinear,
}

impl CharRnn {
    pub fn new(config: &ModelConfig, vocab_size: usize, rng: &mut impl Rng) -> Self {
        GraphBuilder::new(config, vocab_size)
            .embedding(rng)
            .recurrent(rng)
            .projection(rng)
    }

    /// Every parameter zero: the recurrent output is always zero and every
    /// logit is zero
    pub fn zeroed(config: &ModelConfig, vocab_size: usize) -> Self {
        Self {
            embedding: TrainableEmbedding {
                table: Tensor::zeros(vec![vocab_size, config.embedding_dims]),
            },
            dropout: TrainableDropout::new(config.dropout_rate),
            stack: RecurrentStack::zeroed(config.embedding_dims, config.cell_size, config.n_layer),
            output: TrainableLinear::zeroed(config.cell_size, vocab_size),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.embedding.vocab_size()
    }

    pub fn n_layer(&self) -> usize {
        self.stack.n_layer()
    }

    pub fn cell_size(&self) -> usize {
        self.stack.cell_size
    }

    pub fn zero_state(&self, batch_size: usize) -> RecurrentState {
        self.stack.zero_state(batch_size)
    }

    pub fn num_parameters(&self) -> usize {
        let cells: usize = self
            .stack
            .cells
            .iter()
            .map(|c| c.w_input.data.len() + c.w_recurrent.data.len() + c.bias.data.len())
            .sum();
        self.embedding.table.data.len()
            + cells
            + self.output.weight.data.len()
            + self.output.bias.data.len()
    }

    /// Embed each position's column of `inputs`: one `[batch, dims]` per step
    fn embed(&self, inputs: &[Vec<usize>]) -> (Vec<Vec<usize>>, Vec<Tensor>) {
        let seq_len = inputs.first().map_or(0, Vec::len);
        let step_ids: Vec<Vec<usize>> = (0..seq_len)
            .map(|t| inputs.iter().map(|row| row[t]).collect())
            .collect();
        let embedded = step_ids.iter().map(|ids| self.embedding.forward(ids)).collect();
        (step_ids, embedded)
    }

    /// Stack per-position `[batch, cell]` outputs into `[batch * seq_len, cell]`
    fn flatten_outputs(outputs: &[Tensor], batch_size: usize, cell_size: usize) -> Tensor {
        let seq_len = outputs.len();
        let mut data = Vec::with_capacity(batch_size * seq_len * cell_size);
        for b in 0..batch_size {
            for out in outputs {
                data.extend_from_slice(out.row(b));
            }
        }
        Tensor::new(data, vec![batch_size * seq_len, cell_size])
    }

    /// Inverse of `flatten_outputs`, for gradients
    fn unflatten_grad(grad: &Tensor, batch_size: usize, seq_len: usize) -> Vec<Tensor> {
        let cols = grad.cols();
        (0..seq_len)
            .map(|t| {
                let mut data = Vec::with_capacity(batch_size * cols);
                for b in 0..batch_size {
                    data.extend_from_slice(grad.row(b * seq_len + t));
                }
                Tensor::new(data, vec![batch_size, cols])
            })
            .collect()
    }

    /// Training forward pass over a window
    ///
    /// With `dropout_rng` set, dropout is active (training mode); without it
    /// the pass is deterministic.
    pub fn forward(
        &self,
        inputs: &[Vec<usize>],
        initial: &RecurrentState,
        mut dropout_rng: Option<&mut StdRng>,
    ) -> (Tensor, RecurrentState, ModelCache) {
        let batch_size = inputs.len();
        let (step_ids, embedded) = self.embed(inputs);

        let mut dropout_caches = Vec::with_capacity(embedded.len());
        let mut dropped = Vec::with_capacity(embedded.len());
        for x in &embedded {
            let (y, cache) = match dropout_rng.as_deref_mut() {
                Some(rng) => self.dropout.forward(x, true, rng),
                None => (x.clone(), DropoutCache { mask: None, scale: 1.0 }),
            };
            dropped.push(y);
            dropout_caches.push(cache);
        }

        let (outputs, final_state, stack_cache) = self.stack.run(&dropped, initial);
        let hidden = Self::flatten_outputs(&outputs, batch_size, self.cell_size());
        let (logits, output_cache) = self.output.forward(&hidden);

        let cache = ModelCache {
            step_ids,
            dropout_caches,
            stack_cache,
            output_cache,
        };
        (logits, final_state, cache)
    }

    /// Inference pass: no dropout, no cache
    pub fn infer(&self, inputs: &[Vec<usize>], initial: &RecurrentState) -> (Tensor, RecurrentState) {
        let batch_size = inputs.len();
        let (_, embedded) = self.embed(inputs);
        let (outputs, final_state) = self.stack.infer(&embedded, initial);
        let hidden = Self::flatten_outputs(&outputs, batch_size, self.cell_size());
        (self.output.infer(&hidden), final_state)
    }

    /// Mean cross-entropy of `logits` against the flattened target window
    pub fn compute_loss(&self, logits: &Tensor, targets: &[Vec<usize>]) -> f32 {
        let vocab_size = self.vocab_size();
        let flat: Vec<usize> = targets.concat();
        let mut total_loss = 0.0;

        for (i, &target) in flat.iter().enumerate() {
            let logits_slice = &logits.data[i * vocab_size..(i + 1) * vocab_size];
            let max_logit = logits_slice.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let exp_sum: f32 = logits_slice.iter().map(|&x| (x - max_logit).exp()).sum();
            let log_prob = (logits_slice[target] - max_logit) - exp_sum.ln();
            total_loss -= log_prob;
        }

        total_loss / flat.len() as f32
    }

    /// Fraction of positions whose most likely symbol is the target
    pub fn compute_accuracy(&self, logits: &Tensor, targets: &[Vec<usize>]) -> f32 {
        let flat: Vec<usize> = targets.concat();
        let correct = logits
            .argmax_rows()
            .iter()
            .zip(&flat)
            .filter(|(p, t)| p == t)
            .count();
        correct as f32 / flat.len() as f32
    }

    pub fn backward(&self, logits: &Tensor, targets: &[Vec<usize>], cache: &ModelCache) -> ModelGradients {
        let vocab_size = self.vocab_size();
        let batch_size = targets.len();
        let seq_len = cache.step_ids.len();
        let flat: Vec<usize> = targets.concat();
        let n = flat.len() as f32;

        // 1. d(mean CE)/d logits = (softmax - onehot) / N
        let mut grad_logits = logits.softmax_rows();
        for (i, &target) in flat.iter().enumerate() {
            grad_logits.data[i * vocab_size + target] -= 1.0;
        }
        let grad_logits = grad_logits.mul_scalar(1.0 / n);

        // 2. Output projection
        let out_grads = self.output.backward(&grad_logits, &cache.output_cache);

        // 3. Recurrent stack (BPTT inside the window)
        let grad_outputs = Self::unflatten_grad(&out_grads.x, batch_size, seq_len);
        let (cell_grads, grad_inputs) = self.stack.backward(&grad_outputs, &cache.stack_cache);

        // 4. Dropout, then scatter into the embedding table
        let mut grad_embedding = Tensor::zeros(self.embedding.table.shape.clone());
        for ((ids, grad_x), dropout_cache) in cache
            .step_ids
            .iter()
            .zip(&grad_inputs)
            .zip(&cache.dropout_caches)
        {
            let grad_embedded = self.dropout.backward(grad_x, dropout_cache);
            self.embedding.backward(&mut grad_embedding, ids, &grad_embedded);
        }

        ModelGradients {
            embedding: grad_embedding,
            cells: cell_grads,
            output_weight: out_grads.weight,
            output_bias: out_grads.bias,
        }
    }
}

/// Staged assembly of a [`CharRnn`]
///
/// Each stage consumes the previous one and knows the feature width it
/// hands to the next, so layers can only be wired in order:
///
/// ```text
/// GraphBuilder<Start> ─embedding()─► GraphBuilder<Embedded> ─recurrent()─► GraphBuilder<Recurrent> ─projection()─► CharRnn
/// ```
///
/// ```rust
/// use yorick::model::{GraphBuilder, ModelConfig};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let config = ModelConfig::tiny();
/// let mut rng = StdRng::seed_from_u64(0);
/// let stage = GraphBuilder::new(&config, 10).embedding(&mut rng);
/// assert_eq!(stage.width(), config.embedding_dims);
/// let model = stage.recurrent(&mut rng).projection(&mut rng);
/// assert_eq!(model.vocab_size(), 10);
/// ```
pub struct GraphBuilder<'c, S> {
    config: &'c ModelConfig,
    vocab_size: usize,
    stage: S,
}

pub struct Start;

pub struct Embedded {
    embedding: TrainableEmbedding,
    dropout: TrainableDropout,
}

pub struct Recurrent {
    embedding: TrainableEmbedding,
    dropout: TrainableDropout,
    stack: RecurrentStack,
}

impl<'c> GraphBuilder<'c, Start> {
    pub fn new(config: &'c ModelConfig, vocab_size: usize) -> Self {
        Self {
            config,
            vocab_size,
            stage: Start,
        }
    }

    pub fn embedding(self, rng: &mut impl Rng) -> GraphBuilder<'c, Embedded> {
        GraphBuilder {
            config: self.config,
            vocab_size: self.vocab_size,
            stage: Embedded {
                embedding: TrainableEmbedding::new(self.vocab_size, self.config.embedding_dims, rng),
                dropout: TrainableDropout::new(self.config.dropout_rate),
            },
        }
    }
}

impl<'c> GraphBuilder<'c, Embedded> {
    /// Features per position leaving this stage
    pub fn width(&self) -> usize {
        self.stage.embedding.dims()
    }

    pub fn recurrent(self, rng: &mut impl Rng) -> GraphBuilder<'c, Recurrent> {
        let stack = RecurrentStack::new(self.width(), self.config.cell_size, self.config.n_layer, rng);
        GraphBuilder {
            config: self.config,
            vocab_size: self.vocab_size,
            stage: Recurrent {
                embedding: self.stage.embedding,
                dropout: self.stage.dropout,
                stack,
            },
        }
    }
}

impl GraphBuilder<'_, Recurrent> {
    pub fn width(&self) -> usize {
        self.stage.stack.cell_size
    }

    pub fn projection(self, rng: &mut impl Rng) -> CharRnn {
        let output = TrainableLinear::new(self.width(), self.vocab_size, rng);
        CharRnn {
            embedding: self.stage.embedding,
            dropout: self.stage.dropout,
            stack: self.stage.stack,
            output,
        }
    }
}

/// Everything the backward pass needs from one forward pass
pub struct ModelCache {
    step_ids: Vec<Vec<usize>>,
    dropout_caches: Vec<DropoutCache>,
    stack_cache: StackCache,
    output_cache: LinearCache,
}

pub struct ModelGradients {
    pub embedding: Tensor,
    pub cells: Vec<LstmGradients>,
    pub output_weight: Tensor,
    pub output_bias: Tensor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn window() -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        (
            vec![vec![0, 1, 2], vec![2, 1, 0]],
            vec![vec![1, 2, 0], vec![1, 0, 3]],
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(ModelConfig::default().validate().is_ok());
        let bad = ModelConfig {
            seq_len: 0,
            ..ModelConfig::tiny()
        };
        assert!(matches!(bad.validate(), Err(YorickError::Config(_))));
        let bad = ModelConfig {
            grad_clip: 0.0,
            ..ModelConfig::tiny()
        };
        assert!(bad.validate().is_err());
        let bad = ModelConfig {
            dropout_rate: 1.0,
            ..ModelConfig::tiny()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_json_defaults_missing_fields() {
        let config: ModelConfig = serde_json::from_str(r#"{"cell_size": 32, "n_layer": 3}"#).unwrap();
        assert_eq!(config.cell_size, 32);
        assert_eq!(config.n_layer, 3);
        assert_eq!(config.grad_clip, 5.0);
    }

    #[test]
    fn test_uniform_logits_loss_is_ln_vocab() {
        let config = ModelConfig::tiny();
        let model = CharRnn::zeroed(&config, 4);
        let (inputs, targets) = window();
        let (logits, _) = model.infer(&inputs, &model.zero_state(2));
        assert_eq!(logits.shape, vec![6, 4]);
        let loss = model.compute_loss(&logits, &targets);
        assert!((loss - (4.0f32).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_forward_without_dropout_matches_infer() {
        let config = ModelConfig::tiny();
        let mut rng = StdRng::seed_from_u64(3);
        let model = CharRnn::new(&config, 4, &mut rng);
        let (inputs, _) = window();
        let state = model.zero_state(2);
        let (a, sa, _) = model.forward(&inputs, &state, None);
        let (b, sb) = model.infer(&inputs, &state);
        assert_eq!(a, b);
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_output_gradient_matches_finite_difference() {
        let config = ModelConfig {
            dropout_rate: 0.0,
            ..ModelConfig::tiny()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let mut model = CharRnn::new(&config, 4, &mut rng);
        let (inputs, targets) = window();
        let state = model.zero_state(2);

        let (logits, _, cache) = model.forward(&inputs, &state, None);
        let grads = model.backward(&logits, &targets, &cache);

        let eps = 1e-2f32;
        for k in [0usize, 5, 13] {
            let orig = model.output.weight.data[k];
            model.output.weight.data[k] = orig + eps;
            let plus = model.compute_loss(&model.infer(&inputs, &state).0, &targets);
            model.output.weight.data[k] = orig - eps;
            let minus = model.compute_loss(&model.infer(&inputs, &state).0, &targets);
            model.output.weight.data[k] = orig;
            let numeric = (plus - minus) / (2.0 * eps);
            assert!((numeric - grads.output_weight.data[k]).abs() < 1e-2);
        }
        for k in [0usize, 9, 17] {
            let orig = model.embedding.table.data[k];
            model.embedding.table.data[k] = orig + eps;
            let plus = model.compute_loss(&model.infer(&inputs, &state).0, &targets);
            model.embedding.table.data[k] = orig - eps;
            let minus = model.compute_loss(&model.infer(&inputs, &state).0, &targets);
            model.embedding.table.data[k] = orig;
            let numeric = (plus - minus) / (2.0 * eps);
            assert!((numeric - grads.embedding.data[k]).abs() < 1e-2);
        }
    }

    #[test]
    fn test_accuracy() {
        let model = CharRnn::zeroed(&ModelConfig::tiny(), 4);
        let logits = Tensor::new(vec![0.0, 9.0, 0.0, 0.0, 9.0, 0.0, 0.0, 0.0], vec![2, 4]);
        let targets = vec![vec![1, 2]];
        assert!((model.compute_accuracy(&logits, &targets) - 0.5).abs() < 1e-6);
    }
}
