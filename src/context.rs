//! Execution Context
//!
//! Owns the model parameters, the optimizer moments and the seeded RNG that
//! drives initialization and dropout. Everything that reads or writes
//! parameters goes through here.
//!
//! ## Lifecycle
//!
//! ```text
//! new() ──► Uninitialized ──initialize()──► Ready ──► train_step / evaluate / predict
//!                  │                          │
//!                  └── train_step etc: NotInitialized
//!                                             └── initialize() again: AlreadyInitialized
//! ```
//!
//! Parameters are initialized exactly once. Dropping the context releases
//! them.

use crate::error::{Result, YorickError};
use crate::gradients::clip_gradients;
use crate::model::{CharRnn, ModelConfig};
use crate::optimizer::{adamw_update, AdamOptimizer};
use crate::recurrent::RecurrentState;
use crate::tensor::Tensor;
use crate::train::BatchWindow;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, instrument};

/// Result of one optimizer step
#[derive(Debug)]
pub struct StepOutput {
    pub loss: f32,
    /// Global gradient norm before clipping
    pub grad_norm: f32,
    pub final_state: RecurrentState,
}

/// Result of scoring one window without updating parameters
#[derive(Debug)]
pub struct EvalOutput {
    pub loss: f32,
    pub accuracy: f32,
    pub final_state: RecurrentState,
}

struct Parameters {
    model: CharRnn,
    optimizer: AdamOptimizer,
}

pub struct ExecutionContext {
    config: ModelConfig,
    vocab_size: usize,
    rng: StdRng,
    params: Option<Parameters>,
    steps_taken: usize,
}

impl ExecutionContext {
    pub fn new(config: ModelConfig, vocab_size: usize) -> Result<Self> {
        config.validate()?;
        if vocab_size == 0 {
            return Err(YorickError::config("vocabulary must not be empty"));
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            vocab_size,
            rng,
            params: None,
            steps_taken: 0,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn is_initialized(&self) -> bool {
        self.params.is_some()
    }

    /// Optimizer steps applied since initialization
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Draw fresh parameters from the context's seeded RNG
    pub fn initialize(&mut self) -> Result<()> {
        if self.params.is_some() {
            return Err(YorickError::AlreadyInitialized);
        }
        let model = CharRnn::new(&self.config, self.vocab_size, &mut self.rng);
        debug!(parameters = model.num_parameters(), "parameters initialized");
        self.install(model);
        Ok(())
    }

    /// Install caller-built parameters instead of random ones
    pub fn initialize_with(&mut self, model: CharRnn) -> Result<()> {
        if self.params.is_some() {
            return Err(YorickError::AlreadyInitialized);
        }
        if model.vocab_size() != self.vocab_size
            || model.n_layer() != self.config.n_layer
            || model.cell_size() != self.config.cell_size
        {
            return Err(YorickError::config(
                "model geometry does not match the context configuration",
            ));
        }
        self.install(model);
        Ok(())
    }

    fn install(&mut self, model: CharRnn) {
        let optimizer = AdamOptimizer::new(&model);
        self.params = Some(Parameters { model, optimizer });
    }

    pub fn model(&self) -> Result<&CharRnn> {
        self.params
            .as_ref()
            .map(|p| &p.model)
            .ok_or(YorickError::NotInitialized)
    }

    /// All-zero state for `batch_size` rows
    pub fn zero_state(&self, batch_size: usize) -> RecurrentState {
        RecurrentState::zeros(self.config.n_layer, batch_size, self.config.cell_size)
    }

    fn check_state(&self, state: &RecurrentState, batch_size: usize) -> Result<()> {
        if state.fits(self.config.n_layer, batch_size, self.config.cell_size) {
            Ok(())
        } else {
            Err(YorickError::config(format!(
                "recurrent state does not fit {} layers x [{}, {}]",
                self.config.n_layer, batch_size, self.config.cell_size
            )))
        }
    }

    /// One training step: forward with dropout, loss, backward, clip, update
    ///
    /// `state` is the final state of the previous window (or zeros); the
    /// returned `final_state` is what the next window should start from.
    /// A non-finite loss aborts with [`YorickError::Divergence`] before any
    /// parameter is touched.
    #[instrument(level = "trace", skip_all, fields(step = step))]
    pub fn train_step(
        &mut self,
        window: &BatchWindow,
        state: &RecurrentState,
        lr: f32,
        weight_decay: f32,
        step: usize,
    ) -> Result<StepOutput> {
        self.check_state(state, window.batch_size())?;
        let grad_clip = self.config.grad_clip;
        let params = self.params.as_mut().ok_or(YorickError::NotInitialized)?;

        let (logits, final_state, cache) =
            params.model.forward(&window.inputs, state, Some(&mut self.rng));
        let loss = params.model.compute_loss(&logits, &window.targets);
        if !loss.is_finite() {
            return Err(YorickError::Divergence { step, loss });
        }

        let mut grads = params.model.backward(&logits, &window.targets, &cache);
        let grad_norm = clip_gradients(&mut grads, grad_clip);
        adamw_update(&mut params.model, &grads, &mut params.optimizer, lr, weight_decay);
        self.steps_taken += 1;

        Ok(StepOutput {
            loss,
            grad_norm,
            final_state,
        })
    }

    /// Score a window in inference mode; parameters are untouched
    pub fn evaluate(&self, window: &BatchWindow, state: &RecurrentState) -> Result<EvalOutput> {
        self.check_state(state, window.batch_size())?;
        let model = self.model()?;
        let (logits, final_state) = model.infer(&window.inputs, state);
        Ok(EvalOutput {
            loss: model.compute_loss(&logits, &window.targets),
            accuracy: model.compute_accuracy(&logits, &window.targets),
            final_state,
        })
    }

    /// Advance one time step for a batch of single symbols
    ///
    /// Returns logits `[ids.len(), vocab_size]` and the next state.
    pub fn predict(&self, ids: &[usize], state: &RecurrentState) -> Result<(Tensor, RecurrentState)> {
        self.check_state(state, ids.len())?;
        let model = self.model()?;
        if let Some(&bad) = ids.iter().find(|&&id| id >= self.vocab_size) {
            return Err(YorickError::config(format!(
                "symbol index {} outside vocabulary of {}",
                bad, self.vocab_size
            )));
        }
        let inputs: Vec<Vec<usize>> = ids.iter().map(|&id| vec![id]).collect();
        Ok(model.infer(&inputs, state))
    }
}
