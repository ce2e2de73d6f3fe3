//! Text Generator
//!
//! The public face of the crate: build from a corpus, `fit`, then `infer`.
//!
//! ## Training Phases
//!
//! ```text
//! Uninitialized ──► Ready ──► EpochRunning(1) ──► EpochComplete(1) ──► ... ──► Done
//!                                    │
//!                                    └──► Failed(1)     (error inside the epoch)
//! ```
//!
//! Parameters are initialized on the way into `Ready`, exactly once per
//! generator. A later `fit` call starts again from `Ready` and keeps
//! training the same parameters.
//!
//! ## Per-Window Step
//!
//! ```text
//! lr      = schedule(global_step)
//! logits, state' = model(window.inputs, state)     // state from previous window
//! loss    = mean CE(logits, window.targets)
//! grads   = backward(loss)                         // stops at the window start
//! clip(grads, grad_clip); adam(lr)
//! state   = state'; global_step += 1
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use yorick::{FitOptions, ModelConfig, TextGenerator};
//!
//! let text = std::fs::read_to_string("shakespeare.txt")?;
//! let mut generator = TextGenerator::new(&text, ModelConfig::small())?;
//! let log = generator.fit(&FitOptions::new("ROMEO:", 200).with_epochs(3).with_exp_decay(true))?;
//! println!("final loss {:?}", log.last_loss());
//! println!("{}", generator.infer("ROMEO:", 200)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::context::ExecutionContext;
use crate::decode::{decode, DecodeStrategy};
use crate::error::Result;
use crate::model::{CharRnn, ModelConfig};
use crate::schedule::LrSchedule;
use crate::train::{train_val_split, FitOptions, WindowedBatches};
use crate::training_logger::{EpochSummary, StepRecord, TrainingLog, TrainingLogger};
use crate::vocab::Vocabulary;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingPhase {
    Uninitialized,
    Ready,
    EpochRunning { epoch: usize },
    EpochComplete { epoch: usize },
    Done,
    /// A step or validation error ended the run inside this epoch
    Failed { epoch: usize },
}

pub struct TextGenerator {
    vocab: Vocabulary,
    indexed: Vec<usize>,
    context: ExecutionContext,
    phase: TrainingPhase,
    sample_rng: StdRng,
}

impl TextGenerator {
    /// Index `text` and set up an uninitialized execution context
    pub fn new(text: &str, config: ModelConfig) -> Result<Self> {
        let vocab = Vocabulary::build(text)?;
        let indexed = vocab.encode(text)?;
        // Sampling draws from its own stream so decodes never shift dropout masks
        let sample_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
        let context = ExecutionContext::new(config, vocab.size())?;
        debug!(vocab_size = vocab.size(), corpus_len = indexed.len(), "corpus indexed");

        Ok(Self {
            vocab,
            indexed,
            context,
            phase: TrainingPhase::Uninitialized,
            sample_rng,
        })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn indexed_corpus(&self) -> &[usize] {
        &self.indexed
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn config(&self) -> &ModelConfig {
        self.context.config()
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    /// Initialize parameters without training, e.g. to decode from an untrained model
    pub fn initialize(&mut self) -> Result<()> {
        self.context.initialize()?;
        self.phase = TrainingPhase::Ready;
        Ok(())
    }

    /// Install caller-built parameters
    pub fn initialize_with(&mut self, model: CharRnn) -> Result<()> {
        self.context.initialize_with(model)?;
        self.phase = TrainingPhase::Ready;
        Ok(())
    }

    /// Train for `options.n_epoch` epochs and return the log
    ///
    /// Options, the sample seed and the schedule are all checked before the
    /// first update. A non-finite loss ends the run with
    /// [`YorickError::Divergence`](crate::YorickError::Divergence), and any
    /// error raised inside an epoch leaves the phase at
    /// [`TrainingPhase::Failed`]. Parameters keep the updates made so far.
    pub fn fit(&mut self, options: &FitOptions) -> Result<TrainingLog> {
        options.validate()?;
        self.vocab.encode(&options.start_word)?;

        let split = match options.val_fraction {
            Some(fraction) => train_val_split(&self.indexed, fraction).0.len(),
            None => self.indexed.len(),
        };

        let n_batch = WindowedBatches::new(
            &self.indexed[..split],
            options.batch_size,
            self.config().seq_len,
            options.text_iter_step,
        )?
        .num_windows();
        let total_steps = options.n_epoch * n_batch;
        let schedule = LrSchedule::for_run(options.en_exp_decay, total_steps)?;
        debug!(?schedule, n_batch, total_steps, "schedule ready");

        let mut logger = options.log_path.as_ref().map(TrainingLogger::new).transpose()?;

        if !self.context.is_initialized() {
            self.context.initialize()?;
        }
        self.phase = TrainingPhase::Ready;

        match self.run_epochs(options, split, n_batch, &schedule, logger.as_mut()) {
            Ok(log) => {
                self.phase = TrainingPhase::Done;
                Ok(log)
            }
            Err(err) => {
                if let TrainingPhase::EpochRunning { epoch } = self.phase {
                    self.phase = TrainingPhase::Failed { epoch };
                }
                Err(err)
            }
        }
    }

    /// The epoch loop of `fit`; `indexed[..split]` is trained on, the rest validated
    fn run_epochs(
        &mut self,
        options: &FitOptions,
        split: usize,
        n_batch: usize,
        schedule: &LrSchedule,
        mut logger: Option<&mut TrainingLogger>,
    ) -> Result<TrainingLog> {
        let seq_len = self.config().seq_len;
        let (train_tokens, val_tokens) = self.indexed.split_at(split);
        let mut windows = WindowedBatches::new(train_tokens, options.batch_size, seq_len, options.text_iter_step)?;

        let mut log = TrainingLog::default();
        let mut global_step = 0usize;

        for epoch in 1..=options.n_epoch {
            self.phase = TrainingPhase::EpochRunning { epoch };
            windows.reset();
            if n_batch == 0 {
                warn!(
                    epoch,
                    corpus_len = train_tokens.len(),
                    window_span = options.batch_size * seq_len + 1,
                    "corpus too short for one window, epoch performs no updates"
                );
            }

            let mut state = self.context.zero_state(options.batch_size);
            let mut loss_sum = 0.0f64;
            let mut steps = 0usize;

            for (local_step, window) in windows.by_ref().enumerate() {
                let lr = schedule.learning_rate(global_step);
                let out = self
                    .context
                    .train_step(&window, &state, lr, options.weight_decay, global_step)?;
                state = out.final_state;
                loss_sum += out.loss as f64;
                steps += 1;

                let sample = if options.sample_every > 0 && local_step % options.sample_every == 0 {
                    let text = decode(
                        &self.context,
                        &self.vocab,
                        &options.start_word,
                        options.n_gen,
                        DecodeStrategy::Greedy,
                        Some(&mut self.sample_rng),
                    )?;
                    debug!(step = global_step, sample = %text, "greedy sample");
                    Some(text)
                } else {
                    None
                };

                let record = StepRecord {
                    epoch,
                    step: global_step,
                    loss: out.loss,
                    learning_rate: lr,
                };
                let report = local_step % options.log_every == 0;
                if report {
                    info!(
                        "Epoch {}/{} | Batch {}/{} | train loss: {:.4} | lr: {:.4}",
                        epoch, options.n_epoch, local_step, n_batch, out.loss, lr
                    );
                }
                if report || sample.is_some() {
                    if let Some(logger) = logger.as_deref_mut() {
                        logger.log(&record, sample.as_deref())?;
                    }
                }
                if report {
                    log.records.push(record);
                }

                global_step += 1;
            }

            let (val_loss, val_accuracy) = self.validate_split(val_tokens, options)?;
            let summary = EpochSummary {
                epoch,
                steps,
                mean_train_loss: (steps > 0).then(|| (loss_sum / steps as f64) as f32),
                val_loss,
                val_accuracy,
            };
            match (summary.mean_train_loss, summary.val_loss, summary.val_accuracy) {
                (Some(tl), Some(vl), Some(va)) => info!(
                    "Epoch {}/{} | train loss: {:.4} | val loss: {:.4} | val acc: {:.3}",
                    epoch, options.n_epoch, tl, vl, va
                ),
                (Some(tl), _, _) => info!("Epoch {}/{} | train loss: {:.4}", epoch, options.n_epoch, tl),
                (None, _, _) => info!("Epoch {}/{} | no training windows", epoch, options.n_epoch),
            }
            log.epochs.push(summary);
            self.phase = TrainingPhase::EpochComplete { epoch };
        }

        Ok(log)
    }

    /// Average loss and accuracy over the held-out tail
    ///
    /// Runs in inference mode from a zero state; the state is carried across
    /// validation windows only. `None` when no split is configured or the
    /// tail is too short for one window.
    fn validate_split(&self, val_tokens: &[usize], options: &FitOptions) -> Result<(Option<f32>, Option<f32>)> {
        if options.val_fraction.is_none() {
            return Ok((None, None));
        }
        let windows = WindowedBatches::new(
            val_tokens,
            options.batch_size,
            self.config().seq_len,
            options.text_iter_step,
        )?;

        let mut state = self.context.zero_state(options.batch_size);
        let (mut loss_sum, mut acc_sum, mut count) = (0.0f64, 0.0f64, 0usize);
        for window in windows {
            let out = self.context.evaluate(&window, &state)?;
            state = out.final_state;
            loss_sum += out.loss as f64;
            acc_sum += out.accuracy as f64;
            count += 1;
        }

        if count == 0 {
            warn!(val_len = val_tokens.len(), "validation split too short for one window");
            return Ok((None, None));
        }
        Ok((
            Some((loss_sum / count as f64) as f32),
            Some((acc_sum / count as f64) as f32),
        ))
    }

    /// Greedy continuation of `start_word` by `n_gen` symbols
    pub fn infer(&self, start_word: &str, n_gen: usize) -> Result<String> {
        decode(
            &self.context,
            &self.vocab,
            start_word,
            n_gen,
            DecodeStrategy::Greedy,
            None::<&mut StdRng>,
        )
    }

    /// Continuation with an explicit strategy; sampling uses the generator's seeded RNG
    pub fn infer_with(&mut self, start_word: &str, n_gen: usize, strategy: DecodeStrategy) -> Result<String> {
        decode(
            &self.context,
            &self.vocab,
            start_word,
            n_gen,
            strategy,
            Some(&mut self.sample_rng),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::YorickError;

    fn corpus() -> String {
        "abcabcabcabc".repeat(20)
    }

    #[test]
    fn test_phases() {
        let mut gen = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
        assert_eq!(gen.phase(), TrainingPhase::Uninitialized);
        gen.fit(&FitOptions::new("ab", 5).with_batch_size(2).with_text_iter_step(8))
            .unwrap();
        assert_eq!(gen.phase(), TrainingPhase::Done);
        assert!(matches!(gen.initialize(), Err(YorickError::AlreadyInitialized)));
    }

    #[test]
    fn test_infer_before_initialization() {
        let gen = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
        assert!(matches!(gen.infer("a", 3), Err(YorickError::NotInitialized)));
    }

    #[test]
    fn test_fit_rejects_unknown_start_word() {
        let mut gen = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
        let err = gen.fit(&FitOptions::new("abz", 5)).unwrap_err();
        assert!(matches!(err, YorickError::UnknownSymbol('z')));
        assert!(!gen.context().is_initialized());
    }

    #[test]
    fn test_log_cadence() {
        let mut gen = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
        let opts = FitOptions::new("a", 4)
            .with_batch_size(2)
            .with_text_iter_step(4)
            .with_log_every(5)
            .with_sample_every(0);
        let log = gen.fit(&opts).unwrap();
        let n_batch = crate::windows_per_epoch(240, 2, 8, 4);
        assert_eq!(log.total_steps(), n_batch);
        assert_eq!(log.records.len(), n_batch.div_ceil(5));
        assert!(log.records.iter().all(|r| r.step % 5 == 0));
    }

    #[test]
    fn test_divergence_marks_phase_failed() {
        let config = ModelConfig::tiny();
        let mut gen = TextGenerator::new(&corpus(), config.clone()).unwrap();
        let mut model = CharRnn::zeroed(&config, gen.vocab().size());
        model.output.bias.data[0] = f32::NAN;
        gen.initialize_with(model).unwrap();

        let opts = FitOptions::new("a", 4)
            .with_epochs(3)
            .with_batch_size(2)
            .with_text_iter_step(8)
            .with_sample_every(0);
        let err = gen.fit(&opts).unwrap_err();
        assert!(matches!(err, YorickError::Divergence { step: 0, .. }));
        assert_eq!(gen.phase(), TrainingPhase::Failed { epoch: 1 });
        assert_eq!(gen.context().steps_taken(), 0);
    }
}
