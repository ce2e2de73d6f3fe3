//! Yorick: Character-Level LSTM Text Generator
//!
//! A stacked-LSTM character language model implemented from scratch in
//! Rust: hand-written forward and backward passes, truncated
//! backpropagation through time with the recurrent state carried from one
//! window to the next, an exponentially decaying learning rate, and greedy
//! or temperature-sampled autoregressive decoding. Named after the jester
//! whose skull Hamlet holds.
//!
//! # Pipeline
//!
//! ```text
//! raw text → Vocabulary → indexed corpus → WindowedBatches
//!          → TextGenerator::fit (ExecutionContext: CharRnn + Adam) → TrainingLog
//!          → TextGenerator::infer → generated text
//! ```
//!
//! # Modules
//!
//! - [`vocab`] - Character ↔ index mapping
//! - [`train`] - Window generation and `fit` options
//! - [`recurrent`] - Stacked LSTM unrolled over a window
//! - [`schedule`] - Learning-rate schedules
//! - [`context`] - Parameter ownership and training steps
//! - [`trainer`] - The `fit` / `infer` front end
//! - [`decode`] - Autoregressive decoding strategies
//!
//! # Example
//!
//! ```rust
//! use yorick::{FitOptions, ModelConfig, TextGenerator};
//!
//! let text = "to be or not to be ".repeat(40);
//! let mut generator = TextGenerator::new(&text, ModelConfig::tiny())?;
//! let options = FitOptions::new("to", 10).with_batch_size(4).with_text_iter_step(16);
//! let log = generator.fit(&options)?;
//! assert!(log.total_steps() > 0);
//!
//! let generated = generator.infer("to be", 10)?;
//! assert_eq!(generated.chars().count(), 15);
//! # Ok::<(), yorick::YorickError>(())
//! ```

pub mod context;
pub mod decode;
pub mod error;
pub mod gradients;
pub mod layers;
pub mod model;
pub mod optimizer;
pub mod recurrent;
pub mod schedule;
pub mod tensor;
pub mod train;
pub mod trainer;
pub mod training_logger;
pub mod vocab;

// Re-export main types for convenience
pub use context::{EvalOutput, ExecutionContext, StepOutput};
pub use decode::{decode, DecodeStrategy};
pub use error::{Result, YorickError};
pub use model::{CharRnn, GraphBuilder, ModelConfig};
pub use recurrent::{LayerState, RecurrentStack, RecurrentState};
pub use schedule::LrSchedule;
pub use tensor::Tensor;
pub use train::{train_val_split, windows_per_epoch, BatchWindow, FitOptions, WindowedBatches};
pub use trainer::{TextGenerator, TrainingPhase};
pub use training_logger::{EpochSummary, StepRecord, TrainingLog, TrainingLogger};
pub use vocab::Vocabulary;
