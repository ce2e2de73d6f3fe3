//! Training Data Windows
//!
//! This module slices an indexed character stream into fixed-geometry
//! `(input, target)` windows for truncated backpropagation through time, and
//! holds the options that drive a `fit` call.
//!
//! ## How Windows Are Generated
//!
//! A window covers `batch_size * seq_len` consecutive symbols starting at
//! offset `i`, reshaped row-major into `[batch_size, seq_len]`. The target
//! window is the same slice shifted by one symbol. Offsets advance by
//! `stride` while `i + batch_size * seq_len + 1 < len(corpus)`:
//!
//! ```text
//! Corpus: a b c a b c a b c a b c ...
//! seq_len 3, batch_size 2, stride 3
//!
//! Window at i = 0:
//!   Input:  [a b c]   Target: [b c a]
//!           [a b c]           [b c a]   <- last target symbol is corpus[6]
//! Window at i = 3: ...
//! ```
//!
//! Windows are never shuffled. The recurrent state left behind by one window
//! seeds the next one, so the order must be the corpus order.
//!
//! ## Example
//!
//! ```rust
//! use yorick::WindowedBatches;
//!
//! let corpus: Vec<usize> = (0..20).collect();
//! let mut windows = WindowedBatches::new(&corpus, 2, 4, 5).unwrap();
//! let first = windows.next().unwrap();
//! assert_eq!(first.inputs, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
//! assert_eq!(first.targets, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
//! assert_eq!(windows.count(), 2);
//! ```

use crate::error::{Result, YorickError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One `(input, target)` pair, each of shape `[batch_size, seq_len]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchWindow {
    pub inputs: Vec<Vec<usize>>,
    pub targets: Vec<Vec<usize>>,
}

impl BatchWindow {
    pub fn batch_size(&self) -> usize {
        self.inputs.len()
    }

    pub fn seq_len(&self) -> usize {
        self.inputs.first().map_or(0, Vec::len)
    }
}

/// Lazy, finite, restartable window sequence over an indexed corpus
///
/// # Fields
///
/// - `tokens`: The indexed corpus (borrowed, read-only)
/// - `batch_size`: Rows per window
/// - `seq_len`: Columns per window (time steps)
/// - `stride`: Offset advance between consecutive windows
/// - `position`: Offset of the next window
#[derive(Clone, Debug)]
pub struct WindowedBatches<'a> {
    tokens: &'a [usize],
    batch_size: usize,
    seq_len: usize,
    stride: usize,
    position: usize,
}

impl<'a> WindowedBatches<'a> {
    /// Create a window generator
    ///
    /// Fails with a configuration error when any of `batch_size`, `seq_len`
    /// or `stride` is zero. A corpus too short for a single window is not an
    /// error: the sequence is simply empty.
    pub fn new(tokens: &'a [usize], batch_size: usize, seq_len: usize, stride: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(YorickError::config("batch_size must be > 0"));
        }
        if seq_len == 0 {
            return Err(YorickError::config("seq_len must be > 0"));
        }
        if stride == 0 {
            return Err(YorickError::config("text_iter_step must be > 0"));
        }
        Ok(Self {
            tokens,
            batch_size,
            seq_len,
            stride,
            position: 0,
        })
    }

    fn span(&self) -> usize {
        self.batch_size * self.seq_len
    }

    /// Number of windows one full pass yields
    pub fn num_windows(&self) -> usize {
        windows_per_epoch(self.tokens.len(), self.batch_size, self.seq_len, self.stride)
    }

    /// Restart from the first window (start of an epoch)
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Iterator for WindowedBatches<'_> {
    type Item = BatchWindow;

    fn next(&mut self) -> Option<BatchWindow> {
        let span = self.span();
        if self.position + span + 1 >= self.tokens.len() {
            return None;
        }

        let i = self.position;
        let inputs = self.tokens[i..i + span]
            .chunks(self.seq_len)
            .map(<[usize]>::to_vec)
            .collect();
        // Target is the input shifted by one symbol
        let targets = self.tokens[i + 1..i + span + 1]
            .chunks(self.seq_len)
            .map(<[usize]>::to_vec)
            .collect();

        self.position += self.stride;
        Some(BatchWindow { inputs, targets })
    }
}

/// Count of window offsets `0, stride, 2*stride, ...` below
/// `corpus_len - batch_size*seq_len - 1`
pub fn windows_per_epoch(corpus_len: usize, batch_size: usize, seq_len: usize, stride: usize) -> usize {
    let span = batch_size * seq_len;
    if stride == 0 || corpus_len <= span + 1 {
        return 0;
    }
    let last_exclusive = corpus_len - span - 1;
    last_exclusive.div_ceil(stride)
}

/// Split tokenized data into training and validation sets
///
/// The validation set is taken from the end of the data so that the two
/// parts never interleave.
///
/// ```rust
/// # use yorick::train_val_split;
/// let tokens = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
/// let (train, val) = train_val_split(&tokens, 0.2);
/// assert_eq!(train.len(), 8);
/// assert_eq!(val.len(), 2);
/// ```
pub fn train_val_split(tokens: &[usize], val_fraction: f32) -> (&[usize], &[usize]) {
    let split_idx = ((tokens.len() as f32) * (1.0 - val_fraction)) as usize;
    let split_idx = split_idx.min(tokens.len());
    (&tokens[..split_idx], &tokens[split_idx..])
}

/// Options for one `fit` call
///
/// Defaults: stride 25, one epoch, batches of 128 windows, constant
/// learning rate, progress every 10 steps and a greedy sample every 100.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitOptions {
    /// Seed text for the periodic sample decode
    pub start_word: String,
    /// Symbols generated per sample
    pub n_gen: usize,
    /// Offset advance between windows
    pub text_iter_step: usize,
    pub n_epoch: usize,
    pub batch_size: usize,
    /// Exponential learning-rate decay instead of a fixed rate
    pub en_exp_decay: bool,
    /// Record a step (and emit a progress line) every N local steps
    pub log_every: usize,
    /// Decode a sample every N local steps (0 disables)
    pub sample_every: usize,
    /// Decoupled weight decay; 0.0 gives plain Adam
    pub weight_decay: f32,
    /// Hold out this fraction of the corpus tail for validation
    pub val_fraction: Option<f32>,
    /// Optional CSV log file
    pub log_path: Option<PathBuf>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            start_word: String::new(),
            n_gen: 100,
            text_iter_step: 25,
            n_epoch: 1,
            batch_size: 128,
            en_exp_decay: false,
            log_every: 10,
            sample_every: 100,
            weight_decay: 0.0,
            val_fraction: None,
            log_path: None,
        }
    }
}

impl FitOptions {
    pub fn new(start_word: impl Into<String>, n_gen: usize) -> Self {
        Self {
            start_word: start_word.into(),
            n_gen,
            ..Self::default()
        }
    }

    pub fn with_text_iter_step(mut self, step: usize) -> Self {
        self.text_iter_step = step;
        self
    }

    pub fn with_epochs(mut self, n_epoch: usize) -> Self {
        self.n_epoch = n_epoch;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_exp_decay(mut self, enabled: bool) -> Self {
        self.en_exp_decay = enabled;
        self
    }

    pub fn with_log_every(mut self, every: usize) -> Self {
        self.log_every = every;
        self
    }

    pub fn with_sample_every(mut self, every: usize) -> Self {
        self.sample_every = every;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_validation(mut self, val_fraction: f32) -> Self {
        self.val_fraction = Some(val_fraction);
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Reject bad options before any parameter is touched
    pub fn validate(&self) -> Result<()> {
        if self.start_word.is_empty() {
            return Err(YorickError::config("start_word must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(YorickError::config("batch_size must be > 0"));
        }
        if self.text_iter_step == 0 {
            return Err(YorickError::config("text_iter_step must be > 0"));
        }
        if self.n_epoch == 0 {
            return Err(YorickError::config("n_epoch must be > 0"));
        }
        if self.log_every == 0 {
            return Err(YorickError::config("log_every must be > 0"));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(YorickError::config("weight_decay must be finite and >= 0"));
        }
        if let Some(fraction) = self.val_fraction {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(YorickError::config(format!(
                    "val_fraction must be in (0, 1), got {}",
                    fraction
                )));
            }
        }
        Ok(())
    }
}
