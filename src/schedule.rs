//! Learning-Rate Schedule
//!
//! Either a fixed rate, or exponential decay from `max_lr` to `min_lr` over
//! the whole run:
//!
//! ```text
//! decay_rate = ln(min_lr / max_lr) / (-total_steps)
//! lr(step)   = max_lr * exp(-decay_rate * step)
//! ```
//!
//! so `lr(0) = max_lr` and `lr(total_steps) = min_lr`. A decaying schedule
//! needs `total_steps > 0`; building one without steps is a configuration
//! error instead of a silently flat schedule.

use crate::error::{Result, YorickError};

pub const DEFAULT_MAX_LR: f32 = 0.003;
pub const DEFAULT_MIN_LR: f32 = 0.0001;
pub const DEFAULT_CONSTANT_LR: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LrSchedule {
    Constant(f32),
    ExponentialDecay {
        max_lr: f32,
        min_lr: f32,
        total_steps: usize,
    },
}

impl LrSchedule {
    /// Fixed 0.001, used when decay is disabled
    pub fn constant() -> Self {
        LrSchedule::Constant(DEFAULT_CONSTANT_LR)
    }

    /// Decay from 0.003 to 0.0001 over `total_steps`
    pub fn exponential(total_steps: usize) -> Result<Self> {
        Self::exponential_between(DEFAULT_MAX_LR, DEFAULT_MIN_LR, total_steps)
    }

    pub fn exponential_between(max_lr: f32, min_lr: f32, total_steps: usize) -> Result<Self> {
        if total_steps == 0 {
            return Err(YorickError::config(
                "exponential decay needs total_steps > 0",
            ));
        }
        if !(max_lr > 0.0 && min_lr > 0.0 && max_lr.is_finite() && min_lr.is_finite()) {
            return Err(YorickError::config(format!(
                "learning rates must be positive and finite (max {}, min {})",
                max_lr, min_lr
            )));
        }
        Ok(LrSchedule::ExponentialDecay {
            max_lr,
            min_lr,
            total_steps,
        })
    }

    /// Pick the schedule a `fit` call asks for
    pub fn for_run(en_exp_decay: bool, total_steps: usize) -> Result<Self> {
        if en_exp_decay {
            Self::exponential(total_steps)
        } else {
            Ok(Self::constant())
        }
    }

    /// Learning rate at `current_step` (0-based global step)
    pub fn learning_rate(&self, current_step: usize) -> f32 {
        match *self {
            LrSchedule::Constant(lr) => lr,
            LrSchedule::ExponentialDecay {
                max_lr,
                min_lr,
                total_steps,
            } => {
                let decay_rate = (min_lr as f64 / max_lr as f64).ln() / -(total_steps as f64);
                (max_lr as f64 * (-decay_rate * current_step as f64).exp()) as f32
            }
        }
    }
}
