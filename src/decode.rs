//! Autoregressive Decoder
//!
//! Extends a seed string one symbol at a time:
//!
//! ```text
//! 1. state = zeros, batch 1
//! 2. feed seed[0 .. len-1] one symbol per step   (warm-up, outputs ignored)
//! 3. current = last seed symbol
//! 4. repeat n_gen times:
//!        logits, state = step(current, state)
//!        next = select(softmax(logits))
//!        append next; current = next
//! ```
//!
//! The decoder only reads parameters. Greedy selection (argmax, first index
//! wins ties) is the default, fully deterministic and needs no RNG;
//! temperature sampling draws from `softmax(logits / T)` with a
//! caller-supplied one.

use crate::context::ExecutionContext;
use crate::error::{Result, YorickError};
use crate::tensor::Tensor;
use crate::vocab::Vocabulary;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum DecodeStrategy {
    #[default]
    Greedy,
    /// Sample from the softmax at this temperature (> 0)
    TemperatureSample(f32),
}

impl DecodeStrategy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            DecodeStrategy::Greedy => Ok(()),
            DecodeStrategy::TemperatureSample(t) if t.is_finite() && t > 0.0 => Ok(()),
            DecodeStrategy::TemperatureSample(t) => Err(YorickError::config(format!(
                "temperature must be finite and > 0, got {}",
                t
            ))),
        }
    }

    /// Pick the next symbol index from one row of logits
    fn select<R: Rng>(&self, logits: &Tensor, rng: Option<&mut R>) -> Result<usize> {
        match (*self, rng) {
            (DecodeStrategy::Greedy, _) => Ok(logits.softmax_rows().argmax_rows()[0]),
            (DecodeStrategy::TemperatureSample(t), Some(rng)) => {
                let probs = logits.mul_scalar(1.0 / t).softmax_rows();
                Ok(sample_from_probs(&probs.data, rng))
            }
            (DecodeStrategy::TemperatureSample(_), None) => {
                Err(YorickError::config("temperature sampling needs an RNG"))
            }
        }
    }
}

/// Inverse-CDF draw; falls back to the last index on rounding shortfall
fn sample_from_probs(probs: &[f32], rng: &mut impl Rng) -> usize {
    let r: f32 = rng.gen();
    let mut cumsum = 0.0;
    for (idx, &p) in probs.iter().enumerate() {
        cumsum += p;
        if r < cumsum {
            return idx;
        }
    }
    probs.len() - 1
}

/// Generate `n_gen` symbols after `seed`
///
/// Returns the seed followed by exactly `n_gen` generated symbols. An empty
/// seed is a configuration error; a seed symbol missing from the vocabulary
/// is [`YorickError::UnknownSymbol`]. `rng` is only read by
/// [`DecodeStrategy::TemperatureSample`], which rejects `None`.
pub fn decode<R: Rng>(
    ctx: &ExecutionContext,
    vocab: &Vocabulary,
    seed: &str,
    n_gen: usize,
    strategy: DecodeStrategy,
    mut rng: Option<&mut R>,
) -> Result<String> {
    strategy.validate()?;
    let seed_ids = vocab.encode(seed)?;
    let Some((&last, warmup)) = seed_ids.split_last() else {
        return Err(YorickError::config("seed text must not be empty"));
    };
    // Parameters must exist even when nothing is generated
    ctx.model()?;

    let mut output = String::from(seed);
    if n_gen == 0 {
        return Ok(output);
    }

    let mut state = ctx.zero_state(1);
    for &id in warmup {
        let (_, next_state) = ctx.predict(&[id], &state)?;
        state = next_state;
    }

    let mut current = last;
    for _ in 0..n_gen {
        let (logits, next_state) = ctx.predict(&[current], &state)?;
        state = next_state;
        current = strategy.select(&logits, rng.as_deref_mut())?;
        let symbol = vocab.symbol(current).ok_or_else(|| {
            YorickError::config(format!("decoded index {} outside vocabulary", current))
        })?;
        output.push(symbol);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CharRnn, ModelConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ready_context(vocab: &Vocabulary) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(ModelConfig::tiny(), vocab.size()).unwrap();
        ctx.initialize().unwrap();
        ctx
    }

    #[test]
    fn test_output_length() {
        let vocab = Vocabulary::build("hello world").unwrap();
        let ctx = ready_context(&vocab);
        let mut rng = StdRng::seed_from_u64(0);
        for n_gen in [0, 1, 7] {
            let out = decode(&ctx, &vocab, "hel", n_gen, DecodeStrategy::Greedy, Some(&mut rng)).unwrap();
            assert!(out.starts_with("hel"));
            assert_eq!(out.chars().count(), 3 + n_gen);
        }
    }

    #[test]
    fn test_zero_parameters_repeat_first_symbol() {
        let vocab = Vocabulary::build("cab").unwrap();
        let config = ModelConfig::tiny();
        let mut ctx = ExecutionContext::new(config.clone(), vocab.size()).unwrap();
        ctx.initialize_with(CharRnn::zeroed(&config, vocab.size())).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let out = decode(&ctx, &vocab, "b", 3, DecodeStrategy::Greedy, Some(&mut rng)).unwrap();
        assert_eq!(out, "baaa");
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let vocab = Vocabulary::build("the quick brown fox").unwrap();
        let ctx = ready_context(&vocab);
        let a = decode(&ctx, &vocab, "th", 12, DecodeStrategy::Greedy, Some(&mut StdRng::seed_from_u64(1))).unwrap();
        let b = decode(&ctx, &vocab, "th", 12, DecodeStrategy::Greedy, Some(&mut StdRng::seed_from_u64(2))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_greedy_without_rng() {
        let vocab = Vocabulary::build("the quick brown fox").unwrap();
        let ctx = ready_context(&vocab);
        let seeded = decode(&ctx, &vocab, "qu", 9, DecodeStrategy::Greedy, Some(&mut StdRng::seed_from_u64(4))).unwrap();
        let unseeded = decode(&ctx, &vocab, "qu", 9, DecodeStrategy::Greedy, None::<&mut StdRng>).unwrap();
        assert_eq!(seeded, unseeded);

        assert!(matches!(
            decode(&ctx, &vocab, "qu", 9, DecodeStrategy::TemperatureSample(1.0), None::<&mut StdRng>),
            Err(YorickError::Config(_))
        ));
    }

    #[test]
    fn test_bad_inputs() {
        let vocab = Vocabulary::build("abc").unwrap();
        let ctx = ready_context(&vocab);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            decode(&ctx, &vocab, "", 5, DecodeStrategy::Greedy, Some(&mut rng)),
            Err(YorickError::Config(_))
        ));
        assert!(matches!(
            decode(&ctx, &vocab, "abz", 5, DecodeStrategy::Greedy, Some(&mut rng)),
            Err(YorickError::UnknownSymbol('z'))
        ));
        assert!(matches!(
            decode(&ctx, &vocab, "a", 5, DecodeStrategy::TemperatureSample(0.0), Some(&mut rng)),
            Err(YorickError::Config(_))
        ));
    }

    #[test]
    fn test_sample_from_probs() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            assert_eq!(sample_from_probs(&[0.0, 1.0, 0.0], &mut rng), 1);
        }
    }

    #[test]
    fn test_temperature_sampling_stays_in_vocab() {
        let vocab = Vocabulary::build("abcdef").unwrap();
        let ctx = ready_context(&vocab);
        let mut rng = StdRng::seed_from_u64(3);
        let out = decode(&ctx, &vocab, "ab", 20, DecodeStrategy::TemperatureSample(1.5), Some(&mut rng)).unwrap();
        assert_eq!(out.chars().count(), 22);
        assert!(out.chars().all(|c| vocab.index_of(c).is_ok()));
    }
}
