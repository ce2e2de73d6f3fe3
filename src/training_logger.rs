//! Training Log
//!
//! What a training run reports back: [`TrainingLog`] is returned from
//! `TextGenerator::fit`, and [`TrainingLogger`] optionally mirrors the
//! progress records into a CSV file while training runs.
//!
//! ## CSV Format
//!
//! - `epoch`: 1-based epoch number
//! - `step`: Global training step
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used for the step
//! - `train_loss`: Mean cross-entropy of the window
//! - `train_perplexity`: exp(train_loss)
//! - `sample`: Greedy sample, when one was drawn at this step
//!
//! Perplexity is the effective number of symbols the model is choosing
//! between: a model guessing uniformly over a 65-symbol vocabulary sits at
//! 65, a perfect one at 1.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// One progress record, emitted every `log_every` steps
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub epoch: usize,
    pub step: usize,
    pub loss: f32,
    pub learning_rate: f32,
}

/// Per-epoch aggregate
///
/// `steps` may be zero when the corpus is too short for a single window;
/// `mean_train_loss` is then `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub steps: usize,
    pub mean_train_loss: Option<f32>,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingLog {
    pub records: Vec<StepRecord>,
    pub epochs: Vec<EpochSummary>,
}

impl TrainingLog {
    /// Steps taken over the whole run
    pub fn total_steps(&self) -> usize {
        self.epochs.iter().map(|e| e.steps).sum()
    }

    pub fn last_loss(&self) -> Option<f32> {
        self.records.last().map(|r| r.loss)
    }
}

/// CSV mirror of the training progress
pub struct TrainingLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(log_path)?);
        writeln!(
            writer,
            "epoch,step,elapsed_seconds,learning_rate,train_loss,train_perplexity,sample"
        )?;
        writer.flush()?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }

    pub fn log(&mut self, record: &StepRecord, sample: Option<&str>) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let sample_escaped = sample.map(|s| s.replace('"', "\"\"")).unwrap_or_default();

        writeln!(
            self.writer,
            "{},{},{:.2},{:.6},{:.4},{:.2},\"{}\"",
            record.epoch,
            record.step,
            elapsed,
            record.learning_rate,
            record.loss,
            record.loss.exp(),
            sample_escaped
        )?;

        // Keep the file current if training dies mid-run
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_csv_rows_and_escaping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut logger = TrainingLogger::new(&path).unwrap();

        let record = StepRecord {
            epoch: 1,
            step: 10,
            loss: 2.0,
            learning_rate: 0.003,
        };
        logger.log(&record, Some("say \"hi\"")).unwrap();
        logger.log(&StepRecord { step: 20, ..record }, None).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,step,"));
        assert!(lines[1].starts_with("1,10,"));
        assert!(lines[1].ends_with("\"say \"\"hi\"\"\""));
        assert!(lines[2].ends_with(",\"\""));
    }

    #[test]
    fn test_total_steps() {
        let log = TrainingLog {
            records: vec![],
            epochs: vec![
                EpochSummary {
                    epoch: 1,
                    steps: 3,
                    mean_train_loss: Some(1.0),
                    val_loss: None,
                    val_accuracy: None,
                },
                EpochSummary {
                    epoch: 2,
                    steps: 4,
                    mean_train_loss: Some(0.5),
                    val_loss: None,
                    val_accuracy: None,
                },
            ],
        };
        assert_eq!(log.total_steps(), 7);
        assert_eq!(log.last_loss(), None);
    }
}
