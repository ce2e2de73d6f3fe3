//! Train a character model on a text file and generate from it
//!
//! ## Usage
//!
//! ```bash
//! # Quick run with defaults (small model, one epoch)
//! cargo run --release --example generate -- --data shakespeare.txt --start "ROMEO:"
//!
//! # Longer run with learning-rate decay and sampled output
//! cargo run --release --example generate -- --data shakespeare.txt \
//!     --epochs 5 --decay --temperature 0.8 --n-gen 500
//!
//! # Model shape from a JSON file (missing fields take defaults)
//! cargo run --release --example generate -- --data shakespeare.txt --config model.json
//! ```
//!
//! Progress is logged through `tracing`; set `RUST_LOG=yorick=debug` to see
//! the periodic samples as well.
//!
//! ## Prerequisites
//!
//! ```bash
//! curl -o shakespeare.txt https://www.gutenberg.org/files/100/100-0.txt
//! ```

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use yorick::{DecodeStrategy, FitOptions, ModelConfig, TextGenerator};

#[derive(Parser)]
#[command(
    name = "generate",
    about = "Train a character-level LSTM and generate text"
)]
struct Args {
    /// Training corpus
    #[arg(long, default_value = "shakespeare.txt")]
    data: PathBuf,

    /// Model configuration JSON (defaults to the small preset)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    epochs: usize,

    #[arg(long, default_value_t = 128)]
    batch_size: usize,

    /// Override the configured sequence length
    #[arg(long)]
    seq_len: Option<usize>,

    /// Offset advance between training windows
    #[arg(long, default_value_t = 25)]
    stride: usize,

    /// Decay the learning rate from 0.003 to 0.0001 over the run
    #[arg(long)]
    decay: bool,

    /// Seed text for samples and the final generation
    #[arg(long, default_value = "The ")]
    start: String,

    #[arg(long, default_value_t = 300)]
    n_gen: usize,

    /// Sample at this temperature instead of greedy decoding
    #[arg(long)]
    temperature: Option<f32>,

    /// Write a CSV training log here
    #[arg(long)]
    log: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("yorick=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ModelConfig::from_json_file(path)?,
        None => ModelConfig::small(),
    };
    if let Some(seq_len) = args.seq_len {
        config.seq_len = seq_len;
    }

    let text = fs::read_to_string(&args.data)?;
    println!(
        "Loaded corpus: {} characters from {}",
        text.chars().count(),
        args.data.display()
    );

    let mut generator = TextGenerator::new(&text, config)?;
    println!("Vocabulary: {} symbols", generator.vocab().size());

    let mut options = FitOptions::new(args.start.clone(), args.n_gen)
        .with_epochs(args.epochs)
        .with_batch_size(args.batch_size)
        .with_text_iter_step(args.stride)
        .with_exp_decay(args.decay);
    if let Some(path) = args.log {
        options = options.with_log_path(path);
    }

    let log = generator.fit(&options)?;
    for epoch in &log.epochs {
        match epoch.mean_train_loss {
            Some(loss) => println!("epoch {}: {} steps, mean loss {:.4}", epoch.epoch, epoch.steps, loss),
            None => println!("epoch {}: no training windows", epoch.epoch),
        }
    }

    let strategy = match args.temperature {
        Some(t) => DecodeStrategy::TemperatureSample(t),
        None => DecodeStrategy::Greedy,
    };
    let generated = generator.infer_with(&args.start, args.n_gen, strategy)?;

    println!("\n{}", "=".repeat(70));
    println!("{}", generated);
    println!("{}", "=".repeat(70));

    Ok(())
}
