use yorick::{
    windows_per_epoch, CharRnn, DecodeStrategy, ExecutionContext, FitOptions, LrSchedule, ModelConfig,
    TextGenerator, TrainingPhase, WindowedBatches, YorickError,
};

fn corpus() -> String {
    "the cat sat on the mat. the dog sat on the log. ".repeat(12)
}

fn options() -> FitOptions {
    FitOptions::new("the", 20)
        .with_batch_size(4)
        .with_text_iter_step(16)
        .with_log_every(1)
        .with_sample_every(0)
}

/// Where a hand-written training loop puts the recurrent state back to zero
#[derive(Clone, Copy, PartialEq)]
enum StateReset {
    EveryEpoch,
    EveryWindow,
    Never,
}

/// Per-step losses of a `train_step` loop over the same windows `options()` uses
fn manual_losses(generator: &TextGenerator, n_epoch: usize, reset: StateReset) -> Vec<f32> {
    let config = generator.config().clone();
    let mut ctx = ExecutionContext::new(config.clone(), generator.vocab().size()).unwrap();
    ctx.initialize().unwrap();
    let schedule = LrSchedule::constant();
    let mut windows = WindowedBatches::new(generator.indexed_corpus(), 4, config.seq_len, 16).unwrap();

    let mut losses = Vec::new();
    let mut step = 0;
    let mut state = ctx.zero_state(4);
    for _ in 0..n_epoch {
        windows.reset();
        if reset != StateReset::Never {
            state = ctx.zero_state(4);
        }
        for window in windows.by_ref() {
            if reset == StateReset::EveryWindow {
                state = ctx.zero_state(4);
            }
            let out = ctx
                .train_step(&window, &state, schedule.learning_rate(step), 0.0, step)
                .unwrap();
            state = out.final_state;
            losses.push(out.loss);
            step += 1;
        }
    }
    losses
}

fn record_losses(generator: &mut TextGenerator, n_epoch: usize) -> Vec<f32> {
    let log = generator.fit(&options().with_epochs(n_epoch)).unwrap();
    log.records.iter().map(|r| r.loss).collect()
}

#[test]
fn test_fit_carries_state_between_windows() {
    let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    let fitted = record_losses(&mut generator, 1);

    let carried = manual_losses(&generator, 1, StateReset::EveryEpoch);
    let reset = manual_losses(&generator, 1, StateReset::EveryWindow);
    assert_eq!(fitted.len(), windows_per_epoch(corpus().chars().count(), 4, 8, 16));
    assert_eq!(fitted, carried);
    assert_ne!(fitted, reset);
    // The first window starts from zeros either way
    assert_eq!(fitted[0], reset[0]);
}

#[test]
fn test_fit_resets_state_each_epoch() {
    let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    let fitted = record_losses(&mut generator, 2);

    let per_epoch = manual_losses(&generator, 2, StateReset::EveryEpoch);
    let never = manual_losses(&generator, 2, StateReset::Never);
    let n_batch = fitted.len() / 2;
    assert_eq!(fitted, per_epoch);
    assert_ne!(fitted, never);
    // Both loops agree until the second epoch begins
    assert_eq!(fitted[..n_batch], never[..n_batch]);
}

#[test]
fn test_fit_then_infer() {
    let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    let log = generator.fit(&options().with_epochs(2)).unwrap();

    let n_batch = windows_per_epoch(corpus().chars().count(), 4, 8, 16);
    assert!(n_batch > 0);
    assert_eq!(log.epochs.len(), 2);
    assert_eq!(log.total_steps(), 2 * n_batch);
    assert_eq!(log.records.len(), 2 * n_batch);
    assert!(log.records.iter().all(|r| r.loss.is_finite()));
    assert_eq!(generator.phase(), TrainingPhase::Done);

    let out = generator.infer("the ", 25).unwrap();
    assert!(out.starts_with("the "));
    assert_eq!(out.chars().count(), 29);
    assert_eq!(generator.infer("the", 0).unwrap(), "the");
}

#[test]
fn test_loss_falls_over_training() {
    let config = ModelConfig {
        dropout_rate: 0.0,
        ..ModelConfig::tiny()
    };
    let mut generator = TextGenerator::new(&corpus(), config).unwrap();
    let log = generator.fit(&options().with_epochs(8)).unwrap();
    let first = log.epochs.first().unwrap().mean_train_loss.unwrap();
    let last = log.epochs.last().unwrap().mean_train_loss.unwrap();
    assert!(last < first, "loss went from {} to {}", first, last);
}

#[test]
fn test_equal_seeds_train_identically() {
    let run = || {
        let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
        let log = generator.fit(&options().with_exp_decay(true)).unwrap();
        (log, generator.infer("the", 30).unwrap())
    };
    let (log_a, text_a) = run();
    let (log_b, text_b) = run();
    assert_eq!(log_a.records, log_b.records);
    assert_eq!(text_a, text_b);
}

#[test]
fn test_decay_schedule_in_records() {
    let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    let log = generator.fit(&options().with_exp_decay(true)).unwrap();
    let first = &log.records[0];
    assert!((first.learning_rate - 0.003).abs() < 1e-7);
    assert!(log
        .records
        .windows(2)
        .all(|w| w[1].learning_rate < w[0].learning_rate));
    assert!(log.records.iter().all(|r| r.learning_rate >= 0.0001));
}

#[test]
fn test_short_corpus_epoch_is_noop() {
    let mut generator = TextGenerator::new("abcdefg", ModelConfig::tiny()).unwrap();
    let log = generator.fit(&FitOptions::new("ab", 3).with_batch_size(2)).unwrap();
    assert_eq!(log.epochs.len(), 1);
    assert_eq!(log.epochs[0].steps, 0);
    assert_eq!(log.epochs[0].mean_train_loss, None);
    assert!(log.records.is_empty());
    assert!(generator.context().is_initialized());
    assert_eq!(generator.context().steps_taken(), 0);
}

#[test]
fn test_empty_epoch_logs_compare_equal() {
    let run = || {
        let mut generator = TextGenerator::new("abcdefg", ModelConfig::tiny()).unwrap();
        generator
            .fit(&FitOptions::new("ab", 3).with_batch_size(2).with_epochs(2))
            .unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_short_corpus_with_decay_is_config_error() {
    let mut generator = TextGenerator::new("abcdefg", ModelConfig::tiny()).unwrap();
    let err = generator
        .fit(&FitOptions::new("ab", 3).with_batch_size(2).with_exp_decay(true))
        .unwrap_err();
    assert!(matches!(err, YorickError::Config(_)));
    assert!(!generator.context().is_initialized());
}

#[test]
fn test_validation_summary() {
    let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    let log = generator.fit(&options().with_validation(0.3)).unwrap();
    let epoch = &log.epochs[0];
    let val_loss = epoch.val_loss.unwrap();
    let val_acc = epoch.val_accuracy.unwrap();
    assert!(val_loss.is_finite() && val_loss > 0.0);
    assert!((0.0..=1.0).contains(&val_acc));

    let mut plain = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    let log = plain.fit(&options()).unwrap();
    assert_eq!(log.epochs[0].val_loss, None);
    assert_eq!(log.epochs[0].val_accuracy, None);
}

#[test]
fn test_zeroed_model_decodes_first_symbol() {
    let text = corpus();
    let config = ModelConfig::tiny();
    let mut generator = TextGenerator::new(&text, config.clone()).unwrap();
    let vocab_size = generator.vocab().size();
    generator
        .initialize_with(CharRnn::zeroed(&config, vocab_size))
        .unwrap();

    let first = generator.vocab().symbol(0).unwrap();
    let out = generator.infer("cat", 6).unwrap();
    let expected: String = std::iter::once("cat".to_string())
        .chain(std::iter::repeat(first.to_string()).take(6))
        .collect();
    assert_eq!(out, expected);
}

#[test]
fn test_decoder_errors() {
    let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    generator.initialize().unwrap();
    assert!(matches!(
        generator.infer("the zebra", 5),
        Err(YorickError::UnknownSymbol('z'))
    ));
    assert!(matches!(generator.infer("", 5), Err(YorickError::Config(_))));
    assert!(matches!(
        generator.infer_with("the", 5, DecodeStrategy::TemperatureSample(-1.0)),
        Err(YorickError::Config(_))
    ));
}

#[test]
fn test_csv_log_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.csv");
    let mut generator = TextGenerator::new(&corpus(), ModelConfig::tiny()).unwrap();
    let log = generator
        .fit(&options().with_sample_every(2).with_log_path(&path))
        .unwrap();
    let csv = std::fs::read_to_string(&path).unwrap();
    // header + one row per record (sample steps are a subset of record steps)
    assert_eq!(csv.lines().count(), 1 + log.records.len());
}
