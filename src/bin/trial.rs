//! Encoder/decoder trial binary.
//!
//! Trains a rate network read out by a linear decoder on a synthetic
//! regression problem, `y = sin(π (0.8 x₀ + 0.6 x₁))` over inputs uniform in
//! [-1, 1]². Several seeded trials may run in parallel; each prints one JSON
//! summary line on stdout.

use clap::{Parser, ValueEnum};
use encoder_bench::data::{split_fractions, ArrayDataset, FnDataset};
use encoder_bench::network::{RateNetwork, TanhActivation};
use encoder_bench::optim::{Adam, Sgd};
use encoder_bench::rules::{BackpropEncoder, DeltaRule, LstsqDecoder};
use encoder_bench::{
    print_json_progress, run_single_trial, Collaborators, Dataset, DecoderLearningRule, Optimizer,
    Result, TrialConfig, TrialError, TrialResult,
};
use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde_json::{json, Value};
use std::f64::consts::PI;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DecoderKind {
    /// Regularized least squares over the whole epoch
    Lstsq,
    /// Gradient of the squared error
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EncoderKind {
    /// Fixed encoders
    None,
    /// Backpropagation into W, gain and bias
    Backprop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OptimizerKind {
    Sgd,
    Adam,
}

#[derive(Parser, Debug)]
#[command(name = "trial", about = "Run encoder/decoder learning trials on a synthetic task")]
struct Args {
    /// JSON file with trial settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Mini-batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Samples per epoch
    #[arg(long)]
    epoch_size: Option<usize>,

    /// Do not shuffle mini-batches
    #[arg(long)]
    sequential: bool,

    /// Also report the error on the test partition
    #[arg(long)]
    test: bool,

    /// Draw fresh samples every epoch instead of using a fixed pool
    #[arg(long)]
    streaming: bool,

    /// Size of the fixed sample pool (60% training, 20% validation)
    #[arg(long, default_value_t = 1000)]
    n_samples: usize,

    /// Hidden layer size
    #[arg(long, default_value_t = 50)]
    hidden_size: usize,

    /// Size of a second tanh layer between network and decoder
    #[arg(long)]
    passthrough_size: Option<usize>,

    #[arg(long, value_enum, default_value_t = DecoderKind::Lstsq)]
    decoder: DecoderKind,

    #[arg(long, value_enum, default_value_t = EncoderKind::None)]
    encoder: EncoderKind,

    #[arg(long, value_enum, default_value_t = OptimizerKind::Adam)]
    optimizer: OptimizerKind,

    /// Learning rate (default depends on the optimizer)
    #[arg(long)]
    lr: Option<f64>,

    /// Number of independent trials, run in parallel
    #[arg(long, default_value_t = 1)]
    trials: usize,

    /// Seed of the first trial; trial i uses seed + i
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Print progress as JSON events
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}

fn load_config(args: &Args) -> std::result::Result<TrialConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("cannot parse {}: {e}", path.display()))?
        }
        None => TrialConfig {
            n_epochs: 100,
            batch_size: 32,
            ..TrialConfig::default()
        },
    };
    if let Some(n) = args.epochs {
        config.n_epochs = n;
    }
    if let Some(n) = args.batch_size {
        config.batch_size = n;
    }
    if args.epoch_size.is_some() {
        config.epoch_size = args.epoch_size;
    }
    config.sequential |= args.sequential;
    config.compute_test_error |= args.test;
    Ok(config)
}

fn target(xs: &Array2<f64>) -> Array2<f64> {
    let proj = &xs.column(0) * 0.8 + &xs.column(1) * 0.6;
    proj.mapv(|v| (PI * v).sin()).insert_axis(Axis(1))
}

fn build_dataset(args: &Args, seed: u64) -> Result<Box<dyn Dataset>> {
    if args.streaming {
        return Ok(Box::new(FnDataset::uniform(2, 1, target, seed)));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let xs = Array2::random_using((args.n_samples, 2), Uniform::new(-1.0, 1.0), &mut rng);
    let ys = target(&xs);
    let (n_trn, n_val) = split_fractions(args.n_samples, 0.6, 0.2);
    Ok(Box::new(ArrayDataset::from_split(&xs, &ys, n_trn, n_val, seed)?))
}

fn run(args: &Args, config: &TrialConfig, seed: u64) -> Result<TrialResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dataset = build_dataset(args, seed)?;
    let mut network = RateNetwork::new(2, args.hidden_size, Box::new(TanhActivation), &mut rng)?;
    let passthrough = args
        .passthrough_size
        .map(|n| RateNetwork::new(args.hidden_size, n, Box::new(TanhActivation), &mut rng))
        .transpose()?;

    let mut lstsq = LstsqDecoder::default();
    let mut delta = DeltaRule;
    let decoder: &mut dyn DecoderLearningRule = match args.decoder {
        DecoderKind::Lstsq => &mut lstsq,
        DecoderKind::Delta => &mut delta,
    };

    let mut sgd = Sgd::new(args.lr.unwrap_or(1e-2), 0.9);
    let mut adam = Adam::default_params(args.lr.unwrap_or(1e-3));
    let optimizer: &mut dyn Optimizer = match args.optimizer {
        OptimizerKind::Sgd => &mut sgd,
        OptimizerKind::Adam => &mut adam,
    };

    let mut backprop = BackpropEncoder;
    let mut collaborators =
        Collaborators::new(optimizer, dataset.as_mut(), &mut network, decoder, &mut rng);
    if args.encoder == EncoderKind::Backprop {
        collaborators = collaborators.with_encoder(&mut backprop);
    }
    if let Some(pt) = passthrough.as_ref() {
        collaborators = collaborators.with_passthrough(pt);
    }
    // Interleaved status lines are unreadable
    if args.trials > 1 {
        collaborators = collaborators.without_progress();
    } else if args.json {
        collaborators = collaborators.with_progress(print_json_progress);
    }

    run_single_trial(config, collaborators)
}

fn summary(seed: u64, outcome: &Result<TrialResult>) -> Value {
    match outcome {
        Ok(result) => {
            let mut record = result.to_json();
            record["type"] = json!("result");
            record["seed"] = json!(seed);
            record
        }
        Err(TrialError::Aborted(report)) => json!({
            "type": "aborted",
            "seed": seed,
            "epoch": report.epoch,
            "fault": report.fault.to_string(),
            "errs_training": report.errs_training,
            "errs_validation": report.errs_validation,
            "err_test": report.err_test,
        }),
        Err(err) => json!({
            "type": "error",
            "seed": seed,
            "error": err.to_string(),
        }),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::FAILURE;
        }
    };
    info!(?config, trials = args.trials, "running trials");

    let outcomes: Vec<(u64, Result<TrialResult>)> = (0..args.trials as u64)
        .into_par_iter()
        .map(|i| {
            let seed = args.seed + i;
            (seed, run(&args, &config, seed))
        })
        .collect();

    let mut failed = false;
    for (seed, outcome) in &outcomes {
        if let Err(err) = outcome {
            warn!(seed, %err, "trial failed");
            failed = true;
        }
        println!("{}", summary(*seed, outcome));
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
