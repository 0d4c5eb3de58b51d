//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - initializes logging
//! - runs the nowcasting pipeline or the synthetic data generator
//! - prints the terminal summary

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, RunArgs, SchemeArg, SynthArgs};
use crate::data::{SynthConfig, generate, write_csvs};
use crate::domain::{NowcastConfig, RegressorMode, TrimConfig, WeightScheme};
use crate::error::{AppError, EXIT_INTERNAL};

pub mod pipeline;

/// Entry point for the `nowcast` binary.
pub fn run() -> Result<(), AppError> {
    // Environment defaults (`NOWCAST_OUT_DIR`, `NOWCAST_LOG`) may come from `.env`.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (e.g. in tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to configure thread pool: {e}")))?;
    }

    let config = nowcast_config_from_args(&args)?;
    let run = pipeline::run_nowcast(&config)?;

    println!("{}", crate::report::format_run_summary(&run, &config));
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = SynthConfig {
        seed: args.seed,
        start_year: args.start_year,
        years: args.years,
        indicators: args.indicators,
    };
    let data = generate(&config)?;
    let files = write_csvs(&data, &args.out_dir)?;
    info!(dir = %args.out_dir.display(), indicators = data.monthly.len(), "synthetic data written");

    println!("monthly:   {}", files.monthly.display());
    println!("quarterly: {}", files.quarterly.display());
    println!("calendar:  {}", files.calendar.display());
    Ok(())
}

const ADAPTIVE_WINDOW: usize = 4;
const REGRESSION_WINDOW: usize = 8;

fn scheme_window(args: &RunArgs, default: usize) -> Result<usize, AppError> {
    match args.scheme_window {
        Some(0) => Err(AppError::config("`--scheme-window` must be at least 1.")),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

pub fn nowcast_config_from_args(args: &RunArgs) -> Result<NowcastConfig, AppError> {
    let scheme = match args.scheme {
        SchemeArg::Equal => WeightScheme::Equal,
        SchemeArg::InverseBic => WeightScheme::InverseBic,
        SchemeArg::InverseRmse => WeightScheme::InverseRmse,
        SchemeArg::BicLikelihood => WeightScheme::BicLikelihood,
        SchemeArg::InverseMseShrinkage => {
            if !(0.0..=1.0).contains(&args.shrinkage) {
                return Err(AppError::config("`--shrinkage` must be in [0, 1]."));
            }
            WeightScheme::InverseMseShrinkage {
                lambda: args.shrinkage,
            }
        }
        SchemeArg::PerformanceRank => WeightScheme::PerformanceRank,
        SchemeArg::Thick => {
            if args.thick_top == 0 {
                return Err(AppError::config("`--thick-top` must be at least 1."));
            }
            WeightScheme::Thick {
                top_n: args.thick_top,
            }
        }
        SchemeArg::Adaptive => WeightScheme::Adaptive {
            window: scheme_window(args, ADAPTIVE_WINDOW)?,
        },
        SchemeArg::RegressionBased => WeightScheme::RegressionBased {
            window: scheme_window(args, REGRESSION_WINDOW)?,
        },
    };

    let regressors = if args.ar_lags == 0 {
        RegressorMode::Ragged
    } else {
        RegressorMode::Autoregressive {
            ar_lags: args.ar_lags,
        }
    };

    let config = NowcastConfig {
        start: args.start,
        end: args.end,
        monthly_path: args.monthly.clone(),
        quarterly_path: args.quarterly.clone(),
        calendar_path: args.calendar.clone(),
        out_dir: args.out_dir.clone(),

        default_lag_days: args.default_lag_days,
        target_lag_days: args.target_lag_days,
        max_lag: args.max_lag,
        intercept: !args.no_intercept,
        regressors,
        selection: args.selection,
        target_transform: args.target_transform,

        scheme,
        trim: args.trim_percentile.map(|percentile| TrimConfig {
            percentile,
            metric: args.trim_metric,
        }),
        coverage: args.coverage,
        metric_window: args.metric_window,

        indicator_timeout_secs: args.indicator_timeout_secs,
    };
    pipeline::validate_config(&config)?;
    Ok(config)
}
