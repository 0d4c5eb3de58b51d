//! Command-line parsing for the nowcasting engine.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::{Quarter, SelectionMode, Transform, TrimMetric};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "nowcast", version, about = "Pseudo-real-time MIDAS nowcasting with forecast combination")]
pub struct Cli {
    /// Log filter (e.g. `info`, `debug`, `midas_nowcast=trace`). `RUST_LOG` wins when set.
    #[arg(long, global = true, env = "NOWCAST_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build vintages, select lags, nowcast and combine over a quarter range.
    Run(RunArgs),
    /// Write a synthetic monthly/quarterly/calendar input triple.
    Synth(SynthArgs),
}

/// Weighting scheme names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemeArg {
    Equal,
    InverseBic,
    InverseRmse,
    BicLikelihood,
    InverseMseShrinkage,
    PerformanceRank,
    Thick,
    Adaptive,
    RegressionBased,
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// First target quarter (e.g. 2015Q1).
    #[arg(long)]
    pub start: Quarter,

    /// Last target quarter; the combination is reported for this quarter.
    #[arg(long)]
    pub end: Quarter,

    /// Wide monthly CSV: `date` + one column per indicator.
    #[arg(long, value_name = "CSV")]
    pub monthly: PathBuf,

    /// Quarterly target CSV: `date`, `value` (+ optional `quarter`).
    #[arg(long, value_name = "CSV")]
    pub quarterly: PathBuf,

    /// Release calendar CSV: `indicator`, `lag_days` (+ optional `transform`).
    #[arg(long, value_name = "CSV")]
    pub calendar: Option<PathBuf>,

    /// Directory that receives the `run-<timestamp>` folder.
    #[arg(long, env = "NOWCAST_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,

    /// Largest lag count K in the BIC search.
    #[arg(long, default_value_t = 12)]
    pub max_lag: usize,

    /// Publication lag for indicators missing from the calendar.
    #[arg(long, default_value_t = 0)]
    pub default_lag_days: i64,

    /// Days after quarter end before the target value is published.
    #[arg(long, default_value_t = 25)]
    pub target_lag_days: i64,

    /// Lagged quarterly targets as extra regressors (0 = ragged-edge lags only).
    #[arg(long, default_value_t = 0)]
    pub ar_lags: usize,

    /// Fit without an intercept.
    #[arg(long)]
    pub no_intercept: bool,

    /// Select once over the whole window, or re-select and freeze per quarter.
    #[arg(long, value_enum, default_value_t = SelectionMode::Full)]
    pub selection: SelectionMode,

    /// Combination weighting scheme.
    #[arg(long, value_enum, default_value_t = SchemeArg::InverseRmse)]
    pub scheme: SchemeArg,

    /// Shrinkage toward equal weights for `inverse-mse-shrinkage`.
    #[arg(long, default_value_t = 0.2)]
    pub shrinkage: f64,

    /// Number of models kept by `thick`.
    #[arg(long, default_value_t = 5)]
    pub thick_top: usize,

    /// Trailing quarters scored by `adaptive` (default 4) and `regression-based` (default 8).
    #[arg(long)]
    pub scheme_window: Option<usize>,

    /// Share of models trimmed from the bad tail before weighting (e.g. 0.25).
    #[arg(long)]
    pub trim_percentile: Option<f64>,

    /// Metric used for trimming.
    #[arg(long, value_enum, default_value_t = TrimMetric::Rmse)]
    pub trim_metric: TrimMetric,

    /// Central coverage of the combined interval.
    #[arg(long, default_value_t = 0.95)]
    pub coverage: f64,

    /// Accuracy metrics over the last N quarters only (all history when omitted).
    #[arg(long)]
    pub metric_window: Option<usize>,

    /// Per-indicator time budget for lag selection, in seconds.
    #[arg(long)]
    pub indicator_timeout_secs: Option<u64>,

    /// Worker threads (defaults to the number of CPUs).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Transformation applied to the quarterly target before modeling.
    #[arg(long, value_enum, default_value_t = Transform::None)]
    pub target_transform: Transform,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Directory for `monthly.csv`, `quarterly.csv` and `calendar.csv`.
    #[arg(long, env = "NOWCAST_OUT_DIR", default_value = "demo")]
    pub out_dir: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// First calendar year of the generated data.
    #[arg(long, default_value_t = 2010)]
    pub start_year: i32,

    /// Number of years to generate.
    #[arg(long, default_value_t = 12)]
    pub years: u32,

    /// Number of monthly indicators.
    #[arg(long, default_value_t = 6)]
    pub indicators: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_parse_with_defaults() {
        let cli = Cli::try_parse_from([
            "nowcast", "run", "--start", "2015Q1", "--end", "2019-Q4", "--monthly", "m.csv",
            "--quarterly", "q.csv", "--scheme", "bic-likelihood", "--selection", "frozen",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.start, Quarter::new(2015, 1).unwrap());
        assert_eq!(args.end, Quarter::new(2019, 4).unwrap());
        assert_eq!(args.scheme, SchemeArg::BicLikelihood);
        assert_eq!(args.selection, SelectionMode::Frozen);
        assert_eq!(args.max_lag, 12);
        assert_eq!(args.trim_percentile, None);
    }

    #[test]
    fn bad_quarter_is_rejected() {
        let res = Cli::try_parse_from([
            "nowcast", "run", "--start", "2015Q5", "--end", "2019Q4", "--monthly", "m.csv",
            "--quarterly", "q.csv",
        ]);
        assert!(res.is_err());
    }
}
