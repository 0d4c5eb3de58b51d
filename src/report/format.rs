//! Formatted terminal output for a finished run.
//!
//! We keep formatting code in one place so:
//! - the pipeline code stays clean and testable
//! - output changes are localized

use crate::app::pipeline::RunOutput;
use crate::domain::{CombinationResult, NowcastConfig, SelectionMode};
use crate::io::export::SelectionSummaryRow;
use crate::news::{COMBINED, NewsItem};

/// Format the full run summary (settings, lag choices, combined nowcasts).
pub fn format_run_summary(run: &RunOutput, config: &NowcastConfig) -> String {
    let mut out = String::new();

    out.push_str("=== nowcast - MIDAS nowcast combination ===\n");
    out.push_str(&format!("Quarters: {} .. {}\n", config.start, config.end));
    out.push_str(&format!(
        "Selection: {} | max K={} | intercept={} | AR lags={}\n",
        match config.selection {
            SelectionMode::Full => "full",
            SelectionMode::Frozen => "frozen",
        },
        config.max_lag,
        config.intercept,
        config.regressors.ar_lags(),
    ));
    out.push_str(&format!(
        "Scheme: {} | trim={} | coverage={:.0}%\n",
        config.scheme.label(),
        config
            .trim
            .map(|t| format!("{:.0}% by {:?}", t.percentile * 100.0, t.metric))
            .unwrap_or_else(|| "off".to_string()),
        config.coverage * 100.0,
    ));
    out.push_str(&format!("Run directory: {}\n", run.run_dir.display()));

    out.push_str("\nLag selection:\n");
    out.push_str(&format_selection_table(&run.summary));

    out.push_str(&format!("\nNowcasts for {}:\n", run.target_quarter));
    out.push_str(&format_combination_table(&run.combinations));

    let combined_news: Vec<&NewsItem> = run.news.iter().filter(|n| n.component == COMBINED).collect();
    if let Some(total) = combined_news
        .iter()
        .filter_map(|n| n.news)
        .reduce(|a, b| a + b)
    {
        out.push_str(&format!(
            "\nCumulative news over {} revisions: {total:+.4}\n",
            combined_news.len()
        ));
    }

    out
}

/// One line per indicator: chosen K, its BIC and history accuracy.
pub fn format_selection_table(rows: &[SelectionSummaryRow]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<16} {:>4} {:>12} {:>10} {:>10} {:>6} {:<18}\n",
            "indicator", "K", "total_bic", "rmse", "mae", "dir", "status"
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        out.push_str(
            format!(
                "{:<16} {:>4} {:>12} {:>10} {:>10} {:>6} {:<18}\n",
                truncate(&r.indicator, 16),
                r.selected_k.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string()),
                fmt_opt(r.total_bic, 3),
                fmt_opt(r.rmse, 4),
                fmt_opt(r.mae, 4),
                fmt_opt(r.directional_accuracy, 2),
                r.status,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// One line per as-of Friday: point, interval and how many models fed it.
pub fn format_combination_table(results: &[CombinationResult]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<10} {:>10} {:>10} {:>10} {:>8} {:>7}\n",
            "as_of", "point", "lo", "hi", "se", "models"
        )
        .trim_end(),
    );
    out.push('\n');

    for r in results {
        out.push_str(
            format!(
                "{:<10} {:>10} {:>10} {:>10} {:>8} {:>7}\n",
                r.as_of.map(|d| d.to_string()).unwrap_or_default(),
                fmt_opt(r.point, 4),
                fmt_opt(r.lo, 4),
                fmt_opt(r.hi, 4),
                fmt_opt(r.se, 4),
                format!("{}/{}", r.n_models_used, r.n_models_input),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) => format!("{x:.decimals$}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
