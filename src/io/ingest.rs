//! CSV ingest for the monthly panel, the quarterly target and the release calendar.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **No computation here**: transforms and vintages happen downstream

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{info, warn};

use crate::calendar::MAX_LAG_DAYS;
use crate::domain::{Month, Quarter, ReleaseCalendarEntry, Transform};
use crate::error::{AppError, EXIT_NO_DATA};
use crate::features::{MonthlySeries, QuarterlySeries};

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct MonthlyTable {
    pub series: BTreeMap<String, MonthlySeries>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

#[derive(Debug, Clone, Default)]
pub struct QuarterlyTable {
    pub series: QuarterlySeries,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CalendarTable {
    pub entries: Vec<ReleaseCalendarEntry>,
    pub row_errors: Vec<RowError>,
}

pub fn load_monthly(path: &Path) -> Result<MonthlyTable, AppError> {
    let table = read_monthly(open(path, "monthly")?)?;
    report("monthly", path, table.rows_read, &table.row_errors);
    if table.series.values().all(MonthlySeries::is_empty) {
        return Err(AppError::new(
            EXIT_NO_DATA,
            format!("Monthly CSV '{}' contains no usable observations.", path.display()),
        ));
    }
    Ok(table)
}

pub fn load_quarterly(path: &Path) -> Result<QuarterlyTable, AppError> {
    let table = read_quarterly(open(path, "quarterly")?)?;
    report("quarterly", path, table.rows_read, &table.row_errors);
    if table.series.is_empty() {
        return Err(AppError::new(
            EXIT_NO_DATA,
            format!("Quarterly CSV '{}' contains no usable observations.", path.display()),
        ));
    }
    Ok(table)
}

pub fn load_calendar(path: &Path) -> Result<CalendarTable, AppError> {
    let table = read_calendar(open(path, "calendar")?)?;
    report("calendar", path, table.entries.len(), &table.row_errors);
    Ok(table)
}

/// Wide monthly table: `date` plus one numeric column per indicator.
pub fn read_monthly<R: Read>(input: R) -> Result<MonthlyTable, AppError> {
    let mut reader = csv_reader(input);
    let headers = headers(&mut reader, "monthly")?;
    let header_map = build_header_map(&headers);
    let date_idx = require_column(&header_map, "date", "monthly")?;

    let indicators: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != date_idx)
        .map(|(idx, name)| (idx, clean_header_name(name).to_string()))
        .filter(|(_, name)| !name.is_empty())
        .collect();
    if indicators.is_empty() {
        return Err(AppError::config(
            "Monthly CSV has no indicator columns besides `date`.",
        ));
    }

    let mut points: BTreeMap<String, BTreeMap<Month, f64>> = BTreeMap::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let month = match get_required(&record, &header_map, "date").and_then(parse_date) {
            Ok(d) => Month::from_date(d),
            Err(message) => {
                row_errors.push(RowError { line, message });
                continue;
            }
        };

        for (col, name) in &indicators {
            let raw = record.get(*col).map(str::trim).unwrap_or("");
            match parse_cell(raw) {
                Ok(Some(v)) => {
                    let by_month = points.entry(name.clone()).or_default();
                    if by_month.insert(month, v).is_some() {
                        row_errors.push(RowError {
                            line,
                            message: format!("Duplicate month {month} for `{name}`; later row wins."),
                        });
                    }
                }
                Ok(None) => {}
                Err(message) => row_errors.push(RowError {
                    line,
                    message: format!("`{name}`: {message}"),
                }),
            }
        }
    }

    let series = indicators
        .into_iter()
        .map(|(_, name)| {
            let s = points
                .remove(&name)
                .map(MonthlySeries::from_points)
                .unwrap_or_default();
            (name, s)
        })
        .collect();

    Ok(MonthlyTable {
        series,
        row_errors,
        rows_read,
    })
}

/// Quarterly target: `date`, `value` and an optional `quarter` label.
pub fn read_quarterly<R: Read>(input: R) -> Result<QuarterlyTable, AppError> {
    let mut reader = csv_reader(input);
    let headers = headers(&mut reader, "quarterly")?;
    let header_map = build_header_map(&headers);
    require_column(&header_map, "date", "quarterly")?;
    require_column(&header_map, "value", "quarterly")?;

    let mut points = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_quarterly_row(&record, &header_map));
        match parsed {
            Ok(Some(point)) => points.push(point),
            Ok(None) => {}
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(QuarterlyTable {
        series: QuarterlySeries::from_points(points),
        row_errors,
        rows_read,
    })
}

/// Release calendar: `indicator`, `lag_days` and an optional `transform`.
pub fn read_calendar<R: Read>(input: R) -> Result<CalendarTable, AppError> {
    let mut reader = csv_reader(input);
    let headers = headers(&mut reader, "calendar")?;
    let header_map = build_header_map(&headers);
    require_column(&header_map, "indicator", "calendar")?;
    require_column(&header_map, "lag_days", "calendar")?;

    let mut entries = Vec::new();
    let mut row_errors = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_calendar_row(&record, &header_map));
        match parsed {
            Ok(entry) => entries.push(entry),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(CalendarTable {
        entries,
        row_errors,
    })
}

fn parse_quarterly_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<Option<(Quarter, f64)>, String> {
    let date = parse_date(get_required(record, header_map, "date")?)?;
    let quarter = Quarter::from_date(date);

    if let Some(label) = get_optional(record, header_map, "quarter") {
        let labeled: Quarter = label.parse()?;
        if labeled != quarter {
            return Err(format!("Quarter label {labeled} does not match date {date}."));
        }
    }

    let raw = get_optional(record, header_map, "value").unwrap_or("");
    Ok(parse_cell(raw)?.map(|v| (quarter, v)))
}

fn parse_calendar_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<ReleaseCalendarEntry, String> {
    let indicator = get_required(record, header_map, "indicator")?.to_string();
    let lag = get_required(record, header_map, "lag_days")?;
    let lag_days = lag
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.round())
        .ok_or_else(|| format!("Invalid lag_days '{lag}' for `{indicator}`."))?;
    if !(0.0..=MAX_LAG_DAYS as f64).contains(&lag_days) {
        return Err(format!(
            "lag_days {lag} for `{indicator}` is outside 0..={MAX_LAG_DAYS}."
        ));
    }
    let lag_days = lag_days as i64;

    let transform = match get_optional(record, header_map, "transform") {
        Some(label) => Some(
            Transform::parse_label(label)
                .ok_or_else(|| format!("Unknown transform '{label}' for `{indicator}`."))?,
        ),
        None => None,
    };

    Ok(ReleaseCalendarEntry {
        indicator,
        lag_days,
        transform,
    })
}

fn open(path: &Path, what: &str) -> Result<File, AppError> {
    File::open(path).map_err(|e| {
        AppError::config(format!("Failed to open {what} CSV '{}': {e}", path.display()))
    })
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

fn headers<R: Read>(reader: &mut csv::Reader<R>, what: &str) -> Result<StringRecord, AppError> {
    reader
        .headers()
        .map(StringRecord::clone)
        .map_err(|e| AppError::config(format!("Failed to read {what} CSV headers: {e}")))
}

fn report(what: &str, path: &Path, rows: usize, row_errors: &[RowError]) {
    info!(file = %path.display(), rows, skipped = row_errors.len(), "loaded {what} CSV");
    for e in row_errors.iter().take(5) {
        warn!(file = %path.display(), line = e.line, "{}", e.message);
    }
    if row_errors.len() > 5 {
        warn!(file = %path.display(), "... {} more row errors", row_errors.len() - 5);
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn clean_header_name(name: &str) -> &str {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, schema validation will incorrectly
    // report missing columns.
    name.trim().trim_start_matches('\u{feff}')
}

fn normalize_header_name(name: &str) -> String {
    clean_header_name(name).to_ascii_lowercase()
}

fn require_column(
    header_map: &HashMap<String, usize>,
    name: &str,
    what: &str,
) -> Result<usize, AppError> {
    header_map
        .get(name)
        .copied()
        .ok_or_else(|| AppError::config(format!("Missing required column in {what} CSV: `{name}`")))
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    // ISO is the documented format; a few common variants are accepted too.
    // `YYYY-MM` is read as the first of the month (month keys only need the month).
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return Ok(d);
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, YYYY/MM/DD, DD/MM/YYYY, DD-MM-YYYY, YYYY-MM."
    ))
}

/// `Ok(None)` for an explicitly missing cell; `Err` for garbage.
fn parse_cell(s: &str) -> Result<Option<f64>, String> {
    if s.is_empty() || matches!(s.to_ascii_lowercase().as_str(), "na" | "nan" | "n/a" | "null" | ".") {
        return Ok(None);
    }
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid number '{s}'."))?;
    Ok(v.is_finite().then_some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(y: i32, mo: u32) -> Month {
        Month::new(y, mo).unwrap()
    }

    #[test]
    fn monthly_wide_table_with_bom_and_missing_cells() {
        let csv = "\u{feff}Date,IP,Retail Sales\n\
                   2024-01-31,1.5,NA\n\
                   2024-02-15,1.7,0.4\n\
                   2024-03-31,,0.6\n\
                   not-a-date,9,9\n";
        let table = read_monthly(csv.as_bytes()).unwrap();
        assert_eq!(table.rows_read, 4);
        assert_eq!(table.row_errors.len(), 1);
        assert_eq!(table.row_errors[0].line, 5);

        let ip = &table.series["IP"];
        assert_eq!(ip.len(), 2);
        // Mid-month dates are keyed to their month.
        assert_eq!(ip.get(m(2024, 2)), Some(1.7));
        assert_eq!(ip.get(m(2024, 3)), None);
        assert_eq!(table.series["Retail Sales"].len(), 2);
    }

    #[test]
    fn monthly_requires_a_date_column() {
        let err = read_monthly("month,IP\n2024-01-31,1\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("`date`"));
    }

    #[test]
    fn monthly_requires_indicator_columns() {
        let err = read_monthly("date\n2024-01-31\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn quarterly_checks_labels_against_dates() {
        let csv = "date,quarter,value\n\
                   2024-03-31,2024Q1,2.1\n\
                   2024-06-30,2024Q3,2.2\n\
                   2024-09-30,,NaN\n\
                   2024-12-31,2024-Q4,1.9\n";
        let table = read_quarterly(csv.as_bytes()).unwrap();
        assert_eq!(table.series.len(), 2);
        assert_eq!(table.row_errors.len(), 1);
        assert_eq!(table.series.get(Quarter::new(2024, 4).unwrap()), Some(1.9));
    }

    #[test]
    fn quarterly_requires_value_column() {
        let err = read_quarterly("date,gdp\n2024-03-31,1\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("`value`"));
    }

    #[test]
    fn calendar_rows_with_transforms() {
        let csv = "Indicator,Lag_Days,Transform\n\
                   IP,45,ldiff\n\
                   PMI,1,\n\
                   BAD,abc,\n\
                   ODD,3,cubic\n";
        let table = read_calendar(csv.as_bytes()).unwrap();
        assert_eq!(table.entries.len(), 2);
        assert_eq!(table.row_errors.len(), 2);
        assert_eq!(table.entries[0].transform, Some(Transform::Ldiff));
        assert_eq!(table.entries[1].transform, None);
        assert_eq!(table.entries[1].lag_days, 1);
    }

    #[test]
    fn calendar_rejects_out_of_range_lags() {
        let csv = "indicator,lag_days\n\
                   HUGE,1e12\n\
                   NEG,-3\n\
                   EDGE,3650\n";
        let table = read_calendar(csv.as_bytes()).unwrap();
        assert_eq!(table.entries.len(), 1);
        assert_eq!(table.entries[0].indicator, "EDGE");
        assert_eq!(table.row_errors.len(), 2);
        assert!(table.row_errors[0].message.contains("outside"));
    }

    #[test]
    fn calendar_requires_lag_column() {
        let err = read_calendar("indicator,delay\nIP,3\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
