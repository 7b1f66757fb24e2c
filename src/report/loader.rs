use std::{
    fs,
    io::Read,
    path::Path,
};

use chrono::NaiveDate;
use csv::{ByteRecord, ReaderBuilder};
use strum::{EnumCount, IntoEnumIterator};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    error::{DataError, IoError, TradelensResult},
    report::{
        filter::parse_date,
        trade_log::{TradeLog, TradeLogCol, TradeRecord},
    },
};

/// A loaded trade log together with the number of rows that were rejected.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub log: TradeLog,
    pub skipped_rows: usize,
}

impl TradeLog {
    /// Loads a trade log CSV from disk.
    ///
    /// # Errors
    ///
    /// - [`IoError::ReadFailed`] when the file cannot be read.
    /// - [`DataError::MissingColumns`] when the header lacks a required column.
    ///
    /// Malformed rows are not errors: they are skipped and counted. Numeric and
    /// date fields are trimmed before parsing, text fields are kept verbatim.
    pub fn from_csv_path(path: impl AsRef<Path>) -> TradelensResult<LoadOutcome> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            IoError::ReadFailed(format!("Failed to read trade log '{}': {e}", path.display()))
        })?;

        info!(path = %path.display(), bytes = bytes.len(), "Loading trade log");
        load_csv_bytes(&bytes)
    }

    /// Loads a trade log CSV from any reader. Same rules as [`TradeLog::from_csv_path`].
    pub fn from_csv_reader<R: Read>(mut reader: R) -> TradelensResult<LoadOutcome> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(IoError::Io)?;
        load_csv_bytes(&bytes)
    }
}

fn load_csv_bytes(bytes: &[u8]) -> TradelensResult<LoadOutcome> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(DataError::MissingColumns(all_columns()).into());
    }

    // Flexible so that a ragged row is rejected on its own instead of failing the read.
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header = reader.byte_headers().map_err(IoError::from)?.clone();
    let positions = column_positions(&header)?;

    let mut records = Vec::new();
    let mut skipped_rows = 0;
    let mut row = ByteRecord::new();

    while reader.read_byte_record(&mut row).map_err(IoError::from)? {
        let line = row.position().map_or(0, |p| p.line());
        match decode_row(&row, header.len()).and_then(|fields| {
            parse_row(|c: TradeLogCol| fields[positions[c as usize]])
        }) {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!(line, %reason, "Skipping malformed trade row");
                skipped_rows += 1;
            }
        }
    }

    if skipped_rows > 0 {
        warn!(skipped_rows, "Skipped malformed rows while loading trade log");
    }
    info!(rows = records.len(), "Loaded trade log");

    Ok(LoadOutcome {
        log: TradeLog::from_records(&records)?,
        skipped_rows,
    })
}

/// Field index of every [`TradeLogCol`] in `header`, in declaration order.
fn column_positions(header: &ByteRecord) -> TradelensResult<Vec<usize>> {
    let names = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = String::from_utf8_lossy(name);
            // Spreadsheet exports often start with a byte order mark.
            let name = if i == 0 { name.trim_start_matches('\u{feff}') } else { name.as_ref() };
            name.trim().to_string()
        })
        .collect::<Vec<_>>();

    let mut positions = Vec::with_capacity(TradeLogCol::COUNT);
    let mut missing = Vec::new();
    for c in TradeLogCol::iter() {
        match names.iter().position(|n| n == c.as_str()) {
            Some(i) => positions.push(i),
            None => missing.push(c.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(DataError::MissingColumns(missing).into());
    }
    Ok(positions)
}

/// Splits a raw row into text fields. The row must match the header width.
fn decode_row(row: &ByteRecord, expected: usize) -> Result<Vec<&str>, RowRejection> {
    if row.len() != expected {
        return Err(RowRejection::FieldCount {
            expected,
            found: row.len(),
        });
    }

    row.iter()
        .enumerate()
        .map(|(i, field)| {
            std::str::from_utf8(field).map_err(|_| RowRejection::InvalidUtf8 { field: i + 1 })
        })
        .collect()
}

// ================================================================================================
// Row Validation
// ================================================================================================

#[derive(Debug, Error, PartialEq)]
enum RowRejection {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 { field: usize },

    #[error("'{column}' is not a number: '{value}'")]
    InvalidNumber { column: TradeLogCol, value: String },

    #[error("'{column}' must not be negative: {value}")]
    Negative { column: TradeLogCol, value: i64 },

    #[error("'{column}' is not a date: '{value}'")]
    InvalidDate { column: TradeLogCol, value: String },

    #[error("close date {close} is before open date {open}")]
    ClosedBeforeOpen { open: NaiveDate, close: NaiveDate },

    #[error("status is blank")]
    BlankStatus,
}

fn parse_row<'a>(field: impl Fn(TradeLogCol) -> &'a str) -> Result<TradeRecord, RowRejection> {
    let status = field(TradeLogCol::Status);
    if status.trim().is_empty() {
        return Err(RowRejection::BlankStatus);
    }

    let quantity = non_negative(TradeLogCol::Quantity, field(TradeLogCol::Quantity))?;
    let days_in_trade = non_negative(TradeLogCol::DaysInTrade, field(TradeLogCol::DaysInTrade))?;
    let open_date = date(TradeLogCol::OpenDate, field(TradeLogCol::OpenDate))?;
    let close_date = date(TradeLogCol::CloseDate, field(TradeLogCol::CloseDate))?;

    if let (Some(open), Some(close)) = (open_date, close_date)
        && close < open
    {
        return Err(RowRejection::ClosedBeforeOpen { open, close });
    }

    Ok(TradeRecord {
        bot_name: field(TradeLogCol::BotName).to_string(),
        strategy: field(TradeLogCol::Strategy).to_string(),
        symbol: field(TradeLogCol::Symbol).to_string(),
        status: status.to_string(),
        quantity,
        pnl: number(TradeLogCol::Pnl, field(TradeLogCol::Pnl))?,
        return_pct: number(TradeLogCol::ReturnPct, field(TradeLogCol::ReturnPct))?,
        days_in_trade,
        open_date,
        close_date,
        estimated_delta: number(TradeLogCol::EstimatedDelta, field(TradeLogCol::EstimatedDelta))?,
        delta_category: field(TradeLogCol::DeltaCategory).to_string(),
    })
}

/// Blank is zero.
fn number(column: TradeLogCol, raw: &str) -> Result<f64, RowRejection> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(RowRejection::InvalidNumber {
            column,
            value: raw.to_string(),
        }),
    }
}

/// Whole, non-negative count. Accepts `3.0` as written by spreadsheet exports.
fn non_negative(column: TradeLogCol, raw: &str) -> Result<i64, RowRejection> {
    let raw = raw.trim();
    let value = match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            let v = number(column, raw)?;
            if v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
                return Err(RowRejection::InvalidNumber {
                    column,
                    value: raw.to_string(),
                });
            }
            v as i64
        }
    };

    if value < 0 {
        return Err(RowRejection::Negative { column, value });
    }
    Ok(value)
}

/// Blank is missing.
fn date(column: TradeLogCol, raw: &str) -> Result<Option<NaiveDate>, RowRejection> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date(raw)
        .map(Some)
        .map_err(|_| RowRejection::InvalidDate {
            column,
            value: raw.to_string(),
        })
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn all_columns() -> Vec<String> {
    TradeLogCol::iter().map(|c| c.to_string()).collect()
}
