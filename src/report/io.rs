use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use polars::{
    frame::DataFrame,
    prelude::{CsvWriter, SchemaRef, SerWriter},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DataError, IoError, TradelensResult},
    report::polars_ext::DataFrameExt,
};

// ================================================================================================
// Traits
// ================================================================================================

/// Defines a common interface for all Report types (TradeLog, TradeStatistics, etc.).
pub trait Report {
    /// Access the underlying DataFrame (Immutable).
    fn as_df(&self) -> &DataFrame;

    /// Access the underlying DataFrame (Mutable).
    fn as_df_mut(&mut self) -> &mut DataFrame;
}

pub trait ReportName {
    fn base_name(&self) -> String;

    fn filename(&self, ext: FileExtension) -> String {
        format!("{}.{}", self.base_name(), ext)
    }
}

pub trait ToSchema {
    /// Returns the canonical schema for this report type.
    fn to_schema() -> SchemaRef;
}

pub trait ToJson {
    /// Serializes the report to a generic JSON Value.
    /// Returns a `Value::Array` containing row objects.
    fn to_json(&self) -> TradelensResult<serde_json::Value>;
}

pub trait ToCsv {
    /// Writes the report to `<base_name>.csv` in the target directory.
    ///
    /// # Side Effects
    /// - Creates the directory if missing.
    /// - Overwrites the file if it exists.
    ///
    /// Returns the path of the written file.
    fn to_csv(&self, dir: impl AsRef<Path>) -> TradelensResult<PathBuf>;
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> ToJson for T
where
    T: Report,
{
    fn to_json(&self) -> TradelensResult<serde_json::Value> {
        let rows = self.as_df().to_json_rows()?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

impl<T> ToCsv for T
where
    T: Report + ReportName,
{
    fn to_csv(&self, dir: impl AsRef<Path>) -> TradelensResult<PathBuf> {
        let dir = dir.as_ref();
        let file_path = dir.join(self.filename(FileExtension::Csv));

        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                IoError::FileSystem(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let file = fs::File::create(&file_path).map_err(|e| {
            IoError::WriteFailed(format!(
                "Failed to create CSV file '{}': {e}",
                file_path.display()
            ))
        })?;

        write_df_csv(self.as_df(), file)?;
        Ok(file_path)
    }
}

/// Writes `df` as CSV with a header row. Dates are rendered as `YYYY-MM-DD`.
pub(crate) fn write_df_csv<W: Write>(df: &DataFrame, writer: W) -> TradelensResult<()> {
    let mut df = df.clone();
    CsvWriter::new(writer)
        .include_header(true)
        .finish(&mut df)
        .map_err(|e| DataError::DataFrame(format!("Failed to write CSV: {e}")))?;
    Ok(())
}

/// Generates a base name dynamically based on the presence of grouping columns.
///
/// # Logic
/// 1. Scans the DataFrame column names.
/// 2. Filters for columns starting with `__` (the `GroupCol` prefix).
/// 3. Strips the prefix to get clean names (e.g., `__symbol` -> `symbol`).
/// 4. Joins them to form a prefix for the file.
///
/// # Example
/// - No groups: `group_statistics`
/// - Grouped by Strategy: `strategy_group_statistics`
/// - Grouped by Strategy & Status: `strategy_status_group_statistics`
pub(crate) fn generate_dynamic_base_name(df: &DataFrame, base_name: &str) -> String {
    let group_keys = df
        .get_column_names()
        .iter()
        .filter_map(|name| name.strip_prefix("__"))
        .collect::<Vec<_>>();

    if group_keys.is_empty() {
        base_name.to_string()
    } else {
        let prefix = group_keys.join("_");
        format!("{}_{}", prefix, base_name)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum FileExtension {
    Csv,
    Json,
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    struct Plain(DataFrame);

    impl Report for Plain {
        fn as_df(&self) -> &DataFrame {
            &self.0
        }

        fn as_df_mut(&mut self) -> &mut DataFrame {
            &mut self.0
        }
    }

    impl ReportName for Plain {
        fn base_name(&self) -> String {
            generate_dynamic_base_name(&self.0, "plain")
        }
    }

    #[test]
    fn test_generate_dynamic_base_name() {
        // 1. Case: No Groups (Plain)
        let df_plain = df![
            "total_pnl" => &[100.0],
            "trade_count" => &[5]
        ]
        .expect("Failed to create plain DF");

        let name_plain = generate_dynamic_base_name(&df_plain, "stats");
        assert_eq!(name_plain, "stats");

        // 2. Case: Single Group (Strategy)
        let df_strategy = df![
            "__strategy" => &["Iron Condor"],
            "total_pnl" => &[100.0]
        ]
        .expect("Failed to create strategy DF");

        let name_strategy = generate_dynamic_base_name(&df_strategy, "stats");
        assert_eq!(name_strategy, "strategy_stats");

        // 3. Case: Multi Group (Strategy + Status)
        // Order matters in the output name, driven by column order in DF
        let df_multi = df![
            "__strategy" => &["Iron Condor"],
            "__status" => &["closed"],
            "total_pnl" => &[100.0]
        ]
        .expect("Failed to create multi DF");

        let name_multi = generate_dynamic_base_name(&df_multi, "stats");
        assert_eq!(name_multi, "strategy_status_stats");
    }

    #[test]
    fn test_to_csv_creates_directory_and_file() {
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let target = tmp.path().join("nested").join("reports");

        let report = Plain(
            df![
                "symbol" => &["SPX", "QQQ"],
                "pnl" => &[100.0, -50.0]
            ]
            .expect("Failed to create DF"),
        );

        let path = report.to_csv(&target).expect("Failed to write CSV");
        assert_eq!(path, target.join("plain.csv"));

        let content = fs::read_to_string(&path).expect("Failed to read written CSV");
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("symbol,pnl"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn test_to_json_returns_row_objects() {
        let report = Plain(
            df![
                "symbol" => &["SPX"],
                "pnl" => &[100.0]
            ]
            .expect("Failed to create DF"),
        );

        let json = report.to_json().expect("Failed to serialize report");
        let rows = json.as_array().expect("Expected a JSON array");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["symbol"], "SPX");
    }
}
