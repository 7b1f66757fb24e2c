use polars::prelude::{DataFrame, Expr, JsonFormat, JsonWriter, Null, SerWriter, lit, when};
use serde_json::Value;

use crate::error::{DataError, IoError, TradelensError, TradelensResult};

pub(crate) fn polars_to_tradelens_error(report: &str, e: polars::error::PolarsError) -> TradelensError {
    TradelensError::Data(DataError::DataFrame(format!(
        "Error while building {report} from trade log DataFrame: {e}"
    )))
}

pub trait ExprExt {
    /// Safely divides two expressions, protecting against division-by-zero.
    ///
    /// If the denominator is zero, returns `fallback`. A `None` fallback yields
    /// null, which the typed views read back as [`Ratio::Undefined`].
    ///
    /// [`Ratio::Undefined`]: crate::report::ratio::Ratio::Undefined
    fn safe_div(self, other: Expr, fallback: Option<f64>) -> Expr;
}

impl ExprExt for Expr {
    fn safe_div(self, other: Expr, fallback: Option<f64>) -> Expr {
        let fallback_val = match fallback {
            Some(v) => lit(v),
            None => lit(Null {}),
        };
        when(other.clone().eq(lit(0.0)))
            .then(fallback_val)
            .otherwise(self / other)
    }
}

pub trait DataFrameExt {
    fn to_json_rows(&self) -> TradelensResult<Vec<serde_json::Map<String, Value>>>;

    /// Reads a single `Float64` cell. Null cells yield `None`.
    fn f64_at(&self, name: &str, row: usize) -> TradelensResult<Option<f64>>;

    /// Reads a single `UInt32` cell. Null cells yield `None`.
    fn u32_at(&self, name: &str, row: usize) -> TradelensResult<Option<u32>>;

    /// Reads a single `String` cell. Null cells yield `None`.
    fn str_at(&self, name: &str, row: usize) -> TradelensResult<Option<String>>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> TradelensResult<Vec<serde_json::Map<String, Value>>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        // Heuristic: approx 2^6 bytes per cell
        let estimated_row_size = self.width() * (1 << 6);
        let mut buf = Vec::with_capacity(height * estimated_row_size);

        JsonWriter::new(&mut buf)
            .with_json_format(JsonFormat::Json)
            .finish(&mut self.clone())
            .map_err(|e| DataError::DataFrame(e.to_string()))?;

        let json_val: Value = serde_json::from_slice(&buf).map_err(IoError::Json)?;

        match json_val {
            Value::Array(rows) => Ok(rows
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            _ => {
                Err(DataError::DataFrame("Polars JSON output was not an array".to_string()).into())
            }
        }
    }

    fn f64_at(&self, name: &str, row: usize) -> TradelensResult<Option<f64>> {
        let ca = self
            .column(name)
            .and_then(|c| c.f64())
            .map_err(|e| column_err(name, e))?;
        Ok(ca.get(row))
    }

    fn u32_at(&self, name: &str, row: usize) -> TradelensResult<Option<u32>> {
        let ca = self
            .column(name)
            .and_then(|c| c.u32())
            .map_err(|e| column_err(name, e))?;
        Ok(ca.get(row))
    }

    fn str_at(&self, name: &str, row: usize) -> TradelensResult<Option<String>> {
        let ca = self
            .column(name)
            .and_then(|c| c.str())
            .map_err(|e| column_err(name, e))?;
        Ok(ca.get(row).map(str::to_string))
    }
}

fn column_err(name: &str, e: polars::error::PolarsError) -> TradelensError {
    DataError::DataFrame(format!("Failed to read column '{name}': {e}")).into()
}

#[cfg(test)]
mod tests {
    use polars::{
        df,
        prelude::{IntoLazy, col},
    };

    use super::*;

    #[test]
    fn test_safe_div_guards_zero_denominator() {
        let df = df![
            "num" => &[6.0, 1.0, 0.0],
            "den" => &[2.0, 0.0, 0.0]
        ]
        .expect("Failed to create DF");

        let out = df
            .lazy()
            .select([
                col("num")
                    .safe_div(col("den"), Some(0.0))
                    .alias("zero_fallback"),
                col("num").safe_div(col("den"), None).alias("null_fallback"),
            ])
            .collect()
            .expect("Failed to evaluate safe_div");

        let zero = out
            .column("zero_fallback")
            .expect("Missing zero_fallback")
            .f64()
            .expect("Column is not f64");
        assert_eq!(zero.get(0), Some(3.0));
        assert_eq!(zero.get(1), Some(0.0));
        assert_eq!(zero.get(2), Some(0.0));

        let null = out
            .column("null_fallback")
            .expect("Missing null_fallback")
            .f64()
            .expect("Column is not f64");
        assert_eq!(null.get(0), Some(3.0));
        assert_eq!(null.get(1), None);
        assert_eq!(null.null_count(), 2);
    }

    #[test]
    fn test_to_json_rows() {
        let df = df![
            "symbol" => &["SPX", "QQQ"],
            "pnl" => &[100.0, -50.0]
        ]
        .expect("Failed to create DF");

        let rows = df.to_json_rows().expect("Failed to serialize rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("symbol"), Some(&Value::from("SPX")));
        assert_eq!(rows[1].get("pnl"), Some(&Value::from(-50.0)));
    }

    #[test]
    fn test_cell_accessors() {
        let df = df![
            "symbol" => &[Some("SPX"), None],
            "pnl" => &[Some(100.0), None],
            "count" => &[3u32, 4u32]
        ]
        .expect("Failed to create DF");

        assert_eq!(
            df.str_at("symbol", 0).expect("Failed to read symbol"),
            Some("SPX".to_string())
        );
        assert_eq!(df.str_at("symbol", 1).expect("Failed to read symbol"), None);
        assert_eq!(df.f64_at("pnl", 0).expect("Failed to read pnl"), Some(100.0));
        assert_eq!(df.f64_at("pnl", 1).expect("Failed to read pnl"), None);
        assert_eq!(df.u32_at("count", 1).expect("Failed to read count"), Some(4));

        assert!(df.f64_at("symbol", 0).is_err(), "Type mismatch must error");
        assert!(df.f64_at("missing", 0).is_err(), "Missing column must error");
    }

    #[test]
    fn test_to_json_rows_empty() {
        let df = DataFrame::empty();
        let rows = df.to_json_rows().expect("Failed to serialize rows");
        assert!(rows.is_empty());
    }
}
