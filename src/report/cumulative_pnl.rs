use std::{convert::TryFrom, sync::Arc};

use chrono::NaiveDate;
use polars::{
    frame::DataFrame,
    prelude::{
        ChunkAgg, DataType, Expr, Field, IntoLazy, PlSmallStr, Schema, SchemaRef,
        SortMultipleOptions, col,
    },
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{DataError, TradelensError, TradelensResult},
    report::{
        io::{Report, ReportName, ToSchema, generate_dynamic_base_name},
        polars_ext::{DataFrameExt, polars_to_tradelens_error},
        trade_log::{TradeLog, TradeLogCol, date_from_epoch_days},
    },
};

/// Running P&L over trades ordered by close date.
///
/// Trades closing on the same day keep their log order; trades without a close
/// date come last.
#[derive(Debug, Clone)]
pub struct CumulativePnl {
    df: DataFrame,
}

impl Default for CumulativePnl {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl ReportName for CumulativePnl {
    fn base_name(&self) -> String {
        generate_dynamic_base_name(&self.df, "cumulative_pnl")
    }
}

impl Report for CumulativePnl {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for CumulativePnl {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = CumulativePnlCol::iter()
            .map(|col| {
                let dtype = match col {
                    CumulativePnlCol::CloseDate => DataType::Date,

                    CumulativePnlCol::Strategy
                    | CumulativePnlCol::Symbol
                    | CumulativePnlCol::Status => DataType::String,

                    CumulativePnlCol::Pnl
                    | CumulativePnlCol::CumulativePnl
                    | CumulativePnlCol::PeakCumulativePnl
                    | CumulativePnlCol::DrawdownFromPeak => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl TryFrom<&TradeLog> for CumulativePnl {
    type Error = TradelensError;

    fn try_from(log: &TradeLog) -> TradelensResult<Self> {
        if log.as_df().is_empty() {
            return Ok(Self::default());
        }

        let df = log
            .as_df()
            .clone()
            .lazy()
            .sort(
                [TradeLogCol::CloseDate.as_str()],
                SortMultipleOptions::default()
                    .with_nulls_last(true)
                    .with_maintain_order(true),
            )
            .select(exprs())
            .collect()
            .map_err(convert_err)?;

        Ok(Self { df })
    }
}

impl CumulativePnl {
    pub fn points(&self) -> TradelensResult<Vec<CumulativePoint>> {
        let df = &self.df;
        let close = df
            .column(CumulativePnlCol::CloseDate.as_str())
            .and_then(|c| c.date())
            .map_err(convert_err)?
            .physical();

        (0..df.height())
            .map(|i| -> TradelensResult<CumulativePoint> {
                let f = |c: CumulativePnlCol| -> TradelensResult<f64> {
                    Ok(df.f64_at(c.as_str(), i)?.unwrap_or_default())
                };
                let close_date = close
                    .get(i)
                    .map(|d| {
                        date_from_epoch_days(d).ok_or_else(|| {
                            DataError::InvalidRecord(format!("Close date out of range: {d}"))
                        })
                    })
                    .transpose()?;

                Ok(CumulativePoint {
                    close_date,
                    pnl: f(CumulativePnlCol::Pnl)?,
                    cumulative_pnl: f(CumulativePnlCol::CumulativePnl)?,
                    peak_cumulative_pnl: f(CumulativePnlCol::PeakCumulativePnl)?,
                    drawdown_from_peak: f(CumulativePnlCol::DrawdownFromPeak)?,
                })
            })
            .collect()
    }

    /// Largest drop from a running peak, zero for an empty series.
    pub fn max_drawdown(&self) -> TradelensResult<f64> {
        let drawdown = self
            .df
            .column(CumulativePnlCol::DrawdownFromPeak.as_str())
            .and_then(|c| c.f64())
            .map_err(convert_err)?;
        Ok(drawdown.max().unwrap_or_default())
    }
}

/// One step of the cumulative series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub close_date: Option<NaiveDate>,
    pub pnl: f64,
    pub cumulative_pnl: f64,
    pub peak_cumulative_pnl: f64,
    pub drawdown_from_peak: f64,
}

fn exprs() -> Vec<Expr> {
    vec![
        // === Time ===
        col(TradeLogCol::CloseDate)
            .alias(CumulativePnlCol::CloseDate)
            .cast(DataType::Date),
        // === Trade ===
        col(TradeLogCol::Strategy)
            .alias(CumulativePnlCol::Strategy)
            .cast(DataType::String),
        col(TradeLogCol::Symbol)
            .alias(CumulativePnlCol::Symbol)
            .cast(DataType::String),
        col(TradeLogCol::Status)
            .alias(CumulativePnlCol::Status)
            .cast(DataType::String),
        col(TradeLogCol::Pnl)
            .alias(CumulativePnlCol::Pnl)
            .cast(DataType::Float64),
        // === Equity curve ===
        cumulative_pnl_expr()
            .alias(CumulativePnlCol::CumulativePnl)
            .cast(DataType::Float64),
        peak_cumulative_pnl_expr()
            .alias(CumulativePnlCol::PeakCumulativePnl)
            .cast(DataType::Float64),
        drawdown_from_peak_expr()
            .alias(CumulativePnlCol::DrawdownFromPeak)
            .cast(DataType::Float64),
    ]
}

// ================================================================================================
// === Equity curve ===
// ================================================================================================
fn cumulative_pnl_expr() -> Expr {
    col(TradeLogCol::Pnl).cum_sum(false)
}

fn peak_cumulative_pnl_expr() -> Expr {
    cumulative_pnl_expr().cum_max(false)
}

fn drawdown_from_peak_expr() -> Expr {
    peak_cumulative_pnl_expr() - cumulative_pnl_expr()
}

// ================================================================================================
// Helper Functions
// ================================================================================================
fn convert_err(e: polars::error::PolarsError) -> TradelensError {
    polars_to_tradelens_error("cumulative P&L report", e)
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
    EnumCount,
)]
#[strum(serialize_all = "snake_case")]
pub enum CumulativePnlCol {
    // === Time ===
    /// Close date of the trade that produced this step.
    CloseDate,

    // === Trade ===
    Strategy,
    Symbol,
    Status,
    /// P&L of the trade itself.
    Pnl,

    // === Equity curve ===
    /// Running sum of P&L up to and including this trade.
    CumulativePnl,
    /// Highest cumulative P&L observed so far.
    PeakCumulativePnl,
    /// Peak minus current cumulative P&L; never negative.
    DrawdownFromPeak,
}

impl From<CumulativePnlCol> for PlSmallStr {
    fn from(value: CumulativePnlCol) -> Self {
        value.as_str().into()
    }
}

impl CumulativePnlCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::SchemaExt;

    use super::*;
    use crate::report::trade_log::tests::record;

    // ========================================================================
    // Helper: Build Trade Log
    // ========================================================================

    fn sample_log() -> TradeLog {
        // Log order deliberately differs from close-date order.
        TradeLog::from_records(&[
            record("A", "SPX", "closed", 200.0, None, Some("2024-01-13")),
            record("B", "SPX", "closed", 100.0, None, Some("2024-01-07")),
            record("C", "QQQ", "expired", -300.0, None, None),
            record("D", "QQQ", "expired", -50.0, None, Some("2024-02-04")),
            record("E", "SPX", "closed", 75.0, None, Some("2024-01-13")),
        ])
        .expect("Failed to build TradeLog")
    }

    // ========================================================================
    // Test: Data Types Match Schema
    // ========================================================================

    #[test]
    fn test_cumulative_pnl_data_types() {
        let cum = sample_log().cumulative_pnl().expect("Conversion failed");
        let df = cum.as_df();
        let expected_schema = CumulativePnl::to_schema();

        assert_eq!(df.width(), expected_schema.len());
        for field in expected_schema.iter_fields() {
            let actual_dtype = df
                .column(field.name())
                .unwrap_or_else(|_| panic!("Column '{}' not found", field.name()))
                .dtype();
            assert_eq!(actual_dtype, field.dtype(), "Mismatch for '{}'", field.name());
        }
    }

    // ========================================================================
    // Test: Ordering and Running Sums
    // ========================================================================

    #[test]
    fn test_series_follows_close_date_order() {
        let points = sample_log()
            .cumulative_pnl()
            .expect("Conversion failed")
            .points()
            .expect("Failed to read points");

        // B (01-07), A (01-13), E (01-13, after A by row order), D (02-04), C (no close date)
        let pnls = points.iter().map(|p| p.pnl).collect::<Vec<_>>();
        assert_eq!(pnls, vec![100.0, 200.0, 75.0, -50.0, -300.0]);

        let cumulative = points.iter().map(|p| p.cumulative_pnl).collect::<Vec<_>>();
        assert_eq!(cumulative, vec![100.0, 300.0, 375.0, 325.0, 25.0]);
        assert!(points.last().expect("Empty series").close_date.is_none());
    }

    #[test]
    fn test_series_length_and_final_value() {
        let log = sample_log();
        let points = log
            .cumulative_pnl()
            .expect("Conversion failed")
            .points()
            .expect("Failed to read points");
        let total = log
            .trade_stats()
            .expect("Stats failed")
            .headline()
            .expect("Headline failed")
            .total_pnl;

        assert_eq!(points.len(), log.len());
        assert_eq!(points.last().expect("Empty series").cumulative_pnl, total);
    }

    #[test]
    fn test_peak_and_drawdown() {
        let cum = sample_log().cumulative_pnl().expect("Conversion failed");
        let points = cum.points().expect("Failed to read points");

        let peaks = points.iter().map(|p| p.peak_cumulative_pnl).collect::<Vec<_>>();
        assert_eq!(peaks, vec![100.0, 300.0, 375.0, 375.0, 375.0]);

        let drawdowns = points.iter().map(|p| p.drawdown_from_peak).collect::<Vec<_>>();
        assert_eq!(drawdowns, vec![0.0, 0.0, 0.0, 50.0, 350.0]);

        assert_eq!(cum.max_drawdown().expect("Failed to read drawdown"), 350.0);
    }

    // ========================================================================
    // Test: Empty Trade Log
    // ========================================================================

    #[test]
    fn test_empty_trade_log() {
        let cum = TradeLog::default()
            .cumulative_pnl()
            .expect("Should handle empty TradeLog");
        assert_eq!(cum.as_df().height(), 0);
        assert!(cum.points().expect("Failed to read points").is_empty());
        assert_eq!(cum.max_drawdown().expect("Failed to read drawdown"), 0.0);
    }
}
