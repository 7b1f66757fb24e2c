use std::{str::FromStr, sync::Arc};

use polars::{
    frame::DataFrame,
    prelude::{
        DataType, Expr, Field, IntoLazy, PlSmallStr, Schema, SchemaRef, SortMultipleOptions, col,
        len, lit, when,
    },
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{DataError, TradelensError, TradelensResult},
    report::{
        io::{Report, ReportName, ToSchema, generate_dynamic_base_name},
        polars_ext::{DataFrameExt, ExprExt, polars_to_tradelens_error},
        trade_log::{DeltaCategory, TradeLog, TradeLogCol},
    },
};

/// Total delta beyond which the portfolio counts as directional.
pub const DEFAULT_BIAS_THRESHOLD: f64 = 50.0;

/// Directional lean of the whole portfolio.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum PortfolioBias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl PortfolioBias {
    /// Bullish above `threshold`, Bearish below `-threshold`, Neutral otherwise.
    pub fn classify(total_delta: f64, threshold: f64) -> Self {
        if total_delta > threshold {
            Self::Bullish
        } else if total_delta < -threshold {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ================================================================================================
// Portfolio Exposure
// ================================================================================================

/// Aggregate directional exposure of a trade log, as a single row.
#[derive(Debug, Clone)]
pub struct DeltaExposure {
    df: DataFrame,
    bias_threshold: f64,
}

impl Default for DeltaExposure {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self {
            df,
            bias_threshold: DEFAULT_BIAS_THRESHOLD,
        }
    }
}

impl ReportName for DeltaExposure {
    fn base_name(&self) -> String {
        generate_dynamic_base_name(&self.df, "delta_exposure")
    }
}

impl Report for DeltaExposure {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for DeltaExposure {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = DeltaExposureCol::iter()
            .map(|col| {
                let dtype = match col {
                    DeltaExposureCol::TradeCount => DataType::UInt32,
                    DeltaExposureCol::TotalDelta
                    | DeltaExposureCol::AvgDelta
                    | DeltaExposureCol::NeutralSharePct => DataType::Float64,
                    DeltaExposureCol::PortfolioBias => DataType::String,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl DeltaExposure {
    pub fn new(log: &TradeLog, bias_threshold: f64) -> TradelensResult<Self> {
        if log.is_empty() {
            return Ok(Self {
                bias_threshold,
                ..Self::default()
            });
        }

        let df = log
            .as_df()
            .clone()
            .lazy()
            .select(exposure_exprs(bias_threshold))
            .collect()
            .map_err(convert_err)?;

        Ok(Self { df, bias_threshold })
    }

    pub fn bias_threshold(&self) -> f64 {
        self.bias_threshold
    }

    /// Typed view of the exposure row. An empty log has zero exposure and a
    /// neutral bias.
    pub fn summary(&self) -> TradelensResult<DeltaSummary> {
        let df = &self.df;
        if df.height() == 0 {
            return Ok(DeltaSummary {
                bias_threshold: self.bias_threshold,
                ..DeltaSummary::default()
            });
        }

        let f = |c: DeltaExposureCol| -> TradelensResult<f64> {
            Ok(df.f64_at(c.as_str(), 0)?.unwrap_or_default())
        };
        let bias = df
            .str_at(DeltaExposureCol::PortfolioBias.as_str(), 0)?
            .ok_or_else(|| DataError::UnexpectedEnumVariant("missing portfolio bias".to_string()))?;

        Ok(DeltaSummary {
            trade_count: df
                .u32_at(DeltaExposureCol::TradeCount.as_str(), 0)?
                .unwrap_or_default(),
            total_delta: f(DeltaExposureCol::TotalDelta)?,
            avg_delta: f(DeltaExposureCol::AvgDelta)?,
            neutral_share_pct: f(DeltaExposureCol::NeutralSharePct)?,
            portfolio_bias: PortfolioBias::from_str(&bias).map_err(DataError::from)?,
            bias_threshold: self.bias_threshold,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeltaSummary {
    pub trade_count: u32,
    pub total_delta: f64,
    pub avg_delta: f64,
    /// Share of trades whose delta category is `Neutral`, in percent.
    pub neutral_share_pct: f64,
    pub portfolio_bias: PortfolioBias,
    pub bias_threshold: f64,
}

fn exposure_exprs(threshold: f64) -> Vec<Expr> {
    vec![
        len()
            .alias(DeltaExposureCol::TradeCount)
            .cast(DataType::UInt32),
        total_delta_expr()
            .alias(DeltaExposureCol::TotalDelta)
            .cast(DataType::Float64),
        avg_delta_expr()
            .alias(DeltaExposureCol::AvgDelta)
            .cast(DataType::Float64),
        neutral_share_pct_expr()
            .alias(DeltaExposureCol::NeutralSharePct)
            .cast(DataType::Float64),
        portfolio_bias_expr(threshold)
            .alias(DeltaExposureCol::PortfolioBias)
            .cast(DataType::String),
    ]
}

// ================================================================================================
// Per-Strategy Exposure
// ================================================================================================

/// Delta and P&L per strategy, ordered by total P&L descending.
#[derive(Debug, Clone)]
pub struct StrategyDeltaTable {
    df: DataFrame,
}

impl Default for StrategyDeltaTable {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl ReportName for StrategyDeltaTable {
    fn base_name(&self) -> String {
        generate_dynamic_base_name(&self.df, "strategy_delta")
    }
}

impl Report for StrategyDeltaTable {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for StrategyDeltaTable {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = StrategyDeltaCol::iter()
            .map(|col| {
                let dtype = match col {
                    StrategyDeltaCol::Strategy => DataType::String,
                    StrategyDeltaCol::TradeCount => DataType::UInt32,
                    StrategyDeltaCol::AvgDelta
                    | StrategyDeltaCol::TotalDelta
                    | StrategyDeltaCol::TotalPnl => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl TryFrom<&TradeLog> for StrategyDeltaTable {
    type Error = TradelensError;

    fn try_from(log: &TradeLog) -> TradelensResult<Self> {
        if log.is_empty() {
            return Ok(Self::default());
        }

        let df = log
            .as_df()
            .clone()
            .lazy()
            .group_by_stable([col(TradeLogCol::Strategy).alias(StrategyDeltaCol::Strategy)])
            .agg(strategy_exprs())
            .sort(
                [StrategyDeltaCol::TotalPnl.as_str()],
                SortMultipleOptions::default()
                    .with_order_descending(true)
                    .with_maintain_order(true),
            )
            .select(StrategyDeltaCol::iter().map(col).collect::<Vec<_>>())
            .collect()
            .map_err(convert_err)?;

        Ok(Self { df })
    }
}

impl StrategyDeltaTable {
    pub fn rows(&self) -> TradelensResult<Vec<StrategyDeltaRow>> {
        let df = &self.df;
        (0..df.height())
            .map(|i| -> TradelensResult<StrategyDeltaRow> {
                let f = |c: StrategyDeltaCol| -> TradelensResult<f64> {
                    Ok(df.f64_at(c.as_str(), i)?.unwrap_or_default())
                };
                Ok(StrategyDeltaRow {
                    strategy: df
                        .str_at(StrategyDeltaCol::Strategy.as_str(), i)?
                        .unwrap_or_default(),
                    avg_delta: f(StrategyDeltaCol::AvgDelta)?,
                    total_delta: f(StrategyDeltaCol::TotalDelta)?,
                    total_pnl: f(StrategyDeltaCol::TotalPnl)?,
                    trade_count: df
                        .u32_at(StrategyDeltaCol::TradeCount.as_str(), i)?
                        .unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyDeltaRow {
    pub strategy: String,
    pub avg_delta: f64,
    pub total_delta: f64,
    pub total_pnl: f64,
    pub trade_count: u32,
}

fn strategy_exprs() -> Vec<Expr> {
    vec![
        avg_delta_expr()
            .alias(StrategyDeltaCol::AvgDelta)
            .cast(DataType::Float64),
        total_delta_expr()
            .alias(StrategyDeltaCol::TotalDelta)
            .cast(DataType::Float64),
        col(TradeLogCol::Pnl)
            .sum()
            .alias(StrategyDeltaCol::TotalPnl)
            .cast(DataType::Float64),
        len()
            .alias(StrategyDeltaCol::TradeCount)
            .cast(DataType::UInt32),
    ]
}

// ================================================================================================
// === Exposure ===
// ================================================================================================
fn total_delta_expr() -> Expr {
    col(TradeLogCol::EstimatedDelta).sum()
}

fn avg_delta_expr() -> Expr {
    total_delta_expr().safe_div(len().cast(DataType::Float64), Some(0.0))
}

fn neutral_share_pct_expr() -> Expr {
    col(TradeLogCol::DeltaCategory)
        .eq(lit(DeltaCategory::Neutral.as_str()))
        .sum()
        .cast(DataType::Float64)
        .safe_div(len().cast(DataType::Float64), Some(0.0))
        * lit(100.0)
}

fn portfolio_bias_expr(threshold: f64) -> Expr {
    let total = total_delta_expr();
    when(total.clone().gt(lit(threshold)))
        .then(lit(PortfolioBias::Bullish.as_str()))
        .when(total.lt(lit(-threshold)))
        .then(lit(PortfolioBias::Bearish.as_str()))
        .otherwise(lit(PortfolioBias::Neutral.as_str()))
}

// ================================================================================================
// Helper Functions
// ================================================================================================
fn convert_err(e: polars::error::PolarsError) -> TradelensError {
    polars_to_tradelens_error("delta exposure report", e)
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
pub enum DeltaExposureCol {
    TradeCount,
    TotalDelta,
    AvgDelta,
    NeutralSharePct,
    PortfolioBias,
}

impl From<DeltaExposureCol> for PlSmallStr {
    fn from(value: DeltaExposureCol) -> Self {
        value.as_str().into()
    }
}

impl DeltaExposureCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
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
pub enum StrategyDeltaCol {
    Strategy,
    AvgDelta,
    TotalDelta,
    TotalPnl,
    TradeCount,
}

impl From<StrategyDeltaCol> for PlSmallStr {
    fn from(value: StrategyDeltaCol) -> Self {
        value.as_str().into()
    }
}

impl StrategyDeltaCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::trade_log::{TradeRecord, tests::record};

    // ========================================================================
    // Helper: Build Trade Log
    // ========================================================================

    fn with_delta(strategy: &str, pnl: f64, delta: f64, category: &str) -> TradeRecord {
        let mut r = record(strategy, "SPX", "closed", pnl, None, None);
        r.estimated_delta = delta;
        r.delta_category = category.to_string();
        r
    }

    fn sample_log() -> TradeLog {
        TradeLog::from_records(&[
            with_delta("Iron Condor", 100.0, 0.0, "Neutral"),
            with_delta("Short Put Spread", -50.0, 30.0, "Bullish"),
            with_delta("Iron Condor", 200.0, 0.0, "Neutral"),
            with_delta("Long Put", -120.0, -40.0, "Bearish"),
            with_delta("Short Put Spread", 150.0, 30.0, "Bullish"),
        ])
        .expect("Failed to build TradeLog")
    }

    // ========================================================================
    // Test: Portfolio Exposure
    // ========================================================================

    #[test]
    fn test_exposure_summary() {
        let summary = sample_log()
            .delta_exposure(DEFAULT_BIAS_THRESHOLD)
            .expect("Exposure failed")
            .summary()
            .expect("Summary failed");

        assert_eq!(summary.trade_count, 5);
        assert_eq!(summary.total_delta, 20.0);
        assert_eq!(summary.avg_delta, 4.0);
        assert_eq!(summary.neutral_share_pct, 40.0);
        assert_eq!(summary.portfolio_bias, PortfolioBias::Neutral);
    }

    #[test]
    fn test_bias_threshold_is_exclusive() {
        assert_eq!(PortfolioBias::classify(50.0, 50.0), PortfolioBias::Neutral);
        assert_eq!(PortfolioBias::classify(50.5, 50.0), PortfolioBias::Bullish);
        assert_eq!(PortfolioBias::classify(-50.0, 50.0), PortfolioBias::Neutral);
        assert_eq!(PortfolioBias::classify(-51.0, 50.0), PortfolioBias::Bearish);

        let log = sample_log();
        let bias = |t: f64| {
            log.delta_exposure(t)
                .and_then(|e| e.summary())
                .expect("Summary failed")
                .portfolio_bias
        };
        assert_eq!(bias(10.0), PortfolioBias::Bullish);
        assert_eq!(bias(20.0), PortfolioBias::Neutral);
    }

    #[test]
    fn test_empty_log_is_neutral() {
        let exposure = TradeLog::default()
            .delta_exposure(DEFAULT_BIAS_THRESHOLD)
            .expect("Should handle empty TradeLog");
        assert_eq!(exposure.as_df().height(), 0);

        let summary = exposure.summary().expect("Summary failed");
        assert_eq!(summary.total_delta, 0.0);
        assert_eq!(summary.neutral_share_pct, 0.0);
        assert_eq!(summary.portfolio_bias, PortfolioBias::Neutral);
        assert_eq!(summary.bias_threshold, DEFAULT_BIAS_THRESHOLD);
    }

    #[test]
    fn test_exposure_data_types() {
        let exposure = sample_log()
            .delta_exposure(DEFAULT_BIAS_THRESHOLD)
            .expect("Exposure failed");
        let df = exposure.as_df();
        for (name, dtype) in DeltaExposure::to_schema().iter() {
            let actual = df
                .column(name)
                .unwrap_or_else(|_| panic!("Column '{name}' not found"))
                .dtype();
            assert_eq!(actual, dtype, "Mismatch for '{name}'");
        }
    }

    // ========================================================================
    // Test: Per-Strategy Exposure
    // ========================================================================

    #[test]
    fn test_strategy_delta_rows() {
        let rows = sample_log()
            .strategy_delta()
            .expect("Strategy delta failed")
            .rows()
            .expect("Failed to read rows");

        let order = rows.iter().map(|r| r.strategy.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["Iron Condor", "Short Put Spread", "Long Put"]);

        let spread = &rows[1];
        assert_eq!(spread.trade_count, 2);
        assert_eq!(spread.avg_delta, 30.0);
        assert_eq!(spread.total_delta, 60.0);
        assert_eq!(spread.total_pnl, 100.0);
    }

    #[test]
    fn test_strategy_delta_column_order() {
        let table = sample_log().strategy_delta().expect("Strategy delta failed");
        let names = table
            .as_df()
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>();
        let expected = StrategyDeltaCol::iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_strategy_delta_empty() {
        let table = TradeLog::default()
            .strategy_delta()
            .expect("Should handle empty TradeLog");
        assert!(table.rows().expect("Failed to read rows").is_empty());
    }
}
