use std::sync::Arc;

use polars::{
    frame::DataFrame,
    prelude::{DataType, Expr, Field, IntoLazy, PlSmallStr, Schema, SchemaRef, col, len, lit},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{TradelensError, TradelensResult},
    report::{
        io::{Report, ReportName, ToSchema, generate_dynamic_base_name},
        polars_ext::{DataFrameExt, ExprExt, polars_to_tradelens_error},
        ratio::Ratio,
        trade_log::{TradeLog, TradeLogCol},
    },
};

#[derive(Debug, Clone)]
pub struct TradeStatistics {
    df: DataFrame,
}

impl Default for TradeStatistics {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&TradeStatistics::to_schema());
        Self { df }
    }
}

impl ReportName for TradeStatistics {
    fn base_name(&self) -> String {
        generate_dynamic_base_name(&self.df, "trade_statistics")
    }
}

impl Report for TradeStatistics {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for TradeStatistics {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = TradeStatCol::iter()
            .map(|col| {
                let dtype = match col {
                    TradeStatCol::TradeCount
                    | TradeStatCol::WinCount
                    | TradeStatCol::LossCount
                    | TradeStatCol::BreakEvenCount => DataType::UInt32,

                    TradeStatCol::TotalPnl
                    | TradeStatCol::WinRate
                    | TradeStatCol::GrossProfit
                    | TradeStatCol::GrossLoss
                    | TradeStatCol::ProfitFactor
                    | TradeStatCol::AvgPnl
                    | TradeStatCol::MedianPnl
                    | TradeStatCol::BestTradePnl
                    | TradeStatCol::WorstTradePnl
                    | TradeStatCol::AvgReturnPct
                    | TradeStatCol::AvgDaysInTrade => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl TryFrom<&TradeLog> for TradeStatistics {
    type Error = TradelensError;

    fn try_from(log: &TradeLog) -> TradelensResult<Self> {
        if log.as_df().is_empty() {
            return Ok(TradeStatistics::default());
        }

        let df = log
            .as_df()
            .clone()
            .lazy()
            .select(exprs())
            .collect()
            .map_err(convert_err)?;

        Ok(Self { df })
    }
}

impl TradeStatistics {
    /// Reads the single statistics row into typed values.
    ///
    /// An empty report (no trades) yields [`Headline::default`]: zero counts and
    /// sums, zero win rate and an undefined profit factor.
    pub fn headline(&self) -> TradelensResult<Headline> {
        let df = &self.df;
        if df.height() == 0 {
            return Ok(Headline::default());
        }

        let u = |c: TradeStatCol| -> TradelensResult<u32> {
            Ok(df.u32_at(c.as_str(), 0)?.unwrap_or_default())
        };
        let f = |c: TradeStatCol| -> TradelensResult<f64> {
            Ok(df.f64_at(c.as_str(), 0)?.unwrap_or_default())
        };

        Ok(Headline {
            total_pnl: f(TradeStatCol::TotalPnl)?,
            trade_count: u(TradeStatCol::TradeCount)?,
            win_count: u(TradeStatCol::WinCount)?,
            loss_count: u(TradeStatCol::LossCount)?,
            break_even_count: u(TradeStatCol::BreakEvenCount)?,
            win_rate: f(TradeStatCol::WinRate)?,
            gross_profit: f(TradeStatCol::GrossProfit)?,
            gross_loss: f(TradeStatCol::GrossLoss)?,
            profit_factor: df.f64_at(TradeStatCol::ProfitFactor.as_str(), 0)?.into(),
            avg_pnl: f(TradeStatCol::AvgPnl)?,
            median_pnl: f(TradeStatCol::MedianPnl)?,
            best_trade_pnl: f(TradeStatCol::BestTradePnl)?,
            worst_trade_pnl: f(TradeStatCol::WorstTradePnl)?,
            avg_return_pct: f(TradeStatCol::AvgReturnPct)?,
            avg_days_in_trade: f(TradeStatCol::AvgDaysInTrade)?,
        })
    }
}

/// Headline figures of a trade log.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Headline {
    pub total_pnl: f64,
    pub trade_count: u32,
    pub win_count: u32,
    pub loss_count: u32,
    pub break_even_count: u32,
    /// Percentage in `[0, 100]`.
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Magnitude of losses, never negative.
    pub gross_loss: f64,
    pub profit_factor: Ratio,
    pub avg_pnl: f64,
    pub median_pnl: f64,
    pub best_trade_pnl: f64,
    pub worst_trade_pnl: f64,
    pub avg_return_pct: f64,
    pub avg_days_in_trade: f64,
}

fn exprs() -> Vec<Expr> {
    vec![
        // === Totals ===
        total_pnl_expr()
            .alias(TradeStatCol::TotalPnl)
            .cast(DataType::Float64),
        // === Trade counts ===
        trade_count_expr()
            .alias(TradeStatCol::TradeCount)
            .cast(DataType::UInt32),
        win_count_expr()
            .alias(TradeStatCol::WinCount)
            .cast(DataType::UInt32),
        loss_count_expr()
            .alias(TradeStatCol::LossCount)
            .cast(DataType::UInt32),
        break_even_count_expr()
            .alias(TradeStatCol::BreakEvenCount)
            .cast(DataType::UInt32),
        // === Ratios ===
        win_rate_expr()
            .alias(TradeStatCol::WinRate)
            .cast(DataType::Float64),
        gross_profit_expr()
            .alias(TradeStatCol::GrossProfit)
            .cast(DataType::Float64),
        gross_loss_expr()
            .alias(TradeStatCol::GrossLoss)
            .cast(DataType::Float64),
        profit_factor_expr()
            .alias(TradeStatCol::ProfitFactor)
            .cast(DataType::Float64),
        // === Distribution ===
        avg_pnl_expr()
            .alias(TradeStatCol::AvgPnl)
            .cast(DataType::Float64),
        median_pnl_expr()
            .alias(TradeStatCol::MedianPnl)
            .cast(DataType::Float64),
        col(TradeLogCol::Pnl)
            .max()
            .alias(TradeStatCol::BestTradePnl)
            .cast(DataType::Float64),
        col(TradeLogCol::Pnl)
            .min()
            .alias(TradeStatCol::WorstTradePnl)
            .cast(DataType::Float64),
        // === Holding ===
        avg_return_pct_expr()
            .alias(TradeStatCol::AvgReturnPct)
            .cast(DataType::Float64),
        avg_days_in_trade_expr()
            .alias(TradeStatCol::AvgDaysInTrade)
            .cast(DataType::Float64),
    ]
}

// ================================================================================================
// === Totals ===
// ================================================================================================
pub(super) fn total_pnl_expr() -> Expr {
    col(TradeLogCol::Pnl).sum()
}

// ================================================================================================
// === Trade counts ===
// ================================================================================================
pub(super) fn trade_count_expr() -> Expr {
    len()
}

pub(super) fn win_count_expr() -> Expr {
    col(TradeLogCol::Pnl)
        .gt(lit(0.0))
        .cast(DataType::UInt32)
        .sum()
}

pub(super) fn loss_count_expr() -> Expr {
    col(TradeLogCol::Pnl)
        .lt(lit(0.0))
        .cast(DataType::UInt32)
        .sum()
}

fn break_even_count_expr() -> Expr {
    col(TradeLogCol::Pnl)
        .eq(lit(0.0))
        .cast(DataType::UInt32)
        .sum()
}

// ================================================================================================
// === Ratios ===
// ================================================================================================
pub(super) fn win_rate_expr() -> Expr {
    (win_count_expr().cast(DataType::Float64) * lit(100.0))
        .safe_div(trade_count_expr().cast(DataType::Float64), Some(0.0))
}

pub(super) fn gross_profit_expr() -> Expr {
    col(TradeLogCol::Pnl)
        .filter(col(TradeLogCol::Pnl).gt(lit(0.0)))
        .sum()
}

pub(super) fn gross_loss_expr() -> Expr {
    lit(0.0)
        - col(TradeLogCol::Pnl)
            .filter(col(TradeLogCol::Pnl).lt(lit(0.0)))
            .sum()
}

/// Null when there is no gross loss.
pub(super) fn profit_factor_expr() -> Expr {
    gross_profit_expr().safe_div(gross_loss_expr(), None)
}

// ================================================================================================
// === Distribution ===
// ================================================================================================
pub(super) fn avg_pnl_expr() -> Expr {
    col(TradeLogCol::Pnl).mean()
}

pub(super) fn median_pnl_expr() -> Expr {
    col(TradeLogCol::Pnl).median()
}

// ================================================================================================
// === Holding ===
// ================================================================================================
pub(super) fn avg_return_pct_expr() -> Expr {
    col(TradeLogCol::ReturnPct).mean()
}

pub(super) fn avg_days_in_trade_expr() -> Expr {
    col(TradeLogCol::DaysInTrade)
        .cast(DataType::Float64)
        .mean()
}

// ================================================================================================
// Helper Functions
// ================================================================================================
fn convert_err(e: polars::error::PolarsError) -> TradelensError {
    polars_to_tradelens_error("trade statistics", e)
}

/// Headline performance figures of a set of trades.
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
pub enum TradeStatCol {
    // === Totals ===
    /// Sum of realized P&L.
    TotalPnl,

    // === Trade counts ===
    TradeCount,
    /// Trades with P&L strictly above zero.
    WinCount,
    /// Trades with P&L strictly below zero.
    LossCount,
    /// Trades with P&L of exactly zero; neither wins nor losses.
    BreakEvenCount,

    // === Ratios ===
    /// Wins as a percentage of all trades.
    WinRate,
    GrossProfit,
    GrossLoss,
    /// Gross profit over gross loss; null when there is no loss.
    ProfitFactor,

    // === Distribution ===
    AvgPnl,
    MedianPnl,
    BestTradePnl,
    WorstTradePnl,

    // === Holding ===
    AvgReturnPct,
    AvgDaysInTrade,
}

impl From<TradeStatCol> for PlSmallStr {
    fn from(value: TradeStatCol) -> Self {
        value.as_str().into()
    }
}

impl TradeStatCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
