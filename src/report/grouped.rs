use std::sync::Arc;

use polars::{
    frame::DataFrame,
    prelude::{
        DataType, Expr, Field, IntoLazy, LazyGroupBy, PlSmallStr, Schema, SchemaRef,
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
        ratio::Ratio,
        trade_log::{TradeLog, TradeLogCol},
        trade_statistics::{
            avg_days_in_trade_expr, avg_pnl_expr, avg_return_pct_expr, gross_loss_expr,
            gross_profit_expr, loss_count_expr, median_pnl_expr, profit_factor_expr,
            total_pnl_expr, trade_count_expr, win_count_expr, win_rate_expr,
        },
    },
};

/// A TradeLog in a "Grouped" state.
/// Operations performed on this struct will return results per group.
pub struct GroupedTradeLog<'a> {
    log: &'a TradeLog,
    group_keys: Vec<GroupCol>,
}

impl<'a> GroupedTradeLog<'a> {
    /// Access raw Polars lazy API for custom queries
    pub fn lazy(&self) -> LazyGroupBy {
        let group_cols: Vec<Expr> = self.group_keys.iter().map(GroupCol::as_expr).collect();
        self.log.as_df().clone().lazy().group_by_stable(group_cols)
    }

    pub fn stats(&self) -> TradelensResult<GroupStatistics> {
        self.try_into()
    }

    pub fn source(&self) -> &TradeLog {
        self.log
    }

    pub fn group_criteria(&self) -> &[GroupCol] {
        &self.group_keys
    }
}

impl<'a> GroupedTradeLog<'a> {
    pub(crate) fn new(log: &'a TradeLog, keys: impl IntoIterator<Item = GroupCol>) -> Self {
        Self {
            log,
            group_keys: keys.into_iter().collect(),
        }
    }
}

/// Represents the subset of columns valid for grouping operations.
///
/// Grouping always uses the literal column value, so values outside the
/// well-known set (an unexpected status, say) form groups of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case", prefix = "__")]
pub enum GroupCol {
    /// The strategy label (`type`).
    Strategy,
    /// The trade status.
    Status,
    /// The underlying symbol.
    Symbol,
    /// The delta category label.
    DeltaCategory,
    /// The month the trade was opened, as `YYYY-MM`. Rows without an open date are excluded.
    OpenMonth,
}

impl From<GroupCol> for TradeLogCol {
    fn from(col: GroupCol) -> Self {
        match col {
            GroupCol::Strategy => TradeLogCol::Strategy,
            GroupCol::Status => TradeLogCol::Status,
            GroupCol::Symbol => TradeLogCol::Symbol,
            GroupCol::DeltaCategory => TradeLogCol::DeltaCategory,
            // === Virtual column (mapped to parent date column) ===
            GroupCol::OpenMonth => TradeLogCol::OpenDate,
        }
    }
}

impl From<GroupCol> for PlSmallStr {
    fn from(value: GroupCol) -> Self {
        value.as_str().into()
    }
}

impl From<&GroupCol> for PlSmallStr {
    fn from(value: &GroupCol) -> Self {
        value.as_str().into()
    }
}

impl GroupCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Converts the group column into a Polars Expression.
    pub fn as_expr(&self) -> Expr {
        let source_col: TradeLogCol = (*self).into();

        let expr = match self {
            // === Simple Passthrough Columns ===
            Self::Strategy | Self::Status | Self::Symbol | Self::DeltaCategory => col(source_col),

            // === Virtual Time Columns ===
            Self::OpenMonth => col(source_col).dt().strftime("%Y-%m"),
        };

        expr.alias(*self)
    }
}

// ================================================================================================
// Group Statistics
// ================================================================================================

/// Per-group performance metrics, one row per group.
///
/// Rows are ordered by total P&L descending; equal totals keep the order in
/// which their groups first appear in the trade log.
#[derive(Debug, Clone, Default)]
pub struct GroupStatistics {
    df: DataFrame,
    keys: Vec<GroupCol>,
}

impl ReportName for GroupStatistics {
    fn base_name(&self) -> String {
        generate_dynamic_base_name(&self.df, "group_statistics")
    }
}

impl Report for GroupStatistics {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl ToSchema for GroupStatistics {
    /// Metric columns only; group key columns are prepended per grouping.
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = GroupStatCol::iter()
            .map(|col| {
                let dtype = match col {
                    GroupStatCol::TradeCount | GroupStatCol::WinCount | GroupStatCol::LossCount => {
                        DataType::UInt32
                    }

                    GroupStatCol::TotalPnl
                    | GroupStatCol::AvgPnl
                    | GroupStatCol::MedianPnl
                    | GroupStatCol::WinRate
                    | GroupStatCol::GrossProfit
                    | GroupStatCol::GrossLoss
                    | GroupStatCol::ProfitFactor
                    | GroupStatCol::AvgReturnPct
                    | GroupStatCol::AvgDaysInTrade => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

impl TryFrom<&GroupedTradeLog<'_>> for GroupStatistics {
    type Error = TradelensError;

    fn try_from(gl: &GroupedTradeLog) -> TradelensResult<Self> {
        let keys = gl.group_criteria().to_vec();
        if keys.is_empty() {
            return Err(DataError::DataFrame(
                "Group statistics need at least one group column".to_string(),
            )
            .into());
        }

        if gl.source().is_empty() {
            return Ok(Self {
                df: DataFrame::empty_with_schema(&Self::to_schema()),
                keys,
            });
        }

        let mut lf = gl.source().as_df().clone().lazy();
        if keys.contains(&GroupCol::OpenMonth) {
            lf = lf.filter(col(TradeLogCol::OpenDate).is_not_null());
        }

        let key_exprs = keys.iter().map(GroupCol::as_expr).collect::<Vec<_>>();
        let df = lf
            .group_by_stable(key_exprs)
            .agg(exprs())
            .sort(
                [GroupStatCol::TotalPnl.as_str()],
                SortMultipleOptions::default()
                    .with_order_descending(true)
                    .with_maintain_order(true),
            )
            .collect()
            .map_err(convert_err)?;

        Ok(Self { df, keys })
    }
}

impl GroupStatistics {
    pub fn keys(&self) -> &[GroupCol] {
        &self.keys
    }

    /// Reorders the rows ascending by their group keys (e.g. chronological for months).
    pub fn sorted_by_keys(self) -> TradelensResult<Self> {
        if self.df.height() == 0 {
            return Ok(self);
        }

        let by = self.keys.iter().map(GroupCol::as_str).collect::<Vec<_>>();
        let df = self
            .df
            .sort(by, SortMultipleOptions::default().with_maintain_order(true))
            .map_err(convert_err)?;
        Ok(Self {
            df,
            keys: self.keys,
        })
    }

    /// Reads every group row into typed values, in report order.
    pub fn rows(&self) -> TradelensResult<Vec<GroupRow>> {
        let df = &self.df;
        (0..df.height())
            .map(|i| -> TradelensResult<GroupRow> {
                let keys = self
                    .keys
                    .iter()
                    .map(|k| -> TradelensResult<String> {
                        Ok(df.str_at(k.as_str(), i)?.unwrap_or_default())
                    })
                    .collect::<TradelensResult<Vec<_>>>()?;

                let u = |c: GroupStatCol| -> TradelensResult<u32> {
                    Ok(df.u32_at(c.as_str(), i)?.unwrap_or_default())
                };
                let f = |c: GroupStatCol| -> TradelensResult<f64> {
                    Ok(df.f64_at(c.as_str(), i)?.unwrap_or_default())
                };

                Ok(GroupRow {
                    keys,
                    trade_count: u(GroupStatCol::TradeCount)?,
                    win_count: u(GroupStatCol::WinCount)?,
                    loss_count: u(GroupStatCol::LossCount)?,
                    total_pnl: f(GroupStatCol::TotalPnl)?,
                    avg_pnl: f(GroupStatCol::AvgPnl)?,
                    median_pnl: f(GroupStatCol::MedianPnl)?,
                    win_rate: f(GroupStatCol::WinRate)?,
                    gross_profit: f(GroupStatCol::GrossProfit)?,
                    gross_loss: f(GroupStatCol::GrossLoss)?,
                    profit_factor: df.f64_at(GroupStatCol::ProfitFactor.as_str(), i)?.into(),
                    avg_return_pct: f(GroupStatCol::AvgReturnPct)?,
                    avg_days_in_trade: f(GroupStatCol::AvgDaysInTrade)?,
                })
            })
            .collect()
    }
}

/// Metrics of one group. `keys` holds one value per grouping column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub keys: Vec<String>,
    pub trade_count: u32,
    pub win_count: u32,
    pub loss_count: u32,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub median_pnl: f64,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: Ratio,
    pub avg_return_pct: f64,
    pub avg_days_in_trade: f64,
}

impl GroupRow {
    /// The group label; composite keys are joined with ` / `.
    pub fn label(&self) -> String {
        self.keys.join(" / ")
    }
}

fn exprs() -> Vec<Expr> {
    vec![
        // === Trade counts ===
        trade_count_expr()
            .alias(GroupStatCol::TradeCount)
            .cast(DataType::UInt32),
        win_count_expr()
            .alias(GroupStatCol::WinCount)
            .cast(DataType::UInt32),
        loss_count_expr()
            .alias(GroupStatCol::LossCount)
            .cast(DataType::UInt32),
        // === P&L ===
        total_pnl_expr()
            .alias(GroupStatCol::TotalPnl)
            .cast(DataType::Float64),
        avg_pnl_expr()
            .alias(GroupStatCol::AvgPnl)
            .cast(DataType::Float64),
        median_pnl_expr()
            .alias(GroupStatCol::MedianPnl)
            .cast(DataType::Float64),
        // === Ratios ===
        win_rate_expr()
            .alias(GroupStatCol::WinRate)
            .cast(DataType::Float64),
        gross_profit_expr()
            .alias(GroupStatCol::GrossProfit)
            .cast(DataType::Float64),
        gross_loss_expr()
            .alias(GroupStatCol::GrossLoss)
            .cast(DataType::Float64),
        profit_factor_expr()
            .alias(GroupStatCol::ProfitFactor)
            .cast(DataType::Float64),
        // === Holding ===
        avg_return_pct_expr()
            .alias(GroupStatCol::AvgReturnPct)
            .cast(DataType::Float64),
        avg_days_in_trade_expr()
            .alias(GroupStatCol::AvgDaysInTrade)
            .cast(DataType::Float64),
    ]
}

fn convert_err(e: polars::error::PolarsError) -> TradelensError {
    polars_to_tradelens_error("group statistics", e)
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
pub enum GroupStatCol {
    // === Trade counts ===
    TradeCount,
    WinCount,
    LossCount,

    // === P&L ===
    TotalPnl,
    AvgPnl,
    MedianPnl,

    // === Ratios ===
    WinRate,
    GrossProfit,
    GrossLoss,
    /// Null when the group has no losing trade.
    ProfitFactor,

    // === Holding ===
    AvgReturnPct,
    AvgDaysInTrade,
}

impl From<GroupStatCol> for PlSmallStr {
    fn from(value: GroupStatCol) -> Self {
        value.as_str().into()
    }
}

impl GroupStatCol {
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
    // Helper: Build Trade Logs
    // ========================================================================

    fn sample_records() -> Vec<TradeRecord> {
        vec![
            record("Short Put Spread", "QQQ", "expired", -50.0, Some("2024-01-05"), None),
            record("Iron Condor", "SPX", "closed", 100.0, Some("2024-01-02"), None),
            record("Long Call", "AAPL", "closed", 25.0, Some("2024-02-12"), None),
            record("Iron Condor", "QQQ", "closed", 200.0, Some("2024-02-20"), None),
            record("Long Put", "SPX", "rolled", 25.0, None, None),
            record("Iron Condor", "SPX", "expired", -120.0, Some("2024-03-05"), None),
        ]
    }

    fn sample_log() -> TradeLog {
        TradeLog::from_records(&sample_records()).expect("Failed to build TradeLog")
    }

    fn row<'a>(rows: &'a [GroupRow], label: &str) -> &'a GroupRow {
        rows.iter()
            .find(|r| r.label() == label)
            .unwrap_or_else(|| panic!("Missing group '{label}'"))
    }

    // ========================================================================
    // Test: Ordering
    // ========================================================================

    #[test]
    fn test_strategy_breakdown_ordered_by_total_pnl() {
        let log = sample_log();
        let rows = log
            .group_by([GroupCol::Strategy])
            .stats()
            .expect("Grouping failed")
            .rows()
            .expect("Failed to read rows");

        let labels = rows.iter().map(GroupRow::label).collect::<Vec<_>>();
        // Iron Condor 180, Long Call 25 and Long Put 25 tie (Long Call appears first), then -50.
        assert_eq!(
            labels,
            vec!["Iron Condor", "Long Call", "Long Put", "Short Put Spread"]
        );

        let condor = row(&rows, "Iron Condor");
        assert_eq!(condor.trade_count, 3);
        assert_eq!(condor.win_count, 2);
        assert_eq!(condor.loss_count, 1);
        assert_eq!(condor.total_pnl, 180.0);
        assert_eq!(condor.avg_pnl, 60.0);
        assert_eq!(condor.median_pnl, 100.0);
        assert!((condor.win_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(condor.gross_profit, 300.0);
        assert_eq!(condor.gross_loss, 120.0);
        assert_eq!(condor.profit_factor, Ratio::Value(2.5));
    }

    #[test]
    fn test_group_totals_sum_to_overall_total() {
        let log = sample_log();
        let rows = log
            .group_by([GroupCol::Strategy])
            .stats()
            .expect("Grouping failed")
            .rows()
            .expect("Failed to read rows");

        let total: f64 = rows.iter().map(|r| r.total_pnl).sum();
        let count: u32 = rows.iter().map(|r| r.trade_count).sum();
        assert_eq!(total, 180.0);
        assert_eq!(count as usize, log.len());
    }

    // ========================================================================
    // Test: Literal Keys
    // ========================================================================

    #[test]
    fn test_unknown_status_forms_own_group() {
        let log = sample_log();
        let rows = log
            .group_by([GroupCol::Status])
            .stats()
            .expect("Grouping failed")
            .rows()
            .expect("Failed to read rows");

        assert_eq!(rows.len(), 3);
        let rolled = row(&rows, "rolled");
        assert_eq!(rolled.trade_count, 1);
        assert_eq!(rolled.profit_factor, Ratio::Undefined);

        let expired = row(&rows, "expired");
        assert_eq!(expired.avg_pnl, -85.0);
        assert_eq!(expired.profit_factor, Ratio::Value(0.0));
    }

    #[test]
    fn test_two_key_grouping() {
        let log = sample_log();
        let stats = log
            .group_by([GroupCol::Strategy, GroupCol::Status])
            .stats()
            .expect("Grouping failed");
        assert_eq!(stats.base_name(), "strategy_status_group_statistics");

        let rows = stats.rows().expect("Failed to read rows");
        assert_eq!(rows.len(), 5);
        let condor_closed = row(&rows, "Iron Condor / closed");
        assert_eq!(condor_closed.trade_count, 2);
        assert_eq!(condor_closed.total_pnl, 300.0);
    }

    #[test]
    fn test_monthly_grouping_skips_undated_rows() {
        let log = sample_log();
        let rows = log
            .group_by([GroupCol::OpenMonth])
            .stats()
            .expect("Grouping failed")
            .sorted_by_keys()
            .expect("Sort failed")
            .rows()
            .expect("Failed to read rows");

        let months = rows
            .iter()
            .map(|r| (r.label(), r.total_pnl))
            .collect::<Vec<_>>();
        assert_eq!(
            months,
            vec![
                ("2024-01".to_string(), 50.0),
                ("2024-02".to_string(), 225.0),
                ("2024-03".to_string(), -120.0),
            ]
        );
    }

    // ========================================================================
    // Test: Edge Cases
    // ========================================================================

    #[test]
    fn test_empty_trade_log() {
        let log = TradeLog::default();
        let stats = log
            .group_by([GroupCol::Symbol])
            .stats()
            .expect("Should handle empty TradeLog");
        assert_eq!(stats.as_df().height(), 0);
        assert!(stats.rows().expect("Failed to read rows").is_empty());
    }

    #[test]
    fn test_grouping_without_keys_is_rejected() {
        let log = sample_log();
        let result = log.group_by([]).stats();
        assert!(result.is_err());
    }
}
