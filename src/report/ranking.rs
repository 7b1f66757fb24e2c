use std::sync::Arc;

use polars::{
    df,
    frame::DataFrame,
    prelude::{
        DataType, Field, IntoLazy, PlSmallStr, Schema, SchemaExt, SchemaRef, SortMultipleOptions,
        col, lit,
    },
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::{TradelensError, TradelensResult},
    report::{
        io::{Report, ReportName, ToSchema, generate_dynamic_base_name},
        polars_ext::polars_to_tradelens_error,
        trade_log::{TradeLog, TradeLogCol, TradeRecord, TradeStatus, records_from_df},
    },
};

/// Default number of trades listed on each side of the ranking.
pub const DEFAULT_TOP_N: usize = 10;

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
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum RankingCol {
    RankSide,
    Rank,
}

impl From<RankingCol> for PlSmallStr {
    fn from(value: RankingCol) -> Self {
        value.as_str().into()
    }
}

impl RankingCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RankSide {
    Best,
    Worst,
}

impl RankSide {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl ToSchema for TradeRanking {
    fn to_schema() -> SchemaRef {
        let mut fields: Vec<Field> = RankingCol::iter()
            .map(|col| {
                let dtype = match col {
                    RankingCol::RankSide => DataType::String,
                    RankingCol::Rank => DataType::UInt32,
                };
                Field::new(col.into(), dtype)
            })
            .collect();
        fields.extend(TradeLog::to_schema().iter_fields());

        Arc::new(Schema::from_iter(fields))
    }
}

/// The `top_n` most profitable and `top_n` least profitable trades.
///
/// # Columns
///
/// - `rank_side`: `best` or `worst`.
/// - `rank`: 1-based position within the side.
/// - followed by every trade log column.
///
/// Best trades with equal P&L keep their log order; worst trades with equal P&L
/// list the later trade first. A log with fewer than `top_n` trades lists all of
/// them on both sides.
#[derive(Debug, Clone)]
pub struct TradeRanking {
    df: DataFrame,
    top_n: usize,
}

impl ReportName for TradeRanking {
    fn base_name(&self) -> String {
        generate_dynamic_base_name(&self.df, "trade_ranking")
    }
}

impl Report for TradeRanking {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl TradeRanking {
    pub fn new(log: &TradeLog, top_n: usize) -> TradelensResult<Self> {
        let best = ranked(log.as_df(), RankSide::Best, top_n)?;
        let worst = ranked(log.as_df(), RankSide::Worst, top_n)?;
        let df = best.vstack(&worst).map_err(convert_err)?;
        Ok(Self { df, top_n })
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Best trades, highest P&L first.
    pub fn best(&self) -> TradelensResult<Vec<TradeRecord>> {
        self.side(RankSide::Best)
    }

    /// Worst trades, lowest P&L first.
    pub fn worst(&self) -> TradelensResult<Vec<TradeRecord>> {
        self.side(RankSide::Worst)
    }

    pub fn observations(&self) -> TradelensResult<RankingObservations> {
        let best = self.best()?;
        let worst = self.worst()?;

        let count_status = |trades: &[TradeRecord], status: TradeStatus| {
            trades
                .iter()
                .filter(|t| t.status_kind() == Some(status))
                .count()
        };
        let avg_pnl = |trades: &[TradeRecord]| {
            if trades.is_empty() {
                0.0
            } else {
                trades.iter().map(|t| t.pnl).sum::<f64>() / trades.len() as f64
            }
        };

        Ok(RankingObservations {
            best_count: best.len(),
            worst_count: worst.len(),
            best_closed_count: count_status(&best, TradeStatus::Closed),
            worst_expired_count: count_status(&worst, TradeStatus::Expired),
            best_avg_pnl: avg_pnl(&best),
            worst_avg_pnl: avg_pnl(&worst),
        })
    }

    fn side(&self, side: RankSide) -> TradelensResult<Vec<TradeRecord>> {
        let df = self
            .df
            .clone()
            .lazy()
            .filter(col(RankingCol::RankSide).eq(lit(side.as_str())))
            .collect()
            .map_err(convert_err)?;
        records_from_df(&df)
    }
}

/// What the best and worst lists have in common.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RankingObservations {
    pub best_count: usize,
    pub worst_count: usize,
    /// Closed trades among the best.
    pub best_closed_count: usize,
    /// Expired trades among the worst.
    pub worst_expired_count: usize,
    pub best_avg_pnl: f64,
    pub worst_avg_pnl: f64,
}

// ================================================================================================
// Helper Functions
// ================================================================================================

/// Both sides slice one ordering (P&L descending, log order on ties), so the best
/// and worst lists never share a trade while `n <= len / 2`.
fn ranked(df: &DataFrame, side: RankSide, n: usize) -> TradelensResult<DataFrame> {
    let ordered = df
        .sort(
            [TradeLogCol::Pnl.as_str()],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_maintain_order(true),
        )
        .map_err(convert_err)?;
    let head = match side {
        RankSide::Best => ordered.head(Some(n)),
        RankSide::Worst => ordered.tail(Some(n)).reverse(),
    };

    let height = head.height();
    let ranks = (1..=height).map(|r| r as u32).collect::<Vec<_>>();
    let mut out = df![
        RankingCol::RankSide.as_str() => vec![side.as_str(); height],
        RankingCol::Rank.as_str() => ranks,
    ]
    .map_err(convert_err)?;

    out.hstack_mut(head.get_columns()).map_err(convert_err)?;
    Ok(out)
}

fn convert_err(e: polars::error::PolarsError) -> TradelensError {
    polars_to_tradelens_error("trade ranking", e)
}
