use std::{collections::BTreeSet, io::Write, str::FromStr, sync::Arc};

use chrono::{Datelike, NaiveDate};
use polars::{
    df,
    frame::DataFrame,
    prelude::{
        BooleanChunked, DataType, Field, IntoLazy, NamedFrom, PlSmallStr, Schema, SchemaRef,
        SortMultipleOptions, col,
    },
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use crate::{
    error::{DataError, TradelensError, TradelensResult},
    report::{
        cumulative_pnl::CumulativePnl,
        delta_exposure::{DeltaExposure, StrategyDeltaTable},
        filter::{DateRange, TradeFilter},
        grouped::{GroupCol, GroupedTradeLog},
        io::{Report, ReportName, ToSchema, generate_dynamic_base_name, write_df_csv},
        polars_ext::polars_to_tradelens_error,
        ranking::TradeRanking,
        summary::MetricsSummary,
        trade_statistics::TradeStatistics,
    },
};

/// Days between 0001-01-01 (CE) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Columns of a trade log, named exactly as in the CSV header.
///
/// The declaration order is the input (and export) column order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
    EnumCount,
)]
pub enum TradeLogCol {
    // === Identifiers ===
    /// Name of the bot that placed the trade.
    #[strum(serialize = "botName")]
    BotName,
    /// Free-form strategy label (e.g., `Iron Condor`).
    #[strum(serialize = "type")]
    Strategy,
    /// Underlying ticker (e.g., `SPX`).
    #[strum(serialize = "symbol")]
    Symbol,
    /// Outcome status, `closed` or `expired` for well-formed data.
    #[strum(serialize = "status")]
    Status,

    // === Size and outcome ===
    #[strum(serialize = "quantity")]
    Quantity,
    /// Realized profit or loss in dollars.
    #[strum(serialize = "pnl")]
    Pnl,
    /// Realized return as a fraction.
    #[strum(serialize = "returnPct")]
    ReturnPct,
    #[strum(serialize = "daysInTrade")]
    DaysInTrade,

    // === Dates ===
    #[strum(serialize = "openDate")]
    OpenDate,
    #[strum(serialize = "closeDate")]
    CloseDate,

    // === Exposure ===
    /// Signed directional exposure estimate.
    #[strum(serialize = "estimated_delta")]
    EstimatedDelta,
    /// `Neutral`, `Bullish` or `Bearish` in practice.
    #[strum(serialize = "delta_category")]
    DeltaCategory,
}

impl From<TradeLogCol> for PlSmallStr {
    fn from(value: TradeLogCol) -> Self {
        value.as_str().into()
    }
}

impl TradeLogCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// The two outcome statuses the dashboard names explicitly.
///
/// Grouping never goes through this enum: unknown status strings form their own
/// groups. It exists for the lookups that ask for exactly these two.
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
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    /// Closed before expiration.
    Closed,
    /// Held to expiration.
    Expired,
}

impl TradeStatus {
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
    EnumIter,
    IntoStaticStr,
)]
pub enum DeltaCategory {
    Neutral,
    Bullish,
    Bearish,
}

impl DeltaCategory {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// One row of the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub bot_name: String,
    pub strategy: String,
    pub symbol: String,
    pub status: String,
    pub quantity: i64,
    pub pnl: f64,
    pub return_pct: f64,
    pub days_in_trade: i64,
    pub open_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub estimated_delta: f64,
    pub delta_category: String,
}

impl TradeRecord {
    /// Returns the status as one of the named outcomes, if it is one.
    pub fn status_kind(&self) -> Option<TradeStatus> {
        TradeStatus::from_str(&self.status).ok()
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }

    /// Case-insensitive substring match over every displayed field.
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        let fmt_date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        [
            self.bot_name.clone(),
            self.strategy.clone(),
            self.symbol.clone(),
            self.status.clone(),
            self.quantity.to_string(),
            self.pnl.to_string(),
            self.return_pct.to_string(),
            self.days_in_trade.to_string(),
            fmt_date(self.open_date),
            fmt_date(self.close_date),
            self.estimated_delta.to_string(),
            self.delta_category.clone(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// The ordered collection of trades backing every report.
///
/// Row order is the CSV row order and acts as the tie-break for every ordering
/// operation. Derived logs (filtered, searched, sorted) are new values; the
/// source is never mutated.
#[derive(Debug, Clone)]
pub struct TradeLog {
    df: DataFrame,
}

impl ReportName for TradeLog {
    fn base_name(&self) -> String {
        generate_dynamic_base_name(&self.df, "trade_log")
    }
}

impl Report for TradeLog {
    fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn as_df_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }
}

impl PartialEq for TradeLog {
    fn eq(&self, other: &Self) -> bool {
        self.df.equals_missing(&other.df)
    }
}

impl Default for TradeLog {
    fn default() -> Self {
        let df = DataFrame::empty_with_schema(&Self::to_schema());
        Self { df }
    }
}

impl ToSchema for TradeLog {
    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = TradeLogCol::iter()
            .map(|col| {
                let dtype = match col {
                    TradeLogCol::BotName
                    | TradeLogCol::Strategy
                    | TradeLogCol::Symbol
                    | TradeLogCol::Status
                    | TradeLogCol::DeltaCategory => DataType::String,

                    TradeLogCol::Quantity | TradeLogCol::DaysInTrade => DataType::Int64,

                    TradeLogCol::Pnl | TradeLogCol::ReturnPct | TradeLogCol::EstimatedDelta => {
                        DataType::Float64
                    }

                    TradeLogCol::OpenDate | TradeLogCol::CloseDate => DataType::Date,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }
}

// ================================================================================================
// Construction
// ================================================================================================

impl TradeLog {
    /// Wraps a frame, enforcing the canonical schema and column order.
    pub(crate) fn new(df: DataFrame) -> TradelensResult<Self> {
        let schema = Self::to_schema();

        let missing = schema
            .iter_names()
            .filter(|name| df.column(name).is_err())
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(DataError::MissingColumns(missing).into());
        }

        let df = df.select(schema.iter_names().cloned()).map_err(convert_err)?;
        for (name, expected) in schema.iter() {
            let actual = df.column(name).map_err(convert_err)?.dtype();
            if actual != expected {
                return Err(DataError::DataFrame(format!(
                    "Type mismatch for trade log column '{name}': expected {expected:?}, got {actual:?}"
                ))
                .into());
            }
        }

        Ok(Self { df })
    }

    /// Builds a log from typed records, keeping their order.
    pub fn from_records(records: &[TradeRecord]) -> TradelensResult<Self> {
        let df = df![
            TradeLogCol::BotName.as_str() => records.iter().map(|r| r.bot_name.as_str()).collect::<Vec<_>>(),
            TradeLogCol::Strategy.as_str() => records.iter().map(|r| r.strategy.as_str()).collect::<Vec<_>>(),
            TradeLogCol::Symbol.as_str() => records.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>(),
            TradeLogCol::Status.as_str() => records.iter().map(|r| r.status.as_str()).collect::<Vec<_>>(),
            TradeLogCol::Quantity.as_str() => records.iter().map(|r| r.quantity).collect::<Vec<_>>(),
            TradeLogCol::Pnl.as_str() => records.iter().map(|r| r.pnl).collect::<Vec<_>>(),
            TradeLogCol::ReturnPct.as_str() => records.iter().map(|r| r.return_pct).collect::<Vec<_>>(),
            TradeLogCol::DaysInTrade.as_str() => records.iter().map(|r| r.days_in_trade).collect::<Vec<_>>(),
            TradeLogCol::OpenDate.as_str() => records.iter().map(|r| r.open_date.map(epoch_days)).collect::<Vec<_>>(),
            TradeLogCol::CloseDate.as_str() => records.iter().map(|r| r.close_date.map(epoch_days)).collect::<Vec<_>>(),
            TradeLogCol::EstimatedDelta.as_str() => records.iter().map(|r| r.estimated_delta).collect::<Vec<_>>(),
            TradeLogCol::DeltaCategory.as_str() => records.iter().map(|r| r.delta_category.as_str()).collect::<Vec<_>>(),
        ]
        .map_err(convert_err)?;

        let df = df
            .lazy()
            .with_columns([
                col(TradeLogCol::OpenDate).cast(DataType::Date),
                col(TradeLogCol::CloseDate).cast(DataType::Date),
            ])
            .collect()
            .map_err(convert_err)?;

        Self::new(df)
    }
}

// ================================================================================================
// Access
// ================================================================================================

impl TradeLog {
    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    /// Materializes every row as a [`TradeRecord`], in log order.
    pub fn records(&self) -> TradelensResult<Vec<TradeRecord>> {
        records_from_df(&self.df)
    }

    /// Sorted unique values of a column, rendered as strings. Nulls are skipped.
    pub fn distinct(&self, column: TradeLogCol) -> TradelensResult<Vec<String>> {
        let casted = self
            .df
            .column(column.as_str())
            .and_then(|c| c.cast(&DataType::String))
            .map_err(convert_err)?;
        let values = casted
            .str()
            .map_err(convert_err)?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect::<BTreeSet<_>>();
        Ok(values.into_iter().collect())
    }

    /// Earliest and latest open date, or `None` when no row has one.
    pub fn analysis_period(&self) -> TradelensResult<Option<DateRange>> {
        let open = self
            .df
            .column(TradeLogCol::OpenDate.as_str())
            .and_then(|c| c.date())
            .map_err(convert_err)?
            .physical();

        let bounds = open
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(i32, i32)>, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            });

        match bounds {
            None => Ok(None),
            Some((lo, hi)) => {
                let start = date_from_epoch_days(lo).ok_or_else(|| invalid_day(lo))?;
                let end = date_from_epoch_days(hi).ok_or_else(|| invalid_day(hi))?;
                Ok(Some(DateRange::new(start, end)?))
            }
        }
    }

    /// Writes the log as CSV with the input column set, in current row order.
    pub fn write_csv<W: Write>(&self, writer: W) -> TradelensResult<()> {
        write_df_csv(&self.df, writer)
    }
}

// ================================================================================================
// Derivation
// ================================================================================================

impl TradeLog {
    /// Rows matching every active criterion of `filter`, in their original order.
    pub fn filter(&self, filter: &TradeFilter) -> TradelensResult<TradeLog> {
        let Some(predicate) = filter.to_predicate().map_err(convert_err)? else {
            return Ok(self.clone());
        };

        let df = self
            .df
            .clone()
            .lazy()
            .filter(predicate)
            .collect()
            .map_err(convert_err)?;

        debug!(
            before = self.len(),
            after = df.height(),
            "Applied trade filter"
        );
        Ok(Self { df })
    }

    /// Rows where any displayed field contains `term`, ignoring case.
    /// A blank term keeps every row.
    pub fn search(&self, term: &str) -> TradelensResult<TradeLog> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(self.clone());
        }

        let mask = self
            .records()?
            .iter()
            .map(|r| r.matches(&needle))
            .collect::<Vec<_>>();
        let mask = BooleanChunked::new("search_mask".into(), mask.as_slice());

        let df = self.df.filter(&mask).map_err(convert_err)?;
        Ok(Self { df })
    }

    /// Stable sort on one column. Ties keep row order; missing values go last.
    pub fn sort_by(&self, column: TradeLogCol, direction: SortDirection) -> TradelensResult<Self> {
        let df = self
            .df
            .sort(
                [column.as_str()],
                SortMultipleOptions::default()
                    .with_order_descending(direction == SortDirection::Descending)
                    .with_nulls_last(true)
                    .with_maintain_order(true),
            )
            .map_err(convert_err)?;
        Ok(Self { df })
    }
}

// ================================================================================================
// Reports
// ================================================================================================

impl TradeLog {
    pub fn trade_stats(&self) -> TradelensResult<TradeStatistics> {
        self.try_into()
    }

    pub fn cumulative_pnl(&self) -> TradelensResult<CumulativePnl> {
        self.try_into()
    }

    pub fn ranking(&self, top_n: usize) -> TradelensResult<TradeRanking> {
        TradeRanking::new(self, top_n)
    }

    pub fn delta_exposure(&self, bias_threshold: f64) -> TradelensResult<DeltaExposure> {
        DeltaExposure::new(self, bias_threshold)
    }

    pub fn strategy_delta(&self) -> TradelensResult<StrategyDeltaTable> {
        self.try_into()
    }

    pub fn group_by<I>(&self, keys: I) -> GroupedTradeLog<'_>
    where
        I: IntoIterator<Item = GroupCol>,
    {
        GroupedTradeLog::new(self, keys)
    }

    /// Computes the full dashboard summary with default options.
    pub fn summarize(&self, top_n: usize) -> TradelensResult<MetricsSummary> {
        MetricsSummary::compute(self, top_n)
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

pub(crate) fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

fn invalid_day(days: i32) -> TradelensError {
    DataError::InvalidRecord(format!("Date out of range: {days} days from epoch")).into()
}

/// Reads trade records from any frame carrying the trade log columns.
pub(crate) fn records_from_df(df: &DataFrame) -> TradelensResult<Vec<TradeRecord>> {
    let str_col = |c: TradeLogCol| {
        df.column(c.as_str())
            .and_then(|s| s.str())
            .map_err(convert_err)
    };
    let i64_col = |c: TradeLogCol| {
        df.column(c.as_str())
            .and_then(|s| s.i64())
            .map_err(convert_err)
    };
    let f64_col = |c: TradeLogCol| {
        df.column(c.as_str())
            .and_then(|s| s.f64())
            .map_err(convert_err)
    };
    let date_col = |c: TradeLogCol| {
        df.column(c.as_str())
            .and_then(|s| s.date())
            .map(|d| d.physical())
            .map_err(convert_err)
    };

    let bot_name = str_col(TradeLogCol::BotName)?;
    let strategy = str_col(TradeLogCol::Strategy)?;
    let symbol = str_col(TradeLogCol::Symbol)?;
    let status = str_col(TradeLogCol::Status)?;
    let quantity = i64_col(TradeLogCol::Quantity)?;
    let pnl = f64_col(TradeLogCol::Pnl)?;
    let return_pct = f64_col(TradeLogCol::ReturnPct)?;
    let days_in_trade = i64_col(TradeLogCol::DaysInTrade)?;
    let open_date = date_col(TradeLogCol::OpenDate)?;
    let close_date = date_col(TradeLogCol::CloseDate)?;
    let estimated_delta = f64_col(TradeLogCol::EstimatedDelta)?;
    let delta_category = str_col(TradeLogCol::DeltaCategory)?;

    let to_date = |days: Option<i32>| -> TradelensResult<Option<NaiveDate>> {
        days.map(|d| date_from_epoch_days(d).ok_or_else(|| invalid_day(d)))
            .transpose()
    };

    (0..df.height())
        .map(|i| -> TradelensResult<TradeRecord> {
            Ok(TradeRecord {
                bot_name: bot_name.get(i).unwrap_or_default().to_string(),
                strategy: strategy.get(i).unwrap_or_default().to_string(),
                symbol: symbol.get(i).unwrap_or_default().to_string(),
                status: status.get(i).unwrap_or_default().to_string(),
                quantity: quantity.get(i).unwrap_or_default(),
                pnl: pnl.get(i).unwrap_or_default(),
                return_pct: return_pct.get(i).unwrap_or_default(),
                days_in_trade: days_in_trade.get(i).unwrap_or_default(),
                open_date: to_date(open_date.get(i))?,
                close_date: to_date(close_date.get(i))?,
                estimated_delta: estimated_delta.get(i).unwrap_or_default(),
                delta_category: delta_category.get(i).unwrap_or_default().to_string(),
            })
        })
        .collect()
}

fn convert_err(e: polars::error::PolarsError) -> TradelensError {
    polars_to_tradelens_error("trade log", e)
}
