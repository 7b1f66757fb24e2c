use std::{collections::BTreeSet, fmt};

use chrono::NaiveDate;
use polars::prelude::{DataType, Expr, IntoSeries, NamedFrom, PolarsResult, Series, col, lit};
use serde::Serialize;

use crate::{
    error::FilterError,
    report::trade_log::{TradeLogCol, TradeRecord, epoch_days},
};

/// Selection value that stands for "no constraint" in the dashboard selectors.
pub const ALL: &str = "All";

/// An inclusive range of open dates. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FilterError> {
        if start > end {
            return Err(FilterError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parses both bounds with [`parse_date`] and validates their order.
    pub fn parse(start: &str, end: &str) -> Result<Self, FilterError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%B %d, %Y"),
            self.end.format("%B %d, %Y")
        )
    }
}

/// Parses a `YYYY-MM-DD` date. A trailing time component (`2024-01-05 09:30:00`
/// or `2024-01-05T09:30:00`) is ignored.
pub fn parse_date(raw: &str) -> Result<NaiveDate, FilterError> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(['T', ' '])
        .next()
        .unwrap_or(trimmed);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| FilterError::InvalidDate {
        value: raw.to_string(),
        msg: e.to_string(),
    })
}

/// The active filter criteria. Every field is optional; `None` means no
/// constraint on that dimension. Active criteria combine with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TradeFilter {
    /// Strategy (`type`) must be one of these.
    pub strategies: Option<BTreeSet<String>>,
    /// Status must be one of these.
    pub statuses: Option<BTreeSet<String>>,
    /// Symbol must be one of these.
    pub symbols: Option<BTreeSet<String>>,
    /// Open date must fall within this range. Rows without an open date never match.
    pub date_range: Option<DateRange>,
}

impl TradeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a strategy to the allowed set. `"All"` clears the constraint.
    pub fn with_strategy(mut self, strategy: impl AsRef<str>) -> Self {
        select(&mut self.strategies, strategy.as_ref());
        self
    }

    /// Adds a status to the allowed set. `"All"` clears the constraint.
    pub fn with_status(mut self, status: impl AsRef<str>) -> Self {
        select(&mut self.statuses, status.as_ref());
        self
    }

    /// Adds a symbol to the allowed set. `"All"` clears the constraint.
    pub fn with_symbol(mut self, symbol: impl AsRef<str>) -> Self {
        select(&mut self.symbols, symbol.as_ref());
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// `true` when no criterion is active.
    pub fn is_identity(&self) -> bool {
        self.strategies.is_none()
            && self.statuses.is_none()
            && self.symbols.is_none()
            && self.date_range.is_none()
    }

    /// Evaluates the filter against a single record.
    pub fn matches(&self, record: &TradeRecord) -> bool {
        let in_set = |set: &Option<BTreeSet<String>>, value: &str| {
            set.as_ref().is_none_or(|s| s.contains(value))
        };

        in_set(&self.strategies, &record.strategy)
            && in_set(&self.statuses, &record.status)
            && in_set(&self.symbols, &record.symbol)
            && self.date_range.is_none_or(|range| {
                record.open_date.is_some_and(|date| range.contains(date))
            })
    }

    /// Builds the row predicate, or `None` for the identity filter.
    pub(crate) fn to_predicate(&self) -> PolarsResult<Option<Expr>> {
        let mut predicates = Vec::with_capacity(4);

        if let Some(set) = &self.strategies {
            predicates.push(in_set_expr(TradeLogCol::Strategy, set)?);
        }
        if let Some(set) = &self.statuses {
            predicates.push(in_set_expr(TradeLogCol::Status, set)?);
        }
        if let Some(set) = &self.symbols {
            predicates.push(in_set_expr(TradeLogCol::Symbol, set)?);
        }
        if let Some(range) = &self.date_range {
            predicates.push(date_range_expr(range));
        }

        Ok(predicates.into_iter().reduce(|acc, p| acc.and(p)))
    }
}

impl fmt::Display for TradeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = |s: &Option<BTreeSet<String>>| match s {
            Some(values) => values.iter().cloned().collect::<Vec<_>>().join(", "),
            None => ALL.to_string(),
        };
        let range = match &self.date_range {
            Some(r) => r.to_string(),
            None => ALL.to_string(),
        };
        write!(
            f,
            "strategy: {}; status: {}; symbol: {}; dates: {}",
            set(&self.strategies),
            set(&self.statuses),
            set(&self.symbols),
            range
        )
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn select(set: &mut Option<BTreeSet<String>>, value: &str) {
    if value.eq_ignore_ascii_case(ALL) {
        *set = None;
    } else {
        set.get_or_insert_with(BTreeSet::new)
            .insert(value.to_string());
    }
}

/// Membership test against a single list literal. An empty set matches nothing.
fn in_set_expr(column: TradeLogCol, values: &BTreeSet<String>) -> PolarsResult<Expr> {
    if values.is_empty() {
        return Ok(lit(false));
    }

    let members = Series::new(column.into(), values.iter().map(String::as_str).collect::<Vec<_>>())
        .implode()?
        .into_series();
    Ok(col(column).is_in(lit(members), false))
}

/// Compares open dates as days since the epoch. Null dates yield null and are dropped.
fn date_range_expr(range: &DateRange) -> Expr {
    let open_days = col(TradeLogCol::OpenDate).cast(DataType::Int32);
    open_days
        .clone()
        .gt_eq(lit(epoch_days(range.start)))
        .and(open_days.lt_eq(lit(epoch_days(range.end))))
}
