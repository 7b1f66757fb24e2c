use tracing::debug;

use crate::{
    error::TradelensResult,
    report::{
        filter::TradeFilter,
        summary::{MetricsSummary, SummaryOptions},
        trade_log::TradeLog,
    },
};

/// One interactive session over a loaded trade log.
///
/// The base log is never modified. Applying a filter derives a new filtered
/// log; the summary for the current filter is computed once and reused until
/// the filter or the options change.
#[derive(Debug, Clone)]
pub struct Dashboard {
    base: TradeLog,
    filter: TradeFilter,
    filtered: TradeLog,
    options: SummaryOptions,
    memo: Option<(TradeFilter, MetricsSummary)>,
}

impl Dashboard {
    pub fn new(base: TradeLog, options: SummaryOptions) -> Self {
        Self {
            filtered: base.clone(),
            base,
            filter: TradeFilter::default(),
            options,
            memo: None,
        }
    }

    pub fn base(&self) -> &TradeLog {
        &self.base
    }

    pub fn filter(&self) -> &TradeFilter {
        &self.filter
    }

    pub fn filtered(&self) -> &TradeLog {
        &self.filtered
    }

    pub fn options(&self) -> &SummaryOptions {
        &self.options
    }

    /// Replaces the current filter and re-derives the filtered log from the base.
    pub fn apply(&mut self, filter: TradeFilter) -> TradelensResult<&TradeLog> {
        if filter == self.filter {
            return Ok(&self.filtered);
        }

        self.filtered = self.base.filter(&filter)?;
        debug!(
            %filter,
            trades = self.filtered.len(),
            total = self.base.len(),
            "Dashboard filter applied"
        );
        self.filter = filter;
        Ok(&self.filtered)
    }

    pub fn set_top_n(&mut self, top_n: usize) {
        if self.options.top_n != top_n {
            self.options.top_n = top_n;
            self.memo = None;
        }
    }

    pub fn set_options(&mut self, options: SummaryOptions) {
        if self.options != options {
            self.options = options;
            self.memo = None;
        }
    }

    /// Summary of the current filtered log, recomputed only when stale.
    pub fn summary(&mut self) -> TradelensResult<&MetricsSummary> {
        let memo = match self.memo.take() {
            Some((filter, summary)) if filter == self.filter => (filter, summary),
            _ => {
                debug!(filter = %self.filter, "Recomputing dashboard summary");
                let summary = MetricsSummary::compute_with(&self.filtered, &self.options)?;
                (self.filter.clone(), summary)
            }
        };

        let (_, summary) = self.memo.insert(memo);
        Ok(summary)
    }

    pub fn is_summary_cached(&self) -> bool {
        self.memo
            .as_ref()
            .is_some_and(|(filter, _)| filter == &self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::trade_log::tests::record;

    fn dashboard() -> Dashboard {
        let log = TradeLog::from_records(&[
            record("Iron Condor", "SPX", "closed", 100.0, Some("2024-01-02"), None),
            record("Long Call", "QQQ", "expired", -50.0, Some("2024-01-05"), None),
            record("Iron Condor", "SPX", "closed", 200.0, Some("2024-02-01"), None),
        ])
        .expect("Failed to build TradeLog");
        Dashboard::new(log, SummaryOptions::default())
    }

    #[test]
    fn test_starts_unfiltered() {
        let mut dash = dashboard();
        assert_eq!(dash.filtered(), dash.base());
        assert!(dash.filter().is_identity());
        assert_eq!(dash.summary().expect("Summary failed").headline.trade_count, 3);
    }

    #[test]
    fn test_apply_derives_from_base() {
        let mut dash = dashboard();

        let spx = dash
            .apply(TradeFilter::new().with_symbol("SPX"))
            .expect("Filter failed")
            .len();
        assert_eq!(spx, 2);

        // A second filter starts over from the base, not from the previous result.
        let qqq = dash
            .apply(TradeFilter::new().with_symbol("QQQ"))
            .expect("Filter failed")
            .len();
        assert_eq!(qqq, 1);
        assert_eq!(dash.base().len(), 3);
    }

    #[test]
    fn test_summary_is_memoized_per_filter() {
        let mut dash = dashboard();
        assert!(!dash.is_summary_cached());

        let total = dash.summary().expect("Summary failed").headline.total_pnl;
        assert_eq!(total, 250.0);
        assert!(dash.is_summary_cached());

        dash.apply(TradeFilter::new().with_status("closed"))
            .expect("Filter failed");
        assert!(!dash.is_summary_cached());
        assert_eq!(dash.summary().expect("Summary failed").headline.total_pnl, 300.0);

        dash.set_top_n(1);
        assert!(!dash.is_summary_cached());
        assert_eq!(dash.summary().expect("Summary failed").best_trades.len(), 1);
    }
}
