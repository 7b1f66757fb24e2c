use serde::Serialize;
use tracing::debug;

use crate::{
    error::TradelensResult,
    report::{
        cumulative_pnl::CumulativePoint,
        delta_exposure::{DEFAULT_BIAS_THRESHOLD, DeltaSummary, StrategyDeltaRow},
        filter::DateRange,
        grouped::{GroupCol, GroupRow},
        ranking::{DEFAULT_TOP_N, RankingObservations},
        ratio::Ratio,
        trade_log::{TradeLog, TradeRecord, TradeStatus},
        trade_statistics::Headline,
    },
};

/// Tunables for [`MetricsSummary::compute_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryOptions {
    /// Trades listed on each side of the best/worst ranking.
    pub top_n: usize,
    /// Total delta beyond which the portfolio counts as directional.
    pub delta_bias_threshold: f64,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            delta_bias_threshold: DEFAULT_BIAS_THRESHOLD,
        }
    }
}

/// Every figure the dashboard shows for one trade log.
///
/// Holds owned values only; the source log can be dropped once this exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub top_n: usize,
    pub analysis_period: Option<DateRange>,
    pub headline: Headline,
    pub win_loss: WinLossSplit,

    // === Breakdowns ===
    pub strategies: Vec<GroupRow>,
    pub statuses: Vec<GroupRow>,
    /// Average closed P&L over average expired P&L.
    pub performance_multiplier: Ratio,
    pub symbols: Vec<GroupRow>,
    pub delta_categories: Vec<GroupRow>,
    pub strategy_status: Vec<GroupRow>,
    /// Ordered by month, oldest first.
    pub monthly: Vec<GroupRow>,

    // === Equity curve ===
    pub cumulative_pnl: Vec<CumulativePoint>,
    pub max_drawdown: f64,

    // === Ranking ===
    pub best_trades: Vec<TradeRecord>,
    pub worst_trades: Vec<TradeRecord>,
    pub ranking: RankingObservations,

    pub delta: DeltaBreakdown,
}

/// Winners (pnl > 0) against everything else.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WinLossSplit {
    pub winners: SplitSide,
    pub non_winners: SplitSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SplitSide {
    pub trade_count: u32,
    pub total_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeltaBreakdown {
    #[serde(flatten)]
    pub exposure: DeltaSummary,
    pub category_counts: Vec<CategoryCount>,
    pub by_strategy: Vec<StrategyDeltaRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub trade_count: u32,
}

impl MetricsSummary {
    pub fn compute(log: &TradeLog, top_n: usize) -> TradelensResult<Self> {
        let options = SummaryOptions {
            top_n,
            ..SummaryOptions::default()
        };
        Self::compute_with(log, &options)
    }

    pub fn compute_with(log: &TradeLog, options: &SummaryOptions) -> TradelensResult<Self> {
        let headline = log.trade_stats()?.headline()?;

        let breakdown = |keys: &[GroupCol]| -> TradelensResult<Vec<GroupRow>> {
            log.group_by(keys.iter().copied()).stats()?.rows()
        };
        let strategies = breakdown(&[GroupCol::Strategy])?;
        let statuses = breakdown(&[GroupCol::Status])?;
        let symbols = breakdown(&[GroupCol::Symbol])?;
        let delta_categories = breakdown(&[GroupCol::DeltaCategory])?;
        let strategy_status = breakdown(&[GroupCol::Strategy, GroupCol::Status])?;
        let monthly = log
            .group_by([GroupCol::OpenMonth])
            .stats()?
            .sorted_by_keys()?
            .rows()?;

        let cumulative = log.cumulative_pnl()?;
        let ranking = log.ranking(options.top_n)?;

        let delta = DeltaBreakdown {
            exposure: log.delta_exposure(options.delta_bias_threshold)?.summary()?,
            category_counts: delta_categories
                .iter()
                .map(|row| CategoryCount {
                    category: row.label(),
                    trade_count: row.trade_count,
                })
                .collect(),
            by_strategy: log.strategy_delta()?.rows()?,
        };

        let summary = Self {
            top_n: options.top_n,
            analysis_period: log.analysis_period()?,
            win_loss: win_loss_split(&headline),
            headline,
            performance_multiplier: performance_multiplier(&statuses),
            strategies,
            statuses,
            symbols,
            delta_categories,
            strategy_status,
            monthly,
            cumulative_pnl: cumulative.points()?,
            max_drawdown: cumulative.max_drawdown()?,
            best_trades: ranking.best()?,
            worst_trades: ranking.worst()?,
            ranking: ranking.observations()?,
            delta,
        };

        debug!(
            trades = summary.headline.trade_count,
            top_n = options.top_n,
            "Computed metrics summary"
        );
        Ok(summary)
    }

    pub fn strategy(&self, name: &str) -> Option<&GroupRow> {
        find_group(&self.strategies, name)
    }

    pub fn status(&self, status: &str) -> Option<&GroupRow> {
        find_group(&self.statuses, status)
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn find_group<'a>(rows: &'a [GroupRow], key: &str) -> Option<&'a GroupRow> {
    rows.iter()
        .find(|row| row.keys.first().is_some_and(|k| k == key))
}

/// Undefined when either status is absent or the expired average is zero.
fn performance_multiplier(statuses: &[GroupRow]) -> Ratio {
    let avg = |status: TradeStatus| find_group(statuses, status.as_str()).map(|r| r.avg_pnl);
    match (avg(TradeStatus::Closed), avg(TradeStatus::Expired)) {
        (Some(closed), Some(expired)) => Ratio::of(closed, expired),
        _ => Ratio::Undefined,
    }
}

fn win_loss_split(headline: &Headline) -> WinLossSplit {
    WinLossSplit {
        winners: SplitSide {
            trade_count: headline.win_count,
            total_pnl: headline.gross_profit,
        },
        non_winners: SplitSide {
            trade_count: headline.trade_count - headline.win_count,
            total_pnl: headline.total_pnl - headline.gross_profit,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{delta_exposure::PortfolioBias, trade_log::tests::record};

    // ========================================================================
    // Helper: Build Trade Log
    // ========================================================================

    fn sample_log() -> TradeLog {
        TradeLog::from_records(&[
            record("Iron Condor", "SPX", "closed", 100.0, Some("2024-01-02"), Some("2024-01-07")),
            record("Short Put Spread", "SPX", "expired", -50.0, Some("2024-01-05"), Some("2024-02-04")),
            record("Iron Condor", "QQQ", "closed", 200.0, Some("2024-01-10"), Some("2024-01-13")),
            record("Long Call", "AAPL", "expired", -300.0, Some("2024-02-12"), Some("2024-03-04")),
            record("Iron Butterfly", "SPX", "closed", 0.0, Some("2024-02-20"), Some("2024-02-22")),
        ])
        .expect("Failed to build TradeLog")
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ========================================================================
    // Test: Headline and Split
    // ========================================================================

    #[test]
    fn test_headline_and_win_loss_split() {
        let summary = sample_log().summarize(DEFAULT_TOP_N).expect("Summary failed");
        let h = &summary.headline;

        assert_eq!(h.total_pnl, -50.0);
        assert_eq!(h.trade_count, 5);
        assert_eq!((h.win_count, h.loss_count, h.break_even_count), (2, 2, 1));
        assert!(approx(h.win_rate, 40.0));
        assert!(approx(
            h.profit_factor.value().expect("Profit factor should be defined"),
            300.0 / 350.0
        ));

        assert_eq!(summary.win_loss.winners.trade_count, 2);
        assert_eq!(summary.win_loss.winners.total_pnl, 300.0);
        assert_eq!(summary.win_loss.non_winners.trade_count, 3);
        assert_eq!(summary.win_loss.non_winners.total_pnl, -350.0);
    }

    // ========================================================================
    // Test: Breakdowns
    // ========================================================================

    #[test]
    fn test_breakdowns() {
        let summary = sample_log().summarize(DEFAULT_TOP_N).expect("Summary failed");

        let strategies = summary.strategies.iter().map(GroupRow::label).collect::<Vec<_>>();
        assert_eq!(
            strategies,
            vec!["Iron Condor", "Iron Butterfly", "Short Put Spread", "Long Call"]
        );
        assert_eq!(
            summary.strategy("Iron Condor").expect("Missing Iron Condor").total_pnl,
            300.0
        );

        let months = summary
            .monthly
            .iter()
            .map(|r| (r.label(), r.total_pnl))
            .collect::<Vec<_>>();
        assert_eq!(
            months,
            vec![("2024-01".to_string(), 250.0), ("2024-02".to_string(), -300.0)]
        );

        assert_eq!(summary.strategy_status.len(), 4);
        assert_eq!(summary.symbols.len(), 3);
    }

    #[test]
    fn test_performance_multiplier() {
        let summary = sample_log().summarize(DEFAULT_TOP_N).expect("Summary failed");

        assert_eq!(summary.status("closed").expect("Missing closed").avg_pnl, 100.0);
        assert_eq!(summary.status("expired").expect("Missing expired").avg_pnl, -175.0);
        assert!(approx(
            summary
                .performance_multiplier
                .value()
                .expect("Multiplier should be defined"),
            100.0 / -175.0
        ));
    }

    #[test]
    fn test_multiplier_undefined_without_expired_trades() {
        let log = TradeLog::from_records(&[
            record("Iron Condor", "SPX", "closed", 100.0, None, None),
            record("Iron Condor", "SPX", "closed", 50.0, None, None),
        ])
        .expect("Failed to build TradeLog");
        let summary = log.summarize(DEFAULT_TOP_N).expect("Summary failed");
        assert_eq!(summary.performance_multiplier, Ratio::Undefined);

        let log = TradeLog::from_records(&[
            record("Iron Condor", "SPX", "closed", 100.0, None, None),
            record("Long Call", "SPX", "expired", 0.0, None, None),
        ])
        .expect("Failed to build TradeLog");
        let summary = log.summarize(DEFAULT_TOP_N).expect("Summary failed");
        assert_eq!(summary.performance_multiplier, Ratio::Undefined);
    }

    // ========================================================================
    // Test: Equity Curve, Ranking, Delta
    // ========================================================================

    #[test]
    fn test_curve_ranking_and_delta() {
        let summary = sample_log().summarize(2).expect("Summary failed");

        assert_eq!(summary.cumulative_pnl.len(), 5);
        assert_eq!(summary.max_drawdown, 350.0);

        let best = summary.best_trades.iter().map(|r| r.pnl).collect::<Vec<_>>();
        assert_eq!(best, vec![200.0, 100.0]);
        let worst = summary.worst_trades.iter().map(|r| r.pnl).collect::<Vec<_>>();
        assert_eq!(worst, vec![-300.0, -50.0]);
        assert_eq!(summary.ranking.worst_expired_count, 2);

        assert_eq!(summary.delta.exposure.portfolio_bias, PortfolioBias::Neutral);
        assert_eq!(summary.delta.exposure.neutral_share_pct, 100.0);
        assert_eq!(
            summary.delta.category_counts,
            vec![CategoryCount {
                category: "Neutral".to_string(),
                trade_count: 5
            }]
        );
        assert_eq!(summary.delta.by_strategy.len(), 4);
    }

    #[test]
    fn test_options_are_applied() {
        let options = SummaryOptions {
            top_n: 1,
            delta_bias_threshold: 0.0,
        };
        let summary = MetricsSummary::compute_with(&sample_log(), &options).expect("Summary failed");
        assert_eq!(summary.top_n, 1);
        assert_eq!(summary.best_trades.len(), 1);
        assert_eq!(summary.delta.exposure.bias_threshold, 0.0);
    }

    // ========================================================================
    // Test: Empty Trade Log
    // ========================================================================

    #[test]
    fn test_empty_trade_log() {
        let summary = TradeLog::default()
            .summarize(DEFAULT_TOP_N)
            .expect("Should handle empty TradeLog");

        assert_eq!(summary.headline, Headline::default());
        assert_eq!(summary.win_loss, WinLossSplit::default());
        assert!(summary.strategies.is_empty());
        assert!(summary.monthly.is_empty());
        assert!(summary.cumulative_pnl.is_empty());
        assert!(summary.best_trades.is_empty());
        assert_eq!(summary.performance_multiplier, Ratio::Undefined);
        assert_eq!(summary.analysis_period, None);
        assert_eq!(summary.delta.exposure.portfolio_bias, PortfolioBias::Neutral);
    }

    #[test]
    fn test_summary_serializes_undefined_as_null() {
        let summary = TradeLog::default()
            .summarize(DEFAULT_TOP_N)
            .expect("Should handle empty TradeLog");
        let json = serde_json::to_value(&summary).expect("Failed to serialize summary");

        assert_eq!(json["performance_multiplier"], serde_json::Value::Null);
        assert_eq!(json["headline"]["profit_factor"], serde_json::Value::Null);
        assert_eq!(json["delta"]["portfolio_bias"], "Neutral");
    }
}
