//! Terminal rendering for the `tradelens` binary.

use std::fmt::Display;

use tabled::{Table, Tabled};
use tradelens::prelude::{GroupRow, MetricsSummary, Ratio, StrategyDeltaRow, TradeRecord};

const RULE_WIDTH: usize = 72;

#[derive(Tabled)]
struct GroupLine {
    #[tabled(rename = "Group")]
    label: String,
    #[tabled(rename = "Trades")]
    trades: u32,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Win %")]
    win_rate: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "PF")]
    profit_factor: String,
}

impl From<&GroupRow> for GroupLine {
    fn from(row: &GroupRow) -> Self {
        Self {
            label: row.label(),
            trades: row.trade_count,
            total: money(row.total_pnl),
            win_rate: percent(row.win_rate),
            avg: money(row.avg_pnl),
            profit_factor: row.profit_factor.to_string(),
        }
    }
}

#[derive(Tabled)]
struct StrategyDeltaLine {
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Avg Δ")]
    avg_delta: String,
    #[tabled(rename = "Total Δ")]
    total_delta: String,
    #[tabled(rename = "Total P&L")]
    total_pnl: String,
    #[tabled(rename = "Trades")]
    trades: u32,
}

impl From<&StrategyDeltaRow> for StrategyDeltaLine {
    fn from(row: &StrategyDeltaRow) -> Self {
        Self {
            strategy: row.strategy.clone(),
            avg_delta: format!("{:.1}", row.avg_delta),
            total_delta: format!("{:.0}", row.total_delta),
            total_pnl: money(row.total_pnl),
            trades: row.trade_count,
        }
    }
}

#[derive(Tabled)]
struct TradeLine {
    #[tabled(rename = "Opened")]
    opened: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "P&L")]
    pnl: String,
    #[tabled(rename = "Return")]
    return_pct: String,
    #[tabled(rename = "Days")]
    days: i64,
}

impl From<&TradeRecord> for TradeLine {
    fn from(r: &TradeRecord) -> Self {
        Self {
            opened: r.open_date.map_or_else(|| "-".to_string(), |d| d.to_string()),
            strategy: r.strategy.clone(),
            symbol: r.symbol.clone(),
            status: r.status.clone(),
            pnl: money(r.pnl),
            return_pct: percent(r.return_pct * 100.0),
            days: r.days_in_trade,
        }
    }
}

/// Print a section header and separator.
pub fn section(title: &str) {
    println!();
    println!("{title}");
    println!("{}", "─".repeat(RULE_WIDTH));
}

/// Print a simple key/value line.
pub fn key_value(label: &str, value: impl Display) {
    println!("{label:<22} {value}");
}

/// Print a warning status line.
pub fn warn(message: &str) {
    println!("⚠ {message}");
}

/// Print an error status line.
pub fn error(message: &str) {
    eprintln!("✗ {message}");
}

/// Print a single-line note.
pub fn note(message: &str) {
    println!("{message}");
}

/// `-$1,234.50` style dollar amount.
pub fn money(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = format!("{:.2}", value.abs());
    let (whole, frac) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{frac}")
}

pub fn percent(value: f64) -> String {
    format!("{value:.1}%")
}

// ================================================================================================
// Sections
// ================================================================================================

pub fn overview(summary: &MetricsSummary) {
    let h = &summary.headline;
    section("Overview");
    if let Some(period) = &summary.analysis_period {
        key_value("Analysis period", period);
    }
    key_value("Total P&L", money(h.total_pnl));
    key_value("Trades", h.trade_count);
    key_value(
        "Wins / losses / flat",
        format!("{} / {} / {}", h.win_count, h.loss_count, h.break_even_count),
    );
    key_value("Win rate", percent(h.win_rate));
    key_value("Profit factor", h.profit_factor);
    key_value("Average P&L", money(h.avg_pnl));
    key_value("Median P&L", money(h.median_pnl));
    key_value("Best trade", money(h.best_trade_pnl));
    key_value("Worst trade", money(h.worst_trade_pnl));
    key_value("Avg return", percent(h.avg_return_pct * 100.0));
    key_value("Avg days in trade", format!("{:.1}", h.avg_days_in_trade));
    key_value(
        "Winners",
        format!(
            "{} trades, {}",
            summary.win_loss.winners.trade_count,
            money(summary.win_loss.winners.total_pnl)
        ),
    );
    key_value(
        "Non-winners",
        format!(
            "{} trades, {}",
            summary.win_loss.non_winners.trade_count,
            money(summary.win_loss.non_winners.total_pnl)
        ),
    );
    key_value("Max drawdown", money(summary.max_drawdown));
}

pub fn groups(title: &str, rows: &[GroupRow]) {
    section(title);
    if rows.is_empty() {
        note("No trades.");
        return;
    }
    table(rows.iter().map(GroupLine::from));
}

pub fn status(summary: &MetricsSummary) {
    groups("Closed vs. Expired", &summary.statuses);
    key_value("Performance multiplier", multiplier(summary.performance_multiplier));
}

pub fn ranking(summary: &MetricsSummary) {
    section(&format!("Top {} Best Trades", summary.top_n));
    trades(&summary.best_trades);
    section(&format!("Top {} Worst Trades", summary.top_n));
    trades(&summary.worst_trades);

    let obs = &summary.ranking;
    note("");
    key_value(
        "Closed among best",
        format!("{}/{}", obs.best_closed_count, obs.best_count),
    );
    key_value(
        "Expired among worst",
        format!("{}/{}", obs.worst_expired_count, obs.worst_count),
    );
    key_value("Avg best P&L", money(obs.best_avg_pnl));
    key_value("Avg worst P&L", money(obs.worst_avg_pnl));
}

pub fn delta(summary: &MetricsSummary) {
    let d = &summary.delta;
    section("Delta Exposure");
    key_value("Total delta", format!("{:.0}", d.exposure.total_delta));
    key_value("Avg delta per trade", format!("{:.1}", d.exposure.avg_delta));
    key_value("Portfolio bias", d.exposure.portfolio_bias);
    key_value("Neutral trades", percent(d.exposure.neutral_share_pct));
    for count in &d.category_counts {
        key_value(&format!("  {}", count.category), count.trade_count);
    }

    if d.by_strategy.is_empty() {
        return;
    }
    note("");
    table(d.by_strategy.iter().map(StrategyDeltaLine::from));
}

pub fn trade_log(records: &[TradeRecord], limit: usize) {
    section("Trade Log");
    trades(&records[..records.len().min(limit)]);
    if records.len() > limit {
        note(&format!("... {} more", records.len() - limit));
    }
}

fn trades(records: &[TradeRecord]) {
    if records.is_empty() {
        note("No trades.");
        return;
    }
    table(records.iter().map(TradeLine::from));
}

fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) {
    let table = Table::new(rows).to_string();
    for line in table.lines() {
        println!("  {line}");
    }
}

fn multiplier(ratio: Ratio) -> String {
    match ratio {
        Ratio::Value(v) => format!("{v:.2}x"),
        Ratio::Undefined => ratio.to_string(),
    }
}
