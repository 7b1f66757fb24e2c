mod output;

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tradelens::prelude::{Dashboard, DashboardConfig, SortDirection, TradeLog, TradeLogCol};

/// Performance dashboard for options-trading trade logs.
#[derive(Parser, Debug)]
#[command(name = "tradelens")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Trade log CSV to analyze
    csv: PathBuf,

    /// Dashboard configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep only this strategy type (repeatable, "All" for no constraint)
    #[arg(long = "strategy", value_name = "TYPE")]
    strategies: Vec<String>,

    /// Keep only this status (repeatable)
    #[arg(long = "status", value_name = "STATUS")]
    statuses: Vec<String>,

    /// Keep only this symbol (repeatable)
    #[arg(long = "symbol", value_name = "SYMBOL")]
    symbols: Vec<String>,

    /// First open date to include (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<String>,

    /// Last open date to include (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<String>,

    /// Trades listed on each side of the best/worst ranking
    #[arg(short = 'n', long)]
    top_n: Option<usize>,

    /// Only list trades containing this text
    #[arg(long)]
    search: Option<String>,

    /// Sort the trade list by this column (CSV header name, e.g. pnl)
    #[arg(long, value_name = "COLUMN")]
    sort_by: Option<TradeLogCol>,

    /// Sort ascending instead of descending
    #[arg(long, requires = "sort_by")]
    ascending: bool,

    /// Write the listed trades to this CSV file
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Print one JSON document instead of text
    #[arg(long)]
    json: bool,

    /// Maximum trade log rows printed in text mode
    #[arg(long, default_value = "25")]
    rows: usize,
}

impl Cli {
    /// Command-line values take precedence over the config file.
    fn apply_overrides(&self, config: &mut DashboardConfig) {
        if let Some(n) = self.top_n {
            config.top_n = n;
        }
        if !self.strategies.is_empty() {
            config.filter.strategies = self.strategies.clone();
        }
        if !self.statuses.is_empty() {
            config.filter.statuses = self.statuses.clone();
        }
        if !self.symbols.is_empty() {
            config.filter.symbols = self.symbols.clone();
        }
        if self.from.is_some() {
            config.filter.from = self.from.clone();
            config.filter.to = self.to.clone();
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;
    config.init_logging();

    let filter = config.to_filter()?;
    let outcome = TradeLog::from_csv_path(&cli.csv)
        .with_context(|| format!("Failed to load trade log {}", cli.csv.display()))?;

    let mut dashboard = Dashboard::new(outcome.log, config.summary_options());
    dashboard.apply(filter)?;

    let mut listed = dashboard.filtered().clone();
    if let Some(term) = &cli.search {
        listed = listed.search(term)?;
    }
    if let Some(column) = cli.sort_by {
        let direction = if cli.ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        };
        listed = listed.sort_by(column, direction)?;
    }

    if let Some(path) = &cli.export {
        export(&listed, path)?;
    }

    let filter_label = dashboard.filter().to_string();
    let summary = dashboard.summary()?;
    let records = listed.records()?;

    if cli.json {
        let doc = json!({
            "source": cli.csv.display().to_string(),
            "skipped_rows": outcome.skipped_rows,
            "filter": filter_label,
            "summary": summary,
            "trades": records,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    output::section("tradelens");
    output::key_value("Source", cli.csv.display());
    output::key_value("Filter", &filter_label);
    if outcome.skipped_rows > 0 {
        output::warn(&format!(
            "{} malformed rows were skipped",
            outcome.skipped_rows
        ));
    }

    output::overview(summary);
    output::groups("Performance by Strategy", &summary.strategies);
    output::status(summary);
    output::groups("Performance by Symbol", &summary.symbols);
    output::groups("Monthly P&L", &summary.monthly);
    output::ranking(summary);
    output::delta(summary);
    output::trade_log(&records, cli.rows);

    if let Some(path) = &cli.export {
        output::note("");
        output::key_value("Exported", path.display());
    }
    Ok(())
}

fn export(log: &TradeLog, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    log.write_csv(BufWriter::new(file))
        .with_context(|| format!("Failed to export trades to {}", path.display()))?;

    info!(path = %path.display(), trades = log.len(), "Exported trade log");
    Ok(())
}
