use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    error::{ConfigError, TradelensResult},
    report::{
        delta_exposure::DEFAULT_BIAS_THRESHOLD,
        filter::{DateRange, TradeFilter},
        ranking::DEFAULT_TOP_N,
        summary::SummaryOptions,
    },
};

/// Dashboard settings, read from a TOML file.
///
/// Every field is optional in the file:
///
/// ```toml
/// top_n = 5
/// delta_bias_threshold = 25.0
/// log_level = "debug"
/// log_format = "json"
///
/// [filter]
/// strategies = ["Iron Condor"]
/// symbols = ["SPX", "QQQ"]
/// from = "2024-01-01"
/// to = "2024-03-31"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub top_n: usize,
    pub delta_bias_threshold: f64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub filter: FilterConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            delta_bias_threshold: DEFAULT_BIAS_THRESHOLD,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            filter: FilterConfig::default(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Initial filter selection. Absent lists mean "All".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub strategies: Vec<String>,
    pub statuses: Vec<String>,
    pub symbols: Vec<String>,
    /// Open-date lower bound, `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Open-date upper bound, `YYYY-MM-DD`.
    pub to: Option<String>,
}

impl DashboardConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> TradelensResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> TradelensResult<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TradelensResult<()> {
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be greater than zero".into()).into());
        }
        if !self.delta_bias_threshold.is_finite() || self.delta_bias_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "delta_bias_threshold must be a non-negative number, got {}",
                self.delta_bias_threshold
            ))
            .into());
        }
        if self.filter.from.is_some() != self.filter.to.is_some() {
            return Err(ConfigError::Invalid(
                "filter.from and filter.to must be given together".into(),
            )
            .into());
        }
        Ok(())
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            top_n: self.top_n,
            delta_bias_threshold: self.delta_bias_threshold,
        }
    }

    /// Builds the configured filter. Fails on unparseable or inverted dates.
    pub fn to_filter(&self) -> TradelensResult<TradeFilter> {
        let f = &self.filter;
        let mut filter = TradeFilter::new();
        for s in &f.strategies {
            filter = filter.with_strategy(s);
        }
        for s in &f.statuses {
            filter = filter.with_status(s);
        }
        for s in &f.symbols {
            filter = filter.with_symbol(s);
        }
        if let (Some(from), Some(to)) = (&f.from, &f.to) {
            filter = filter.with_date_range(DateRange::parse(from, to)?);
        }
        Ok(filter)
    }

    /// Installs the global tracing subscriber. `RUST_LOG` takes precedence
    /// over `log_level`.
    pub fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        match self.log_format {
            LogFormat::Json => {
                fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
            LogFormat::Pretty => {
                fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
    }
}
