// 1. Traits
pub use crate::report::io::{Report, ReportName, ToCsv, ToJson, ToSchema};
pub use crate::report::polars_ext::{DataFrameExt, ExprExt};

// 2. Trade Log
pub use crate::report::loader::LoadOutcome;
pub use crate::report::trade_log::{
    DeltaCategory, SortDirection, TradeLog, TradeLogCol, TradeRecord, TradeStatus,
};

// 3. Filtering
pub use crate::report::filter::{ALL, DateRange, TradeFilter, parse_date};

// 4. Reports
pub use crate::report::cumulative_pnl::{CumulativePnl, CumulativePoint};
pub use crate::report::delta_exposure::{
    DeltaExposure, DeltaSummary, PortfolioBias, StrategyDeltaRow, StrategyDeltaTable,
};
pub use crate::report::grouped::{GroupCol, GroupRow, GroupStatistics, GroupedTradeLog};
pub use crate::report::ranking::{RankingObservations, TradeRanking};
pub use crate::report::ratio::Ratio;
pub use crate::report::summary::{MetricsSummary, SummaryOptions};
pub use crate::report::trade_statistics::{Headline, TradeStatistics};

// 5. Session & Configuration
pub use crate::config::{DashboardConfig, FilterConfig, LogFormat};
pub use crate::dashboard::Dashboard;

// 6. Errors
pub use crate::error::{
    ConfigError, DataError, FilterError, IoError, TradelensError, TradelensResult,
};
