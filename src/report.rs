pub mod cumulative_pnl;
pub mod delta_exposure;
pub mod filter;
pub mod grouped;
pub mod io;
pub mod loader;
pub mod polars_ext;
pub mod ranking;
pub mod ratio;
pub mod summary;
pub mod trade_log;
pub mod trade_statistics;
