pub mod config;
pub mod dashboard;
pub mod error;
pub mod prelude;
pub mod report;
