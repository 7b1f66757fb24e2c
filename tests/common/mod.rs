use std::path::PathBuf;

use tradelens::prelude::{LoadOutcome, TradeLog};

pub fn fixture_path(name: &str) -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("tests/fixtures").join(name)
}

pub fn load_fixture() -> LoadOutcome {
    TradeLog::from_csv_path(fixture_path("trades.csv")).expect("Failed to load trades.csv fixture")
}

pub fn approx(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-6
}
