use thiserror::Error;

pub type TradelensResult<T> = Result<T, TradelensError>;

#[derive(Debug, Error)]
pub enum TradelensError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors related to trade log loading, frame operations and domain types.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Trade log is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Invalid trade record: {0}")]
    InvalidRecord(String),

    #[error("Failed to parse enum: {0}")]
    ParseEnum(#[from] strum::ParseError),

    #[error("Unexpected enum variant: {0}")]
    UnexpectedEnumVariant(String),
}

/// Errors raised at the filter input boundary, before a filter reaches a trade log.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid date '{value}': {msg}")]
    InvalidDate { value: String, msg: String },

    #[error("Invalid date range (start: {start}, end: {end}): start must not be after end")]
    InvalidDateRange { start: String, end: String },
}

/// Errors related to dashboard configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid dashboard configuration: {0}")]
    Invalid(String),
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to write data: {0}")]
    WriteFailed(String),

    #[error("Failed to read data: {0}")]
    ReadFailed(String),
}
