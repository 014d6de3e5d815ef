use std::path::PathBuf;

use thiserror::Error;

/// Transport-level failures of the live feed. Never retried here.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedError {
    #[error("bulk read of `{table}` failed: {message}")]
    Read { table: String, message: String },
    #[error("subscription to `{table}` failed: {message}")]
    Subscribe { table: String, message: String },
}

/// A feed row that cannot become a marker.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    #[error("row is not a JSON object")]
    NotAnObject,
    #[error("row is missing `{0}`")]
    MissingField(&'static str),
    #[error("row field `{0}` is not a number")]
    NotANumber(&'static str),
    #[error("row coordinates out of range (lon {longitude}, lat {latitude})")]
    OutOfRange { longitude: f64, latitude: f64 },
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("coordinate conversion failed: {0}")]
pub struct ConversionError(pub String);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image `{0}` not found")]
    NotFound(String),
    #[error("image `{0}` is empty")]
    Empty(String),
    #[error("failed to read image `{name}`")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced on the widget's error channel.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MarkerPinError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("pin `{0}` is not configured or its image failed to load")]
    PinUnavailable(String),
    #[error("no view is open")]
    NoView,
}
