//! Error types.
//!
//! Only two kinds of failure ever reach a caller: invalid configuration
//! (raised when a strategy is constructed) and block-type violations at the
//! history append boundary. Everything that can go wrong during counting or
//! truncation is logged and absorbed instead.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid strategy configuration. Fatal to the caller, never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max_size ({max_size}) must be at least 1")]
    MaxSizeTooSmall { max_size: usize },

    #[error("keep_first ({keep_first}) must be less than half of max_size ({max_size})")]
    KeepFirstTooLarge { keep_first: usize, max_size: usize },

    #[error("at least one context manager must be provided to the pipeline")]
    EmptyPipeline,

    #[error("strategy '{strategy}' needs a model caller to produce summaries")]
    MissingModel { strategy: &'static str },

    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A turn rejected at the history append boundary.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HistoryError {
    #[error("invalid block type for user turn: {kind}")]
    InvalidUserBlock { kind: &'static str },

    #[error("invalid block type for assistant turn: {kind}")]
    InvalidAssistantBlock { kind: &'static str },

    #[error("cannot append an empty turn")]
    EmptyTurn,

    #[error("got {results} tool result(s) for {calls} tool call(s)")]
    ResultCountMismatch { calls: usize, results: usize },
}
