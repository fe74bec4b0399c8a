#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GwtError {
    #[error("not inside a git repository")]
    NotInGitRepo,

    #[error("git is required but was not found in PATH")]
    GitNotFound,

    #[error("git {command}: {stderr}")]
    Git { command: String, stderr: String },

    #[error(
        "another operation is in progress (lock {} still held after {}ms)",
        path.display(),
        waited.as_millis()
    )]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("malformed lock file {}: {reason}", path.display())]
    LockMetadata { path: PathBuf, reason: String },

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("terminal error: {0}")]
    Terminal(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}
