//! Error types shared by the configuration store and the bot runners.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The settings path does not end with `.json`.
    #[error("settings can only use .json files, got {}", .0.display())]
    InvalidPath(PathBuf),

    /// The settings file does not exist.
    #[error("settings file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// One of the bot start steps failed.
    #[error("failed to start bot for {}: {source}", .path.display())]
    Startup {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("bot for {} did not start within {timeout:?}", .path.display())]
    StartupTimeout { path: PathBuf, timeout: Duration },

    /// A previous start attempt for this settings file failed; runners are
    /// not restarted.
    #[error("bot for {} failed to start earlier", .0.display())]
    RunnerFailed(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
