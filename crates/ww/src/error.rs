//! CLI error types.

use ww_config::ConfigError;
use ww_renderer::{RenderError, VaultError};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Vault(#[from] VaultError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to watch vault: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Validation(String),
}
