//! Error types for the render pipeline.

/// Failures reported by a [`HostRenderer`](crate::HostRenderer).
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The host cannot render at all (not loaded, shut down).
    #[error("host renderer unavailable: {0}")]
    Unavailable(String),

    /// The host rejected one note.
    #[error("host failed to render {path}: {message}")]
    Failed { path: String, message: String },
}

/// Failures reading from a [`Vault`](crate::Vault).
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("file not found in vault: {0}")]
    NotFound(String),

    #[error("path escapes the vault: {0}")]
    OutsideVault(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(String),
}

/// Failures from a [`FormulaRenderer`](crate::FormulaRenderer).
#[derive(Debug, thiserror::Error)]
pub enum FormulaError {
    #[error("invalid formula: {0}")]
    Invalid(String),

    #[error("formula renderer unavailable: {0}")]
    Unavailable(String),
}

/// Failures inside one extension hook.
///
/// The engine contains these: a failing walk leaves its token unclaimed and a
/// failing postprocess leaves the HTML as it was.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// The host DOM had no fragment at the cursor position.
    #[error("no host fragment for {selector} at index {index}")]
    MissingResource { selector: String, index: usize },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("{0}")]
    Failed(String),
}

/// Errors that abort a whole render.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The host renderer capability is gone; nothing can be correlated.
    #[error(transparent)]
    HostUnavailable(HostError),

    /// The note itself could not be read.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl From<HostError> for RenderError {
    fn from(e: HostError) -> Self {
        Self::HostUnavailable(e)
    }
}
