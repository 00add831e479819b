//! Error types for selector compilation.

/// Errors raised while querying an element tree.
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    /// The selector string is not a valid selector list.
    #[error("invalid selector {selector:?}")]
    Selector { selector: String },
}
