//! Common types and utilities shared across Holdfast crates.
//!
//! This crate defines the shared error type, the user-action enum that the
//! session layer dispatches on, and centralised tracing/logging
//! initialisation. It is intentionally lightweight so that every crate in the
//! workspace can depend on it without heavy transitive costs.
//!
//! # Overview
//!
//! - [`HoldfastError`] and [`Result`]: shared error handling
//! - [`UserAction`]: element interactions the session layer can perform
//! - [`BrowserKind`]: browser families and their driver binaries
//! - [`observability`]: centralised tracing/logging initialisation
use serde::{Deserialize, Serialize};

pub mod observability;

/// An element interaction the session layer can dispatch.
///
/// `TypeText` carries its payload at the call site, not here, so the enum
/// stays cheap to copy and serialise in configuration or scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Click,
    Clear,
    TypeText,
}

/// Browser family driven through its WebDriver executable.
///
/// Each kind maps to a driver binary (`chromedriver`, `geckodriver`,
/// `msedgedriver`) and its own capability dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Firefox,
    Edge,
}

impl Default for BrowserKind {
    fn default() -> Self {
        Self::Chrome
    }
}

/// Error types used across the Holdfast workspace.
///
/// Driver-level failures travel as `anyhow::Error` with context attached at
/// the call site; only the errors callers match on get a variant here.
#[derive(thiserror::Error, Debug)]
pub enum HoldfastError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A page's live title did not match the expected title.
    #[error("Actual page title '{actual}' did not match expected page title '{expected}'")]
    TitleMismatch { expected: String, actual: String },
}

/// Convenient alias for results that use [`HoldfastError`].
pub type Result<T> = std::result::Result<T, HoldfastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_action_serialises_snake_case() {
        let json = serde_json::to_string(&UserAction::TypeText).unwrap();
        assert_eq!(json, "\"type_text\"");
        let back: UserAction = serde_json::from_str("\"clear\"").unwrap();
        assert_eq!(back, UserAction::Clear);
    }

    #[test]
    fn title_mismatch_message_names_both_titles() {
        let err = HoldfastError::TitleMismatch {
            expected: "Checkout".into(),
            actual: "Sign in".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Sign in"));
        assert!(msg.contains("Checkout"));
    }
}
