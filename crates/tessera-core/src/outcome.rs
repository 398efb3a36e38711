//! Uniform lifecycle hook result.

use serde::{Deserialize, Serialize};

/// Result of a lifecycle hook: `{status, message?, error?}`.
///
/// Hooks never fail past their boundary; a failure is data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookOutcome {
    /// Whether the hook succeeded.
    pub status: bool,
    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Underlying error text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookOutcome {
    /// Plain success.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: true,
            message: None,
            error: None,
        }
    }

    /// Failure with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: Some(message.into()),
            error: None,
        }
    }

    /// Failure with a message and the error that caused it.
    #[must_use]
    pub fn error(message: impl Into<String>, error: impl ToString) -> Self {
        Self {
            status: false,
            message: Some(message.into()),
            error: Some(error.to_string()),
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether the hook succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status
    }
}

impl Default for HookOutcome {
    fn default() -> Self {
        Self::ok()
    }
}

impl std::fmt::Display for HookOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.status { "ok" } else { "failed" })?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(error) = &self.error {
            write!(f, " ({error})")?;
        }
        Ok(())
    }
}
