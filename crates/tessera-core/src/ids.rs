//! Tool and card identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Canonical, lower-cased tool name.
///
/// Tool names key the instance store and name directories under the realm,
/// so they are restricted to lowercase ASCII alphanumerics, `-` and `_`.
/// [`ToolName::new`] folds case before validating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ToolName(String);

/// Deserialize with validation so that a hand-edited store cannot smuggle a
/// path separator into a directory name.
impl<'de> Deserialize<'de> for ToolName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl ToolName {
    /// Create a tool name, lower-casing and validating it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidName`] if the name is empty or contains
    /// characters other than ASCII alphanumerics, `-` and `_`.
    pub fn new(name: impl AsRef<str>) -> CoreResult<Self> {
        let name = name.as_ref().trim().to_ascii_lowercase();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create a `ToolName` without validation (for tests and constants).
    #[must_use]
    pub fn from_static(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> CoreResult<()> {
        let invalid = |reason: &str| CoreError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("tool name must not be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(invalid(
                "tool name may only contain alphanumerics, '-' and '_'",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ToolName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ToolName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ToolName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Application-wide unique card identifier.
///
/// Opaque to everything but the rendering layer, which uses it as the id of
/// the card's surface. Freshly generated ids look like `node-<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    /// Generate a new random card id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("node-{}", Uuid::new_v4()))
    }

    /// Wrap an existing id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CardId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CardId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
