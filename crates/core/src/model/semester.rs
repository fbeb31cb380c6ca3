use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::catalog::CatalogError;

/// Label of a semester, e.g. `S1`.
///
/// Labels carry no ordering of their own; the catalog declares the order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemesterLabel(String);

impl SemesterLabel {
    /// Build a label from raw text, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::EmptySemesterLabel` if nothing remains after trimming.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, CatalogError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CatalogError::EmptySemesterLabel);
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SemesterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SemesterLabel {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SemesterLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
