//! Report status values.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle of a report.
///
/// `Processing` means a job is in flight for the report; it is not
/// usable input to the next step until it leaves that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Processing,
    Published,
    Archived,
}

impl ReportStatus {
    /// Parse a status string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "draft" => Ok(Self::Draft),
            "processing" => Ok(Self::Processing),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            _ => Err(CoreError::Validation(format!(
                "Invalid report status '{s}'. Must be one of: draft, processing, published, archived"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Processing => "processing",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    pub fn is_usable(self) -> bool {
        self != Self::Processing
    }
}
