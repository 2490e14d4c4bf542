//! Job kinds and the targets they run against.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// The two kinds of externally executed work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FileAnalysis,
    ReportGeneration,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileAnalysis => "file_analysis",
            Self::ReportGeneration => "report_generation",
        }
    }
}

/// Whether the worker should treat a job as a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Test,
    Production,
}

impl DispatchMode {
    /// Derive the mode from the target entity's name.
    ///
    /// Names starting with `test` (case-insensitive, ignoring leading
    /// whitespace) are test runs.
    pub fn from_name(name: &str) -> Self {
        if name.trim_start().to_lowercase().starts_with("test") {
            Self::Test
        } else {
            Self::Production
        }
    }
}

/// Entities a job runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTarget {
    pub project_id: DbId,
    pub report_id: Option<DbId>,
    #[serde(default)]
    pub file_ids: Vec<DbId>,
    /// Display name of the target, used to derive the dispatch mode.
    pub name: String,
}

impl JobTarget {
    pub fn mode(&self) -> DispatchMode {
        DispatchMode::from_name(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_name() {
        assert_eq!(DispatchMode::from_name("Test report"), DispatchMode::Test);
        assert_eq!(DispatchMode::from_name("  testing 123"), DispatchMode::Test);
        assert_eq!(DispatchMode::from_name("Quarterly review"), DispatchMode::Production);
        assert_eq!(DispatchMode::from_name("Contest entry"), DispatchMode::Production);
    }

    #[test]
    fn target_mode_uses_name() {
        let target = JobTarget {
            project_id: 1,
            report_id: None,
            file_ids: vec![],
            name: "TEST site survey".to_string(),
        };
        assert_eq!(target.mode(), DispatchMode::Test);
    }
}
