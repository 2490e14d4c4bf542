//! Report workflow steps and transition rules.
//!
//! A project moves through six ordered steps while a report is being
//! produced. The persisted step column also carries a sentinel (`0`)
//! meaning the user has left the workflow, which is distinct from step 1
//! (a workflow that has not started yet).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// The six steps of the report workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Setup,
    Upload,
    Analysis,
    Notes,
    Generation,
    Review,
}

/// Persisted step value for "not in workflow".
pub const STEP_SENTINEL: u8 = 0;

/// Minimum step number (1-based).
pub const MIN_STEP: u8 = 1;

/// Maximum step number (1-based).
pub const MAX_STEP: u8 = 6;

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 6] = [
        Self::Setup,
        Self::Upload,
        Self::Analysis,
        Self::Notes,
        Self::Generation,
        Self::Review,
    ];

    /// Convert a 1-based step number to a `WorkflowStep`.
    pub fn from_number(n: u8) -> Result<Self, CoreError> {
        match n {
            1 => Ok(Self::Setup),
            2 => Ok(Self::Upload),
            3 => Ok(Self::Analysis),
            4 => Ok(Self::Notes),
            5 => Ok(Self::Generation),
            6 => Ok(Self::Review),
            _ => Err(CoreError::Validation(format!(
                "Invalid step number {n}. Must be between {MIN_STEP} and {MAX_STEP}"
            ))),
        }
    }

    /// Convert to a 1-based step number.
    pub fn to_number(self) -> u8 {
        match self {
            Self::Setup => 1,
            Self::Upload => 2,
            Self::Analysis => 3,
            Self::Notes => 4,
            Self::Generation => 5,
            Self::Review => 6,
        }
    }

    /// Human-readable label for the step.
    pub fn label(self) -> &'static str {
        match self {
            Self::Setup => "Project Setup",
            Self::Upload => "Upload Files",
            Self::Analysis => "File Analysis",
            Self::Notes => "Notes",
            Self::Generation => "Report Generation",
            Self::Review => "Review",
        }
    }

    /// Route segment the UI uses for the step.
    pub fn route(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Upload => "upload",
            Self::Analysis => "analysis",
            Self::Notes => "notes",
            Self::Generation => "generation",
            Self::Review => "review",
        }
    }

    /// The following step, or `None` on the last step.
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.to_number() + 1).ok()
    }

    /// The preceding step, or `None` on the first step.
    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.to_number().saturating_sub(1)).ok()
    }

    /// Whether this step launches an external job.
    pub fn runs_job(self) -> bool {
        matches!(self, Self::Analysis | Self::Generation)
    }
}

// ---------------------------------------------------------------------------
// Position (step or sentinel)
// ---------------------------------------------------------------------------

/// Where a project currently sits relative to the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum WorkflowPosition {
    /// No row exists yet; callers route to step 1.
    NotStarted,
    /// The user is on the given step.
    Active(WorkflowStep),
    /// The user finished or explicitly left the workflow.
    Exited,
}

impl WorkflowPosition {
    /// Interpret a persisted step column (`None` when no row exists).
    pub fn from_stored(step: Option<i32>) -> Result<Self, CoreError> {
        match step {
            None => Ok(Self::NotStarted),
            Some(0) => Ok(Self::Exited),
            Some(n) => {
                let n = u8::try_from(n).map_err(|_| {
                    CoreError::Validation(format!("Stored step {n} is out of range"))
                })?;
                Ok(Self::Active(WorkflowStep::from_number(n)?))
            }
        }
    }

    /// The step a UI should render; not started and exited both start over.
    pub fn effective_step(self) -> WorkflowStep {
        match self {
            Self::Active(step) => step,
            Self::NotStarted | Self::Exited => WorkflowStep::Setup,
        }
    }

    /// Persisted form of the position.
    pub fn as_stored(self) -> u8 {
        match self {
            Self::Active(step) => step.to_number(),
            Self::NotStarted | Self::Exited => STEP_SENTINEL,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a step number is within the valid range.
pub fn validate_step_number(step: u8) -> Result<(), CoreError> {
    if !(MIN_STEP..=MAX_STEP).contains(&step) {
        return Err(CoreError::Validation(format!(
            "Step {step} is out of range ({MIN_STEP}..{MAX_STEP})"
        )));
    }
    Ok(())
}

/// Validate a user-driven step transition.
///
/// Coordinators move exactly one step forward or back. Jumping over a
/// step would skip its preconditions.
pub fn validate_step_transition(current: u8, next: u8) -> Result<(), CoreError> {
    validate_step_number(current)?;
    validate_step_number(next)?;

    let diff = (next as i16) - (current as i16);
    if diff != 1 && diff != -1 {
        return Err(CoreError::Validation(format!(
            "Cannot transition from step {current} to step {next}. \
             Must advance or go back exactly one step."
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_from_number_invalid() {
        assert!(WorkflowStep::from_number(0).is_err());
        assert!(WorkflowStep::from_number(7).is_err());
        assert!(WorkflowStep::from_number(255).is_err());
    }

    #[test]
    fn step_numbers_follow_declaration_order() {
        for (i, step) in WorkflowStep::ALL.iter().enumerate() {
            assert_eq!(step.to_number() as usize, i + 1);
            assert_eq!(WorkflowStep::from_number(step.to_number()).unwrap(), *step);
        }
    }

    #[test]
    fn next_and_previous_stop_at_the_ends() {
        assert_eq!(WorkflowStep::Setup.previous(), None);
        assert_eq!(WorkflowStep::Review.next(), None);
        assert_eq!(WorkflowStep::Analysis.next(), Some(WorkflowStep::Notes));
        assert_eq!(WorkflowStep::Analysis.previous(), Some(WorkflowStep::Upload));
    }

    #[test]
    fn only_analysis_and_generation_run_jobs() {
        let job_steps: Vec<_> = WorkflowStep::ALL.into_iter().filter(|s| s.runs_job()).collect();
        assert_eq!(job_steps, vec![WorkflowStep::Analysis, WorkflowStep::Generation]);
    }

    #[test]
    fn position_from_stored_distinguishes_sentinel_and_missing() {
        assert_eq!(WorkflowPosition::from_stored(None).unwrap(), WorkflowPosition::NotStarted);
        assert_eq!(WorkflowPosition::from_stored(Some(0)).unwrap(), WorkflowPosition::Exited);
        assert_eq!(
            WorkflowPosition::from_stored(Some(4)).unwrap(),
            WorkflowPosition::Active(WorkflowStep::Notes)
        );
        assert!(WorkflowPosition::from_stored(Some(9)).is_err());
        assert!(WorkflowPosition::from_stored(Some(-1)).is_err());
    }

    #[test]
    fn effective_step_restarts_at_setup() {
        assert_eq!(WorkflowPosition::NotStarted.effective_step(), WorkflowStep::Setup);
        assert_eq!(WorkflowPosition::Exited.effective_step(), WorkflowStep::Setup);
        assert_eq!(
            WorkflowPosition::Active(WorkflowStep::Review).effective_step(),
            WorkflowStep::Review
        );
    }

    #[test]
    fn transition_by_one_is_valid() {
        for current in MIN_STEP..MAX_STEP {
            assert!(validate_step_transition(current, current + 1).is_ok());
            assert!(validate_step_transition(current + 1, current).is_ok());
        }
    }

    #[test]
    fn transition_skip_or_stay_is_invalid() {
        assert!(validate_step_transition(2, 2).is_err());
        assert!(validate_step_transition(1, 3).is_err());
        assert!(validate_step_transition(6, 4).is_err());
        assert!(validate_step_transition(0, 1).is_err());
        assert!(validate_step_transition(6, 7).is_err());
    }
}
