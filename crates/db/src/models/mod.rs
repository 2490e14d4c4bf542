//! Row models and DTOs, one module per table.

pub mod progress_record;
pub mod project_file;
pub mod report;
pub mod workflow_state;
