//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod progress_record_repo;
pub mod project_file_repo;
pub mod report_repo;
pub mod workflow_state_repo;

pub use progress_record_repo::ProgressRecordRepo;
pub use project_file_repo::ProjectFileRepo;
pub use report_repo::ReportRepo;
pub use workflow_state_repo::WorkflowStateRepo;
