pub mod jobs;
pub mod navigation;
pub mod steps;
pub mod workflow;
