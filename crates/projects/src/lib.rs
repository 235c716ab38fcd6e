//! Projects module: client projects, their tasks and cost tracking.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod project;
pub mod task;

pub use project::{
    AddTask, AssignTask, ChangeProjectStatus, ChangeTaskStatus, CreateProject, LogCost, Project,
    ProjectCommand, ProjectEvent, ProjectId, ProjectStatus,
};
pub use task::{Task, TaskId, TaskStatus};
