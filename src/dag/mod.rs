// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the validated, immutable task graph.
//! - [`builder`] instantiates a DAG template into a graph: binds inputs,
//!   checks references and derives explicit and implicit edges.
//! - [`scheduler`] contains the per-graph state machine that decides which
//!   tasks are ready, skipped or cancelled.
//! - [`task_info`] provides per-task state and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] applies the state transitions.
//! - [`scope`] resolves expressions against a running graph.

pub mod builder;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod scope;
pub mod state_manager;
pub mod task_info;

pub use builder::DagBuilder;
pub use graph::{DagGraph, TaskNode};
pub use scheduler::{GraphStatus, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use scope::GraphScope;
pub use task_info::{ScheduledTask, TaskInstance, TaskState};
