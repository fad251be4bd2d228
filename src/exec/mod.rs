// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the `TaskRunner` trait the runtime calls for every
//!   script task, together with its request/result types. Tests replace the
//!   runner with a fake implementation.
//! - [`shell`] contains `ShellRunner`, the production runner that executes
//!   scripts with `tokio::process`.

pub mod backend;
pub mod shell;

pub use backend::{RunFuture, RunRequest, RunnerFailure, RunnerOutput, TaskRunner};
pub use shell::ShellRunner;
