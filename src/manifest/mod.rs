// src/manifest/mod.rs

//! Workflow manifests.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a manifest from disk (`loader.rs`).
//! - Validate shapes and names and build the template registry
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigSection, Manifest, RawDag, RawManifest, RawOutput, RawParameter, RawScript, RawTask,
    RawTemplate, WorkflowSection,
};
