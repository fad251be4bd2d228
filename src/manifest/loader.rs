// src/manifest/loader.rs

use std::fs;
use std::path::Path;

use crate::errors::Result;
use crate::manifest::model::{Manifest, RawManifest};

/// Load a manifest file and return the raw, unvalidated `RawManifest`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawManifest> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Deserialize a manifest from TOML text.
pub fn parse_str(contents: &str) -> Result<RawManifest> {
    let manifest: RawManifest = toml::from_str(contents)?;
    Ok(manifest)
}

/// Load a manifest and validate it.
///
/// This is the entry point the rest of the crate uses:
///
/// - reads TOML;
/// - applies serde defaults;
/// - checks names, template shapes and duplicates, and registers every
///   template.
///
/// Graph-level checks (references, cycles) happen when the manifest is turned
/// into a [`crate::workflow::Workflow`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Manifest> {
    let raw = load_from_path(&path)?;
    Manifest::try_from(raw)
}
