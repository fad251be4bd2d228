#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

pub use dagweave_test_utils::{init_tracing, with_timeout};

/// Directory holding the demo manifests shipped with the crate.
pub fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos")
}

/// `[("a", "1")]` -> `{"a": "1"}`
pub fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
