// src/depends/mod.rs

//! `depends` expressions.
//!
//! A task's `depends` string is a boolean expression over sibling task names:
//!
//! ```text
//! A && (B || !C) && D.Failed
//! ```
//!
//! Precedence from tightest to loosest is `!`, `&&`, `||`; both binary
//! operators are left-associative. An atom may carry a state qualifier
//! (`.Succeeded`, `.Failed`, `.Skipped`, `.Completed`); a bare name means
//! `.Succeeded`.
//!
//! - [`parser`] turns the string into a [`Predicate`].
//! - [`predicate`] holds the AST and both evaluation modes.

pub mod parser;
pub mod predicate;

use std::collections::HashSet;

use crate::errors::{DagweaveError, Result};

pub use parser::{parse, parse_optional};
pub use predicate::{Outcome, Predicate, TaskCondition};

/// Ensure every atom of `predicate` names a task in `siblings`.
///
/// `owner` is the task whose `depends` this is, used in the error.
pub fn check_references(
    owner: &str,
    predicate: &Predicate,
    siblings: &HashSet<&str>,
) -> Result<()> {
    for task in predicate.tasks() {
        if !siblings.contains(task) {
            return Err(DagweaveError::UnknownTaskReference {
                task: owner.to_string(),
                reference: task.to_string(),
            });
        }
    }
    Ok(())
}
