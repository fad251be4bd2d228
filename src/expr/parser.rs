// src/expr/parser.rs

//! Placeholder parser.
//!
//! Only `{{` opens a placeholder. A lone `}}` in literal text is kept as
//! text, so JSON-ish defaults like `'{"a": {"b": 1}}'` survive untouched.

use crate::errors::{DagweaveError, Result};
use crate::expr::ast::{Reference, Segment};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Split `source` into literal and reference segments.
///
/// Adjacent literals are merged; an empty input yields no segments.
pub fn parse(source: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }

        let inner_start = start + OPEN.len();
        let close = rest[inner_start..].find(CLOSE).ok_or_else(|| {
            malformed(
                source,
                format!("unclosed placeholder starting at offset {}", offset + start),
            )
        })?;

        let inner = &rest[inner_start..inner_start + close];
        if inner.contains(OPEN) {
            return Err(malformed(
                source,
                format!("nested placeholder at offset {}", offset + start),
            ));
        }

        segments.push(Segment::Reference(parse_reference(source, inner.trim())?));

        let consumed = inner_start + close + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(segments)
}

fn parse_reference(source: &str, path: &str) -> Result<Reference> {
    if path.is_empty() {
        return Err(malformed(source, "empty placeholder".to_string()));
    }

    let parts: Vec<&str> = path.split('.').collect();
    if let Some(bad) = parts.iter().find(|p| !is_path_part(p)) {
        return Err(malformed(
            source,
            format!("invalid path component '{bad}' in '{path}'"),
        ));
    }

    let reference = match parts.as_slice() {
        ["inputs", "parameters", name] => Reference::Input(name.to_string()),
        ["tasks", task, "outputs", "parameters", name] => Reference::TaskOutput {
            task: task.to_string(),
            parameter: name.to_string(),
        },
        ["tasks", task, "outputs", "result"] => Reference::TaskResult {
            task: task.to_string(),
        },
        ["workflow", "name"] => Reference::WorkflowName,
        ["workflow", "parameters", name] => Reference::WorkflowParameter(name.to_string()),
        _ => {
            return Err(malformed(
                source,
                format!("unrecognised reference '{path}'"),
            ));
        }
    };

    Ok(reference)
}

fn is_path_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn malformed(source: &str, message: String) -> DagweaveError {
    DagweaveError::MalformedExpression {
        expression: source.to_string(),
        message,
    }
}
