// src/expr/mod.rs

//! Placeholder expressions.
//!
//! An expression is a string such as
//! `"{{tasks.A.outputs.result}}-{{inputs.parameters.suffix}}"`: literal text
//! interleaved with `{{...}}` placeholders. It is parsed once into a small
//! AST ([`ast::Expression`]) and resolved against a [`Scope`] by plain
//! textual substitution.
//!
//! - [`ast`] holds the segment/reference types.
//! - [`parser`] turns a raw string into segments.
//! - [`resolve`] substitutes references using a [`Scope`].

pub mod ast;
pub mod parser;
pub mod resolve;

pub use ast::{Expression, Reference, Segment};
pub use parser::parse;
pub use resolve::{InputScope, Scope, WorkflowContext, resolve, resolve_str};
