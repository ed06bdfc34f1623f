//! Reference expressions.
//!
//! Step inputs and conditions may refer to earlier results:
//!
//! - `steps.<id>.outputs.<path>` and `steps.<id>.error.<path>`
//! - `trigger.<path>`
//! - `context.<name>[.<path>]`
//! - the legacy `<id>.outputs|result|data.<path>`
//!
//! Strings are parsed into an [`Expr`] and evaluated against a
//! [`ResolutionScope`]. Strings that are not a single expression fall back
//! to in-place substitution.

mod ast;
mod lexer;
mod parser;
mod resolver;
#[cfg(test)]
mod resolver_tests;
pub mod scan;

pub use ast::{BinaryOp, Expr, PathSegment, Reference, ReferenceRoot};
pub use parser::ExprParser;
pub use resolver::{
    evaluate, evaluate_condition, is_truthy, navigate, resolve_inputs, resolve_str,
    resolve_value, ResolutionScope, StaticScope,
};
pub use scan::{find_references, referenced_steps, ReferenceSpan, ScannedTarget};
