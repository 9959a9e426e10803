//! Shared types for the datascope row-level permission engine.
//!
//! # Modules
//!
//! - [`value`] - Runtime values bound into templates and compared by filters
//! - [`filter`] - The filter expression tree attached to a statement
//! - [`statement`] - Statement kinds seen by the interception hook

pub mod filter;
pub mod statement;
pub mod value;

pub use filter::{like_match, CompareOp, FilterExpr, JoinOperator, Operand};
pub use statement::StatementKind;
pub use value::Value;
