//! Query language: scanning, parsing, expressions and suggestions

pub mod expression;
pub mod functions;
pub mod parser;
pub mod scanner;
pub mod suggest;
pub mod usage;

pub use expression::{BoundExpr, BoundScalar, CompareOperator, Expr, ScalarExpr};
pub use parser::XqlParser;
pub use suggest::{Suggestion, suggest};
pub use usage::UsageError;
