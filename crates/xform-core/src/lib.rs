//! XForm Core - Columnar pull-based query engine
//!
//! This crate implements the XForm verb language over in-memory columnar
//! tables:
//! - Typed column batches with selector indirection and null masks
//! - A two-phase bind/iterate table protocol that computes only bound columns
//! - Streaming verbs (select, set, cast, where, limit, skip, concat)
//! - Building verbs (count, join, groupBy, choose, peek, cache)
//! - A line-per-verb query parser with usage errors and completion suggestions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             Query Parser                    │
//! │     (Scanner, Expressions, Suggestions)     │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │                Verbs                        │
//! │ (Where, Join, GroupBy, Choose, Peek, ...)   │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │        Table Protocol / Dictionaries        │
//! │   (XTable, Binder/Cursor, Catalog, Keys)    │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │              Data Model                     │
//! │  (XArray, ArraySelector, BitVector, Types)  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ```rust,no_run
//! use xform_core::testing::sample_context;
//! use xform_core::{XqlParser, run_count};
//! use tokio_util::sync::CancellationToken;
//!
//! let context = sample_context()?;
//! let table = XqlParser::parse("read WebRequest\nwhere [ServerPort] = 80", &context)?;
//! let rows = run_count(table, context.config.batch_size, &CancellationToken::new())?;
//! assert_eq!(rows, 423);
//! # Ok::<(), xform_core::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod data;
pub mod dictionary;
pub mod error;
pub mod query;
pub mod table;
pub mod testing;
pub mod verbs;

pub use config::EngineConfig;
pub use context::WorkflowContext;
pub use error::{Error, Result};
pub use query::{Suggestion, UsageError, XqlParser, suggest};
pub use table::{ArrayTable, Binder, Cursor, InMemoryCatalog, TableCatalog, XTable, run_count};
