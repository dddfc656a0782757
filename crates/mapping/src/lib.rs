//! Mapping of source rows to Groonga records.
//!
//! A [`Mapping`] is read from the `mapping` section of the import
//! configuration. Each destination table lists the source tables feeding it
//! and how every destination column is generated: a `%{field}` [`Template`]
//! or an [`Expression`], optionally cast to a declared Groonga type.
//!
//! Generation is pure. Any failure for a row is a [`GenerationError`]
//! carrying the row, the column and the cause.

mod definition;
mod error;
pub mod expression;
mod restriction;
mod table;
mod template;

pub use definition::{Mapping, SourceDatabase, SourceTable};
pub use error::{ConfigError, GenerationCause, GenerationError};
pub use expression::{EvaluationError, Expression, Function};
pub use restriction::{Restriction, TimeRestriction};
pub use table::{ColumnGenerator, GroongaColumn, GroongaTable};
pub use template::Template;
