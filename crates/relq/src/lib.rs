//! # relq
//!
//! A relation-aware query builder for PostgreSQL.
//!
//! ## Features
//!
//! - **Lookup paths**: `author__name__icontains` resolves columns and adds the joins it needs
//! - **One escaping boundary**: every value reaches SQL text through [`encode_literal`]
//! - **Bulk writes**: CTE-based `merge`, `upsert`, `align`, `updates` and `gets`
//! - **Executor-agnostic**: SQL text goes to any [`Executor`]; adapters for
//!   `tokio-postgres` and `deadpool-postgres` are included
//! - **Instrumentation**: [`InstrumentedExecutor`] logs statements via `tracing` and
//!   enforces timeouts
//!
//! ## Example
//!
//! ```ignore
//! use relq::prelude::*;
//!
//! let schema = Schema::builder()
//!     .model(
//!         ModelDescriptor::new("author")
//!             .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
//!             .field(FieldDescriptor::new("name", FieldType::Text).unique()),
//!     )
//!     .model(
//!         ModelDescriptor::new("book")
//!             .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
//!             .field(FieldDescriptor::new("title", FieldType::Text))
//!             .field(FieldDescriptor::new("author", FieldType::Integer).references("author")),
//!     )
//!     .build()?;
//!
//! let rows = QueryBuilder::new(schema.clone(), "book")
//!     .filter(lookup! { "author__name__istartswith" => "ur" })
//!     .order_by(&["title"])
//!     .fetch_all(&client)
//!     .await?;
//!
//! QueryBuilder::new(schema, "author")
//!     .upsert(vec![record! { "name" => "Ursula" }], BulkOptions::new())
//!     .execute(&client)
//!     .await?;
//! ```

pub mod aggregate;
pub mod builder;
pub mod condition;
pub mod encode;
pub mod error;
pub mod executor;
pub mod ident;
pub mod join;
pub mod lookup;
pub mod model;
pub mod monitor;
pub mod prelude;
pub mod queryable;
pub mod resolve;
pub mod row;
pub mod value;

#[cfg(test)]
mod test_support;

pub use aggregate::Aggregate;
pub use builder::{
    BulkOptions, Compiled, ConflictAction, QueryBuilder, RawStatement, SetOp, SetQuery, Statement,
    StatementKind,
};
pub use condition::{Condition, Logic};
pub use encode::{encode_column, encode_literal, encode_token};
pub use error::{BuildError, BuildResult, OrmError, OrmResult};
pub use executor::{ExecOptions, Executor};
pub use join::{Join, JoinKind};
pub use lookup::Operator;
pub use model::{FieldDescriptor, FieldType, Model, ModelDescriptor, Reference, Schema};
pub use monitor::{ExecConfig, InstrumentedExecutor};
pub use queryable::Queryable;
pub use row::{Output, ResultSet};
pub use value::{Record, Value};
