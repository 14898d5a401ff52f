//! Convenient imports for typical `relq` usage.
//!
//! ```ignore
//! use relq::prelude::*;
//! ```

pub use crate::{
    Aggregate, BulkOptions, Condition, Executor, FieldDescriptor, FieldType, JoinKind,
    ModelDescriptor, OrmError, OrmResult, QueryBuilder, Queryable, Record, Schema, Statement,
    Value, lookup, record,
};
