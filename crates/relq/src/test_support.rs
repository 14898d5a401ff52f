//! Shared schema for unit tests.

use crate::model::{FieldDescriptor, FieldType, ModelDescriptor, Schema};
use std::sync::Arc;

/// author <- book <- review
pub(crate) fn library() -> Arc<Schema> {
    Schema::builder()
        .model(
            ModelDescriptor::new("author")
                .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                .field(FieldDescriptor::new("name", FieldType::Text).unique())
                .field(FieldDescriptor::new("bio", FieldType::Text).nullable())
                .field(FieldDescriptor::new("age", FieldType::Integer).nullable())
                .field(FieldDescriptor::new("profile", FieldType::Jsonb).nullable()),
        )
        .model(
            ModelDescriptor::new("book")
                .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                .field(FieldDescriptor::new("title", FieldType::Text))
                .field(
                    FieldDescriptor::new("author", FieldType::Integer)
                        .references("author")
                        .related_name("books"),
                )
                .field(FieldDescriptor::new("published", FieldType::Date).nullable())
                .field(FieldDescriptor::new("pages", FieldType::Integer).default(0))
                .field(FieldDescriptor::new("isbn", FieldType::Text).unique().nullable())
                .unique_together(&["author", "title"]),
        )
        .model(
            ModelDescriptor::new("review")
                .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                .field(FieldDescriptor::new("book", FieldType::Integer).references("book"))
                .field(FieldDescriptor::new("stars", FieldType::SmallInt))
                .field(FieldDescriptor::new("body", FieldType::Text).nullable()),
        )
        .build()
        .expect("library schema links")
}
