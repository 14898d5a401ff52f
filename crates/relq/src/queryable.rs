//! Per-model entry points.
//!
//! Implement [`Queryable`] once per model type to get `Book::query()`,
//! `Book::filter(..)` and the bulk writes without repeating the table name:
//!
//! ```ignore
//! struct Book;
//!
//! impl Queryable for Book {
//!     const TABLE: &'static str = "book";
//!
//!     fn schema() -> Arc<Schema> {
//!         SCHEMA.clone()
//!     }
//! }
//!
//! let recent = Book::filter(lookup! { "published__year__gte" => 2020 }).fetch_all(&client).await?;
//! ```

use crate::builder::{BulkOptions, QueryBuilder};
use crate::condition::Condition;
use crate::model::Schema;
use crate::value::Record;
use std::sync::Arc;

pub trait Queryable {
    /// Table name of the model in [`Queryable::schema`].
    const TABLE: &'static str;

    /// The schema the model is declared in.
    fn schema() -> Arc<Schema>;

    /// A fresh builder on the model's table.
    fn query() -> QueryBuilder {
        QueryBuilder::new(Self::schema(), Self::TABLE)
    }

    fn filter(cond: Condition) -> QueryBuilder {
        Self::query().filter(cond)
    }

    fn exclude(cond: Condition) -> QueryBuilder {
        Self::query().exclude(cond)
    }

    fn insert(rows: Vec<Record>) -> QueryBuilder {
        Self::query().insert(rows)
    }

    fn upsert(rows: Vec<Record>, options: BulkOptions) -> QueryBuilder {
        Self::query().upsert(rows, options)
    }

    fn merge(rows: Vec<Record>, options: BulkOptions) -> QueryBuilder {
        Self::query().merge(rows, options)
    }

    /// Make the whole table match `rows`. Use `Self::filter(..).align(..)` to scope it.
    fn align(rows: Vec<Record>, options: BulkOptions) -> QueryBuilder {
        Self::query().align(rows, options)
    }

    fn updates(rows: Vec<Record>, options: BulkOptions) -> QueryBuilder {
        Self::query().updates(rows, options)
    }

    fn gets(rows: Vec<Record>, options: BulkOptions) -> QueryBuilder {
        Self::query().gets(rows, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Statement;
    use crate::test_support::library;
    use crate::{lookup, record};
    use std::sync::LazyLock;

    static SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(library);

    struct Author;

    impl Queryable for Author {
        const TABLE: &'static str = "author";

        fn schema() -> Arc<Schema> {
            SCHEMA.clone()
        }
    }

    #[test]
    fn query_targets_the_model_table() {
        assert_eq!(
            Author::query().statement().unwrap(),
            "SELECT author.* FROM author"
        );
    }

    #[test]
    fn filter_matches_builder() {
        let cond = lookup! { "books__title" => "Dune" };
        assert_eq!(
            Author::filter(cond.clone()).statement().unwrap(),
            QueryBuilder::new(library(), "author")
                .filter(cond)
                .statement()
                .unwrap()
        );
    }

    #[test]
    fn bulk_entry_points() {
        let rows = || vec![record! { "name" => "a", "age" => 3 }];
        assert!(
            Author::upsert(rows(), BulkOptions::new())
                .statement()
                .unwrap()
                .starts_with("INSERT INTO author (name, age) VALUES")
        );
        assert!(
            Author::merge(rows(), BulkOptions::new())
                .statement()
                .unwrap()
                .starts_with("WITH __v (name, age) AS")
        );
        assert!(
            Author::align(rows(), BulkOptions::new())
                .statement()
                .unwrap()
                .contains("DELETE FROM author WHERE NOT EXISTS")
        );
        assert!(
            Author::updates(rows(), BulkOptions::new())
                .statement()
                .unwrap()
                .contains("UPDATE author SET age = __v.age")
        );
        assert!(
            Author::gets(rows(), BulkOptions::new())
                .statement()
                .unwrap()
                .contains("INNER JOIN __keys")
        );
    }
}
