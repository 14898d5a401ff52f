//! CTE-based bulk writes: merge, upsert, align, batched updates and batched gets.
//!
//! Every planner turns the caller's rows into a typed `VALUES` list. Cells are cast to the
//! column's SQL type so the CTE has well-defined column types even when every cell in a
//! column is `NULL`.

use super::assemble::render_on_conflict;
use super::{
    ConflictAction, CteBody, Insert, InsertSource, Mutation, OnConflict, QueryBuilder, Statement,
};
use crate::encode::encode_column;
use crate::error::{BuildError, BuildResult};
use crate::ident::{qualified, quote};
use crate::join::{Join, JoinKind};
use crate::model::Model;
use crate::value::{Record, Value};
use std::sync::Arc;

const VALUES_CTE: &str = "__v";
const PRESENT_CTE: &str = "__present";
const UPSERTED_CTE: &str = "__upserted";
const KEYS_CTE: &str = "__keys";

/// Key and column overrides for bulk writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOptions {
    /// Columns identifying a row. Inferred from the model when unset.
    pub key: Option<Vec<String>>,
    /// Columns written. Defaults to every field present in at least one row.
    pub columns: Option<Vec<String>>,
}

impl BulkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: &[&str]) -> Self {
        self.key = Some(key.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}

/// Rows normalized against a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) key: Vec<String>,
    pub(crate) columns: Vec<String>,
    /// Encoded and cast cells, one inner vector per row.
    pub(crate) rows: Vec<Vec<String>>,
}

impl Plan {
    fn values_sql(&self) -> String {
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|cells| format!("({})", cells.join(", ")))
            .collect();
        format!("VALUES {}", rows.join(", "))
    }

    fn non_key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !self.key.contains(c))
            .cloned()
            .collect()
    }

    fn on_conflict(&self) -> OnConflict {
        let update = self.non_key_columns();
        OnConflict {
            target: self.key.clone(),
            action: if update.is_empty() {
                ConflictAction::Nothing
            } else {
                ConflictAction::Update(update)
            },
        }
    }
}

fn check_fields(model: &Model, names: &[String]) -> BuildResult<()> {
    match names.iter().find(|n| model.field(n).is_none()) {
        Some(bad) => Err(BuildError::invalid_field(bad.as_str(), model.table())),
        None => Ok(()),
    }
}

/// Explicit key, else the first unique-together group covered by `columns`, else the first
/// unique field in `columns`.
fn infer_key(model: &Model, columns: &[String], explicit: Option<&Vec<String>>) -> BuildResult<Vec<String>> {
    if let Some(key) = explicit {
        if key.is_empty() {
            return Err(BuildError::NoKey(model.table().to_string()));
        }
        check_fields(model, key)?;
        return Ok(key.clone());
    }
    if let Some(group) = model
        .unique_together()
        .iter()
        .find(|g| g.iter().all(|c| columns.contains(c)))
    {
        return Ok(group.clone());
    }
    model
        .fields()
        .iter()
        .find(|f| f.is_unique() && columns.contains(&f.name))
        .map(|f| vec![f.name.clone()])
        .ok_or_else(|| BuildError::NoKey(model.table().to_string()))
}

/// Sort names into model field order.
fn model_order(model: &Model, names: &mut [String]) {
    names.sort_by_key(|n| model.position(n).unwrap_or(usize::MAX));
}

pub(crate) fn plan(model: &Model, rows: &[Record], options: &BulkOptions) -> BuildResult<Plan> {
    if rows.is_empty() {
        return Err(BuildError::EmptyList(format!(
            "bulk write on '{}' needs at least one row",
            model.table()
        )));
    }
    for row in rows {
        if let Some(bad) = row.keys().find(|k| model.field(k).is_none()) {
            return Err(BuildError::invalid_field(bad, model.table()));
        }
    }

    let mut columns: Vec<String> = match &options.columns {
        Some(explicit) => {
            check_fields(model, explicit)?;
            explicit.clone()
        }
        None => model
            .fields()
            .iter()
            .filter(|f| rows.iter().any(|r| r.contains(&f.name)))
            .map(|f| f.name.clone())
            .collect(),
    };

    let key = infer_key(model, &columns, options.key.as_ref())?;
    let mut missing: Vec<String> = key.iter().filter(|k| !columns.contains(k)).cloned().collect();
    model_order(model, &mut missing);
    columns.extend(missing);
    if columns.is_empty() {
        return Err(BuildError::NoColumns(model.table().to_string()));
    }

    let mut encoded = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(columns.len());
        for column in &columns {
            let Some(field) = model.field(column) else {
                return Err(BuildError::invalid_field(column.as_str(), model.table()));
            };
            let value = match row.get(column) {
                Some(v) => v.clone(),
                None => field.default.clone().unwrap_or(Value::Null),
            };
            cells.push(format!(
                "{}::{}",
                encode_column(&value, &field.field_type)?,
                field.field_type.sql_type()
            ));
        }
        encoded.push(cells);
    }

    Ok(Plan {
        key,
        columns,
        rows: encoded,
    })
}

/// `a.k1 = b.k1 AND a.k2 = b.k2`
fn key_match(left: &str, right: &str, key: &[String]) -> String {
    key.iter()
        .map(|k| format!("{} = {}", qualified(left, k), qualified(right, k)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn prefixed(prefix: &str, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| qualified(prefix, c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quoted(columns: &[String]) -> String {
    columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

impl QueryBuilder {
    fn plan_rows(&mut self, rows: &[Record], options: &BulkOptions) -> Option<Plan> {
        let planned = plan(self.model(), rows, options);
        self.check(planned)
    }

    fn push_values_cte(&mut self, plan: &Plan) {
        self.push_cte(VALUES_CTE, plan.columns.clone(), CteBody::Sql(plan.values_sql()));
    }

    /// Insert rows whose key is not yet present.
    ///
    /// ```sql
    /// WITH __v (k, c) AS (VALUES ...),
    ///      __present AS (SELECT __v.k FROM __v INNER JOIN t ON t.k = __v.k)
    /// INSERT INTO t (k, c) SELECT __v.k, __v.c FROM __v
    ///   LEFT JOIN __present ON __present.k = __v.k WHERE __present.k IS NULL
    /// ```
    pub fn merge(mut self, rows: Vec<Record>, options: BulkOptions) -> Self {
        let Some(plan) = self.plan_rows(&rows, &options) else {
            return self;
        };
        let table = self.model().table().to_string();
        self.push_values_cte(&plan);
        let present = format!(
            "SELECT {} FROM {VALUES_CTE} INNER JOIN {} ON {}",
            prefixed(VALUES_CTE, &plan.key),
            quote(&table),
            key_match(&table, VALUES_CTE, &plan.key),
        );
        self.push_cte(PRESENT_CTE, Vec::new(), CteBody::Sql(present));
        let select = format!(
            "SELECT {} FROM {VALUES_CTE} LEFT JOIN {PRESENT_CTE} ON {} WHERE {} IS NULL",
            prefixed(VALUES_CTE, &plan.columns),
            key_match(PRESENT_CTE, VALUES_CTE, &plan.key),
            qualified(PRESENT_CTE, &plan.key[0]),
        );
        self.set_mutation(Mutation::Insert(Insert {
            columns: plan.columns,
            source: InsertSource::Sql(select),
            on_conflict: None,
        }));
        self
    }

    /// `INSERT ... VALUES ... ON CONFLICT (key) DO UPDATE SET c = EXCLUDED.c`.
    ///
    /// When every column is part of the key, conflicts are ignored (`DO NOTHING`).
    pub fn upsert(mut self, rows: Vec<Record>, options: BulkOptions) -> Self {
        let Some(plan) = self.plan_rows(&rows, &options) else {
            return self;
        };
        let on_conflict = plan.on_conflict();
        self.set_mutation(Mutation::Insert(Insert {
            columns: plan.columns,
            source: InsertSource::Values(plan.rows),
            on_conflict: Some(on_conflict),
        }));
        self
    }

    /// Upsert the rows produced by a statement.
    ///
    /// Columns come from `options.columns`, else from the statement's projection.
    pub fn upsert_from(mut self, statement: impl Statement + 'static, options: BulkOptions) -> Self {
        let table = self.model().table().to_string();
        let Some(columns) = options.columns.clone().or_else(|| statement.output_names()) else {
            self.fail(BuildError::NoColumns(table));
            return self;
        };
        if columns.is_empty() {
            self.fail(BuildError::NoColumns(table));
            return self;
        }
        let checked = check_fields(self.model(), &columns)
            .and_then(|()| infer_key(self.model(), &columns, options.key.as_ref()));
        let Some(key) = self.check(checked) else {
            return self;
        };
        if let Some(k) = key.iter().find(|k| !columns.contains(k)) {
            self.fail(BuildError::invalid(format!(
                "key column '{k}' is not produced by the source statement"
            )));
            return self;
        }
        let plan = Plan {
            key,
            columns,
            rows: Vec::new(),
        };
        let on_conflict = plan.on_conflict();
        self.set_mutation(Mutation::Insert(Insert {
            columns: plan.columns,
            source: InsertSource::Statement(Arc::new(statement)),
            on_conflict: Some(on_conflict),
        }));
        self
    }

    /// Make the table (within the current filter scope) contain exactly `rows`.
    ///
    /// Rows are upserted in a data-modifying CTE; live rows whose key is absent from
    /// `rows` are deleted. Running it twice with the same rows changes nothing.
    ///
    /// `WHERE TRUE` keeps the CTE's `ON CONFLICT` from being parsed as a join condition.
    pub fn align(mut self, rows: Vec<Record>, options: BulkOptions) -> Self {
        let Some(plan) = self.plan_rows(&rows, &options) else {
            return self;
        };
        let table = self.model().table().to_string();
        self.push_values_cte(&plan);
        let upserted = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {VALUES_CTE} WHERE TRUE{} RETURNING {}",
            quote(&table),
            quoted(&plan.columns),
            prefixed(VALUES_CTE, &plan.columns),
            render_on_conflict(&plan.on_conflict()),
            quoted(&plan.key),
        );
        self.push_cte(UPSERTED_CTE, Vec::new(), CteBody::Sql(upserted));
        let alias = self.root_alias().to_string();
        self.push_where(format!(
            "NOT EXISTS (SELECT 1 FROM {VALUES_CTE} WHERE {})",
            key_match(VALUES_CTE, &alias, &plan.key)
        ));
        self.set_mutation(Mutation::Delete);
        self
    }

    /// Update existing rows from `rows`, matched on the key.
    ///
    /// Each non-key column is assigned from the values list (`SET c = __v.c`).
    pub fn updates(mut self, rows: Vec<Record>, options: BulkOptions) -> Self {
        let Some(plan) = self.plan_rows(&rows, &options) else {
            return self;
        };
        let assignments: Vec<(String, String)> = plan
            .non_key_columns()
            .into_iter()
            .map(|c| {
                let value = qualified(VALUES_CTE, &c);
                (c, value)
            })
            .collect();
        if assignments.is_empty() {
            let table = self.model().table().to_string();
            self.fail(BuildError::NoColumns(table));
            return self;
        }
        self.push_values_cte(&plan);
        self.push_from_item(VALUES_CTE.to_string());
        let alias = self.root_alias().to_string();
        self.push_where(key_match(&alias, VALUES_CTE, &plan.key));
        self.set_mutation(Mutation::Update(assignments));
        self
    }

    /// Select the rows whose keys appear in `rows`, projecting `options.columns` if set.
    pub fn gets(mut self, rows: Vec<Record>, options: BulkOptions) -> Self {
        let model = self.model.clone();
        let key = {
            let present: Vec<String> = model
                .fields()
                .iter()
                .filter(|f| rows.iter().any(|r| r.contains(&f.name)))
                .map(|f| f.name.clone())
                .collect();
            infer_key(&model, &present, options.key.as_ref())
        };
        let Some(key) = self.check(key) else {
            return self;
        };
        let key_options = BulkOptions {
            key: Some(key.clone()),
            columns: Some(key),
        };
        let Some(plan) = self.plan_rows(&rows, &key_options) else {
            return self;
        };
        self.push_cte(KEYS_CTE, plan.columns.clone(), CteBody::Sql(plan.values_sql()));
        let alias = self.root_alias().to_string();
        self.push_join(Join {
            kind: JoinKind::Inner,
            table: KEYS_CTE.to_string(),
            alias: None,
            on: Some(key_match(KEYS_CTE, &alias, &plan.key)),
        });
        if let Some(columns) = &options.columns {
            let keys: Vec<&str> = columns.iter().map(String::as_str).collect();
            self = self.select(&keys);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::test_support::library;

    #[test]
    fn key_prefers_unique_together() {
        let schema = library();
        let book = schema.model("book").unwrap();
        let rows = vec![record! { "author" => 1, "title" => "A", "isbn" => "x" }];
        let plan = plan(book, &rows, &BulkOptions::new()).unwrap();
        assert_eq!(plan.key, vec!["author", "title"]);
    }

    #[test]
    fn key_falls_back_to_unique_field() {
        let schema = library();
        let book = schema.model("book").unwrap();
        let rows = vec![record! { "isbn" => "x", "pages" => 3 }];
        let plan = plan(book, &rows, &BulkOptions::new()).unwrap();
        assert_eq!(plan.key, vec!["isbn"]);
    }

    #[test]
    fn no_key_is_an_error() {
        let schema = library();
        let book = schema.model("book").unwrap();
        let rows = vec![record! { "pages" => 3 }];
        assert_eq!(
            plan(book, &rows, &BulkOptions::new()).unwrap_err(),
            BuildError::NoKey("book".into())
        );
    }

    #[test]
    fn missing_cells_use_defaults_then_null() {
        let schema = library();
        let book = schema.model("book").unwrap();
        let rows = vec![
            record! { "isbn" => "a", "pages" => 10 },
            record! { "isbn" => "b", "published" => chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap() },
        ];
        let plan = plan(book, &rows, &BulkOptions::new()).unwrap();
        assert_eq!(plan.columns, vec!["published", "pages", "isbn"]);
        assert_eq!(
            plan.rows,
            vec![
                vec!["NULL::date", "10::integer", "'a'::text"],
                vec!["'2020-01-02'::date", "0::integer", "'b'::text"],
            ]
        );
    }

    #[test]
    fn explicit_key_is_added_to_columns() {
        let schema = library();
        let author = schema.model("author").unwrap();
        let rows = vec![record! { "name" => "a", "age" => 3 }];
        let options = BulkOptions::new().key(&["name"]).columns(&["age"]);
        let plan = plan(author, &rows, &options).unwrap();
        assert_eq!(plan.columns, vec!["age", "name"]);
    }

    #[test]
    fn generator_defaults_are_called_per_row() {
        use crate::model::{FieldDescriptor, FieldType, ModelDescriptor, Schema};
        use std::sync::atomic::{AtomicI64, Ordering};

        static NEXT: AtomicI64 = AtomicI64::new(1);
        let schema = Schema::builder()
            .model(
                ModelDescriptor::new("event")
                    .field(FieldDescriptor::new("code", FieldType::Text).unique())
                    .field(
                        FieldDescriptor::new("seq", FieldType::BigInt)
                            .default_with(|| Value::Int(NEXT.fetch_add(1, Ordering::SeqCst))),
                    ),
            )
            .build()
            .unwrap();
        let event = schema.model("event").unwrap();
        let rows = vec![record! { "code" => "a" }, record! { "code" => "b" }];
        let options = BulkOptions::new().columns(&["code", "seq"]);
        let plan = plan(event, &rows, &options).unwrap();
        assert_ne!(plan.rows[0][1], plan.rows[1][1]);
    }

    #[test]
    fn array_cells_use_array_constructor() {
        use crate::model::{FieldDescriptor, FieldType, ModelDescriptor, Schema};

        let schema = Schema::builder()
            .model(
                ModelDescriptor::new("post")
                    .field(FieldDescriptor::new("slug", FieldType::Text).unique())
                    .field(FieldDescriptor::new(
                        "tags",
                        FieldType::Array(Box::new(FieldType::Text)),
                    )),
            )
            .build()
            .unwrap();
        let post = schema.model("post").unwrap();
        let rows = vec![
            record! { "slug" => "a", "tags" => vec!["x", "it's"] },
            record! { "slug" => "b", "tags" => Vec::<&str>::new() },
        ];
        let plan = plan(post, &rows, &BulkOptions::new()).unwrap();
        assert_eq!(plan.rows[0][1], "ARRAY['x', 'it''s']::text[]");
        assert_eq!(plan.rows[1][1], "'{}'::text[]");

        let q = QueryBuilder::new(schema.clone(), "post").upsert(rows, BulkOptions::new());
        assert!(q.statement().unwrap().contains("('a'::text, ARRAY['x', 'it''s']::text[])"));
    }
}
