//! The query builder facade.
//!
//! A [`QueryBuilder`] accumulates clause fragments for one statement through a consuming
//! call chain. Lookup keys are resolved (and joins registered) as each method is called;
//! the first error is remembered and reported when the statement is rendered, so chains
//! never need `?` between steps.
//!
//! # Example
//! ```ignore
//! use relq::{lookup, QueryBuilder};
//!
//! let q = QueryBuilder::new(schema.clone(), "book")
//!     .filter(lookup! { "author__name__icontains" => "le guin", "pages__gte" => 200 })
//!     .order_by(&["-published"])
//!     .limit(10);
//! let rows = q.fetch_all(&client).await?;
//! ```

mod assemble;
mod bulk;
mod set_op;

pub use bulk::BulkOptions;
pub use set_op::{SetOp, SetQuery};

use crate::aggregate::Aggregate;
use crate::condition::Condition;
use crate::encode::{encode_column, encode_literal};
use crate::error::{BuildError, BuildResult, OrmError, OrmResult};
use crate::executor::{ExecOptions, Executor};
use crate::ident::validate_name;
use crate::join::{Join, JoinKind, JoinRegistry};
use crate::model::{Model, Schema};
use crate::resolve::Resolver;
use crate::row::{Output, ResultSet};
use crate::value::{Record, Value};
use std::fmt;
use std::sync::Arc;

/// Anything that renders to a single SQL statement.
///
/// Rendering is pure: calling [`Statement::statement`] twice yields identical text.
pub trait Statement: Send + Sync {
    fn statement(&self) -> BuildResult<String>;

    /// Output column names, when they are known without executing.
    fn output_names(&self) -> Option<Vec<String>> {
        None
    }
}

impl<S: Statement + ?Sized> Statement for Arc<S> {
    fn statement(&self) -> BuildResult<String> {
        (**self).statement()
    }

    fn output_names(&self) -> Option<Vec<String>> {
        (**self).output_names()
    }
}

/// Trusted SQL text used as a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    sql: String,
    columns: Option<Vec<String>>,
}

impl RawStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            columns: None,
        }
    }

    /// Declare the output column names.
    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}

impl Statement for RawStatement {
    fn statement(&self) -> BuildResult<String> {
        Ok(self.sql.clone())
    }

    fn output_names(&self) -> Option<Vec<String>> {
        self.columns.clone()
    }
}

/// A rendered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    pub statements: Vec<String>,
    /// Index of the statement whose result the caller receives.
    pub primary: usize,
}

impl Compiled {
    /// The batch as one string, statements joined with `; `.
    pub fn sql(&self) -> String {
        self.statements.join("; ")
    }
}

/// Statement verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        })
    }
}

#[derive(Clone)]
pub(crate) enum CteBody {
    Statement(Arc<dyn Statement>),
    Sql(String),
}

#[derive(Clone)]
pub(crate) struct Cte {
    pub(crate) name: String,
    pub(crate) columns: Vec<String>,
    pub(crate) body: CteBody,
}

/// `ON CONFLICT` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    Nothing,
    /// Columns overwritten from `EXCLUDED`.
    Update(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OnConflict {
    pub(crate) target: Vec<String>,
    pub(crate) action: ConflictAction,
}

#[derive(Clone)]
pub(crate) enum InsertSource {
    Default,
    Values(Vec<Vec<String>>),
    Statement(Arc<dyn Statement>),
    Sql(String),
}

#[derive(Clone)]
pub(crate) struct Insert {
    pub(crate) columns: Vec<String>,
    pub(crate) source: InsertSource,
    pub(crate) on_conflict: Option<OnConflict>,
}

#[derive(Clone)]
pub(crate) enum Mutation {
    Insert(Insert),
    /// `column = expression` assignments.
    Update(Vec<(String, String)>),
    Delete,
}

impl Mutation {
    fn kind(&self) -> StatementKind {
        match self {
            Self::Insert(_) => StatementKind::Insert,
            Self::Update(_) => StatementKind::Update,
            Self::Delete => StatementKind::Delete,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SelectItem {
    pub(crate) expr: String,
    pub(crate) name: String,
    pub(crate) aliased: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    raw: bool,
    compact: bool,
    skip_validation: bool,
    auto_commit: bool,
}

/// Builder for one statement (plus optional batched neighbours).
#[derive(Clone)]
#[must_use]
pub struct QueryBuilder {
    schema: Arc<Schema>,
    model: Arc<Model>,
    alias: String,
    select: Vec<SelectItem>,
    distinct: bool,
    distinct_on: Vec<String>,
    from_items: Vec<String>,
    joins: JoinRegistry,
    where_clause: Option<String>,
    group_by: Vec<String>,
    having: Option<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    with: Vec<Cte>,
    recursive: bool,
    returning: Vec<String>,
    mutation: Option<Mutation>,
    annotations: Vec<(String, String)>,
    flags: Flags,
    prepend: Vec<Arc<dyn Statement>>,
    append: Vec<Arc<dyn Statement>>,
    build_error: Option<BuildError>,
}

impl QueryBuilder {
    /// Start a builder on `table`. An unknown table is reported when the statement is built.
    pub fn new(schema: Arc<Schema>, table: &str) -> Self {
        let (model, build_error) = match schema.model(table) {
            Ok(model) => (model.clone(), None),
            Err(e) => (Arc::new(Model::placeholder(table)), Some(e)),
        };
        Self {
            schema,
            model,
            alias: table.to_string(),
            select: Vec::new(),
            distinct: false,
            distinct_on: Vec::new(),
            from_items: Vec::new(),
            joins: JoinRegistry::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            with: Vec::new(),
            recursive: false,
            returning: Vec::new(),
            mutation: None,
            annotations: Vec::new(),
            flags: Flags::default(),
            prepend: Vec::new(),
            append: Vec::new(),
            build_error,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn table(&self) -> &str {
        self.model.table()
    }

    pub fn root_alias(&self) -> &str {
        &self.alias
    }

    /// The first construction error, if any.
    pub fn build_error(&self) -> Option<&BuildError> {
        self.build_error.as_ref()
    }

    pub fn kind(&self) -> StatementKind {
        self.mutation
            .as_ref()
            .map_or(StatementKind::Select, Mutation::kind)
    }

    // ==================== internals ====================

    fn fail(&mut self, err: BuildError) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    fn resolver(&mut self) -> Resolver<'_> {
        Resolver::new(
            &self.schema,
            &self.model,
            &self.alias,
            &mut self.joins,
            &self.annotations,
        )
    }

    /// Keep the value, or record the error and return `None`.
    fn check<T>(&mut self, result: BuildResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn render_condition(&mut self, cond: &Condition) -> Option<String> {
        let rendered = {
            let mut resolver = self.resolver();
            cond.render(&mut resolver)
        };
        self.check(rendered)
    }

    fn resolve_column(&mut self, key: &str) -> Option<String> {
        let resolved = self.resolver().resolve_column(key);
        self.check(resolved)
    }

    pub(crate) fn push_where(&mut self, sql: String) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(old) => format!("({old}) AND ({sql})"),
            None => sql,
        });
    }

    fn push_having(&mut self, sql: String) {
        self.having = Some(match self.having.take() {
            Some(old) => format!("({old}) AND ({sql})"),
            None => sql,
        });
    }

    /// Check that `name` is a field of the root model.
    fn field_name(&mut self, name: &str) -> Option<String> {
        if self.model.field(name).is_some() {
            Some(name.to_string())
        } else {
            let table = self.model.table().to_string();
            self.fail(BuildError::invalid_field(name, table));
            None
        }
    }

    pub(crate) fn push_cte(&mut self, name: &str, columns: Vec<String>, body: CteBody) {
        if self.with.iter().any(|c| c.name == name) {
            self.fail(BuildError::invalid(format!("CTE '{name}' defined twice")));
            return;
        }
        self.with.push(Cte {
            name: name.to_string(),
            columns,
            body,
        });
    }

    pub(crate) fn set_mutation(&mut self, mutation: Mutation) {
        match (self.mutation.as_mut(), mutation) {
            (None, m) => self.mutation = Some(m),
            (Some(Mutation::Update(existing)), Mutation::Update(more)) => existing.extend(more),
            (Some(Mutation::Delete), Mutation::Delete) => {}
            (Some(Mutation::Insert(_)), m @ Mutation::Insert(_)) => self.mutation = Some(m),
            (Some(current), m) => {
                let err = BuildError::invalid(format!(
                    "cannot turn a {} statement into {}",
                    current.kind(),
                    m.kind()
                ));
                self.fail(err);
            }
        }
    }

    pub(crate) fn push_join(&mut self, join: Join) {
        self.joins.push(join);
    }

    pub(crate) fn push_from_item(&mut self, item: String) {
        self.from_items.push(item);
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            raw: self.flags.raw,
            skip_validation: self.flags.skip_validation,
            auto_commit: self.flags.auto_commit,
        }
    }

    // ==================== FROM / aliasing ====================

    /// Alias the root table. Must be called before any lookup is resolved.
    pub fn alias(mut self, alias: &str) -> Self {
        if let Err(e) = validate_name("alias", alias) {
            self.fail(BuildError::Invalid(e));
            return self;
        }
        if !self.joins.is_empty() || self.where_clause.is_some() || !self.select.is_empty() {
            self.fail(BuildError::invalid(
                "alias must be set before filters, joins or projections",
            ));
            return self;
        }
        self.alias = alias.to_string();
        self
    }

    /// Extra FROM item (USING item for DELETE). Trusted SQL.
    pub fn from_raw(mut self, item: &str) -> Self {
        self.from_items.push(item.to_string());
        self
    }

    /// Explicit join with a trusted ON condition.
    pub fn join(mut self, kind: JoinKind, table: &str, alias: Option<&str>, on: &str) -> Self {
        for name in std::iter::once(table).chain(alias) {
            if let Err(e) = validate_name("join", name) {
                self.fail(BuildError::Invalid(e));
                return self;
            }
        }
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            on: (kind != JoinKind::Cross).then(|| on.to_string()),
        });
        self
    }

    /// Join along a relation path (`author`, `book__author`) with the given kind.
    ///
    /// Lookups through the same path reuse the join.
    pub fn join_relation(mut self, path: &str, kind: JoinKind) -> Self {
        let result = self.resolver().resolve_relation(path, kind);
        self.check(result);
        self
    }

    // ==================== projection ====================

    /// Replace the projection with the given lookup keys.
    pub fn select(mut self, keys: &[&str]) -> Self {
        self.select.clear();
        for key in keys {
            self = self.select_as(key, None);
        }
        self
    }

    /// Add one projected key, optionally renamed.
    pub fn select_as(mut self, key: &str, name: Option<&str>) -> Self {
        let Some(expr) = self.resolve_column(key) else {
            return self;
        };
        let item = match name {
            Some(name) => SelectItem {
                expr,
                name: name.to_string(),
                aliased: true,
            },
            None => SelectItem {
                expr,
                name: key.to_string(),
                aliased: self.model.field(key).is_none(),
            },
        };
        self.select.push(item);
        self
    }

    /// Add a trusted SQL expression to the projection.
    pub fn select_raw(mut self, expr: &str, name: &str) -> Self {
        self.select.push(SelectItem {
            expr: expr.to_string(),
            name: name.to_string(),
            aliased: true,
        });
        self
    }

    /// Add an aggregate (or raw expression) under `name`.
    ///
    /// Annotations are projected as `expr AS name` and can be used in lookups
    /// (`having(lookup! { "n__gt" => 2 })`).
    pub fn annotate(mut self, name: &str, aggregate: Aggregate) -> Self {
        if let Err(e) = validate_name("annotation", name) {
            self.fail(BuildError::Invalid(e));
            return self;
        }
        if self.model.field(name).is_some() || self.annotations.iter().any(|(n, _)| n == name) {
            self.fail(BuildError::invalid(format!(
                "annotation '{name}' clashes with an existing name"
            )));
            return self;
        }
        let rendered = {
            let mut resolver = self.resolver();
            aggregate.render(&mut resolver)
        };
        if let Some(expr) = self.check(rendered) {
            self.annotations.push((name.to_string(), expr));
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn distinct_on(mut self, keys: &[&str]) -> Self {
        for key in keys {
            if let Some(expr) = self.resolve_column(key) {
                self.distinct_on.push(expr);
            }
        }
        self
    }

    // ==================== filtering ====================

    /// AND a condition into WHERE.
    pub fn filter(mut self, cond: Condition) -> Self {
        if let Some(sql) = self.render_condition(&cond) {
            self.push_where(sql);
        }
        self
    }

    /// AND the negation of a condition into WHERE.
    pub fn exclude(self, cond: Condition) -> Self {
        self.filter(!cond)
    }

    /// AND a condition into HAVING.
    pub fn having(mut self, cond: Condition) -> Self {
        if let Some(sql) = self.render_condition(&cond) {
            self.push_having(sql);
        }
        self
    }

    pub fn group_by(mut self, keys: &[&str]) -> Self {
        for key in keys {
            if let Some(expr) = self.resolve_column(key) {
                self.group_by.push(expr);
            }
        }
        self
    }

    /// Order by lookup keys; a leading `-` sorts descending.
    pub fn order_by(mut self, keys: &[&str]) -> Self {
        for key in keys {
            let (key, dir) = match key.strip_prefix('-') {
                Some(k) => (k, " DESC"),
                None => (*key, ""),
            };
            if let Some(expr) = self.resolve_column(key) {
                self.order_by.push(format!("{expr}{dir}"));
            }
        }
        self
    }

    /// Order by a trusted SQL expression.
    pub fn order_by_raw(mut self, expr: &str) -> Self {
        self.order_by.push(expr.to_string());
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Page-based pagination (1-based pages).
    pub fn paginate(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        let size = per_page.max(1);
        self.limit = Some(size);
        self.offset = Some((page - 1).saturating_mul(size));
        self
    }

    // ==================== CTEs ====================

    /// `WITH name AS (statement)`
    pub fn with(self, name: &str, statement: impl Statement + 'static) -> Self {
        self.with_columns(name, &[], statement)
    }

    /// `WITH name (columns) AS (statement)`
    pub fn with_columns(
        mut self,
        name: &str,
        columns: &[&str],
        statement: impl Statement + 'static,
    ) -> Self {
        if let Err(e) = validate_name("CTE", name) {
            self.fail(BuildError::Invalid(e));
            return self;
        }
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.push_cte(name, columns, CteBody::Statement(Arc::new(statement)));
        self
    }

    /// `WITH RECURSIVE name (columns) AS (statement)`
    pub fn with_recursive(
        mut self,
        name: &str,
        columns: &[&str],
        statement: impl Statement + 'static,
    ) -> Self {
        self.recursive = true;
        self.with_columns(name, columns, statement)
    }

    // ==================== mutations ====================

    /// INSERT rows. Missing cells render as `DEFAULT`.
    pub fn insert(mut self, rows: Vec<Record>) -> Self {
        if rows.is_empty() {
            self.fail(BuildError::EmptyList("insert rows".into()));
            return self;
        }
        let model = self.model.clone();
        for row in &rows {
            if let Some(bad) = row.keys().find(|k| model.field(k).is_none()) {
                self.fail(BuildError::invalid_field(bad, model.table()));
                return self;
            }
        }
        let columns: Vec<String> = model
            .fields()
            .iter()
            .filter(|f| rows.iter().any(|r| r.contains(&f.name)))
            .map(|f| f.name.clone())
            .collect();

        let source = if columns.is_empty() {
            if rows.len() > 1 {
                self.fail(BuildError::NoColumns(model.table().to_string()));
                return self;
            }
            InsertSource::Default
        } else {
            let mut values = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut cells = Vec::with_capacity(columns.len());
                for column in &columns {
                    let cell = match (row.get(column), model.field(column)) {
                        (Some(v), Some(field)) => encode_column(v, &field.field_type),
                        (Some(v), None) => encode_literal(v),
                        (None, _) => Ok("DEFAULT".to_string()),
                    };
                    match self.check(cell) {
                        Some(c) => cells.push(c),
                        None => return self,
                    }
                }
                values.push(cells);
            }
            InsertSource::Values(values)
        };
        self.set_mutation(Mutation::Insert(Insert {
            columns,
            source,
            on_conflict: None,
        }));
        self
    }

    /// INSERT one row.
    pub fn insert_one(self, row: Record) -> Self {
        self.insert(vec![row])
    }

    /// `INSERT INTO t DEFAULT VALUES`
    pub fn insert_default(mut self) -> Self {
        self.set_mutation(Mutation::Insert(Insert {
            columns: Vec::new(),
            source: InsertSource::Default,
            on_conflict: None,
        }));
        self
    }

    /// `INSERT INTO t (columns) <statement>`.
    ///
    /// With no columns, the statement's output names are used.
    pub fn insert_from(mut self, statement: impl Statement + 'static, columns: &[&str]) -> Self {
        let names: Vec<String> = if columns.is_empty() {
            match statement.output_names() {
                Some(names) => names,
                None => {
                    self.fail(BuildError::NoColumns(self.model.table().to_string()));
                    return self;
                }
            }
        } else {
            columns.iter().map(|c| c.to_string()).collect()
        };
        let mut checked = Vec::with_capacity(names.len());
        for name in &names {
            match self.field_name(name) {
                Some(n) => checked.push(n),
                None => return self,
            }
        }
        self.set_mutation(Mutation::Insert(Insert {
            columns: checked,
            source: InsertSource::Statement(Arc::new(statement)),
            on_conflict: None,
        }));
        self
    }

    fn set_on_conflict(&mut self, target: &[&str], action: ConflictAction) {
        let mut checked = Vec::with_capacity(target.len());
        for t in target {
            match self.field_name(t) {
                Some(n) => checked.push(n),
                None => return,
            }
        }
        match self.mutation.as_mut() {
            Some(Mutation::Insert(insert)) => {
                insert.on_conflict = Some(OnConflict {
                    target: checked,
                    action,
                });
            }
            _ => self.fail(BuildError::invalid("ON CONFLICT requires an INSERT")),
        }
    }

    /// `ON CONFLICT (target) DO NOTHING`; an empty target means any conflict.
    pub fn on_conflict_do_nothing(mut self, target: &[&str]) -> Self {
        self.set_on_conflict(target, ConflictAction::Nothing);
        self
    }

    /// `ON CONFLICT (target) DO UPDATE SET c = EXCLUDED.c`.
    ///
    /// With no columns, every inserted non-target column is updated.
    pub fn on_conflict_do_update(mut self, target: &[&str], columns: &[&str]) -> Self {
        if target.is_empty() {
            self.fail(BuildError::invalid("ON CONFLICT DO UPDATE requires a target"));
            return self;
        }
        let columns: Vec<String> = if columns.is_empty() {
            match &self.mutation {
                Some(Mutation::Insert(insert)) => insert
                    .columns
                    .iter()
                    .filter(|c| !target.contains(&c.as_str()))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            }
        } else {
            let mut checked = Vec::with_capacity(columns.len());
            for c in columns {
                match self.field_name(c) {
                    Some(n) => checked.push(n),
                    None => return self,
                }
            }
            checked
        };
        let action = if columns.is_empty() {
            ConflictAction::Nothing
        } else {
            ConflictAction::Update(columns)
        };
        self.set_on_conflict(target, action);
        self
    }

    /// UPDATE every column in `values`.
    pub fn update(mut self, values: Record) -> Self {
        if values.is_empty() {
            self.fail(BuildError::NoColumns(self.model.table().to_string()));
            return self;
        }
        for (column, value) in values.iter() {
            self = self.set(column, value.clone());
        }
        self
    }

    /// `SET column = value`
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let Some(column) = self.field_name(column) else {
            return self;
        };
        let value = value.into();
        let literal = match self.model.field(&column) {
            Some(field) => encode_column(&value, &field.field_type),
            None => encode_literal(&value),
        };
        if let Some(literal) = self.check(literal) {
            self.set_mutation(Mutation::Update(vec![(column, literal)]));
        }
        self
    }

    /// `SET column = <trusted expression>`
    pub fn set_raw(mut self, column: &str, expr: &str) -> Self {
        if let Some(column) = self.field_name(column) {
            self.set_mutation(Mutation::Update(vec![(column, expr.to_string())]));
        }
        self
    }

    pub fn delete(mut self) -> Self {
        self.set_mutation(Mutation::Delete);
        self
    }

    /// `RETURNING` root fields.
    pub fn returning(mut self, columns: &[&str]) -> Self {
        for c in columns {
            if let Some(name) = self.field_name(c) {
                self.returning.push(name);
            }
        }
        self
    }

    /// `RETURNING *`
    pub fn returning_all(mut self) -> Self {
        self.returning = vec!["*".to_string()];
        self
    }

    // ==================== batching & flags ====================

    /// Run `statement` before this one in the same batch.
    pub fn prepend(mut self, statement: impl Statement + 'static) -> Self {
        self.prepend.push(Arc::new(statement));
        self
    }

    /// Run `statement` after this one in the same batch.
    pub fn append(mut self, statement: impl Statement + 'static) -> Self {
        self.append.push(Arc::new(statement));
        self
    }

    /// Return the untouched [`ResultSet`] from [`QueryBuilder::fetch`].
    pub fn raw(mut self) -> Self {
        self.flags.raw = true;
        self
    }

    /// Return only the first column from [`QueryBuilder::fetch`].
    pub fn compact(mut self) -> Self {
        self.flags.compact = true;
        self
    }

    pub fn skip_validation(mut self) -> Self {
        self.flags.skip_validation = true;
        self
    }

    pub fn auto_commit(mut self) -> Self {
        self.flags.auto_commit = true;
        self
    }

    // ==================== rendering ====================

    /// Render the batch: prepended statements, this statement, appended statements.
    pub fn compile(&self) -> BuildResult<Compiled> {
        let mut statements = Vec::with_capacity(self.prepend.len() + 1 + self.append.len());
        for s in &self.prepend {
            statements.push(s.statement()?);
        }
        let primary = statements.len();
        statements.push(self.statement()?);
        for s in &self.append {
            statements.push(s.statement()?);
        }
        Ok(Compiled {
            statements,
            primary,
        })
    }

    // ==================== execution ====================

    async fn run(&self, executor: &impl Executor) -> OrmResult<ResultSet> {
        let compiled = self.compile()?;
        run_compiled(executor, &compiled, self.exec_options()).await
    }

    /// Execute and shape the primary result according to `raw()` / `compact()`.
    pub async fn fetch(&self, executor: &impl Executor) -> OrmResult<Output> {
        let result = self.run(executor).await?;
        Ok(Output::shape(result, self.flags.raw, self.flags.compact))
    }

    /// Execute and return every row as a [`Record`].
    pub async fn fetch_all(&self, executor: &impl Executor) -> OrmResult<Vec<Record>> {
        Ok(self.run(executor).await?.records())
    }

    /// Execute and return the first row.
    ///
    /// Returns [`OrmError::NotFound`] when no rows come back.
    pub async fn fetch_one(&self, executor: &impl Executor) -> OrmResult<Record> {
        self.fetch_optional(executor).await?.ok_or_else(|| {
            OrmError::not_found(format!("no row returned from '{}'", self.model.table()))
        })
    }

    /// Execute and return the first row, if any.
    pub async fn fetch_optional(&self, executor: &impl Executor) -> OrmResult<Option<Record>> {
        Ok(self.run(executor).await?.records().into_iter().next())
    }

    /// Execute and return the affected row count.
    pub async fn execute(&self, executor: &impl Executor) -> OrmResult<u64> {
        Ok(self.run(executor).await?.affected)
    }

    /// `SELECT COUNT(*)` over this statement.
    pub async fn count(&self, executor: &impl Executor) -> OrmResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM ({}) AS __count", self.statement()?);
        let compiled = Compiled {
            statements: vec![sql],
            primary: 0,
        };
        let result = run_compiled(executor, &compiled, self.exec_options()).await?;
        let cell = result.first_column().into_iter().next().flatten();
        cell.as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| OrmError::Other("COUNT(*) returned no value".into()))
    }
}

/// Execute a compiled batch and return the primary statement's result.
pub(crate) async fn run_compiled(
    executor: &impl Executor,
    compiled: &Compiled,
    options: ExecOptions,
) -> OrmResult<ResultSet> {
    let sets = executor.execute(&compiled.sql(), options).await?;
    let count = sets.len();
    sets.into_iter().nth(compiled.primary).ok_or_else(|| {
        OrmError::Other(format!(
            "expected a result for statement {} but the batch returned {count}",
            compiled.primary
        ))
    })
}

impl Statement for QueryBuilder {
    fn statement(&self) -> BuildResult<String> {
        if let Some(err) = &self.build_error {
            return Err(err.clone());
        }
        self.assemble()
    }

    fn output_names(&self) -> Option<Vec<String>> {
        match &self.mutation {
            None if !self.select.is_empty() => Some(
                self.select
                    .iter()
                    .map(|s| s.name.clone())
                    .chain(self.annotations.iter().map(|(n, _)| n.clone()))
                    .collect(),
            ),
            Some(_) if !self.returning.is_empty() && self.returning[0] != "*" => {
                Some(self.returning.clone())
            }
            _ => None,
        }
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("table", &self.model.table())
            .field("kind", &self.kind())
            .field("sql", &self.statement())
            .finish()
    }
}

impl From<QueryBuilder> for Value {
    fn from(q: QueryBuilder) -> Self {
        Value::query(q)
    }
}
