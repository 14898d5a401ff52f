//! Statement assembly: builder state to SQL text.

use super::{ConflictAction, CteBody, Insert, InsertSource, Mutation, OnConflict, QueryBuilder};
use crate::error::{BuildError, BuildResult};
use crate::ident::quote;

fn quote_list(names: &[String]) -> String {
    names.iter().map(|n| quote(n)).collect::<Vec<_>>().join(", ")
}

/// `a` or `(a) AND (b) AND ...`
fn and_all(parts: &[String]) -> Option<String> {
    match parts {
        [] => None,
        [one] => Some(one.clone()),
        many => Some(
            many.iter()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join(" AND "),
        ),
    }
}

pub(crate) fn render_on_conflict(on_conflict: &OnConflict) -> String {
    let mut sql = String::from(" ON CONFLICT");
    if !on_conflict.target.is_empty() {
        sql.push_str(&format!(" ({})", quote_list(&on_conflict.target)));
    }
    match &on_conflict.action {
        ConflictAction::Nothing => sql.push_str(" DO NOTHING"),
        ConflictAction::Update(columns) => {
            let sets: Vec<String> = columns
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", quote(c), quote(c)))
                .collect();
            sql.push_str(" DO UPDATE SET ");
            sql.push_str(&sets.join(", "));
        }
    }
    sql
}

impl QueryBuilder {
    pub(crate) fn assemble(&self) -> BuildResult<String> {
        let mut sql = self.render_with()?;
        match &self.mutation {
            None => self.render_select(&mut sql),
            Some(Mutation::Insert(insert)) => self.render_insert(insert, &mut sql)?,
            Some(Mutation::Update(assignments)) => self.render_update(assignments, &mut sql)?,
            Some(Mutation::Delete) => self.render_delete(&mut sql)?,
        }
        Ok(sql)
    }

    fn render_with(&self) -> BuildResult<String> {
        if self.with.is_empty() {
            return Ok(String::new());
        }
        let mut items = Vec::with_capacity(self.with.len());
        for cte in &self.with {
            let body = match &cte.body {
                CteBody::Statement(s) => s.statement()?,
                CteBody::Sql(sql) => sql.clone(),
            };
            let columns = if cte.columns.is_empty() {
                String::new()
            } else {
                format!(" ({})", quote_list(&cte.columns))
            };
            items.push(format!("{}{columns} AS ({body})", quote(&cte.name)));
        }
        let keyword = if self.recursive {
            "WITH RECURSIVE "
        } else {
            "WITH "
        };
        Ok(format!("{keyword}{} ", items.join(", ")))
    }

    /// `table` or `table AS alias`
    fn target(&self) -> String {
        let table = self.model.table();
        if self.alias == table {
            quote(table)
        } else {
            format!("{} AS {}", quote(table), quote(&self.alias))
        }
    }

    fn render_returning(&self, sql: &mut String) {
        if self.returning.is_empty() {
            return;
        }
        sql.push_str(" RETURNING ");
        if self.returning.len() == 1 && self.returning[0] == "*" {
            sql.push('*');
        } else {
            sql.push_str(&quote_list(&self.returning));
        }
    }

    fn render_select(&self, sql: &mut String) {
        sql.push_str("SELECT ");
        if !self.distinct_on.is_empty() {
            sql.push_str(&format!("DISTINCT ON ({}) ", self.distinct_on.join(", ")));
        } else if self.distinct {
            sql.push_str("DISTINCT ");
        }

        let mut columns: Vec<String> = self
            .select
            .iter()
            .map(|item| {
                if item.aliased {
                    format!("{} AS {}", item.expr, quote(&item.name))
                } else {
                    item.expr.clone()
                }
            })
            .collect();
        if columns.is_empty() {
            columns.push(format!("{}.*", quote(&self.alias)));
        }
        for (name, expr) in &self.annotations {
            columns.push(format!("{expr} AS {}", quote(name)));
        }
        sql.push_str(&columns.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&self.target());
        for item in &self.from_items {
            sql.push_str(", ");
            sql.push_str(item);
        }
        for join in self.joins.iter() {
            sql.push_str(&join.render());
        }
        if let Some(w) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(w);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if let Some(h) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(h);
        }
        self.render_tail(sql);
    }

    fn render_tail(&self, sql: &mut String) {
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    /// ORDER BY / LIMIT / OFFSET / GROUP BY / HAVING / DISTINCT only apply to SELECT.
    fn reject_select_only(&self, verb: &str) -> BuildResult<()> {
        let misplaced = [
            (!self.group_by.is_empty(), "GROUP BY"),
            (self.having.is_some(), "HAVING"),
            (!self.order_by.is_empty(), "ORDER BY"),
            (self.limit.is_some(), "LIMIT"),
            (self.offset.is_some(), "OFFSET"),
            (self.distinct || !self.distinct_on.is_empty(), "DISTINCT"),
            (!self.annotations.is_empty(), "annotations"),
            (!self.select.is_empty(), "a projection"),
        ];
        match misplaced.iter().find(|(present, _)| *present) {
            Some((_, clause)) => Err(BuildError::invalid(format!("{verb} cannot have {clause}"))),
            None => Ok(()),
        }
    }

    fn render_insert(&self, insert: &Insert, sql: &mut String) -> BuildResult<()> {
        self.reject_select_only("INSERT")?;
        if self.where_clause.is_some() || !self.joins.is_empty() || !self.from_items.is_empty() {
            return Err(BuildError::invalid(
                "INSERT cannot have WHERE, joins or extra FROM items",
            ));
        }
        sql.push_str("INSERT INTO ");
        sql.push_str(&self.target());
        let columns = format!(" ({})", quote_list(&insert.columns));
        match &insert.source {
            InsertSource::Default => sql.push_str(" DEFAULT VALUES"),
            InsertSource::Values(rows) => {
                sql.push_str(&columns);
                sql.push_str(" VALUES ");
                let rows: Vec<String> = rows
                    .iter()
                    .map(|cells| format!("({})", cells.join(", ")))
                    .collect();
                sql.push_str(&rows.join(", "));
            }
            InsertSource::Statement(statement) => {
                sql.push_str(&columns);
                sql.push(' ');
                sql.push_str(&statement.statement()?);
            }
            InsertSource::Sql(body) => {
                sql.push_str(&columns);
                sql.push(' ');
                sql.push_str(body);
            }
        }
        if let Some(on_conflict) = &insert.on_conflict {
            sql.push_str(&render_on_conflict(on_conflict));
        }
        self.render_returning(sql);
        Ok(())
    }

    /// FROM/USING items and the WHERE for UPDATE/DELETE.
    ///
    /// Joins stay LEFT joins: the filter runs as a primary-key sub-select over the joined
    /// rows. Extra FROM items remain outer so SET and RETURNING can reference them. A model
    /// without a primary key folds join conditions into WHERE, giving inner semantics.
    fn mutation_sources(&self) -> (Vec<String>, Option<String>) {
        let mut items = self.from_items.clone();
        if let (false, Some(pk)) = (self.joins.is_empty(), self.model.primary_key()) {
            let key = format!("{}.{}", quote(&self.alias), quote(pk));
            let mut keys = format!("SELECT {key} FROM {}", self.target());
            for join in self.joins.iter() {
                keys.push_str(&join.render());
            }
            if let Some(w) = &self.where_clause {
                keys.push_str(" WHERE ");
                keys.push_str(w);
            }
            return (items, Some(format!("{key} IN ({keys})")));
        }

        let mut conditions = Vec::new();
        for join in self.joins.iter() {
            items.push(join.from_item());
            if let Some(on) = &join.on {
                conditions.push(on.clone());
            }
        }
        if let Some(w) = &self.where_clause {
            conditions.push(w.clone());
        }
        (items, and_all(&conditions))
    }

    fn render_update(&self, assignments: &[(String, String)], sql: &mut String) -> BuildResult<()> {
        self.reject_select_only("UPDATE")?;
        if assignments.is_empty() {
            return Err(BuildError::NoColumns(self.model.table().to_string()));
        }
        sql.push_str("UPDATE ");
        sql.push_str(&self.target());
        sql.push_str(" SET ");
        let sets: Vec<String> = assignments
            .iter()
            .map(|(c, v)| format!("{} = {v}", quote(c)))
            .collect();
        sql.push_str(&sets.join(", "));
        let (items, condition) = self.mutation_sources();
        if !items.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&items.join(", "));
        }
        if let Some(c) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(&c);
        }
        self.render_returning(sql);
        Ok(())
    }

    fn render_delete(&self, sql: &mut String) -> BuildResult<()> {
        self.reject_select_only("DELETE")?;
        sql.push_str("DELETE FROM ");
        sql.push_str(&self.target());
        let (items, condition) = self.mutation_sources();
        if !items.is_empty() {
            sql.push_str(" USING ");
            sql.push_str(&items.join(", "));
        }
        if let Some(c) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(&c);
        }
        self.render_returning(sql);
        Ok(())
    }
}
