//! Lookup path resolution.
//!
//! A lookup key such as `author__name__icontains` is split on `__` and walked left to
//! right against the schema. Foreign keys and reverse relations register LEFT joins in the
//! builder's [`JoinRegistry`]; the walk ends in a column reference plus an [`Operator`].

use crate::encode::quote_literal;
use crate::error::{BuildError, BuildResult};
use crate::ident::{DELIMITER, qualified, quote};
use crate::join::{Join, JoinKind, JoinRegistry, PathToken};
use crate::lookup::Operator;
use crate::model::{Model, Schema};

/// The result of resolving a lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Column reference (`__j1.name`, `(COUNT(...))`, `EXTRACT(YEAR FROM book.published)`).
    pub column: String,
    pub op: Operator,
    /// Encoded key segments below a JSON column (`'a'`, `0`), if the path entered one.
    pub json_keys: Option<Vec<String>>,
    /// Whether the key spelled out a comparison operator.
    pub explicit_op: bool,
}

impl Resolved {
    fn new(column: String, op: Operator) -> Self {
        Self {
            column,
            op,
            json_keys: None,
            explicit_op: false,
        }
    }

    fn with_op(column: String, op: Operator) -> Self {
        Self {
            explicit_op: true,
            ..Self::new(column, op)
        }
    }

    /// `col -> 'a' -> 'b'` (jsonb result).
    pub fn json_value(&self) -> String {
        let mut out = self.column.clone();
        for key in self.json_keys.iter().flatten() {
            out.push_str(" -> ");
            out.push_str(key);
        }
        out
    }

    /// `col -> 'a' ->> 'b'` (text result). Same as the column when no keys were given.
    pub fn json_text(&self) -> String {
        match self.json_keys.as_deref() {
            Some([parents @ .., last]) => {
                let mut out = self.column.clone();
                for key in parents {
                    out.push_str(" -> ");
                    out.push_str(key);
                }
                out.push_str(" ->> ");
                out.push_str(last);
                out
            }
            _ => self.column.clone(),
        }
    }

    /// The expression to project or sort by.
    pub fn expression(&self) -> String {
        match &self.json_keys {
            Some(keys) if !keys.is_empty() => format!("({})", self.json_text()),
            _ => self.column.clone(),
        }
    }
}

/// Array indexes stay numeric; everything else becomes a quoted key.
fn json_key(key: &str) -> BuildResult<String> {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        Ok(key.to_string())
    } else {
        quote_literal(key)
    }
}

/// Walks lookup keys for one builder.
pub struct Resolver<'a> {
    schema: &'a Schema,
    root: &'a Model,
    root_alias: &'a str,
    joins: &'a mut JoinRegistry,
    annotations: &'a [(String, String)],
}

impl<'a> Resolver<'a> {
    pub fn new(
        schema: &'a Schema,
        root: &'a Model,
        root_alias: &'a str,
        joins: &'a mut JoinRegistry,
        annotations: &'a [(String, String)],
    ) -> Self {
        Self {
            schema,
            root,
            root_alias,
            joins,
            annotations,
        }
    }

    /// Resolve a lookup key.
    pub fn resolve(&mut self, key: &str) -> BuildResult<Resolved> {
        let tokens: Vec<&str> = key.split(DELIMITER).collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(BuildError::invalid_field(key, self.root.table()));
        }

        let schema = self.schema;
        let mut model: &Model = self.root;
        let mut alias = self.root_alias.to_string();
        let mut path: Vec<PathToken> = Vec::new();
        let mut i = 0;

        loop {
            let token = tokens[i];
            let rest = &tokens[i + 1..];

            if let Some(field) = model.field(token) {
                let column = qualified(&alias, &field.name);
                let Some(next) = rest.first() else {
                    return Ok(Resolved::new(column, Operator::Eq));
                };

                if let Some(reference) = &field.reference {
                    let target: &Model = schema.model(&reference.model)?;
                    let target_column = field.target_column().unwrap_or_default();
                    if *next == target_column {
                        // `author__id` is the local FK value; no join needed.
                        return terminal(column, &rest[1..], model);
                    }
                    if !is_navigable(target, next) && Operator::parse(next).is_some() {
                        return terminal(column, rest, model);
                    }
                    path.push(PathToken::Forward(token.to_string()));
                    let left = alias.clone();
                    let fk = field.name.clone();
                    let table = target.table().to_string();
                    let tcol = target_column.to_string();
                    alias = self.joins.register(&path, |a| Join {
                        kind: JoinKind::Left,
                        table,
                        alias: None,
                        on: Some(format!("{} = {}", qualified(a, &tcol), qualified(&left, &fk))),
                    });
                    model = target;
                    i += 1;
                    continue;
                }

                if field.field_type.is_json() {
                    return json_path(column, rest);
                }
                return terminal(column, rest, model);
            }

            if i == 0 {
                if let Some((_, expr)) = self.annotations.iter().find(|(name, _)| name == token) {
                    return terminal(format!("({expr})"), rest, model);
                }
            }

            if let Some(relation) = model.reverse_relation(token) {
                let source: &Model = schema.model(&relation.model)?;
                path.push(PathToken::Reverse(token.to_string()));
                let right = alias.clone();
                let fk = relation.field.clone();
                let tcol = relation.target_column.clone();
                let table = source.table().to_string();
                alias = self.joins.register(&path, |a| Join {
                    kind: JoinKind::Left,
                    table,
                    alias: None,
                    on: Some(format!("{} = {}", qualified(a, &fk), qualified(&right, &tcol))),
                });
                let fk_column = qualified(&alias, &relation.field);
                match rest.first() {
                    None => return Ok(Resolved::new(fk_column, Operator::Eq)),
                    Some(next) if !is_navigable(source, next) && Operator::parse(next).is_some() => {
                        return terminal(fk_column, rest, source);
                    }
                    Some(_) => {}
                }
                model = source;
                i += 1;
                continue;
            }

            return Err(BuildError::invalid_field(token, model.table()));
        }
    }

    /// Resolve a key that must name a value (projection, ordering, grouping).
    ///
    /// Operators are rejected; date parts are allowed.
    pub fn resolve_column(&mut self, key: &str) -> BuildResult<String> {
        let resolved = self.resolve(key)?;
        if resolved.explicit_op {
            let token = key.rsplit(DELIMITER).next().unwrap_or(key);
            return Err(BuildError::invalid_operator(token, self.root.table()));
        }
        Ok(resolved.expression())
    }

    /// Relation path tokens for a key made only of relations (`book__author`).
    pub fn resolve_relation(&mut self, key: &str, kind: JoinKind) -> BuildResult<String> {
        let mut model: &Model = self.root;
        let mut alias = self.root_alias.to_string();
        let mut path = Vec::new();
        for token in key.split(DELIMITER) {
            let schema = self.schema;
            if let Some(field) = model.field(token) {
                let reference = field
                    .reference
                    .as_ref()
                    .ok_or_else(|| BuildError::invalid_field(token, model.table()))?;
                let target: &Model = schema.model(&reference.model)?;
                path.push(PathToken::Forward(token.to_string()));
                let left = alias.clone();
                let fk = field.name.clone();
                let tcol = field.target_column().unwrap_or_default().to_string();
                let table = target.table().to_string();
                alias = self.joins.register(&path, |a| Join {
                    kind,
                    table,
                    alias: None,
                    on: Some(format!("{} = {}", qualified(a, &tcol), qualified(&left, &fk))),
                });
                model = target;
            } else if let Some(relation) = model.reverse_relation(token) {
                let source: &Model = schema.model(&relation.model)?;
                path.push(PathToken::Reverse(token.to_string()));
                let right = alias.clone();
                let fk = relation.field.clone();
                let tcol = relation.target_column.clone();
                let table = source.table().to_string();
                alias = self.joins.register(&path, |a| Join {
                    kind,
                    table,
                    alias: None,
                    on: Some(format!("{} = {}", qualified(a, &fk), qualified(&right, &tcol))),
                });
                model = source;
            } else {
                return Err(BuildError::invalid_field(token, model.table()));
            }
            self.joins.set_kind(&path, kind);
        }
        Ok(alias)
    }

    /// The root model.
    pub fn root(&self) -> &Model {
        self.root
    }

    /// Quoted root alias.
    pub fn root_alias(&self) -> String {
        quote(self.root_alias)
    }
}

/// Whether `token` continues a path through `model` (field or reverse relation).
fn is_navigable(model: &Model, token: &str) -> bool {
    model.field(token).is_some() || model.reverse_relation(token).is_some()
}

/// Resolve the operator suffix after a scalar column.
fn terminal(column: String, rest: &[&str], model: &Model) -> BuildResult<Resolved> {
    let parse = |token: &str| {
        Operator::parse(token).ok_or_else(|| BuildError::invalid_operator(token, model.table()))
    };
    match rest {
        [] => Ok(Resolved::new(column, Operator::Eq)),
        [token] => {
            let op = parse(*token)?;
            if op.is_json_only() {
                return Err(BuildError::invalid_operator(*token, model.table()));
            }
            match op.date_part() {
                Some(part) => Ok(Resolved::new(extract(part, &column), Operator::Eq)),
                None => Ok(Resolved::with_op(column, op)),
            }
        }
        [part, cmp] => {
            let Some(date_part) = parse(*part)?.date_part() else {
                return Err(BuildError::invalid_operator(*part, model.table()));
            };
            let op = parse(*cmp)?;
            if !op.is_comparison() {
                return Err(BuildError::invalid_operator(*cmp, model.table()));
            }
            Ok(Resolved::with_op(extract(date_part, &column), op))
        }
        [_, _, extra, ..] => Err(BuildError::invalid_operator(*extra, model.table())),
    }
}

fn extract(part: &str, column: &str) -> String {
    format!("EXTRACT({part} FROM {column})")
}

/// Remaining tokens below a JSON column are keys, optionally ending in an operator.
fn json_path(column: String, rest: &[&str]) -> BuildResult<Resolved> {
    let (keys, op) = match rest.split_last() {
        Some((last, keys)) => match Operator::parse(last) {
            Some(op) => (keys, Some(op)),
            None => (rest, None),
        },
        None => (rest, None),
    };
    Ok(Resolved {
        column,
        op: op.unwrap_or(Operator::Eq),
        json_keys: Some(keys.iter().map(|k| json_key(k)).collect::<BuildResult<_>>()?),
        explicit_op: op.is_some(),
    })
}
