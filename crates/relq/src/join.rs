//! Join descriptors and the per-builder join registry.

use crate::ident::quote;
use std::collections::HashMap;

/// JOIN kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// One JOIN clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    /// `None` when the table is referenced by its own name.
    pub alias: Option<String>,
    /// ON condition; ignored for CROSS joins.
    pub on: Option<String>,
}

impl Join {
    /// Name the joined relation is referred to by.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// `table [AS alias]`, as it appears in FROM or USING lists.
    pub fn from_item(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", quote(&self.table), quote(alias)),
            None => quote(&self.table),
        }
    }

    /// ` KIND JOIN table [AS alias] [ON (cond)]`
    pub fn render(&self) -> String {
        let mut out = format!(" {} {}", self.kind.sql_keyword(), self.from_item());
        if self.kind != JoinKind::Cross {
            out.push_str(" ON ");
            match &self.on {
                Some(on) => {
                    out.push('(');
                    out.push_str(on);
                    out.push(')');
                }
                None => out.push_str("TRUE"),
            }
        }
        out
    }
}

/// One step of a relation path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathToken {
    /// Follow a foreign-key field.
    Forward(String),
    /// Follow a reverse relation.
    Reverse(String),
}

/// Memo of joins registered while resolving lookups.
///
/// A relation path maps to exactly one alias for the registry's lifetime.
#[derive(Debug, Clone, Default)]
pub struct JoinRegistry {
    joins: Vec<Join>,
    by_path: HashMap<Vec<PathToken>, usize>,
    counter: usize,
}

impl JoinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias already registered for `path`.
    pub fn lookup(&self, path: &[PathToken]) -> Option<&str> {
        self.by_path
            .get(path)
            .map(|&i| self.joins[i].reference())
    }

    /// Return the alias for `path`, registering a join built by `make` on first use.
    ///
    /// `make` receives the freshly allocated alias (`__j1`, `__j2`, ...).
    pub fn register(&mut self, path: &[PathToken], make: impl FnOnce(&str) -> Join) -> String {
        if let Some(&i) = self.by_path.get(path) {
            return self.joins[i].reference().to_string();
        }
        self.counter += 1;
        let alias = format!("__j{}", self.counter);
        let mut join = make(&alias);
        join.alias = Some(alias.clone());
        tracing::trace!(target: "relq.resolve", ?path, alias = %alias, table = %join.table, "registered join");
        self.by_path.insert(path.to_vec(), self.joins.len());
        self.joins.push(join);
        alias
    }

    /// Change the kind of the join registered for `path`.
    pub fn set_kind(&mut self, path: &[PathToken], kind: JoinKind) -> bool {
        match self.by_path.get(path) {
            Some(&i) => {
                self.joins[i].kind = kind;
                true
            }
            None => false,
        }
    }

    /// Add a join that is not tied to a relation path.
    pub fn push(&mut self, join: Join) {
        self.joins.push(join);
    }

    /// All joins in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }
}
