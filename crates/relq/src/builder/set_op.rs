//! UNION / INTERSECT / EXCEPT.

use super::{Compiled, QueryBuilder, Statement, run_compiled};
use crate::error::{BuildResult, OrmResult};
use crate::executor::{ExecOptions, Executor};
use crate::value::Record;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

impl SetOp {
    fn keyword(self) -> &'static str {
        match self {
            Self::Union => "UNION",
            Self::Intersect => "INTERSECT",
            Self::Except => "EXCEPT",
        }
    }
}

/// Two statements combined with a set operator: `(lhs) UNION [ALL] (rhs)`.
///
/// Set queries nest: a `SetQuery` is itself a [`Statement`].
#[derive(Clone)]
#[must_use]
pub struct SetQuery {
    op: SetOp,
    all: bool,
    lhs: Arc<dyn Statement>,
    rhs: Arc<dyn Statement>,
}

impl SetQuery {
    pub fn new(
        op: SetOp,
        all: bool,
        lhs: impl Statement + 'static,
        rhs: impl Statement + 'static,
    ) -> Self {
        Self {
            op,
            all,
            lhs: Arc::new(lhs),
            rhs: Arc::new(rhs),
        }
    }

    pub fn union(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Union, false, self, other)
    }

    pub fn union_all(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Union, true, self, other)
    }

    pub fn intersect(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Intersect, false, self, other)
    }

    pub fn intersect_all(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Intersect, true, self, other)
    }

    pub fn except(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Except, false, self, other)
    }

    pub fn except_all(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Except, true, self, other)
    }

    /// Execute and return every row.
    pub async fn fetch_all(&self, executor: &impl Executor) -> OrmResult<Vec<Record>> {
        let compiled = Compiled {
            statements: vec![self.statement()?],
            primary: 0,
        };
        Ok(run_compiled(executor, &compiled, ExecOptions::default())
            .await?
            .records())
    }
}

impl Statement for SetQuery {
    fn statement(&self) -> BuildResult<String> {
        let all = if self.all { " ALL" } else { "" };
        Ok(format!(
            "({}) {}{all} ({})",
            self.lhs.statement()?,
            self.op.keyword(),
            self.rhs.statement()?
        ))
    }

    fn output_names(&self) -> Option<Vec<String>> {
        self.lhs.output_names()
    }
}

impl QueryBuilder {
    pub fn union(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Union, false, self, other)
    }

    pub fn union_all(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Union, true, self, other)
    }

    pub fn intersect(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Intersect, false, self, other)
    }

    pub fn intersect_all(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Intersect, true, self, other)
    }

    pub fn except(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Except, false, self, other)
    }

    pub fn except_all(self, other: impl Statement + 'static) -> SetQuery {
        SetQuery::new(SetOp::Except, true, self, other)
    }
}
