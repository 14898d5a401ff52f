//! Aggregate expressions for `annotate`.

use crate::error::BuildResult;
use crate::resolve::Resolver;

/// An aggregate over a lookup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    /// `COUNT(*)`
    CountAll,
    Count(String),
    CountDistinct(String),
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    /// Trusted SQL expression.
    Raw(String),
}

impl Aggregate {
    pub fn count(key: impl Into<String>) -> Self {
        Self::Count(key.into())
    }

    pub fn count_distinct(key: impl Into<String>) -> Self {
        Self::CountDistinct(key.into())
    }

    pub fn sum(key: impl Into<String>) -> Self {
        Self::Sum(key.into())
    }

    pub fn avg(key: impl Into<String>) -> Self {
        Self::Avg(key.into())
    }

    pub fn min(key: impl Into<String>) -> Self {
        Self::Min(key.into())
    }

    pub fn max(key: impl Into<String>) -> Self {
        Self::Max(key.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    pub(crate) fn render(&self, resolver: &mut Resolver<'_>) -> BuildResult<String> {
        let (func, key, distinct) = match self {
            Self::CountAll => return Ok("COUNT(*)".to_string()),
            Self::Raw(sql) => return Ok(sql.clone()),
            Self::Count(k) => ("COUNT", k, false),
            Self::CountDistinct(k) => ("COUNT", k, true),
            Self::Sum(k) => ("SUM", k, false),
            Self::Avg(k) => ("AVG", k, false),
            Self::Min(k) => ("MIN", k, false),
            Self::Max(k) => ("MAX", k, false),
        };
        let column = resolver.resolve_column(key)?;
        Ok(if distinct {
            format!("{func}(DISTINCT {column})")
        } else {
            format!("{func}({column})")
        })
    }
}
