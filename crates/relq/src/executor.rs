//! The execution seam.
//!
//! relq produces SQL text; an [`Executor`] runs it. Statements are fully inlined (no bind
//! parameters) and may be batched with `; `, so executors use PostgreSQL's simple query
//! protocol and return one [`ResultSet`] per statement.
//!
//! Implementations are provided for `tokio_postgres::Client`, `tokio_postgres::Transaction`
//! and, with the `pool` feature, `deadpool_postgres::Client` and `deadpool_postgres::Pool`.

use crate::error::OrmResult;
use crate::row::ResultSet;
use tokio_postgres::SimpleQueryMessage;

/// Flags forwarded from the builder to the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Caller wants the raw result set.
    pub raw: bool,
    /// Advisory: the caller opted out of result validation.
    pub skip_validation: bool,
    /// Advisory: run outside any caller-managed transaction.
    pub auto_commit: bool,
}

/// Runs SQL text.
pub trait Executor: Send + Sync {
    /// Execute `sql` (possibly several `;`-separated statements).
    fn execute(
        &self,
        sql: &str,
        options: ExecOptions,
    ) -> impl std::future::Future<Output = OrmResult<Vec<ResultSet>>> + Send;
}

/// Group simple-query messages into one result set per statement.
pub fn collect_results(messages: Vec<SimpleQueryMessage>) -> Vec<ResultSet> {
    let mut sets = Vec::new();
    let mut current: Option<ResultSet> = None;
    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(columns) => {
                current = Some(ResultSet::new(
                    columns.iter().map(|c| c.name().to_string()).collect(),
                ));
            }
            SimpleQueryMessage::Row(row) => {
                let set = current.get_or_insert_with(|| {
                    ResultSet::new(row.columns().iter().map(|c| c.name().to_string()).collect())
                });
                set.rows
                    .push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
            }
            SimpleQueryMessage::CommandComplete(affected) => {
                let mut set = current.take().unwrap_or_default();
                set.affected = affected;
                sets.push(set);
            }
            _ => {}
        }
    }
    if let Some(set) = current {
        sets.push(set);
    }
    sets
}

impl Executor for tokio_postgres::Client {
    async fn execute(&self, sql: &str, _options: ExecOptions) -> OrmResult<Vec<ResultSet>> {
        let messages = self.simple_query(sql).await?;
        Ok(collect_results(messages))
    }
}

impl Executor for tokio_postgres::Transaction<'_> {
    async fn execute(&self, sql: &str, _options: ExecOptions) -> OrmResult<Vec<ResultSet>> {
        let messages = self.simple_query(sql).await?;
        Ok(collect_results(messages))
    }
}

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Client {
    async fn execute(&self, sql: &str, _options: ExecOptions) -> OrmResult<Vec<ResultSet>> {
        let messages = self.simple_query(sql).await?;
        Ok(collect_results(messages))
    }
}

/// Checks out a connection per call.
#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Pool {
    async fn execute(&self, sql: &str, options: ExecOptions) -> OrmResult<Vec<ResultSet>> {
        let client = self.get().await?;
        Executor::execute(&client, sql, options).await
    }
}

impl<E: Executor> Executor for &E {
    fn execute(
        &self,
        sql: &str,
        options: ExecOptions,
    ) -> impl std::future::Future<Output = OrmResult<Vec<ResultSet>>> + Send {
        (**self).execute(sql, options)
    }
}
