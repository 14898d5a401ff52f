//! Execution logging, timeouts and slow-statement warnings.
//!
//! # Example
//!
//! ```rust,ignore
//! use relq::monitor::{ExecConfig, InstrumentedExecutor};
//! use std::time::Duration;
//!
//! let config = ExecConfig::new()
//!     .with_query_timeout(Duration::from_secs(30))
//!     .with_slow_query_threshold(Duration::from_millis(500));
//!
//! let executor = InstrumentedExecutor::new(client).with_config(config);
//! let rows = Book::query().filter(lookup! { "pages__gt" => 100 }).fetch_all(&executor).await?;
//! ```

use crate::error::{OrmError, OrmResult};
use crate::executor::{ExecOptions, Executor};
use crate::row::ResultSet;
use std::time::{Duration, Instant};
use tracing::Level;

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Configuration for [`InstrumentedExecutor`].
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Statement timeout. `None` means no timeout (default).
    pub query_timeout: Option<Duration>,
    /// Statements slower than this are logged at WARN.
    pub slow_query_threshold: Option<Duration>,
    /// Level the executed SQL is logged at.
    pub log_level: Level,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            query_timeout: None,
            slow_query_threshold: None,
            log_level: Level::DEBUG,
            max_sql_length: Some(500),
        }
    }
}

impl ExecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the statement timeout.
    ///
    /// A statement exceeding it is abandoned and reported as [`OrmError::Timeout`].
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn display_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)).into(),
            _ => sql.into(),
        }
    }
}

/// Wraps an executor with logging, a timeout and slow-statement detection.
#[derive(Debug, Clone)]
pub struct InstrumentedExecutor<E> {
    inner: E,
    config: ExecConfig,
}

impl<E: Executor> InstrumentedExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            config: ExecConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    fn log_sql(&self, sql: &str, options: ExecOptions) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let shown = self.config.display_sql(sql);
        emit_at_level!(
            self.config.log_level,
            target: "relq.sql",
            raw = options.raw,
            auto_commit = options.auto_commit,
            sql = %shown,
        );
    }
}

impl<E: Executor> Executor for InstrumentedExecutor<E> {
    async fn execute(&self, sql: &str, options: ExecOptions) -> OrmResult<Vec<ResultSet>> {
        self.log_sql(sql, options);
        let start = Instant::now();

        let result = match self.config.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.execute(sql, options))
                .await
                .unwrap_or(Err(OrmError::Timeout(limit))),
            None => self.inner.execute(sql, options).await,
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(sets) => {
                if let Some(threshold) = self.config.slow_query_threshold {
                    if elapsed > threshold {
                        tracing::warn!(
                            target: "relq.sql",
                            elapsed_ms = elapsed.as_millis() as u64,
                            sql = %self.config.display_sql(sql),
                            "slow statement"
                        );
                    }
                }
                tracing::trace!(
                    target: "relq.sql",
                    elapsed_ms = elapsed.as_millis() as u64,
                    statements = sets.len(),
                    "statement finished"
                );
            }
            Err(err) => {
                tracing::warn!(
                    target: "relq.sql",
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "statement failed"
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl Executor for Recorder {
        async fn execute(&self, sql: &str, _options: ExecOptions) -> OrmResult<Vec<ResultSet>> {
            self.seen.lock().unwrap().push(sql.to_string());
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            Ok(vec![ResultSet::default()])
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_sql_bytes("héllo", 2), "h");
        assert_eq!(truncate_sql_bytes("abc", 10), "abc");
        let cfg = ExecConfig::new().max_sql_length(3);
        assert_eq!(cfg.display_sql("SELECT 1"), "SEL...");
    }

    #[tokio::test]
    async fn passes_sql_through() {
        let exec = InstrumentedExecutor::new(Recorder::default());
        let sets = exec.execute("SELECT 1", ExecOptions::default()).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(exec.inner().seen.lock().unwrap().as_slice(), ["SELECT 1"]);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let exec = InstrumentedExecutor::new(Recorder {
            delay: Some(Duration::from_millis(200)),
            ..Recorder::default()
        })
        .with_config(ExecConfig::new().with_query_timeout(Duration::from_millis(10)));
        let err = exec
            .execute("SELECT pg_sleep(1)", ExecOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
