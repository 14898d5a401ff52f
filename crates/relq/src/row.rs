//! Result sets returned by executors and the shapes handed back to callers.

use crate::value::{Record, Value};

/// The rows produced by one executed statement.
///
/// Cells are the text representation PostgreSQL sends over the simple query protocol;
/// `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    /// Rows affected (or returned) as reported by the command tag.
    pub affected: u64,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as name/value records.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(name, cell)| {
                        let value = cell.as_ref().map_or(Value::Null, |s| Value::Text(s.clone()));
                        (name.clone(), value)
                    })
                    .collect::<Record>()
            })
            .collect()
    }

    /// Values of the first column.
    pub fn first_column(&self) -> Vec<Option<String>> {
        self.rows
            .iter()
            .map(|row| row.first().cloned().flatten())
            .collect()
    }
}

/// What a `fetch` call returns, shaped by the builder's output flags.
#[derive(Debug, Clone)]
pub enum Output {
    /// Default: one record per row.
    Records(Vec<Record>),
    /// `raw()`: the untouched result set.
    Raw(ResultSet),
    /// `compact()`: the first column only.
    Column(Vec<Option<String>>),
}

impl Output {
    pub fn shape(result: ResultSet, raw: bool, compact: bool) -> Self {
        if raw {
            Self::Raw(result)
        } else if compact {
            Self::Column(result.first_column())
        } else {
            Self::Records(result.records())
        }
    }

    /// Records, regardless of shape.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Records(records) => records,
            Self::Raw(result) => result.records(),
            Self::Column(values) => values
                .into_iter()
                .map(|v| Record::new().with("value", v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![Some("1".into()), Some("a".into())],
                vec![Some("2".into()), None],
            ],
            affected: 2,
        }
    }

    #[test]
    fn records_keep_column_order() {
        let records = sample().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(records[0].text("name"), Some("a"));
        assert!(records[1].get("name").unwrap().is_null());
    }

    #[test]
    fn compact_takes_first_column() {
        match Output::shape(sample(), false, true) {
            Output::Column(values) => {
                assert_eq!(values, vec![Some("1".to_string()), Some("2".to_string())]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn raw_wins_over_compact() {
        assert!(matches!(Output::shape(sample(), true, true), Output::Raw(_)));
    }
}
