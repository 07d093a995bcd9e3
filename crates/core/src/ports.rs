use std::fmt;

use chrono::NaiveDate;

use crate::error::StorageError;
use crate::utils::DATE_FORMAT;

/// A single cell or bound parameter crossing the storage port.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Text(v.format(DATE_FORMAT).to_string())
    }
}

/// One result row: column names paired with values, in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, handy in adapters and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.cells.push((column.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    fn require(&self, column: &str) -> Result<&Value, StorageError> {
        self.get(column)
            .ok_or_else(|| StorageError::column(column, "missing from row"))
    }

    pub fn integer(&self, column: &str) -> Result<i64, StorageError> {
        match self.require(column)? {
            Value::Integer(i) => Ok(*i),
            other => Err(StorageError::column(column, format!("expected integer, got {other:?}"))),
        }
    }

    /// Non-negative counter column (stats, sets, durations).
    pub fn count(&self, column: &str) -> Result<u32, StorageError> {
        let raw = self.integer(column)?;
        u32::try_from(raw).map_err(|_| StorageError::column(column, format!("{raw} is not a valid count")))
    }

    /// Numeric column that may be `NULL` (aggregates over empty sets).
    pub fn optional_real(&self, column: &str) -> Result<Option<f64>, StorageError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Real(r) => Ok(Some(*r)),
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(i) => Ok(Some(*i as f64)),
            other => Err(StorageError::column(column, format!("expected number, got {other:?}"))),
        }
    }

    pub fn text(&self, column: &str) -> Result<&str, StorageError> {
        match self.require(column)? {
            Value::Text(s) => Ok(s),
            other => Err(StorageError::column(column, format!("expected text, got {other:?}"))),
        }
    }

    pub fn date(&self, column: &str) -> Result<NaiveDate, StorageError> {
        let raw = self.text(column)?;
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|e| StorageError::column(column, format!("bad date {raw:?}: {e}")))
    }
}

/// What a write did: affected row count plus the generated key, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_affected: usize,
    pub last_insert_id: Option<i64>,
}

/// Port implemented by every backing store (relational database, remote spreadsheet).
///
/// `query` is interpreted by the adapter: SQL with positional `?N`
/// placeholders for the relational store, an A1 range for a spreadsheet.
/// Adapters never build queries by splicing parameter values into `query`.
pub trait StorageAdapter {
    /// Short adapter name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Acquire the underlying connection. Expected failures (bad credentials,
    /// unreachable host) come back as [`StorageError::Connection`].
    fn connect(&mut self) -> Result<(), StorageError>;

    fn is_connected(&self) -> bool;

    fn read_data(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, StorageError>;

    fn write_data(&self, query: &str, params: &[Value]) -> Result<WriteOutcome, StorageError>;

    /// Write a block of rows to one target. The default runs `write_data` per row.
    fn write_rows(&self, target: &str, rows: &[Vec<Value>]) -> Result<WriteOutcome, StorageError> {
        let mut total = WriteOutcome::default();
        for row in rows {
            let outcome = self.write_data(target, row)?;
            total.rows_affected += outcome.rows_affected;
            total.last_insert_id = outcome.last_insert_id.or(total.last_insert_id);
        }
        Ok(total)
    }

    fn begin(&self) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("transactions"))
    }

    fn commit(&self) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("transactions"))
    }

    fn rollback(&self) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("transactions"))
    }

    /// Release the connection. Safe to call repeatedly or without a prior `connect`.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let row = Row::new()
            .with("id", 7_i64)
            .with("name", "McMaster Marauders")
            .with("match_date", NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
            .with("avg", Value::Null);

        assert_eq!(row.integer("id").unwrap(), 7);
        assert_eq!(row.count("id").unwrap(), 7);
        assert_eq!(row.text("name").unwrap(), "McMaster Marauders");
        assert_eq!(row.date("match_date").unwrap(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(row.optional_real("avg").unwrap(), None);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name", "match_date", "avg"]);
    }

    #[test]
    fn accessor_errors_name_the_column() {
        let row = Row::new().with("kills", -1_i64).with("name", "x");

        let err = row.count("kills").unwrap_err();
        assert!(matches!(err, StorageError::Column { ref column, .. } if column == "kills"));

        assert!(row.integer("name").is_err());
        assert!(row.text("missing").is_err());
    }

    #[test]
    fn null_displays_empty() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(3_u32).to_string(), "3");
    }
}
