//! Error types shared by the core and its adapters.
//!
//! Adapters report [`StorageError`]; the application facade lifts those into
//! [`VolleyStatError`], which is what the CLI sees.

use std::fmt;

use crate::export::Sheet;

/// Errors raised by a [`StorageAdapter`](crate::ports::StorageAdapter).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Store unreachable, credentials rejected, or the connection dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Invalid or duplicate data rejected by the store.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A data operation was issued before `connect` succeeded.
    #[error("{0} adapter is not connected")]
    NotConnected(&'static str),

    /// Any other failure while running a query or remote call.
    #[error("query failed: {0}")]
    Query(String),

    /// A row did not carry the expected column or type.
    #[error("column `{column}`: {reason}")]
    Column { column: String, reason: String },

    /// The adapter does not offer this capability.
    #[error("{0} is not supported by this adapter")]
    Unsupported(&'static str),
}

impl StorageError {
    pub(crate) fn column(column: &str, reason: impl Into<String>) -> Self {
        StorageError::Column {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the application facade.
#[derive(Debug, thiserror::Error)]
pub enum VolleyStatError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("constraint error: {0}")]
    Constraint(String),

    #[error("unknown training session type: {0}")]
    UnknownSessionType(String),

    #[error("{0}")]
    PartialExport(ExportFailure),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("no spreadsheet is attached for export")]
    SpreadsheetUnavailable,

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for VolleyStatError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Connection(msg) => VolleyStatError::Connection(msg),
            StorageError::Constraint(msg) => VolleyStatError::Constraint(msg),
            other => VolleyStatError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, VolleyStatError>;

/// Outcome of an export that stopped part way through its sheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFailure {
    /// Sheets written before the failure, in write order.
    pub succeeded: Vec<Sheet>,
    /// The sheet whose write was rejected.
    pub failed: Sheet,
    pub reason: String,
    /// Sheets skipped after the failure.
    pub not_attempted: Vec<Sheet>,
}

impl fmt::Display for ExportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partial export: sheet {} failed ({}); written: [{}]; not attempted: [{}]",
            self.failed,
            self.reason,
            join_sheets(&self.succeeded),
            join_sheets(&self.not_attempted),
        )
    }
}

fn join_sheets(sheets: &[Sheet]) -> String {
    sheets
        .iter()
        .map(|s| s.title())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_constraint_keep_their_kind() {
        let e: VolleyStatError = StorageError::Connection("refused".into()).into();
        assert!(matches!(e, VolleyStatError::Connection(ref m) if m == "refused"));

        let e: VolleyStatError = StorageError::Constraint("FOREIGN KEY".into()).into();
        assert!(matches!(e, VolleyStatError::Constraint(_)));

        let e: VolleyStatError = StorageError::Query("syntax".into()).into();
        assert!(matches!(e, VolleyStatError::Storage(StorageError::Query(_))));
    }

    #[test]
    fn export_failure_lists_sheets() {
        let failure = ExportFailure {
            succeeded: vec![Sheet::Teams, Sheet::Players],
            failed: Sheet::Matches,
            reason: "rate limited".into(),
            not_attempted: vec![Sheet::PlayerStats, Sheet::Summary],
        };
        let text = failure.to_string();
        assert!(text.contains("sheet Matches failed (rate limited)"));
        assert!(text.contains("written: [Teams, Players]"));
        assert!(text.contains("not attempted: [PlayerStats, Summary]"));
    }
}
