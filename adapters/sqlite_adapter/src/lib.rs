use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use tracing::{debug, warn};
use volleystat_core::error::StorageError;
use volleystat_core::ports::{Row, StorageAdapter, Value, WriteOutcome};

/// Tables created on connect. Dates are ISO-8601 text.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0)
);

CREATE TABLE IF NOT EXISTS players (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name     TEXT NOT NULL CHECK (length(trim(name)) > 0),
    position TEXT NOT NULL,
    team_id  INTEGER NOT NULL REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS matches (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id    INTEGER NOT NULL REFERENCES teams(id),
    opponent   TEXT NOT NULL CHECK (length(trim(opponent)) > 0),
    match_date TEXT NOT NULL,
    sets_won   INTEGER NOT NULL CHECK (sets_won >= 0),
    sets_lost  INTEGER NOT NULL CHECK (sets_lost >= 0)
);

CREATE TABLE IF NOT EXISTS player_stats (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    player_id INTEGER NOT NULL REFERENCES players(id),
    match_id  INTEGER NOT NULL REFERENCES matches(id),
    attacks   INTEGER NOT NULL DEFAULT 0 CHECK (attacks >= 0),
    kills     INTEGER NOT NULL DEFAULT 0 CHECK (kills >= 0 AND kills <= attacks),
    errors    INTEGER NOT NULL DEFAULT 0 CHECK (errors >= 0),
    blocks    INTEGER NOT NULL DEFAULT 0 CHECK (blocks >= 0),
    digs      INTEGER NOT NULL DEFAULT 0 CHECK (digs >= 0),
    aces      INTEGER NOT NULL DEFAULT 0 CHECK (aces >= 0),
    UNIQUE (player_id, match_id)
);

CREATE TABLE IF NOT EXISTS training_sessions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id      INTEGER NOT NULL REFERENCES teams(id),
    session_type TEXT NOT NULL CHECK (session_type IN ('serving', 'attacking', 'blocking')),
    session_date TEXT NOT NULL,
    duration     INTEGER NOT NULL CHECK (duration > 0)
);
"#;

const IN_MEMORY: &str = ":memory:";

/// SQLite implementation of the StorageAdapter port
pub struct SqliteStorageAdapter {
    db_path: String,
    conn: Option<Connection>,
}

impl SqliteStorageAdapter {
    /// Creates an adapter for the database file at `db_path`. Nothing is
    /// opened until `connect`.
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            conn: None,
        }
    }

    /// Private database that lives as long as the connection.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    fn conn(&self) -> Result<&Connection, StorageError> {
        self.conn.as_ref().ok_or(StorageError::NotConnected("sqlite"))
    }
}

impl StorageAdapter for SqliteStorageAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(&mut self) -> Result<(), StorageError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let conn = if self.db_path == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.db_path)
        }
        .map_err(|e| StorageError::Connection(format!("{}: {e}", self.db_path)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        conn.execute_batch(SCHEMA).map_err(map_error)?;

        debug!(path = %self.db_path, "sqlite connected");
        self.conn = Some(conn);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn read_data(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query).map_err(map_error)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(map_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut mapped = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(map_error)?;
                mapped.push(column.as_str(), from_sql(value));
            }
            out.push(mapped);
        }
        Ok(out)
    }

    fn write_data(&self, query: &str, params: &[Value]) -> Result<WriteOutcome, StorageError> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute(query, params_from_iter(params.iter().map(to_sql)))
            .map_err(map_error)?;

        let last_insert_id = (is_insert(query) && rows_affected > 0).then(|| conn.last_insert_rowid());
        Ok(WriteOutcome {
            rows_affected,
            last_insert_id,
        })
    }

    fn begin(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch("BEGIN").map_err(map_error)
    }

    fn commit(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch("COMMIT").map_err(map_error)
    }

    fn rollback(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch("ROLLBACK").map_err(map_error)
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!(path = %self.db_path, error = %e, "sqlite close failed");
            }
        }
    }
}

impl Drop for SqliteStorageAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_insert(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|verb| verb.eq_ignore_ascii_case("insert"))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Sorts a rusqlite error into the port's error kinds.
fn map_error(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            ErrorCode::ConstraintViolation => StorageError::Constraint(e.to_string()),
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure => StorageError::Connection(e.to_string()),
            _ => StorageError::Query(e.to_string()),
        },
        _ => StorageError::Query(e.to_string()),
    }
}
