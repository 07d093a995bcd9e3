use std::cell::RefCell;
use std::collections::BTreeSet;

use serde_json::{Number, Value as Json};
use tracing::{debug, info};
use volleystat_core::error::StorageError;
use volleystat_core::ports::{Row, StorageAdapter, Value, WriteOutcome};
use volleystat_core::utils::{block_range, columns_right_of, rows_below, sheet_title};

mod http;

pub use http::HttpSheetsApi;

#[derive(Debug, thiserror::Error)]
pub enum SheetsApiError {
    #[error("credentials: {0}")]
    Credentials(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("no access token; authorize first")]
    Unauthorized,

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// The handful of Sheets v4 calls the adapter relies on.
pub trait SheetsApi {
    fn authorize(&mut self) -> Result<(), SheetsApiError>;

    fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SheetsApiError>;

    fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<(), SheetsApiError>;

    fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<Json>>, SheetsApiError>;

    fn clear_values(&self, spreadsheet_id: &str, range: &str) -> Result<(), SheetsApiError>;

    /// Overwrites `range` with `rows`; returns rows updated.
    fn update_values(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Json>]) -> Result<usize, SheetsApiError>;

    /// Appends `rows` after the last filled row of `range`; returns rows added.
    fn append_values(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<Json>]) -> Result<usize, SheetsApiError>;
}

/// Spreadsheet implementation of the StorageAdapter port. Queries are A1 ranges.
pub struct SpreadsheetStorageAdapter<A: SheetsApi> {
    api: A,
    spreadsheet_id: String,
    known_sheets: RefCell<BTreeSet<String>>,
    connected: bool,
}

impl<A: SheetsApi> SpreadsheetStorageAdapter<A> {
    pub fn new(api: A, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            api,
            spreadsheet_id: spreadsheet_id.into(),
            known_sheets: RefCell::new(BTreeSet::new()),
            connected: false,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn ensure_connected(&self) -> Result<(), StorageError> {
        if self.connected {
            Ok(())
        } else {
            Err(StorageError::NotConnected("sheets"))
        }
    }

    fn ensure_sheet(&self, title: &str) -> Result<(), StorageError> {
        if self.known_sheets.borrow().contains(title) {
            return Ok(());
        }
        self.api
            .add_sheet(&self.spreadsheet_id, title)
            .map_err(map_error)?;
        info!(sheet = title, "sheet created");
        self.known_sheets.borrow_mut().insert(title.to_string());
        Ok(())
    }
}

impl<A: SheetsApi> StorageAdapter for SpreadsheetStorageAdapter<A> {
    fn name(&self) -> &'static str {
        "sheets"
    }

    fn connect(&mut self) -> Result<(), StorageError> {
        if self.connected {
            return Ok(());
        }
        self.api
            .authorize()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let titles = self
            .api
            .sheet_titles(&self.spreadsheet_id)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        debug!(spreadsheet = %self.spreadsheet_id, sheets = titles.len(), "spreadsheet connected");
        *self.known_sheets.borrow_mut() = titles.into_iter().collect();
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    /// First row of `query` is the header; later rows are keyed by it.
    fn read_data(&self, query: &str, _params: &[Value]) -> Result<Vec<Row>, StorageError> {
        self.ensure_connected()?;
        let values = self
            .api
            .get_values(&self.spreadsheet_id, query)
            .map_err(map_error)?;

        let mut lines = values.into_iter();
        let header: Vec<String> = match lines.next() {
            Some(cells) => cells.iter().map(|c| from_cell(c).to_string()).collect(),
            None => return Ok(Vec::new()),
        };

        Ok(lines
            .map(|cells| {
                let mut row = Row::new();
                for (idx, column) in header.iter().enumerate() {
                    let value = cells.get(idx).map(from_cell).unwrap_or(Value::Null);
                    row.push(column.as_str(), value);
                }
                row
            })
            .collect())
    }

    /// Appends `params` as one row.
    fn write_data(&self, query: &str, params: &[Value]) -> Result<WriteOutcome, StorageError> {
        self.ensure_connected()?;
        self.ensure_sheet(sheet_title(query))?;
        let row: Vec<Json> = params.iter().map(to_cell).collect();
        let rows_affected = self
            .api
            .append_values(&self.spreadsheet_id, query, &[row])
            .map_err(map_error)?;
        Ok(WriteOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }

    /// Replaces the whole sheet named by `target` with `rows`.
    ///
    /// The new block is written over the old content first and only the
    /// leftover cells outside it are cleared afterwards, so a rejected
    /// update leaves the previous content in place.
    fn write_rows(&self, target: &str, rows: &[Vec<Value>]) -> Result<WriteOutcome, StorageError> {
        self.ensure_connected()?;
        let title = sheet_title(target);
        self.ensure_sheet(title)?;

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut rows_affected = 0;
        if width > 0 {
            // Short rows are padded so stale cells inside the block are overwritten.
            let cells: Vec<Vec<Json>> = rows
                .iter()
                .map(|row| {
                    let mut line: Vec<Json> = row.iter().map(to_cell).collect();
                    line.resize(width, Json::String(String::new()));
                    line
                })
                .collect();
            let range = block_range(title, rows.len(), width);
            rows_affected = self
                .api
                .update_values(&self.spreadsheet_id, &range, &cells)
                .map_err(map_error)?;
            debug!(%range, rows = rows_affected, "sheet written");

            self.api
                .clear_values(&self.spreadsheet_id, &columns_right_of(title, rows.len(), width))
                .map_err(map_error)?;
        }
        let height = if width > 0 { rows.len() } else { 0 };
        self.api
            .clear_values(&self.spreadsheet_id, &rows_below(title, height))
            .map_err(map_error)?;

        Ok(WriteOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }

    fn close(&mut self) {
        self.connected = false;
        self.known_sheets.borrow_mut().clear();
    }
}

/// Rejected credentials and transport failures are connection problems;
/// everything else is a failed call.
fn map_error(e: SheetsApiError) -> StorageError {
    match &e {
        SheetsApiError::Api { status: 401 | 403, .. } | SheetsApiError::Unauthorized => {
            StorageError::Connection(e.to_string())
        }
        SheetsApiError::Http(inner) if inner.is_connect() || inner.is_timeout() => {
            StorageError::Connection(e.to_string())
        }
        _ => StorageError::Query(e.to_string()),
    }
}

fn to_cell(value: &Value) -> Json {
    match value {
        Value::Null => Json::String(String::new()),
        Value::Integer(i) => Json::from(*i),
        Value::Real(r) => Number::from_f64(*r).map_or(Json::Null, Json::Number),
        Value::Text(s) => Json::String(s.clone()),
    }
}

fn from_cell(cell: &Json) -> Value {
    match cell {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Null, Value::Real),
        },
        Json::String(s) => parse_text_cell(s),
        other => Value::Text(other.to_string()),
    }
}

fn parse_text_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    match trimmed.parse::<f64>() {
        Ok(r) if r.is_finite() && trimmed.bytes().any(|b| b.is_ascii_digit()) => Value::Real(r),
        _ => Value::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    /// In-memory spreadsheet keyed by sheet title.
    #[derive(Default)]
    struct FakeSheets {
        reject_auth: bool,
        sheets: RefCell<BTreeMap<String, Vec<Vec<Json>>>>,
        fail_update_with: Option<u16>,
        added: RefCell<Vec<String>>,
        cleared: RefCell<Vec<String>>,
    }

    impl FakeSheets {
        fn with_sheet(self, title: &str, rows: Vec<Vec<Json>>) -> Self {
            self.sheets.borrow_mut().insert(title.to_string(), rows);
            self
        }
    }

    impl SheetsApi for FakeSheets {
        fn authorize(&mut self) -> Result<(), SheetsApiError> {
            if self.reject_auth {
                return Err(SheetsApiError::Api {
                    status: 401,
                    message: "invalid_grant".into(),
                });
            }
            Ok(())
        }

        fn sheet_titles(&self, _id: &str) -> Result<Vec<String>, SheetsApiError> {
            Ok(self.sheets.borrow().keys().cloned().collect())
        }

        fn add_sheet(&self, _id: &str, title: &str) -> Result<(), SheetsApiError> {
            self.added.borrow_mut().push(title.to_string());
            self.sheets.borrow_mut().insert(title.to_string(), Vec::new());
            Ok(())
        }

        fn get_values(&self, _id: &str, range: &str) -> Result<Vec<Vec<Json>>, SheetsApiError> {
            Ok(self
                .sheets
                .borrow()
                .get(sheet_title(range))
                .cloned()
                .unwrap_or_default())
        }

        /// Understands the `A5:ZZZ` and `H1:ZZZ4` shapes the adapter clears.
        fn clear_values(&self, _id: &str, range: &str) -> Result<(), SheetsApiError> {
            self.cleared.borrow_mut().push(range.to_string());
            let mut sheets = self.sheets.borrow_mut();
            let Some(rows) = sheets.get_mut(sheet_title(range)) else {
                return Ok(());
            };
            let cells = range.rsplit_once('!').map_or("A1:ZZZ", |(_, cells)| cells);
            let (start, end) = cells.split_once(':').unwrap_or((cells, ""));
            let letters: String = start.chars().take_while(char::is_ascii_alphabetic).collect();
            let first_row: usize = start[letters.len()..].parse().unwrap();
            let last_row: usize = end
                .trim_start_matches(|c: char| c.is_ascii_alphabetic())
                .parse()
                .unwrap_or(usize::MAX);
            let first_col = letters.bytes().fold(0, |acc, b| acc * 26 + usize::from(b - b'A' + 1)) - 1;

            for (idx, cells) in rows.iter_mut().enumerate() {
                if (first_row..=last_row).contains(&(idx + 1)) {
                    cells.truncate(first_col);
                }
            }
            while rows.last().is_some_and(Vec::is_empty) {
                rows.pop();
            }
            Ok(())
        }

        fn update_values(&self, _id: &str, range: &str, rows: &[Vec<Json>]) -> Result<usize, SheetsApiError> {
            if let Some(status) = self.fail_update_with {
                return Err(SheetsApiError::Api {
                    status,
                    message: "quota exceeded".into(),
                });
            }
            let mut sheets = self.sheets.borrow_mut();
            let sheet = sheets.entry(sheet_title(range).to_string()).or_default();
            for (idx, row) in rows.iter().enumerate() {
                if idx == sheet.len() {
                    sheet.push(Vec::new());
                }
                let line = &mut sheet[idx];
                if line.len() < row.len() {
                    line.resize(row.len(), Json::Null);
                }
                line[..row.len()].clone_from_slice(row);
            }
            Ok(rows.len())
        }

        fn append_values(&self, _id: &str, range: &str, rows: &[Vec<Json>]) -> Result<usize, SheetsApiError> {
            self.sheets
                .borrow_mut()
                .entry(sheet_title(range).to_string())
                .or_default()
                .extend(rows.iter().cloned());
            Ok(rows.len())
        }
    }

    fn connected(api: FakeSheets) -> SpreadsheetStorageAdapter<FakeSheets> {
        let mut adapter = SpreadsheetStorageAdapter::new(api, "abc123");
        adapter.connect().unwrap();
        adapter
    }

    #[test]
    fn test_rejected_credentials_fail_connect() {
        let mut adapter = SpreadsheetStorageAdapter::new(
            FakeSheets {
                reject_auth: true,
                ..FakeSheets::default()
            },
            "abc123",
        );
        assert!(matches!(adapter.connect(), Err(StorageError::Connection(_))));
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_calls_before_connect_fail() {
        let adapter = SpreadsheetStorageAdapter::new(FakeSheets::default(), "abc123");
        let err = adapter.read_data("Teams!A1", &[]).unwrap_err();
        assert!(matches!(err, StorageError::NotConnected("sheets")));
    }

    #[test]
    fn test_write_rows_creates_and_replaces_sheet() {
        let stale = vec![
            vec![json!("stale"), json!("x"), json!("wide")],
            vec![json!("rows"), json!("y"), json!("z")],
            vec![json!("more")],
        ];
        let api = FakeSheets::default().with_sheet("Teams", stale);
        let adapter = connected(api);

        let rows = vec![
            vec![Value::from("Team ID"), Value::from("Team Name")],
            vec![Value::from(1_i64), Value::from("McMaster Marauders")],
        ];
        assert_eq!(adapter.write_rows("Teams!A1", &rows).unwrap().rows_affected, 2);
        assert_eq!(adapter.write_rows("Matches!A1", &rows).unwrap().rows_affected, 2);

        assert_eq!(*adapter.api().added.borrow(), vec!["Matches".to_string()]);
        assert_eq!(
            *adapter.api().cleared.borrow(),
            vec!["Teams!C1:ZZZ2", "Teams!A3:ZZZ", "Matches!C1:ZZZ2", "Matches!A3:ZZZ"]
        );
        assert_eq!(adapter.api().sheets.borrow()["Teams"][0].len(), 2);
        let teams = adapter.read_data("Teams", &[]).unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].integer("Team ID").unwrap(), 1);
        assert_eq!(teams[0].text("Team Name").unwrap(), "McMaster Marauders");
    }

    #[test]
    fn test_rejected_update_keeps_previous_rows() {
        let previous = vec![
            vec![json!("Match ID"), json!("Opponent")],
            vec![json!(1), json!("Western Mustangs")],
        ];
        let api = FakeSheets {
            fail_update_with: Some(429),
            ..FakeSheets::default()
        }
        .with_sheet("Matches", previous.clone());
        let adapter = connected(api);

        let rows = vec![vec![Value::from("Match ID"), Value::from("Opponent")]];
        assert!(matches!(adapter.write_rows("Matches!A1", &rows), Err(StorageError::Query(_))));

        assert!(adapter.api().cleared.borrow().is_empty());
        assert_eq!(adapter.api().sheets.borrow()["Matches"], previous);
    }

    #[test]
    fn test_empty_block_clears_the_sheet() {
        let api = FakeSheets::default().with_sheet("Summary", vec![vec![json!("old")]]);
        let adapter = connected(api);

        assert_eq!(adapter.write_rows("Summary!A1", &[]).unwrap().rows_affected, 0);
        assert_eq!(*adapter.api().cleared.borrow(), vec!["Summary!A1:ZZZ"]);
        assert!(adapter.api().sheets.borrow()["Summary"].is_empty());
    }

    #[test]
    fn test_read_types_cells_and_pads_short_rows() {
        let api = FakeSheets::default().with_sheet(
            "Matches",
            vec![
                vec![json!("Match ID"), json!("Opponent"), json!("Efficiency"), json!("Notes")],
                vec![json!("7"), json!("Western Mustangs"), json!(36.5)],
            ],
        );
        let adapter = connected(api);

        let rows = adapter.read_data("Matches!A1:D2", &[]).unwrap();
        assert_eq!(rows[0].integer("Match ID").unwrap(), 7);
        assert_eq!(rows[0].get("Efficiency"), Some(&Value::Real(36.5)));
        assert_eq!(rows[0].get("Notes"), Some(&Value::Null));
    }

    #[test]
    fn test_write_data_appends_one_row() {
        let adapter = connected(FakeSheets::default());
        let outcome = adapter
            .write_data("Players!A1", &[Value::from(3_i64), Value::from("Emma Davis")])
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, None);
        assert_eq!(adapter.api().sheets.borrow()["Players"], vec![vec![json!(3), json!("Emma Davis")]]);
    }

    #[test]
    fn test_error_mapping() {
        let adapter = connected(FakeSheets {
            fail_update_with: Some(429),
            ..FakeSheets::default()
        });
        let rows = vec![vec![Value::from("x")]];
        assert!(matches!(adapter.write_rows("Summary!A1", &rows), Err(StorageError::Query(_))));

        let adapter = connected(FakeSheets {
            fail_update_with: Some(403),
            ..FakeSheets::default()
        });
        assert!(matches!(adapter.write_rows("Summary!A1", &rows), Err(StorageError::Connection(_))));
    }

    #[test]
    fn test_sheets_are_not_transactional() {
        let adapter = connected(FakeSheets::default());
        assert!(matches!(adapter.begin(), Err(StorageError::Unsupported(_))));
    }

    #[test]
    fn test_text_cells_keep_dates_and_names() {
        assert_eq!(parse_text_cell("2025-02-01"), Value::from("2025-02-01"));
        assert_eq!(parse_text_cell("-4"), Value::Integer(-4));
        assert_eq!(parse_text_cell("0.25"), Value::Real(0.25));
        assert_eq!(parse_text_cell("inf"), Value::from("inf"));
        assert_eq!(parse_text_cell("  "), Value::Null);
    }
}
