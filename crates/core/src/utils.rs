use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a user-supplied date.
/// Supports ISO dates, ISO/SQLite datetimes, and free-form input such as "March 14, 2025".
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, DATE_FORMAT) {
        return Some(date);
    }

    // ISO 8601 with timezone keeps the calendar date the user wrote
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Some(dt.date());
        }
    }

    // dateparser reads naive input as local time
    dateparser::parse(input)
        .ok()
        .map(|dt| dt.with_timezone(&Local).date_naive())
}

/// Timestamp shown on exported reports.
pub fn format_timestamp_to_local(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

/// Spreadsheet column letters for a zero-based index: 0 -> A, 25 -> Z, 26 -> AA.
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        // rem < 26
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Sheet title part of an A1 range: "Teams!A1:B4" -> "Teams", "'Player Stats'!A1" -> "Player Stats".
pub fn sheet_title(range: &str) -> &str {
    let title = match range.rfind('!') {
        Some(idx) => &range[..idx],
        None => range,
    };
    title
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(title)
}

/// A1 range covering `rows` x `cols` cells starting at the top-left of `title`.
pub fn block_range(title: &str, rows: usize, cols: usize) -> String {
    if rows == 0 || cols == 0 {
        return format!("{title}!A1");
    }
    format!("{title}!A1:{}{rows}", column_letters(cols - 1))
}

/// Last column a sheet can have.
const LAST_COLUMN: &str = "ZZZ";

/// Everything below the first `rows` rows of `title`.
pub fn rows_below(title: &str, rows: usize) -> String {
    format!("{title}!A{}:{LAST_COLUMN}", rows + 1)
}

/// The cells right of a `rows` x `cols` block anchored at A1.
pub fn columns_right_of(title: &str, rows: usize, cols: usize) -> String {
    format!("{title}!{}1:{LAST_COLUMN}{rows}", column_letters(cols))
}
