//! Spreadsheet export layout: which sheets exist, in what order, and how
//! relational rows become sheet rows.

use std::fmt;

use chrono::{DateTime, Local};

use crate::application::{PlayerReport, TeamReport};
use crate::domain::{DateRange, MatchOutcome, PlayerId, TeamId};
use crate::error::StorageError;
use crate::ports::{Row, Value};
use crate::utils::format_timestamp_to_local;

/// Sheets written by an export, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sheet {
    Teams,
    Players,
    Matches,
    PlayerStats,
    TrainingSessions,
    Summary,
}

impl Sheet {
    pub const ORDER: [Sheet; 6] = [
        Sheet::Teams,
        Sheet::Players,
        Sheet::Matches,
        Sheet::PlayerStats,
        Sheet::TrainingSessions,
        Sheet::Summary,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Sheet::Teams => "Teams",
            Sheet::Players => "Players",
            Sheet::Matches => "Matches",
            Sheet::PlayerStats => "PlayerStats",
            Sheet::TrainingSessions => "TrainingSessions",
            Sheet::Summary => "Summary",
        }
    }

    /// Top-left anchor the sheet is written from.
    pub fn anchor(&self) -> String {
        format!("{}!A1", self.title())
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Successful export: rows written per sheet, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub written: Vec<(Sheet, usize)>,
}

/// One report written to its own sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportExport {
    pub anchor: String,
    pub rows: usize,
}

/// Rows for one sheet, header first.
pub type SheetRows = Vec<Vec<Value>>;

fn header(columns: &[&str]) -> Vec<Value> {
    columns.iter().map(|c| Value::from(*c)).collect()
}

/// Copies the named columns of each row, in order.
fn project(rows: &[Row], columns: &[&str]) -> Result<SheetRows, StorageError> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| {
                    row.get(c)
                        .cloned()
                        .ok_or_else(|| StorageError::column(c, "missing from export query"))
                })
                .collect()
        })
        .collect()
}

pub fn teams_sheet(rows: &[Row]) -> Result<SheetRows, StorageError> {
    let mut out = vec![header(&["Team ID", "Team Name"])];
    out.extend(project(rows, &["id", "name"])?);
    Ok(out)
}

pub fn players_sheet(rows: &[Row]) -> Result<SheetRows, StorageError> {
    let mut out = vec![header(&["Player ID", "Name", "Position", "Team"])];
    out.extend(project(rows, &["id", "name", "position", "team"])?);
    Ok(out)
}

pub fn matches_sheet(rows: &[Row]) -> Result<SheetRows, StorageError> {
    let mut out = vec![header(&[
        "Match ID", "Team", "Opponent", "Date", "Sets Won", "Sets Lost", "Result",
    ])];
    for (row, mut cells) in rows.iter().zip(project(
        rows,
        &["id", "team", "opponent", "match_date", "sets_won", "sets_lost"],
    )?) {
        let outcome = if row.count("sets_won")? > row.count("sets_lost")? {
            MatchOutcome::Won
        } else {
            MatchOutcome::Lost
        };
        cells.push(Value::from(outcome.label()));
        out.push(cells);
    }
    Ok(out)
}

pub fn player_stats_sheet(rows: &[Row]) -> Result<SheetRows, StorageError> {
    let mut out = vec![header(&[
        "Stat ID", "Player", "Team", "Opponent", "Match Date", "Attacks", "Kills", "Errors",
        "Blocks", "Digs", "Aces",
    ])];
    out.extend(project(
        rows,
        &[
            "id", "player", "team", "opponent", "match_date", "attacks", "kills", "errors",
            "blocks", "digs", "aces",
        ],
    )?);
    Ok(out)
}

pub fn training_sessions_sheet(rows: &[Row]) -> Result<SheetRows, StorageError> {
    let mut out = vec![header(&["Session ID", "Team", "Type", "Date", "Duration (min)"])];
    out.extend(project(rows, &["id", "team", "session_type", "session_date", "duration"])?);
    Ok(out)
}

/// Entity counts shown on the summary sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportCounts {
    pub teams: usize,
    pub players: usize,
    pub matches: usize,
    pub stat_records: usize,
    pub training_sessions: usize,
}

/// Computed aggregate sheet: counts, per-team wins and losses, top performers.
pub fn summary_sheet(
    generated_at: DateTime<Local>,
    range: DateRange,
    counts: ExportCounts,
    standings: &[Row],
    top_performers: &[Row],
) -> Result<SheetRows, StorageError> {
    let mut out = vec![
        vec![Value::from("VolleyStat Report")],
        vec![Value::from("Generated"), Value::from(format_timestamp_to_local(generated_at))],
        vec![Value::from("Period"), Value::from(range.start()), Value::from(range.end())],
        Vec::new(),
        header(&["Category", "Count"]),
        vec![Value::from("Teams"), Value::from(counts.teams)],
        vec![Value::from("Players"), Value::from(counts.players)],
        vec![Value::from("Matches"), Value::from(counts.matches)],
        vec![Value::from("Stat Records"), Value::from(counts.stat_records)],
        vec![Value::from("Training Sessions"), Value::from(counts.training_sessions)],
        Vec::new(),
        header(&["Team", "Wins", "Losses"]),
    ];
    out.extend(project(standings, &["name", "wins", "losses"])?);
    out.push(Vec::new());
    out.push(header(&["Top Performer", "Team", "Kills", "Blocks", "Aces"]));
    out.extend(project(top_performers, &["name", "team", "kills", "blocks", "aces"])?);
    Ok(out)
}

pub fn player_report_anchor(player_id: PlayerId) -> String {
    format!("Player_{player_id}!A1")
}

pub fn team_report_anchor(team_id: TeamId) -> String {
    format!("Team_{team_id}!A1")
}

/// Single-player report laid out top to bottom: metrics, recent matches,
/// recommendations.
pub fn player_report_sheet(report: &PlayerReport) -> SheetRows {
    let m = &report.metrics;
    let mut out = vec![
        vec![
            Value::from("PLAYER REPORT"),
            Value::from(report.player.name.as_str()),
            Value::from(report.player.position.as_str()),
        ],
        Vec::new(),
        vec![Value::from("PERFORMANCE METRICS")],
        vec![Value::from("Attacking Efficiency"), Value::from(format!("{:.2}%", m.attacking_efficiency))],
        vec![Value::from("Blocking Average"), Value::from(format!("{:.2} blocks per match", m.blocking_average))],
        vec![Value::from("Total Serving Aces"), Value::from(m.serving_aces)],
        Vec::new(),
        vec![Value::from("RECENT MATCH STATISTICS")],
    ];
    if !report.recent.is_empty() {
        out.push(header(&["Date", "Opponent", "Attacks", "Kills", "Errors", "Blocks", "Digs", "Aces"]));
        for entry in &report.recent {
            let line = &entry.line;
            out.push(vec![
                Value::from(entry.date),
                Value::from(entry.opponent.as_str()),
                Value::from(line.attacks),
                Value::from(line.kills),
                Value::from(line.errors),
                Value::from(line.blocks),
                Value::from(line.digs),
                Value::from(line.aces),
            ]);
        }
    }
    out.push(Vec::new());
    out.push(vec![Value::from("TRAINING RECOMMENDATIONS")]);
    out.extend(report.recommendations.iter().map(|rec| vec![Value::from(*rec)]));
    out
}

pub fn team_report_sheet(report: &TeamReport) -> SheetRows {
    let m = &report.metrics;
    let mut out = vec![
        vec![Value::from("TEAM REPORT"), Value::from(report.team.name.as_str())],
        Vec::new(),
        vec![Value::from("PERFORMANCE METRICS")],
        vec![Value::from("Matches Played"), Value::from(m.matches_played)],
        vec![Value::from("Matches Won"), Value::from(m.matches_won)],
        vec![Value::from("Win Percentage"), Value::from(format!("{:.2}%", m.win_percentage))],
        vec![Value::from("Set Win Percentage"), Value::from(format!("{:.2}%", m.set_win_percentage))],
        Vec::new(),
        vec![Value::from("RECENT MATCHES")],
    ];
    if !report.recent.is_empty() {
        out.push(header(&["Date", "Opponent", "Sets Won", "Sets Lost", "Result"]));
        for game in &report.recent {
            out.push(vec![
                Value::from(game.date),
                Value::from(game.opponent.as_str()),
                Value::from(game.sets_won),
                Value::from(game.sets_lost),
                Value::from(game.outcome().label()),
            ]);
        }
    }
    out.push(Vec::new());
    out.push(vec![Value::from("TOP PERFORMERS")]);
    if !report.top_performers.is_empty() {
        out.push(header(&["Name", "Position", "Total Kills", "Total Blocks", "Total Aces"]));
        for p in &report.top_performers {
            out.push(vec![
                Value::from(p.name.as_str()),
                Value::from(p.position.as_str()),
                Value::from(p.kills),
                Value::from(p.blocks),
                Value::from(p.aces),
            ]);
        }
    }
    out.push(Vec::new());
    out.push(vec![Value::from("TEAM RECOMMENDATIONS")]);
    out.extend(report.recommendations.iter().map(|rec| vec![Value::from(*rec)]));
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn sheet_order_is_fixed() {
        let titles: Vec<_> = Sheet::ORDER.iter().map(Sheet::title).collect();
        assert_eq!(
            titles,
            vec!["Teams", "Players", "Matches", "PlayerStats", "TrainingSessions", "Summary"]
        );
        assert_eq!(Sheet::PlayerStats.anchor(), "PlayerStats!A1");
        assert_eq!(player_report_anchor(3), "Player_3!A1");
        assert_eq!(team_report_anchor(1), "Team_1!A1");
    }

    #[test]
    fn training_sessions_sheet_keeps_columns() {
        let rows = vec![Row::new()
            .with("id", 2_i64)
            .with("team", "McMaster Marauders")
            .with("session_type", "serving")
            .with("session_date", "2025-02-03")
            .with("duration", 90_i64)];
        let sheet = training_sessions_sheet(&rows).unwrap();
        assert_eq!(sheet[0][4], Value::from("Duration (min)"));
        assert_eq!(
            sheet[1],
            vec![
                Value::Integer(2),
                Value::from("McMaster Marauders"),
                Value::from("serving"),
                Value::from("2025-02-03"),
                Value::Integer(90),
            ]
        );
    }

    #[test]
    fn matches_sheet_adds_result_column() {
        let rows = vec![Row::new()
            .with("id", 1_i64)
            .with("team", "McMaster Marauders")
            .with("opponent", "Western Mustangs")
            .with("match_date", "2025-02-01")
            .with("sets_won", 3_i64)
            .with("sets_lost", 1_i64)];
        let sheet = matches_sheet(&rows).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[1].len(), 7);
        assert_eq!(sheet[1][6], Value::from("Won"));
        assert_eq!(sheet[1][1], Value::from("McMaster Marauders"));
    }

    #[test]
    fn projection_reports_missing_columns() {
        let rows = vec![Row::new().with("id", 1_i64)];
        let err = teams_sheet(&rows).unwrap_err();
        assert!(matches!(err, StorageError::Column { ref column, .. } if column == "name"));
    }

    #[test]
    fn summary_lists_standings_and_performers() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        )
        .unwrap();
        let standings = vec![Row::new()
            .with("name", "McMaster Marauders")
            .with("wins", 1_i64)
            .with("losses", 0_i64)];
        let performers = vec![Row::new()
            .with("name", "Michael Johnson")
            .with("team", "McMaster Marauders")
            .with("kills", 15_i64)
            .with("blocks", 2_i64)
            .with("aces", 1_i64)];
        let counts = ExportCounts {
            teams: 1,
            matches: 1,
            ..ExportCounts::default()
        };

        let sheet = summary_sheet(Local::now(), range, counts, &standings, &performers).unwrap();

        assert_eq!(sheet[2], vec![Value::from("Period"), Value::from("2025-01-01"), Value::from("2025-04-30")]);
        assert!(sheet.contains(&vec![Value::from("McMaster Marauders"), Value::Integer(1), Value::Integer(0)]));
        assert_eq!(sheet.last().unwrap()[0], Value::from("Michael Johnson"));
    }
}
