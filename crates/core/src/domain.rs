use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{StorageError, VolleyStatError};
use crate::ports::Row;

pub type TeamId = i64;
pub type PlayerId = i64;
pub type MatchId = i64;
pub type StatId = i64;
pub type SessionId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    OutsideHitter,
    Setter,
    MiddleBlocker,
    Libero,
    Opposite,
}

impl Position {
    pub const ALL: [Position; 5] = [
        Position::OutsideHitter,
        Position::Setter,
        Position::MiddleBlocker,
        Position::Libero,
        Position::Opposite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::OutsideHitter => "Outside Hitter",
            Position::Setter => "Setter",
            Position::MiddleBlocker => "Middle Blocker",
            Position::Libero => "Libero",
            Position::Opposite => "Opposite",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = VolleyStatError;

    /// Accepts "Outside Hitter", "outside_hitter", "outside-hitter" and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        Position::ALL
            .into_iter()
            .find(|p| p.as_str().replace(' ', "").to_lowercase() == wanted)
            .ok_or_else(|| VolleyStatError::Constraint(format!("unknown position: {s:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
    pub team_id: TeamId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Won,
    Lost,
}

impl MatchOutcome {
    pub fn label(self) -> &'static str {
        match self {
            MatchOutcome::Won => "Won",
            MatchOutcome::Lost => "Lost",
        }
    }

    pub fn letter(self) -> char {
        match self {
            MatchOutcome::Won => 'W',
            MatchOutcome::Lost => 'L',
        }
    }
}

/// A stored match, seen from the recording team's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub team_id: TeamId,
    pub opponent: String,
    pub date: NaiveDate,
    pub sets_won: u32,
    pub sets_lost: u32,
}

impl Match {
    pub fn outcome(&self) -> MatchOutcome {
        if self.sets_won > self.sets_lost {
            MatchOutcome::Won
        } else {
            MatchOutcome::Lost
        }
    }
}

/// Input for recording a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub team_id: TeamId,
    pub opponent: String,
    pub date: NaiveDate,
    pub sets_won: u32,
    pub sets_lost: u32,
}

/// Rules a recorded score must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    pub min_sets_played: u32,
    pub sets_to_win: u32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_sets_played: 3,
            sets_to_win: 3,
        }
    }
}

impl MatchPolicy {
    pub fn validate(&self, sets_won: u32, sets_lost: u32) -> Result<(), VolleyStatError> {
        let played = sets_won.saturating_add(sets_lost);
        if played < self.min_sets_played {
            return Err(VolleyStatError::Constraint(format!(
                "{sets_won}-{sets_lost}: a match needs at least {} sets",
                self.min_sets_played
            )));
        }
        if sets_won > self.sets_to_win || sets_lost > self.sets_to_win {
            return Err(VolleyStatError::Constraint(format!(
                "{sets_won}-{sets_lost}: no side can win more than {} sets",
                self.sets_to_win
            )));
        }
        if sets_won == sets_lost {
            return Err(VolleyStatError::Constraint(format!(
                "{sets_won}-{sets_lost}: a match cannot end level"
            )));
        }
        Ok(())
    }
}

/// One player's box score for a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatLine {
    pub player_id: PlayerId,
    pub attacks: u32,
    pub kills: u32,
    pub errors: u32,
    pub blocks: u32,
    pub digs: u32,
    pub aces: u32,
}

impl StatLine {
    pub fn validate(&self) -> Result<(), VolleyStatError> {
        if self.kills > self.attacks {
            return Err(VolleyStatError::Constraint(format!(
                "player {}: {} kills exceed {} attacks",
                self.player_id, self.kills, self.attacks
            )));
        }
        Ok(())
    }
}

/// Inclusive range of match dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, VolleyStatError> {
        if start > end {
            return Err(VolleyStatError::Constraint(format!(
                "date range starts ({start}) after it ends ({end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Everything ever recorded. Bounds stay four-digit years so they
    /// compare correctly as stored ISO text.
    pub fn all_time() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub(crate) fn require_name(kind: &str, name: &str) -> Result<String, VolleyStatError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(VolleyStatError::Constraint(format!("{kind} name must not be blank")));
    }
    Ok(trimmed.to_string())
}

// -----------------------------------------------------------------------------
// Row mapping
// -----------------------------------------------------------------------------

impl TryFrom<&Row> for Team {
    type Error = StorageError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Team {
            id: row.integer("id")?,
            name: row.text("name")?.to_string(),
        })
    }
}

impl TryFrom<&Row> for Player {
    type Error = StorageError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let raw_position = row.text("position")?;
        let position = raw_position
            .parse()
            .map_err(|e: VolleyStatError| StorageError::column("position", e.to_string()))?;
        Ok(Player {
            id: row.integer("id")?,
            name: row.text("name")?.to_string(),
            position,
            team_id: row.integer("team_id")?,
        })
    }
}

impl TryFrom<&Row> for Match {
    type Error = StorageError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Match {
            id: row.integer("id")?,
            team_id: row.integer("team_id")?,
            opponent: row.text("opponent")?.to_string(),
            date: row.date("match_date")?,
            sets_won: row.count("sets_won")?,
            sets_lost: row.count("sets_lost")?,
        })
    }
}

impl TryFrom<&Row> for StatLine {
    type Error = StorageError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(StatLine {
            player_id: row.integer("player_id")?,
            attacks: row.count("attacks")?,
            kills: row.count("kills")?,
            errors: row.count("errors")?,
            blocks: row.count("blocks")?,
            digs: row.count("digs")?,
            aces: row.count("aces")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_parses_loose_forms() {
        assert_eq!("Outside Hitter".parse::<Position>().unwrap(), Position::OutsideHitter);
        assert_eq!("middle_blocker".parse::<Position>().unwrap(), Position::MiddleBlocker);
        assert_eq!("LIBERO".parse::<Position>().unwrap(), Position::Libero);
        assert_eq!("opposite".parse::<Position>().unwrap(), Position::Opposite);
        assert!("goalkeeper".parse::<Position>().is_err());
    }

    #[test]
    fn position_round_trips_through_display() {
        for p in Position::ALL {
            assert_eq!(p.to_string().parse::<Position>().unwrap(), p);
        }
    }

    #[test]
    fn policy_accepts_decided_matches() {
        let policy = MatchPolicy::default();
        assert!(policy.validate(3, 0).is_ok());
        assert!(policy.validate(3, 1).is_ok());
        assert!(policy.validate(2, 3).is_ok());
    }

    #[test]
    fn policy_rejects_undecided_scores() {
        let policy = MatchPolicy::default();
        assert!(matches!(policy.validate(1, 1), Err(VolleyStatError::Constraint(_))));
        assert!(matches!(policy.validate(4, 1), Err(VolleyStatError::Constraint(_))));
        assert!(matches!(policy.validate(2, 2), Err(VolleyStatError::Constraint(_))));
    }

    #[test]
    fn stat_line_kills_bounded_by_attacks() {
        let mut line = StatLine {
            player_id: 1,
            attacks: 10,
            kills: 10,
            ..StatLine::default()
        };
        assert!(line.validate().is_ok());
        line.kills = 11;
        assert!(line.validate().is_err());
    }

    #[test]
    fn date_range_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let range = DateRange::new(start, end).unwrap();
        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
        assert!(DateRange::new(end, start).is_err());
    }

    #[test]
    fn match_maps_from_row() {
        let row = Row::new()
            .with("id", 4_i64)
            .with("team_id", 1_i64)
            .with("opponent", "Western Mustangs")
            .with("match_date", "2025-02-01")
            .with("sets_won", 3_i64)
            .with("sets_lost", 1_i64);
        let m = Match::try_from(&row).unwrap();
        assert_eq!(m.opponent, "Western Mustangs");
        assert_eq!(m.outcome(), MatchOutcome::Won);
    }

    #[test]
    fn blank_names_rejected() {
        assert!(require_name("team", "  ").is_err());
        assert_eq!(require_name("team", " Gryphons ").unwrap(), "Gryphons");
    }
}
