//! Application facade composing the relational store, the optional
//! spreadsheet export target and the match event bus.

use std::collections::BTreeSet;
use std::iter;
use std::rc::Rc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::domain::{
    require_name, DateRange, Match, MatchId, MatchPolicy, NewMatch, Player, PlayerId, Position,
    SessionId, StatId, StatLine, Team, TeamId,
};
use crate::error::{ExportFailure, Result, StorageError, VolleyStatError};
use crate::events::{EventBus, MatchObserver, MatchSummary, PublishReport, StatSummary, TeamRecord};
use crate::export::{self, ExportCounts, ExportReport, ReportExport, Sheet, SheetRows};
use crate::metrics::{needs_end_of_set_focus, PlayerMetrics, TeamAverages, TeamMetrics, TeamWeakness};
use crate::ports::{Row, StorageAdapter, Value};
use crate::training::{SessionType, TrainingSession, TrainingSessionFactory};

const RECENT_LIMIT: usize = 5;

/// A match persisted by [`VolleyStatSystem::record_match`].
#[derive(Debug)]
pub struct RecordedMatch {
    pub record: Match,
    pub stat_ids: Vec<StatId>,
    pub notifications: PublishReport,
}

/// One stat line joined with the match it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerMatchLine {
    pub match_id: MatchId,
    pub opponent: String,
    pub date: NaiveDate,
    pub line: StatLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerReport {
    pub player: Player,
    pub metrics: PlayerMetrics,
    pub recent: Vec<PlayerMatchLine>,
    pub recommendations: Vec<&'static str>,
}

/// A training session read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub id: SessionId,
    pub session: TrainingSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopPerformer {
    pub player_id: PlayerId,
    pub name: String,
    pub position: Position,
    pub kills: u32,
    pub blocks: u32,
    pub aces: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamReport {
    pub team: Team,
    pub metrics: TeamMetrics,
    pub recent: Vec<Match>,
    pub top_performers: Vec<TopPerformer>,
    pub recommendations: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecommendation {
    pub player: Player,
    pub metrics: PlayerMetrics,
    pub focus: SessionType,
    pub drills: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecommendation {
    pub team: Team,
    /// `None` until the team has recorded stats.
    pub weakness: Option<TeamWeakness>,
    pub end_of_set_focus: bool,
}

pub struct VolleyStatSystem {
    store: Box<dyn StorageAdapter>,
    spreadsheet: Option<Box<dyn StorageAdapter>>,
    events: EventBus,
    policy: MatchPolicy,
}

impl VolleyStatSystem {
    /// Connects the primary store and builds the system around it.
    pub fn open(mut store: Box<dyn StorageAdapter>, policy: MatchPolicy) -> Result<Self> {
        if let Err(e) = store.connect() {
            store.close();
            return Err(e.into());
        }
        info!(store = store.name(), "primary store connected");
        Ok(Self {
            store,
            spreadsheet: None,
            events: EventBus::new(),
            policy,
        })
    }

    pub fn subscribe(&mut self, observer: Rc<dyn MatchObserver>) -> bool {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, observer: &Rc<dyn MatchObserver>) -> bool {
        self.events.unsubscribe(observer)
    }

    /// Connects `adapter` and keeps it as the export target. A connection
    /// failure leaves any previous target in place.
    pub fn attach_spreadsheet(&mut self, mut adapter: Box<dyn StorageAdapter>) -> Result<()> {
        if let Err(e) = adapter.connect() {
            warn!(adapter = adapter.name(), error = %e, "spreadsheet unavailable");
            adapter.close();
            return Err(e.into());
        }
        if let Some(mut previous) = self.spreadsheet.replace(adapter) {
            previous.close();
        }
        Ok(())
    }

    pub fn detach_spreadsheet(&mut self) {
        if let Some(mut sheet) = self.spreadsheet.take() {
            sheet.close();
        }
    }

    pub fn has_spreadsheet(&self) -> bool {
        self.spreadsheet.is_some()
    }

    /// Releases both adapters. Also runs on drop.
    pub fn shutdown(&mut self) {
        self.detach_spreadsheet();
        self.store.close();
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    pub fn add_team(&mut self, name: &str) -> Result<TeamId> {
        let name = require_name("team", name)?;
        let outcome = self
            .store
            .write_data("INSERT INTO teams (name) VALUES (?1)", &[Value::from(name.as_str())])?;
        let id = generated_id(outcome.last_insert_id, "teams")?;
        info!(team_id = id, %name, "team added");
        Ok(id)
    }

    pub fn add_player(&mut self, name: &str, position: Position, team_id: TeamId) -> Result<PlayerId> {
        let name = require_name("player", name)?;
        self.team(team_id)?;
        let outcome = self.store.write_data(
            "INSERT INTO players (name, position, team_id) VALUES (?1, ?2, ?3)",
            &[Value::from(name.as_str()), Value::from(position.as_str()), Value::from(team_id)],
        )?;
        let id = generated_id(outcome.last_insert_id, "players")?;
        info!(player_id = id, %name, %position, team_id, "player added");
        Ok(id)
    }

    /// Stores the match and its stat lines atomically, then notifies subscribers.
    ///
    /// Every read happens before the transaction, so an `Err` always means
    /// nothing was stored.
    pub fn record_match(&mut self, new_match: NewMatch, stats: &[StatLine]) -> Result<RecordedMatch> {
        let opponent = require_name("opponent", &new_match.opponent)?;
        self.policy.validate(new_match.sets_won, new_match.sets_lost)?;
        let team = self.team(new_match.team_id)?;

        let mut seen = BTreeSet::new();
        let mut lines = Vec::with_capacity(stats.len());
        for line in stats {
            line.validate()?;
            if !seen.insert(line.player_id) {
                return Err(VolleyStatError::Constraint(format!(
                    "player {} listed twice for one match",
                    line.player_id
                )));
            }
            let player = self.player(line.player_id)?;
            if player.team_id != team.id {
                return Err(VolleyStatError::Constraint(format!(
                    "player {} ({}) does not play for {}",
                    player.id, player.name, team.name
                )));
            }
            lines.push(StatSummary {
                player_id: player.id,
                player_name: player.name,
                team_id: player.team_id,
                line: *line,
            });
        }
        let previous = self.team_matches(team.id)?;

        let (match_id, stat_ids) = self.in_transaction(|store| {
            let outcome = store.write_data(
                "INSERT INTO matches (team_id, opponent, match_date, sets_won, sets_lost) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    Value::from(team.id),
                    Value::from(opponent.as_str()),
                    Value::from(new_match.date),
                    Value::from(new_match.sets_won),
                    Value::from(new_match.sets_lost),
                ],
            )?;
            let match_id = generated_id(outcome.last_insert_id, "matches")?;

            let mut stat_ids = Vec::with_capacity(stats.len());
            for line in stats {
                let outcome = store.write_data(
                    "INSERT INTO player_stats \
                     (player_id, match_id, attacks, kills, errors, blocks, digs, aces) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    &[
                        Value::from(line.player_id),
                        Value::from(match_id),
                        Value::from(line.attacks),
                        Value::from(line.kills),
                        Value::from(line.errors),
                        Value::from(line.blocks),
                        Value::from(line.digs),
                        Value::from(line.aces),
                    ],
                )?;
                stat_ids.push(generated_id(outcome.last_insert_id, "player_stats")?);
            }
            Ok((match_id, stat_ids))
        })?;

        let record = Match {
            id: match_id,
            team_id: team.id,
            opponent,
            date: new_match.date,
            sets_won: new_match.sets_won,
            sets_lost: new_match.sets_lost,
        };
        info!(
            match_id,
            team = %team.name,
            opponent = %record.opponent,
            sets_won = record.sets_won,
            sets_lost = record.sets_lost,
            stat_lines = stat_ids.len(),
            "match recorded"
        );

        let mut history: Vec<&Match> = previous.iter().chain(iter::once(&record)).collect();
        history.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        let team_record = TeamRecord::from_outcomes(history.iter().map(|m| m.outcome()));
        let summary = MatchSummary {
            record: record.clone(),
            team_name: team.name,
            stats: lines,
            team_record,
        };
        let notifications = self.events.publish(&summary);

        Ok(RecordedMatch {
            record,
            stat_ids,
            notifications,
        })
    }

    /// Builds the session through the factory, then stores it.
    pub fn record_training_session(
        &mut self,
        tag: &str,
        team_id: TeamId,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<(SessionId, TrainingSession)> {
        let session = TrainingSessionFactory::create(tag, team_id, date, duration_minutes)?;
        self.team(team_id)?;

        let outcome = self.store.write_data(
            "INSERT INTO training_sessions (team_id, session_type, session_date, duration) \
             VALUES (?1, ?2, ?3, ?4)",
            &[
                Value::from(team_id),
                Value::from(session.session_type().as_str()),
                Value::from(date),
                Value::from(duration_minutes),
            ],
        )?;
        let id = generated_id(outcome.last_insert_id, "training_sessions")?;
        info!(session_id = id, team_id, session_type = %session.session_type(), %date, "training session recorded");
        Ok((id, session))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn team(&self, team_id: TeamId) -> Result<Team> {
        let rows = self
            .store
            .read_data("SELECT id, name FROM teams WHERE id = ?1", &[Value::from(team_id)])?;
        match rows.first() {
            Some(row) => Ok(Team::try_from(row)?),
            None => Err(VolleyStatError::NotFound { entity: "team", id: team_id }),
        }
    }

    pub fn teams(&self) -> Result<Vec<Team>> {
        let rows = self.store.read_data("SELECT id, name FROM teams ORDER BY id", &[])?;
        map_rows(&rows)
    }

    pub fn player(&self, player_id: PlayerId) -> Result<Player> {
        let rows = self.store.read_data(
            "SELECT id, name, position, team_id FROM players WHERE id = ?1",
            &[Value::from(player_id)],
        )?;
        match rows.first() {
            Some(row) => Ok(Player::try_from(row)?),
            None => Err(VolleyStatError::NotFound { entity: "player", id: player_id }),
        }
    }

    pub fn players(&self, team_id: TeamId) -> Result<Vec<Player>> {
        let rows = self.store.read_data(
            "SELECT id, name, position, team_id FROM players WHERE team_id = ?1 ORDER BY id",
            &[Value::from(team_id)],
        )?;
        map_rows(&rows)
    }

    /// A player's stat lines, most recent match first.
    pub fn player_stats(&self, player_id: PlayerId) -> Result<Vec<PlayerMatchLine>> {
        let rows = self.store.read_data(
            "SELECT ps.match_id, ps.player_id, ps.attacks, ps.kills, ps.errors, ps.blocks, \
                    ps.digs, ps.aces, m.opponent, m.match_date \
             FROM player_stats ps \
             JOIN matches m ON ps.match_id = m.id \
             WHERE ps.player_id = ?1 \
             ORDER BY m.match_date DESC, m.id DESC",
            &[Value::from(player_id)],
        )?;
        rows.iter()
            .map(|row| -> Result<PlayerMatchLine> {
                Ok(PlayerMatchLine {
                    match_id: row.integer("match_id")?,
                    opponent: row.text("opponent")?.to_string(),
                    date: row.date("match_date")?,
                    line: StatLine::try_from(row)?,
                })
            })
            .collect()
    }

    /// A team's matches, most recent first.
    pub fn team_matches(&self, team_id: TeamId) -> Result<Vec<Match>> {
        let rows = self.store.read_data(
            "SELECT id, team_id, opponent, match_date, sets_won, sets_lost FROM matches \
             WHERE team_id = ?1 ORDER BY match_date DESC, id DESC",
            &[Value::from(team_id)],
        )?;
        map_rows(&rows)
    }

    /// A team's training sessions, most recent first. Each row is rebuilt
    /// through the factory so it carries its drills.
    pub fn training_sessions(&self, team_id: TeamId) -> Result<Vec<StoredSession>> {
        let rows = self.store.read_data(
            "SELECT id, team_id, session_type, session_date, duration FROM training_sessions \
             WHERE team_id = ?1 ORDER BY session_date DESC, id DESC",
            &[Value::from(team_id)],
        )?;
        rows.iter()
            .map(|row| -> Result<StoredSession> {
                let session = TrainingSessionFactory::create(
                    row.text("session_type")?,
                    row.integer("team_id")?,
                    row.date("session_date")?,
                    row.count("duration")?,
                )?;
                Ok(StoredSession {
                    id: row.integer("id")?,
                    session,
                })
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Reports and recommendations
    // -------------------------------------------------------------------------

    pub fn player_report(&self, player_id: PlayerId) -> Result<PlayerReport> {
        let player = self.player(player_id)?;
        let mut history = self.player_stats(player_id)?;
        let metrics = PlayerMetrics::from_lines(history.iter().map(|h| &h.line));
        history.truncate(RECENT_LIMIT);
        Ok(PlayerReport {
            player,
            recommendations: metrics.recommendations(),
            metrics,
            recent: history,
        })
    }

    pub fn team_report(&self, team_id: TeamId) -> Result<TeamReport> {
        let team = self.team(team_id)?;
        let mut matches = self.team_matches(team_id)?;
        let metrics = TeamMetrics::from_matches(&matches);
        matches.truncate(RECENT_LIMIT);

        let rows = self.store.read_data(
            "SELECT p.id, p.name, p.position, \
                    SUM(ps.kills) AS kills, SUM(ps.blocks) AS blocks, SUM(ps.aces) AS aces \
             FROM player_stats ps \
             JOIN players p ON ps.player_id = p.id \
             WHERE p.team_id = ?1 \
             GROUP BY p.id, p.name, p.position \
             ORDER BY kills DESC, p.id \
             LIMIT 3",
            &[Value::from(team_id)],
        )?;
        let top_performers = rows
            .iter()
            .map(|row| -> std::result::Result<TopPerformer, StorageError> {
                let position = row
                    .text("position")?
                    .parse()
                    .map_err(|e: VolleyStatError| StorageError::column("position", e.to_string()))?;
                Ok(TopPerformer {
                    player_id: row.integer("id")?,
                    name: row.text("name")?.to_string(),
                    position,
                    kills: row.count("kills")?,
                    blocks: row.count("blocks")?,
                    aces: row.count("aces")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(TeamReport {
            team,
            recommendations: metrics.recommendations(),
            metrics,
            recent: matches,
            top_performers,
        })
    }

    pub fn player_training_recommendation(&self, player_id: PlayerId) -> Result<PlayerRecommendation> {
        let player = self.player(player_id)?;
        let history = self.player_stats(player_id)?;
        let metrics = PlayerMetrics::from_lines(history.iter().map(|h| &h.line));
        let focus = metrics.weakest_area();
        Ok(PlayerRecommendation {
            player,
            metrics,
            focus,
            drills: focus.drills(),
        })
    }

    pub fn team_training_recommendation(&self, team_id: TeamId) -> Result<TeamRecommendation> {
        let team = self.team(team_id)?;
        let rows = self.store.read_data(
            "SELECT AVG(ps.kills) AS kills, AVG(ps.blocks) AS blocks, \
                    AVG(ps.aces) AS aces, AVG(ps.digs) AS digs \
             FROM player_stats ps \
             JOIN players p ON ps.player_id = p.id \
             WHERE p.team_id = ?1",
            &[Value::from(team_id)],
        )?;
        let averages = match rows.first() {
            Some(row) => TeamAverages {
                kills: row.optional_real("kills")?,
                blocks: row.optional_real("blocks")?,
                aces: row.optional_real("aces")?,
                digs: row.optional_real("digs")?,
            },
            None => TeamAverages::default(),
        };
        let matches = self.team_matches(team_id)?;
        Ok(TeamRecommendation {
            team,
            weakness: averages.weakest(),
            end_of_set_focus: needs_end_of_set_focus(&matches),
        })
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Writes every sheet in [`Sheet::ORDER`].
    ///
    /// Matches, stats and training sessions are limited to `range`. Each sheet is an independent
    /// write; the first rejected write ends the export with
    /// [`VolleyStatError::PartialExport`] and earlier sheets stay written.
    pub fn export_report(&self, range: DateRange) -> Result<ExportReport> {
        let sheet = self.export_target()?;

        let sheets = self.build_sheets(range)?;

        let mut written = Vec::with_capacity(sheets.len());
        for (idx, (target, rows)) in sheets.iter().enumerate() {
            debug!(sheet = %target, rows = rows.len(), "writing sheet");
            match sheet.write_rows(&target.anchor(), rows) {
                Ok(_) => written.push((*target, rows.len())),
                Err(e) => {
                    let failure = ExportFailure {
                        succeeded: written.iter().map(|(s, _)| *s).collect(),
                        failed: *target,
                        reason: e.to_string(),
                        not_attempted: sheets.iter().skip(idx + 1).map(|(s, _)| *s).collect(),
                    };
                    warn!(%failure, "export stopped");
                    return Err(VolleyStatError::PartialExport(failure));
                }
            }
        }

        info!(sheets = written.len(), start = %range.start(), end = %range.end(), "report exported");
        Ok(ExportReport { written })
    }

    /// Writes one player's report to its own `Player_<id>` sheet.
    pub fn export_player_report(&self, player_id: PlayerId) -> Result<ReportExport> {
        let sheet = self.export_target()?;
        let report = self.player_report(player_id)?;
        let anchor = export::player_report_anchor(player_id);
        let rows = export::player_report_sheet(&report);
        sheet.write_rows(&anchor, &rows)?;
        info!(player_id, %anchor, rows = rows.len(), "player report exported");
        Ok(ReportExport { anchor, rows: rows.len() })
    }

    /// Writes one team's report to its own `Team_<id>` sheet.
    pub fn export_team_report(&self, team_id: TeamId) -> Result<ReportExport> {
        let sheet = self.export_target()?;
        let report = self.team_report(team_id)?;
        let anchor = export::team_report_anchor(team_id);
        let rows = export::team_report_sheet(&report);
        sheet.write_rows(&anchor, &rows)?;
        info!(team_id, %anchor, rows = rows.len(), "team report exported");
        Ok(ReportExport { anchor, rows: rows.len() })
    }

    fn export_target(&self) -> Result<&dyn StorageAdapter> {
        self.spreadsheet
            .as_deref()
            .ok_or(VolleyStatError::SpreadsheetUnavailable)
    }

    fn build_sheets(&self, range: DateRange) -> Result<Vec<(Sheet, SheetRows)>> {
        let bounds = [Value::from(range.start()), Value::from(range.end())];

        let teams = self.store.read_data("SELECT id, name FROM teams ORDER BY id", &[])?;
        let players = self.store.read_data(
            "SELECT p.id, p.name, p.position, t.name AS team \
             FROM players p JOIN teams t ON p.team_id = t.id \
             ORDER BY p.id",
            &[],
        )?;
        let matches = self.store.read_data(
            "SELECT m.id, t.name AS team, m.opponent, m.match_date, m.sets_won, m.sets_lost \
             FROM matches m JOIN teams t ON m.team_id = t.id \
             WHERE m.match_date BETWEEN ?1 AND ?2 \
             ORDER BY m.match_date DESC, m.id DESC",
            &bounds,
        )?;
        let stats = self.store.read_data(
            "SELECT ps.id, p.name AS player, t.name AS team, m.opponent, m.match_date, \
                    ps.attacks, ps.kills, ps.errors, ps.blocks, ps.digs, ps.aces \
             FROM player_stats ps \
             JOIN players p ON ps.player_id = p.id \
             JOIN matches m ON ps.match_id = m.id \
             JOIN teams t ON p.team_id = t.id \
             WHERE m.match_date BETWEEN ?1 AND ?2 \
             ORDER BY m.match_date DESC, ps.id",
            &bounds,
        )?;
        let standings = self.store.read_data(
            "SELECT t.id, t.name, \
                    COALESCE(SUM(CASE WHEN m.sets_won > m.sets_lost THEN 1 ELSE 0 END), 0) AS wins, \
                    COALESCE(SUM(CASE WHEN m.sets_won < m.sets_lost THEN 1 ELSE 0 END), 0) AS losses \
             FROM teams t \
             LEFT JOIN matches m ON m.team_id = t.id AND m.match_date BETWEEN ?1 AND ?2 \
             GROUP BY t.id, t.name \
             ORDER BY t.id",
            &bounds,
        )?;
        let top_performers = self.store.read_data(
            "SELECT p.name, t.name AS team, \
                    SUM(ps.kills) AS kills, SUM(ps.blocks) AS blocks, SUM(ps.aces) AS aces \
             FROM player_stats ps \
             JOIN players p ON ps.player_id = p.id \
             JOIN matches m ON ps.match_id = m.id \
             JOIN teams t ON p.team_id = t.id \
             WHERE m.match_date BETWEEN ?1 AND ?2 \
             GROUP BY p.id, p.name, t.name \
             ORDER BY kills DESC, p.id \
             LIMIT 3",
            &bounds,
        )?;
        let sessions = self.store.read_data(
            "SELECT ts.id, t.name AS team, ts.session_type, ts.session_date, ts.duration \
             FROM training_sessions ts JOIN teams t ON ts.team_id = t.id \
             WHERE ts.session_date BETWEEN ?1 AND ?2 \
             ORDER BY ts.session_date DESC, ts.id DESC",
            &bounds,
        )?;

        let counts = ExportCounts {
            teams: teams.len(),
            players: players.len(),
            matches: matches.len(),
            stat_records: stats.len(),
            training_sessions: sessions.len(),
        };

        Ok(vec![
            (Sheet::Teams, export::teams_sheet(&teams)?),
            (Sheet::Players, export::players_sheet(&players)?),
            (Sheet::Matches, export::matches_sheet(&matches)?),
            (Sheet::PlayerStats, export::player_stats_sheet(&stats)?),
            (Sheet::TrainingSessions, export::training_sessions_sheet(&sessions)?),
            (
                Sheet::Summary,
                export::summary_sheet(Local::now(), range, counts, &standings, &top_performers)?,
            ),
        ])
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn in_transaction<T>(
        &self,
        work: impl FnOnce(&dyn StorageAdapter) -> Result<T>,
    ) -> Result<T> {
        self.store.begin()?;
        let result = work(&*self.store).and_then(|value| {
            self.store.commit()?;
            Ok(value)
        });
        if result.is_err() {
            if let Err(e) = self.store.rollback() {
                warn!(error = %e, "rollback failed");
            }
        }
        result
    }
}

impl Drop for VolleyStatSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn generated_id(id: Option<i64>, table: &str) -> Result<i64> {
    id.ok_or_else(|| {
        VolleyStatError::Storage(StorageError::Query(format!("insert into {table} returned no id")))
    })
}

fn map_rows<T>(rows: &[Row]) -> Result<Vec<T>>
where
    T: for<'a> TryFrom<&'a Row, Error = StorageError>,
{
    rows.iter()
        .map(|row| T::try_from(row).map_err(VolleyStatError::from))
        .collect()
}
