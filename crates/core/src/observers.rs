//! Built-in subscriber roles. Each keeps an inbox of what it accepted and
//! logs the delivery.

use std::cell::RefCell;
use std::fmt;

use chrono::NaiveDate;
use tracing::info;

use crate::domain::{MatchId, MatchOutcome, PlayerId, Position, TeamId};
use crate::events::{MatchObserver, MatchSummary, ObserverError, StatSummary};

/// Strategic summary for a coach: result plus win/loss trend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoachBriefing {
    pub match_id: MatchId,
    pub team_name: String,
    pub opponent: String,
    pub date: NaiveDate,
    pub outcome: MatchOutcome,
    pub sets_won: u32,
    pub sets_lost: u32,
    pub season_wins: u32,
    pub season_losses: u32,
    pub trend: String,
}

impl fmt::Display for CoachBriefing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}-{} vs {} on {}; season {}-{}, last {}",
            self.team_name,
            self.outcome.label(),
            self.sets_won,
            self.sets_lost,
            self.opponent,
            self.date,
            self.season_wins,
            self.season_losses,
            self.trend,
        )
    }
}

/// Stats a player sees: their own team's lines only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerUpdate {
    pub match_id: MatchId,
    pub opponent: String,
    pub date: NaiveDate,
    pub own_line: Option<StatSummary>,
    pub team_lines: Vec<StatSummary>,
}

pub struct CoachObserver {
    name: String,
    team_id: TeamId,
    inbox: RefCell<Vec<CoachBriefing>>,
}

impl CoachObserver {
    pub fn new(name: impl Into<String>, team_id: TeamId) -> Self {
        Self {
            name: name.into(),
            team_id,
            inbox: RefCell::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<CoachBriefing> {
        self.inbox.borrow().clone()
    }
}

impl MatchObserver for CoachObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_match_recorded(&self, summary: &MatchSummary) -> Result<(), ObserverError> {
        // Coaches follow their own team only
        if summary.record.team_id != self.team_id {
            return Ok(());
        }

        let record = &summary.record;
        let briefing = CoachBriefing {
            match_id: record.id,
            team_name: summary.team_name.clone(),
            opponent: record.opponent.clone(),
            date: record.date,
            outcome: record.outcome(),
            sets_won: record.sets_won,
            sets_lost: record.sets_lost,
            season_wins: summary.team_record.wins,
            season_losses: summary.team_record.losses,
            trend: summary.team_record.trend(),
        };
        info!(coach = %self.name, "{briefing}");
        self.inbox.borrow_mut().push(briefing);
        Ok(())
    }
}

pub struct PlayerObserver {
    name: String,
    position: Position,
    team_id: TeamId,
    player_id: Option<PlayerId>,
    inbox: RefCell<Vec<PlayerUpdate>>,
}

impl PlayerObserver {
    pub fn new(name: impl Into<String>, position: Position, team_id: TeamId) -> Self {
        Self {
            name: name.into(),
            position,
            team_id,
            player_id: None,
            inbox: RefCell::new(Vec::new()),
        }
    }

    /// Links the observer to a roster entry so its own line is picked out.
    pub fn for_player(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    pub fn received(&self) -> Vec<PlayerUpdate> {
        self.inbox.borrow().clone()
    }
}

impl MatchObserver for PlayerObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_match_recorded(&self, summary: &MatchSummary) -> Result<(), ObserverError> {
        if summary.record.team_id != self.team_id {
            return Ok(());
        }

        let team_lines: Vec<StatSummary> = summary
            .stats
            .iter()
            .filter(|s| s.team_id == self.team_id)
            .cloned()
            .collect();
        let own_line = self
            .player_id
            .and_then(|id| team_lines.iter().find(|s| s.player_id == id).cloned());

        info!(
            player = %self.name,
            position = %self.position,
            match_id = summary.record.id,
            lines = team_lines.len(),
            "player stats delivered"
        );
        self.inbox.borrow_mut().push(PlayerUpdate {
            match_id: summary.record.id,
            opponent: summary.record.opponent.clone(),
            date: summary.record.date,
            own_line,
            team_lines,
        });
        Ok(())
    }
}

/// Receives every match with the full record.
pub struct AnalystObserver {
    name: String,
    inbox: RefCell<Vec<MatchSummary>>,
}

impl AnalystObserver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inbox: RefCell::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<MatchSummary> {
        self.inbox.borrow().clone()
    }
}

impl MatchObserver for AnalystObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_match_recorded(&self, summary: &MatchSummary) -> Result<(), ObserverError> {
        info!(
            analyst = %self.name,
            match_id = summary.record.id,
            team = %summary.team_name,
            stat_lines = summary.stats.len(),
            "match record delivered"
        );
        self.inbox.borrow_mut().push(summary.clone());
        Ok(())
    }
}
