//! Training sessions and the factory that builds them from a focus-area tag.
//!
//! Each variant carries the same session details plus its own setup data and
//! a fixed drill list. Variant selection is a closed [`SessionType`] enum;
//! the only runtime failure is an unrecognised tag.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::{PlayerId, TeamId};
use crate::error::VolleyStatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionType {
    Serving,
    Attacking,
    Blocking,
}

impl SessionType {
    pub const ALL: [SessionType; 3] = [SessionType::Serving, SessionType::Attacking, SessionType::Blocking];

    /// Tag stored in `training_sessions.session_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Serving => "serving",
            SessionType::Attacking => "attacking",
            SessionType::Blocking => "blocking",
        }
    }

    pub fn drills(&self) -> &'static [&'static str] {
        match self {
            SessionType::Serving => SERVING_DRILLS,
            SessionType::Attacking => ATTACKING_DRILLS,
            SessionType::Blocking => BLOCKING_DRILLS,
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = VolleyStatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        SessionType::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| VolleyStatError::UnknownSessionType(s.to_string()))
    }
}

const SERVING_DRILLS: &[&str] = &[
    "Zone serving: target specific areas of the court",
    "Pressure serving: consecutive successful serves under pressure",
    "Service variation: practice float, topspin and jump serves",
];

const ATTACKING_DRILLS: &[&str] = &[
    "Target hitting: set up targets in different court positions",
    "Line vs cross shots: practice both attack angles",
    "Quick attacks: faster approaches and connection with the setter",
];

const BLOCKING_DRILLS: &[&str] = &[
    "Shadow blocking: follow the attacker's movement without the ball",
    "Reaction drills: quick lateral movement across the net",
    "Block touch training: hand position and penetration",
];

/// Attempts and successes a player logged during practice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PracticeTally {
    pub attempts: u32,
    pub aces: u32,
    pub kills: u32,
    pub errors: u32,
    pub blocks: u32,
}

impl PracticeTally {
    fn merge(&mut self, other: PracticeTally) {
        self.attempts = self.attempts.saturating_add(other.attempts);
        self.aces = self.aces.saturating_add(other.aces);
        self.kills = self.kills.saturating_add(other.kills);
        self.errors = self.errors.saturating_add(other.errors);
        self.blocks = self.blocks.saturating_add(other.blocks);
    }
}

/// Fields every session variant shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    pub team_id: TeamId,
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub tallies: BTreeMap<PlayerId, PracticeTally>,
}

impl SessionDetails {
    fn totals(&self) -> PracticeTally {
        let mut total = PracticeTally::default();
        for tally in self.tallies.values() {
            total.merge(*tally);
        }
        total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingSession {
    pub details: SessionDetails,
    pub target_zones: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackingSession {
    pub details: SessionDetails,
    pub positions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingSession {
    pub details: SessionDetails,
    pub block_types: Vec<String>,
}

/// What every session variant can tell about its focus area.
pub trait TrainingFocus {
    fn session_type(&self) -> SessionType;

    fn details(&self) -> &SessionDetails;

    fn details_mut(&mut self) -> &mut SessionDetails;

    /// Success rate over all logged attempts, as a percentage.
    fn efficiency(&self) -> f64;

    fn drills(&self) -> &'static [&'static str] {
        self.session_type().drills()
    }
}

fn percentage(numerator: f64, attempts: u32) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    numerator / f64::from(attempts) * 100.0
}

impl TrainingFocus for ServingSession {
    fn session_type(&self) -> SessionType {
        SessionType::Serving
    }

    fn details(&self) -> &SessionDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut SessionDetails {
        &mut self.details
    }

    fn efficiency(&self) -> f64 {
        let t = self.details.totals();
        percentage(f64::from(t.aces), t.attempts)
    }
}

impl TrainingFocus for AttackingSession {
    fn session_type(&self) -> SessionType {
        SessionType::Attacking
    }

    fn details(&self) -> &SessionDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut SessionDetails {
        &mut self.details
    }

    fn efficiency(&self) -> f64 {
        let t = self.details.totals();
        percentage(f64::from(t.kills) - f64::from(t.errors), t.attempts)
    }
}

impl TrainingFocus for BlockingSession {
    fn session_type(&self) -> SessionType {
        SessionType::Blocking
    }

    fn details(&self) -> &SessionDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut SessionDetails {
        &mut self.details
    }

    fn efficiency(&self) -> f64 {
        let t = self.details.totals();
        percentage(f64::from(t.blocks), t.attempts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingSession {
    Serving(ServingSession),
    Attacking(AttackingSession),
    Blocking(BlockingSession),
}

impl TrainingSession {
    fn focus(&self) -> &dyn TrainingFocus {
        match self {
            TrainingSession::Serving(s) => s,
            TrainingSession::Attacking(s) => s,
            TrainingSession::Blocking(s) => s,
        }
    }

    fn focus_mut(&mut self) -> &mut dyn TrainingFocus {
        match self {
            TrainingSession::Serving(s) => s,
            TrainingSession::Attacking(s) => s,
            TrainingSession::Blocking(s) => s,
        }
    }

    pub fn session_type(&self) -> SessionType {
        self.focus().session_type()
    }

    pub fn details(&self) -> &SessionDetails {
        self.focus().details()
    }

    pub fn drills(&self) -> &'static [&'static str] {
        self.focus().drills()
    }

    pub fn efficiency(&self) -> f64 {
        self.focus().efficiency()
    }

    /// Adds a player's practice numbers; repeated calls accumulate.
    pub fn record_tally(&mut self, player_id: PlayerId, tally: PracticeTally) {
        self.focus_mut()
            .details_mut()
            .tallies
            .entry(player_id)
            .or_default()
            .merge(tally);
    }
}

pub struct TrainingSessionFactory;

impl TrainingSessionFactory {
    /// Builds the session variant named by `tag` ("serving", "attacking", "blocking").
    pub fn create(
        tag: &str,
        team_id: TeamId,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<TrainingSession, VolleyStatError> {
        let session_type = tag.parse::<SessionType>()?;
        Self::create_typed(session_type, team_id, date, duration_minutes)
    }

    pub fn create_typed(
        session_type: SessionType,
        team_id: TeamId,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<TrainingSession, VolleyStatError> {
        if duration_minutes == 0 {
            return Err(VolleyStatError::Constraint(
                "training session duration must be positive".to_string(),
            ));
        }

        let details = SessionDetails {
            team_id,
            date,
            duration_minutes,
            tallies: BTreeMap::new(),
        };

        Ok(match session_type {
            SessionType::Serving => TrainingSession::Serving(ServingSession {
                details,
                target_zones: strings(&["Zone 1", "Zone 5", "Zone 6"]),
            }),
            SessionType::Attacking => TrainingSession::Attacking(AttackingSession {
                details,
                positions: strings(&["Position 2", "Position 4"]),
            }),
            SessionType::Blocking => TrainingSession::Blocking(BlockingSession {
                details,
                block_types: strings(&["Solo", "Double"]),
            }),
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
