//! Performance metrics and the training advice derived from them.

use crate::domain::{Match, MatchOutcome, StatLine};
use crate::training::SessionType;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerMetrics {
    /// (kills - errors) / attacks, as a percentage.
    pub attacking_efficiency: f64,
    /// Blocks per match played.
    pub blocking_average: f64,
    pub serving_aces: u32,
}

impl PlayerMetrics {
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a StatLine>) -> Self {
        let mut matches = 0_u32;
        let (mut attacks, mut kills, mut errors, mut blocks, mut aces) = (0_u32, 0_u32, 0_u32, 0_u32, 0_u32);
        for line in lines {
            matches += 1;
            attacks = attacks.saturating_add(line.attacks);
            kills = kills.saturating_add(line.kills);
            errors = errors.saturating_add(line.errors);
            blocks = blocks.saturating_add(line.blocks);
            aces = aces.saturating_add(line.aces);
        }

        let attacking_efficiency = if attacks > 0 {
            (f64::from(kills) - f64::from(errors)) / f64::from(attacks) * 100.0
        } else {
            0.0
        };
        let blocking_average = if matches > 0 {
            f64::from(blocks) / f64::from(matches)
        } else {
            0.0
        };

        Self {
            attacking_efficiency: round2(attacking_efficiency),
            blocking_average: round2(blocking_average),
            serving_aces: aces,
        }
    }

    pub fn recommendations(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.attacking_efficiency < 20.0 {
            out.push("Focus on attacking accuracy and shot selection");
        }
        if self.blocking_average < 1.0 {
            out.push("Work on blocking technique and timing");
        }
        if self.serving_aces < 3 {
            out.push("Practice aggressive serving with targeting");
        }
        out
    }

    /// Weakest skill, scaling blocks and aces so they compare with a percentage.
    /// Ties resolve in the order attacking, blocking, serving.
    pub fn weakest_area(&self) -> SessionType {
        let scores = [
            (SessionType::Attacking, self.attacking_efficiency),
            (SessionType::Blocking, self.blocking_average * 25.0),
            (SessionType::Serving, f64::from(self.serving_aces) * 10.0),
        ];
        let mut weakest = scores[0];
        for candidate in &scores[1..] {
            if candidate.1 < weakest.1 {
                weakest = *candidate;
            }
        }
        weakest.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamMetrics {
    pub matches_played: u32,
    pub matches_won: u32,
    pub win_percentage: f64,
    pub set_win_percentage: f64,
}

impl TeamMetrics {
    pub fn from_matches<'a>(matches: impl IntoIterator<Item = &'a Match>) -> Self {
        let mut metrics = TeamMetrics::default();
        let (mut sets_won, mut sets_played) = (0_u32, 0_u32);
        for m in matches {
            metrics.matches_played += 1;
            if m.outcome() == MatchOutcome::Won {
                metrics.matches_won += 1;
            }
            sets_won = sets_won.saturating_add(m.sets_won);
            sets_played = sets_played.saturating_add(m.sets_won.saturating_add(m.sets_lost));
        }

        if metrics.matches_played > 0 {
            metrics.win_percentage =
                round2(f64::from(metrics.matches_won) / f64::from(metrics.matches_played) * 100.0);
        }
        if sets_played > 0 {
            metrics.set_win_percentage = round2(f64::from(sets_won) / f64::from(sets_played) * 100.0);
        }
        metrics
    }

    pub fn recommendations(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.win_percentage < 50.0 {
            out.push("Focus on overall team cohesion and communication");
        }
        if self.set_win_percentage < 40.0 {
            out.push("Work on closing out sets and maintaining consistency");
        }
        out
    }
}

/// Team-wide weak spot, from per-line averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamWeakness {
    Attacking,
    Blocking,
    Serving,
    Defense,
}

impl TeamWeakness {
    pub fn label(self) -> &'static str {
        match self {
            TeamWeakness::Attacking => "Attacking",
            TeamWeakness::Blocking => "Blocking",
            TeamWeakness::Serving => "Serving",
            TeamWeakness::Defense => "Defense",
        }
    }

    /// Training variant that targets this weakness. Defense has none.
    pub fn session_type(self) -> Option<SessionType> {
        match self {
            TeamWeakness::Attacking => Some(SessionType::Attacking),
            TeamWeakness::Blocking => Some(SessionType::Blocking),
            TeamWeakness::Serving => Some(SessionType::Serving),
            TeamWeakness::Defense => None,
        }
    }

    pub fn focus(self) -> &'static [&'static str] {
        match self {
            TeamWeakness::Attacking => &[
                "Offensive combinations and plays",
                "Setter-hitter connection drills",
                "Attack coverage exercises",
            ],
            TeamWeakness::Blocking => &[
                "Block timing and coordination",
                "Double block formation drills",
                "Block defense transition practice",
            ],
            TeamWeakness::Serving => &[
                "Targeted service practice to exploit opponent weaknesses",
                "Service pressure drills",
                "Service and reception coordination",
            ],
            TeamWeakness::Defense => &[
                "Team defense formation drills",
                "Dig to target exercises",
                "Transition from defense to offense practice",
            ],
        }
    }
}

/// Average per stat line across a team. `None` when the team has no lines.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamAverages {
    pub kills: Option<f64>,
    pub blocks: Option<f64>,
    pub aces: Option<f64>,
    pub digs: Option<f64>,
}

impl TeamAverages {
    pub fn weakest(&self) -> Option<TeamWeakness> {
        [
            (TeamWeakness::Attacking, self.kills),
            (TeamWeakness::Blocking, self.blocks),
            (TeamWeakness::Serving, self.aces),
            (TeamWeakness::Defense, self.digs),
        ]
        .into_iter()
        .filter_map(|(w, avg)| avg.map(|a| (w, a)))
        .fold(None, |best: Option<(TeamWeakness, f64)>, (w, a)| match best {
            Some((_, b)) if b <= a => best,
            _ => Some((w, a)),
        })
        .map(|(w, _)| w)
    }
}

/// Share of close losses above which end-of-set work is suggested.
pub const CLOSE_SET_THRESHOLD: f64 = 0.3;

/// Whether a team keeps dropping tight matches: losses by a single set, as a
/// share of matches played.
pub fn needs_end_of_set_focus(matches: &[Match]) -> bool {
    if matches.is_empty() {
        return false;
    }
    let close_losses = matches
        .iter()
        .filter(|m| m.outcome() == MatchOutcome::Lost && m.sets_lost == m.sets_won + 1)
        .count();
    let close = u32::try_from(close_losses).unwrap_or(u32::MAX);
    let played = u32::try_from(matches.len()).unwrap_or(u32::MAX);
    f64::from(close) / f64::from(played) > CLOSE_SET_THRESHOLD
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn line(attacks: u32, kills: u32, errors: u32, blocks: u32, aces: u32) -> StatLine {
        StatLine {
            player_id: 1,
            attacks,
            kills,
            errors,
            blocks,
            digs: 0,
            aces,
        }
    }

    fn game(sets_won: u32, sets_lost: u32) -> Match {
        Match {
            id: 1,
            team_id: 1,
            opponent: "Guelph Gryphons".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            sets_won,
            sets_lost,
        }
    }

    #[test]
    fn player_metrics_from_lines() {
        let lines = [line(30, 15, 3, 2, 1), line(20, 8, 2, 1, 1)];
        let m = PlayerMetrics::from_lines(&lines);
        assert_eq!(m.attacking_efficiency, 36.0);
        assert_eq!(m.blocking_average, 1.5);
        assert_eq!(m.serving_aces, 2);
        assert_eq!(m.recommendations(), vec!["Practice aggressive serving with targeting"]);
    }

    #[test]
    fn player_metrics_empty() {
        let m = PlayerMetrics::from_lines(&[]);
        assert_eq!(m, PlayerMetrics::default());
        assert_eq!(m.recommendations().len(), 3);
    }

    #[test]
    fn weakest_area_uses_scaled_scores() {
        let m = PlayerMetrics {
            attacking_efficiency: 35.0,
            blocking_average: 0.4,
            serving_aces: 5,
        };
        assert_eq!(m.weakest_area(), SessionType::Blocking);

        let m = PlayerMetrics {
            attacking_efficiency: 5.0,
            blocking_average: 2.0,
            serving_aces: 5,
        };
        assert_eq!(m.weakest_area(), SessionType::Attacking);
    }

    #[test]
    fn team_metrics_from_matches() {
        let matches = [game(3, 1), game(1, 3), game(3, 2)];
        let m = TeamMetrics::from_matches(&matches);
        assert_eq!(m.matches_played, 3);
        assert_eq!(m.matches_won, 2);
        assert_eq!(m.win_percentage, 66.67);
        assert_eq!(m.set_win_percentage, 53.85);
        assert!(m.recommendations().is_empty());
    }

    #[test]
    fn team_averages_pick_lowest() {
        let avg = TeamAverages {
            kills: Some(9.0),
            blocks: Some(1.2),
            aces: Some(0.8),
            digs: Some(6.0),
        };
        assert_eq!(avg.weakest(), Some(TeamWeakness::Serving));
        assert_eq!(TeamAverages::default().weakest(), None);
        assert_eq!(TeamWeakness::Defense.session_type(), None);
    }

    #[test]
    fn end_of_set_focus_on_close_losses() {
        assert!(needs_end_of_set_focus(&[game(2, 3), game(2, 3)]));
        assert!(!needs_end_of_set_focus(&[game(3, 0), game(3, 0)]));
        assert!(!needs_end_of_set_focus(&[game(3, 2), game(2, 3), game(3, 0), game(3, 1)]));
        assert!(!needs_end_of_set_focus(&[]));
    }
}
