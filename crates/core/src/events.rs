//! Match-recorded notifications.
//!
//! [`EventBus`] keeps subscribers in subscription order and delivers each
//! [`MatchSummary`] synchronously. A failing subscriber is recorded in the
//! [`PublishReport`] and the remaining subscribers are still notified.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::domain::{Match, MatchOutcome, PlayerId, StatLine, TeamId};

/// A stat line enriched with who produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSummary {
    pub player_id: PlayerId,
    pub player_name: String,
    pub team_id: TeamId,
    pub line: StatLine,
}

/// Season record of the recording team, including the new match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamRecord {
    pub wins: u32,
    pub losses: u32,
    /// Most recent first, at most five entries.
    pub recent: Vec<MatchOutcome>,
}

impl TeamRecord {
    pub const TREND_LENGTH: usize = 5;

    /// Builds a record from outcomes ordered most recent first.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = MatchOutcome>) -> Self {
        let mut record = TeamRecord::default();
        for outcome in outcomes {
            match outcome {
                MatchOutcome::Won => record.wins += 1,
                MatchOutcome::Lost => record.losses += 1,
            }
            if record.recent.len() < Self::TREND_LENGTH {
                record.recent.push(outcome);
            }
        }
        record
    }

    /// e.g. "WWLWL", most recent first.
    pub fn trend(&self) -> String {
        self.recent.iter().map(|o| o.letter()).collect()
    }
}

/// Payload of a match-recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub record: Match,
    pub team_name: String,
    pub stats: Vec<StatSummary>,
    pub team_record: TeamRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Subscriber to match-recorded events.
pub trait MatchObserver {
    fn name(&self) -> &str;

    fn on_match_recorded(&self, summary: &MatchSummary) -> Result<(), ObserverError>;
}

#[derive(Debug)]
pub struct ObserverFailure {
    pub observer: String,
    pub error: ObserverError,
}

/// Result of one publish.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub failures: Vec<ObserverFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Rc<dyn MatchObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `observer` unless this same instance is already subscribed.
    /// Returns whether it was added.
    pub fn subscribe(&mut self, observer: Rc<dyn MatchObserver>) -> bool {
        if self.position(&observer).is_some() {
            return false;
        }
        debug!(observer = observer.name(), "observer subscribed");
        self.subscribers.push(observer);
        true
    }

    pub fn unsubscribe(&mut self, observer: &Rc<dyn MatchObserver>) -> bool {
        match self.position(observer) {
            Some(idx) => {
                self.subscribers.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Notifies every subscriber in subscription order.
    pub fn publish(&self, summary: &MatchSummary) -> PublishReport {
        let mut report = PublishReport::default();
        for observer in &self.subscribers {
            match observer.on_match_recorded(summary) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        observer = observer.name(),
                        match_id = summary.record.id,
                        %error,
                        "observer failed to handle match"
                    );
                    report.failures.push(ObserverFailure {
                        observer: observer.name().to_string(),
                        error,
                    });
                }
            }
        }
        report
    }

    fn position(&self, observer: &Rc<dyn MatchObserver>) -> Option<usize> {
        self.subscribers
            .iter()
            .position(|s| std::ptr::addr_eq(Rc::as_ptr(s), Rc::as_ptr(observer)))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use chrono::NaiveDate;

    use super::*;

    struct Counting {
        name: String,
        calls: Cell<usize>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Counting {
        fn new(name: &str, log: &Rc<RefCell<Vec<String>>>) -> Rc<Self> {
            Rc::new(Self {
                name: name.to_string(),
                calls: Cell::new(0),
                log: Rc::clone(log),
            })
        }
    }

    impl MatchObserver for Counting {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_match_recorded(&self, _summary: &MatchSummary) -> Result<(), ObserverError> {
            self.calls.set(self.calls.get() + 1);
            self.log.borrow_mut().push(self.name.clone());
            Ok(())
        }
    }

    struct Failing;

    impl MatchObserver for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_match_recorded(&self, _summary: &MatchSummary) -> Result<(), ObserverError> {
            Err(ObserverError::Delivery("mailbox full".into()))
        }
    }

    fn summary() -> MatchSummary {
        MatchSummary {
            record: Match {
                id: 1,
                team_id: 1,
                opponent: "Western Mustangs".into(),
                date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
                sets_won: 3,
                sets_lost: 1,
            },
            team_name: "McMaster Marauders".into(),
            stats: Vec::new(),
            team_record: TeamRecord::from_outcomes([MatchOutcome::Won]),
        }
    }

    #[test]
    fn duplicate_subscription_notifies_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let coach = Counting::new("coach", &log);
        let mut bus = EventBus::new();

        assert!(bus.subscribe(coach.clone()));
        assert!(!bus.subscribe(coach.clone()));
        assert_eq!(bus.len(), 1);

        let report = bus.publish(&summary());
        assert_eq!(report.delivered, 1);
        assert_eq!(coach.calls.get(), 1);
    }

    #[test]
    fn distinct_instances_with_same_name_both_subscribe() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        assert!(bus.subscribe(Counting::new("analyst", &log)));
        assert!(bus.subscribe(Counting::new("analyst", &log)));
        bus.publish(&summary());
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn failing_subscriber_does_not_block_others() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = Counting::new("first", &log);
        let third = Counting::new("third", &log);
        let mut bus = EventBus::new();
        bus.subscribe(first.clone());
        bus.subscribe(Rc::new(Failing));
        bus.subscribe(third.clone());

        let report = bus.publish(&summary());

        assert_eq!(*log.borrow(), vec!["first".to_string(), "third".to_string()]);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].observer, "failing");
        assert!(!report.is_clean());
    }

    #[test]
    fn unsubscribe_by_identity() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let player = Counting::new("player", &log);
        let as_dyn: Rc<dyn MatchObserver> = player.clone();
        let mut bus = EventBus::new();
        bus.subscribe(as_dyn.clone());

        assert!(bus.unsubscribe(&as_dyn));
        assert!(!bus.unsubscribe(&as_dyn));
        assert!(bus.is_empty());
        bus.publish(&summary());
        assert_eq!(player.calls.get(), 0);
    }

    #[test]
    fn team_record_trend_caps_at_five() {
        use MatchOutcome::{Lost, Won};
        let record = TeamRecord::from_outcomes([Won, Won, Lost, Won, Lost, Lost, Won]);
        assert_eq!(record.wins, 4);
        assert_eq!(record.losses, 3);
        assert_eq!(record.trend(), "WWLWL");
    }
}
