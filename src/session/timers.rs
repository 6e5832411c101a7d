// Scheduled timer handles owned by the session controller

use chrono::{DateTime, Utc};

/// Kinds of timers the controller arms.
///
/// Declaration order is the firing order for timers due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Warning,
    Countdown,
    Expiry,
    ConsistencyCheck,
}

impl TimerKind {
    const ALL: [TimerKind; 4] = [
        TimerKind::Warning,
        TimerKind::Countdown,
        TimerKind::Expiry,
        TimerKind::ConsistencyCheck,
    ];

    fn slot(self) -> usize {
        match self {
            TimerKind::Warning => 0,
            TimerKind::Countdown => 1,
            TimerKind::Expiry => 2,
            TimerKind::ConsistencyCheck => 3,
        }
    }
}

/// Single-owner set of armed timers, at most one deadline per kind.
///
/// Re-arming a kind replaces its previous deadline, so a stale firing can
/// never follow a reschedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerSet {
    deadlines: [Option<DateTime<Utc>>; 4],
}

impl TimerSet {
    pub fn arm(&mut self, kind: TimerKind, at: DateTime<Utc>) {
        self.deadlines[kind.slot()] = Some(at);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[kind.slot()] = None;
    }

    /// Cancel every armed timer
    pub fn clear(&mut self) {
        self.deadlines = [None; 4];
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<DateTime<Utc>> {
        self.deadlines[kind.slot()]
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadline(kind).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.iter().all(Option::is_none)
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return the earliest timer due at or before `now`
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TimerKind, DateTime<Utc>)> {
        let mut due: Option<(TimerKind, DateTime<Utc>)> = None;
        for kind in TimerKind::ALL {
            if let Some(at) = self.deadline(kind)
                && at <= now
                && due.is_none_or(|(_, earliest)| at < earliest)
            {
                due = Some((kind, at));
            }
        }

        if let Some((kind, _)) = due {
            self.cancel(kind);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::from_millis;

    #[test]
    fn test_arm_replaces_previous_deadline() {
        let mut timers = TimerSet::default();
        timers.arm(TimerKind::Expiry, from_millis(1000));
        timers.arm(TimerKind::Expiry, from_millis(5000));

        assert_eq!(timers.deadline(TimerKind::Expiry), Some(from_millis(5000)));
        assert!(timers.pop_due(from_millis(1000)).is_none());
    }

    #[test]
    fn test_pop_due_in_deadline_order() {
        let mut timers = TimerSet::default();
        timers.arm(TimerKind::ConsistencyCheck, from_millis(60_000));
        timers.arm(TimerKind::Warning, from_millis(1_500_000));
        timers.arm(TimerKind::Expiry, from_millis(1_800_000));

        let now = from_millis(1_800_000);
        assert_eq!(timers.pop_due(now).map(|(k, _)| k), Some(TimerKind::ConsistencyCheck));
        assert_eq!(timers.pop_due(now).map(|(k, _)| k), Some(TimerKind::Warning));
        assert_eq!(timers.pop_due(now).map(|(k, _)| k), Some(TimerKind::Expiry));
        assert!(timers.pop_due(now).is_none());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_ties_fire_in_kind_order() {
        let mut timers = TimerSet::default();
        let at = from_millis(1_800_000);
        timers.arm(TimerKind::ConsistencyCheck, at);
        timers.arm(TimerKind::Expiry, at);
        timers.arm(TimerKind::Countdown, at);

        assert_eq!(timers.pop_due(at).map(|(k, _)| k), Some(TimerKind::Countdown));
        assert_eq!(timers.pop_due(at).map(|(k, _)| k), Some(TimerKind::Expiry));
        assert_eq!(timers.pop_due(at).map(|(k, _)| k), Some(TimerKind::ConsistencyCheck));
    }

    #[test]
    fn test_clear_cancels_everything() {
        let mut timers = TimerSet::default();
        timers.arm(TimerKind::Warning, from_millis(1));
        timers.arm(TimerKind::Countdown, from_millis(2));
        timers.arm(TimerKind::Expiry, from_millis(3));
        timers.arm(TimerKind::ConsistencyCheck, from_millis(4));
        assert_eq!(timers.next_deadline(), Some(from_millis(1)));

        timers.clear();
        assert!(timers.is_empty());
        assert!(timers.next_deadline().is_none());
        assert!(timers.pop_due(from_millis(10)).is_none());
    }
}
