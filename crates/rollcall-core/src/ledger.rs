//! Per-identity cooldown ledger.
//!
//! Tracks when each identity was last written to the attendance log and
//! whether it has been logged at all during the current session. The ledger
//! lives in memory only: a new session (or a process restart) starts empty,
//! so a person may be logged again immediately after a restart.

use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashMap;

/// Minimum interval, in seconds, between two log records for the same identity.
pub const COOLDOWN_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone)]
pub struct CooldownLedger {
    window: TimeDelta,
    last_logged: HashMap<String, NaiveDateTime>,
}

impl CooldownLedger {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            last_logged: HashMap::new(),
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// True if `name` has never been logged, or was last logged at least one
    /// full window before `now`.
    pub fn should_log(&self, name: &str, now: NaiveDateTime) -> bool {
        match self.last_logged.get(name) {
            None => true,
            Some(&last) => now - last >= self.window,
        }
    }

    /// Set the last-logged time for `name` to `now`, overwriting any entry.
    pub fn record(&mut self, name: &str, now: NaiveDateTime) {
        self.last_logged.insert(name.to_string(), now);
    }

    /// Check and record in one step. Returns true when `name` was admitted.
    pub fn try_admit(&mut self, name: &str, now: NaiveDateTime) -> bool {
        if !self.should_log(name, now) {
            return false;
        }
        self.record(name, now);
        true
    }

    /// Undo an admission whose log write failed, restoring the entry that
    /// preceded it (`None` forgets `name` entirely).
    pub fn revert(&mut self, name: &str, previous: Option<NaiveDateTime>) {
        match previous {
            Some(at) => self.record(name, at),
            None => {
                self.last_logged.remove(name);
            }
        }
    }

    /// True once `name` has been recorded this session, regardless of cooldown.
    pub fn is_marked(&self, name: &str) -> bool {
        self.last_logged.contains_key(name)
    }

    pub fn last_logged_at(&self, name: &str) -> Option<NaiveDateTime> {
        self.last_logged.get(name).copied()
    }

    /// Number of distinct identities marked this session.
    pub fn marked_count(&self) -> usize {
        self.last_logged.len()
    }
}

impl Default for CooldownLedger {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(COOLDOWN_WINDOW_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(minutes: i64, seconds: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + TimeDelta::minutes(minutes)
            + TimeDelta::seconds(seconds)
    }

    #[test]
    fn test_unknown_identity_should_log() {
        let ledger = CooldownLedger::default();
        assert!(ledger.should_log("Alice", at(0, 0)));
        assert!(!ledger.is_marked("Alice"));
    }

    #[test]
    fn test_within_window_blocks() {
        let mut ledger = CooldownLedger::default();
        ledger.record("Alice", at(0, 0));
        assert!(!ledger.should_log("Alice", at(1, 0)));
        assert!(!ledger.should_log("Alice", at(4, 59)));
    }

    #[test]
    fn test_window_boundary_admits() {
        let mut ledger = CooldownLedger::default();
        ledger.record("Alice", at(0, 0));
        assert!(ledger.should_log("Alice", at(5, 0)));
        assert!(ledger.should_log("Alice", at(6, 0)));
    }

    #[test]
    fn test_marked_persists_through_cooldown() {
        let mut ledger = CooldownLedger::default();
        ledger.record("Alice", at(0, 0));
        assert!(ledger.is_marked("Alice"));
        assert!(!ledger.should_log("Alice", at(1, 0)));
        assert!(ledger.is_marked("Alice"));
        assert!(ledger.should_log("Alice", at(60, 0)));
        assert!(ledger.is_marked("Alice"), "still marked long after the window");
    }

    #[test]
    fn test_record_overwrites() {
        let mut ledger = CooldownLedger::default();
        ledger.record("Alice", at(0, 0));
        ledger.record("Alice", at(3, 0));
        assert_eq!(ledger.last_logged_at("Alice"), Some(at(3, 0)));
        // Window now counts from the second record.
        assert!(!ledger.should_log("Alice", at(6, 0)));
        assert!(ledger.should_log("Alice", at(8, 0)));
    }

    #[test]
    fn test_try_admit_is_check_and_record() {
        let mut ledger = CooldownLedger::default();
        assert!(ledger.try_admit("Alice", at(0, 0)));
        // Same identity twice in the same instant: only the first is admitted.
        assert!(!ledger.try_admit("Alice", at(0, 0)));
        assert!(!ledger.try_admit("Alice", at(2, 0)));
        assert_eq!(ledger.last_logged_at("Alice"), Some(at(0, 0)));
        assert!(ledger.try_admit("Alice", at(5, 0)));
    }

    #[test]
    fn test_revert_restores_previous_entry() {
        let mut ledger = CooldownLedger::default();
        assert!(ledger.try_admit("Alice", at(0, 0)));
        ledger.revert("Alice", None);
        assert!(!ledger.is_marked("Alice"));
        assert!(ledger.should_log("Alice", at(0, 1)));

        assert!(ledger.try_admit("Alice", at(1, 0)));
        assert!(ledger.try_admit("Alice", at(7, 0)));
        ledger.revert("Alice", Some(at(1, 0)));
        assert_eq!(ledger.last_logged_at("Alice"), Some(at(1, 0)));
        assert!(ledger.is_marked("Alice"));
    }

    #[test]
    fn test_identities_are_independent() {
        let mut ledger = CooldownLedger::default();
        ledger.record("Alice", at(0, 0));
        assert!(ledger.should_log("Bob", at(0, 30)));
        assert!(!ledger.is_marked("Bob"));
        assert_eq!(ledger.marked_count(), 1);
    }

    #[test]
    fn test_custom_window() {
        let mut ledger = CooldownLedger::new(TimeDelta::seconds(30));
        ledger.record("Alice", at(0, 0));
        assert!(!ledger.should_log("Alice", at(0, 29)));
        assert!(ledger.should_log("Alice", at(0, 30)));
    }
}
