//! Strike Ledger Implementation

use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Strike thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerPolicy {
    /// Strikes at which strict mode turns on
    pub strict_threshold: u32,
    /// Strikes at which the learner is permanently banned
    pub ban_threshold: u32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            strict_threshold: 5,
            ban_threshold: 10,
        }
    }
}

/// Storage keys for one course
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub verified: String,
    pub strikes: String,
    pub banned: String,
    pub banned_reason: String,
    pub banned_time: String,
}

impl SessionKeys {
    pub fn for_course(course_id: u64) -> Self {
        let banned = format!("banned_{}", course_id);
        Self {
            verified: format!("verified_{}", course_id),
            strikes: format!("strikes_{}", course_id),
            banned_reason: format!("{}_reason", banned),
            banned_time: format!("{}_time", banned),
            banned,
        }
    }
}

/// Terminal ban details
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanRecord {
    pub reason: String,
    pub banned_at: Option<DateTime<Utc>>,
}

/// Result of recording a strike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeOutcome {
    /// Count after the strike
    pub count: u32,
    /// Count is at or above the strict threshold
    pub strict_mode_entered: bool,
    /// Count is at or above the ban threshold
    pub banned: bool,
}

/// Persisted strike count and ban state for one (course, learner) scope
pub struct StrikeLedger {
    store: Arc<dyn KeyValueStore>,
    keys: SessionKeys,
    policy: LedgerPolicy,
    count: u32,
    ban: Option<BanRecord>,
    verified: bool,
}

impl StrikeLedger {
    /// Load ledger state from the store
    pub fn load(store: Arc<dyn KeyValueStore>, course_id: u64, policy: LedgerPolicy) -> Self {
        let keys = SessionKeys::for_course(course_id);
        let mut ledger = Self {
            store,
            keys,
            policy,
            count: 0,
            ban: None,
            verified: false,
        };
        ledger.count = ledger.read_count();
        ledger.ban = ledger.read_ban();
        ledger.verified = ledger.read_flag(&ledger.keys.verified);
        ledger.enforce_threshold();

        info!(
            "Loaded strike ledger for course {}: {} strikes, banned={}, verified={}",
            course_id,
            ledger.count,
            ledger.ban.is_some(),
            ledger.verified
        );
        ledger
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Confirmed strikes so far
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_banned(&self) -> bool {
        self.ban.is_some()
    }

    pub fn ban_record(&self) -> Option<&BanRecord> {
        self.ban.as_ref()
    }

    /// Whether the session already passed its start gate
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Whether the count alone calls for strict mode
    pub fn strict_mode_due(&self) -> bool {
        self.count >= self.policy.strict_threshold
    }

    /// Strikes left before the ban
    pub fn remaining_strikes(&self) -> u32 {
        self.policy.ban_threshold.saturating_sub(self.count)
    }

    /// Record the session as started so a reload skips the start gate
    pub fn mark_verified(&mut self) {
        self.verified = true;
        self.persist(&self.keys.verified.clone(), "true");
    }

    /// Record one confirmed strike.
    ///
    /// Once banned the ledger is frozen: further calls report the ban
    /// without changing the count.
    pub fn record_strike(&mut self, reason: &str, at: DateTime<Utc>) -> StrikeOutcome {
        if self.is_banned() {
            return self.outcome();
        }

        self.count += 1;
        self.persist(&self.keys.strikes.clone(), &self.count.to_string());
        warn!("Strike {} recorded: {}", self.count, reason);

        if self.count >= self.policy.ban_threshold {
            let ban_reason = format!(
                "Excessive violations: {} ({}/{})",
                reason, self.count, self.policy.ban_threshold
            );
            self.ban(&ban_reason, at);
        }

        self.outcome()
    }

    /// Apply a terminal ban
    pub fn ban(&mut self, reason: &str, at: DateTime<Utc>) {
        if self.is_banned() {
            return;
        }
        warn!("Learner banned: {}", reason);
        self.ban = Some(BanRecord {
            reason: reason.to_string(),
            banned_at: Some(at),
        });
        self.persist(&self.keys.banned_reason.clone(), reason);
        self.persist(&self.keys.banned_time.clone(), &at.to_rfc3339());
        self.persist(&self.keys.banned.clone(), "true");
    }

    /// Re-read the store.
    ///
    /// The count only moves up and a ban written by someone else is adopted.
    /// A stored count at the ban threshold bans even without the flag.
    /// Returns true if a ban appeared since the last look.
    pub fn refresh(&mut self) -> bool {
        let stored = self.read_count();
        if stored > self.count {
            info!("Adopting externally raised strike count {} -> {}", self.count, stored);
            self.count = stored;
        }

        if self.is_banned() {
            return false;
        }
        match self.read_ban() {
            Some(record) => {
                warn!("External ban detected: {}", record.reason);
                self.ban = Some(record);
                true
            }
            None => self.enforce_threshold(),
        }
    }

    // Count reached the threshold without a stored ban flag
    fn enforce_threshold(&mut self) -> bool {
        if self.is_banned() || self.count < self.policy.ban_threshold {
            return false;
        }
        let reason = format!(
            "Excessive violations ({}/{})",
            self.count, self.policy.ban_threshold
        );
        self.ban(&reason, Utc::now());
        true
    }

    fn outcome(&self) -> StrikeOutcome {
        StrikeOutcome {
            count: self.count,
            strict_mode_entered: self.strict_mode_due(),
            banned: self.is_banned(),
        }
    }

    fn read_count(&self) -> u32 {
        match self.read(&self.keys.strikes) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring unparsable strike count {:?}", raw);
                0
            }),
            None => 0,
        }
    }

    fn read_flag(&self, key: &str) -> bool {
        self.read(key).as_deref() == Some("true")
    }

    fn read_ban(&self) -> Option<BanRecord> {
        if !self.read_flag(&self.keys.banned) {
            return None;
        }
        let reason = self
            .read(&self.keys.banned_reason)
            .unwrap_or_else(|| "Multiple security violations".to_string());
        let banned_at = self
            .read(&self.keys.banned_time)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));
        Some(BanRecord { reason, banned_at })
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                None
            }
        }
    }

    // In-memory state stays authoritative when the store fails
    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Failed to persist {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn ledger() -> (Arc<MemoryStore>, StrikeLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = StrikeLedger::load(store.clone(), 42, LedgerPolicy::default());
        (store, ledger)
    }

    #[test]
    fn test_keys_are_course_scoped() {
        let keys = SessionKeys::for_course(42);
        assert_eq!(keys.verified, "verified_42");
        assert_eq!(keys.strikes, "strikes_42");
        assert_eq!(keys.banned, "banned_42");
        assert_eq!(keys.banned_reason, "banned_42_reason");
        assert_eq!(keys.banned_time, "banned_42_time");
    }

    #[test]
    fn test_strike_persists_and_survives_reload() {
        let (store, mut ledger) = ledger();
        ledger.record_strike("Turning Left", at());
        ledger.record_strike("No Face", at());
        assert_eq!(store.get("strikes_42").unwrap().as_deref(), Some("2"));

        let reloaded = StrikeLedger::load(store, 42, LedgerPolicy::default());
        assert_eq!(reloaded.count(), 2);
    }

    #[test]
    fn test_strict_threshold() {
        let (_, mut ledger) = ledger();
        for _ in 0..4 {
            assert!(!ledger.record_strike("No Face", at()).strict_mode_entered);
        }
        assert!(ledger.record_strike("No Face", at()).strict_mode_entered);
        assert_eq!(ledger.remaining_strikes(), 5);
    }

    #[test]
    fn test_tenth_strike_bans() {
        let (store, mut ledger) = ledger();
        for i in 1..10 {
            let outcome = ledger.record_strike("No Face", at());
            assert_eq!(outcome.count, i);
            assert!(!outcome.banned);
        }
        let outcome = ledger.record_strike("Talking", at());
        assert!(outcome.banned);
        assert_eq!(outcome.count, 10);

        assert_eq!(store.get("banned_42").unwrap().as_deref(), Some("true"));
        assert_eq!(
            store.get("banned_42_reason").unwrap().as_deref(),
            Some("Excessive violations: Talking (10/10)")
        );
        assert!(store.get("banned_42_time").unwrap().is_some());

        // Frozen after ban
        let again = ledger.record_strike("No Face", at());
        assert_eq!(again.count, 10);
        assert!(again.banned);
    }

    #[test]
    fn test_external_ban_adopted_once() {
        let (store, mut ledger) = ledger();
        assert!(!ledger.refresh());

        store.set("banned_42", "true").unwrap();
        store.set("banned_42_reason", "Disqualified by instructor").unwrap();
        assert!(ledger.refresh());
        assert!(!ledger.refresh());
        assert_eq!(ledger.ban_record().unwrap().reason, "Disqualified by instructor");
        assert_eq!(ledger.ban_record().unwrap().banned_at, None);
    }

    #[test]
    fn test_refresh_never_lowers_count() {
        let (store, mut ledger) = ledger();
        ledger.record_strike("No Face", at());
        ledger.record_strike("No Face", at());

        store.set("strikes_42", "0").unwrap();
        ledger.refresh();
        assert_eq!(ledger.count(), 2);

        store.set("strikes_42", "6").unwrap();
        ledger.refresh();
        assert_eq!(ledger.count(), 6);
        assert!(ledger.strict_mode_due());
    }

    #[test]
    fn test_stored_count_at_threshold_bans_on_load() {
        let store = Arc::new(MemoryStore::new());
        store.set("strikes_42", "10").unwrap();
        let ledger = StrikeLedger::load(store.clone(), 42, LedgerPolicy::default());
        assert!(ledger.is_banned());
        assert_eq!(ledger.ban_record().unwrap().reason, "Excessive violations (10/10)");
        assert_eq!(store.get("banned_42").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_refresh_bans_when_count_reaches_threshold() {
        let (store, mut ledger) = ledger();
        store.set("strikes_42", "9").unwrap();
        assert!(!ledger.refresh());
        assert!(!ledger.is_banned());

        store.set("strikes_42", "12").unwrap();
        assert!(ledger.refresh());
        assert_eq!(ledger.count(), 12);
        assert!(ledger.is_banned());
        assert!(!ledger.refresh());
    }

    #[test]
    fn test_verified_flag() {
        let (store, mut ledger) = ledger();
        assert!(!ledger.is_verified());
        ledger.mark_verified();
        assert!(StrikeLedger::load(store, 42, LedgerPolicy::default()).is_verified());
    }

    #[test]
    fn test_garbage_count_reads_as_zero() {
        let store = Arc::new(MemoryStore::new());
        store.set("strikes_42", "lots").unwrap();
        let ledger = StrikeLedger::load(store, 42, LedgerPolicy::default());
        assert_eq!(ledger.count(), 0);
    }

    proptest! {
        #[test]
        fn prop_count_monotonic(ops in proptest::collection::vec(0u8..3, 0..40)) {
            let (store, mut ledger) = ledger();
            let mut last = 0;
            for op in ops {
                match op {
                    0 => { ledger.record_strike("No Face", at()); }
                    1 => { store.set("strikes_42", "1").unwrap(); ledger.refresh(); }
                    _ => { ledger.refresh(); }
                }
                prop_assert!(ledger.count() >= last);
                prop_assert!(ledger.count() <= ledger.policy().ban_threshold);
                last = ledger.count();
            }
        }
    }
}
