//! Per-identity mute deadlines.
//!
//! Keyed by identity and independent of registry lifetime: a mute survives a
//! disconnect and still applies if the same identity reconnects before it
//! expires. Expiry is lazy, so a record whose deadline has passed is treated
//! as absent and no background timer is needed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct ModerationTable {
    muted: HashMap<String, Instant>,
}

impl ModerationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or overwrite a mute record lasting `duration` from now.
    /// Doubles as the housekeeping point: expired records are purged here,
    /// keeping the table bounded by the number of currently muted identities.
    pub fn mute(&mut self, identity: &str, duration: Duration) {
        self.purge_expired();
        self.muted
            .insert(identity.to_owned(), Instant::now() + duration);
    }

    /// Clear a mute record. Returns whether one was active; clearing an
    /// absent or already-expired record is a no-op.
    pub fn unmute(&mut self, identity: &str) -> bool {
        match self.muted.remove(identity) {
            Some(deadline) => deadline > Instant::now(),
            None => false,
        }
    }

    /// Whole seconds of mute remaining, rounded up so a blocked user never
    /// sees "0 seconds left". `None` if not muted or expired.
    pub fn remaining_mute(&self, identity: &str) -> Option<u64> {
        let deadline = self.muted.get(identity)?;
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return None;
        }
        let mut secs = left.as_secs();
        if left.subsec_nanos() > 0 {
            secs += 1;
        }
        Some(secs)
    }

    /// Drop expired records. Called from `mute`; lazy expiry keeps the
    /// answers correct in between.
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.muted.retain(|_, deadline| *deadline > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmuted_identity_has_no_remaining() {
        let table = ModerationTable::new();
        assert_eq!(table.remaining_mute("alice"), None);
    }

    #[test]
    fn mute_reports_ceiling_of_remaining() {
        let mut table = ModerationTable::new();
        table.mute("bob", Duration::from_secs(5));
        // 5s minus the nanoseconds since `mute` still rounds up to 5.
        assert_eq!(table.remaining_mute("bob"), Some(5));
    }

    #[test]
    fn partial_second_rounds_up_to_one() {
        let mut table = ModerationTable::new();
        table.mute("bob", Duration::from_millis(300));
        assert_eq!(table.remaining_mute("bob"), Some(1));
    }

    #[test]
    fn expired_mute_is_inert() {
        let mut table = ModerationTable::new();
        table.mute("bob", Duration::ZERO);
        assert_eq!(table.remaining_mute("bob"), None);
        // And unmuting it reports "was not muted".
        assert!(!table.unmute("bob"));
    }

    #[test]
    fn mute_overwrites_previous_deadline() {
        let mut table = ModerationTable::new();
        table.mute("bob", Duration::from_secs(2));
        table.mute("bob", Duration::from_secs(60));
        assert_eq!(table.remaining_mute("bob"), Some(60));
    }

    #[test]
    fn unmute_clears_active_record() {
        let mut table = ModerationTable::new();
        table.mute("bob", Duration::from_secs(30));
        assert!(table.unmute("bob"));
        assert_eq!(table.remaining_mute("bob"), None);
        assert!(!table.unmute("bob"));
    }

    #[test]
    fn purge_drops_only_expired_records() {
        let mut table = ModerationTable::new();
        table.mute("expired", Duration::ZERO);
        table.mute("active", Duration::from_secs(60));
        table.purge_expired();
        assert_eq!(table.remaining_mute("active"), Some(60));
        assert_eq!(table.remaining_mute("expired"), None);
    }

    #[test]
    fn installing_a_mute_evicts_expired_records() {
        let mut table = ModerationTable::new();
        table.mute("expired", Duration::ZERO);
        table.mute("bob", Duration::from_secs(60));
        // The dead record is gone from the table, not just inert.
        assert!(!table.muted.contains_key("expired"));
        assert_eq!(table.remaining_mute("bob"), Some(60));
    }
}
