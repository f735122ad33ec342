//! Per-target request bookkeeping for a single replicator (§4.2).
//!
//! Fan-out is small and fixed — a handful of replicas per key — so this is
//! a linear-scanned `Vec`, deliberately not a `HashMap`. See §9: "Fan-out
//! is small and fixed; vector wins on cache and memory. Do not replace
//! with a hash table."

use lockrep_replicaset::ReplicaSet;
use lockrep_types::{CommId, TransactionGroup};

#[derive(Debug, Clone)]
struct Observed {
    tg: TransactionGroup,
    rs: ReplicaSet,
}

/// Bookkeeping for one target: when it was last asked, and what it last
/// told us.
#[derive(Debug, Clone)]
pub struct LockStub {
    target: CommId,
    last_request_time: Option<u64>,
    observed: Option<Observed>,
}

impl LockStub {
    fn new(target: CommId) -> Self {
        Self { target, last_request_time: None, observed: None }
    }

    #[must_use]
    pub const fn target(&self) -> CommId {
        self.target
    }

    #[must_use]
    pub const fn last_request_time(&self) -> Option<u64> {
        self.last_request_time
    }

    #[must_use]
    pub fn observed_tg(&self) -> Option<TransactionGroup> {
        self.observed.as_ref().map(|o| o.tg)
    }

    #[must_use]
    pub fn observed_rs(&self) -> Option<&ReplicaSet> {
        self.observed.as_ref().map(|o| &o.rs)
    }

    /// `set_observed(target, tg, rs)` — records the last response.
    pub fn set_observed(&mut self, tg: TransactionGroup, rs: ReplicaSet) {
        self.observed = Some(Observed { tg, rs });
    }

    /// `mark_sent(target, now)` — sets `last_request_time = now`.
    pub fn mark_sent(&mut self, now: u64) {
        self.last_request_time = Some(now);
    }

    /// True if a send to this stub is due: never sent, or the resend
    /// interval has elapsed since the last one (§4.3 step 4 / P5).
    #[must_use]
    pub fn resend_due(&self, now: u64, resend_interval: u64) -> bool {
        match self.last_request_time {
            None => true,
            Some(last) => now.saturating_sub(last) >= resend_interval,
        }
    }
}

/// `LockStub` bookkeeping for a single replicator; never shrinks before
/// the replicator finishes (R3: at most one stub per target, enforced by
/// linear search before insert).
#[derive(Debug, Clone, Default)]
pub struct LockStubTable(Vec<LockStub>);

impl LockStubTable {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// `get(target) -> &mut LockStub?` — linear search; absent when
    /// `target` not yet contacted.
    #[must_use]
    pub fn get(&self, target: CommId) -> Option<&LockStub> {
        self.0.iter().find(|stub| stub.target == target)
    }

    pub fn get_mut(&mut self, target: CommId) -> Option<&mut LockStub> {
        self.0.iter_mut().find(|stub| stub.target == target)
    }

    /// `get_or_create(target) -> &mut LockStub`. Callers are responsible
    /// for not invoking this for the null-sentinel transitioning slot —
    /// that slot is represented as `Option<CommId> = None` (§4.1), so
    /// there is nothing to no-op here: a caller simply never has a
    /// `CommId` to pass for it.
    pub fn get_or_create(&mut self, target: CommId) -> &mut LockStub {
        if let Some(idx) = self.0.iter().position(|stub| stub.target == target) {
            return &mut self.0[idx];
        }
        self.0.push(LockStub::new(target));
        self.0.last_mut().expect("just pushed")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockStub> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockrep_replicaset::Configuration;
    use lockrep_types::{DataCenterId, Key, Table, Timestamp};

    fn sample_rs() -> ReplicaSet {
        let cfg = Configuration::new_stable(1, 3, vec![CommId::new(0), CommId::new(1), CommId::new(2)]).unwrap();
        cfg.hash(DataCenterId::new(0), &Table::from("t"), &Key::from("k")).unwrap()
    }

    #[test]
    fn get_or_create_is_idempotent_per_target() {
        let mut table = LockStubTable::new();
        let target = CommId::new(1);
        table.get_or_create(target).mark_sent(5);
        table.get_or_create(target); // should not reset the existing stub
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(target).unwrap().last_request_time(), Some(5));
    }

    #[test]
    fn get_returns_none_for_unknown_target() {
        let table = LockStubTable::new();
        assert!(table.get(CommId::new(99)).is_none());
    }

    #[test]
    fn resend_due_before_any_send() {
        let stub = LockStub::new(CommId::new(1));
        assert!(stub.resend_due(0, 100));
    }

    #[test]
    fn resend_due_respects_interval() {
        let mut stub = LockStub::new(CommId::new(1));
        stub.mark_sent(10);
        assert!(!stub.resend_due(50, 100));
        assert!(stub.resend_due(110, 100));
    }

    #[test]
    fn set_observed_records_tg_and_rs() {
        let mut stub = LockStub::new(CommId::new(1));
        let tg = TransactionGroup::new(1, Timestamp::new(5));
        let rs = sample_rs();
        stub.set_observed(tg, rs.clone());
        assert_eq!(stub.observed_tg(), Some(tg));
        assert_eq!(stub.observed_rs(), Some(&rs));
    }

    proptest::proptest! {
        #[test]
        fn prop_at_most_one_stub_per_target(targets in proptest::collection::vec(0u64..5, 0..50)) {
            let mut table = LockStubTable::new();
            for t in targets {
                table.get_or_create(CommId::new(t));
            }
            let mut seen = std::collections::HashSet::new();
            for stub in table.iter() {
                assert!(seen.insert(stub.target()), "duplicate stub for {}", stub.target());
            }
        }
    }
}
