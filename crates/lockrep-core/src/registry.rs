//! `state_key → LockReplicator` dispatch, plus grace-period GC (§4.4).
//!
//! The eviction queue is a min-heap on eligibility time, the same shape the
//! teacher's client-session table uses to reap idle sessions without
//! scanning the whole table on every tick.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use lockrep_replicaset::ReplicaSet;
use lockrep_types::{CommId, Key, LockOp, Nonce, StateKey, Table, TransactionGroup};

use crate::context::TmContext;
use crate::error::DispatchError;
use crate::replicator::LockReplicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingGc {
    eligible_at: u64,
    state_key: StateKey,
}

impl PartialOrd for PendingGc {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingGc {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.eligible_at.cmp(&other.eligible_at).then(self.state_key.cmp(&other.state_key))
    }
}

/// Owns every live [`LockReplicator`] and reaps finished ones once they've
/// aged past `gc_grace_period`.
pub struct ReplicatorRegistry {
    replicators: HashMap<StateKey, LockReplicator>,
    gc_queue: BinaryHeap<Reverse<PendingGc>>,
    gc_grace_period: u64,
}

impl ReplicatorRegistry {
    #[must_use]
    pub fn new(gc_grace_period: u64) -> Self {
        Self {
            replicators: HashMap::new(),
            gc_queue: BinaryHeap::new(),
            gc_grace_period,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.replicators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replicators.is_empty()
    }

    /// Creates and initializes a new replicator for `state_key`.
    ///
    /// # Panics
    /// Panics if `state_key` is already registered — callers are expected
    /// to choose a `state_key` unique among their outstanding operations
    /// (§4.4).
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        state_key: StateKey,
        originator: CommId,
        nonce: Nonce,
        table: Table,
        key: Key,
        tg: TransactionGroup,
        op: LockOp,
    ) {
        assert!(
            !self.replicators.contains_key(&state_key),
            "ReplicatorRegistry::start called twice for {state_key}"
        );
        let mut replicator = LockReplicator::new(state_key);
        replicator.init(originator, nonce, table, key, tg, op);
        self.replicators.insert(state_key, replicator);
    }

    /// Routes an inbound response to the replicator registered for
    /// `state_key`.
    pub fn response(
        &mut self,
        state_key: StateKey,
        from: CommId,
        tg: TransactionGroup,
        rs: ReplicaSet,
        ctx: &mut dyn TmContext,
    ) -> Result<(), DispatchError> {
        let replicator = self
            .replicators
            .get_mut(&state_key)
            .ok_or(DispatchError::UnknownStateKey(state_key))?;
        replicator.response(from, tg, rs, ctx);
        if replicator.finished() {
            self.schedule_gc(state_key, ctx.monotonic_time());
        }
        Ok(())
    }

    /// Drives one work cycle for every registered replicator. The
    /// dispatcher may instead track a narrower work queue of replicators
    /// with pending timers; iterating the whole table is the simplest
    /// conformant strategy (§4.4).
    pub fn work_all(&mut self, ctx: &mut dyn TmContext) {
        let now = ctx.monotonic_time();
        for (state_key, replicator) in &mut self.replicators {
            replicator.externally_work(ctx);
            if replicator.finished() {
                Self::queue_gc(&mut self.gc_queue, *state_key, now, self.gc_grace_period);
            }
        }
    }

    /// Routes `abort` (wound-wait) to the replicator for `state_key`, if any.
    pub fn abort(&mut self, state_key: StateKey, tg: TransactionGroup, ctx: &mut dyn TmContext) {
        if let Some(replicator) = self.replicators.get_mut(&state_key) {
            replicator.abort(tg, ctx);
            if replicator.finished() {
                self.schedule_gc(state_key, ctx.monotonic_time());
            }
        }
    }

    /// Routes a silent `drop` to the replicator for `state_key`, if any.
    pub fn drop_replicator(&mut self, state_key: StateKey, tg: TransactionGroup, now: u64) {
        if let Some(replicator) = self.replicators.get_mut(&state_key) {
            replicator.drop(tg);
            if replicator.finished() {
                self.schedule_gc(state_key, now);
            }
        }
    }

    fn schedule_gc(&mut self, state_key: StateKey, now: u64) {
        Self::queue_gc(&mut self.gc_queue, state_key, now, self.gc_grace_period);
    }

    fn queue_gc(
        gc_queue: &mut BinaryHeap<Reverse<PendingGc>>,
        state_key: StateKey,
        now: u64,
        gc_grace_period: u64,
    ) {
        gc_queue.push(Reverse(PendingGc { eligible_at: now + gc_grace_period, state_key }));
    }

    /// Evicts every finished replicator whose grace period has elapsed as
    /// of `now`. Returns the number reaped.
    pub fn collect_garbage(&mut self, now: u64) -> usize {
        let mut reaped = 0;
        while let Some(Reverse(pending)) = self.gc_queue.peek() {
            if pending.eligible_at > now {
                break;
            }
            let Reverse(pending) = self.gc_queue.pop().expect("just peeked");
            if let Some(replicator) = self.replicators.get(&pending.state_key) {
                if replicator.finished() {
                    self.replicators.remove(&pending.state_key);
                    reaped += 1;
                }
            }
        }
        reaped
    }

    #[must_use]
    pub fn get(&self, state_key: StateKey) -> Option<&LockReplicator> {
        self.replicators.get(&state_key)
    }
}
