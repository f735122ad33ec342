//! An in-memory [`TmContext`](lockrep_core::TmContext) for driving
//! [`lockrep_core::LockReplicator`] in tests without a real transport.
//!
//! Grounded on the teacher's `Runtime<C: Clock, S: Storage, N: Network>`
//! swap-for-tests pattern: production code gets a real clock and a real
//! network, tests get this instead, with no change to the code under test.
//! The send queue is a [`crossbeam_queue::SegQueue`] rather than a `Vec`
//! behind a lock, since that is the structure the teacher already reaches
//! for when a queue only needs push/pop and no ordering guarantee beyond FIFO.

use std::cell::{Cell, RefCell};

use crossbeam_queue::SegQueue;
use lockrep_core::TmContext;
use lockrep_replicaset::Configuration;
use lockrep_types::{CommId, DataCenterId};
use lockrep_wire::{KvsLockOpResp, KvsRawLk, MessagePayload, TxmanWound};

/// Builds an [`InMemoryContext`] with sensible test defaults.
pub struct InMemoryContextBuilder {
    members: Vec<CommId>,
    desired_replication: usize,
    resend_interval: u64,
    local_dc: DataCenterId,
}

impl InMemoryContextBuilder {
    #[must_use]
    pub fn members(mut self, members: Vec<CommId>) -> Self {
        self.members = members;
        self
    }

    #[must_use]
    pub fn desired_replication(mut self, desired_replication: usize) -> Self {
        self.desired_replication = desired_replication;
        self
    }

    #[must_use]
    pub fn resend_interval(mut self, resend_interval: u64) -> Self {
        self.resend_interval = resend_interval;
        self
    }

    #[must_use]
    pub fn local_dc(mut self, local_dc: DataCenterId) -> Self {
        self.local_dc = local_dc;
        self
    }

    /// # Panics
    /// Panics if `members` is empty or `desired_replication` is zero —
    /// both are test-setup mistakes, not conditions under test.
    #[must_use]
    pub fn build(self) -> InMemoryContext {
        let config = Configuration::new_stable(1, self.desired_replication, self.members)
            .expect("InMemoryContextBuilder: invalid configuration");
        InMemoryContext {
            config: RefCell::new(config),
            local_dc: self.local_dc,
            resend_interval: self.resend_interval,
            now: Cell::new(0),
            sent: SegQueue::new(),
        }
    }
}

/// A hand-advanced logical clock and a non-blocking send log, standing in
/// for a real daemon's event loop and network.
pub struct InMemoryContext {
    config: RefCell<Configuration>,
    local_dc: DataCenterId,
    resend_interval: u64,
    now: Cell<u64>,
    sent: SegQueue<(CommId, MessagePayload)>,
}

impl InMemoryContext {
    #[must_use]
    pub fn builder() -> InMemoryContextBuilder {
        InMemoryContextBuilder {
            members: Vec::new(),
            desired_replication: 1,
            resend_interval: 100,
            local_dc: DataCenterId::new(0),
        }
    }

    /// Advances the logical clock. Callers are responsible for monotonicity.
    pub fn set_now(&mut self, now: u64) {
        self.now.set(now);
    }

    /// Replaces the active configuration, e.g. to simulate a reconfiguration
    /// between work cycles.
    pub fn set_config(&mut self, config: Configuration) {
        *self.config.borrow_mut() = config;
    }

    /// Discards every message sent so far, keeping only the ones sent after
    /// this call.
    pub fn clear_sent(&mut self) {
        while self.sent.pop().is_some() {}
    }

    fn drain_matching<T>(&mut self, target: CommId, extract: impl Fn(MessagePayload) -> Option<T>) -> Vec<T> {
        let mut matched = Vec::new();
        let mut kept = Vec::new();
        while let Some((to, payload)) = self.sent.pop() {
            if to == target {
                if let Some(value) = extract(payload.clone()) {
                    matched.push(value);
                    continue;
                }
            }
            kept.push((to, payload));
        }
        for entry in kept {
            self.sent.push(entry);
        }
        matched
    }

    pub fn drain_kvs_raw_lk(&mut self, target: CommId) -> Vec<KvsRawLk> {
        self.drain_matching(target, |p| match p {
            MessagePayload::KvsRawLk(m) => Some(m),
            _ => None,
        })
    }

    pub fn drain_kvs_lock_op_resp(&mut self, target: CommId) -> Vec<KvsLockOpResp> {
        self.drain_matching(target, |p| match p {
            MessagePayload::KvsLockOpResp(m) => Some(m),
            _ => None,
        })
    }

    pub fn drain_txman_wound(&mut self, target: CommId) -> Vec<TxmanWound> {
        self.drain_matching(target, |p| match p {
            MessagePayload::TxmanWound(m) => Some(m),
            _ => None,
        })
    }
}

impl TmContext for InMemoryContext {
    fn get_config(&self) -> Configuration {
        self.config.borrow().clone()
    }

    fn local_dc(&self) -> DataCenterId {
        self.local_dc
    }

    fn resend_interval(&self) -> u64 {
        self.resend_interval
    }

    fn monotonic_time(&self) -> u64 {
        self.now.get()
    }

    fn send(&mut self, target: CommId, payload: MessagePayload) {
        self.sent.push((target, payload));
    }
}

/// Deterministically reorders `items` and duplicates a fraction of them,
/// seeded by `seed`. Used to drive the core through the message reordering
/// and duplication its protocol is required to tolerate, without relying on
/// a real network's nondeterminism.
#[must_use]
pub fn reorder_and_duplicate<T: Clone>(items: Vec<T>, seed: u64, duplication_rate: f64) -> Vec<T> {
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut shuffled = items;
    shuffled.shuffle(&mut rng);

    let mut out = Vec::with_capacity(shuffled.len());
    for item in shuffled {
        out.push(item.clone());
        if rng.gen_bool(duplication_rate.clamp(0.0, 1.0)) {
            out.push(item);
        }
    }
    out
}
