//! The per-lock-operation state machine (§4.3): the heart of the design.

use std::sync::atomic::{AtomicBool, Ordering};

use lockrep_replicaset::{Configuration, ReplicaSet};
use lockrep_types::{CommId, Key, LockOp, Nonce, ReturnCode, StateKey, Table, TransactionGroup};
use lockrep_wire::{KvsLockOpResp, KvsRawLk, MessagePayload, TxmanWound};

use crate::context::TmContext;
use crate::stub::LockStubTable;

/// Process-wide verbose-logging flag (§9 "Global debug flag").
///
/// Set once at process start from configuration and read thereafter; never
/// threaded through a call as a parameter.
static DEBUG: AtomicBool = AtomicBool::new(false);

/// Sets the process-wide debug flag. Intended to be called once, at
/// startup, from the embedding daemon's configuration.
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

#[must_use]
pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// States: `UNINIT → ACTIVE → FINISHED` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplicatorState {
    Uninit,
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct Originator {
    id: CommId,
    nonce: Nonce,
}

/// One in-flight `LOCK` or `UNLOCK` operation against a replica quorum.
///
/// `table` and `key` are owned directly rather than modeled as slices into
/// an externally-owned backing buffer (§9 "Opaque backing buffer") — since
/// [`Table`]/[`Key`] already own their bytes, the replicator simply holding
/// one of each gives the same "valid for the replicator's life" guarantee
/// without a separate buffer abstraction.
pub struct LockReplicator {
    state_key: StateKey,
    state: ReplicatorState,
    originator: Option<Originator>,
    table: Option<Table>,
    key: Option<Key>,
    tg: Option<TransactionGroup>,
    op: Option<LockOp>,
    stubs: LockStubTable,
    last_warn_time: Option<u64>,
}

impl LockReplicator {
    /// `new(state_key)` — allocates an uninitialized replicator.
    #[must_use]
    pub fn new(state_key: StateKey) -> Self {
        Self {
            state_key,
            state: ReplicatorState::Uninit,
            originator: None,
            table: None,
            key: None,
            tg: None,
            op: None,
            stubs: LockStubTable::new(),
            last_warn_time: None,
        }
    }

    /// `init(id, nonce, table, key, tg, op)` — one-shot (R1).
    ///
    /// # Panics
    /// Panics if called twice, per §7: "Duplicate init | Programmer error |
    /// Assertion failure (fail-fast)."
    pub fn init(&mut self, id: CommId, nonce: Nonce, table: Table, key: Key, tg: TransactionGroup, op: LockOp) {
        assert!(
            matches!(self.state, ReplicatorState::Uninit),
            "LockReplicator::init called twice for {}",
            self.state_key
        );
        self.originator = Some(Originator { id, nonce });
        self.table = Some(table);
        self.key = Some(key);
        self.tg = Some(tg);
        self.op = Some(op);
        self.state = ReplicatorState::Active;
    }

    /// `finished()` — true iff uninitialized or completed.
    #[must_use]
    pub const fn finished(&self) -> bool {
        matches!(self.state, ReplicatorState::Uninit | ReplicatorState::Finished)
    }

    #[must_use]
    pub const fn state_key(&self) -> StateKey {
        self.state_key
    }

    #[must_use]
    pub fn tg(&self) -> Option<TransactionGroup> {
        self.tg
    }

    /// `debug_dump()` — human-readable snapshot.
    #[must_use]
    pub fn debug_dump(&self) -> String {
        format!(
            "LockReplicator {{ state_key: {}, state: {:?}, tg: {:?}, op: {:?}, stubs: {} }}",
            self.state_key,
            self.state,
            self.tg,
            self.op,
            self.stubs.len(),
        )
    }

    /// `response(from, tg, rs, ctx)` — records an inbound response from a
    /// known target and triggers a work cycle. A response from an unknown
    /// target never creates a stub (§4.2): it is dropped with a debug log
    /// (scenario 6).
    pub fn response(&mut self, from: CommId, tg: TransactionGroup, rs: ReplicaSet, ctx: &mut dyn TmContext) {
        if self.finished() {
            return;
        }
        match self.stubs.get_mut(from) {
            Some(stub) => stub.set_observed(tg, rs),
            None => {
                tracing::debug!(state_key = %self.state_key, from = %from, "response from unknown target; dropped");
                return;
            }
        }
        self.work(ctx);
    }

    /// `externally_work(ctx)` — timer or external nudge to re-evaluate.
    pub fn externally_work(&mut self, ctx: &mut dyn TmContext) {
        if self.finished() {
            return;
        }
        self.work(ctx);
    }

    /// `abort(tg, ctx)` — wound-wait's mechanical half: send `WOUND` to the
    /// originator and finish, if `tg` matches.
    pub fn abort(&mut self, tg: TransactionGroup, ctx: &mut dyn TmContext) {
        if self.finished() {
            return;
        }
        if self.tg != Some(tg) {
            return;
        }
        let originator = self.originator.expect("active replicator has an originator");
        ctx.send(originator.id, MessagePayload::TxmanWound(TxmanWound::new(tg)));
        self.state = ReplicatorState::Finished;
    }

    /// `drop(tg)` — silent termination; no network send.
    #[allow(clippy::should_implement_trait)]
    pub fn drop(&mut self, tg: TransactionGroup) {
        if self.finished() {
            return;
        }
        if self.tg != Some(tg) {
            return;
        }
        self.state = ReplicatorState::Finished;
    }

    /// The work cycle (§4.3): a single fixed-point pass over the current
    /// replica set.
    fn work(&mut self, ctx: &mut dyn TmContext) {
        if self.finished() {
            return;
        }

        let table = self.table.as_ref().expect("active replicator has a table");
        let key = self.key.as_ref().expect("active replicator has a key");
        let tg = self.tg.expect("active replicator has a tg");
        let op = self.op.expect("active replicator has an op");

        // Step 1: resolve replica set. No replica set => silent no-op;
        // timer-driven re-entry retries (§9 open question).
        let cfg = ctx.get_config();
        let Some(mut rs) = cfg.hash(ctx.local_dc(), table, key) else {
            return;
        };

        // Step 2: ensure stubs for every slot's primary and (non-null)
        // transitioning member.
        for i in 0..rs.num_replicas() {
            self.stubs.get_or_create(rs.replicas()[i]);
            if let Some(t) = rs.transitioning()[i] {
                self.stubs.get_or_create(t);
            }
        }

        // Step 5: under-replication degrades desired_replication in place.
        let degraded = rs.degrade_if_under_replicated();

        let now = ctx.monotonic_time();
        let resend_interval = ctx.resend_interval();

        // Steps 3 & 4: per-slot agreement test, with resend on disagreement.
        let mut complete = 0usize;
        for i in 0..rs.num_replicas() {
            let primary = rs.replicas()[i];
            let transitioning = rs.transitioning()[i];

            let primary_agrees = stub_agrees(&self.stubs, primary, tg, &rs, &cfg);
            let transitioning_agrees = match transitioning {
                Some(t) => stub_agrees(&self.stubs, t, tg, &rs, &cfg),
                None => true,
            };

            if primary_agrees && transitioning_agrees {
                complete += 1;
                continue;
            }

            if !primary_agrees {
                try_resend(&mut self.stubs, primary, now, resend_interval, self.state_key, table, key, tg, op, ctx);
            }
            if let (Some(t), false) = (transitioning, transitioning_agrees) {
                try_resend(&mut self.stubs, t, now, resend_interval, self.state_key, table, key, tg, op, ctx);
            }
        }

        if degraded {
            self.maybe_warn_under_replication(now, resend_interval, &rs);
        }

        // Step 6: quorum check.
        let quorum = rs.quorum();
        if complete >= quorum {
            self.state = ReplicatorState::Finished;
            let rc = if degraded { ReturnCode::LessDurable } else { ReturnCode::Success };
            let originator = self.originator.expect("active replicator has an originator");
            ctx.send(
                originator.id,
                MessagePayload::KvsLockOpResp(KvsLockOpResp::new(originator.nonce, rc)),
            );
        }
    }

    fn maybe_warn_under_replication(&mut self, now: u64, resend_interval: u64, rs: &ReplicaSet) {
        let due = match self.last_warn_time {
            None => true,
            Some(last) => now.saturating_sub(last) >= resend_interval,
        };
        if !due {
            return;
        }
        self.last_warn_time = Some(now);
        tracing::warn!(
            state_key = %self.state_key,
            desired_replication = rs.desired_replication(),
            num_replicas = rs.num_replicas(),
            "replica set under-replicated; replying LESS_DURABLE",
        );
    }
}

fn stub_agrees(
    stubs: &LockStubTable,
    target: CommId,
    tg: TransactionGroup,
    rs: &ReplicaSet,
    cfg: &Configuration,
) -> bool {
    let Some(stub) = stubs.get(target) else {
        return false;
    };
    let Some(observed_tg) = stub.observed_tg() else {
        return false;
    };
    if observed_tg != tg {
        return false;
    }
    match stub.observed_rs() {
        Some(observed_rs) => cfg.replica_sets_agree(target, observed_rs, rs),
        None => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn try_resend(
    stubs: &mut LockStubTable,
    target: CommId,
    now: u64,
    resend_interval: u64,
    state_key: StateKey,
    table: &Table,
    key: &Key,
    tg: TransactionGroup,
    op: LockOp,
    ctx: &mut dyn TmContext,
) {
    let stub = stubs.get_or_create(target);
    if !stub.resend_due(now, resend_interval) {
        return;
    }
    stub.mark_sent(now);
    if debug_enabled() {
        tracing::trace!(%state_key, %target, %tg, %op, "sending KVS_RAW_LK");
    }
    let payload = MessagePayload::KvsRawLk(KvsRawLk::new(state_key, table.clone(), key.clone(), tg, op));
    ctx.send(target, payload);
}
