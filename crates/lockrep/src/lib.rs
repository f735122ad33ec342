//! # lockrep
//!
//! The lock-replicator core of a geo-distributed transactional key-value
//! store: the per-transaction state machine that drives a single `LOCK` or
//! `UNLOCK` operation to quorum across a replica set, with wound-wait
//! deadlock avoidance and safety under arbitrary message reordering and
//! duplication.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            lockrep                                  │
//! │  ┌────────────┐   ┌───────────┐   ┌────────────┐   ┌───────────┐ │
//! │  │ replicaset │ → │   core    │ → │    wire    │   │  config   │ │
//! │  │ (oracle)   │   │(state mc) │   │ (framing)  │   │ (loader)  │ │
//! │  └────────────┘   └───────────┘   └────────────┘   └───────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `lockrep-core` is the heart: [`LockReplicator`] and [`ReplicatorRegistry`].
//! Everything else is either a pure leaf dependency (`lockrep-replicaset`,
//! `lockrep-wire`) or ambient scaffolding the embedding daemon uses to wire
//! the core up (`lockrep-config`).
//!
//! This crate owns no transport, no event loop, and no CLI — an embedding
//! daemon supplies those by implementing [`TmContext`] and driving a
//! [`ReplicatorRegistry`] from its own I/O layer. See `lockrep-sim` for an
//! in-memory implementation used in this workspace's own tests.
//!
//! # Quick start
//!
//! ```ignore
//! use lockrep::{LockRepConfig, ReplicatorRegistry, TmContext};
//!
//! let config = LockRepConfig::load(None)?;
//! let mut registry = ReplicatorRegistry::new(config.gc_grace_period_ms());
//! // registry.start(...) on each new LOCK/UNLOCK, then drive it with
//! // registry.response(...) / registry.work_all(...) from your event loop.
//! ```

pub use lockrep_config::{ConfigError, LockRepConfig};
pub use lockrep_core::{debug_enabled, set_debug, DispatchError, LockReplicator, LockStub, LockStubTable, ReplicatorRegistry, TmContext};
pub use lockrep_replicaset::{Configuration, OracleError, ReplicaSet};
pub use lockrep_types::{CommId, DataCenterId, Key, LockOp, Nonce, ReturnCode, StateKey, Table, Timestamp, TransactionGroup};
pub use lockrep_wire::{decode, encode, KvsLockOpResp, KvsRawLk, MessagePayload, TxmanWound, WireError, HEADER_SIZE};

#[cfg(test)]
mod tests {
    use super::*;
    use lockrep_sim::InMemoryContext;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("lockrep=debug").try_init();
    }

    #[test]
    fn end_to_end_lock_via_registry() {
        init_test_logging();
        let config = LockRepConfig::default();
        let mut registry = ReplicatorRegistry::new(config.gc_grace_period_ms());
        let mut ctx = InMemoryContext::builder()
            .members(vec![CommId::new(0), CommId::new(1), CommId::new(2)])
            .desired_replication(3)
            .resend_interval(config.resend_interval_ms)
            .build();

        let state_key = StateKey::new(1);
        let originator = CommId::new(7);
        let tg = TransactionGroup::new(1, Timestamp::new(1));
        registry.start(state_key, originator, Nonce::new(1), Table::from("orders"), Key::from("o-1"), tg, LockOp::Lock);

        registry.work_all(&mut ctx);
        let rs = ctx.get_config().hash(ctx.local_dc(), &Table::from("orders"), &Key::from("o-1")).unwrap();
        for target in rs.replicas() {
            registry.response(state_key, *target, tg, rs.clone(), &mut ctx).unwrap();
        }

        assert!(registry.get(state_key).unwrap().finished());
        assert_eq!(ctx.drain_kvs_lock_op_resp(originator).len(), 1);
    }
}
