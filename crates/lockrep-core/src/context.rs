//! The context handle injected at each [`crate::LockReplicator`] entry
//! point (§9 "Cyclic ownership").
//!
//! The original design threads a daemon context pointer through every
//! call; here that becomes a trait object passed by reference per call.
//! `LockReplicator` never stores a `&dyn TmContext` field — every method
//! that needs one takes it as a parameter and lets it go out of scope at
//! the end of the call, which is what makes "the replicator does not store
//! the context" true by construction rather than by convention.

use lockrep_replicaset::Configuration;
use lockrep_types::{CommId, DataCenterId};
use lockrep_wire::MessagePayload;

/// Capabilities a [`crate::LockReplicator`] needs from its embedding
/// daemon: cluster configuration, identity, clock, resend policy, and a
/// non-blocking send queue (§6).
pub trait TmContext {
    /// `ctx.get_config()` — a snapshot of cluster membership.
    fn get_config(&self) -> Configuration;

    /// `ctx.us.dc` — local data-center identifier.
    fn local_dc(&self) -> DataCenterId;

    /// `ctx.resend_interval()`, in monotonic-time units.
    fn resend_interval(&self) -> u64;

    /// `monotonic_time()` — strictly non-decreasing.
    fn monotonic_time(&self) -> u64;

    /// `ctx.send(target, msg)` — non-blocking enqueue; failures are the
    /// send layer's problem, never the replicator's (resend covers it).
    fn send(&mut self, target: CommId, payload: MessagePayload);
}
