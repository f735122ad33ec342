//! The lock-replicator core: the per-lock-operation state machine, its
//! per-target stub bookkeeping, and the registry that dispatches inbound
//! protocol messages to live replicators.
//!
//! This crate owns no configuration, no CLI, no on-disk state, and no
//! network transport — every external capability reaches it through
//! [`TmContext`], supplied once per call by the embedding daemon.

mod context;
mod error;
mod registry;
mod replicator;
mod stub;

pub use context::TmContext;
pub use error::DispatchError;
pub use registry::ReplicatorRegistry;
pub use replicator::{debug_enabled, set_debug, LockReplicator};
pub use stub::{LockStub, LockStubTable};
