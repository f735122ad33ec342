//! Dispatcher-level errors.
//!
//! None of these are raised by [`crate::LockReplicator`] itself — its
//! public contract never returns `Result` (§7's policy table handles every
//! in-core condition as a log line or a return code). These exist only at
//! the registry boundary, where a caller legitimately needs to distinguish
//! "already finished and reaped" from "never existed".

use lockrep_types::StateKey;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no replicator registered for {0}")]
    UnknownStateKey(StateKey),
}
