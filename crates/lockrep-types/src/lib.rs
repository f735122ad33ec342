//! Core identifiers and value types shared across the lock-replicator crates.
//!
//! These are deliberately thin: newtypes over integers and byte strings,
//! with just enough trait surface (ordering, display, serde) for the
//! replica-set oracle, the wire codec, and the replicator state machine to
//! share a common vocabulary without depending on each other's internals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of a node in the cluster.
///
/// Issued by the coordinator and stable for the node's lifetime; the
/// lock-replicator never interprets the value, only compares and routes on
/// it.
///
/// ```
/// use lockrep_types::CommId;
///
/// let a = CommId::new(7);
/// assert_eq!(a.as_u64(), 7);
/// assert_eq!(a.to_string(), "comm#7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommId(u64);

impl CommId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "comm#{}", self.0)
    }
}

impl From<u64> for CommId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<CommId> for u64 {
    fn from(id: CommId) -> Self {
        id.0
    }
}

/// Local data-center identifier (`ctx.us.dc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataCenterId(u32);

impl DataCenterId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DataCenterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dc#{}", self.0)
    }
}

impl From<u32> for DataCenterId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Registry key used to demultiplex inbound responses to a live replicator.
///
/// Chosen by the creating transaction manager; unique among that TM's
/// outstanding lock operations and echoed verbatim by the KVS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey(u64);

impl StateKey {
    #[must_use]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state_key#{}", self.0)
    }
}

impl From<u64> for StateKey {
    fn from(key: u64) -> Self {
        Self(key)
    }
}

/// Opaque request correlator echoed back verbatim in `KVS_LOCK_OP_RESP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nonce(u64);

impl Nonce {
    #[must_use]
    pub const fn new(nonce: u64) -> Self {
        Self(nonce)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nonce#{}", self.0)
    }
}

impl From<u64> for Nonce {
    fn from(nonce: u64) -> Self {
        Self(nonce)
    }
}

/// Monotonic clock reading, in whatever unit the embedding daemon uses.
///
/// Strictly non-decreasing across calls to `monotonic_time()`; never
/// interpreted as wall-clock time anywhere in this crate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn saturating_sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Transaction identifier with a comparable total order.
///
/// Ordering is by `timestamp` first, `id` second as a tie-break; this is
/// what wound-wait compares to decide who yields (older `timestamp` wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionGroup {
    id: u64,
    timestamp: Timestamp,
}

impl TransactionGroup {
    #[must_use]
    pub const fn new(id: u64, timestamp: Timestamp) -> Self {
        Self { id, timestamp }
    }

    #[must_use]
    pub const fn id(self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn timestamp(self) -> Timestamp {
        self.timestamp
    }

    /// True if `self` is strictly older than `other` under wound-wait's
    /// ordering (lower timestamp wins; tie broken by id).
    #[must_use]
    pub fn is_older_than(self, other: Self) -> bool {
        self < other
    }
}

impl PartialOrd for TransactionGroup {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransactionGroup {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp.cmp(&other.timestamp).then(self.id.cmp(&other.id))
    }
}

impl fmt::Display for TransactionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tg#{}@{}", self.id, self.timestamp)
    }
}

/// Byte-string table name. Immutable within an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table(Vec<u8>);

impl Table {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Table {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

/// Byte-string key. Immutable within an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

/// The two lock operations the replicator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockOp {
    Lock,
    Unlock,
}

impl fmt::Display for LockOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockOp::Lock => "LOCK",
            LockOp::Unlock => "UNLOCK",
        })
    }
}

/// Outcome reported to the originator in `KVS_LOCK_OP_RESP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnCode {
    /// Quorum reached with full desired replication.
    Success,
    /// Quorum reached, but the configuration could not provide
    /// `desired_replication` replicas.
    LessDurable,
    /// A transport-layer code propagated verbatim by the dispatcher; not
    /// produced by the replicator itself.
    Other(u8),
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnCode::Success => f.write_str("SUCCESS"),
            ReturnCode::LessDurable => f.write_str("LESS_DURABLE"),
            ReturnCode::Other(code) => write!(f, "OTHER({code})"),
        }
    }
}
