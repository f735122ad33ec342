//! Wire messages exchanged between the lock-replicator and its KVS
//! replicas (§6).
//!
//! Framing reserves a fixed [`HEADER_SIZE`]-byte prefix before the payload
//! for the transport layer; per §9's design note, that prefix is a contract
//! of the send layer, not something the replicator or this codec interpret.
//! This crate zero-fills it on encode and skips it on decode.

use lockrep_types::{LockOp, Nonce, ReturnCode, StateKey, Table, TransactionGroup};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes reserved for the transport header before the payload begins.
pub const HEADER_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode message payload: {0}")]
    Encode(postcard::Error),
    #[error("failed to decode message payload: {0}")]
    Decode(postcard::Error),
    #[error("buffer too short for header: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// A request to establish or release a lock at a single KVS replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvsRawLk {
    pub state_key: StateKey,
    pub table: Table,
    pub key: lockrep_types::Key,
    pub tg: TransactionGroup,
    pub op: LockOp,
}

impl KvsRawLk {
    #[must_use]
    pub fn new(
        state_key: StateKey,
        table: Table,
        key: lockrep_types::Key,
        tg: TransactionGroup,
        op: LockOp,
    ) -> Self {
        Self { state_key, table, key, tg, op }
    }
}

/// The terminal response sent once, to the originator, on quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvsLockOpResp {
    pub nonce: Nonce,
    pub rc: ReturnCode,
}

impl KvsLockOpResp {
    #[must_use]
    pub fn new(nonce: Nonce, rc: ReturnCode) -> Self {
        Self { nonce, rc }
    }
}

/// Sent to the originating transaction manager on `abort` (wound-wait).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxmanWound {
    pub tg: TransactionGroup,
}

impl TxmanWound {
    #[must_use]
    pub fn new(tg: TransactionGroup) -> Self {
        Self { tg }
    }
}

/// The union of payloads this crate knows how to frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePayload {
    KvsRawLk(KvsRawLk),
    KvsLockOpResp(KvsLockOpResp),
    TxmanWound(TxmanWound),
}

impl MessagePayload {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            MessagePayload::KvsRawLk(_) => "KVS_RAW_LK",
            MessagePayload::KvsLockOpResp(_) => "KVS_LOCK_OP_RESP",
            MessagePayload::TxmanWound(_) => "TXMAN_WOUND",
        }
    }
}

/// Encode a payload with a zero-filled `HEADER_SIZE`-byte prefix reserved
/// for the transport.
pub fn encode(payload: &MessagePayload) -> Result<Vec<u8>, WireError> {
    let mut buf = vec![0u8; HEADER_SIZE];
    let body = postcard::to_allocvec(payload).map_err(WireError::Encode)?;
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode a payload, skipping the leading `HEADER_SIZE` bytes the transport
/// owns.
pub fn decode(bytes: &[u8]) -> Result<MessagePayload, WireError> {
    if bytes.len() < HEADER_SIZE {
        return Err(WireError::Truncated { expected: HEADER_SIZE, actual: bytes.len() });
    }
    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(WireError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockrep_types::{Key, Timestamp};

    fn sample_tg() -> TransactionGroup {
        TransactionGroup::new(1, Timestamp::new(100))
    }

    #[test]
    fn kvs_raw_lk_roundtrips() {
        let payload = MessagePayload::KvsRawLk(KvsRawLk::new(
            StateKey::new(7),
            Table::from("orders"),
            Key::from("order-1"),
            sample_tg(),
            LockOp::Lock,
        ));
        let encoded = encode(&payload).unwrap();
        assert_eq!(&encoded[..HEADER_SIZE], &[0u8; HEADER_SIZE]);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn kvs_lock_op_resp_roundtrips() {
        let payload =
            MessagePayload::KvsLockOpResp(KvsLockOpResp::new(Nonce::new(9), ReturnCode::LessDurable));
        let encoded = encode(&payload).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn txman_wound_roundtrips() {
        let payload = MessagePayload::TxmanWound(TxmanWound::new(sample_tg()));
        let encoded = encode(&payload).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn decode_rejects_truncated_buffers() {
        let err = decode(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { expected: HEADER_SIZE, actual: 4 }));
    }

    #[test]
    fn message_payload_name() {
        let payload = MessagePayload::TxmanWound(TxmanWound::new(sample_tg()));
        assert_eq!(payload.name(), "TXMAN_WOUND");
    }

    proptest::proptest! {
        #[test]
        fn prop_kvs_raw_lk_roundtrip(state_key in 0u64..10_000, tg_id in 0u64..10_000, ts in 0u64..10_000) {
            let payload = MessagePayload::KvsRawLk(KvsRawLk::new(
                StateKey::new(state_key),
                Table::from("t"),
                Key::from("k"),
                TransactionGroup::new(tg_id, Timestamp::new(ts)),
                LockOp::Lock,
            ));
            let encoded = encode(&payload).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, payload);
        }

        #[test]
        fn prop_header_always_reserved_and_zeroed(nonce in 0u64..10_000) {
            let payload = MessagePayload::KvsLockOpResp(KvsLockOpResp::new(Nonce::new(nonce), ReturnCode::Success));
            let encoded = encode(&payload).unwrap();
            assert!(encoded.len() >= HEADER_SIZE);
            assert!(encoded[..HEADER_SIZE].iter().all(|&b| b == 0));
        }
    }
}
