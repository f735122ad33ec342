//! The replica-set oracle: a pure function from cluster configuration to the
//! set of KVS replicas responsible for a `(dc, table, key)` triple.
//!
//! Ranking uses rendezvous (highest-random-weight) hashing keyed by
//! `(dc, table, key, member)`: deterministic, requires no shared state
//! beyond the current [`Configuration`], and never blocks. This is the same
//! property the teacher's VSR reconfiguration state gives for quorum
//! membership — a pure function of the current config snapshot, swapped
//! atomically between work cycles.

use lockrep_types::{CommId, DataCenterId, Key, Table};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing a [`Configuration`]. These are programmer/operator
/// errors caught at configuration-build time, not conditions the oracle
/// encounters during a work cycle (those are represented by `hash`
/// returning `None`, per spec).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("configuration has zero members")]
    EmptyMembership,
    #[error("desired_replication must be at least 1")]
    ZeroDesiredReplication,
}

/// Cluster membership topology backing the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Topology {
    Stable { members: Vec<CommId> },
    Joint { old_members: Vec<CommId>, new_members: Vec<CommId> },
}

/// A snapshot of cluster configuration the oracle ranks replicas against.
///
/// `epoch` increments on every configuration change; two [`ReplicaSet`]
/// values "agree" (§4.3 step 3) when they were produced under the same
/// epoch, which is exactly [`Configuration::replica_sets_agree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    epoch: u64,
    desired_replication: usize,
    topology: Topology,
}

impl Configuration {
    /// A stable (non-reconfiguring) configuration.
    pub fn new_stable(
        epoch: u64,
        desired_replication: usize,
        members: Vec<CommId>,
    ) -> Result<Self, OracleError> {
        if desired_replication == 0 {
            return Err(OracleError::ZeroDesiredReplication);
        }
        if members.is_empty() {
            return Err(OracleError::EmptyMembership);
        }
        Ok(Self {
            epoch,
            desired_replication,
            topology: Topology::Stable { members },
        })
    }

    /// A configuration mid-reconfiguration: `old_members` still serve as
    /// primaries, `new_members` populate the transitioning slots.
    pub fn new_joint(
        epoch: u64,
        desired_replication: usize,
        old_members: Vec<CommId>,
        new_members: Vec<CommId>,
    ) -> Result<Self, OracleError> {
        if desired_replication == 0 {
            return Err(OracleError::ZeroDesiredReplication);
        }
        if old_members.is_empty() {
            return Err(OracleError::EmptyMembership);
        }
        Ok(Self {
            epoch,
            desired_replication,
            topology: Topology::Joint { old_members, new_members },
        })
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub const fn desired_replication(&self) -> usize {
        self.desired_replication
    }

    #[must_use]
    pub const fn is_joint(&self) -> bool {
        matches!(self.topology, Topology::Joint { .. })
    }

    /// `hash(dc, table, key) -> Option<ReplicaSet>` (§4.1).
    ///
    /// Returns `None` only when the stable/old membership is empty, which
    /// cannot happen for a `Configuration` built via the constructors above
    /// but is kept as a runtime check rather than an invariant, since the
    /// oracle is meant to degrade gracefully rather than panic mid work
    /// cycle.
    #[must_use]
    pub fn hash(&self, dc: DataCenterId, table: &Table, key: &Key) -> Option<ReplicaSet> {
        match &self.topology {
            Topology::Stable { members } => {
                let replicas = top_ranked(dc, table, key, members, self.desired_replication)?;
                let transitioning = vec![None; replicas.len()];
                Some(ReplicaSet {
                    epoch: self.epoch,
                    desired_replication: self.desired_replication,
                    replicas,
                    transitioning,
                })
            }
            Topology::Joint { old_members, new_members } => {
                let replicas = top_ranked(dc, table, key, old_members, self.desired_replication)?;
                let incoming = top_ranked(dc, table, key, new_members, replicas.len())
                    .unwrap_or_default();
                let transitioning = (0..replicas.len())
                    .map(|i| incoming.get(i).copied())
                    .collect();
                Some(ReplicaSet {
                    epoch: self.epoch,
                    desired_replication: self.desired_replication,
                    replicas,
                    transitioning,
                })
            }
        }
    }

    /// `replica_sets_agree(node, rs_a, rs_b) -> bool` (§6 collaborator
    /// interface). `node` is accepted for interface fidelity but unused:
    /// agreement is a property of the replica-set epoch, not of who's
    /// asking.
    #[must_use]
    pub fn replica_sets_agree(&self, _node: CommId, rs_a: &ReplicaSet, rs_b: &ReplicaSet) -> bool {
        rs_a.epoch == rs_b.epoch
    }
}

fn top_ranked(
    dc: DataCenterId,
    table: &Table,
    key: &Key,
    members: &[CommId],
    count: usize,
) -> Option<Vec<CommId>> {
    if members.is_empty() {
        return None;
    }
    let mut scored: Vec<(u64, CommId)> = members
        .iter()
        .map(|&member| (rendezvous_score(dc, table, key, member), member))
        .collect();
    // Sort descending by score, tie-broken by CommId for determinism.
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.truncate(count.min(members.len()));
    Some(scored.into_iter().map(|(_, member)| member).collect())
}

fn rendezvous_score(dc: DataCenterId, table: &Table, key: &Key, member: CommId) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&dc.as_u32().to_le_bytes());
    hasher.update(table.as_bytes());
    hasher.update(key.as_bytes());
    hasher.update(&member.as_u64().to_le_bytes());
    let digest = hasher.finalize();
    let bytes = digest.as_bytes();
    u64::from_le_bytes(bytes[0..8].try_into().expect("blake3 digest is at least 8 bytes"))
}

/// Replicas responsible for a key, plus the aligned transitioning view
/// during a reconfiguration (§3, §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSet {
    epoch: u64,
    desired_replication: usize,
    replicas: Vec<CommId>,
    transitioning: Vec<Option<CommId>>,
}

impl ReplicaSet {
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn num_replicas(&self) -> usize {
        self.replicas.len()
    }

    #[must_use]
    pub const fn desired_replication(&self) -> usize {
        self.desired_replication
    }

    #[must_use]
    pub fn replicas(&self) -> &[CommId] {
        &self.replicas
    }

    #[must_use]
    pub fn transitioning(&self) -> &[Option<CommId>] {
        &self.transitioning
    }

    /// True if the configuration could not provide `desired_replication`
    /// replicas (§4.3 step 5). Does not mutate `self`.
    #[must_use]
    pub fn is_under_replicated(&self) -> bool {
        self.desired_replication > self.num_replicas()
    }

    /// Clamp `desired_replication` down to `num_replicas` if under-replicated,
    /// returning whether degradation occurred. Idempotent.
    pub fn degrade_if_under_replicated(&mut self) -> bool {
        if self.is_under_replicated() {
            self.desired_replication = self.num_replicas();
            true
        } else {
            false
        }
    }

    /// `⌊desired_replication / 2⌋ + 1`.
    #[must_use]
    pub const fn quorum(&self) -> usize {
        self.desired_replication / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u64) -> Vec<CommId> {
        (0..n).map(CommId::new).collect()
    }

    #[test]
    fn stable_config_picks_desired_replication_replicas() {
        let cfg = Configuration::new_stable(1, 3, ids(5)).unwrap();
        let rs = cfg
            .hash(DataCenterId::new(0), &Table::from("t"), &Key::from("k"))
            .unwrap();
        assert_eq!(rs.num_replicas(), 3);
        assert_eq!(rs.desired_replication(), 3);
        assert!(!rs.is_under_replicated());
        assert_eq!(rs.transitioning().len(), 3);
        assert!(rs.transitioning().iter().all(Option::is_none));
    }

    #[test]
    fn under_replicated_cluster_degrades() {
        let cfg = Configuration::new_stable(1, 5, ids(2)).unwrap();
        let mut rs = cfg
            .hash(DataCenterId::new(0), &Table::from("t"), &Key::from("k"))
            .unwrap();
        assert_eq!(rs.num_replicas(), 2);
        assert!(rs.is_under_replicated());
        assert!(rs.degrade_if_under_replicated());
        assert_eq!(rs.desired_replication(), 2);
        assert_eq!(rs.quorum(), 2);
        assert!(!rs.degrade_if_under_replicated());
    }

    #[test]
    fn hash_is_deterministic_for_fixed_configuration() {
        let cfg = Configuration::new_stable(1, 3, ids(5)).unwrap();
        let dc = DataCenterId::new(0);
        let table = Table::from("orders");
        let key = Key::from("order-42");
        let a = cfg.hash(dc, &table, &key).unwrap();
        let b = cfg.hash(dc, &table, &key).unwrap();
        assert_eq!(a.replicas(), b.replicas());
    }

    #[test]
    fn joint_config_aligns_transitioning_slots() {
        let cfg = Configuration::new_joint(2, 3, ids(5), ids(5).into_iter().map(|c| CommId::new(c.as_u64() + 100)).collect()).unwrap();
        let rs = cfg
            .hash(DataCenterId::new(0), &Table::from("t"), &Key::from("k"))
            .unwrap();
        assert_eq!(rs.num_replicas(), 3);
        assert_eq!(rs.transitioning().len(), 3);
        assert!(rs.transitioning().iter().all(Option::is_some));
    }

    #[test]
    fn replica_sets_agree_by_epoch_only() {
        let cfg_a = Configuration::new_stable(1, 3, ids(5)).unwrap();
        let cfg_b = Configuration::new_stable(2, 3, ids(5)).unwrap();
        let dc = DataCenterId::new(0);
        let table = Table::from("t");
        let key = Key::from("k");
        let rs_a = cfg_a.hash(dc, &table, &key).unwrap();
        let rs_b = cfg_b.hash(dc, &table, &key).unwrap();
        assert!(cfg_a.replica_sets_agree(CommId::new(0), &rs_a, &rs_a));
        assert!(!cfg_a.replica_sets_agree(CommId::new(0), &rs_a, &rs_b));
    }

    #[test]
    fn empty_membership_rejected_at_construction() {
        assert_eq!(
            Configuration::new_stable(1, 3, vec![]).unwrap_err(),
            OracleError::EmptyMembership
        );
        assert_eq!(
            Configuration::new_stable(1, 0, ids(3)).unwrap_err(),
            OracleError::ZeroDesiredReplication
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_num_replicas_never_exceeds_desired(
            member_count in 1usize..10,
            desired in 1usize..10,
        ) {
            let cfg = Configuration::new_stable(1, desired, ids(member_count as u64)).unwrap();
            let rs = cfg.hash(DataCenterId::new(0), &Table::from("t"), &Key::from("k")).unwrap();
            assert!(rs.num_replicas() <= desired);
            assert!(rs.num_replicas() <= member_count);
        }

        #[test]
        fn prop_hash_deterministic(member_count in 1usize..10, desired in 1usize..10) {
            let cfg = Configuration::new_stable(1, desired, ids(member_count as u64)).unwrap();
            let dc = DataCenterId::new(0);
            let table = Table::from("t");
            let key = Key::from("k");
            let a = cfg.hash(dc, &table, &key);
            let b = cfg.hash(dc, &table, &key);
            assert_eq!(a, b);
        }
    }
}
