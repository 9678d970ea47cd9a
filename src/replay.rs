//! Replay bundles: every commitment of a poll plus its root and the label of
//! the counting method, exported for independent re-computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::hash::Digest;
use crate::manager::{BallotCommitment, BallotVerificationManager};
use crate::tree::MerkleTree;

/// Export artifact for a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayBundle {
    /// Poll identifier.
    pub poll_id: String,
    /// One commitment per leaf, in tree order.
    pub commitments: Vec<BallotCommitment>,
    /// Root of the poll's tree at export time.
    pub merkle_root: Digest,
    /// Free-text label of the counting algorithm and version.
    pub methodology: String,
    /// When the bundle was produced.
    pub timestamp: DateTime<Utc>,
}

impl ReplayBundle {
    /// Number of commitments carried.
    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    /// Returns `true` when the bundle carries no commitments.
    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }
}

/// Rebuilds the tree from the bundle's leaves, in order, and checks that it
/// reproduces the bundled root.
pub fn verify_replay_bundle(bundle: &ReplayBundle) -> bool {
    let leaves = bundle.commitments.iter().map(|c| c.leaf).collect();
    let root = MerkleTree::from_leaves(leaves).root();
    if root != bundle.merkle_root {
        debug!(poll_id = %bundle.poll_id, "replay bundle rejected: root mismatch");
        return false;
    }
    true
}

impl BallotVerificationManager {
    /// Packages every commitment of `poll_id`.  Returns `None` when the poll
    /// has no tree.
    pub fn generate_replay_data(&self, poll_id: &str, methodology: &str) -> Option<ReplayBundle> {
        let timestamp = self.now();
        let bundle = self.with_ledger(poll_id, |ledger| {
            let commitments = ledger
                .tree
                .leaves()
                .iter()
                .zip(&ledger.records)
                .enumerate()
                .map(|(index, (leaf, record))| BallotCommitment {
                    ballot_id: ledger.ballot_id(index),
                    poll_id: poll_id.to_string(),
                    leaf: *leaf,
                    timestamp: record.timestamp,
                    proof: None,
                })
                .collect();
            ReplayBundle {
                poll_id: poll_id.to_string(),
                commitments,
                merkle_root: ledger.root(),
                methodology: methodology.to_string(),
                timestamp,
            }
        })?;
        info!(
            poll_id,
            ballots = bundle.len(),
            methodology,
            merkle_root = %bundle.merkle_root,
            "replay bundle exported"
        );
        Some(bundle)
    }

    /// [`generate_replay_data`](Self::generate_replay_data) with the
    /// configured default methodology.
    pub fn generate_replay_data_default(&self, poll_id: &str) -> Option<ReplayBundle> {
        let methodology = self.config().default_methodology.clone();
        self.generate_replay_data(poll_id, &methodology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::encoding::leaf_digest;
    use crate::hash::hash;
    use crate::manager::FixedClock;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> BallotVerificationManager {
        let clock = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).single().unwrap();
        BallotVerificationManager::with_clock(AuditConfig::default(), Arc::new(FixedClock::new(clock)))
    }

    #[test]
    fn test_bundle_keeps_ids_and_order() {
        let manager = manager();
        let first = manager.add_ballot("p1", "alice", &json!(["x", "y"])).unwrap();
        let second = manager.add_ballot("p1", "bob", &json!(["y", "x"])).unwrap();
        let bundle = manager.generate_replay_data("p1", "irv-v2").unwrap();
        assert_eq!(bundle.commitments, vec![first, second]);
        assert_eq!(bundle.methodology, "irv-v2");
        assert_eq!(Some(bundle.merkle_root), manager.get_root("p1"));
        assert!(verify_replay_bundle(&bundle));
    }

    #[test]
    fn test_restored_leaves_get_positional_ids() {
        let manager = manager();
        manager.restore_poll("p1", vec![hash(b"one"), hash(b"two")]);
        let bundle = manager.generate_replay_data_default("p1").unwrap();
        let ids: Vec<&str> = bundle.commitments.iter().map(|c| c.ballot_id.as_str()).collect();
        assert_eq!(ids, vec!["ballot-0", "ballot-1"]);
        assert_eq!(bundle.methodology, "irv-v1");
        assert!(verify_replay_bundle(&bundle));
    }

    #[test]
    fn test_restored_leaves_carry_no_timestamp() {
        let manager = manager();
        manager.restore_poll("p1", vec![hash(b"one")]);
        let bundle = manager.generate_replay_data_default("p1").unwrap();
        assert_eq!(bundle.commitments[0].timestamp, None);
        let value = serde_json::to_value(&bundle).unwrap();
        assert!(value["commitments"][0].get("timestamp").is_none());
    }

    #[test]
    fn test_bundle_timestamps_rederive_leaves() {
        let source = manager();
        let payload = json!({"rank": ["x"]});
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
        source.add_ballot_at("p1", "alice", &payload, at).unwrap();
        let bundle = source.generate_replay_data("p1", "irv-v1").unwrap();

        let restored = manager();
        restored.restore_commitments("p1", bundle.commitments.clone());
        let again = restored.generate_replay_data("p1", "irv-v1").unwrap();
        assert_eq!(again.commitments, bundle.commitments);
        let commitment = &again.commitments[0];
        assert_eq!(commitment.timestamp, Some(at));
        let leaf = leaf_digest("alice", "p1", &payload, &at).unwrap();
        assert_eq!(commitment.leaf, leaf);
    }

    #[test]
    fn test_reordered_bundle_fails() {
        let manager = manager();
        for n in 0..3 {
            manager.add_ballot("p1", &format!("b{n}"), &json!(n)).unwrap();
        }
        let mut bundle = manager.generate_replay_data("p1", "irv-v1").unwrap();
        bundle.commitments.swap(0, 1);
        assert!(!verify_replay_bundle(&bundle));
    }

    #[test]
    fn test_unknown_poll_has_no_bundle() {
        assert!(manager().generate_replay_data("ghost", "irv-v1").is_none());
    }
}
