//! Poll-closing snapshot checksums.
//!
//! The checksum binds the poll id, the candidate set, a caller-supplied hash
//! of the full ballot set and the opaque round results.  Candidates are
//! sorted before hashing so the checksum does not depend on the order the
//! caller listed them in; the record itself keeps the caller's order.  The
//! poll's Merkle root is captured next to the checksum, never folded into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AuditResult;
use crate::hash::{empty_root, hash, Digest};
use crate::manager::BallotVerificationManager;

/// Auditable record produced once per poll close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotChecksum {
    /// Poll identifier.
    pub poll_id: String,
    /// Candidate ids exactly as supplied.
    pub candidate_ids: Vec<String>,
    /// Externally computed hash of the full ballot set.
    pub ballots_hash: String,
    /// Opaque round results produced by the tally.
    pub rounds: serde_json::Value,
    /// Digest over the canonical `{pollId, candidateIds, ballotsHash, rounds}`.
    pub checksum: Digest,
    /// Root of the poll's tree when the snapshot was taken.
    pub merkle_root: Digest,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChecksumPayload<'a> {
    poll_id: &'a str,
    candidate_ids: Vec<&'a str>,
    ballots_hash: &'a str,
    rounds: &'a serde_json::Value,
}

/// Computes the snapshot checksum digest.  Candidate order is irrelevant.
pub fn compute_checksum(
    poll_id: &str,
    candidate_ids: &[String],
    ballots_hash: &str,
    rounds: &serde_json::Value,
) -> AuditResult<Digest> {
    let mut sorted: Vec<&str> = candidate_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let payload = ChecksumPayload {
        poll_id,
        candidate_ids: sorted,
        ballots_hash,
        rounds,
    };
    Ok(hash(&serde_json::to_vec(&payload)?))
}

/// Recomputes the checksum of a snapshot record and compares it with the one
/// it carries.  The Merkle root is not checked here; it is verified against
/// ballot proofs or a replay bundle.
pub fn verify_snapshot_checksum(snapshot: &SnapshotChecksum) -> bool {
    match compute_checksum(
        &snapshot.poll_id,
        &snapshot.candidate_ids,
        &snapshot.ballots_hash,
        &snapshot.rounds,
    ) {
        Ok(checksum) => checksum == snapshot.checksum,
        Err(err) => {
            debug!(error = %err, "snapshot rejected: rounds not encodable");
            false
        }
    }
}

impl BallotVerificationManager {
    /// Produces the snapshot record for a closing poll.
    ///
    /// A poll with no committed ballots snapshots the empty-tree root.
    pub fn generate_snapshot_checksum<R>(
        &self,
        poll_id: &str,
        candidate_ids: &[String],
        ballots_hash: &str,
        round_results: &R,
    ) -> AuditResult<SnapshotChecksum>
    where
        R: Serialize + ?Sized,
    {
        let rounds = serde_json::to_value(round_results)?;
        let checksum = compute_checksum(poll_id, candidate_ids, ballots_hash, &rounds)?;
        let merkle_root = self.get_root(poll_id).unwrap_or_else(empty_root);
        info!(poll_id, checksum = %checksum, merkle_root = %merkle_root, "snapshot taken");
        Ok(SnapshotChecksum {
            poll_id: poll_id.to_string(),
            candidate_ids: candidate_ids.to_vec(),
            ballots_hash: ballots_hash.to_string(),
            rounds,
            checksum,
            merkle_root,
            timestamp: self.now(),
        })
    }
}
