//! Poll-keyed registry of Merkle trees and the external audit operations.
//!
//! Every poll id maps to its own ledger behind its own mutex, so
//! writers on one poll never serialize readers or writers on another.  The
//! outer map is only write-locked when a poll is created, restored, or
//! removed.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::AuditConfig;
use crate::encoding::leaf_digest;
use crate::error::AuditResult;
use crate::hash::Digest;
use crate::proof::{verify_proof, MerkleProof};
use crate::tree::MerkleTree;

/// Source of submission timestamps.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock, used to make commitments reproducible.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Starts the clock at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = *now + delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Record produced for every ballot appended to a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotCommitment {
    /// Caller-supplied ballot id, or `ballot-<index>` for restored leaves.
    pub ballot_id: String,
    /// Poll the ballot belongs to.
    pub poll_id: String,
    /// Leaf digest committed to the tree.
    pub leaf: Digest,
    /// Submission instant folded into the leaf digest.  `None` for leaves
    /// restored from bare digests, whose submission instant is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Inclusion proof, when requested at insertion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<MerkleProof>,
}

/// Public audit record of a poll's current commitment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentLog {
    /// Poll identifier.
    pub poll_id: String,
    /// Current Merkle root.
    pub root: Digest,
    /// Number of committed ballots.
    pub leaf_count: usize,
    /// When this record was produced.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct LeafRecord {
    pub(crate) ballot_id: Option<String>,
    pub(crate) timestamp: Option<DateTime<Utc>>,
}

/// Tree plus the per-leaf metadata retained alongside it.
#[derive(Debug, Default)]
pub(crate) struct PollLedger {
    pub(crate) tree: MerkleTree,
    pub(crate) records: Vec<LeafRecord>,
    /// Leaf count behind every root handed out for this poll.
    published: HashMap<Digest, usize>,
    /// Set once the ledger has been detached from the poll map.
    retired: bool,
}

impl PollLedger {
    pub(crate) fn root(&mut self) -> Digest {
        let root = self.tree.root();
        self.published.insert(root, self.tree.leaf_count());
        root
    }

    /// Ballot id for the leaf at `index`, synthesized from the position when
    /// the original id is unknown.
    pub(crate) fn ballot_id(&self, index: usize) -> String {
        self.records
            .get(index)
            .and_then(|record| record.ballot_id.clone())
            .unwrap_or_else(|| format!("ballot-{index}"))
    }

    /// Inclusion proof for the leaf at `index` against the current tree.
    /// The root it carries counts as handed out.
    pub(crate) fn proof_at(&mut self, index: usize) -> Option<MerkleProof> {
        let proof = self.tree.generate_proof_at(index)?;
        self.published.insert(proof.root, self.tree.leaf_count());
        Some(proof)
    }

    /// Leaf count of the tree that produced `root`.  Only roots this ledger
    /// handed out and the current root are recognised; arbitrary roots are
    /// never searched for.
    fn leaf_count_for_root(&mut self, root: &Digest) -> Option<usize> {
        if let Some(count) = self.published.get(root) {
            return Some(*count);
        }
        (self.tree.root() == *root).then(|| self.tree.leaf_count())
    }
}

/// Maps poll ids to their trees and exposes the audit operations.
pub struct BallotVerificationManager {
    config: AuditConfig,
    clock: Arc<dyn Clock>,
    polls: RwLock<HashMap<String, Arc<Mutex<PollLedger>>>>,
}

impl Default for BallotVerificationManager {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

impl BallotVerificationManager {
    /// Creates a manager stamping ballots with the system clock.
    pub fn new(config: AuditConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a manager with an injected clock.
    pub fn with_clock(config: AuditConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            polls: RwLock::new(HashMap::new()),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn ledger(&self, poll_id: &str) -> Option<Arc<Mutex<PollLedger>>> {
        self.polls.read().get(poll_id).cloned()
    }

    fn ledger_or_create(&self, poll_id: &str) -> Arc<Mutex<PollLedger>> {
        if let Some(ledger) = self.ledger(poll_id) {
            return ledger;
        }
        let mut polls = self.polls.write();
        polls
            .entry(poll_id.to_string())
            .or_insert_with(|| {
                debug!(poll_id, "created poll tree");
                Arc::new(Mutex::new(PollLedger::default()))
            })
            .clone()
    }

    /// Runs `f` against the poll's ledger while holding that poll's lock.
    pub(crate) fn with_ledger<R>(
        &self,
        poll_id: &str,
        f: impl FnOnce(&mut PollLedger) -> R,
    ) -> Option<R> {
        let ledger = self.ledger(poll_id)?;
        let mut guard = ledger.lock();
        Some(f(&mut guard))
    }

    /// Commits a ballot stamped with the manager's clock.
    pub fn add_ballot<P>(
        &self,
        poll_id: &str,
        ballot_id: &str,
        payload: &P,
    ) -> AuditResult<BallotCommitment>
    where
        P: Serialize + ?Sized,
    {
        self.add_ballot_at(poll_id, ballot_id, payload, self.now())
    }

    /// Commits a ballot with an explicit submission timestamp.
    ///
    /// The tree for `poll_id` is created on first use.  A proof is attached
    /// only when [`AuditConfig::attach_proofs`] is set.
    pub fn add_ballot_at<P>(
        &self,
        poll_id: &str,
        ballot_id: &str,
        payload: &P,
        timestamp: DateTime<Utc>,
    ) -> AuditResult<BallotCommitment>
    where
        P: Serialize + ?Sized,
    {
        let leaf = leaf_digest(ballot_id, poll_id, payload, &timestamp)?;
        // A concurrent remove or restore may detach the ledger between the
        // map lookup and the lock; retry against the live entry.
        loop {
            let ledger = self.ledger_or_create(poll_id);
            let mut ledger = ledger.lock();
            if ledger.retired {
                continue;
            }
            ledger.tree.add_leaf(leaf);
            ledger.records.push(LeafRecord {
                ballot_id: Some(ballot_id.to_string()),
                timestamp: Some(timestamp),
            });
            let index = ledger.tree.leaf_count() - 1;
            debug!(poll_id, ballot_id, index, leaf = %leaf, "ballot committed");

            let proof = if self.config.attach_proofs {
                ledger.proof_at(index)
            } else {
                None
            };
            return Ok(BallotCommitment {
                ballot_id: ballot_id.to_string(),
                poll_id: poll_id.to_string(),
                leaf,
                timestamp: Some(timestamp),
                proof,
            });
        }
    }

    /// Current root for `poll_id`, or `None` when the poll has no tree.
    pub fn get_root(&self, poll_id: &str) -> Option<Digest> {
        self.with_ledger(poll_id, |ledger| ledger.root())
    }

    /// Re-derives the ballot's leaf from `payload` and the timestamp retained
    /// for `ballot_id`, then proves it against the current tree.
    ///
    /// The payload must be the one used at insertion; any other payload
    /// derives a different leaf and yields `None`.  When the same ballot id was
    /// submitted several times, the earliest matching submission is proven.
    pub fn generate_proof<P>(
        &self,
        poll_id: &str,
        ballot_id: &str,
        payload: &P,
    ) -> AuditResult<Option<MerkleProof>>
    where
        P: Serialize + ?Sized,
    {
        let Some(ledger) = self.ledger(poll_id) else {
            return Ok(None);
        };
        let mut ledger = ledger.lock();
        Ok(locate_ballot(&mut ledger, poll_id, ballot_id, payload)?
            .and_then(|index| ledger.proof_at(index)))
    }

    /// Proves a ballot whose submission timestamp the caller retained itself,
    /// which is the only way to prove leaves of a restored poll.
    pub fn generate_proof_at<P>(
        &self,
        poll_id: &str,
        ballot_id: &str,
        payload: &P,
        timestamp: DateTime<Utc>,
    ) -> AuditResult<Option<MerkleProof>>
    where
        P: Serialize + ?Sized,
    {
        let leaf = leaf_digest(ballot_id, poll_id, payload, &timestamp)?;
        Ok(self
            .with_ledger(poll_id, |ledger| {
                let index = ledger.tree.position(&leaf)?;
                ledger.proof_at(index)
            })
            .flatten())
    }

    /// Checks that the ballot is included under `expected_root`.
    ///
    /// `expected_root` may be the current root or any earlier root this
    /// manager handed out for the poll (through `get_root`, a proof, a
    /// commitment log, a snapshot or a replay bundle).  The proof is generated
    /// against the tree as it stood when that root was produced, verified, and
    /// its root compared with `expected_root`.  Unknown polls, unknown ballots
    /// and roots the poll never handed out all answer `false`; such roots cost
    /// at most one rebuild of the current tree.
    pub fn verify_ballot_inclusion<P>(
        &self,
        poll_id: &str,
        ballot_id: &str,
        payload: &P,
        expected_root: &Digest,
    ) -> AuditResult<bool>
    where
        P: Serialize + ?Sized,
    {
        let Some(ledger) = self.ledger(poll_id) else {
            return Ok(false);
        };
        let mut ledger = ledger.lock();
        let Some(index) = locate_ballot(&mut ledger, poll_id, ballot_id, payload)? else {
            debug!(poll_id, ballot_id, "inclusion check: ballot not found");
            return Ok(false);
        };
        let Some(count) = ledger.leaf_count_for_root(expected_root) else {
            debug!(poll_id, root = %expected_root, "inclusion check: root unknown for poll");
            return Ok(false);
        };
        if index >= count {
            debug!(poll_id, ballot_id, index, count, "inclusion check: ballot newer than root");
            return Ok(false);
        }
        let proof = if count == ledger.tree.leaf_count() {
            ledger.proof_at(index)
        } else {
            ledger.tree.prefix(count).generate_proof_at(index)
        };
        Ok(proof
            .map(|proof| verify_proof(&proof) && proof.root == *expected_root)
            .unwrap_or(false))
    }

    /// Rebuilds a poll from persisted leaf digests, replacing any existing
    /// tree for that id.  Ballot ids and submission timestamps are not known
    /// for these leaves.
    pub fn restore_poll(&self, poll_id: &str, leaves: Vec<Digest>) {
        let records = leaves
            .iter()
            .map(|_| LeafRecord {
                ballot_id: None,
                timestamp: None,
            })
            .collect();
        self.install(poll_id, MerkleTree::from_leaves(leaves), records);
    }

    /// Rebuilds a poll from persisted commitments, e.g. the commitments of a
    /// replay bundle, keeping their ballot ids and timestamps so proofs can
    /// again be derived from a ballot id and payload alone.
    pub fn restore_commitments(&self, poll_id: &str, commitments: Vec<BallotCommitment>) {
        let leaves = commitments.iter().map(|c| c.leaf).collect();
        let records = commitments
            .into_iter()
            .map(|c| LeafRecord {
                ballot_id: Some(c.ballot_id),
                timestamp: c.timestamp,
            })
            .collect();
        self.install(poll_id, MerkleTree::from_leaves(leaves), records);
    }

    fn install(&self, poll_id: &str, tree: MerkleTree, records: Vec<LeafRecord>) {
        debug!(poll_id, leaves = records.len(), "restored poll tree");
        let ledger = PollLedger {
            tree,
            records,
            ..PollLedger::default()
        };
        let previous = self
            .polls
            .write()
            .insert(poll_id.to_string(), Arc::new(Mutex::new(ledger)));
        if let Some(previous) = previous {
            previous.lock().retired = true;
        }
    }

    /// Drops the tree for a retired poll.  Returns `false` if none existed.
    pub fn remove_poll(&self, poll_id: &str) -> bool {
        let removed = self.polls.write().remove(poll_id);
        match removed {
            Some(ledger) => {
                ledger.lock().retired = true;
                true
            }
            None => false,
        }
    }

    /// Number of ballots committed to `poll_id`.
    pub fn leaf_count(&self, poll_id: &str) -> Option<usize> {
        self.with_ledger(poll_id, |ledger| ledger.tree.leaf_count())
    }

    /// Leaf digests of `poll_id` in insertion order.
    pub fn leaves(&self, poll_id: &str) -> Option<Vec<Digest>> {
        self.with_ledger(poll_id, |ledger| ledger.tree.leaves().to_vec())
    }

    /// Ids of every poll with a tree, sorted.
    pub fn poll_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.polls.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current root and size of a poll, stamped for publication.
    pub fn commitment_log(&self, poll_id: &str) -> Option<CommitmentLog> {
        let timestamp = self.now();
        self.with_ledger(poll_id, |ledger| CommitmentLog {
            poll_id: poll_id.to_string(),
            root: ledger.root(),
            leaf_count: ledger.tree.leaf_count(),
            timestamp,
        })
    }
}

/// Finds the first leaf whose re-derived digest matches one of the
/// submissions recorded under `ballot_id`.
fn locate_ballot<P>(
    ledger: &mut PollLedger,
    poll_id: &str,
    ballot_id: &str,
    payload: &P,
) -> AuditResult<Option<usize>>
where
    P: Serialize + ?Sized,
{
    let timestamps: Vec<DateTime<Utc>> = ledger
        .records
        .iter()
        .filter(|record| record.ballot_id.as_deref() == Some(ballot_id))
        .filter_map(|record| record.timestamp)
        .collect();
    for timestamp in timestamps {
        let leaf = leaf_digest(ballot_id, poll_id, payload, &timestamp)?;
        if let Some(index) = ledger.tree.position(&leaf) {
            return Ok(Some(index));
        }
    }
    Ok(None)
}
