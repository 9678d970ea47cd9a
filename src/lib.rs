#![deny(missing_docs)]

//! # ballot_audit
//!
//! **ballot_audit** commits every ballot of a poll into a per-poll binary
//! Merkle tree so that anyone holding a ballot, an inclusion proof and a
//! published root can check that the ballot was counted, without trusting the
//! operator that ran the tally.
//!
//! ## Features
//!
//! * **Hashing**: SHA-256 digests rendered as lowercase hex, see
//!   [`hash`](hash/index.html).
//! * **Canonical ballot encoding**: a fixed-order JSON envelope of
//!   `(ballotId, pollId, payload, timestamp)` so that two independent
//!   encoders agree byte for byte, see [`encoding`](encoding/index.html).
//! * **Merkle tree**: ordered leaves, lazily rebuilt root, odd nodes paired
//!   with themselves, see [`MerkleTree`].
//! * **Stateless verification**: [`verify_proof`] needs nothing but the proof,
//!   and never panics on malformed input.
//! * **Poll registry**: [`BallotVerificationManager`] keeps one tree and one
//!   lock per poll.
//! * **Closing artifacts**: [`SnapshotChecksum`] and [`ReplayBundle`].
//!
//! ## Usage
//!
//! ```rust
//! use ballot_audit::{verify_proof, AuditConfig, BallotVerificationManager};
//! use serde_json::json;
//!
//! let manager = BallotVerificationManager::new(AuditConfig::default());
//! manager.add_ballot("poll-1", "ballot-a", &json!({"rank": ["x", "y"]})).unwrap();
//! manager.add_ballot("poll-1", "ballot-b", &json!({"rank": ["y", "x"]})).unwrap();
//!
//! let root = manager.get_root("poll-1").unwrap();
//! let proof = manager
//!     .generate_proof("poll-1", "ballot-a", &json!({"rank": ["x", "y"]}))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(proof.root, root);
//! assert!(verify_proof(&proof));
//! ```
//!
//! The crate performs no I/O and installs no logging subscriber; it emits
//! `tracing` events that the embedding application may collect.

pub mod config;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod manager;
pub mod proof;
pub mod replay;
pub mod snapshot;
pub mod tree;

pub use config::AuditConfig;
pub use encoding::{canonical_timestamp, encode_ballot, leaf_digest};
pub use error::{AuditError, AuditResult};
pub use hash::{empty_root, hash, hash_pair, Digest, DIGEST_LENGTH, EMPTY_TREE_MARKER};
pub use manager::{
    BallotCommitment, BallotVerificationManager, Clock, CommitmentLog, FixedClock, SystemClock,
};
pub use proof::{verify_proof, verify_proof_json, MerkleProof, SIBLING_LEFT, SIBLING_RIGHT};
pub use replay::{verify_replay_bundle, ReplayBundle};
pub use snapshot::{compute_checksum, verify_snapshot_checksum, SnapshotChecksum};
pub use tree::{MerkleTree, TreeNode};
