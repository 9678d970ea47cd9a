//! Inclusion proofs and the stateless verifier.
//!
//! A proof is self-contained: the leaf, the sibling digests from leaf to
//! root, one direction indicator per sibling, and the root the proof claims.
//! Indicator `1` means the sibling sits on the right (`current || sibling`),
//! `0` means it sits on the left (`sibling || current`).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuditError, AuditResult};
use crate::hash::{hash_pair, Digest};

/// Indicator recorded when the sibling is the left-hand input.
pub const SIBLING_LEFT: u8 = 0;
/// Indicator recorded when the sibling is the right-hand input.
pub const SIBLING_RIGHT: u8 = 1;

/// Merkle inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Leaf digest whose inclusion is being proven.
    pub leaf: Digest,
    /// Sibling digests ordered from the leaf level up to the root.
    pub path: Vec<Digest>,
    /// Direction indicators, one per entry in `path`.
    pub indices: Vec<u8>,
    /// Root the proof reconstructs.
    pub root: Digest,
    /// Position of the leaf at generation time.  Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Leaf count of the tree at generation time.  Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_count: Option<usize>,
}

impl MerkleProof {
    /// Serialises the proof to a JSON string with hex-encoded digests.
    pub fn to_json_string(&self) -> AuditResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a proof previously emitted by [`MerkleProof::to_json_string`]
    /// or produced by another implementation of the same wire format.
    pub fn from_json_str(input: &str) -> AuditResult<Self> {
        serde_json::from_str(input).map_err(|err| AuditError::InvalidProof(err.to_string()))
    }

    /// Number of hashing steps between the leaf and the root.
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Recomputes the root from `proof.leaf` and `proof.path` and compares it to
/// `proof.root`.
///
/// Malformed proofs (mismatched `path`/`indices` lengths, indicator values
/// other than `0`/`1`) return `false`.  An empty path verifies exactly when
/// the leaf is the root, which is the shape of a single-leaf tree.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    if proof.path.len() != proof.indices.len() {
        debug!(
            path = proof.path.len(),
            indices = proof.indices.len(),
            "proof rejected: path and indices differ in length"
        );
        return false;
    }
    let mut current = proof.leaf;
    for (sibling, indicator) in proof.path.iter().zip(&proof.indices) {
        current = match *indicator {
            SIBLING_RIGHT => hash_pair(&current, sibling),
            SIBLING_LEFT => hash_pair(sibling, &current),
            other => {
                debug!(indicator = other, "proof rejected: unknown direction indicator");
                return false;
            }
        };
    }
    let ok = current == proof.root;
    if !ok {
        debug!(root = %proof.root, "proof rejected: reconstructed root differs");
    }
    ok
}

/// Parses and verifies an untrusted proof document.  Unparseable input is
/// reported as a failed verification.
pub fn verify_proof_json(input: &str) -> bool {
    match MerkleProof::from_json_str(input) {
        Ok(proof) => verify_proof(&proof),
        Err(err) => {
            debug!(error = %err, "proof rejected: unparseable document");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn two_leaf_proof() -> MerkleProof {
        let a = hash(b"a");
        let b = hash(b"b");
        MerkleProof {
            leaf: a,
            path: vec![b],
            indices: vec![SIBLING_RIGHT],
            root: hash_pair(&a, &b),
            index: Some(0),
            leaf_count: Some(2),
        }
    }

    #[test]
    fn test_verifies_hand_built_proof() {
        assert!(verify_proof(&two_leaf_proof()));
    }

    #[test]
    fn test_indicator_controls_concatenation_order() {
        let mut proof = two_leaf_proof();
        proof.indices[0] = SIBLING_LEFT;
        assert!(!verify_proof(&proof));
        proof.root = hash_pair(&proof.path[0], &proof.leaf);
        assert!(verify_proof(&proof));
    }

    #[test]
    fn test_malformed_shapes_fail_without_panicking() {
        let mut proof = two_leaf_proof();
        proof.indices.clear();
        assert!(!verify_proof(&proof));

        let mut proof = two_leaf_proof();
        proof.indices[0] = 7;
        assert!(!verify_proof(&proof));

        let mut proof = two_leaf_proof();
        proof.path.clear();
        proof.indices.clear();
        assert!(!verify_proof(&proof));
        proof.root = proof.leaf;
        assert!(verify_proof(&proof));
    }

    #[test]
    fn test_json_wire_format() {
        let proof = two_leaf_proof();
        let json = proof.to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["leaf"], proof.leaf.to_hex());
        assert_eq!(value["path"][0], proof.path[0].to_hex());
        assert_eq!(value["indices"][0], 1);
        assert_eq!(value["root"], proof.root.to_hex());
        assert_eq!(value["leafCount"], 2);
        assert!(verify_proof_json(&json));
    }

    #[test]
    fn test_minimal_document_without_metadata_verifies() {
        let proof = two_leaf_proof();
        let json = format!(
            r#"{{"leaf":"{}","path":["{}"],"indices":[1],"root":"{}"}}"#,
            proof.leaf, proof.path[0], proof.root
        );
        let parsed = MerkleProof::from_json_str(&json).unwrap();
        assert_eq!(parsed.index, None);
        assert!(verify_proof(&parsed));
    }

    #[test]
    fn test_garbage_documents_fail_verification() {
        assert!(!verify_proof_json(""));
        assert!(!verify_proof_json("{}"));
        assert!(!verify_proof_json(r#"{"leaf":"xyz","path":[],"indices":[],"root":"xyz"}"#));
        assert!(matches!(
            MerkleProof::from_json_str("[1,2]"),
            Err(AuditError::InvalidProof(_))
        ));
    }
}
