//! Per-poll binary Merkle tree over ballot leaf digests.
//!
//! Leaves are kept in insertion order and the node graph is rebuilt from
//! scratch whenever the cached root has been invalidated by an append.
//! Construction pairs nodes left to right; an odd node at the end of a level
//! is paired with a copy of itself.  One leaf is its own root, zero leaves
//! root at [`empty_root`].

use tracing::debug;

use crate::hash::{empty_root, hash_pair, Digest};
use crate::proof::{MerkleProof, SIBLING_LEFT, SIBLING_RIGHT};

/// A node of a built tree.  Internal nodes own both children outright; the
/// partner of an odd trailing node is a clone, not a shared reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    /// Wraps a single leaf digest.
    Leaf(Digest),
    /// Parent of two subtrees.
    Internal {
        /// `hash_pair(left.digest(), right.digest())`.
        digest: Digest,
        /// Left child.
        left: Box<TreeNode>,
        /// Right child.
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    /// Digest carried by this node.
    pub fn digest(&self) -> Digest {
        match self {
            TreeNode::Leaf(digest) => *digest,
            TreeNode::Internal { digest, .. } => *digest,
        }
    }

    fn join(left: TreeNode, right: TreeNode) -> TreeNode {
        TreeNode::Internal {
            digest: hash_pair(&left.digest(), &right.digest()),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Builds the node graph bottom-up.  Returns `None` for an empty slice.
    pub fn build(leaves: &[Digest]) -> Option<(TreeNode, usize)> {
        if leaves.is_empty() {
            return None;
        }
        let mut level: Vec<TreeNode> = leaves.iter().copied().map(TreeNode::Leaf).collect();
        let mut height = 0usize;
        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            let mut nodes = level.into_iter();
            while let Some(left) = nodes.next() {
                let right = match nodes.next() {
                    Some(right) => right,
                    None => left.clone(),
                };
                next.push(TreeNode::join(left, right));
            }
            level = next;
            height += 1;
        }
        level.pop().map(|root| (root, height))
    }
}

#[derive(Debug, Clone)]
struct BuiltTree {
    root: TreeNode,
    height: usize,
}

/// Ordered leaf sequence plus a lazily rebuilt node graph.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    leaves: Vec<Digest>,
    cached: Option<BuiltTree>,
}

impl MerkleTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree from an ordered list of leaf digests.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        Self {
            leaves,
            cached: None,
        }
    }

    /// Appends a leaf and discards the cached node graph.
    pub fn add_leaf(&mut self, digest: Digest) {
        self.leaves.push(digest);
        self.cached = None;
    }

    /// Number of leaves committed so far.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Returns `true` when no leaves have been added.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaves in insertion order.
    pub fn leaves(&self) -> &[Digest] {
        &self.leaves
    }

    /// Tree over the first `len` leaves, i.e. the tree as it stood before
    /// any later appends.  `len` is clamped to the current leaf count.
    pub fn prefix(&self, len: usize) -> MerkleTree {
        let len = len.min(self.leaves.len());
        MerkleTree::from_leaves(self.leaves[..len].to_vec())
    }

    /// Position of the first leaf equal to `digest`.
    pub fn position(&self, digest: &Digest) -> Option<usize> {
        self.leaves.iter().position(|leaf| leaf == digest)
    }

    fn built(&mut self) -> Option<&BuiltTree> {
        if self.cached.is_none() {
            if let Some((root, height)) = TreeNode::build(&self.leaves) {
                debug!(leaves = self.leaves.len(), height, "rebuilt merkle tree");
                self.cached = Some(BuiltTree { root, height });
            }
        }
        self.cached.as_ref()
    }

    /// Current root, rebuilding the node graph if an append invalidated it.
    pub fn root(&mut self) -> Digest {
        match self.built() {
            Some(built) => built.root.digest(),
            None => empty_root(),
        }
    }

    /// Builds an inclusion proof for the **first** leaf equal to `leaf`.
    ///
    /// When the same digest was appended more than once, the proof attests to
    /// the earliest position.  Returns `None` when no leaf matches.
    pub fn generate_proof(&mut self, leaf: &Digest) -> Option<MerkleProof> {
        let index = self.position(leaf)?;
        self.generate_proof_at(index)
    }

    /// Builds an inclusion proof for the leaf at `index`.
    pub fn generate_proof_at(&mut self, index: usize) -> Option<MerkleProof> {
        let leaf_count = self.leaves.len();
        let leaf = *self.leaves.get(index)?;
        let built = self.built()?;

        // Walk from the root toward the leaf; bit `level` of the index picks
        // the branch below each node.  Padding with self-pairs makes the tree
        // perfect, so every leaf sits exactly `height` levels down.
        let mut node = &built.root;
        let mut path = Vec::with_capacity(built.height);
        let mut indices = Vec::with_capacity(built.height);
        for level in (0..built.height).rev() {
            let TreeNode::Internal { left, right, .. } = node else {
                debug_assert!(
                    matches!(node, TreeNode::Internal { .. }),
                    "leaf reached {} levels above the bottom",
                    level + 1
                );
                return None;
            };
            if (index >> level) & 1 == 0 {
                path.push(right.digest());
                indices.push(SIBLING_RIGHT);
                node = left;
            } else {
                path.push(left.digest());
                indices.push(SIBLING_LEFT);
                node = right;
            }
        }
        debug_assert_eq!(node.digest(), leaf, "proof walk ended on the wrong leaf");
        if node.digest() != leaf {
            return None;
        }
        path.reverse();
        indices.reverse();

        Some(MerkleProof {
            leaf,
            path,
            indices,
            root: built.root.digest(),
            index: Some(index),
            leaf_count: Some(leaf_count),
        })
    }
}
