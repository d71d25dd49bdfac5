use vouch_types::Digest;

use crate::error::CryptoError;
use crate::hasher::ContentHasher;
use crate::proof::{InclusionReceipt, MerkleProof, Position, ProofStep};

/// Binary Merkle tree over an ordered, closed set of leaf digests.
///
/// Nodes are stored level by level: `levels[0]` holds the leaves and the last
/// level holds the root alone. A level with an odd node count pairs its last
/// node with itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from leaf digests.
    ///
    /// Duplicate digests are distinct leaves. A single leaf is its own root.
    pub fn build(leaves: Vec<Digest>) -> Result<Self, CryptoError> {
        if leaves.is_empty() {
            return Err(CryptoError::EmptyBatch);
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => ContentHasher::hash_pair(left, right),
                    [last] => ContentHasher::hash_pair(last, last),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The root hash of the tree.
    pub fn root(&self) -> Digest {
        self.levels[self.levels.len() - 1][0]
    }

    /// The leaves in their original order.
    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0]
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of levels above the leaves (0 for a single-leaf tree).
    pub fn height(&self) -> usize {
        self.levels.len() - 1
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, CryptoError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(CryptoError::LeafIndexOutOfRange { index, len });
        }

        let mut steps = Vec::with_capacity(self.height());
        let mut idx = index;
        for level in &self.levels[..self.height()] {
            let step = if idx % 2 == 1 {
                ProofStep::new(level[idx - 1], Position::Left)
            } else {
                // The last node of an odd level is its own sibling.
                let sibling = level.get(idx + 1).unwrap_or(&level[idx]);
                ProofStep::new(*sibling, Position::Right)
            };
            steps.push(step);
            idx /= 2;
        }

        Ok(MerkleProof {
            leaf: self.levels[0][index],
            steps,
        })
    }

    /// Proof for the first leaf equal to `leaf`, if any.
    pub fn proof_for(&self, leaf: &Digest) -> Option<MerkleProof> {
        let index = self.leaves().iter().position(|l| l == leaf)?;
        self.proof(index).ok()
    }
}

/// A closed issuance batch: an identifier, its ordered leaves, and their root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    batch_id: String,
    tree: MerkleTree,
}

impl Batch {
    /// Build a batch. Fails with [`CryptoError::EmptyBatch`] on zero leaves.
    pub fn build(batch_id: impl Into<String>, leaves: Vec<Digest>) -> Result<Self, CryptoError> {
        Ok(Self {
            batch_id: batch_id.into(),
            tree: MerkleTree::build(leaves)?,
        })
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn root(&self) -> Digest {
        self.tree.root()
    }

    pub fn leaves(&self) -> &[Digest] {
        self.tree.leaves()
    }

    pub fn len(&self) -> usize {
        self.tree.leaf_count()
    }

    /// Always `false`: a batch holds at least one leaf.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn proof(&self, index: usize) -> Result<MerkleProof, CryptoError> {
        self.tree.proof(index)
    }

    /// Receipt for the leaf at `index`.
    pub fn receipt(&self, index: usize) -> Result<InclusionReceipt, CryptoError> {
        Ok(InclusionReceipt {
            batch_id: self.batch_id.clone(),
            root: self.root(),
            proof: self.tree.proof(index)?,
        })
    }

    /// One receipt per leaf, in leaf order.
    pub fn receipts(&self) -> Vec<InclusionReceipt> {
        (0..self.len())
            .filter_map(|index| self.receipt(index).ok())
            .collect()
    }
}
