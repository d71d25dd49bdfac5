//! Inclusion proofs and their verification.
//!
//! A proof carries no reference to the tree it came from: verification only
//! needs the leaf, the ordered sibling steps, and the root the verifier
//! expects. The serialized form is the exchange format handed to holders:
//!
//! ```json
//! { "leaf": "0x…", "steps": [{ "sibling": "0x…", "position": "left" }] }
//! ```

use serde::{Deserialize, Serialize};
use vouch_types::Digest;

use crate::error::CryptoError;
use crate::hasher::ContentHasher;

/// Side occupied by the sibling in a proof step.
///
/// The node being combined always sits on the opposite side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

/// One level of an inclusion proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub position: Position,
}

impl ProofStep {
    pub fn new(sibling: Digest, position: Position) -> Self {
        Self { sibling, position }
    }

    /// Combine `node` with this step's sibling.
    pub fn apply(&self, node: &Digest) -> Digest {
        match self.position {
            Position::Left => ContentHasher::hash_pair(&self.sibling, node),
            Position::Right => ContentHasher::hash_pair(node, &self.sibling),
        }
    }
}

/// Merkle inclusion proof for a single leaf.
///
/// `steps` are ordered from the leaf's level up to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: Digest,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root from this proof's own leaf.
    pub fn compute_root(&self) -> Digest {
        ProofVerifier::compute_root(&self.leaf, self)
    }

    /// Verify this proof's own leaf against `expected_root`.
    pub fn verify(&self, expected_root: &Digest) -> bool {
        ProofVerifier::verify(&self.leaf, self, expected_root)
    }

    /// Number of levels between the leaf and the root.
    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

/// Stateless proof verifier.
pub struct ProofVerifier;

impl ProofVerifier {
    /// Fold `leaf` through every step of `proof`.
    ///
    /// The leaf recorded inside `proof` is ignored; the caller-supplied leaf
    /// is what gets checked.
    pub fn compute_root(leaf: &Digest, proof: &MerkleProof) -> Digest {
        proof
            .steps
            .iter()
            .fold(*leaf, |acc, step| step.apply(&acc))
    }

    /// Returns `true` iff `leaf` recombines with `proof` to `expected_root`.
    pub fn verify(leaf: &Digest, proof: &MerkleProof, expected_root: &Digest) -> bool {
        Self::compute_root(leaf, proof) == *expected_root
    }

    /// Like [`verify`](Self::verify), but reports both roots on mismatch.
    pub fn check(
        leaf: &Digest,
        proof: &MerkleProof,
        expected_root: &Digest,
    ) -> Result<(), CryptoError> {
        let computed = Self::compute_root(leaf, proof);
        if computed == *expected_root {
            Ok(())
        } else {
            Err(CryptoError::ProofVerificationFailed {
                expected: *expected_root,
                computed,
            })
        }
    }
}

/// The value object handed to a credential holder: the batch it belongs to,
/// the committed root, and the proof linking its leaf to that root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionReceipt {
    pub batch_id: String,
    pub root: Digest,
    #[serde(flatten)]
    pub proof: MerkleProof,
}

impl InclusionReceipt {
    pub fn leaf(&self) -> &Digest {
        &self.proof.leaf
    }

    /// Verify the receipt's leaf against the receipt's own root.
    pub fn verify(&self) -> bool {
        self.proof.verify(&self.root)
    }

    /// Verify a leaf supplied by the caller against a root supplied by the
    /// caller, using only the receipt's steps.
    pub fn verify_against(&self, leaf: &Digest, root: &Digest) -> bool {
        ProofVerifier::verify(leaf, &self.proof, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Digest {
        Digest::of(s.as_bytes())
    }

    #[test]
    fn empty_proof_computes_leaf() {
        let proof = MerkleProof {
            leaf: d("a"),
            steps: vec![],
        };
        assert_eq!(proof.compute_root(), d("a"));
        assert!(proof.verify(&d("a")));
        assert!(!proof.verify(&d("b")));
    }

    #[test]
    fn left_sibling_goes_first() {
        let step = ProofStep::new(d("s"), Position::Left);
        assert_eq!(step.apply(&d("n")), ContentHasher::hash_pair(&d("s"), &d("n")));
    }

    #[test]
    fn right_sibling_goes_second() {
        let step = ProofStep::new(d("s"), Position::Right);
        assert_eq!(step.apply(&d("n")), ContentHasher::hash_pair(&d("n"), &d("s")));
    }

    #[test]
    fn verify_uses_caller_leaf() {
        let proof = MerkleProof {
            leaf: d("a"),
            steps: vec![ProofStep::new(d("b"), Position::Right)],
        };
        let root = ContentHasher::hash_pair(&d("a"), &d("b"));
        assert!(ProofVerifier::verify(&d("a"), &proof, &root));
        assert!(!ProofVerifier::verify(&d("x"), &proof, &root));
    }

    #[test]
    fn check_reports_both_roots() {
        let proof = MerkleProof {
            leaf: d("a"),
            steps: vec![ProofStep::new(d("b"), Position::Left)],
        };
        let wrong = d("wrong");
        match ProofVerifier::check(&d("a"), &proof, &wrong) {
            Err(CryptoError::ProofVerificationFailed { expected, computed }) => {
                assert_eq!(expected, wrong);
                assert_eq!(computed, ContentHasher::hash_pair(&d("b"), &d("a")));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn position_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Position::Left).unwrap(), "\"left\"");
        assert_eq!(serde_json::to_string(&Position::Right).unwrap(), "\"right\"");
    }

    #[test]
    fn exchange_format_keeps_step_order() {
        let proof = MerkleProof {
            leaf: d("leaf"),
            steps: vec![
                ProofStep::new(d("one"), Position::Right),
                ProofStep::new(d("two"), Position::Left),
                ProofStep::new(d("three"), Position::Right),
            ],
        };
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["steps"][1]["position"], "left");
        assert_eq!(json["steps"][2]["sibling"], d("three").to_prefixed_hex());

        let parsed: MerkleProof = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, proof);
    }

    #[test]
    fn receipt_is_flat_on_the_wire() {
        let receipt = InclusionReceipt {
            batch_id: "batch-1".into(),
            root: ContentHasher::hash_pair(&d("a"), &d("b")),
            proof: MerkleProof {
                leaf: d("a"),
                steps: vec![ProofStep::new(d("b"), Position::Right)],
            },
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["batchId"], "batch-1");
        assert_eq!(json["leaf"], d("a").to_prefixed_hex());
        assert!(json["steps"].is_array());

        let parsed: InclusionReceipt = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, receipt);
        assert!(parsed.verify());
    }
}
