//! Bit-trick arithmetic over the complete binary bucket tree.
//!
//! A [`LeafLabel`] doubles as a tree node id in the flat-array numbering of
//! Design Notes §9: the root is `1`, `left(i) = 2i`, `right(i) = 2i+1`, and
//! leaves occupy `[2^L, 2^(L+1) - 1]`. The node at depth `d` on the path to
//! leaf `ℓ` is `ℓ`'s top `d + 1` bits; two leaves share the path prefix
//! through depth `d` iff they agree in those bits (§4.2).

use super::{LeafLabel, TreeHeight};
use crate::error::OramError;
use rand::{CryptoRng, Rng, RngCore};

/// Operations on tree node ids needed by path reads, eviction, and stash
/// drain.
pub trait CompleteBinaryTreeIndex: Sized + Copy {
    /// The ancestor of `self` (a leaf) at `depth` in a tree of the given
    /// `height`. `depth == height` returns `self` unchanged.
    fn node_on_path(&self, depth: TreeHeight, height: TreeHeight) -> Result<Self, OramError>;

    /// Draws a uniformly random leaf in a tree of the given `height`,
    /// independent of any other observable (Invariant R1).
    fn random_leaf<R: RngCore + CryptoRng>(height: TreeHeight, rng: &mut R) -> Self;

    /// The depth of this node (root is depth 0).
    fn depth(&self) -> Result<TreeHeight, OramError>;

    /// Whether this node is a leaf of a tree of the given height.
    fn is_leaf(&self, height: TreeHeight) -> Result<bool, OramError>;

    /// The deepest common ancestor of two leaves of the same height.
    fn common_ancestor(&self, other: Self) -> Result<Self, OramError>;
}

impl CompleteBinaryTreeIndex for LeafLabel {
    fn node_on_path(&self, depth: TreeHeight, height: TreeHeight) -> Result<Self, OramError> {
        if *self == 0 || !self.is_leaf(height)? {
            return Err(OramError::Protocol(format!(
                "{self} is not a valid leaf of a height-{height} tree"
            )));
        }
        if depth > height {
            return Err(OramError::Protocol(format!(
                "depth {depth} exceeds tree height {height}"
            )));
        }
        Ok(self >> (height - depth))
    }

    fn random_leaf<R: RngCore + CryptoRng>(height: TreeHeight, rng: &mut R) -> Self {
        let span = 1u64 << height;
        span + rng.gen_range(0..span)
    }

    fn depth(&self) -> Result<TreeHeight, OramError> {
        if *self == 0 {
            return Err(OramError::Protocol("node id 0 is invalid".into()));
        }
        Ok(Self::BITS - self.leading_zeros() - 1)
    }

    fn is_leaf(&self, height: TreeHeight) -> Result<bool, OramError> {
        Ok(self.depth()? == height)
    }

    fn common_ancestor(&self, other: Self) -> Result<Self, OramError> {
        if self.leading_zeros() != other.leading_zeros() {
            return Err(OramError::Protocol(
                "cannot compute a common ancestor of leaves at different heights".into(),
            ));
        }
        let shared_prefix_length = (self ^ other).leading_zeros();
        let ancestor = self >> (Self::BITS - shared_prefix_length);
        if ancestor == 0 {
            return Err(OramError::Protocol("computed an invalid ancestor".into()));
        }
        Ok(ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn node_on_path_matches_root() {
        // height 2: leaves are 4..=7
        let leaf: LeafLabel = 5; // binary 101
        assert_eq!(leaf.node_on_path(0, 2).unwrap(), 1);
        assert_eq!(leaf.node_on_path(1, 2).unwrap(), 2);
        assert_eq!(leaf.node_on_path(2, 2).unwrap(), 5);
    }

    #[test]
    fn shared_prefix_implies_shared_ancestor() {
        let a: LeafLabel = 0b1_100; // depth 3 leaf (height 3)
        let b: LeafLabel = 0b1_101;
        // a and b share the top 3 bits (1_10), so they share the bucket at depth 2.
        assert_eq!(a.node_on_path(2, 3).unwrap(), b.node_on_path(2, 3).unwrap());
        assert_ne!(a.node_on_path(3, 3).unwrap(), b.node_on_path(3, 3).unwrap());
    }

    #[test]
    fn common_ancestor_is_consistent_with_node_on_path() {
        let a: LeafLabel = 0b1_011;
        let b: LeafLabel = 0b1_010;
        let ancestor = a.common_ancestor(b).unwrap();
        let depth = ancestor.depth().unwrap();
        assert_eq!(a.node_on_path(depth, 3).unwrap(), ancestor);
        assert_eq!(b.node_on_path(depth, 3).unwrap(), ancestor);
    }

    #[test]
    fn random_leaf_is_in_range() {
        let mut rng = OsRng;
        for _ in 0..100 {
            let leaf = LeafLabel::random_leaf(5, &mut rng);
            assert!(leaf.is_leaf(5).unwrap());
        }
    }
}
