//! Property Tests
//!
//! Randomised checks of the store's core guarantees: content addressing,
//! round trip, incremental equivalence and projection soundness.

use proptest::prelude::*;

use treedbs::domain::{DependencyMatrix, StoreConfig, Tree, TreeDbs};

fn store(n: usize) -> TreeDbs {
    TreeDbs::new(StoreConfig::new(n).with_size_exp(14)).unwrap()
}

/// Vectors of length `n` over a small alphabet, so subtrees repeat
fn arb_vector(n: usize) -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-3i32..4, n)
}

/// A vector and a second one that differs from it only where `mask` is set
fn arb_step() -> impl Strategy<Value = (Vec<i32>, Vec<i32>, Vec<bool>)> {
    (2usize..12).prop_flat_map(|n| {
        (
            arb_vector(n),
            arb_vector(n),
            prop::collection::vec(any::<bool>(), n),
        )
            .prop_map(|(prev, noise, mask)| {
                let next = prev
                    .iter()
                    .zip(&noise)
                    .zip(&mask)
                    .map(|((&p, &x), &m)| if m { x } else { p })
                    .collect();
                (prev, next, mask)
            })
    })
}

proptest! {
    /// fold(a) == fold(b) iff a == b
    #[test]
    fn prop_content_addressing(
        (a, b) in (2usize..10).prop_flat_map(|n| (arb_vector(n), arb_vector(n)))
    ) {
        let dbs = store(a.len());
        let ra = dbs.fold(&a).unwrap().reference;
        let rb = dbs.fold(&b).unwrap().reference;
        prop_assert_eq!(ra == rb, a == b);
    }

    /// unfold(fold(v)) == v, also through unfold_tree
    #[test]
    fn prop_round_trip(vectors in prop::collection::vec(arb_vector(7), 1..20)) {
        let dbs = store(7);
        let refs: Vec<_> = vectors
            .iter()
            .map(|v| dbs.fold(v).unwrap().reference)
            .collect();

        let mut out = vec![0; 7];
        let mut tree = Tree::new(7);
        for (v, r) in vectors.iter().zip(&refs) {
            dbs.unfold(*r, &mut out).unwrap();
            prop_assert_eq!(&out, v);
            dbs.unfold_tree(*r, &mut tree).unwrap();
            prop_assert_eq!(tree.state(), &v[..]);
        }
    }

    /// fold_incremental agrees with fold and never probes more
    #[test]
    fn prop_incremental_equivalence((prev, next, _mask) in arb_step()) {
        let n = prev.len();
        let dbs = store(n);
        let mut prev_tree = Tree::new(n);
        let mut next_tree = Tree::new(n);
        dbs.fold_tree(&prev, &mut prev_tree).unwrap();

        let before = dbs.local_stats().lookups;
        let incremental = dbs.fold_incremental(&next, &prev_tree, &mut next_tree).unwrap();
        let probes = dbs.local_stats().lookups - before;

        let full = dbs.fold(&next).unwrap();
        prop_assert_eq!(incremental.reference, full.reference);
        prop_assert!(full.seen);
        prop_assert_eq!(incremental.seen, prev == next);
        prop_assert!(probes <= (n - 1) as u64);

        let changed = prev.iter().zip(&next).filter(|(a, b)| a != b).count();
        if changed == 1 && n >= 4 {
            prop_assert!(probes < (n - 1) as u64);
        }
    }

    /// fold_projected agrees with fold_incremental for steps inside the group
    #[test]
    fn prop_projection_soundness((prev, next, mask) in arb_step()) {
        let n = prev.len();
        let matrix = DependencyMatrix::from_rows(&[mask.clone(), vec![true; n]]).unwrap();
        let dbs = TreeDbs::with_matrix(StoreConfig::new(n).with_size_exp(14), &matrix).unwrap();

        let mut prev_tree = Tree::new(n);
        let mut projected_tree = Tree::new(n);
        let mut incremental_tree = Tree::new(n);
        dbs.fold_tree(&prev, &mut prev_tree).unwrap();

        let projected = dbs.fold_projected(&next, &prev_tree, &mut projected_tree, 0).unwrap();
        let incremental = dbs
            .fold_incremental(&next, &prev_tree, &mut incremental_tree)
            .unwrap();
        prop_assert_eq!(projected.reference, incremental.reference);
        prop_assert_eq!(projected_tree, incremental_tree);

        // the all-slots group is plain incremental folding
        let mut all_tree = Tree::new(n);
        let all = dbs.fold_projected(&next, &prev_tree, &mut all_tree, 1).unwrap();
        prop_assert_eq!(all.reference, incremental.reference);
    }
}
