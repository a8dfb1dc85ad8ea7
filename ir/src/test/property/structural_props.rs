//! Property tests for structural equality and hashing.

use proptest::prelude::*;

use crate::structural::{structural_equal, structural_hash};

use super::generators::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Every tree equals itself under either flag.
    #[test]
    fn equal_is_reflexive(blueprint in arb_blueprint()) {
        let pool = var_pool();
        let expr = build(&blueprint, &pool);
        prop_assert!(structural_equal(&expr, &expr, false));
        prop_assert!(structural_equal(&expr, &expr, true));
    }

    /// Rebuilding the same blueprint over the same variable pool yields a
    /// tree that is equal and hash-equal under either flag.
    #[test]
    fn clone_preserves_equality_and_hash(blueprint in arb_blueprint()) {
        let pool = var_pool();
        let original = build(&blueprint, &pool);
        let clone = build(&blueprint, &pool);

        prop_assert!(structural_equal(&original, &clone, false));
        prop_assert!(structural_equal(&original, &clone, true));
        prop_assert_eq!(structural_hash(&original, false), structural_hash(&clone, false));
        prop_assert_eq!(structural_hash(&original, true), structural_hash(&clone, true));
    }

    /// Renaming the whole variable pool is invisible under α-mapping, and
    /// the α-on hashes agree.
    #[test]
    fn renamed_pool_is_alpha_equivalent(blueprint in arb_blueprint()) {
        let pool = var_pool();
        let renamed_pool = var_pool();
        let original = build(&blueprint, &pool);
        let renamed = build(&blueprint, &renamed_pool);

        prop_assert!(structural_equal(&original, &renamed, true));
        prop_assert_eq!(structural_hash(&original, true), structural_hash(&renamed, true));
    }

    /// equal ⇒ equal hash, for random pairs under either flag.
    #[test]
    fn equal_implies_equal_hash(a in arb_blueprint(), b in arb_blueprint()) {
        let pool = var_pool();
        let lhs = build(&a, &pool);
        let rhs = build(&b, &pool);

        for auto_map in [false, true] {
            if structural_equal(&lhs, &rhs, auto_map) {
                prop_assert_eq!(
                    structural_hash(&lhs, auto_map),
                    structural_hash(&rhs, auto_map),
                    "auto_map = {}", auto_map
                );
            }
        }
    }

    /// Symmetry of equality for random pairs.
    #[test]
    fn equal_is_symmetric(a in arb_blueprint(), b in arb_blueprint()) {
        let pool = var_pool();
        let lhs = build(&a, &pool);
        let rhs = build(&b, &pool);

        for auto_map in [false, true] {
            prop_assert_eq!(
                structural_equal(&lhs, &rhs, auto_map),
                structural_equal(&rhs, &lhs, auto_map),
                "auto_map = {}", auto_map
            );
        }
    }
}
