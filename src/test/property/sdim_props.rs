//! Property tests for static-or-dynamic dimension arithmetic.

use proptest::prelude::*;

use crate::sdim::SDim;
use crate::test::generators::arb_sdim;

proptest! {
    /// Dynamic is absorbing for both operations.
    #[test]
    fn sdim_dynamic_absorbs(d in arb_sdim()) {
        prop_assert!((d + SDim::DYNAMIC).is_dynamic());
        prop_assert!((SDim::DYNAMIC + d).is_dynamic());
        prop_assert!((d * SDim::DYNAMIC).is_dynamic());
        prop_assert!((SDim::DYNAMIC * d).is_dynamic());
    }

    /// On static values within range, the wrapper agrees with i64.
    #[test]
    fn sdim_static_matches_i64(a in -1000i64..=1000, b in -1000i64..=1000) {
        prop_assert_eq!((SDim::new(a) + SDim::new(b)).as_static(), Some(a + b));
        prop_assert_eq!((SDim::new(a) * SDim::new(b)).as_static(), Some(a * b));
    }

    /// Both operations commute.
    #[test]
    fn sdim_commutative(a in arb_sdim(), b in arb_sdim()) {
        prop_assert_eq!(a + b, b + a);
        prop_assert_eq!(a * b, b * a);
    }

    /// A product is static exactly when every factor is.
    #[test]
    fn sdim_product_staticness(dims in proptest::collection::vec(arb_sdim(), 0..5)) {
        let product = SDim::product(dims.iter().copied());
        let all_static = dims.iter().all(SDim::is_static);
        prop_assert_eq!(product.is_static(), all_static);
        if all_static {
            let expected: i64 = dims.iter().map(|d| d.as_static().unwrap()).product();
            prop_assert_eq!(product.as_static(), Some(expected));
        }
    }
}
