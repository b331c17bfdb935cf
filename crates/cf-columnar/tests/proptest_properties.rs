#![forbid(unsafe_code)]

//! Property-based tests for column storage and the operation engine.
//!
//! Strategies produce columns across every numeric dtype; the properties
//! check value semantics, dtype rules and the invariants of the derived
//! operations for all generated inputs.

use proptest::prelude::*;

use cf_columnar::{Column, SortOrder};
use cf_types::{DType, FloatPrecision, infer_dtype, promote_dtypes};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

fn arb_numeric_dtype() -> impl Strategy<Value = DType> {
    prop::sample::select(DType::NUMERIC.to_vec())
}

/// Small integers stored at an arbitrary numeric dtype.
fn arb_numeric_column(len: usize) -> impl Strategy<Value = Column> {
    (arb_numeric_dtype(), proptest::collection::vec(-100i64..100, len)).prop_map(|(dtype, values)| {
        let values: Vec<f64> = values.into_iter().map(|v| v as f64).collect();
        Column::from_f64_values(&values, dtype)
    })
}

/// Two numeric columns of the same length with independent dtypes.
fn arb_column_pair(max_len: usize) -> impl Strategy<Value = (Column, Column)> {
    (0..=max_len).prop_flat_map(|len| (arb_numeric_column(len), arb_numeric_column(len)))
}

fn arb_string_column(max_len: usize) -> impl Strategy<Value = Column> {
    proptest::collection::vec("[a-e]{1,3}", 1..=max_len).prop_map(Column::from_strings)
}

// ---------------------------------------------------------------------------
// Property: value semantics
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Mutating a clone never shows through the original.
    #[test]
    fn prop_clone_does_not_alias(column in arb_numeric_column(12), idx in 0usize..12) {
        let before = column.to_f64_vec().expect("numeric");
        let mut copy = column.clone();
        copy.set_value(idx, 42).expect("index in range");
        prop_assert_eq!(column.to_f64_vec().expect("numeric"), before);
    }

    /// Mutating a shared window never shows through its parent.
    #[test]
    fn prop_subarray_does_not_alias(column in arb_numeric_column(12), lo in 0i64..6) {
        let before = column.to_f64_vec().expect("numeric");
        let mut view = column.subarray(lo, lo + 3);
        view.set_value(0, 99).expect("window is non-empty");
        prop_assert_eq!(column.to_f64_vec().expect("numeric"), before);
    }

    /// Storing at the inferred dtype and inferring again is a fixed point.
    #[test]
    fn prop_inference_is_idempotent(values in proptest::collection::vec(-70_000i64..70_000, 1..20)) {
        let values: Vec<f64> = values.into_iter().map(|v| v as f64).collect();
        let dtype = infer_dtype(&values, FloatPrecision::F64);
        let stored = Column::from_f64_values(&values, dtype);
        let again = infer_dtype(&stored.to_f64_vec().expect("numeric"), FloatPrecision::F64);
        prop_assert_eq!(again, dtype);
    }
}

// ---------------------------------------------------------------------------
// Property: arithmetic and promotion
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Addition is commutative in value and dtype.
    #[test]
    fn prop_add_is_commutative((left, right) in arb_column_pair(10)) {
        let forward = left.add(&right).expect("numeric add");
        let backward = right.add(&left).expect("numeric add");
        prop_assert_eq!(forward.dtype(), backward.dtype());
        prop_assert_eq!(forward, backward);
    }

    /// Multiplication is commutative in value and dtype.
    #[test]
    fn prop_mul_is_commutative((left, right) in arb_column_pair(10)) {
        let forward = left.mul(&right).expect("numeric mul");
        let backward = right.mul(&left).expect("numeric mul");
        prop_assert_eq!(forward, backward);
    }

    /// Concatenation never narrows either input dtype.
    #[test]
    fn prop_concat_never_narrows((left, right) in arb_column_pair(6)) {
        let joined = left.concat(&right).expect("numeric concat");
        let expected = promote_dtypes(left.dtype(), right.dtype()).expect("numeric pair");
        prop_assert_eq!(joined.dtype(), expected);
        prop_assert_eq!(joined.len(), left.len() + right.len());
        prop_assert!(joined.dtype().bits() >= left.dtype().bits());
        prop_assert!(joined.dtype().bits() >= right.dtype().bits());
    }
}

// ---------------------------------------------------------------------------
// Property: derived operations
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Ascending sort is ordered, and descending is its reverse.
    #[test]
    fn prop_sort_orders_values(column in arb_numeric_column(15)) {
        let asc = column.sorted(SortOrder::Asc);
        let values = asc.to_f64_vec().expect("numeric");
        prop_assert!(values.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(asc.reversed(), column.sorted(SortOrder::Desc));
        prop_assert_eq!(asc.len(), column.len());
    }

    /// Label codes decode back to the original strings.
    #[test]
    fn prop_label_round_trip(column in arb_string_column(20)) {
        let codes = column.label_encode(None).expect("string column");
        let labels = codes.label_map().expect("label map kept").len();
        let max_code = codes.max().expect("numeric codes");
        prop_assert!(max_code < labels as f64);
        prop_assert_eq!(codes.label_decode().expect("decode"), column);
    }

    /// Distinct values split into bins of exactly `len / k` members.
    #[test]
    fn prop_k_bins_partition_evenly(
        (k, values) in (1usize..5, 1usize..6).prop_flat_map(|(k, per_bin)| {
            let all: Vec<i64> = (0..(k * per_bin) as i64).collect();
            (Just(k), Just(all).prop_shuffle())
        })
    ) {
        let per_bin = values.len() / k;
        let bins = Column::of(values).k_bins(k).expect("numeric column");
        let codes = bins.to_f64_vec().expect("numeric codes");
        for bin in 0..k {
            let members = codes.iter().filter(|code| **code == bin as f64).count();
            prop_assert_eq!(members, per_bin);
        }
    }

    /// Sorted input, repeats included, never steps back to a lower bin.
    #[test]
    fn prop_k_bins_are_monotonic_on_sorted_input(
        k in 1usize..6,
        mut values in proptest::collection::vec(-50i64..50, 1..40),
    ) {
        values.sort_unstable();
        let bins = Column::of(values).k_bins(k).expect("numeric column");
        let codes = bins.to_f64_vec().expect("numeric codes");
        prop_assert!(codes.windows(2).all(|pair| pair[0] <= pair[1]), "codes {:?}", codes);
        prop_assert!(codes.iter().all(|code| *code < k as f64));
    }
}
