//! Backend Equivalence Tests
//!
//! Ensures SIMD == Scalar for min, max and rms.
//!
//! ## Test Strategy
//!
//! 1. **Property-Based Tests**: proptest generates random images
//! 2. **Backend Equivalence**: SIMD results == Scalar results, bit for bit
//! 3. **Edge Cases**: NaN, infinity, f64-only precision, empty inputs

use apercal_imstats::stats::summarize;
use apercal_imstats::Backend;
use proptest::prelude::*;
use trueno::Vector;

fn assert_equivalent(samples: &[f64]) {
    let scalar = summarize(samples, Backend::Scalar);
    let simd = summarize(samples, Backend::Simd);
    for (s, v) in scalar.to_array().iter().zip(simd.to_array().iter()) {
        assert!(
            (s.is_nan() && v.is_nan()) || s == v,
            "backend mismatch: scalar {scalar} vs simd {simd}"
        );
    }
}

/// Samples MIRIAD typically writes: single precision with NaN blanks
fn arb_f32_image(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(
        prop_oneof![
            9 => (-1.0e3f32..1.0e3).prop_map(f64::from),
            1 => Just(f64::NAN),
        ],
        0..max_len,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: f32-representable images take the SIMD path and agree exactly
    #[test]
    fn prop_simd_equals_scalar_f32(samples in arb_f32_image(2048)) {
        let scalar = summarize(&samples, Backend::Scalar);
        let simd = summarize(&samples, Backend::Simd);
        prop_assert!(
            scalar.approx_eq(&simd, 0.0),
            "scalar {} vs simd {}", scalar, simd
        );
    }

    /// Property: full-precision images fall back and agree exactly
    #[test]
    fn prop_simd_equals_scalar_f64(samples in proptest::collection::vec(-1.0e9f64..1.0e9, 1..512)) {
        let scalar = summarize(&samples, Backend::Scalar);
        let simd = summarize(&samples, Backend::Simd);
        prop_assert_eq!(scalar.to_array(), simd.to_array());
    }
}

#[test]
fn test_edge_case_empty() {
    assert_equivalent(&[]);
}

#[test]
fn test_edge_case_all_nan() {
    assert_equivalent(&[f64::NAN; 17]);
}

#[test]
fn test_edge_case_infinity() {
    assert_equivalent(&[1.0, f64::NEG_INFINITY, 2.0]);
    assert_equivalent(&[f64::INFINITY, f64::NAN]);
}

#[test]
fn test_edge_case_signed_zero() {
    assert_equivalent(&[-0.0, 0.0, f64::NAN]);
}

#[test]
fn test_edge_case_non_multiple_of_lane_width() {
    // 37 samples leaves a remainder for every SIMD width
    let samples: Vec<f64> = (0..37).map(|i| f64::from(i) - 18.5).collect();
    assert_equivalent(&samples);
}

/// trueno SIMD min/max matches a plain fold (SIMD backend dependency)
#[test]
fn test_trueno_vector_min_max() {
    let data = vec![5.0f32, 2.0, 8.0, 1.0, 9.0, 3.0];
    let vector = Vector::from_slice(&data);

    let min = vector.min().expect("SIMD min should work");
    let max = vector.max().expect("SIMD max should work");

    assert!((min - 1.0).abs() < 1e-6, "SIMD min should be 1.0");
    assert!((max - 9.0).abs() < 1e-6, "SIMD max should be 9.0");
}
