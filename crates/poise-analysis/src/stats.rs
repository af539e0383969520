//! Scalar statistics with numpy/pandas `NaN` semantics
//!
//! Empty input yields `NaN`, and any `NaN` in the input propagates to the
//! result. Nothing here filters or repairs `NaN`.

use poise_types::{FeatureVector, RawFeature, RawFeatureVector};

/// Arithmetic mean; `NaN` for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation dividing by `N` (numpy `std`); `NaN` for an empty slice
pub fn population_std(values: &[f64]) -> f64 {
    std_with_ddof(values, 0)
}

/// Standard deviation dividing by `N - 1` (pandas `std`); `NaN` below two values
pub fn sample_std(values: &[f64]) -> f64 {
    std_with_ddof(values, 1)
}

fn std_with_ddof(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|&v| (v - m) * (v - m)).sum();
    (sum_sq / (values.len() - ddof) as f64).sqrt()
}

/// Collapse a raw feature value to one float.
///
/// - scalar: passed through
/// - empty sequence or mapping: `NaN`
/// - non-empty sequence: first element
/// - non-empty mapping: the value under key `"0"`, else the first value in key order
/// - `null`: `NaN`
pub fn coerce_scalar(value: &RawFeature) -> f64 {
    match value {
        RawFeature::Null => f64::NAN,
        RawFeature::Scalar(v) => *v,
        RawFeature::Values(values) => values.first().copied().unwrap_or(f64::NAN),
        RawFeature::Mapping(map) => map
            .get("0")
            .or_else(|| map.values().next())
            .copied()
            .unwrap_or(f64::NAN),
    }
}

/// Coerce every field of a raw record with [`coerce_scalar`]
pub fn coerce_features(raw: &RawFeatureVector) -> FeatureVector {
    FeatureVector::from_fn(|name| coerce_scalar(raw.get(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert_eq!(population_std(&values), 2.0);
        assert!((sample_std(&values) - 2.138_089_935).abs() < 1e-9);
    }

    #[test]
    fn test_two_sample_std_uses_bessel_correction() {
        let std = sample_std(&[100.0, 120.0]);
        assert!((std - 14.142_135_623_730_951).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs_are_nan() {
        assert!(mean(&[]).is_nan());
        assert!(population_std(&[]).is_nan());
        assert!(sample_std(&[3.0]).is_nan());
        assert_eq!(population_std(&[3.0]), 0.0);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(mean(&[1.0, f64::NAN]).is_nan());
        assert!(sample_std(&[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn test_coerce_scalar_cases() {
        assert_eq!(coerce_scalar(&RawFeature::Scalar(3.5)), 3.5);
        assert!(coerce_scalar(&RawFeature::Null).is_nan());
        assert!(coerce_scalar(&RawFeature::Values(vec![])).is_nan());
        assert_eq!(coerce_scalar(&RawFeature::Values(vec![120.0, 60.0])), 120.0);
        assert!(coerce_scalar(&RawFeature::Mapping(BTreeMap::new())).is_nan());

        let mut map = BTreeMap::new();
        map.insert("1".to_string(), 2.0);
        map.insert("0".to_string(), 7.0);
        assert_eq!(coerce_scalar(&RawFeature::Mapping(map)), 7.0);

        let mut keyed = BTreeMap::new();
        keyed.insert("tempo".to_string(), 98.0);
        assert_eq!(coerce_scalar(&RawFeature::Mapping(keyed)), 98.0);
    }

    #[test]
    fn test_coerce_features_fills_missing_with_nan() {
        let raw = RawFeatureVector {
            pitch_mean: 110.0.into(),
            speaking_rate: vec![96.0].into(),
            ..Default::default()
        };
        let fv = coerce_features(&raw);
        assert_eq!(fv.pitch_mean, 110.0);
        assert_eq!(fv.speaking_rate, 96.0);
        assert!(fv.pitch_std.is_nan());
        assert!(fv.loudness_mean.is_nan());
    }
}
