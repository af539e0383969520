//! Interval-membership confidence classifier
//!
//! `fit` turns a calibration set into a per-feature band `mean ± k·std`
//! (sample std, `k = 2` by default). A feature vector is confident when every
//! feature lies inside its band, bounds inclusive. Comparisons involving
//! `NaN` fail, so under the default policy a `NaN` bound vetoes every sample.
//!
//! The unfitted classifier cannot predict; fitting yields a separate
//! [`FittedClassifier`] whose interval never changes.

use crate::error::CalibrationError;
use crate::stats::{coerce_features, mean, sample_std};
use poise_types::{
    AnalysisConfig, CalibrationSet, ConfidenceInterval, ConfidenceVerdict, FeatureName,
    FeatureVector, FieldCheck, NanPolicy, RawFeatureVector,
};

/// Fitting parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceClassifier {
    /// Band half-width in standard deviations
    pub sigma_multiplier: f64,
    pub nan_policy: NanPolicy,
}

impl Default for ConfidenceClassifier {
    fn default() -> Self {
        Self {
            sigma_multiplier: 2.0,
            nan_policy: NanPolicy::Propagate,
        }
    }
}

impl ConfidenceClassifier {
    pub fn new(sigma_multiplier: f64, nan_policy: NanPolicy) -> Self {
        Self {
            sigma_multiplier,
            nan_policy,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.sigma_multiplier, config.nan_policy)
    }

    /// Fit the acceptance interval from at least two calibration vectors
    pub fn fit(&self, set: &CalibrationSet) -> Result<FittedClassifier, CalibrationError> {
        let interval = fit_interval(set, self.sigma_multiplier)?;
        self.restore(interval)
    }

    /// Adopt a previously fitted interval
    pub fn restore(
        &self,
        interval: ConfidenceInterval,
    ) -> Result<FittedClassifier, CalibrationError> {
        let nan_fields = interval.nan_fields();

        if !nan_fields.is_empty() {
            match self.nan_policy {
                NanPolicy::Reject => {
                    return Err(CalibrationError::NanBounds { fields: nan_fields })
                }
                NanPolicy::IgnoreField => tracing::warn!(
                    "NaN calibration bounds for {:?}; these features are ignored",
                    nan_fields
                ),
                NanPolicy::Propagate => tracing::warn!(
                    "NaN calibration bounds for {:?}; no sample can pass these features",
                    nan_fields
                ),
            }
        }

        Ok(FittedClassifier {
            interval,
            nan_policy: self.nan_policy,
        })
    }
}

/// `mean ± sigma_multiplier · sample_std` per feature.
///
/// Columns are sorted before summation so any ordering of the set gives
/// bit-identical bounds. `NaN` inputs produce `NaN` bounds.
pub fn fit_interval(
    set: &CalibrationSet,
    sigma_multiplier: f64,
) -> Result<ConfidenceInterval, CalibrationError> {
    if !(sigma_multiplier.is_finite() && sigma_multiplier >= 0.0) {
        return Err(CalibrationError::InvalidSigma(sigma_multiplier));
    }
    if set.len() < 2 {
        return Err(CalibrationError::InsufficientSamples { got: set.len() });
    }

    let mut lower = FeatureVector::splat(f64::NAN);
    let mut upper = FeatureVector::splat(f64::NAN);

    for name in FeatureName::ALL {
        let mut column = set.column(name);
        column.sort_by(|a, b| a.total_cmp(b));

        let mu = mean(&column);
        let sigma = sample_std(&column);

        lower = lower.with(name, mu - sigma_multiplier * sigma);
        upper = upper.with(name, mu + sigma_multiplier * sigma);
    }

    Ok(ConfidenceInterval { lower, upper })
}

/// Strict conjunction of `lower <= value <= upper` over all five features
pub fn predict(interval: &ConfidenceInterval, features: &FeatureVector) -> bool {
    FeatureName::ALL.iter().all(|&name| {
        let (lo, hi) = interval.bounds(name);
        let value = features.get(name);
        lo <= value && value <= hi
    })
}

/// Classifier with its interval fixed; safe to share across threads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedClassifier {
    interval: ConfidenceInterval,
    nan_policy: NanPolicy,
}

impl FittedClassifier {
    pub fn interval(&self) -> &ConfidenceInterval {
        &self.interval
    }

    pub fn nan_policy(&self) -> NanPolicy {
        self.nan_policy
    }

    /// Per-feature checks and the overall verdict.
    ///
    /// Under `IgnoreField`, features with a `NaN` bound do not count; if none
    /// count at all the verdict is not confident.
    pub fn evaluate(&self, features: &FeatureVector) -> ConfidenceVerdict {
        let fields: Vec<FieldCheck> = FeatureName::ALL
            .iter()
            .map(|&name| {
                let (lower, upper) = self.interval.bounds(name);
                let value = features.get(name);
                FieldCheck {
                    feature: name,
                    value,
                    lower,
                    upper,
                    passed: lower <= value && value <= upper,
                    ignored: self.nan_policy == NanPolicy::IgnoreField
                        && (lower.is_nan() || upper.is_nan()),
                }
            })
            .collect();

        let mut counted = fields.iter().filter(|c| !c.ignored).peekable();
        let confident = counted.peek().is_some() && counted.all(|c| c.passed);

        ConfidenceVerdict {
            confident,
            features: *features,
            fields,
        }
    }

    pub fn predict(&self, features: &FeatureVector) -> bool {
        self.evaluate(features).confident
    }

    /// Coerce every field to a scalar, then predict
    pub fn predict_raw(&self, raw: &RawFeatureVector) -> bool {
        self.predict(&coerce_features(raw))
    }

    pub fn evaluate_raw(&self, raw: &RawFeatureVector) -> ConfidenceVerdict {
        self.evaluate(&coerce_features(raw))
    }
}
