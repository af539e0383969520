//! Estimator traits
//!
//! The extractor is assembled from one estimator per acoustic dimension so
//! alternative trackers can be swapped in without touching the statistics.

use crate::error::ExtractionError;
use crate::pitch::PitchTrack;

/// Frame-wise fundamental frequency estimation
pub trait PitchEstimator: Send + Sync {
    /// Estimator name
    fn name(&self) -> &str;

    /// Track F0 over mono samples; unvoiced frames are `None`
    fn track(&self, samples: &[f32], sample_rate: u32) -> Result<PitchTrack, ExtractionError>;
}

/// Tempo estimation used as a speaking-rate proxy
pub trait TempoEstimator: Send + Sync {
    /// Estimator name
    fn name(&self) -> &str;

    /// Candidate tempi in BPM, best first. Empty when the signal carries no rhythm.
    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f64>, ExtractionError>;
}
