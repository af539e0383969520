//! Vocal-confidence analysis for Poise
//!
//! This crate provides:
//! - Prosodic feature extraction (YIN pitch, RMS loudness, onset tempo)
//! - Calibration of the per-feature acceptance interval
//! - Interval-membership confidence classification
//! - Calibration profile storage

pub mod calibration;
pub mod classifier;
pub mod dsp;
pub mod error;
pub mod features;
pub mod loudness;
pub mod pitch;
pub mod stats;
pub mod tempo;
pub mod traits;

pub use calibration::{calibrate_from_files, CalibrationProfile, CalibrationStore};
pub use classifier::{fit_interval, predict, ConfidenceClassifier, FittedClassifier};
pub use error::{CalibrationError, ExtractionError};
pub use features::FeatureExtractor;
pub use loudness::RmsLoudness;
pub use pitch::{PitchTrack, YinPitchTracker};
pub use stats::{coerce_features, coerce_scalar};
pub use tempo::OnsetTempoEstimator;
pub use traits::{PitchEstimator, TempoEstimator};
