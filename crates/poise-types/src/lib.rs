//! Shared types for Poise
//!
//! This crate contains the data structures exchanged between the audio
//! decoder, the vocal-confidence analysis and the worker process.
//!
//! Feature values are `f64` and may be `NaN`. `serde_json` writes non-finite
//! floats as `null`; the deserializers here read `null` back as `NaN`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Audio Types
// ============================================================================

/// Decoded audio: interleaved samples plus the layout reported by the decoder
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Interleaved samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Number of interleaved channels (at least 1)
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Single-channel waveform
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    /// Number of sample frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    /// Average all channels into one. Mono input is returned unchanged.
    pub fn to_mono(&self) -> Waveform {
        if self.is_mono() {
            return self.clone();
        }

        let channels = self.channels as usize;
        let mono = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Waveform::mono(mono, self.sample_rate)
    }

    /// Keep only the frames with index `< seconds * sample_rate`.
    /// Shorter waveforms are returned in full, never padded.
    pub fn truncated(&self, seconds: f64) -> Waveform {
        let max_frames = (seconds.max(0.0) * self.sample_rate as f64) as usize;
        if self.frame_count() <= max_frames {
            return self.clone();
        }

        let keep = max_frames * self.channels as usize;
        Waveform::new(
            self.samples[..keep].to_vec(),
            self.channels,
            self.sample_rate,
        )
    }
}

// ============================================================================
// Feature Types
// ============================================================================

/// The five prosodic descriptors of a voice sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    PitchMean,
    PitchStd,
    LoudnessMean,
    LoudnessStd,
    SpeakingRate,
}

impl FeatureName {
    /// All features in schema order
    pub const ALL: [FeatureName; 5] = [
        FeatureName::PitchMean,
        FeatureName::PitchStd,
        FeatureName::LoudnessMean,
        FeatureName::LoudnessStd,
        FeatureName::SpeakingRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PitchMean => "pitch_mean",
            Self::PitchStd => "pitch_std",
            Self::LoudnessMean => "loudness_mean",
            Self::LoudnessStd => "loudness_std",
            Self::SpeakingRate => "speaking_rate",
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads a JSON `null` as `NaN`
fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Fixed-schema feature record extracted from one waveform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(deserialize_with = "nan_from_null")]
    pub pitch_mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub pitch_std: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub loudness_mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub loudness_std: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub speaking_rate: f64,
}

impl FeatureVector {
    /// Build a vector by evaluating `f` for every feature
    pub fn from_fn(mut f: impl FnMut(FeatureName) -> f64) -> Self {
        Self {
            pitch_mean: f(FeatureName::PitchMean),
            pitch_std: f(FeatureName::PitchStd),
            loudness_mean: f(FeatureName::LoudnessMean),
            loudness_std: f(FeatureName::LoudnessStd),
            speaking_rate: f(FeatureName::SpeakingRate),
        }
    }

    /// Every field set to `value`
    pub fn splat(value: f64) -> Self {
        Self::from_fn(|_| value)
    }

    pub fn get(&self, name: FeatureName) -> f64 {
        match name {
            FeatureName::PitchMean => self.pitch_mean,
            FeatureName::PitchStd => self.pitch_std,
            FeatureName::LoudnessMean => self.loudness_mean,
            FeatureName::LoudnessStd => self.loudness_std,
            FeatureName::SpeakingRate => self.speaking_rate,
        }
    }

    /// Copy with one field replaced
    pub fn with(mut self, name: FeatureName, value: f64) -> Self {
        match name {
            FeatureName::PitchMean => self.pitch_mean = value,
            FeatureName::PitchStd => self.pitch_std = value,
            FeatureName::LoudnessMean => self.loudness_mean = value,
            FeatureName::LoudnessStd => self.loudness_std = value,
            FeatureName::SpeakingRate => self.speaking_rate = value,
        }
        self
    }

    /// Fields in schema order
    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, f64)> + '_ {
        FeatureName::ALL.iter().map(move |&name| (name, self.get(name)))
    }

    /// Fields that are `NaN`
    pub fn nan_fields(&self) -> Vec<FeatureName> {
        self.iter()
            .filter(|(_, v)| v.is_nan())
            .map(|(name, _)| name)
            .collect()
    }

    /// Field-wise equality where `NaN` equals `NaN`
    pub fn same_as(&self, other: &FeatureVector) -> bool {
        self.iter().zip(other.iter()).all(|((_, a), (_, b))| {
            (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
        })
    }
}

/// A feature value as handed in by a caller, before scalar coercion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawFeature {
    /// JSON `null`
    #[default]
    Null,
    Scalar(f64),
    Values(Vec<f64>),
    Mapping(BTreeMap<String, f64>),
}

impl From<f64> for RawFeature {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for RawFeature {
    fn from(values: Vec<f64>) -> Self {
        Self::Values(values)
    }
}

/// Uncoerced feature record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFeatureVector {
    pub pitch_mean: RawFeature,
    pub pitch_std: RawFeature,
    pub loudness_mean: RawFeature,
    pub loudness_std: RawFeature,
    pub speaking_rate: RawFeature,
}

impl RawFeatureVector {
    pub fn get(&self, name: FeatureName) -> &RawFeature {
        match name {
            FeatureName::PitchMean => &self.pitch_mean,
            FeatureName::PitchStd => &self.pitch_std,
            FeatureName::LoudnessMean => &self.loudness_mean,
            FeatureName::LoudnessStd => &self.loudness_std,
            FeatureName::SpeakingRate => &self.speaking_rate,
        }
    }
}

impl From<FeatureVector> for RawFeatureVector {
    fn from(fv: FeatureVector) -> Self {
        Self {
            pitch_mean: fv.pitch_mean.into(),
            pitch_std: fv.pitch_std.into(),
            loudness_mean: fv.loudness_mean.into(),
            loudness_std: fv.loudness_std.into(),
            speaking_rate: fv.speaking_rate.into(),
        }
    }
}

// ============================================================================
// Calibration & Classification Types
// ============================================================================

/// Feature vectors of known-confident reference recordings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    samples: Vec<FeatureVector>,
}

impl CalibrationSet {
    pub fn new(samples: Vec<FeatureVector>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, features: FeatureVector) {
        self.samples.push(features);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[FeatureVector] {
        &self.samples
    }

    /// Column of one feature across all samples, in set order
    pub fn column(&self, name: FeatureName) -> Vec<f64> {
        self.samples.iter().map(|fv| fv.get(name)).collect()
    }
}

impl FromIterator<FeatureVector> for CalibrationSet {
    fn from_iter<I: IntoIterator<Item = FeatureVector>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Per-feature acceptance band. `lower <= upper` is not guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: FeatureVector,
    pub upper: FeatureVector,
}

impl ConfidenceInterval {
    pub fn bounds(&self, name: FeatureName) -> (f64, f64) {
        (self.lower.get(name), self.upper.get(name))
    }

    /// Features whose lower or upper bound is `NaN`
    pub fn nan_fields(&self) -> Vec<FeatureName> {
        FeatureName::ALL
            .iter()
            .copied()
            .filter(|&name| {
                let (lo, hi) = self.bounds(name);
                lo.is_nan() || hi.is_nan()
            })
            .collect()
    }
}

impl fmt::Display for ConfidenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<14} {:>14} {:>14}", "feature", "lower", "upper")?;
        for name in FeatureName::ALL {
            let (lo, hi) = self.bounds(name);
            writeln!(f, "{:<14} {:>14.4} {:>14.4}", name.as_str(), lo, hi)?;
        }
        Ok(())
    }
}

/// What to do with a feature whose calibration bounds are `NaN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Keep the field; every comparison against `NaN` fails
    #[default]
    Propagate,
    /// Drop the field from the conjunction
    IgnoreField,
    /// Refuse to fit
    Reject,
}

/// Outcome of checking one feature against its bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCheck {
    pub feature: FeatureName,
    #[serde(deserialize_with = "nan_from_null")]
    pub value: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub lower: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub upper: f64,
    pub passed: bool,
    /// Excluded from the verdict by the NaN policy
    #[serde(default)]
    pub ignored: bool,
}

/// Classification result with per-feature detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceVerdict {
    pub confident: bool,
    pub features: FeatureVector,
    pub fields: Vec<FieldCheck>,
}

impl ConfidenceVerdict {
    /// Features that failed and counted toward the verdict
    pub fn failed_fields(&self) -> Vec<FeatureName> {
        self.fields
            .iter()
            .filter(|c| !c.passed && !c.ignored)
            .map(|c| c.feature)
            .collect()
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// Analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Only this many leading seconds of a recording are analysed
    pub clip_seconds: f64,
    /// Lower bound of the pitch search band (Hz)
    pub pitch_min_hz: f64,
    /// Upper bound of the pitch search band (Hz)
    pub pitch_max_hz: f64,
    /// Normalized-difference threshold below which a frame counts as voiced
    pub yin_threshold: f64,
    /// RMS analysis frame length in samples
    pub rms_frame_length: usize,
    /// RMS hop length in samples
    pub rms_hop_length: usize,
    /// Centre of the tempo prior (BPM)
    pub tempo_start_bpm: f64,
    /// Half-width of the acceptance band in standard deviations
    pub sigma_multiplier: f64,
    pub nan_policy: NanPolicy,
    /// Where the fitted calibration profile is persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_path: Option<PathBuf>,
    /// Reference recordings used when no profile exists yet
    pub calibration_sources: Vec<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            clip_seconds: 7.0,
            pitch_min_hz: 80.0,
            pitch_max_hz: 300.0,
            yin_threshold: 0.15,
            rms_frame_length: 2048,
            rms_hop_length: 512,
            tempo_start_bpm: 120.0,
            sigma_multiplier: 2.0,
            nan_policy: NanPolicy::Propagate,
            calibration_path: None,
            calibration_sources: Vec::new(),
        }
    }
}

// ============================================================================
// Worker IPC Types
// ============================================================================

/// Worker command for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    /// Fit the confidence interval from reference recordings
    Calibrate { paths: Vec<String> },
    /// Extract features from a recording
    Extract { path: String },
    /// Classify a recording
    Classify { path: String },
    /// Classify an already extracted feature record
    ClassifyFeatures { features: RawFeatureVector },
    /// Classify a recorded answer and build the evaluation prompt for it
    EvaluationPrompt {
        path: String,
        question: String,
        #[serde(default)]
        answer: String,
    },
    /// Shutdown worker
    Shutdown,
}

/// Worker response for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    /// Fitted bounds
    Calibration {
        interval: ConfidenceInterval,
        sources: Vec<String>,
    },
    /// Extracted features
    Features { features: FeatureVector },
    /// Classification result
    Verdict(ConfidenceVerdict),
    /// Evaluation prompt for the chat model
    Prompt { confident: bool, prompt: String },
    /// Error
    Error { message: String },
    /// Acknowledgement
    Ok,
}
