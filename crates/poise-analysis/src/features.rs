//! Prosodic feature extraction

use crate::error::ExtractionError;
use crate::loudness::RmsLoudness;
use crate::pitch::YinPitchTracker;
use crate::stats::{coerce_scalar, mean, population_std};
use crate::tempo::OnsetTempoEstimator;
use crate::traits::{PitchEstimator, TempoEstimator};
use anyhow::{Context, Result};
use poise_types::{AnalysisConfig, FeatureVector, RawFeature, Waveform};
use std::path::Path;

/// Turns a waveform into its five-field feature vector.
///
/// Holds no per-call state, so one extractor can serve any number of
/// recordings from any number of threads.
pub struct FeatureExtractor {
    clip_seconds: f64,
    pitch: Box<dyn PitchEstimator>,
    loudness: RmsLoudness,
    tempo: Box<dyn TempoEstimator>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            clip_seconds: config.clip_seconds,
            pitch: Box::new(YinPitchTracker::new(
                config.pitch_min_hz,
                config.pitch_max_hz,
                config.yin_threshold,
            )),
            loudness: RmsLoudness::new(config.rms_frame_length, config.rms_hop_length),
            tempo: Box::new(OnsetTempoEstimator::with_start_bpm(config.tempo_start_bpm)),
        }
    }

    /// Extractor with custom pitch and tempo estimators
    pub fn with_estimators(
        clip_seconds: f64,
        pitch: Box<dyn PitchEstimator>,
        loudness: RmsLoudness,
        tempo: Box<dyn TempoEstimator>,
    ) -> Self {
        Self {
            clip_seconds,
            pitch,
            loudness,
            tempo,
        }
    }

    pub fn clip_seconds(&self) -> f64 {
        self.clip_seconds
    }

    /// Extract features from the leading `clip_seconds` of a waveform.
    ///
    /// Silent, unvoiced or very short clips are not errors: the affected
    /// fields come back as `NaN`.
    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureVector, ExtractionError> {
        if waveform.sample_rate == 0 {
            return Err(ExtractionError::InvalidInput(
                "Invalid sample rate: 0".to_string(),
            ));
        }

        let clip = waveform.truncated(self.clip_seconds).to_mono();
        let sample_rate = clip.sample_rate;

        let track = self.pitch.track(&clip.samples, sample_rate)?;
        let voiced = track.voiced();

        let rms = self.loudness.measure(&clip.samples)?;

        let tempi = self.tempo.estimate(&clip.samples, sample_rate)?;

        let features = FeatureVector {
            pitch_mean: mean(&voiced),
            pitch_std: population_std(&voiced),
            loudness_mean: mean(&rms),
            loudness_std: population_std(&rms),
            speaking_rate: coerce_scalar(&RawFeature::Values(tempi)),
        };

        tracing::debug!(
            "Extracted ({}, {}) from {:.2}s @ {}Hz: {} voiced of {} frames, {} RMS frames",
            self.pitch.name(),
            self.tempo.name(),
            clip.duration_secs(),
            sample_rate,
            voiced.len(),
            track.frames.len(),
            rms.len()
        );

        let nan_fields = features.nan_fields();
        if !nan_fields.is_empty() {
            tracing::warn!("Degenerate signal, NaN features: {:?}", nan_fields);
        }

        Ok(features)
    }

    /// Decode an audio file and extract its features
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<FeatureVector> {
        let path = path.as_ref();
        let waveform = poise_audio::load_audio_file(path)?;
        self.extract(&waveform)
            .with_context(|| format!("Feature extraction failed for {:?}", path))
    }

    /// Extract features from an in-memory WAV recording
    pub fn extract_wav_bytes(&self, bytes: &[u8]) -> Result<FeatureVector> {
        let waveform = poise_audio::decode_wav_bytes(bytes)?;
        Ok(self.extract(&waveform)?)
    }
}
