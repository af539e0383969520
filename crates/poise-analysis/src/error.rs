//! Error types for feature extraction and calibration

use poise_types::FeatureName;
use thiserror::Error;

/// Errors raised while turning a waveform into features
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Invalid analysis parameters or input layout
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// FFT planning or execution failed
    #[error("FFT error: {0}")]
    Fft(#[from] realfft::FftError),
}

/// Errors raised while fitting the confidence interval
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("At least 2 calibration samples are required, got {got}")]
    InsufficientSamples { got: usize },

    #[error("Calibration produced NaN bounds for: {}", join_names(.fields))]
    NanBounds { fields: Vec<FeatureName> },

    #[error("Sigma multiplier must be finite and non-negative, got {0}")]
    InvalidSigma(f64),
}

fn join_names(fields: &[FeatureName]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
