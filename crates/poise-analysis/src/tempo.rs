//! Onset-autocorrelation tempo estimator
//!
//! A mel-band spectral-flux envelope is autocorrelated and each lag in the
//! allowed BPM range is weighted by a log-normal prior centred on
//! `start_bpm`. Local maxima of the weighted curve are the candidates.

use crate::dsp::{center_pad, create_mel_filterbank, frames, Correlator, PowerSpectrum};
use crate::error::ExtractionError;
use crate::traits::TempoEstimator;

/// Dynamic range kept in the mel spectrogram (dB below the peak)
const TOP_DB: f64 = 80.0;

/// Power floor before the dB conversion
const AMIN: f64 = 1e-10;

/// Tempo estimator over the spectral-flux onset envelope
#[derive(Debug, Clone)]
pub struct OnsetTempoEstimator {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    /// Centre of the tempo prior (BPM)
    pub start_bpm: f64,
    /// Width of the tempo prior in octaves
    pub std_octaves: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for OnsetTempoEstimator {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 40,
            start_bpm: 120.0,
            std_octaves: 1.0,
            min_bpm: 30.0,
            max_bpm: 320.0,
        }
    }
}

impl OnsetTempoEstimator {
    /// Default estimator with the prior centred on `start_bpm`
    pub fn with_start_bpm(start_bpm: f64) -> Self {
        Self {
            start_bpm,
            ..Self::default()
        }
    }

    fn validate(&self, sample_rate: u32) -> Result<(), ExtractionError> {
        if sample_rate == 0 {
            return Err(ExtractionError::InvalidInput(
                "Invalid sample rate: 0".to_string(),
            ));
        }
        if self.n_fft == 0 || self.hop_length == 0 || self.n_mels == 0 {
            return Err(ExtractionError::InvalidInput(format!(
                "Invalid onset framing: n_fft={}, hop={}, mels={}",
                self.n_fft, self.hop_length, self.n_mels
            )));
        }
        if !(self.start_bpm > 0.0 && self.std_octaves > 0.0) {
            return Err(ExtractionError::InvalidInput(format!(
                "Invalid tempo prior: start={} BPM, std={} octaves",
                self.start_bpm, self.std_octaves
            )));
        }
        if !(self.min_bpm > 0.0 && self.max_bpm > self.min_bpm) {
            return Err(ExtractionError::InvalidInput(format!(
                "Invalid tempo range: [{}, {}] BPM",
                self.min_bpm, self.max_bpm
            )));
        }
        Ok(())
    }

    /// Spectral-flux onset strength, one value per hop
    pub fn onset_envelope(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<f64>, ExtractionError> {
        self.validate(sample_rate)?;

        let mut padded = center_pad(samples, self.n_fft);
        if padded.len() < self.n_fft {
            padded.resize(self.n_fft, 0.0);
        }

        let filterbank = create_mel_filterbank(sample_rate, self.n_fft, self.n_mels);
        let mut spectrum = PowerSpectrum::new(self.n_fft);
        let mut power = Vec::with_capacity(spectrum.num_bins());

        let mut mel_db: Vec<Vec<f64>> = Vec::new();
        for frame in frames(&padded, self.n_fft, self.hop_length) {
            spectrum.compute(frame, &mut power)?;
            let bands = filterbank
                .iter()
                .map(|filter| {
                    let energy: f64 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect();
            mel_db.push(bands);
        }

        let peak = mel_db
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let floor = peak - TOP_DB;
        for band in mel_db.iter_mut().flatten() {
            *band = band.max(floor);
        }

        let mut envelope = Vec::with_capacity(mel_db.len());
        envelope.push(0.0);
        for pair in mel_db.windows(2) {
            let flux: f64 = pair[1]
                .iter()
                .zip(&pair[0])
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum();
            envelope.push(flux / self.n_mels as f64);
        }
        envelope.truncate(mel_db.len());

        Ok(envelope)
    }

    fn lag_to_bpm(&self, lag: usize, sample_rate: u32) -> f64 {
        60.0 * sample_rate as f64 / (self.hop_length as f64 * lag as f64)
    }

    fn prior(&self, bpm: f64) -> f64 {
        let octaves = (bpm / self.start_bpm).log2() / self.std_octaves;
        (-0.5 * octaves * octaves).exp()
    }
}

impl TempoEstimator for OnsetTempoEstimator {
    fn name(&self) -> &str {
        "onset-autocorrelation"
    }

    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f64>, ExtractionError> {
        let envelope = self.onset_envelope(samples, sample_rate)?;

        let frame_rate = sample_rate as f64 / self.hop_length as f64;
        let min_lag = ((60.0 * frame_rate / self.max_bpm).ceil() as usize).max(1);
        let max_lag = (60.0 * frame_rate / self.min_bpm).floor() as usize;
        let max_lag = max_lag.min(envelope.len().saturating_sub(1));

        // Need a full period plus one neighbour on each side
        if max_lag < min_lag + 2 {
            tracing::debug!(
                "Tempo: envelope of {} frames is too short for lags {}..",
                envelope.len(),
                min_lag
            );
            return Ok(Vec::new());
        }

        let mean = envelope.iter().sum::<f64>() / envelope.len() as f64;
        let centred: Vec<f64> = envelope.iter().map(|v| v - mean).collect();

        let mut correlator = Correlator::new(centred.len(), centred.len());
        let acf = correlator.autocorrelate(&centred, max_lag)?;

        if acf[0] <= f64::EPSILON {
            tracing::debug!("Tempo: flat onset envelope, no rhythm");
            return Ok(Vec::new());
        }

        // score[i] belongs to lag min_lag + i - 1; the outer entries are neighbours only
        let scores: Vec<f64> = (min_lag - 1..=max_lag)
            .map(|lag| {
                if lag == 0 {
                    return f64::NEG_INFINITY;
                }
                acf[lag] / acf[0] * self.prior(self.lag_to_bpm(lag, sample_rate))
            })
            .collect();

        let mut peaks: Vec<(usize, f64)> = scores
            .windows(3)
            .enumerate()
            .filter(|(_, w)| w[1] > 0.0 && w[1] > w[0] && w[1] >= w[2])
            .map(|(i, w)| (min_lag + i, w[1]))
            .collect();
        peaks.sort_by(|a, b| b.1.total_cmp(&a.1));

        let candidates: Vec<f64> = peaks
            .into_iter()
            .map(|(lag, _)| self.lag_to_bpm(lag, sample_rate))
            .collect();

        tracing::debug!(
            "Tempo: {} candidates from {} onset frames, best {:?}",
            candidates.len(),
            envelope.len(),
            candidates.first()
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Short bursts every `period` samples
    fn click_train(period: usize, sample_rate: u32, seconds: f64) -> Vec<f32> {
        let n = (sample_rate as f64 * seconds) as usize;
        let mut samples = vec![0.0f32; n];
        for start in (period / 2..n).step_by(period) {
            for (i, s) in samples[start..(start + 64).min(n)].iter_mut().enumerate() {
                *s = if i % 2 == 0 { 0.8 } else { -0.8 };
            }
        }
        samples
    }

    #[test]
    fn test_click_train_tempo() {
        let estimator = OnsetTempoEstimator::default();
        // 22 hops of 512 samples per click at 22.05kHz → 117.45 BPM
        let samples = click_train(22 * 512, 22050, 6.0);
        let tempi = estimator.estimate(&samples, 22050).unwrap();

        assert!(!tempi.is_empty());
        assert!((tempi[0] - 117.45).abs() < 3.0, "tempo = {:?}", tempi);
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let estimator = OnsetTempoEstimator::default();
        let tempi = estimator.estimate(&vec![0.0; 22050 * 3], 22050).unwrap();
        assert!(tempi.is_empty());
    }

    #[test]
    fn test_short_clip_has_no_tempo() {
        let estimator = OnsetTempoEstimator::default();
        assert!(estimator.estimate(&[], 22050).unwrap().is_empty());
        assert!(estimator
            .estimate(&click_train(512, 22050, 0.1), 22050)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_onset_envelope_has_one_value_per_hop() {
        let estimator = OnsetTempoEstimator::default();
        let envelope = estimator.onset_envelope(&vec![0.0; 22050], 22050).unwrap();
        // 22050 + 2048 padded → 1 + 22050 / 512 frames
        assert_eq!(envelope.len(), 44);
        assert!(envelope.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_prior_peaks_at_start_bpm() {
        let estimator = OnsetTempoEstimator::default();
        assert_eq!(estimator.prior(120.0), 1.0);
        assert!((estimator.prior(60.0) - (-0.5f64).exp()).abs() < 1e-12);
        assert!(estimator.prior(240.0) < 1.0);
    }

    #[test]
    fn test_invalid_parameters() {
        let estimator = OnsetTempoEstimator::default();
        assert!(estimator.estimate(&[0.0; 100], 0).is_err());

        let inverted = OnsetTempoEstimator {
            min_bpm: 300.0,
            max_bpm: 30.0,
            ..OnsetTempoEstimator::default()
        };
        assert!(inverted.estimate(&[0.0; 100], 22050).is_err());
    }
}
