//! YIN fundamental-frequency tracker
//!
//! Per frame, the cumulative-mean-normalized difference function is searched
//! for the first dip below an absolute threshold inside the lag range of the
//! configured pitch band. Frames without such a dip, and frames below the
//! silence floor, are unvoiced.
//!
//! Reference: de Cheveigné & Kawahara (2002), "YIN, a fundamental frequency
//! estimator for speech and music", JASA 111(4).

use crate::dsp::{center_pad, frame_count, frames, Correlator};
use crate::error::ExtractionError;
use crate::traits::PitchEstimator;

/// Frame duration (2048 samples at 22.05kHz)
const FRAME_SECONDS: f64 = 2048.0 / 22050.0;

/// Frames quieter than this RMS are treated as silence (-80 dBFS)
const SILENCE_RMS: f64 = 1e-4;

/// Frame-wise F0 values with an explicit unvoiced state
#[derive(Debug, Clone, PartialEq)]
pub struct PitchTrack {
    /// F0 in Hz per frame, `None` for unvoiced or silent frames
    pub frames: Vec<Option<f64>>,
    /// Hop between frame centres in samples
    pub hop_length: usize,
    pub sample_rate: u32,
}

impl PitchTrack {
    /// F0 values of voiced frames only
    pub fn voiced(&self) -> Vec<f64> {
        self.frames.iter().flatten().copied().collect()
    }

    /// Share of frames that are voiced (0.0 for an empty track)
    pub fn voiced_ratio(&self) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        self.frames.iter().filter(|f| f.is_some()).count() as f64 / self.frames.len() as f64
    }
}

/// YIN pitch tracker restricted to a frequency band
#[derive(Debug, Clone)]
pub struct YinPitchTracker {
    /// Lowest detectable F0 (Hz)
    pub fmin: f64,
    /// Highest detectable F0 (Hz)
    pub fmax: f64,
    /// Normalized-difference threshold (0.1 - 0.2 typical)
    pub threshold: f64,
}

impl Default for YinPitchTracker {
    fn default() -> Self {
        Self {
            fmin: 80.0,
            fmax: 300.0,
            threshold: 0.15,
        }
    }
}

/// Lag and frame geometry for one sample rate
struct YinGeometry {
    min_lag: usize,
    max_lag: usize,
    frame_length: usize,
    hop_length: usize,
    /// Integration window
    window: usize,
}

impl YinPitchTracker {
    pub fn new(fmin: f64, fmax: f64, threshold: f64) -> Self {
        Self {
            fmin,
            fmax,
            threshold,
        }
    }

    fn geometry(&self, sample_rate: u32) -> Result<YinGeometry, ExtractionError> {
        if sample_rate == 0 {
            return Err(ExtractionError::InvalidInput(
                "Invalid sample rate: 0".to_string(),
            ));
        }
        if !(self.fmin > 0.0 && self.fmax > self.fmin) {
            return Err(ExtractionError::InvalidInput(format!(
                "Invalid pitch band: [{:.1}, {:.1}] Hz",
                self.fmin, self.fmax
            )));
        }

        let sr = sample_rate as f64;
        let min_lag = ((sr / self.fmax).floor() as usize).max(2);
        let max_lag = ((sr / self.fmin).ceil() as usize).max(min_lag + 2);
        let frame_length = ((sr * FRAME_SECONDS).round() as usize).max(2 * max_lag + 2);
        let hop_length = (frame_length / 4).max(1);

        Ok(YinGeometry {
            min_lag,
            max_lag,
            frame_length,
            hop_length,
            window: frame_length - max_lag,
        })
    }

    /// F0 of a single frame, `None` when unvoiced
    fn frame_f0(
        &self,
        frame: &[f64],
        geometry: &YinGeometry,
        sample_rate: u32,
        correlator: &mut Correlator,
    ) -> Result<Option<f64>, ExtractionError> {
        let w = geometry.window;

        let energy: f64 = frame[..w].iter().map(|x| x * x).sum();
        if (energy / w as f64).sqrt() < SILENCE_RMS {
            return Ok(None);
        }

        // cumsum[i] = Σ_{k<i} x[k]²
        let mut cumsum = Vec::with_capacity(frame.len() + 1);
        cumsum.push(0.0);
        for &x in frame {
            let last = cumsum[cumsum.len() - 1];
            cumsum.push(last + x * x);
        }

        let r = correlator.correlate(&frame[..w], frame, geometry.max_lag)?;

        // Difference function d(τ) = e(0) + e(τ) - 2·r(τ)
        let e0 = cumsum[w];
        let diff: Vec<f64> = r
            .iter()
            .enumerate()
            .map(|(tau, &r_tau)| (e0 + (cumsum[tau + w] - cumsum[tau]) - 2.0 * r_tau).max(0.0))
            .collect();

        let cmnd = cumulative_mean_normalized(&diff);

        let tau = match self.first_dip(&cmnd, geometry) {
            Some(tau) => tau,
            None => return Ok(None),
        };

        let refined = parabolic_refine(&cmnd, tau);
        let f0 = sample_rate as f64 / refined;

        if f0 < self.fmin || f0 > self.fmax {
            return Ok(None);
        }
        Ok(Some(f0))
    }

    /// First lag under the threshold, walked down to its local minimum
    fn first_dip(&self, cmnd: &[f64], geometry: &YinGeometry) -> Option<usize> {
        let last = geometry.max_lag.min(cmnd.len().saturating_sub(1));
        let mut tau = geometry.min_lag;

        while tau <= last {
            if cmnd[tau] < self.threshold {
                while tau < last && cmnd[tau + 1] < cmnd[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }
}

impl PitchEstimator for YinPitchTracker {
    fn name(&self) -> &str {
        "yin"
    }

    fn track(&self, samples: &[f32], sample_rate: u32) -> Result<PitchTrack, ExtractionError> {
        let geometry = self.geometry(sample_rate)?;

        let padded = center_pad(samples, geometry.frame_length);

        // The band cannot be resolved, so every frame is unvoiced
        if self.fmax >= sample_rate as f64 / 2.0 {
            tracing::warn!(
                "Pitch ceiling {:.1} Hz is at or above Nyquist for {} Hz audio, no pitch tracked",
                self.fmax,
                sample_rate
            );
            let count = frame_count(padded.len(), geometry.frame_length, geometry.hop_length);
            return Ok(PitchTrack {
                frames: vec![None; count],
                hop_length: geometry.hop_length,
                sample_rate,
            });
        }

        let mut correlator = Correlator::new(geometry.window, geometry.frame_length);

        let mut f0s = Vec::new();
        for frame in frames(&padded, geometry.frame_length, geometry.hop_length) {
            f0s.push(self.frame_f0(frame, &geometry, sample_rate, &mut correlator)?);
        }

        let track = PitchTrack {
            frames: f0s,
            hop_length: geometry.hop_length,
            sample_rate,
        };

        tracing::debug!(
            "YIN: {} frames ({}/{} hop), {:.0}% voiced",
            track.frames.len(),
            geometry.frame_length,
            geometry.hop_length,
            track.voiced_ratio() * 100.0
        );

        Ok(track)
    }
}

/// d'(0) = 1, d'(τ) = d(τ) · τ / Σ_{k=1..τ} d(k)
fn cumulative_mean_normalized(diff: &[f64]) -> Vec<f64> {
    let mut cmnd = Vec::with_capacity(diff.len());
    let mut running = 0.0;

    for (tau, &d) in diff.iter().enumerate() {
        if tau == 0 {
            cmnd.push(1.0);
            continue;
        }
        running += d;
        cmnd.push(if running > 0.0 {
            d * tau as f64 / running
        } else {
            1.0
        });
    }
    cmnd
}

/// Sub-sample lag from a parabola through the neighbouring points
fn parabolic_refine(cmnd: &[f64], tau: usize) -> f64 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f64;
    }

    let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        return tau as f64;
    }

    let shift = 0.5 * (a - c) / denom;
    tau as f64 + shift.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, seconds: f64) -> Vec<f32> {
        let n = (sample_rate as f64 * seconds) as usize;
        (0..n)
            .map(|i| (0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_sine_in_band_is_tracked() {
        let tracker = YinPitchTracker::default();
        let track = tracker.track(&sine(150.0, 16000, 1.0), 16000).unwrap();

        let voiced = track.voiced();
        assert!(track.voiced_ratio() > 0.8);

        let mean = voiced.iter().sum::<f64>() / voiced.len() as f64;
        assert!((mean - 150.0).abs() < 5.0, "mean f0 = {}", mean);

        // Interior frames see only the steady tone
        let interior = &track.frames[4..track.frames.len() - 4];
        for f0 in interior.iter().flatten() {
            assert!((f0 - 150.0).abs() < 1.0, "f0 = {}", f0);
        }
    }

    #[test]
    fn test_reported_f0_stays_in_band() {
        let tracker = YinPitchTracker::default();
        // 1 kHz is above the ceiling; only sub-harmonic lags fall inside the search range
        let track = tracker.track(&sine(1000.0, 16000, 0.5), 16000).unwrap();
        for f0 in track.voiced() {
            assert!((80.0..=300.0).contains(&f0));
        }
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let tracker = YinPitchTracker::default();
        let track = tracker.track(&vec![0.0; 16000], 16000).unwrap();
        assert!(!track.frames.is_empty());
        assert!(track.voiced().is_empty());
        assert_eq!(track.voiced_ratio(), 0.0);
    }

    #[test]
    fn test_empty_and_short_input_do_not_fail() {
        let tracker = YinPitchTracker::default();
        let empty = tracker.track(&[], 16000).unwrap();
        assert!(empty.voiced().is_empty());

        let short = tracker.track(&sine(150.0, 16000, 0.01), 16000).unwrap();
        assert!(short.frames.len() <= 2);
    }

    #[test]
    fn test_invalid_band_is_rejected() {
        let tracker = YinPitchTracker::new(300.0, 80.0, 0.15);
        assert!(tracker.track(&[0.0; 100], 16000).is_err());
        assert!(YinPitchTracker::default().track(&[0.0; 100], 0).is_err());
    }

    #[test]
    fn test_band_above_nyquist_is_unvoiced() {
        let tracker = YinPitchTracker::default();
        let track = tracker.track(&sine(100.0, 500, 2.0), 500).unwrap();
        assert!(!track.frames.is_empty());
        assert!(track.voiced().is_empty());
        assert_eq!(track.sample_rate, 500);
    }

    #[test]
    fn test_geometry_at_8khz() {
        let geometry = YinPitchTracker::default().geometry(8000).unwrap();
        assert_eq!(geometry.frame_length, 743);
        assert_eq!(geometry.hop_length, 185);
        assert_eq!(geometry.min_lag, 26);
        assert_eq!(geometry.max_lag, 100);
        assert_eq!(geometry.window, 643);

        // A 20 Hz floor needs two 400-sample periods, more than ~93 ms holds
        let low = YinPitchTracker::new(20.0, 300.0, 0.15).geometry(8000).unwrap();
        assert_eq!(low.max_lag, 400);
        assert_eq!(low.frame_length, 802);
        assert_eq!(low.hop_length, 200);
        assert_eq!(low.window, 402);
    }

    #[test]
    fn test_cmnd_starts_at_one() {
        let cmnd = cumulative_mean_normalized(&[0.0, 4.0, 2.0, 0.0]);
        assert_eq!(cmnd[0], 1.0);
        assert_eq!(cmnd[1], 1.0);
        assert!((cmnd[2] - 2.0 * 2.0 / 6.0).abs() < 1e-12);
        assert_eq!(cmnd[3], 0.0);
    }
}
