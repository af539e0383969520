//! Short-time RMS loudness

use crate::dsp::{center_pad, frames};
use crate::error::ExtractionError;

/// Frame-wise root-mean-square energy over fixed-size frames
#[derive(Debug, Clone)]
pub struct RmsLoudness {
    /// Frame length in samples
    pub frame_length: usize,
    /// Hop length in samples
    pub hop_length: usize,
}

impl Default for RmsLoudness {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
        }
    }
}

impl RmsLoudness {
    pub fn new(frame_length: usize, hop_length: usize) -> Self {
        Self {
            frame_length,
            hop_length,
        }
    }

    /// RMS of every centred frame, silence included.
    ///
    /// The signal is zero-padded by half a frame on both sides, so even an
    /// empty or very short signal yields at least one frame.
    pub fn measure(&self, samples: &[f32]) -> Result<Vec<f64>, ExtractionError> {
        if self.frame_length == 0 || self.hop_length == 0 {
            return Err(ExtractionError::InvalidInput(format!(
                "Invalid RMS framing: frame={}, hop={}",
                self.frame_length, self.hop_length
            )));
        }

        // Odd frame lengths lose a sample to integer halving; pad back to one whole frame
        let mut padded = center_pad(samples, self.frame_length);
        if padded.len() < self.frame_length {
            padded.resize(self.frame_length, 0.0);
        }

        let rms: Vec<f64> = frames(&padded, self.frame_length, self.hop_length)
            .map(|frame| (frame.iter().map(|x| x * x).sum::<f64>() / frame.len() as f64).sqrt())
            .collect();

        tracing::debug!("RMS: {} frames", rms.len());

        Ok(rms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_rms() {
        let loudness = RmsLoudness::default();

        let silence = loudness.measure(&vec![0.0f32; 4096]).unwrap();
        assert!(silence.iter().all(|&r| r == 0.0));

        // Constant 0.5 signal: interior frames are fully covered
        let loud = loudness.measure(&vec![0.5f32; 8192]).unwrap();
        let interior = &loud[4..loud.len() - 4];
        assert!(interior.iter().all(|&r| (r - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_frame_count_matches_centred_framing() {
        let loudness = RmsLoudness::new(2048, 512);
        // len 22050 padded to 24098 → 1 + (24098 - 2048) / 512 = 44
        assert_eq!(loudness.measure(&vec![0.1f32; 22050]).unwrap().len(), 44);
    }

    #[test]
    fn test_short_and_empty_signals_yield_a_frame() {
        let loudness = RmsLoudness::default();
        assert_eq!(loudness.measure(&[]).unwrap(), vec![0.0]);
        assert_eq!(loudness.measure(&[0.3; 10]).unwrap().len(), 1);
        assert_eq!(RmsLoudness::new(5, 2).measure(&[]).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_framing() {
        assert!(RmsLoudness::new(0, 512).measure(&[0.1; 10]).is_err());
        assert!(RmsLoudness::new(2048, 0).measure(&[0.1; 10]).is_err());
    }
}
