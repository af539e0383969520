//! Framing, windowing and FFT correlation shared by the feature estimators

use crate::error::ExtractionError;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Periodic Hann window (matches `scipy.signal.get_window("hann", n)`)
pub fn hann_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / len as f64).cos()))
        .collect()
}

/// Zero-pad `frame_length / 2` samples on both sides so frame `t` is centred on sample `t * hop`
pub fn center_pad(samples: &[f32], frame_length: usize) -> Vec<f64> {
    let pad = frame_length / 2;
    let mut padded = vec![0.0; samples.len() + 2 * pad];
    for (dst, &src) in padded[pad..].iter_mut().zip(samples) {
        *dst = src as f64;
    }
    padded
}

/// Number of whole frames of `frame_length` that fit into `len` samples
pub fn frame_count(len: usize, frame_length: usize, hop_length: usize) -> usize {
    if frame_length == 0 || hop_length == 0 || len < frame_length {
        return 0;
    }
    1 + (len - frame_length) / hop_length
}

/// Iterate over the frames of `signal`
pub fn frames(
    signal: &[f64],
    frame_length: usize,
    hop_length: usize,
) -> impl Iterator<Item = &[f64]> + '_ {
    let count = frame_count(signal.len(), frame_length, hop_length);
    (0..count).map(move |t| &signal[t * hop_length..t * hop_length + frame_length])
}

/// Power spectrum of windowed frames via real FFT
pub struct PowerSpectrum {
    r2c: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
}

impl PowerSpectrum {
    pub fn new(n_fft: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(n_fft);
        let input = r2c.make_input_vec();
        let output = r2c.make_output_vec();

        Self {
            r2c,
            window: hann_window(n_fft),
            input,
            output,
        }
    }

    /// Number of frequency bins (`n_fft / 2 + 1`)
    pub fn num_bins(&self) -> usize {
        self.output.len()
    }

    /// `|FFT(frame * window)|²` written into `power`
    pub fn compute(&mut self, frame: &[f64], power: &mut Vec<f64>) -> Result<(), ExtractionError> {
        for ((dst, &s), &w) in self.input.iter_mut().zip(frame).zip(&self.window) {
            *dst = s * w;
        }
        // Short frames are zero-padded to n_fft
        for dst in self.input.iter_mut().skip(frame.len()) {
            *dst = 0.0;
        }

        self.r2c.process(&mut self.input, &mut self.output)?;

        power.clear();
        power.extend(self.output.iter().map(|c| c.norm_sqr()));
        Ok(())
    }
}

/// FFT-accelerated cross-correlation `r[τ] = Σ_j a[j] · b[j + τ]`
///
/// Sized once for the longest inputs it will see, then reused frame after frame.
pub struct Correlator {
    n_fft: usize,
    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    buf_a: Vec<f64>,
    buf_b: Vec<f64>,
    spec_a: Vec<Complex<f64>>,
    spec_b: Vec<Complex<f64>>,
    out: Vec<f64>,
}

impl Correlator {
    /// Correlator able to take inputs of up to `max_len_a` and `max_len_b` samples
    pub fn new(max_len_a: usize, max_len_b: usize) -> Self {
        // Linear (not circular) correlation needs room for both signals
        let n_fft = (max_len_a + max_len_b).max(2).next_power_of_two();

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(n_fft);
        let c2r = planner.plan_fft_inverse(n_fft);

        Self {
            n_fft,
            buf_a: r2c.make_input_vec(),
            buf_b: r2c.make_input_vec(),
            spec_a: r2c.make_output_vec(),
            spec_b: r2c.make_output_vec(),
            out: c2r.make_output_vec(),
            r2c,
            c2r,
        }
    }

    /// Cross-correlation for lags `0..=max_lag`, clamped to `b.len() - 1`
    pub fn correlate(
        &mut self,
        a: &[f64],
        b: &[f64],
        max_lag: usize,
    ) -> Result<Vec<f64>, ExtractionError> {
        if a.len() + b.len() > self.n_fft {
            return Err(ExtractionError::InvalidInput(format!(
                "Correlation inputs ({} + {}) exceed FFT size {}",
                a.len(),
                b.len(),
                self.n_fft
            )));
        }
        if b.is_empty() {
            return Ok(Vec::new());
        }

        fill_padded(&mut self.buf_a, a);
        fill_padded(&mut self.buf_b, b);

        self.r2c.process(&mut self.buf_a, &mut self.spec_a)?;
        self.r2c.process(&mut self.buf_b, &mut self.spec_b)?;

        for (x, y) in self.spec_a.iter_mut().zip(&self.spec_b) {
            *x = x.conj() * y;
        }
        // DC and Nyquist bins of a real signal's spectrum are real
        if let Some(first) = self.spec_a.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.spec_a.last_mut() {
            last.im = 0.0;
        }

        self.c2r.process(&mut self.spec_a, &mut self.out)?;

        let scale = 1.0 / self.n_fft as f64;
        let lags = max_lag.min(b.len() - 1) + 1;
        Ok(self.out[..lags].iter().map(|v| v * scale).collect())
    }

    /// Autocorrelation `r[τ] = Σ_j x[j] · x[j + τ]`
    pub fn autocorrelate(&mut self, x: &[f64], max_lag: usize) -> Result<Vec<f64>, ExtractionError> {
        self.correlate(x, x, max_lag)
    }
}

fn fill_padded(buf: &mut [f64], data: &[f64]) {
    buf[..data.len()].copy_from_slice(data);
    buf[data.len()..].fill(0.0);
}

/// Create mel filterbank (HTK mel scale, Hz-based triangle interpolation)
pub fn create_mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
    let num_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f64 / 2.0;

    let hz_to_mel = |hz: f64| -> f64 { 2595.0 * (1.0 + hz / 700.0).log10() };
    let mel_to_hz = |mel: f64| -> f64 { 700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0) };

    let all_freqs: Vec<f64> = (0..num_bins)
        .map(|i| i as f64 * fmax / (num_bins - 1).max(1) as f64)
        .collect();

    // n_mels + 2 points: left edge, centers, right edge
    let mel_max = hz_to_mel(fmax);
    let f_pts: Vec<f64> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(i as f64 * mel_max / (n_mels + 1) as f64))
        .collect();

    let f_diff: Vec<f64> = f_pts.windows(2).map(|w| w[1] - w[0]).collect();

    let mut filterbank = vec![vec![0.0f64; num_bins]; n_mels];

    for (m, filter) in filterbank.iter_mut().enumerate() {
        for (k, &freq) in all_freqs.iter().enumerate() {
            let lower = (freq - f_pts[m]) / f_diff[m];
            let upper = (f_pts[m + 2] - freq) / f_diff[m + 1];
            filter[k] = lower.min(upper).max(0.0);
        }
    }

    filterbank
}
