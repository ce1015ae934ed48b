//! # Spectral pitch estimator
//!
//! Picks the dominant DFT bin inside a configured frequency band.
//!
//! Each window goes through:
//! 1. A peak-amplitude noise gate. Quiet windows return immediately without
//!    running the transform.
//! 2. An optional Hann taper (off by default; the reference frame is rectangular).
//! 3. A forward FFT of size `N` on a workspace planned and allocated once in
//!    [`SpectralEstimator::new`], so analysis never allocates.
//! 4. A search over bins `[min_bin, max_bin)` for the largest magnitude. If it
//!    exceeds the magnitude threshold the bin's center frequency is returned.
//!
//! Magnitudes are unnormalized: a full-scale sinusoid centered on a bin has
//! magnitude close to `N / 2`.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use log::trace;

use crate::config::EngineConfig;
use crate::dsp::{hann_coefficients, peak_amplitude};
use crate::types::PitchEstimate;

pub struct SpectralEstimator {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    taper: Option<Vec<f32>>,
    window_size: usize,
    sample_rate: f64,
    noise_gate: f32,
    magnitude_threshold: f32,
    min_frequency_hz: f64,
    max_frequency_hz: f64,
    min_bin: usize,
    max_bin: usize,
    transforms_run: u64,
}

impl SpectralEstimator {
    pub fn new(config: &EngineConfig) -> Self {
        let n = config.window_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let sr = config.sample_rate as f64;
        let min_bin = ((config.min_frequency_hz as f64 * n as f64 / sr) as usize).max(1);
        let max_bin = ((config.max_frequency_hz as f64 * n as f64 / sr) as usize).min(n / 2);

        Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); n],
            scratch,
            taper: config.hann_window.then(|| hann_coefficients(n)),
            window_size: n,
            sample_rate: sr,
            noise_gate: config.noise_gate,
            magnitude_threshold: config.magnitude_threshold,
            min_frequency_hz: config.min_frequency_hz as f64,
            max_frequency_hz: config.max_frequency_hz as f64,
            min_bin,
            max_bin,
            transforms_run: 0,
        }
    }

    /// Estimate the dominant frequency of one analysis window.
    ///
    /// # Panics
    /// If `window.len()` differs from the configured window size.
    pub fn estimate(&mut self, window: &[f32]) -> PitchEstimate {
        assert_eq!(
            window.len(),
            self.window_size,
            "analysis window must match the configured window size"
        );

        let peak = peak_amplitude(window);
        if peak <= self.noise_gate {
            trace!("gate: peak {:.5} not above {:.5}", peak, self.noise_gate);
            return PitchEstimate::silent();
        }

        match &self.taper {
            Some(taper) => {
                for ((dst, &s), &w) in self.buffer.iter_mut().zip(window).zip(taper) {
                    *dst = Complex::new(s * w, 0.0);
                }
            }
            None => {
                for (dst, &s) in self.buffer.iter_mut().zip(window) {
                    *dst = Complex::new(s, 0.0);
                }
            }
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        self.transforms_run += 1;

        let mut best_bin = 0usize;
        let mut best_mag = 0.0f32;
        for bin in self.min_bin..self.max_bin {
            let mag = self.buffer[bin].norm();
            if mag > best_mag {
                best_mag = mag;
                best_bin = bin;
            }
        }

        if best_bin == 0 || best_mag <= self.magnitude_threshold {
            trace!("spectrum: strongest bin {} magnitude {:.2} too weak", best_bin, best_mag);
            return PitchEstimate::silent();
        }

        let frequency = self.bin_to_hz(best_bin);
        if frequency < self.min_frequency_hz || frequency > self.max_frequency_hz {
            return PitchEstimate::silent();
        }
        trace!("spectrum: bin {} → {:.2} Hz (magnitude {:.1})", best_bin, frequency, best_mag);
        PitchEstimate::confident(frequency)
    }

    pub fn bin_to_hz(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate / self.window_size as f64
    }

    /// Searched bin range, `[start, end)`.
    pub fn bin_range(&self) -> (usize, usize) {
        (self.min_bin, self.max_bin)
    }

    /// Number of windows that reached the transform (i.e. passed the gate).
    pub fn transforms_run(&self) -> u64 {
        self.transforms_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::sine_samples;

    fn estimator() -> (SpectralEstimator, EngineConfig) {
        let cfg = EngineConfig::default();
        (SpectralEstimator::new(&cfg), cfg)
    }

    #[test]
    fn test_bin_range_reference_config() {
        let (est, _) = estimator();
        // 80 Hz * 8192 / 48000 = 13.65 → 13; 2000 Hz → 341.3 → 341
        assert_eq!(est.bin_range(), (13, 341));
    }

    #[test]
    fn test_gate_skips_transform() {
        let (mut est, cfg) = estimator();
        let quiet = sine_samples(440.0, 0.004, cfg.sample_rate, cfg.window_size);
        let result = est.estimate(&quiet);
        assert!(!result.confident);
        assert_eq!(result.frequency_hz, 0.0);
        assert_eq!(est.transforms_run(), 0, "gated window must not reach the FFT");
    }

    #[test]
    fn test_peak_equal_to_gate_is_rejected() {
        let (mut est, cfg) = estimator();
        let mut window = vec![0.0f32; cfg.window_size];
        window[100] = cfg.noise_gate;
        assert!(!est.estimate(&window).confident);
        assert_eq!(est.transforms_run(), 0);

        window[100] = cfg.noise_gate * 1.01;
        est.estimate(&window);
        assert_eq!(est.transforms_run(), 1, "a peak above the gate reaches the FFT");
    }

    #[test]
    fn test_sine_within_one_bin() {
        let (mut est, cfg) = estimator();
        let bin = cfg.bin_width_hz() as f64;
        for &f in &[220.0, 440.0, 523.25, 987.77, 1500.0] {
            let s = sine_samples(f, 0.5, cfg.sample_rate, cfg.window_size);
            let r = est.estimate(&s);
            assert!(r.confident, "{} Hz should be confident", f);
            assert!(
                (r.frequency_hz - f).abs() <= bin,
                "{} Hz estimated as {:.2} (bin width {:.2})",
                f,
                r.frequency_hz,
                bin
            );
        }
    }

    #[test]
    fn test_out_of_band_tone_rejected() {
        let (mut est, cfg) = estimator();
        // 5 kHz is above the band; the only in-band content is leakage far below threshold
        let s = sine_samples(5000.0, 0.5, cfg.sample_rate, cfg.window_size);
        let r = est.estimate(&s);
        assert_eq!(est.transforms_run(), 1);
        assert!(!r.confident, "out-of-band tone gave {:.1} Hz", r.frequency_hz);
    }

    #[test]
    fn test_magnitude_threshold_rejects_weak_content() {
        let cfg = EngineConfig {
            magnitude_threshold: 1.0e6,
            ..EngineConfig::default()
        };
        let mut est = SpectralEstimator::new(&cfg);
        let s = sine_samples(440.0, 0.5, cfg.sample_rate, cfg.window_size);
        assert!(!est.estimate(&s).confident);
        assert_eq!(est.transforms_run(), 1);
    }

    #[test]
    fn test_hann_taper_still_locates_peak() {
        let cfg = EngineConfig {
            hann_window: true,
            ..EngineConfig::default()
        };
        let mut est = SpectralEstimator::new(&cfg);
        let s = sine_samples(660.0, 0.5, cfg.sample_rate, cfg.window_size);
        let r = est.estimate(&s);
        assert!(r.confident);
        assert!((r.frequency_hz - 660.0).abs() <= cfg.bin_width_hz() as f64);
    }

    #[test]
    #[should_panic]
    fn test_wrong_window_length_panics() {
        let (mut est, _) = estimator();
        est.estimate(&[0.0; 16]);
    }
}
