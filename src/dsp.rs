//! Shared DSP primitives: peak amplitude, Hann taper, mono mixdown, and test signal generators.

use std::f32::consts::PI;

/// Largest absolute sample value in the buffer.
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

/// Hann taper coefficients for an `n`-point frame.
pub fn hann_coefficients(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos()))
        .collect()
}

/// Mix interleaved frames down to mono by averaging channels.
pub fn mix_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Test signal generators.
#[cfg(test)]
pub mod test_helpers {
    use std::f64::consts::PI;

    /// Generate a mono sine wave of `n` samples.
    pub fn sine_samples(freq_hz: f64, amp: f64, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (amp * (2.0 * PI * freq_hz * i as f64 / sr as f64).sin()) as f32)
            .collect()
    }

    /// Generate a mono sine wave lasting `ms` milliseconds.
    pub fn sine_wave(freq_hz: f64, amp: f64, sr: u32, ms: u32) -> Vec<f32> {
        let n = (sr as u64 * ms as u64 / 1000) as usize;
        sine_samples(freq_hz, amp, sr, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_amplitude_uses_absolute_value() {
        assert_eq!(peak_amplitude(&[0.1, -0.7, 0.3]), 0.7);
        assert_eq!(peak_amplitude(&[]), 0.0);
    }

    #[test]
    fn test_peak_of_sine_matches_amplitude() {
        let s = test_helpers::sine_wave(440.0, 0.5, 48000, 100);
        assert!((peak_amplitude(&s) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_hann_endpoints_and_peak() {
        let w = hann_coefficients(9);
        assert!(w[0].abs() < 1e-6);
        assert!(w[8].abs() < 1e-6);
        assert!((w[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mix_mono_averages_frames() {
        let mono = mix_mono(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(mono, vec![0.5, 0.5]);
    }
}
