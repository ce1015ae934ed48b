//! Engine configuration: every tunable threshold in one serializable struct.
//!
//! Defaults are the reference operating point: 48 kHz, 8192-sample windows
//! with 50% overlap, and both debounce thresholds at 1. A JSON file may name
//! any subset of fields; the rest keep their defaults.

use crate::error::{Result, TranscriberError};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_VELOCITY: u8 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Analysis window length `N` (also the transform size).
    pub window_size: usize,
    /// Samples the window advances between analyses (`H < N`).
    pub hop_size: usize,
    /// Peak amplitude below which a window is treated as silence.
    pub noise_gate: f32,
    /// Minimum (unnormalized) bin magnitude for a confident pitch.
    pub magnitude_threshold: f32,
    /// Lower edge of the searched band (Hz).
    pub min_frequency_hz: f32,
    /// Upper edge of the searched band (Hz).
    pub max_frequency_hz: f32,
    /// Estimates at or below this frequency count as silence in the debouncer.
    pub min_confident_hz: f32,
    /// Consecutive identical notes required before a note-on.
    pub detection_threshold: u32,
    /// Consecutive silent windows required before a note-off.
    pub silence_threshold: u32,
    /// Note-on velocity.
    pub velocity: u8,
    /// Apply a Hann taper before the transform. Off keeps the rectangular frame.
    pub hann_window: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            window_size: 8192,
            hop_size: 4096,
            noise_gate: 0.005,
            magnitude_threshold: 5.0,
            min_frequency_hz: 80.0,
            max_frequency_hz: 2000.0,
            min_confident_hz: 200.0,
            detection_threshold: 1,
            silence_threshold: 1,
            velocity: DEFAULT_VELOCITY,
            hann_window: false,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Engine config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(TranscriberError::Config(msg)) };
        if self.sample_rate == 0 {
            return fail("sample_rate must be positive".into());
        }
        if self.window_size < 2 {
            return fail(format!("window_size {} is too small", self.window_size));
        }
        if self.hop_size == 0 || self.hop_size >= self.window_size {
            return fail(format!(
                "hop_size {} must be in 1..{}",
                self.hop_size, self.window_size
            ));
        }
        if self.min_frequency_hz >= self.max_frequency_hz {
            return fail(format!(
                "min_frequency_hz {} must be below max_frequency_hz {}",
                self.min_frequency_hz, self.max_frequency_hz
            ));
        }
        if self.noise_gate < 0.0 || self.magnitude_threshold < 0.0 {
            return fail("thresholds must be non-negative".into());
        }
        if self.velocity == 0 || self.velocity > 127 {
            return fail(format!("velocity {} must be in 1..=127", self.velocity));
        }
        Ok(())
    }

    /// Width of one spectral bin in Hz.
    pub fn bin_width_hz(&self) -> f32 {
        self.sample_rate as f32 / self.window_size as f32
    }

    /// Duration of one analysis window in seconds.
    pub fn window_secs(&self) -> f64 {
        self.window_size as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.hop_size, cfg.window_size / 2);
        assert!((cfg.bin_width_hz() - 5.859375).abs() < 1e-6);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "detection_threshold": 3, "hann_window": true }"#).unwrap();
        assert_eq!(cfg.detection_threshold, 3);
        assert!(cfg.hann_window);
        assert_eq!(cfg.window_size, 8192);
        assert_eq!(cfg.silence_threshold, 1);
    }

    #[test]
    fn test_rejects_hop_not_below_window() {
        let cfg = EngineConfig {
            hop_size: 8192,
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TranscriberError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_velocity() {
        let cfg = EngineConfig {
            velocity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TranscriberError::Config(_))));
        assert!(EngineConfig { velocity: 1, ..EngineConfig::default() }.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_band() {
        let cfg = EngineConfig {
            min_frequency_hz: 2000.0,
            max_frequency_hz: 80.0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("p2m_cfg_{}.json", std::process::id()));
        let cfg = EngineConfig {
            silence_threshold: 4,
            ..EngineConfig::default()
        };
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
        let _ = std::fs::remove_file(&path);
    }
}
