//! Error type for device, file and configuration failures.
//!
//! Per-window outcomes (gate rejection, weak spectrum, out-of-range note) are
//! never errors; they reach the debouncer as ordinary silence evidence.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscriberError {
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("no MIDI output device found (a virtual MIDI cable or connected device is required)")]
    NoMidiOutput,
    #[error("no MIDI output port matching {0:?}")]
    MidiPortNotFound(String),
    #[error("audio configuration error: {0}")]
    AudioConfig(String),
    #[error("audio stream error: {0}")]
    AudioStream(String),
    #[error("failed to open MIDI output: {0}")]
    MidiOpen(String),
    #[error("MIDI write failed: {0}")]
    MidiWrite(String),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TranscriberError>;
