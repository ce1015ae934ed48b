pub mod config;
pub mod coordinator;
pub mod debouncer;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod midi_out;
pub mod note;
pub mod recorder;
pub mod spectral;
pub mod status;
pub mod types;
pub mod wav_player;
pub mod window_buffer;

#[cfg(feature = "live")]
pub mod audio_input;

pub use config::EngineConfig;
pub use engine::TranscriptionEngine;
pub use error::{Result, TranscriberError};
