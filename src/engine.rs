//! The transcription pipeline for one run:
//! window buffer → gate/spectral estimator → debouncer → {MIDI emitter, recorder}.
//!
//! The engine is single-owner. Whoever calls [`TranscriptionEngine::process`]
//! owns every piece of pipeline state; observers see transitions only through
//! the optional [`SharedStatus`] atomics.

use log::{debug, info};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::debouncer::NoteDebouncer;
use crate::error::Result;
use crate::midi_out::{MidiEmitter, MidiSink};
use crate::recorder::DetectionRecorder;
use crate::spectral::SpectralEstimator;
use crate::status::SharedStatus;
use crate::types::NoteTransition;
use crate::window_buffer::OverlapWindowBuffer;

pub struct TranscriptionEngine<S: MidiSink> {
    config: EngineConfig,
    buffer: OverlapWindowBuffer,
    estimator: SpectralEstimator,
    debouncer: NoteDebouncer,
    emitter: MidiEmitter<S>,
    recorder: DetectionRecorder,
    status: Option<Arc<SharedStatus>>,
    windows_processed: u64,
    finished: bool,
}

impl<S: MidiSink> TranscriptionEngine<S> {
    pub fn new(config: EngineConfig, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buffer: OverlapWindowBuffer::new(config.window_size, config.hop_size),
            estimator: SpectralEstimator::new(&config),
            debouncer: NoteDebouncer::new(&config),
            emitter: MidiEmitter::new(sink),
            recorder: DetectionRecorder::new(),
            status: None,
            windows_processed: 0,
            finished: false,
            config,
        })
    }

    /// Publish transitions to a status reader.
    pub fn with_status(mut self, status: Arc<SharedStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Append a block of mono samples and analyze every complete window.
    ///
    /// A MIDI write failure aborts the block and is returned to the caller.
    pub fn process(&mut self, samples: &[f32]) -> Result<()> {
        self.buffer.push(samples);
        let half = (self.config.window_size / 2) as f64;
        let sr = self.config.sample_rate as f64;

        loop {
            let timestamp_sec = (self.buffer.frames_processed() as f64 + half) / sr;
            let estimate = match self.buffer.try_take_window() {
                Some(window) => self.estimator.estimate(window),
                None => break,
            };
            let transition = self.debouncer.update(estimate, timestamp_sec);
            self.buffer.commit_hop();
            self.windows_processed += 1;
            if let Some(status) = &self.status {
                status.count_window();
            }
            self.apply(transition)?;
        }
        Ok(())
    }

    fn apply(&mut self, transition: NoteTransition) -> Result<()> {
        match transition {
            NoteTransition::Hold => {}
            NoteTransition::Onset {
                released,
                detection,
            } => {
                // The emitter sends the off for the released note before the new on.
                debug_assert_eq!(released, self.emitter.sounding());
                self.recorder.record(detection);
                self.emitter.note_on(
                    detection.midi_note,
                    self.config.velocity,
                    detection.timestamp_sec,
                )?;
                if let Some(status) = &self.status {
                    status.publish_onset(detection.midi_note, detection.frequency_hz);
                }
            }
            NoteTransition::Offset {
                note,
                timestamp_sec,
            } => {
                self.emitter.note_off(note, timestamp_sec)?;
                if let Some(status) = &self.status {
                    status.publish_offset(note);
                }
            }
        }
        Ok(())
    }

    /// Shut the pipeline down: release a sounding note, then close the sink.
    ///
    /// Returns the released note. Idempotent; later calls do nothing.
    pub fn finish(&mut self) -> Result<Option<u8>> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        let timestamp_sec = self.buffer.frames_processed() as f64 / self.config.sample_rate as f64;
        self.debouncer.finish();
        let released = self.emitter.release_all(timestamp_sec);
        if let Ok(Some(note)) = released {
            debug!("final note-off for {}", note);
            if let Some(status) = &self.status {
                status.publish_offset(note);
            }
        }
        let closed = self.emitter.close();
        info!(
            "Engine finished: {} windows, {} detections, {} MIDI messages",
            self.windows_processed,
            self.recorder.len(),
            self.emitter.messages_sent()
        );
        let released = released?;
        closed?;
        Ok(released)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recorder(&self) -> &DetectionRecorder {
        &self.recorder
    }

    pub fn sink(&self) -> &S {
        self.emitter.sink()
    }

    pub fn confirmed_note(&self) -> u8 {
        self.debouncer.confirmed_note()
    }

    pub fn windows_processed(&self) -> u64 {
        self.windows_processed
    }

    pub fn messages_sent(&self) -> u64 {
        self.emitter.messages_sent()
    }

    /// Transforms actually run (windows that passed the noise gate).
    pub fn transforms_run(&self) -> u64 {
        self.estimator.transforms_run()
    }

    pub fn into_parts(self) -> (DetectionRecorder, S) {
        (self.recorder, self.emitter.into_sink())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::sine_samples;
    use crate::midi_out::MemorySink;
    use crate::types::MidiEventKind;

    fn small_config() -> EngineConfig {
        EngineConfig {
            window_size: 2048,
            hop_size: 1024,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_silence_produces_nothing() {
        let mut engine = TranscriptionEngine::new(small_config(), MemorySink::new()).unwrap();
        engine.process(&vec![0.0; 48000]).unwrap();
        assert!(engine.windows_processed() > 40);
        assert_eq!(engine.transforms_run(), 0);
        assert!(engine.recorder().is_empty());
        assert!(engine.sink().messages.is_empty());
    }

    #[test]
    fn test_tone_then_finish_releases_note() {
        let cfg = small_config();
        let mut engine = TranscriptionEngine::new(cfg.clone(), MemorySink::new()).unwrap();
        engine
            .process(&sine_samples(440.0, 0.5, cfg.sample_rate, 24000))
            .unwrap();
        assert_eq!(engine.confirmed_note(), 69);

        assert_eq!(engine.finish().unwrap(), Some(69));
        assert_eq!(engine.finish().unwrap(), None, "finish is idempotent");

        let (recorder, sink) = engine.into_parts();
        assert_eq!(recorder.len(), 1);
        assert_eq!(
            sink.events(),
            vec![(MidiEventKind::NoteOn, 69), (MidiEventKind::NoteOff, 69)]
        );
        assert!(sink.closed);
    }

    #[test]
    fn test_note_change_sends_off_before_on() {
        let cfg = small_config();
        let mut engine = TranscriptionEngine::new(cfg.clone(), MemorySink::new()).unwrap();
        engine
            .process(&sine_samples(440.0, 0.5, cfg.sample_rate, 12000))
            .unwrap();
        engine
            .process(&sine_samples(659.26, 0.5, cfg.sample_rate, 12000))
            .unwrap();

        let events = engine.sink().events();
        let ons: Vec<_> = events
            .iter()
            .filter(|(k, _)| *k == MidiEventKind::NoteOn)
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(ons.first(), Some(&69));
        assert_eq!(ons.last(), Some(&76));

        // Single voice: every note-on is preceded by silence in the event stream
        let mut sounding: Option<u8> = None;
        for (kind, note) in events {
            match kind {
                MidiEventKind::NoteOn => {
                    assert!(sounding.is_none(), "overlapping note-on for {}", note);
                    sounding = Some(note);
                }
                MidiEventKind::NoteOff => {
                    assert_eq!(sounding, Some(note));
                    sounding = None;
                }
            }
        }
    }

    #[test]
    fn test_status_receives_transitions() {
        let cfg = small_config();
        let status = Arc::new(SharedStatus::new());
        let mut engine = TranscriptionEngine::new(cfg.clone(), MemorySink::new())
            .unwrap()
            .with_status(status.clone());
        engine
            .process(&sine_samples(440.0, 0.5, cfg.sample_rate, 8192))
            .unwrap();
        let snap = status.take_change().unwrap();
        assert_eq!(snap.confirmed_note, 69);
        assert_eq!(status.windows(), engine.windows_processed());

        engine.finish().unwrap();
        let snap = status.take_change().unwrap();
        assert_eq!(snap.confirmed_note, 0);
        assert_eq!(snap.released_note, 69);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = EngineConfig {
            hop_size: 0,
            ..EngineConfig::default()
        };
        assert!(TranscriptionEngine::new(cfg, MemorySink::new()).is_err());
    }
}
