use log::debug;

use crate::config::EngineConfig;
use crate::note::frequency_to_midi;
use crate::types::{Detection, NoteTransition, PitchEstimate};

/// Turns noisy per-window pitch estimates into a stable note lifecycle.
///
/// # State machine
///
/// The confirmed note is either silence (0) or one MIDI note. Two run
/// counters gate every change:
///   - `detection_threshold` consecutive windows agreeing on the same note
///     confirm it (replacing whatever was sounding).
///   - `silence_threshold` consecutive windows without a usable estimate
///     release the sounding note.
///
/// An estimate is usable when it is confident, maps to a MIDI note above 0,
/// and its frequency is above `min_confident_hz`. Anything else is silence
/// evidence. Thresholds of 1 confirm every change immediately; 0 behaves as 1.
#[derive(Debug, Clone)]
pub struct NoteDebouncer {
    /// Sounding note, 0 for silence.
    confirmed_note: u8,
    pending_note: u8,
    consecutive_detections: u32,
    consecutive_silences: u32,
    detection_threshold: u32,
    silence_threshold: u32,
    min_confident_hz: f64,
}

impl NoteDebouncer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            confirmed_note: 0,
            pending_note: 0,
            consecutive_detections: 0,
            consecutive_silences: 0,
            detection_threshold: config.detection_threshold,
            silence_threshold: config.silence_threshold,
            min_confident_hz: config.min_confident_hz as f64,
        }
    }

    /// Advance the state machine by one window whose center is at `timestamp_sec`.
    pub fn update(&mut self, estimate: PitchEstimate, timestamp_sec: f64) -> NoteTransition {
        let note = if estimate.confident {
            frequency_to_midi(estimate.frequency_hz)
        } else {
            0
        };
        let usable = estimate.confident
            && (1..=127).contains(&note)
            && estimate.frequency_hz > self.min_confident_hz;

        if usable {
            let note = note as u8;
            if note == self.pending_note {
                self.consecutive_detections = self.consecutive_detections.saturating_add(1);
            } else {
                self.pending_note = note;
                self.consecutive_detections = 1;
            }
            self.consecutive_silences = 0;

            if self.consecutive_detections >= self.detection_threshold
                && self.pending_note != self.confirmed_note
            {
                let released = (self.confirmed_note != 0).then_some(self.confirmed_note);
                self.confirmed_note = self.pending_note;
                let detection = Detection {
                    timestamp_sec,
                    frequency_hz: estimate.frequency_hz,
                    midi_note: self.pending_note,
                };
                debug!("onset {} (replacing {:?})", detection, released);
                return NoteTransition::Onset {
                    released,
                    detection,
                };
            }
        } else {
            self.consecutive_silences = self.consecutive_silences.saturating_add(1);
            self.consecutive_detections = 0;

            if self.consecutive_silences >= self.silence_threshold && self.confirmed_note != 0 {
                let note = self.confirmed_note;
                self.confirmed_note = 0;
                debug!("offset note {} at {:.3}s", note, timestamp_sec);
                return NoteTransition::Offset {
                    note,
                    timestamp_sec,
                };
            }
        }
        NoteTransition::Hold
    }

    /// Release the sounding note at shutdown. Returns it if one was sounding.
    pub fn finish(&mut self) -> Option<u8> {
        let note = self.confirmed_note;
        self.confirmed_note = 0;
        self.consecutive_detections = 0;
        (note != 0).then_some(note)
    }

    pub fn confirmed_note(&self) -> u8 {
        self.confirmed_note
    }

    pub fn is_silent(&self) -> bool {
        self.confirmed_note == 0
    }
}
