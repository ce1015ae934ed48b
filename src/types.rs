use std::fmt;

use crate::note::note_name;

// ─── Per-window pitch estimate ──────────────────────────────────────────────

/// Result of analyzing one window. `frequency_hz` is 0 when not confident.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f64,
    pub confident: bool,
}

impl PitchEstimate {
    pub fn silent() -> Self {
        Self {
            frequency_hz: 0.0,
            confident: false,
        }
    }

    pub fn confident(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            confident: true,
        }
    }
}

// ─── Confirmed onset record ─────────────────────────────────────────────────

/// One confirmed note onset. Created once per onset, never per window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Seconds since the start of the input, at the center of the evidence window.
    pub timestamp_sec: f64,
    pub frequency_hz: f64,
    pub midi_note: u8,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:.3}s  {:.2} Hz  {} ({})",
            self.timestamp_sec,
            self.frequency_hz,
            note_name(self.midi_note as i32),
            self.midi_note
        )
    }
}

// ─── MIDI events ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn,
    NoteOff,
}

/// A channel-voice message headed for the MIDI sink. Not retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    pub kind: MidiEventKind,
    pub note: u8,
    pub velocity: u8,
    pub timestamp_sec: f64,
}

/// Note On status byte, channel 0. Note Off is sent as Note On with velocity 0.
pub const NOTE_ON_CH0: u8 = 0x90;

impl MidiEvent {
    pub fn note_on(note: u8, velocity: u8, timestamp_sec: f64) -> Self {
        Self {
            kind: MidiEventKind::NoteOn,
            note,
            velocity,
            timestamp_sec,
        }
    }

    pub fn note_off(note: u8, timestamp_sec: f64) -> Self {
        Self {
            kind: MidiEventKind::NoteOff,
            note,
            velocity: 0,
            timestamp_sec,
        }
    }

    /// Raw three-byte wire message.
    pub fn to_bytes(&self) -> [u8; 3] {
        match self.kind {
            MidiEventKind::NoteOn => [NOTE_ON_CH0, self.note & 0x7f, self.velocity & 0x7f],
            MidiEventKind::NoteOff => [NOTE_ON_CH0, self.note & 0x7f, 0],
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MidiEventKind::NoteOn => "on ",
            MidiEventKind::NoteOff => "off",
        };
        write!(
            f,
            "t={:>8.3}s  {} {:<4} vel={}",
            self.timestamp_sec,
            kind,
            note_name(self.note as i32),
            self.velocity
        )
    }
}

// ─── Debouncer output ───────────────────────────────────────────────────────

/// What a single window did to the confirmed note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteTransition {
    /// Nothing confirmed changed.
    Hold,
    /// A new note was confirmed; `released` is the note it replaces, if any.
    Onset {
        released: Option<u8>,
        detection: Detection,
    },
    /// The sounding note ended in silence.
    Offset { note: u8, timestamp_sec: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes() {
        assert_eq!(MidiEvent::note_on(69, 100, 0.0).to_bytes(), [0x90, 69, 100]);
        assert_eq!(MidiEvent::note_off(69, 0.0).to_bytes(), [0x90, 69, 0]);
    }

    #[test]
    fn test_detection_display() {
        let d = Detection {
            timestamp_sec: 1.5,
            frequency_hz: 440.0,
            midi_note: 69,
        };
        assert_eq!(d.to_string(), "t=1.500s  440.00 Hz  A4 (69)");
    }
}
