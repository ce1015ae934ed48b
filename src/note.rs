//! Frequency ↔ MIDI note mapping and note naming (A4 = 440 Hz = MIDI 69).

pub const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Nearest MIDI note for a frequency. Returns 0 for non-positive input.
pub fn frequency_to_midi(frequency_hz: f64) -> i32 {
    if !(frequency_hz > 0.0) || !frequency_hz.is_finite() {
        return 0;
    }
    (69.0 + 12.0 * (frequency_hz / 440.0).log2()).round() as i32
}

/// Equal-tempered frequency of a (possibly fractional) MIDI note.
pub fn midi_to_hz(midi: f64) -> f64 {
    440.0 * 2.0f64.powf((midi - 69.0) / 12.0)
}

/// Note name with octave, e.g. `A4`, `C#3`. Notes outside 1..=127 render as `N/A`.
pub fn note_name(midi: i32) -> String {
    if !(1..=127).contains(&midi) {
        return "N/A".to_string();
    }
    let octave = midi / 12 - 1;
    format!("{}{}", NOTE_NAMES[(midi % 12) as usize], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a440_is_midi_69() {
        assert_eq!(frequency_to_midi(440.0), 69);
        assert_eq!(note_name(69), "A4");
    }

    #[test]
    fn test_middle_c() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(frequency_to_midi(261.63), 60);
    }

    #[test]
    fn test_rounds_to_nearest_semitone() {
        // 20 cents sharp of A4 still maps to A4; 60 cents sharp rounds to A#4
        assert_eq!(frequency_to_midi(midi_to_hz(69.2)), 69);
        assert_eq!(frequency_to_midi(midi_to_hz(69.6)), 70);
        assert_eq!(note_name(70), "A#4");
    }

    #[test]
    fn test_non_positive_frequency_is_silence() {
        assert_eq!(frequency_to_midi(0.0), 0);
        assert_eq!(frequency_to_midi(-10.0), 0);
        assert_eq!(frequency_to_midi(f64::NAN), 0);
    }

    #[test]
    fn test_out_of_range_names() {
        assert_eq!(note_name(0), "N/A");
        assert_eq!(note_name(128), "N/A");
        assert_eq!(note_name(12), "C0");
        assert_eq!(note_name(127), "G9");
    }
}
