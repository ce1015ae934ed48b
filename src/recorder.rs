use crate::error::Result;
use crate::types::Detection;
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// In-memory list of confirmed onsets, written once at shutdown.
///
/// The log is plain text, one `timestamp_sec,frequency_hz,midi_note` line per
/// onset in the order they were recorded, no header. Nothing is written
/// until [`flush`](Self::flush); a crash mid-run loses the history.
#[derive(Debug, Default, Clone)]
pub struct DetectionRecorder {
    detections: Vec<Detection>,
}

impl DetectionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Write every record to `path`, replacing any existing file.
    pub fn flush(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        for d in &self.detections {
            writeln!(writer, "{}", format_line(d))?;
        }
        writer.flush()?;
        info!(
            "Saved {} detections (time_s,freq_hz,midi) to {:?}",
            self.detections.len(),
            path
        );
        Ok(())
    }

    /// Parse a log written by [`flush`](Self::flush). Malformed lines are skipped.
    pub fn load(path: &Path) -> Result<Vec<Detection>> {
        let reader = BufReader::new(File::open(path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            if let Some(d) = parse_line(&line?) {
                out.push(d);
            }
        }
        Ok(out)
    }
}

/// `timestamp,frequency,note`. Whole-number floats keep a `.0` suffix.
pub fn format_line(d: &Detection) -> String {
    format!(
        "{},{},{}",
        format_float(d.timestamp_sec),
        format_float(d.frequency_hz),
        d.midi_note
    )
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

fn parse_line(line: &str) -> Option<Detection> {
    let mut fields = line.trim().split(',');
    let timestamp_sec = fields.next()?.trim().parse().ok()?;
    let frequency_hz = fields.next()?.trim().parse().ok()?;
    let midi_note = fields.next()?.trim().parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(Detection {
        timestamp_sec,
        frequency_hz,
        midi_note,
    })
}
