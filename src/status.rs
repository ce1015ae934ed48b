use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::note::note_name;
use log::{debug, info, warn};

/// Lock-free state shared between the analysis context (single writer) and
/// the reporting loop (single reader).
///
/// The writer stores the note fields first and sets `changed` last with
/// `Release`; the reader clears `changed` with `Acquire` before reading them.
/// The stop/fault/finished flags may be set from any thread.
///
/// The latest onset and the latest release are kept in separate slots, so a
/// note that starts and stops between two polls still yields both lines.
/// Several onsets between two polls collapse to the most recent one.
#[derive(Debug, Default)]
pub struct SharedStatus {
    confirmed_note: AtomicU8,
    frequency_bits: AtomicU64,
    onset_note: AtomicU8,
    onset_frequency_bits: AtomicU64,
    released_note: AtomicU8,
    changed: AtomicBool,
    callbacks: AtomicU64,
    dropped_blocks: AtomicU64,
    windows: AtomicU64,
    stop: AtomicBool,
    fault: AtomicBool,
    source_finished: AtomicBool,
}

/// One consumed "note changed" notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    /// Sounding note, 0 for silence.
    pub confirmed_note: u8,
    pub frequency_hz: f64,
    /// Most recent onset since the last snapshot, 0 if none.
    pub onset_note: u8,
    pub onset_frequency_hz: f64,
    /// Note most recently released to silence, 0 if none.
    pub released_note: u8,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    // ── writer side ──

    pub fn publish_onset(&self, note: u8, frequency_hz: f64) {
        self.confirmed_note.store(note, Ordering::Relaxed);
        self.frequency_bits
            .store(frequency_hz.to_bits(), Ordering::Relaxed);
        self.onset_note.store(note, Ordering::Relaxed);
        self.onset_frequency_bits
            .store(frequency_hz.to_bits(), Ordering::Relaxed);
        self.changed.store(true, Ordering::Release);
    }

    pub fn publish_offset(&self, note: u8) {
        self.released_note.store(note, Ordering::Relaxed);
        self.confirmed_note.store(0, Ordering::Relaxed);
        self.frequency_bits.store(0f64.to_bits(), Ordering::Relaxed);
        self.changed.store(true, Ordering::Release);
    }

    pub fn count_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// A block the analysis queue had no room for.
    pub fn count_dropped_block(&self) {
        self.dropped_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_window(&self) {
        self.windows.fetch_add(1, Ordering::Relaxed);
    }

    // ── reader side ──

    /// Consume the "changed" flag. Returns the latest state if it was set.
    pub fn take_change(&self) -> Option<StatusSnapshot> {
        if !self.changed.swap(false, Ordering::Acquire) {
            return None;
        }
        Some(StatusSnapshot {
            confirmed_note: self.confirmed_note.load(Ordering::Relaxed),
            frequency_hz: f64::from_bits(self.frequency_bits.load(Ordering::Relaxed)),
            onset_note: self.onset_note.swap(0, Ordering::Relaxed),
            onset_frequency_hz: f64::from_bits(self.onset_frequency_bits.load(Ordering::Relaxed)),
            released_note: self.released_note.swap(0, Ordering::Relaxed),
        })
    }

    /// Callbacks since the last call (resets the counter).
    pub fn take_callbacks(&self) -> u64 {
        self.callbacks.swap(0, Ordering::Relaxed)
    }

    pub fn take_dropped_blocks(&self) -> u64 {
        self.dropped_blocks.swap(0, Ordering::Relaxed)
    }

    pub fn windows(&self) -> u64 {
        self.windows.load(Ordering::Relaxed)
    }

    pub fn confirmed_note(&self) -> u8 {
        self.confirmed_note.load(Ordering::Relaxed)
    }

    // ── lifecycle flags ──

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn raise_fault(&self) {
        self.fault.store(true, Ordering::SeqCst);
    }

    pub fn faulted(&self) -> bool {
        self.fault.load(Ordering::SeqCst)
    }

    pub fn mark_source_finished(&self) {
        self.source_finished.store(true, Ordering::SeqCst);
    }

    pub fn source_finished(&self) -> bool {
        self.source_finished.load(Ordering::SeqCst)
    }

    /// Any condition that should end the run.
    pub fn should_shut_down(&self) -> bool {
        self.stop_requested() || self.faulted() || self.source_finished()
    }
}

/// Wait for one line on `input` and request a stop when it arrives.
///
/// End of input (or a read error) stops the run only when `stop_on_eof` is
/// set. A file replay with a detached stdin runs to the end of the file.
pub fn listen_for_stop<R: BufRead>(mut input: R, status: &SharedStatus, stop_on_eof: bool) {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(n) if n > 0 => {
            info!("Stop requested");
            status.request_stop();
        }
        Ok(_) if stop_on_eof => {
            info!("Stop input closed; stopping");
            status.request_stop();
        }
        Ok(_) => debug!("Stop input closed; running until the source ends"),
        Err(e) => {
            warn!("Stop input unreadable: {}", e);
            if stop_on_eof {
                status.request_stop();
            }
        }
    }
}

/// Onset/offset lines for a consumed change, in the order they happened.
///
/// Silent now means the onset came first and was then released; sounding now
/// means the release came first.
pub fn format_change(snapshot: &StatusSnapshot) -> Vec<String> {
    let onset = (snapshot.onset_note > 0).then(|| {
        format!(
            "Detected Frequency: {} Hz -> Transcribed Note: {}",
            snapshot.onset_frequency_hz,
            note_name(snapshot.onset_note as i32)
        )
    });
    let off = (snapshot.released_note > 0)
        .then(|| format!("Note Off: {}", note_name(snapshot.released_note as i32)));

    if snapshot.confirmed_note == 0 {
        onset.into_iter().chain(off).collect()
    } else {
        off.into_iter().chain(onset).collect()
    }
}

/// Polls [`SharedStatus`] and prints human-readable transitions plus a
/// periodic throughput line.
pub struct StatusReporter {
    interval: Duration,
    last_report: Instant,
}

impl StatusReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: Instant::now(),
        }
    }

    /// One polling iteration. Never blocks.
    pub fn poll<W: Write>(&mut self, status: &SharedStatus, out: &mut W) {
        if let Some(change) = status.take_change() {
            for line in format_change(&change) {
                let _ = writeln!(out, "{}", line);
            }
        }

        if self.last_report.elapsed() >= self.interval {
            let _ = writeln!(
                out,
                "Callbacks processed in last {}s: {}",
                self.interval.as_secs(),
                status.take_callbacks()
            );
            let dropped = status.take_dropped_blocks();
            if dropped > 0 {
                warn!("{} audio blocks dropped; analysis is falling behind", dropped);
            }
            self.last_report = Instant::now();
        }
        let _ = out.flush();
    }
}
