use crate::engine::TranscriptionEngine;
use crate::error::{Result, TranscriberError};
use crate::midi_out::MidiSink;
use crate::status::{SharedStatus, StatusReporter};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Granularity of stop-flag polling in both the analysis and reporting loops.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The analysis context. Receives sample blocks from the audio source and
/// drives the engine; it is the only code that touches pipeline state.
///
/// Ends when the stop flag is raised, the source hangs up, or a MIDI write
/// fails. In every case the engine is finished before returning, so a
/// sounding note is released and the sink closed exactly once.
pub struct Coordinator<S: MidiSink> {
    rx: Receiver<Vec<f32>>,
    engine: TranscriptionEngine<S>,
    status: Arc<SharedStatus>,
}

/// What the analysis context hands back when it ends.
pub struct AnalysisOutcome<S: MidiSink> {
    pub engine: TranscriptionEngine<S>,
    /// First fatal error, if the run did not end cleanly.
    pub fault: Option<TranscriberError>,
}

impl<S: MidiSink> Coordinator<S> {
    pub fn new(
        rx: Receiver<Vec<f32>>,
        engine: TranscriptionEngine<S>,
        status: Arc<SharedStatus>,
    ) -> Self {
        Self { rx, engine, status }
    }

    pub fn run(mut self) -> AnalysisOutcome<S> {
        info!(
            "Analysis running ({} / {} window/hop)",
            self.engine.config().window_size,
            self.engine.config().hop_size
        );

        let mut fault = None;
        let mut blocks: u64 = 0;

        while !self.status.stop_requested() {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(block) => {
                    blocks += 1;
                    if let Err(e) = self.engine.process(&block) {
                        error!("Fatal runtime error: {}", e);
                        self.status.raise_fault();
                        fault = Some(e);
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Audio source finished after {} blocks", blocks);
                    self.status.mark_source_finished();
                    break;
                }
            }
        }

        if let Err(e) = self.engine.finish() {
            error!("Shutdown error: {}", e);
            if fault.is_none() {
                fault = Some(e);
            }
        }

        AnalysisOutcome {
            engine: self.engine,
            fault,
        }
    }
}

/// Summary of a completed session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub detections: usize,
    pub windows: u64,
    pub midi_messages: u64,
    pub log_path: PathBuf,
}

/// Run the full lifecycle for an already-started audio source.
///
/// Spawns the analysis thread, runs the status loop on the calling thread
/// until stop, fault, or end of input, then shuts down in order: final
/// note-off and MIDI close (inside the analysis thread), audio input close
/// (`source` is dropped), and finally the detection log flush.
///
/// `source` is whatever keeps the audio flowing (a live stream handle, a
/// playback thread guard); it is held until the analysis thread has joined.
pub fn run_session<S, A>(
    engine: TranscriptionEngine<S>,
    rx: Receiver<Vec<f32>>,
    status: Arc<SharedStatus>,
    source: A,
    log_path: &Path,
    report_interval: Duration,
) -> Result<SessionSummary>
where
    S: MidiSink + 'static,
{
    let coordinator = Coordinator::new(rx, engine, status.clone());
    let analysis = thread::Builder::new()
        .name("analysis".into())
        .spawn(move || coordinator.run())?;

    let mut reporter = StatusReporter::new(report_interval);
    let mut stdout = io::stdout();
    while !status.should_shut_down() {
        reporter.poll(&status, &mut stdout);
        thread::sleep(POLL_INTERVAL);
    }
    status.request_stop();

    let outcome = analysis
        .join()
        .map_err(|_| TranscriberError::AudioStream("analysis thread panicked".into()))?;
    // Report the forced note-off, if any.
    reporter.poll(&status, &mut stdout);

    drop(source);
    info!("Audio input closed");

    let AnalysisOutcome { engine, fault } = outcome;
    let summary = SessionSummary {
        detections: engine.recorder().len(),
        windows: engine.windows_processed(),
        midi_messages: engine.messages_sent(),
        log_path: log_path.to_path_buf(),
    };

    // The log is written even after a runtime fault so the history survives.
    let flushed = engine.recorder().flush(log_path);
    if let Err(e) = &flushed {
        warn!("Unable to write {:?}: {}", log_path, e);
    }

    match fault {
        Some(e) => Err(e),
        None => flushed.map(|_| summary),
    }
}
