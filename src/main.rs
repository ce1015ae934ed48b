use pitch_to_midi::config::EngineConfig;
use pitch_to_midi::coordinator::{run_session, SessionSummary};
use pitch_to_midi::error::Result;
use pitch_to_midi::midi_out::{LogSink, MidiSink};
use pitch_to_midi::status::{listen_for_stop, SharedStatus};
use pitch_to_midi::wav_player::WavPlayer;
use pitch_to_midi::TranscriptionEngine;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Blocks the analysis queue can hold before the audio callback starts dropping.
const QUEUE_DEPTH: usize = 64;

#[derive(Parser)]
#[command(name = "pitch-to-midi")]
#[command(about = "Real-time monophonic pitch-to-MIDI transcription")]
struct Cli {
    /// JSON engine configuration (fields not named keep their defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Detection log written at shutdown
    #[arg(long, default_value = "frequency_data.txt")]
    output: PathBuf,

    /// Transcribe a WAV file instead of the live input device
    #[arg(long)]
    input_wav: Option<PathBuf>,

    /// Pace WAV playback to real time
    #[arg(long)]
    realtime: bool,

    /// Send MIDI to a device in WAV mode (live mode always does)
    #[arg(long)]
    midi: bool,

    /// Use the first MIDI output port whose name contains this text
    #[arg(long)]
    midi_port: Option<String>,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_midi_ports: bool,

    /// Seconds between throughput lines
    #[arg(long, default_value_t = 5)]
    status_interval_secs: u64,

    #[arg(long)]
    sample_rate: Option<u32>,

    /// Analysis window size N (samples)
    #[arg(long)]
    window_size: Option<usize>,

    /// Hop size H (samples); defaults to N/2 when only N is given
    #[arg(long)]
    hop_size: Option<usize>,

    /// Peak-amplitude noise gate
    #[arg(long)]
    noise_gate: Option<f32>,

    /// Spectral magnitude threshold
    #[arg(long)]
    magnitude_threshold: Option<f32>,

    #[arg(long)]
    min_freq: Option<f32>,

    #[arg(long)]
    max_freq: Option<f32>,

    /// Consecutive detections required for a note-on
    #[arg(long)]
    detections: Option<u32>,

    /// Consecutive silent windows required for a note-off
    #[arg(long)]
    silences: Option<u32>,

    #[arg(long)]
    velocity: Option<u8>,

    /// Apply a Hann taper before the FFT
    #[arg(long)]
    hann: bool,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut cfg = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if let Some(v) = self.sample_rate {
            cfg.sample_rate = v;
        }
        if let Some(v) = self.window_size {
            cfg.window_size = v;
            cfg.hop_size = v / 2;
        }
        if let Some(v) = self.hop_size {
            cfg.hop_size = v;
        }
        if let Some(v) = self.noise_gate {
            cfg.noise_gate = v;
        }
        if let Some(v) = self.magnitude_threshold {
            cfg.magnitude_threshold = v;
        }
        if let Some(v) = self.min_freq {
            cfg.min_frequency_hz = v;
        }
        if let Some(v) = self.max_freq {
            cfg.max_frequency_hz = v;
        }
        if let Some(v) = self.detections {
            cfg.detection_threshold = v;
        }
        if let Some(v) = self.silences {
            cfg.silence_threshold = v;
        }
        if let Some(v) = self.velocity {
            cfg.velocity = v;
        }
        if self.hann {
            cfg.hann_window = true;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(Some(summary)) => {
            println!(
                "Successfully saved {} detections (time_s,freq_hz,midi) to {}",
                summary.detections,
                summary.log_path.display()
            );
            println!("Format: time_seconds,frequency_hz,midi_note per line.");
        }
        Ok(None) => {}
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Option<SessionSummary>> {
    let mut config = cli.engine_config()?;

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(None);
    }
    if cli.list_midi_ports {
        list_midi_ports()?;
        return Ok(None);
    }

    info!("═══════════════════════════════════════════════");
    info!("  PITCH TO MIDI v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "  Window {} / hop {}  band {}–{} Hz",
        config.window_size, config.hop_size, config.min_frequency_hz, config.max_frequency_hz
    );
    info!(
        "  Debounce: {} detections / {} silences",
        config.detection_threshold, config.silence_threshold
    );
    info!("  Source: {}", match &cli.input_wav {
        Some(p) => format!("WAV {}", p.display()),
        None => "live input".to_string(),
    });
    info!("═══════════════════════════════════════════════");

    let status = Arc::new(SharedStatus::new());
    let (tx, rx) = bounded::<Vec<f32>>(QUEUE_DEPTH);
    let report_interval = Duration::from_secs(cli.status_interval_secs.max(1));

    let summary = match &cli.input_wav {
        Some(path) => {
            let player = WavPlayer::open(path, config.hop_size)?.with_realtime(cli.realtime);
            config.sample_rate = player.sample_rate();
            let sink = if cli.midi || cli.midi_port.is_some() {
                open_midi(cli.midi_port.as_deref())?
            } else {
                Box::new(LogSink::new()) as Box<dyn MidiSink>
            };
            let engine = TranscriptionEngine::new(config, sink)?.with_status(status.clone());
            // End of file ends a replay, so a closed stdin must not.
            spawn_stop_listener(status.clone(), false)?;
            let playback = player.spawn(tx, status.clone())?;
            run_session(engine, rx, status, playback, &cli.output, report_interval)?
        }
        None => run_live(config, &cli, tx, rx, status, report_interval)?,
    };
    Ok(Some(summary))
}

#[cfg(feature = "live")]
fn run_live(
    mut config: EngineConfig,
    cli: &Cli,
    tx: crossbeam_channel::Sender<Vec<f32>>,
    rx: crossbeam_channel::Receiver<Vec<f32>>,
    status: Arc<SharedStatus>,
    report_interval: Duration,
) -> Result<SessionSummary> {
    use pitch_to_midi::audio_input::AudioCapture;

    let sink = open_midi(cli.midi_port.as_deref())?;
    let capture = AudioCapture::start(tx, status.clone(), config.sample_rate)?;
    config.sample_rate = capture.sample_rate();
    let engine = TranscriptionEngine::new(config, sink)?.with_status(status.clone());

    println!("Starting live audio transcription to MIDI. Hum or play a note! Press Enter to stop.");
    spawn_stop_listener(status.clone(), true)?;
    run_session(engine, rx, status, capture, &cli.output, report_interval)
}

#[cfg(not(feature = "live"))]
fn run_live(
    _config: EngineConfig,
    _cli: &Cli,
    _tx: crossbeam_channel::Sender<Vec<f32>>,
    _rx: crossbeam_channel::Receiver<Vec<f32>>,
    _status: Arc<SharedStatus>,
    _report_interval: Duration,
) -> Result<SessionSummary> {
    Err(pitch_to_midi::TranscriberError::AudioConfig(
        "live capture requires the 'live' feature; use --input-wav or rebuild with --features live".into(),
    ))
}

#[cfg(feature = "live")]
fn open_midi(filter: Option<&str>) -> Result<Box<dyn MidiSink>> {
    let sink = pitch_to_midi::midi_out::MidirSink::open(filter)?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "live"))]
fn open_midi(_filter: Option<&str>) -> Result<Box<dyn MidiSink>> {
    Err(pitch_to_midi::TranscriberError::MidiOpen(
        "MIDI output requires the 'live' feature".into(),
    ))
}

#[cfg(feature = "live")]
fn list_midi_ports() -> Result<()> {
    let ports = pitch_to_midi::midi_out::MidirSink::list_ports()?;
    if ports.is_empty() {
        println!("No MIDI output ports found.");
    }
    for (i, name) in ports.iter().enumerate() {
        println!("{}: {}", i, name);
    }
    Ok(())
}

#[cfg(not(feature = "live"))]
fn list_midi_ports() -> Result<()> {
    Err(pitch_to_midi::TranscriberError::MidiOpen(
        "MIDI output requires the 'live' feature".into(),
    ))
}

/// Any line on stdin requests shutdown; EOF does too when `stop_on_eof`.
fn spawn_stop_listener(status: Arc<SharedStatus>, stop_on_eof: bool) -> Result<()> {
    thread::Builder::new()
        .name("stop-listener".into())
        .spawn(move || {
            println!("Press Enter to stop recording and save data...");
            listen_for_stop(io::stdin().lock(), &status, stop_on_eof);
        })?;
    Ok(())
}
