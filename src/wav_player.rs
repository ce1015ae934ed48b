use crate::dsp::mix_mono;
use crate::error::Result;
use crate::status::SharedStatus;
use crossbeam_channel::Sender;
use hound::{SampleFormat, WavReader};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Decode a WAV file to mono f32. Returns the samples and the file's sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    info!(
        "WAV: {:?}  {} Hz  {} ch  {:?}  {} bit",
        path.file_name().unwrap_or_default(),
        spec.sample_rate,
        channels,
        spec.sample_format,
        spec.bits_per_sample,
    );

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    Ok((mix_mono(&samples, channels), spec.sample_rate))
}

/// Streams decoded audio into the analysis queue in fixed-size blocks,
/// standing in for the live device callback.
///
/// With `realtime` set, blocks are paced to the file's sample rate;
/// otherwise they are sent as fast as the queue accepts them. The sender is
/// dropped at end of file, which ends the run.
pub struct WavPlayer {
    samples: Vec<f32>,
    sample_rate: u32,
    block_size: usize,
    realtime: bool,
}

/// Keeps playback alive; dropping it waits for the playback thread to exit.
pub struct PlaybackHandle {
    handle: Option<JoinHandle<()>>,
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl WavPlayer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, block_size: usize) -> Self {
        Self {
            samples,
            sample_rate,
            block_size: block_size.max(1),
            realtime: false,
        }
    }

    pub fn open(path: &Path, block_size: usize) -> Result<Self> {
        let (samples, sample_rate) = read_wav_mono(path)?;
        Ok(Self::new(samples, sample_rate, block_size))
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Stream on a background thread.
    pub fn spawn(self, tx: Sender<Vec<f32>>, status: Arc<SharedStatus>) -> Result<PlaybackHandle> {
        let handle = thread::Builder::new()
            .name("wav-player".into())
            .spawn(move || self.run(tx, &status))?;
        Ok(PlaybackHandle {
            handle: Some(handle),
        })
    }

    /// Stream on the calling thread until end of file, stop, or hang-up.
    pub fn run(&self, tx: Sender<Vec<f32>>, status: &SharedStatus) {
        info!(
            "WAV: {:.2}s, {} samples → {}",
            self.duration_secs(),
            self.samples.len(),
            if self.realtime { "real-time pace" } else { "as fast as possible" }
        );

        let block_dur = Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64);
        let start = Instant::now();

        for (i, block) in self.samples.chunks(self.block_size).enumerate() {
            if status.stop_requested() {
                warn!("WAV playback stopped early at block {}", i);
                return;
            }
            if self.realtime {
                let target = block_dur * i as u32;
                let elapsed = start.elapsed();
                if elapsed < target {
                    thread::sleep(target - elapsed);
                }
            }
            status.count_callback();
            if tx.send(block.to_vec()).is_err() {
                // analysis hung up
                return;
            }
        }

        info!("WAV playback complete.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::sine_wave;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_read_int16_stereo_mixes_to_mono() {
        let path = std::env::temp_dir().join(format!("p2m_wav_{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            w.write_sample(16384i16).unwrap();
            w.write_sample(0i16).unwrap();
        }
        w.finalize().unwrap();

        let (mono, sr) = read_wav_mono(&path).unwrap();
        assert_eq!(sr, 44100);
        assert_eq!(mono.len(), 100);
        assert!((mono[0] - 0.25).abs() < 1e-4, "got {}", mono[0]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_streams_all_samples_then_hangs_up() {
        let samples = sine_wave(440.0, 0.5, 48000, 250);
        let total = samples.len();
        let (tx, rx) = unbounded();
        let status = SharedStatus::new();
        WavPlayer::new(samples, 48000, 4096).run(tx, &status);

        let received: usize = rx.iter().map(|b| b.len()).sum();
        assert_eq!(received, total);
        assert_eq!(status.take_callbacks(), total.div_ceil(4096) as u64);
    }

    #[test]
    fn test_stop_flag_halts_playback() {
        let (tx, rx) = unbounded();
        let status = SharedStatus::new();
        status.request_stop();
        WavPlayer::new(vec![0.0; 48000], 48000, 1024).run(tx, &status);
        assert_eq!(rx.iter().count(), 0);
    }
}
