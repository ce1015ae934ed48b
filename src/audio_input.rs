use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::Sender;
use log::{error, info, warn};
use std::sync::Arc;

use crate::dsp::mix_mono;
use crate::error::{Result, TranscriberError};
use crate::status::SharedStatus;

/// Live audio capture via cpal.
///
/// Holds the cpal `Stream` alive. Drop this to stop capture.
/// Each device callback is mixed to mono f32 and handed to the analysis
/// queue with `try_send`, so the realtime thread never blocks. A full queue
/// drops the block and counts it; a stream error raises the fault flag.
pub struct AudioCapture {
    stream: Stream,
    sample_rate: u32,
}

impl AudioCapture {
    /// Open the default input device and start streaming.
    /// Returns immediately; audio arrives on the device's callback thread.
    pub fn start(
        tx: Sender<Vec<f32>>,
        status: Arc<SharedStatus>,
        preferred_rate: u32,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(TranscriberError::NoInputDevice)?;

        info!(
            "Audio input: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        let supported = device
            .default_input_config()
            .map_err(|e| TranscriberError::AudioConfig(format!("no supported input config: {e}")))?;

        // Prefer the configured rate with the device's own channel count;
        // fall back to the device default if no range covers it.
        let preferred = cpal::SampleRate(preferred_rate);
        let config_preferred = device.supported_input_configs().ok().and_then(|configs| {
            configs
                .filter(|c| {
                    c.channels() == supported.channels()
                        && c.min_sample_rate() <= preferred
                        && c.max_sample_rate() >= preferred
                })
                .max_by_key(|c| c.max_sample_rate())
                .map(|c| c.with_sample_rate(preferred))
        });

        let (config, sample_rate, format): (StreamConfig, u32, SampleFormat) =
            if let Some(cfg) = config_preferred {
                let sr = cfg.sample_rate().0;
                let fmt = cfg.sample_format();
                (cfg.into(), sr, fmt)
            } else {
                let sr = supported.sample_rate().0;
                let fmt = supported.sample_format();
                (supported.into(), sr, fmt)
            };

        if sample_rate != preferred_rate {
            warn!(
                "Input device does not support {} Hz; analysing at {} Hz",
                preferred_rate, sample_rate
            );
        }

        let channels = config.channels as usize;
        info!("Capture config: {}Hz  {} ch  {:?}", sample_rate, channels, format);

        let err_status = status.clone();
        let err_fn = move |e: cpal::StreamError| {
            error!("Audio stream error: {e}");
            err_status.raise_fault();
        };

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| {
                    deliver(&tx, &status, mix_mono(data, channels));
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| {
                    deliver(&tx, &status, mix_mono_i16(data, channels));
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| {
                    deliver(&tx, &status, mix_mono_u16(data, channels));
                },
                err_fn,
                None,
            ),
            fmt => {
                return Err(TranscriberError::AudioConfig(format!(
                    "unsupported sample format {fmt:?}; use an F32 or I16 device"
                )))
            }
        }
        .map_err(|e| TranscriberError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| TranscriberError::AudioStream(e.to_string()))?;

        Ok(Self {
            stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause audio stream: {}", e);
        }
    }
}

fn deliver(tx: &Sender<Vec<f32>>, status: &SharedStatus, block: Vec<f32>) {
    status.count_callback();
    if tx.try_send(block).is_err() {
        status.count_dropped_block();
    }
}

// ─── Integer-format mono mixdown ─────────────────────────────────────────────

fn mix_mono_i16(data: &[i16], channels: usize) -> Vec<f32> {
    const SCALE: f32 = i16::MAX as f32;
    if channels == 1 {
        return data.iter().map(|&s| s as f32 / SCALE).collect();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            sum as f32 / (channels as f32 * SCALE)
        })
        .collect()
}

fn mix_mono_u16(data: &[u16], channels: usize) -> Vec<f32> {
    // U16: 0 = -1.0, 32768 = 0.0, 65535 = +1.0
    const MID: f32 = 32768.0;
    if channels == 1 {
        return data.iter().map(|&s| (s as f32 - MID) / MID).collect();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| (s as f32 - MID) / MID).sum();
            sum / channels as f32
        })
        .collect()
}
