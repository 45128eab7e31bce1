// Noise synthesis engine: loop-buffer playback through a cpal output stream.
pub mod filter;
pub mod generator;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use log::{debug, error, info, warn};

use crate::error::NoisefallError;

pub use generator::{build_loop_buffer, BrownNoise};

/// Control seam between the playback controller and the audio graph.
/// The controller only ever issues start/stop/set-volume; tests substitute a
/// mock engine to exercise the state machine without touching real audio.
pub trait NoiseEngine {
    /// Idempotent: a call while already running is a no-op.
    fn start(&mut self, volume: u8) -> Result<(), NoisefallError>;
    /// Idempotent: releases the whole output graph, no-op when stopped.
    fn stop(&mut self);
    /// Live gain update; no-op when stopped (does not implicitly start).
    fn set_volume(&mut self, volume: u8);
    fn is_running(&self) -> bool;
}

// SAFETY: cpal::Stream is !Send because some backends tie it to the thread
// that created it. We only ever create, play and drop the stream from the
// single controller event loop, never from the audio callback or another
// task, so moving the wrapper between executor threads is sound.
struct SendStream(Stream);
unsafe impl Send for SendStream {}

/// A live output graph: the playing stream plus the shared gain cell the
/// audio callback reads.
struct ActiveGraph {
    _stream: SendStream,
    gain_bits: Arc<AtomicU32>,
}

/// Produces the continuous brown-noise signal. The shaped loop buffer is
/// rendered once at start and the real-time callback only reads it
/// cyclically and applies gain, so the callback stays lock-free and
/// bounded-time per sample.
pub struct NoiseSynthesizer {
    graph: Option<ActiveGraph>,
}

impl NoiseSynthesizer {
    pub fn new() -> Self {
        Self { graph: None }
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        buffer: Vec<f32>,
        gain_bits: Arc<AtomicU32>,
    ) -> Result<Stream, NoisefallError> {
        let channels = config.channels as usize;
        let mut cursor = 0usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let gain = f32::from_bits(gain_bits.load(Ordering::Relaxed));
                    for frame in data.chunks_mut(channels) {
                        let value = buffer[cursor] * gain;
                        cursor = (cursor + 1) % buffer.len();
                        for slot in frame.iter_mut() {
                            *slot = T::from_sample(value);
                        }
                    }
                },
                move |err| {
                    error!("Audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| NoisefallError::HostUnavailable(format!("failed to build output stream: {}", e)))?;

        Ok(stream)
    }
}

impl Default for NoiseSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseEngine for NoiseSynthesizer {
    fn start(&mut self, volume: u8) -> Result<(), NoisefallError> {
        if self.graph.is_some() {
            debug!("Noise already playing, start is a no-op");
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| NoisefallError::HostUnavailable("no default output device".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| NoisefallError::HostUnavailable(format!("no default output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        info!(
            "Starting noise: {} Hz, {} channels, volume {}",
            sample_rate,
            config.channels(),
            volume
        );

        let buffer = build_loop_buffer(sample_rate);
        let gain_bits = Arc::new(AtomicU32::new(volume_to_gain(volume).to_bits()));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), buffer, gain_bits.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), buffer, gain_bits.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), buffer, gain_bits.clone())?
            }
            format => {
                return Err(NoisefallError::HostUnavailable(format!(
                    "unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| NoisefallError::HostUnavailable(format!("failed to start stream: {}", e)))?;

        self.graph = Some(ActiveGraph {
            _stream: SendStream(stream),
            gain_bits,
        });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(graph) = self.graph.take() else {
            debug!("Noise not playing, stop is a no-op");
            return;
        };
        // Pause first so the callback stops firing before the stream and the
        // loop buffer it captured are dropped.
        if let Err(e) = graph._stream.0.pause() {
            warn!("Failed to pause stream before drop: {}", e);
        }
        drop(graph);
        info!("Noise stopped, output graph released");
    }

    fn set_volume(&mut self, volume: u8) {
        if let Some(graph) = &self.graph {
            graph
                .gain_bits
                .store(volume_to_gain(volume).to_bits(), Ordering::Relaxed);
            debug!("Volume set to {}", volume);
        }
    }

    fn is_running(&self) -> bool {
        self.graph.is_some()
    }
}

fn volume_to_gain(volume: u8) -> f32 {
    volume.min(100) as f32 / 100.0
}
