//! Microphone and speaker adapters backed by cpal.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapProd;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voice_session_utils::audio::{self, StreamResampler};
use voice_session_utils::device::{self, StreamWorker};

use crate::binder::PlaybackSink;
use crate::device::{DeviceError, DeviceProvider, MediaStream};
use crate::track::MediaTrack;

const INPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_CHUNK_SIZE: usize = 1024;
const RESAMPLER_CHUNK_SIZE: usize = 256;
const OUTPUT_BUFFER_SECONDS: usize = 2;
const MAX_OUTPUT_SAMPLE_RATE: usize = 48_000;
const FRAME_QUEUE: usize = 64;

/// Captures the default (or named) input device, resampled to mono PCM16.
pub struct CpalMicrophone {
    device_name: Option<String>,
    sample_rate: u32,
}

impl CpalMicrophone {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            device_name: None,
            sample_rate,
        }
    }

    pub fn with_device(mut self, device_name: Option<String>) -> Self {
        self.device_name = device_name;
        self
    }
}

#[async_trait]
impl DeviceProvider for CpalMicrophone {
    async fn acquire_microphone(&self) -> Result<MediaStream, DeviceError> {
        let (raw_tx, mut raw_rx) = mpsc::channel::<Vec<f32>>(FRAME_QUEUE);
        let device_name = self.device_name.clone();

        let worker = tokio::task::spawn_blocking(move || {
            device::spawn_input(device_name, INPUT_CHUNK_SIZE, move |samples| {
                if raw_tx.try_send(samples).is_err() {
                    tracing::warn!("microphone frames dropped: consumer is behind");
                }
            })
        })
        .await
        .map_err(|e| DeviceError::DeviceUnavailable(e.to_string()))?
        .map_err(|e| DeviceError::DeviceUnavailable(format!("{:#}", e)))?;

        let mut resampler = StreamResampler::new(
            worker.sample_rate() as f64,
            self.sample_rate as f64,
            RESAMPLER_CHUNK_SIZE,
        )
        .map_err(|e| DeviceError::DeviceUnavailable(format!("{:#}", e)))?;
        tracing::info!(
            "microphone capturing at {} Hz, sending {} Hz",
            worker.sample_rate(),
            self.sample_rate
        );

        let (frames_tx, frames_rx) = mpsc::channel::<Vec<i16>>(FRAME_QUEUE);
        let converter = tokio::spawn(async move {
            while let Some(samples) = raw_rx.recv().await {
                let resampled = resampler.process(&samples);
                if resampled.is_empty() {
                    continue;
                }
                if frames_tx.send(audio::f32_to_pcm16(&resampled)).await.is_err() {
                    break;
                }
            }
        });

        Ok(MediaStream::new(frames_rx).with_stop(move || {
            converter.abort();
            stop_off_runtime(move || {
                worker.stop();
                tracing::info!("microphone released");
            });
        }))
    }
}

/// Runs a blocking stop (a device thread join) on the blocking pool when
/// called from inside a runtime, inline otherwise.
fn stop_off_runtime<F>(stop: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(stop);
        }
        Err(_) => stop(),
    }
}

/// Plays the bound inbound track on the default (or named) output device.
pub struct CpalPlayback {
    producer: Arc<Mutex<HeapProd<f32>>>,
    source_rate: u32,
    forwarder: Option<JoinHandle<()>>,
    worker: StreamWorker,
}

impl CpalPlayback {
    /// Opens the output device. `source_rate` is the rate of inbound track audio.
    pub fn open(device_name: Option<String>, source_rate: u32) -> Result<Self, DeviceError> {
        let buffer = audio::shared_buffer(MAX_OUTPUT_SAMPLE_RATE * OUTPUT_BUFFER_SECONDS);
        let (producer, consumer) = buffer.split();
        let worker = device::spawn_output(device_name, OUTPUT_CHUNK_SIZE, consumer)
            .map_err(|e| DeviceError::DeviceUnavailable(format!("{:#}", e)))?;
        tracing::info!("playback running at {} Hz", worker.sample_rate());

        Ok(Self {
            producer: Arc::new(Mutex::new(producer)),
            source_rate,
            forwarder: None,
            worker,
        })
    }
}

impl PlaybackSink for CpalPlayback {
    fn attach(&mut self, track: &MediaTrack) {
        self.detach();

        let mut resampler = match StreamResampler::new(
            self.source_rate as f64,
            self.worker.sample_rate() as f64,
            RESAMPLER_CHUNK_SIZE,
        ) {
            Ok(resampler) => resampler,
            Err(e) => {
                tracing::error!("failed to create playback resampler: {:#}", e);
                return;
            }
        };

        let mut audio_rx = track.subscribe();
        let producer = self.producer.clone();
        let track_id = track.id().to_string();
        self.forwarder = Some(tokio::spawn(async move {
            loop {
                let samples = match audio_rx.recv().await {
                    Ok(samples) => samples,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("playback of {} skipped {} chunks", track_id, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let resampled = resampler.process(&audio::pcm16_to_f32(&samples));
                let Ok(mut buffer) = producer.lock() else {
                    tracing::error!("playback buffer poisoned");
                    break;
                };
                let pushed = buffer.push_slice(&resampled);
                if pushed < resampled.len() {
                    tracing::warn!("playback buffer full, dropped {} samples", resampled.len() - pushed);
                }
            }
        }));
    }

    fn detach(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.detach();
    }
}
