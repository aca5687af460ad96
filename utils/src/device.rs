use std::sync::mpsc;
use std::thread::JoinHandle;

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FrameCount, StreamConfig};
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use crate::audio;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host.default_input_device().context("No default input device"),
        Some(target) => host
            .input_devices()?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No input device named {}", target)),
    }
}

pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host.default_output_device().context("No default output device"),
        Some(target) => host
            .output_devices()?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No output device named {}", target)),
    }
}

fn describe(device: &Device, config: &cpal::SupportedStreamConfig, default_name: &str) -> anyhow::Result<String> {
    let name = device.name()?;
    let mut d = format!(" * {}({}ch, {}hz)", name, config.channels(), config.sample_rate().0);
    if name == default_name {
        d.push_str(" [default]");
    }
    Ok(d)
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_name = match host.default_input_device() {
        Some(device) => device.name()?,
        None => String::new(),
    };
    let mut device_names = Vec::new();
    for device in host.input_devices()? {
        let config = device.default_input_config()?;
        device_names.push(describe(&device, &config, &default_name)?);
    }
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = match host.default_output_device() {
        Some(device) => device.name()?,
        None => String::new(),
    };
    let mut device_names = Vec::new();
    for device in host.output_devices()? {
        let config = device.default_output_config()?;
        device_names.push(describe(&device, &config, &default_name)?);
    }
    Ok(device_names.join("\n"))
}

/// A cpal stream kept alive on its own thread.
///
/// cpal streams are not `Send`, so each one lives on a dedicated thread that
/// parks until [`StreamWorker::stop`] is called or the worker is dropped.
pub struct StreamWorker {
    sample_rate: u32,
    channels: u16,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StreamWorker {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("audio stream thread panicked");
            }
        }
    }

    fn spawn<F>(name: &str, build: F) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<(cpal::Stream, u32, u16)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (stream, sample_rate, channels) = match build() {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok((sample_rate, channels)));
                // Returns on stop() or when the worker is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .context("audio stream thread exited before starting")??;

        Ok(Self {
            sample_rate,
            channels,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts capturing from an input device. `on_frames` receives mono samples
/// at the device's native rate.
pub fn spawn_input<F>(device_name: Option<String>, chunk_size: usize, mut on_frames: F) -> anyhow::Result<StreamWorker>
where
    F: FnMut(Vec<f32>) + Send + 'static,
{
    StreamWorker::spawn("voice-session-input", move || {
        let input = get_or_default_input(device_name.as_deref())?;
        tracing::info!("Using input device: {:?}", input.name()?);

        let default_config = input.default_input_config().context("Failed to get default input config")?;
        let config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(chunk_size as u32)),
        };
        let channel_count = config.channels as usize;

        let stream = input.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                on_frames(audio::downmix(data, channel_count));
            },
            move |err| tracing::error!("An error occurred on input stream: {}", err),
            None,
        )?;
        Ok((stream, config.sample_rate.0, config.channels))
    })
}

/// Starts an output device that plays mono samples popped from `source`,
/// duplicated to the first two channels. Silence is written when the buffer
/// runs dry.
pub fn spawn_output(device_name: Option<String>, chunk_size: usize, mut source: HeapCons<f32>) -> anyhow::Result<StreamWorker> {
    StreamWorker::spawn("voice-session-output", move || {
        let output = get_or_default_output(device_name.as_deref())?;
        tracing::info!("Using output device: {:?}", output.name()?);

        let default_config = output.default_output_config().context("Failed to get default output config")?;
        let config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(chunk_size as u32)),
        };
        let channel_count = config.channels as usize;

        let stream = output.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channel_count) {
                    let sample = source.try_pop().unwrap_or(0.0);
                    for (ch, slot) in frame.iter_mut().enumerate() {
                        *slot = if ch < 2 { sample } else { 0.0 };
                    }
                }
            },
            move |err| tracing::error!("An error occurred on output stream: {}", err),
            None,
        )?;
        Ok((stream, config.sample_rate.0, config.channels))
    })
}
