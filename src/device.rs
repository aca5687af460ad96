use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Source of the local microphone.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn acquire_microphone(&self) -> Result<MediaStream, DeviceError>;
}

/// Live microphone capture: mono 16-bit PCM frames at the configured rate.
///
/// The capture is released when the stream is stopped or dropped.
pub struct MediaStream {
    frames: mpsc::Receiver<Vec<i16>>,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl MediaStream {
    pub fn new(frames: mpsc::Receiver<Vec<i16>>) -> Self {
        Self {
            frames,
            on_stop: None,
        }
    }

    /// Runs `on_stop` exactly once when the capture is released.
    pub fn with_stop<F>(mut self, on_stop: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_stop = Some(Box::new(on_stop));
        self
    }

    pub async fn next_frame(&mut self) -> Option<Vec<i16>> {
        self.frames.recv().await
    }

    pub fn stop(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.frames.close();
        if let Some(on_stop) = self.on_stop.take() {
            on_stop();
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("released", &self.on_stop.is_none())
            .finish()
    }
}
