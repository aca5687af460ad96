use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use voice_session_types::{TrackDescriptor, TrackKind};

const AUDIO_BUFFER_CHUNKS: usize = 256;
/// Chunks kept for the first subscriber. Must stay below `AUDIO_BUFFER_CHUNKS`.
const PREROLL_CHUNKS: usize = 64;

type Preroll = Option<VecDeque<Arc<[i16]>>>;

/// Mono 16-bit PCM chunks flowing on a track.
pub type AudioRx = broadcast::Receiver<Arc<[i16]>>;

/// Handle to a media track owned by a transport.
///
/// Clones share the same underlying track; two handles refer to the same
/// track when their ids match.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

#[derive(Debug)]
struct TrackInner {
    descriptor: TrackDescriptor,
    stopped: AtomicBool,
    audio: broadcast::Sender<Arc<[i16]>>,
    // `None` once the first subscriber has taken it.
    preroll: Mutex<Preroll>,
}

impl MediaTrack {
    pub fn new(descriptor: TrackDescriptor) -> Self {
        let (audio, _) = broadcast::channel(AUDIO_BUFFER_CHUNKS);
        Self {
            inner: Arc::new(TrackInner {
                descriptor,
                stopped: AtomicBool::new(false),
                audio,
                preroll: Mutex::new(Some(VecDeque::new())),
            }),
        }
    }

    pub fn inbound_audio(id: &str) -> Self {
        Self::new(TrackDescriptor::new(id, TrackKind::Audio, false))
    }

    pub fn descriptor(&self) -> &TrackDescriptor {
        &self.inner.descriptor
    }

    pub fn id(&self) -> &str {
        self.inner.descriptor.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.descriptor.kind()
    }

    pub fn is_local(&self) -> bool {
        self.inner.descriptor.is_local()
    }

    pub fn is_inbound_audio(&self) -> bool {
        self.inner.descriptor.is_inbound_audio()
    }

    pub fn same_track(&self, other: &MediaTrack) -> bool {
        self.id() == other.id()
    }

    /// Ends the track. Further audio pushed to it is dropped.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("track {} stopped", self.id());
            if let Some(preroll) = self.preroll().as_mut() {
                preroll.clear();
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Subscribes to the track's audio. The first subscriber also receives
    /// the chunks that arrived before anyone was listening.
    pub fn subscribe(&self) -> AudioRx {
        let mut preroll = self.preroll();
        let rx = self.inner.audio.subscribe();
        if let Some(chunks) = preroll.take() {
            if !chunks.is_empty() {
                tracing::debug!("replaying {} buffered chunks of {}", chunks.len(), self.id());
            }
            for chunk in chunks {
                let _ = self.inner.audio.send(chunk);
            }
        }
        rx
    }

    /// Publishes a chunk to current subscribers. Returns `false` once stopped.
    ///
    /// Until the first subscription the most recent chunks are held back
    /// instead of being dropped.
    pub fn push_audio(&self, samples: Arc<[i16]>) -> bool {
        if self.is_stopped() {
            return false;
        }
        let mut preroll = self.preroll();
        match preroll.as_mut() {
            Some(chunks) => {
                if chunks.len() == PREROLL_CHUNKS {
                    chunks.pop_front();
                }
                chunks.push_back(samples);
            }
            None => {
                // No subscriber simply means nothing is playing this track right now.
                let _ = self.inner.audio.send(samples);
            }
        }
        true
    }

    fn preroll(&self) -> MutexGuard<'_, Preroll> {
        self.inner
            .preroll
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_audio_until_stopped() {
        let track = MediaTrack::inbound_audio("t1");
        let mut rx = track.subscribe();

        assert!(track.push_audio(Arc::from(vec![1i16, 2, 3])));
        assert_eq!(&*rx.recv().await.unwrap(), &[1, 2, 3]);

        track.clone().stop();
        assert!(track.is_stopped());
        assert!(!track.push_audio(Arc::from(vec![4i16])));
    }

    #[tokio::test]
    async fn first_subscriber_hears_audio_sent_before_it_subscribed() {
        let track = MediaTrack::inbound_audio("t1");
        for chunk in 0..(PREROLL_CHUNKS as i16 + 2) {
            track.push_audio(Arc::from(vec![chunk]));
        }

        let mut rx = track.subscribe();
        assert_eq!(&*rx.recv().await.unwrap(), &[2]);
        for _ in 1..PREROLL_CHUNKS {
            rx.recv().await.unwrap();
        }
        assert!(rx.try_recv().is_err());

        track.push_audio(Arc::from(vec![100i16]));
        assert_eq!(&*rx.recv().await.unwrap(), &[100]);

        // later subscribers only get live audio
        let mut late = track.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn identity_is_the_track_id() {
        let a = MediaTrack::inbound_audio("t1");
        let b = MediaTrack::inbound_audio("t1");
        let c = MediaTrack::new(TrackDescriptor::new("mic", TrackKind::Audio, true));

        assert!(a.same_track(&b));
        assert!(!a.same_track(&c));
        assert!(!c.is_inbound_audio());
    }
}
