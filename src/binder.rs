use crate::track::MediaTrack;

/// Where bound inbound audio is played.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackSink: Send {
    /// Starts playing `track`. Only called when nothing is attached.
    fn attach(&mut self, track: &MediaTrack);

    fn detach(&mut self);
}

/// Keeps at most one inbound audio track attached to the playback sink.
pub(crate) struct TrackBinder {
    sink: Box<dyn PlaybackSink>,
    bound: Option<MediaTrack>,
    session_tracks: Vec<MediaTrack>,
}

impl TrackBinder {
    pub(crate) fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            bound: None,
            session_tracks: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn bound(&self) -> Option<&MediaTrack> {
        self.bound.as_ref()
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Binds `track`, replacing whatever was bound before. The replaced track
    /// is detached but left running. Returns whether the binding changed.
    pub(crate) fn bind(&mut self, track: &MediaTrack) -> bool {
        if !track.is_inbound_audio() {
            tracing::debug!("not binding track {}: not inbound audio", track.id());
            return false;
        }
        if track.is_stopped() {
            tracing::debug!("not binding track {}: already stopped", track.id());
            return false;
        }

        if let Some(current) = self.bound.take() {
            if current.same_track(track) {
                self.bound = Some(current);
                return false;
            }
            tracing::info!("replacing bound track {} with {}", current.id(), track.id());
            self.sink.detach();
        }

        tracing::info!("binding track {}", track.id());
        self.sink.attach(track);
        if !self.session_tracks.iter().any(|seen| seen.same_track(track)) {
            self.session_tracks.push(track.clone());
        }
        self.bound = Some(track.clone());
        true
    }

    pub(crate) fn unbind(&mut self) -> bool {
        match self.bound.take() {
            Some(track) => {
                tracing::info!("unbinding track {}", track.id());
                self.sink.detach();
                true
            }
            None => false,
        }
    }

    /// Unbinds only if `track` is the one currently bound.
    pub(crate) fn unbind_if(&mut self, track: &MediaTrack) -> bool {
        let is_bound = self
            .bound
            .as_ref()
            .is_some_and(|current| current.same_track(track));
        is_bound && self.unbind()
    }

    /// Session teardown: detach and stop every track bound since the session began.
    pub(crate) fn release(&mut self) {
        self.unbind();
        for track in self.session_tracks.drain(..) {
            track.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use voice_session_types::{TrackDescriptor, TrackKind};

    #[test]
    fn replaces_without_stopping() {
        let mut sink = MockPlaybackSink::new();
        let mut seq = Sequence::new();
        sink.expect_attach()
            .withf(|track| track.id() == "t1")
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_detach().times(1).in_sequence(&mut seq).return_const(());
        sink.expect_attach()
            .withf(|track| track.id() == "t2")
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let t1 = MediaTrack::inbound_audio("t1");
        let t2 = MediaTrack::inbound_audio("t2");
        let mut binder = TrackBinder::new(Box::new(sink));

        assert!(binder.bind(&t1));
        assert!(binder.bind(&t2));
        assert_eq!(binder.bound().map(|track| track.id()), Some("t2"));
        assert!(!t1.is_stopped());
    }

    #[test]
    fn rebinding_the_same_track_is_a_no_op() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach().times(1).return_const(());
        sink.expect_detach().never();

        let t1 = MediaTrack::inbound_audio("t1");
        let mut binder = TrackBinder::new(Box::new(sink));

        assert!(binder.bind(&t1));
        assert!(!binder.bind(&t1.clone()));
    }

    #[test]
    fn ignores_local_and_video_tracks() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach().never();

        let mut binder = TrackBinder::new(Box::new(sink));
        let mic = MediaTrack::new(TrackDescriptor::new("mic", TrackKind::Audio, true));
        let camera = MediaTrack::new(TrackDescriptor::new("cam", TrackKind::Video, false));

        assert!(!binder.bind(&mic));
        assert!(!binder.bind(&camera));
        assert!(!binder.is_bound());
    }

    #[test]
    fn unbind_only_matching_track() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach().times(1).return_const(());
        sink.expect_detach().times(1).return_const(());

        let t1 = MediaTrack::inbound_audio("t1");
        let other = MediaTrack::inbound_audio("t9");
        let mut binder = TrackBinder::new(Box::new(sink));

        binder.bind(&t1);
        assert!(!binder.unbind_if(&other));
        assert!(binder.unbind_if(&t1));
        assert!(!binder.unbind());
    }

    #[test]
    fn release_stops_session_tracks() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach().times(2).return_const(());
        sink.expect_detach().times(2).return_const(());

        let t1 = MediaTrack::inbound_audio("t1");
        let t2 = MediaTrack::inbound_audio("t2");
        let mut binder = TrackBinder::new(Box::new(sink));

        binder.bind(&t1);
        binder.bind(&t2);
        binder.release();

        assert!(!binder.is_bound());
        assert!(t1.is_stopped());
        assert!(t2.is_stopped());

        // a second release has nothing left to do
        binder.release();
    }
}
