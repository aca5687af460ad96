use crate::binder::TrackBinder;
use crate::client::consts::STATUS_READY;
use crate::client::Stats;
use crate::event::RemoteEvent;
use crate::notify::{Notifier, Speaker};
use crate::state::SessionState;
use crate::transport::Transport;

pub(crate) enum Dispatch {
    Continue,
    Fatal(String),
}

/// Everything a routed event may touch.
pub(crate) struct RouteContext<'a> {
    pub(crate) binder: &'a mut TrackBinder,
    pub(crate) notifier: &'a mut Notifier,
    pub(crate) stats: &'a mut Stats,
    pub(crate) transport: &'a dyn Transport,
}

/// Turns remote events into bindings and notifications for a connected session.
#[derive(Default)]
pub(crate) struct EventRouter {
    listening: bool,
}

impl EventRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn dispatch(&mut self, event: RemoteEvent, ctx: &mut RouteContext<'_>) -> Dispatch {
        tracing::debug!("routing {}", event.kind());
        ctx.stats.record_event(&event);

        match event {
            RemoteEvent::Ready => {
                ctx.notifier.status(SessionState::Connected, STATUS_READY);
                self.discover(ctx);
            }
            RemoteEvent::UserTranscript { text, is_final } => {
                if is_final {
                    ctx.notifier.entry(Speaker::User, &text);
                    self.listening = false;
                } else {
                    self.listening = true;
                }
            }
            RemoteEvent::BotTranscript { text } => {
                ctx.notifier.entry(Speaker::Bot, &text);
            }
            RemoteEvent::TrackStarted(track) => {
                if ctx.binder.bind(&track) {
                    ctx.stats.record_track_bound();
                }
            }
            RemoteEvent::TrackStopped(track) => {
                if ctx.binder.unbind_if(&track) {
                    self.fall_back(ctx);
                }
            }
            RemoteEvent::MessageError(message) => {
                tracing::warn!("backend reported an error: {}", message);
                ctx.notifier.entry(Speaker::System, &format!("Error: {}", message));
            }
            RemoteEvent::FatalError(reason) => {
                return Dispatch::Fatal(reason);
            }
        }

        self.refresh_activity(ctx);
        Dispatch::Continue
    }

    /// Binds the first inbound audio track already live on the transport,
    /// if nothing is bound yet.
    pub(crate) fn discover(&mut self, ctx: &mut RouteContext<'_>) {
        if !ctx.binder.is_bound() {
            let first = ctx
                .transport
                .active_tracks()
                .into_iter()
                .find(|track| track.is_inbound_audio() && !track.is_stopped());
            if let Some(track) = first {
                if ctx.binder.bind(&track) {
                    ctx.stats.record_track_bound();
                }
            }
        }
        self.refresh_activity(ctx);
    }

    /// After the bound track stops, move to the newest inbound audio track still live.
    fn fall_back(&mut self, ctx: &mut RouteContext<'_>) {
        let newest = ctx
            .transport
            .active_tracks()
            .into_iter()
            .rev()
            .find(|track| track.is_inbound_audio() && !track.is_stopped());
        if let Some(track) = newest {
            if ctx.binder.bind(&track) {
                ctx.stats.record_track_bound();
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.listening = false;
    }

    fn refresh_activity(&self, ctx: &mut RouteContext<'_>) {
        ctx.notifier.activity(ctx.binder.is_bound() || self.listening);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::MockPlaybackSink;
    use crate::notify::{Notification, NotificationRx};
    use crate::track::MediaTrack;
    use crate::transport::{EventRx, Outgoing, TransportError};
    use async_trait::async_trait;

    struct StaticTracks(Vec<MediaTrack>);

    #[async_trait]
    impl Transport for StaticTracks {
        async fn open(&mut self, _url: &str) -> Result<EventRx, TransportError> {
            Err(TransportError::NotOpen)
        }

        async fn send(&mut self, _outgoing: Outgoing) -> Result<(), TransportError> {
            Err(TransportError::NotOpen)
        }

        fn active_tracks(&self) -> Vec<MediaTrack> {
            self.0.clone()
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct Harness {
        router: EventRouter,
        binder: TrackBinder,
        notifier: Notifier,
        stats: Stats,
        transport: StaticTracks,
        rx: NotificationRx,
    }

    impl Harness {
        fn new(sink: MockPlaybackSink, tracks: Vec<MediaTrack>) -> Self {
            let (notifier, rx) = Notifier::channel();
            Self {
                router: EventRouter::new(),
                binder: TrackBinder::new(Box::new(sink)),
                notifier,
                stats: Stats::new(),
                transport: StaticTracks(tracks),
                rx,
            }
        }

        fn dispatch(&mut self, event: RemoteEvent) -> Dispatch {
            let mut ctx = RouteContext {
                binder: &mut self.binder,
                notifier: &mut self.notifier,
                stats: &mut self.stats,
                transport: &self.transport,
            };
            self.router.dispatch(event, &mut ctx)
        }

        fn drain(&mut self) -> Vec<Notification> {
            let mut notifications = Vec::new();
            while let Ok(notification) = self.rx.try_recv() {
                notifications.push(notification);
            }
            notifications
        }
    }

    fn permissive_sink() -> MockPlaybackSink {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach().return_const(());
        sink.expect_detach().return_const(());
        sink
    }

    #[test]
    fn ready_reports_status_and_binds_existing_track() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach()
            .withf(|track| track.id() == "remote")
            .times(1)
            .return_const(());
        let tracks = vec![
            MediaTrack::new(voice_session_types::TrackDescriptor::new(
                "mic",
                voice_session_types::TrackKind::Audio,
                true,
            )),
            MediaTrack::inbound_audio("remote"),
        ];
        let mut harness = Harness::new(sink, tracks);

        assert!(matches!(harness.dispatch(RemoteEvent::Ready), Dispatch::Continue));

        assert_eq!(
            harness.drain(),
            vec![
                Notification::StatusChanged {
                    state: SessionState::Connected,
                    message: "Ready".to_string(),
                },
                Notification::ActivityChanged { active: true },
            ]
        );
    }

    #[test]
    fn interim_transcripts_only_toggle_activity() {
        let mut harness = Harness::new(permissive_sink(), Vec::new());

        harness.dispatch(RemoteEvent::UserTranscript {
            text: "hel".to_string(),
            is_final: false,
        });
        harness.dispatch(RemoteEvent::UserTranscript {
            text: "hello".to_string(),
            is_final: true,
        });

        assert_eq!(
            harness.drain(),
            vec![
                Notification::ActivityChanged { active: true },
                Notification::ConversationEntry {
                    speaker: Speaker::User,
                    text: "hello".to_string(),
                },
                Notification::ActivityChanged { active: false },
            ]
        );
    }

    #[test]
    fn message_errors_become_system_entries() {
        let mut harness = Harness::new(permissive_sink(), Vec::new());

        let dispatch = harness.dispatch(RemoteEvent::MessageError("bad payload".to_string()));

        assert!(matches!(dispatch, Dispatch::Continue));
        assert_eq!(
            harness.drain(),
            vec![Notification::ConversationEntry {
                speaker: Speaker::System,
                text: "Error: bad payload".to_string(),
            }]
        );
        assert_eq!(harness.stats.message_errors(), 1);
    }

    #[test]
    fn fatal_errors_are_handed_back() {
        let mut harness = Harness::new(permissive_sink(), Vec::new());

        let dispatch = harness.dispatch(RemoteEvent::FatalError("gone".to_string()));

        assert!(matches!(dispatch, Dispatch::Fatal(ref reason) if reason == "gone"));
        assert!(harness.drain().is_empty());
    }

    #[test]
    fn stopping_another_track_keeps_binding() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach().times(1).return_const(());
        sink.expect_detach().never();
        let mut harness = Harness::new(sink, Vec::new());

        harness.dispatch(RemoteEvent::TrackStarted(MediaTrack::inbound_audio("t1")));
        harness.dispatch(RemoteEvent::TrackStopped(MediaTrack::inbound_audio("t9")));

        assert_eq!(harness.binder.bound().map(|track| track.id()), Some("t1"));
    }

    #[test]
    fn stopping_bound_track_falls_back_to_newest_live_track() {
        let t1 = MediaTrack::inbound_audio("t1");
        let t2 = MediaTrack::inbound_audio("t2");
        let t3 = MediaTrack::inbound_audio("t3");
        let mut harness = Harness::new(permissive_sink(), vec![t1.clone(), t2.clone()]);

        harness.dispatch(RemoteEvent::TrackStarted(t1));
        harness.dispatch(RemoteEvent::TrackStarted(t2));
        harness.dispatch(RemoteEvent::TrackStarted(t3.clone()));
        t3.stop();
        harness.dispatch(RemoteEvent::TrackStopped(t3));

        assert_eq!(harness.binder.bound().map(|track| track.id()), Some("t2"));
        assert_eq!(harness.stats.tracks_bound(), 4);
    }

    #[test]
    fn losing_the_track_while_listening_keeps_activity_on() {
        let t1 = MediaTrack::inbound_audio("t1");
        let mut harness = Harness::new(permissive_sink(), Vec::new());

        harness.dispatch(RemoteEvent::TrackStarted(t1.clone()));
        harness.dispatch(RemoteEvent::UserTranscript {
            text: "wha".to_string(),
            is_final: false,
        });
        t1.stop();
        harness.dispatch(RemoteEvent::TrackStopped(t1));

        assert!(!harness.binder.is_bound());
        assert_eq!(
            harness.drain(),
            vec![Notification::ActivityChanged { active: true }]
        );

        harness.dispatch(RemoteEvent::UserTranscript {
            text: "what".to_string(),
            is_final: true,
        });
        assert_eq!(
            harness.drain(),
            vec![
                Notification::ConversationEntry {
                    speaker: Speaker::User,
                    text: "what".to_string(),
                },
                Notification::ActivityChanged { active: false },
            ]
        );
    }
}
