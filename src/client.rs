use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use voice_session_types::ClientMessage;

use crate::binder::{PlaybackSink, TrackBinder};
use crate::client::consts::{
    STATUS_CONNECTED, STATUS_CONNECTING, STATUS_DISCONNECTED, STATUS_DISCONNECTING, STATUS_FAILED,
    STATUS_LOST,
};
use crate::device::{DeviceError, DeviceProvider, MediaStream};
use crate::error::SessionError;
use crate::event::RemoteEvent;
use crate::notify::{Notifier, NotificationRx};
use crate::router::{Dispatch, EventRouter, RouteContext};
use crate::state::SessionState;
use crate::transport::{EventRx, Outgoing, Transport, TransportError, TransportFactory};

pub(crate) mod consts;
mod config;
mod stats;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

/// Host-provided pieces the client drives.
pub struct Capabilities {
    devices: Arc<dyn DeviceProvider>,
    transports: Arc<dyn TransportFactory>,
    playback: Box<dyn PlaybackSink>,
}

impl Capabilities {
    pub fn new(
        devices: Arc<dyn DeviceProvider>,
        transports: Arc<dyn TransportFactory>,
        playback: Box<dyn PlaybackSink>,
    ) -> Self {
        Self {
            devices,
            transports,
            playback,
        }
    }
}

enum Command {
    Connect(oneshot::Sender<Result<(), SessionError>>),
    Disconnect(oneshot::Sender<()>),
}

/// Handle to one voice session.
///
/// Cheap to clone; every clone talks to the same driver task, which owns
/// the state machine. The driver stops once all handles are dropped.
#[derive(Clone)]
pub struct SessionClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    stats: Arc<Mutex<Stats>>,
}

impl SessionClient {
    /// Spawns the driver on the current tokio runtime.
    pub fn new(config: Config, capabilities: Capabilities) -> (Self, NotificationRx) {
        let (notifier, notifications) = Notifier::channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (commands_tx, commands_rx) = mpsc::channel(config.capacity());
        let stats = Arc::new(Mutex::new(Stats::new()));

        let driver = Driver::new(Arc::new(config), capabilities, notifier, state_tx, stats.clone());
        tokio::spawn(driver.run(commands_rx));

        let client = Self {
            commands: commands_tx,
            state: state_rx,
            stats,
        };
        (client, notifications)
    }

    /// Acquires the microphone and opens the transport.
    ///
    /// Resolves once the session is `Connected` or the attempt failed or was
    /// cancelled by [`SessionClient::disconnect`].
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect(tx))
            .await
            .map_err(|_| SessionError::DriverStopped)?;
        rx.await.map_err(|_| SessionError::DriverStopped)?
    }

    /// Tears the session down. A no-op when nothing is connected or connecting.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect(tx)).await.is_err() {
            tracing::debug!("disconnect after driver stopped");
            return;
        }
        let _ = rx.await;
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn stats(&self) -> Result<Stats, SessionError> {
        match self.stats.lock() {
            Ok(stats) => Ok(stats.clone()),
            Err(_) => Err(SessionError::StatsUnavailable),
        }
    }
}

struct Attempt {
    generation: u64,
    reply: oneshot::Sender<Result<(), SessionError>>,
    handle: JoinHandle<()>,
}

enum Outcome {
    Established {
        transport: Box<dyn Transport>,
        events: EventRx,
        microphone: MediaStream,
    },
    DeviceFailed(DeviceError),
    HandshakeFailed(TransportError),
}

struct AttemptOutcome {
    generation: u64,
    outcome: Outcome,
}

struct Session {
    transport: Box<dyn Transport>,
    events: EventRx,
    microphone: Option<MediaStream>,
}

struct Driver {
    config: Arc<Config>,
    devices: Arc<dyn DeviceProvider>,
    transports: Arc<dyn TransportFactory>,
    binder: TrackBinder,
    router: EventRouter,
    notifier: Notifier,
    state: watch::Sender<SessionState>,
    stats: Arc<Mutex<Stats>>,
    generation: u64,
    attempt: Option<Attempt>,
    session: Option<Session>,
    outcomes_tx: mpsc::Sender<AttemptOutcome>,
    outcomes_rx: mpsc::Receiver<AttemptOutcome>,
}

fn lock_stats(stats: &Mutex<Stats>) -> MutexGuard<'_, Stats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn next_event(events: Option<&mut EventRx>) -> Option<RemoteEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(microphone: Option<&mut MediaStream>) -> Option<Vec<i16>> {
    match microphone {
        Some(microphone) => microphone.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn establish(
    devices: Arc<dyn DeviceProvider>,
    transports: Arc<dyn TransportFactory>,
    config: Arc<Config>,
) -> Outcome {
    let microphone = match devices.acquire_microphone().await {
        Ok(microphone) => microphone,
        Err(e) => return Outcome::DeviceFailed(e),
    };

    let mut transport = transports.create(&config);
    match transport.open(&config.connect_url()).await {
        Ok(events) => Outcome::Established {
            transport,
            events,
            microphone,
        },
        Err(e) => {
            microphone.stop();
            Outcome::HandshakeFailed(e)
        }
    }
}

impl Driver {
    fn new(
        config: Arc<Config>,
        capabilities: Capabilities,
        notifier: Notifier,
        state: watch::Sender<SessionState>,
        stats: Arc<Mutex<Stats>>,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::channel(4);
        Self {
            config,
            devices: capabilities.devices,
            transports: capabilities.transports,
            binder: TrackBinder::new(capabilities.playback),
            router: EventRouter::new(),
            notifier,
            state,
            stats,
            generation: 0,
            attempt: None,
            session: None,
            outcomes_tx,
            outcomes_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let (events, microphone) = match self.session.as_mut() {
                Some(session) => (Some(&mut session.events), session.microphone.as_mut()),
                None => (None, None),
            };

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Connect(reply)) => self.begin_connect(reply),
                    Some(Command::Disconnect(reply)) => {
                        self.disconnect().await;
                        let _ = reply.send(());
                    }
                    None => break,
                },
                Some(outcome) = self.outcomes_rx.recv() => self.finish_connect(outcome).await,
                event = next_event(events) => self.handle_event(event).await,
                frame = next_frame(microphone) => self.forward_frame(frame).await,
            }
        }

        tracing::debug!("all session handles dropped, shutting down driver");
        self.disconnect().await;
    }

    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn transition(&mut self, next: SessionState, message: &str) {
        let current = self.current_state();
        if !current.can_transition_to(next) {
            tracing::warn!("ignoring invalid transition {} -> {}", current, next);
            return;
        }
        tracing::info!("session {} -> {}", current, next);
        self.state.send_replace(next);
        self.notifier.status(next, message);
    }

    fn begin_connect(&mut self, reply: oneshot::Sender<Result<(), SessionError>>) {
        let current = self.current_state();
        if !current.accepts_connect() {
            tracing::warn!("connect() ignored while {}", current);
            let _ = reply.send(Err(SessionError::Busy(current)));
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.transition(SessionState::Connecting, STATUS_CONNECTING);

        let devices = self.devices.clone();
        let transports = self.transports.clone();
        let config = self.config.clone();
        let outcomes = self.outcomes_tx.clone();
        let handle = tokio::spawn(async move {
            let outcome = establish(devices, transports, config).await;
            if outcomes.send(AttemptOutcome { generation, outcome }).await.is_err() {
                tracing::debug!("driver gone before connect attempt {} finished", generation);
            }
        });

        self.attempt = Some(Attempt {
            generation,
            reply,
            handle,
        });
    }

    async fn finish_connect(&mut self, outcome: AttemptOutcome) {
        let AttemptOutcome { generation, outcome } = outcome;
        let attempt = match self.attempt.take() {
            Some(attempt) if attempt.generation == generation && generation == self.generation => attempt,
            other => {
                self.attempt = other;
                tracing::warn!("discarding outcome of abandoned connect attempt {}", generation);
                release(outcome).await;
                return;
            }
        };

        match outcome {
            Outcome::DeviceFailed(e) => {
                tracing::error!("failed to acquire microphone: {}", e);
                self.transition(SessionState::Idle, STATUS_FAILED);
                let _ = attempt.reply.send(Err(SessionError::Device(e)));
            }
            Outcome::HandshakeFailed(e) => {
                tracing::error!("failed to open transport: {}", e);
                self.transition(SessionState::Error, STATUS_FAILED);
                let _ = attempt.reply.send(Err(SessionError::Handshake(e)));
            }
            Outcome::Established {
                transport,
                events,
                microphone,
            } => {
                self.session = Some(Session {
                    transport,
                    events,
                    microphone: Some(microphone),
                });
                self.transition(SessionState::Connected, STATUS_CONNECTED);
                self.on_connected().await;
                let _ = attempt.reply.send(Ok(()));
            }
        }
    }

    async fn on_connected(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        {
            let mut stats = lock_stats(&self.stats);
            let mut ctx = RouteContext {
                binder: &mut self.binder,
                notifier: &mut self.notifier,
                stats: &mut stats,
                transport: session.transport.as_ref(),
            };
            self.router.discover(&mut ctx);
        }

        if let Err(e) = session
            .transport
            .send(Outgoing::Message(ClientMessage::ClientReady))
            .await
        {
            tracing::warn!("failed to send client-ready: {}", e);
        }
    }

    async fn handle_event(&mut self, event: Option<RemoteEvent>) {
        let event = event.unwrap_or_else(|| RemoteEvent::FatalError("event stream ended".to_string()));
        let dispatch = {
            let Some(session) = self.session.as_ref() else {
                tracing::debug!("dropping {} with no live session", event.kind());
                return;
            };
            let mut stats = lock_stats(&self.stats);
            let mut ctx = RouteContext {
                binder: &mut self.binder,
                notifier: &mut self.notifier,
                stats: &mut stats,
                transport: session.transport.as_ref(),
            };
            self.router.dispatch(event, &mut ctx)
        };

        if let Dispatch::Fatal(reason) = dispatch {
            tracing::error!("session failed: {}", reason);
            self.transition(SessionState::Error, &format!("{}: {}", STATUS_LOST, reason));
            self.teardown(false).await;
        }
    }

    async fn forward_frame(&mut self, frame: Option<Vec<i16>>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match frame {
            Some(samples) => match session.transport.send(Outgoing::Audio(samples)).await {
                Ok(()) => lock_stats(&self.stats).record_frame_sent(),
                Err(e) => tracing::warn!("failed to send microphone frame: {}", e),
            },
            None => {
                tracing::warn!("microphone stream ended");
                session.microphone = None;
            }
        }
    }

    async fn disconnect(&mut self) {
        match self.current_state() {
            SessionState::Connecting => {
                self.generation += 1;
                if let Some(attempt) = self.attempt.take() {
                    tracing::info!("cancelling connect attempt {}", attempt.generation);
                    attempt.handle.abort();
                    let _ = attempt.reply.send(Err(SessionError::Cancelled));
                }
                self.transition(SessionState::Disconnected, STATUS_DISCONNECTED);
            }
            SessionState::Connected => {
                self.transition(SessionState::Disconnecting, STATUS_DISCONNECTING);
                self.teardown(true).await;
                self.transition(SessionState::Disconnected, STATUS_DISCONNECTED);
            }
            state => tracing::debug!("disconnect() is a no-op while {}", state),
        }
    }

    /// Releases bindings, microphone and transport of the live session.
    async fn teardown(&mut self, graceful: bool) {
        self.binder.release();
        self.router.reset();
        self.notifier.activity(false);

        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(microphone) = session.microphone.take() {
            microphone.stop();
        }
        if graceful {
            if let Err(e) = session
                .transport
                .send(Outgoing::Message(ClientMessage::DisconnectBot))
                .await
            {
                tracing::warn!("failed to send disconnect-bot: {}", e);
            }
        }
        if let Err(e) = session.transport.close().await {
            tracing::warn!("failed to close transport: {}", e);
        }
    }
}

/// Frees whatever a discarded connect attempt managed to acquire.
async fn release(outcome: Outcome) {
    if let Outcome::Established {
        mut transport,
        microphone,
        ..
    } = outcome
    {
        microphone.stop();
        if let Err(e) = transport.close().await {
            tracing::warn!("failed to close abandoned transport: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::MockPlaybackSink;
    use crate::notify::Notification;
    use crate::track::MediaTrack;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoDevices;

    #[async_trait]
    impl DeviceProvider for NoDevices {
        async fn acquire_microphone(&self) -> Result<MediaStream, DeviceError> {
            Err(DeviceError::DeviceUnavailable("none".to_string()))
        }
    }

    struct CountingTransport {
        closed: Arc<AtomicUsize>,
        tracks: Vec<MediaTrack>,
    }

    impl CountingTransport {
        fn new(closed: Arc<AtomicUsize>) -> Self {
            Self {
                closed,
                tracks: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn open(&mut self, _url: &str) -> Result<EventRx, TransportError> {
            Err(TransportError::NotOpen)
        }

        async fn send(&mut self, _outgoing: Outgoing) -> Result<(), TransportError> {
            Ok(())
        }

        fn active_tracks(&self) -> Vec<MediaTrack> {
            self.tracks.clone()
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn driver() -> (Driver, NotificationRx) {
        driver_with(MockPlaybackSink::new())
    }

    fn driver_with(sink: MockPlaybackSink) -> (Driver, NotificationRx) {
        let (notifier, notifications) = Notifier::channel();
        let (state, _) = watch::channel(SessionState::Idle);
        let capabilities = Capabilities::new(
            Arc::new(NoDevices),
            Arc::new(|_: &Config| -> Box<dyn Transport> {
                Box::new(CountingTransport::new(Arc::new(AtomicUsize::new(0))))
            }),
            Box::new(sink),
        );
        let config = Arc::new(Config::builder().with_base_url("http://localhost:1").build());
        let driver = Driver::new(config, capabilities, notifier, state, Arc::new(Mutex::new(Stats::new())));
        (driver, notifications)
    }

    #[tokio::test]
    async fn stale_outcome_is_released_not_applied() {
        let (mut driver, mut notifications) = driver();
        driver.generation = 2;

        let closed = Arc::new(AtomicUsize::new(0));
        let mic_stops = Arc::new(AtomicUsize::new(0));
        let (_frames_tx, frames_rx) = mpsc::channel(1);
        let counter = mic_stops.clone();
        let microphone = MediaStream::new(frames_rx).with_stop(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (_events_tx, events) = mpsc::channel(1);

        driver
            .finish_connect(AttemptOutcome {
                generation: 1,
                outcome: Outcome::Established {
                    transport: Box::new(CountingTransport::new(closed.clone())),
                    events,
                    microphone,
                },
            })
            .await;

        assert_eq!(driver.current_state(), SessionState::Idle);
        assert!(driver.session.is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(mic_stops.load(Ordering::SeqCst), 1);
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn device_failure_returns_to_idle() {
        let (mut driver, mut notifications) = driver();
        let (reply, result) = oneshot::channel();

        driver.begin_connect(reply);
        let outcome = driver.outcomes_rx.recv().await.unwrap();
        driver.finish_connect(outcome).await;

        assert!(matches!(result.await.unwrap(), Err(SessionError::Device(_))));
        assert_eq!(driver.current_state(), SessionState::Idle);
        assert!(matches!(
            notifications.try_recv().unwrap(),
            Notification::StatusChanged { state: SessionState::Connecting, .. }
        ));
        assert!(matches!(
            notifications.try_recv().unwrap(),
            Notification::StatusChanged { state: SessionState::Idle, .. }
        ));
    }

    #[tokio::test]
    async fn late_connection_after_cancel_binds_nothing() {
        let mut sink = MockPlaybackSink::new();
        sink.expect_attach().never();
        let (mut driver, mut notifications) = driver_with(sink);

        let (reply, result) = oneshot::channel();
        driver.begin_connect(reply);
        driver.disconnect().await;
        assert!(matches!(result.await.unwrap(), Err(SessionError::Cancelled)));

        let closed = Arc::new(AtomicUsize::new(0));
        let mut transport = CountingTransport::new(closed.clone());
        transport.tracks = vec![MediaTrack::inbound_audio("r1")];
        let (_frames_tx, frames_rx) = mpsc::channel(1);
        let (_events_tx, events) = mpsc::channel(1);

        driver
            .finish_connect(AttemptOutcome {
                generation: 1,
                outcome: Outcome::Established {
                    transport: Box::new(transport),
                    events,
                    microphone: MediaStream::new(frames_rx),
                },
            })
            .await;

        assert_eq!(driver.current_state(), SessionState::Disconnected);
        assert!(driver.session.is_none());
        assert!(!driver.binder.is_bound());
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let mut seen = Vec::new();
        while let Ok(notification) = notifications.try_recv() {
            seen.push(notification);
        }
        assert!(!seen.iter().any(|notification| matches!(
            notification,
            Notification::StatusChanged { state: SessionState::Connected, .. }
                | Notification::ActivityChanged { active: true }
        )));
    }
}
