//! Session negotiator
//!
//! Drives one session attempt at a time: config fetch, local offer,
//! registry session creation, answer, then candidate relay. The attempt
//! resolves when the first video track arrives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use telestream_protocol::{
    CreateSessionRequest, SessionDescription, SessionId, SessionRecord, StreamKind,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::events::{CandidateCounters, CandidateStats, SessionEvent};
use super::relay::{self, OutboundRelay};
use super::tracker::ConnectionTracker;
use crate::error::SessionError;
use crate::network::{ApiError, RegistryClient};
use crate::peer::{
    ConnectionState, PeerEvent, PeerFactory, PeerTransport, RemoteStream, RemoteTrack, TrackKind,
};

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 256;

type StartupResult = Result<RemoteStream, SessionError>;

/// Establishes and tears down video sessions with the signaling registry
///
/// Clones share the same session. At most one session is active at a time;
/// starting a new one disconnects the previous one first.
#[derive(Clone)]
pub struct SessionNegotiator {
    inner: Arc<NegotiatorInner>,
}

struct NegotiatorInner {
    registry: RegistryClient,
    peers: Arc<dyn PeerFactory>,
    startup_timeout: Duration,
    active: Mutex<Option<ActiveSession>>,
    /// Serializes session setup
    attempt_lock: Mutex<()>,
    attempts: AtomicU64,
    /// Attempts up to this id were cancelled by `disconnect`
    cancelled_through: AtomicU64,
    state: Arc<RwLock<ConnectionState>>,
    counters: RwLock<Arc<CandidateCounters>>,
    events: broadcast::Sender<SessionEvent>,
}

/// Everything one session attempt owns
struct ActiveSession {
    attempt: u64,
    session_id: Option<SessionId>,
    peer: Arc<dyn PeerTransport>,
    remote_stream: RemoteStream,
    pump: JoinHandle<()>,
    inbound: Option<JoinHandle<()>>,
}

impl SessionNegotiator {
    pub fn new(registry: RegistryClient, peers: Arc<dyn PeerFactory>) -> Self {
        Self::with_startup_timeout(registry, peers, DEFAULT_STARTUP_TIMEOUT)
    }

    pub fn with_startup_timeout(
        registry: RegistryClient,
        peers: Arc<dyn PeerFactory>,
        startup_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(NegotiatorInner {
                registry,
                peers,
                startup_timeout,
                active: Mutex::new(None),
                attempt_lock: Mutex::new(()),
                attempts: AtomicU64::new(0),
                cancelled_through: AtomicU64::new(0),
                state: Arc::new(RwLock::new(ConnectionState::New)),
                counters: RwLock::new(Arc::new(CandidateCounters::default())),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Negotiate a session for `source_name` and wait for its video
    ///
    /// Any previous session is torn down first. On every failure path the
    /// attempt's peer connection, relay and registry session are released
    /// before the error is returned.
    pub async fn create_session(
        &self,
        source_name: &str,
        stream_kind: StreamKind,
    ) -> Result<RemoteStream, SessionError> {
        let source_name = source_name.trim();
        if source_name.is_empty() {
            return Err(SessionError::InvalidSource);
        }

        tracing::info!(
            "Creating WebRTC session for telescope \"{}\" with stream type \"{}\"",
            source_name,
            stream_kind
        );

        let (attempt, startup) = {
            let _setup = self.inner.attempt_lock.lock().await;

            *self.inner.counters.write().await = Arc::new(CandidateCounters::default());
            self.disconnect().await;
            *self.inner.state.write().await = ConnectionState::New;

            let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.negotiate(attempt, source_name, stream_kind).await {
                Ok(startup) => (attempt, startup),
                Err(e) => {
                    tracing::error!("Session negotiation failed: {}", e);
                    self.inner.attempt_failed(attempt).await;
                    return Err(e);
                }
            }
        };

        let timeout = self.inner.startup_timeout;
        let outcome = match tokio::time::timeout(timeout, startup).await {
            Ok(Ok(outcome)) => outcome,
            // Startup sender dropped: either disconnect aborted the pump or
            // the transport stopped reporting events
            Ok(Err(_)) if self.inner.is_cancelled(attempt) => Err(SessionError::Cancelled),
            Ok(Err(_)) => Err(SessionError::ConnectionFailed(ConnectionState::Closed)),
            Err(_) => Err(SessionError::Timeout(timeout)),
        };

        match &outcome {
            Ok(stream) => {
                tracing::info!("Remote stream ready with {} tracks", stream.tracks().len());
            }
            Err(e) => {
                tracing::error!("Session startup failed: {}", e);
                self.inner.attempt_failed(attempt).await;
            }
        }

        outcome
    }

    /// Steps from config fetch to relay startup; returns the startup signal
    async fn negotiate(
        &self,
        attempt: u64,
        source_name: &str,
        stream_kind: StreamKind,
    ) -> Result<oneshot::Receiver<StartupResult>, SessionError> {
        let inner = &self.inner;

        let config = inner
            .registry
            .get_config()
            .await
            .map_err(SessionError::ConfigFetch)?;
        tracing::debug!("Got WebRTC config with {} ICE servers", config.ice_servers.len());

        let counters = inner.counters.read().await.clone();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peer = inner.peers.create(&config.ice_servers, peer_tx).await?;

        let (session_tx, session_rx) = watch::channel(None);
        let (startup_tx, startup_rx) = oneshot::channel();
        let remote_stream = RemoteStream::new();

        let pump = SessionPump {
            attempt,
            owner: Arc::downgrade(inner),
            peer_events: peer_rx,
            session_ids: session_rx,
            tracker: ConnectionTracker::new(inner.state.clone(), inner.events.clone(), counters.clone()),
            outbound: OutboundRelay::new(inner.registry.clone(), counters.clone()),
            remote_stream: remote_stream.clone(),
            startup: Some(startup_tx),
            events: inner.events.clone(),
        };

        {
            let mut active = inner.active.lock().await;
            if inner.is_cancelled(attempt) {
                drop(active);
                if let Err(e) = peer.close().await {
                    tracing::warn!("Failed to close peer connection: {}", e);
                }
                return Err(SessionError::Cancelled);
            }
            *active = Some(ActiveSession {
                attempt,
                session_id: None,
                peer: peer.clone(),
                remote_stream,
                pump: tokio::spawn(pump.run()),
                inbound: None,
            });
        }

        let offer = peer.create_offer().await?;
        let request = CreateSessionRequest {
            telescope_name: source_name.to_string(),
            offer: SessionDescription::offer(offer),
            stream_type: Some(stream_kind),
        };

        tracing::debug!("Sending session creation request for \"{}\"", source_name);
        let response = inner
            .registry
            .create_session(&request)
            .await
            .map_err(SessionError::SessionCreate)?;
        let session_id = response.session_id;

        if !inner.record_session_id(attempt, &session_id).await {
            tracing::warn!("Session {} created after disconnect, deleting it", session_id);
            if let Err(e) = inner.registry.delete_session(&session_id).await {
                tracing::warn!("Failed to delete session {}: {}", session_id, e);
            }
            return Err(SessionError::Cancelled);
        }
        let _ = session_tx.send(Some(session_id.clone()));

        peer.apply_answer(response.answer.sdp).await?;
        tracing::info!("Session {} created, remote description set", session_id);

        let inbound = tokio::spawn(relay::run_inbound(
            inner.registry.clone(),
            session_id,
            peer,
            counters,
        ));
        if !inner.attach_inbound(attempt, inbound).await {
            return Err(SessionError::Cancelled);
        }

        Ok(startup_rx)
    }

    /// Tear down the active session, if any
    ///
    /// Safe to call at any time, including while `create_session` is in
    /// flight, which then fails with [`SessionError::Cancelled`].
    pub async fn disconnect(&self) {
        let current = self.inner.attempts.load(Ordering::SeqCst);
        self.inner.cancelled_through.fetch_max(current, Ordering::SeqCst);
        let session = self.inner.active.lock().await.take();
        self.inner.teardown(session).await;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .and_then(|session| session.session_id.clone())
    }

    pub async fn remote_stream(&self) -> Option<RemoteStream> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|session| session.remote_stream.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }

    pub async fn candidate_stats(&self) -> CandidateStats {
        self.inner.counters.read().await.snapshot()
    }

    /// Registry record of the active session
    pub async fn current_session(&self) -> Result<Option<SessionRecord>, ApiError> {
        match self.session_id().await {
            Some(session_id) => self.inner.registry.get_session(&session_id).await,
            None => Ok(None),
        }
    }
}

impl NegotiatorInner {
    async fn record_session_id(&self, attempt: u64, session_id: &SessionId) -> bool {
        match self.active.lock().await.as_mut() {
            Some(session) if session.attempt == attempt => {
                session.session_id = Some(session_id.clone());
                true
            }
            _ => false,
        }
    }

    async fn attach_inbound(&self, attempt: u64, inbound: JoinHandle<()>) -> bool {
        match self.active.lock().await.as_mut() {
            Some(session) if session.attempt == attempt => {
                session.inbound = Some(inbound);
                true
            }
            _ => {
                inbound.abort();
                false
            }
        }
    }

    fn is_cancelled(&self, attempt: u64) -> bool {
        attempt <= self.cancelled_through.load(Ordering::SeqCst)
    }

    /// Release whatever a failed attempt left behind
    ///
    /// An attempt that failed before its session was installed has nothing
    /// to tear down, but still ends `closed` with a `Disconnected` event.
    async fn attempt_failed(&self, attempt: u64) {
        if self.teardown_attempt(attempt).await {
            return;
        }

        let mut state = self.state.write().await;
        if *state != ConnectionState::Closed {
            *state = ConnectionState::Closed;
            drop(state);
            let _ = self.events.send(SessionEvent::Disconnected);
        }
    }

    /// Tear down only if `attempt` still owns the active session
    async fn teardown_attempt(&self, attempt: u64) -> bool {
        let session = {
            let mut active = self.active.lock().await;
            if active.as_ref().is_some_and(|session| session.attempt == attempt) {
                active.take()
            } else {
                None
            }
        };
        self.teardown(session).await
    }

    /// Returns whether there was a session to tear down
    async fn teardown(&self, session: Option<ActiveSession>) -> bool {
        let Some(session) = session else {
            tracing::debug!("No active session to disconnect");
            return false;
        };

        if let Some(inbound) = session.inbound {
            inbound.abort();
        }
        session.pump.abort();

        if let Err(e) = session.peer.close().await {
            tracing::warn!("Failed to close peer connection: {}", e);
        }

        session.remote_stream.stop_all();

        if let Some(session_id) = &session.session_id {
            match self.registry.delete_session(session_id).await {
                Ok(()) => tracing::debug!("Deleted session {}", session_id),
                Err(e) => tracing::warn!("Failed to delete session {}: {}", session_id, e),
            }
        }

        *self.state.write().await = ConnectionState::Closed;
        let _ = self.events.send(SessionEvent::Disconnected);
        tracing::info!("WebRTC session disconnected");
        true
    }
}

/// Per-attempt event loop
///
/// Consumes transport callbacks in order, feeds the tracker and the
/// outbound relay, and settles the startup signal exactly once.
struct SessionPump {
    attempt: u64,
    owner: Weak<NegotiatorInner>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    session_ids: watch::Receiver<Option<SessionId>>,
    tracker: ConnectionTracker,
    outbound: OutboundRelay,
    remote_stream: RemoteStream,
    startup: Option<oneshot::Sender<StartupResult>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionPump {
    async fn run(mut self) {
        let mut ids_open = true;

        loop {
            tokio::select! {
                changed = self.session_ids.changed(), if ids_open => match changed {
                    Ok(()) => {
                        let session_id = self.session_ids.borrow_and_update().clone();
                        if let Some(session_id) = session_id {
                            self.outbound.attach(session_id);
                        }
                    }
                    Err(_) => ids_open = false,
                },
                event = self.peer_events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }

        tracing::debug!("Peer event stream for attempt {} ended", self.attempt);
    }

    async fn handle(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate(candidate) => self.outbound.on_local_candidate(candidate),
            PeerEvent::ConnectionState(state) => {
                if let Some(terminal) = self.tracker.on_connection_state(state).await {
                    self.on_terminal(terminal);
                }
            }
            PeerEvent::IceConnectionState(state) => {
                if let Some(terminal) = self.tracker.on_ice_connection_state(state).await {
                    self.on_terminal(terminal);
                }
            }
            PeerEvent::IceGatheringState(state) => self.tracker.on_ice_gathering_state(state),
            PeerEvent::Track(track) => self.on_track(track),
        }
    }

    fn on_track(&mut self, track: RemoteTrack) {
        tracing::info!("Received remote {} track {}", track.kind(), track.id());
        let is_video = track.kind() == TrackKind::Video;
        self.remote_stream.add_track(track);

        if is_video {
            let _ = self.events.send(SessionEvent::Stream(self.remote_stream.clone()));
            if let Some(startup) = self.startup.take() {
                let _ = startup.send(Ok(self.remote_stream.clone()));
            }
        }
    }

    fn on_terminal(&mut self, state: ConnectionState) {
        match self.startup.take() {
            Some(startup) => {
                let _ = startup.send(Err(SessionError::ConnectionFailed(state)));
            }
            // Established session lost its transport
            None => {
                if let Some(owner) = self.owner.upgrade() {
                    let attempt = self.attempt;
                    tokio::spawn(async move {
                        owner.teardown_attempt(attempt).await;
                    });
                }
            }
        }
    }
}
