//! Shared fixtures: an in-process signaling registry and a scripted peer

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telestream_client::peer::{PeerEvent, PeerEventSender, PeerFactory, PeerTransport};
use telestream_client::RegistryClient;
use telestream_protocol::{
    CreateSessionRequest, CreateSessionResponse, IceCandidate, IceServer, RtcConfig,
    SessionDescription, SessionId, SessionRecord,
};

pub const FAKE_OFFER: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=offer\r\n";
pub const FAKE_ANSWER: &str = "v=0\r\no=- 2 2 IN IP4 0.0.0.0\r\ns=answer\r\n";

/// What the fake registry serves and what it has seen
pub struct RegistryState {
    pub config_status: StatusCode,
    pub create_status: StatusCode,
    pub create_delay: Option<Duration>,
    pub candidate_status: StatusCode,
    pub next_session_ids: VecDeque<String>,
    /// `data:` payloads replayed on every candidate stream
    pub stream_messages: Vec<String>,
    pub created: Vec<CreateSessionRequest>,
    pub sessions: HashMap<String, SessionRecord>,
    pub posted_candidates: Vec<(String, IceCandidate)>,
    pub deleted: Vec<String>,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            config_status: StatusCode::OK,
            create_status: StatusCode::OK,
            create_delay: None,
            candidate_status: StatusCode::OK,
            next_session_ids: VecDeque::new(),
            stream_messages: Vec::new(),
            created: Vec::new(),
            sessions: HashMap::new(),
            posted_candidates: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

type Shared = Arc<Mutex<RegistryState>>;

/// Registry test server bound to a random local port
pub struct FakeRegistry {
    pub addr: SocketAddr,
    pub state: Shared,
    server: tokio::task::JoinHandle<()>,
}

impl FakeRegistry {
    pub async fn start() -> Self {
        Self::start_with(RegistryState::default()).await
    }

    pub async fn start_with(state: RegistryState) -> Self {
        let state = Arc::new(Mutex::new(state));

        let router = Router::new()
            .route("/api/webrtc/config", get(config))
            .route("/api/webrtc/sessions", post(create_session).get(list_sessions))
            .route(
                "/api/webrtc/sessions/{id}",
                get(get_session).delete(delete_session),
            )
            .route("/api/webrtc/sessions/{id}/ice-candidates", post(add_candidate))
            .route(
                "/api/webrtc/sessions/{id}/ice-candidates/stream",
                get(candidate_stream),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test registry");
        let addr = listener.local_addr().expect("Failed to read local address");

        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> RegistryClient {
        RegistryClient::new(&self.base_url())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn deleted(&self) -> Vec<String> {
        self.with_state(|s| s.deleted.clone())
    }

    pub fn posted_candidates(&self) -> Vec<(String, IceCandidate)> {
        self.with_state(|s| s.posted_candidates.clone())
    }
}

impl Drop for FakeRegistry {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn config(State(state): State<Shared>) -> Response {
    let status = state.lock().unwrap().config_status;
    if !status.is_success() {
        return (status, "config unavailable").into_response();
    }

    Json(RtcConfig {
        ice_servers: vec![IceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_string()],
            username: None,
            credential: None,
        }],
    })
    .into_response()
}

async fn create_session(
    State(state): State<Shared>,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    let delay = state.lock().unwrap().create_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().unwrap();
    let status = state.create_status;
    state.created.push(request.clone());

    if !status.is_success() {
        return (status, "registry refused the session").into_response();
    }

    let session_id = state
        .next_session_ids
        .pop_front()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state.sessions.insert(
        session_id.clone(),
        SessionRecord {
            session_id: SessionId::from(session_id.clone()),
            telescope_name: request.telescope_name.clone(),
            stream_type: request.stream_type.unwrap_or_default().to_string(),
            state: "connecting".to_string(),
        },
    );

    Json(CreateSessionResponse {
        session_id: SessionId::from(session_id),
        answer: SessionDescription::answer(FAKE_ANSWER),
    })
    .into_response()
}

async fn list_sessions(State(state): State<Shared>) -> Json<Vec<SessionRecord>> {
    let state = state.lock().unwrap();
    let mut sessions: Vec<SessionRecord> = state.sessions.values().cloned().collect();
    sessions.sort_by(|a, b| a.session_id.as_str().cmp(b.session_id.as_str()));
    Json(sessions)
}

async fn get_session(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    match state.lock().unwrap().sessions.get(&id) {
        Some(session) => Json(session.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "session not found").into_response(),
    }
}

async fn delete_session(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    let mut state = state.lock().unwrap();
    state.deleted.push(id.clone());
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn add_candidate(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(candidate): Json<IceCandidate>,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    state.posted_candidates.push((id, candidate));
    state.candidate_status
}

async fn candidate_stream(State(state): State<Shared>) -> Response {
    let messages = state.lock().unwrap().stream_messages.clone();
    let events = stream::iter(
        messages
            .into_iter()
            .map(|data| Ok::<_, Infallible>(format!("data: {}\n\n", data))),
    )
    .chain(stream::pending());

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(events))
        .expect("Failed to build event stream response")
}

/// What a scripted peer reports, and when
#[derive(Clone, Default)]
pub struct PeerScript {
    /// Sent while the offer is being created, before the session exists
    pub on_offer: Vec<PeerEvent>,
    /// Sent in order after the answer is applied, each after its delay
    pub after_answer: Vec<(Duration, PeerEvent)>,
    pub reject_candidates: bool,
    /// Drop every event sender once `after_answer` has been played
    pub hang_up: bool,
}

pub struct ScriptedPeer {
    script: PeerScript,
    events: Mutex<Option<PeerEventSender>>,
    closed: Arc<AtomicBool>,
    answer: Mutex<Option<String>>,
    remote_candidates: Mutex<Vec<IceCandidate>>,
}

impl ScriptedPeer {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn answer(&self) -> Option<String> {
        self.answer.lock().unwrap().clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.remote_candidates.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerTransport for ScriptedPeer {
    async fn create_offer(&self) -> anyhow::Result<String> {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            for event in &self.script.on_offer {
                let _ = events.send(event.clone());
            }
        }
        Ok(FAKE_OFFER.to_string())
    }

    async fn apply_answer(&self, sdp: String) -> anyhow::Result<()> {
        *self.answer.lock().unwrap() = Some(sdp);

        let steps = self.script.after_answer.clone();
        let events = {
            let mut held = self.events.lock().unwrap();
            if self.script.hang_up {
                held.take()
            } else {
                held.clone()
            }
        };
        let Some(events) = events else {
            return Ok(());
        };
        let closed = self.closed.clone();
        tokio::spawn(async move {
            for (delay, event) in steps {
                tokio::time::sleep(delay).await;
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                let _ = events.send(event);
            }
        });

        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()> {
        if self.script.reject_candidates {
            anyhow::bail!("candidate rejected: {}", candidate.candidate);
        }
        self.remote_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one scripted peer per session attempt
#[derive(Default)]
pub struct ScriptedPeerFactory {
    scripts: Mutex<VecDeque<PeerScript>>,
    peers: Mutex<Vec<Arc<ScriptedPeer>>>,
}

impl ScriptedPeerFactory {
    pub fn new(scripts: Vec<PeerScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            peers: Mutex::new(Vec::new()),
        })
    }

    pub fn peer(&self, index: usize) -> Arc<ScriptedPeer> {
        self.peers.lock().unwrap()[index].clone()
    }

    pub fn created(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerFactory for ScriptedPeerFactory {
    async fn create(
        &self,
        _ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> anyhow::Result<Arc<dyn PeerTransport>> {
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let peer = Arc::new(ScriptedPeer {
            script,
            events: Mutex::new(Some(events)),
            closed: Arc::new(AtomicBool::new(false)),
            answer: Mutex::new(None),
            remote_candidates: Mutex::new(Vec::new()),
        });
        self.peers.lock().unwrap().push(peer.clone());
        Ok(peer)
    }
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Poll `check` until it holds, panicking after two seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(ms(20)).await;
    }
    panic!("timed out waiting for {}", what);
}
