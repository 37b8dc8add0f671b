mod api;
pub mod sse;

pub use api::ApiError;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use telestream_protocol::{
    CreateSessionRequest, CreateSessionResponse, IceCandidate, RtcConfig, SessionId, SessionRecord,
};

use sse::SseDecoder;

/// HTTP client for the signaling registry's `/api/webrtc` endpoints
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Arc<str>,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/webrtc{}", self.base_url, path)
    }

    // Negotiation

    pub async fn get_config(&self) -> Result<RtcConfig, ApiError> {
        api::get(&self.http, &self.url("/config")).await
    }

    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionResponse, ApiError> {
        api::post(&self.http, &self.url("/sessions"), request).await
    }

    pub async fn post_ice_candidate(
        &self,
        session_id: &SessionId,
        candidate: &IceCandidate,
    ) -> Result<(), ApiError> {
        api::post_void(
            &self.http,
            &self.url(&format!("/sessions/{}/ice-candidates", session_id)),
            candidate,
        )
        .await
    }

    /// Open the server-push stream of remote ICE candidates for a session
    pub async fn open_candidate_stream(
        &self,
        session_id: &SessionId,
    ) -> Result<CandidateStream, ApiError> {
        let response = api::open_event_stream(
            &self.http,
            &self.url(&format!("/sessions/{}/ice-candidates/stream", session_id)),
        )
        .await?;

        Ok(CandidateStream {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
        })
    }

    // Session directory

    /// Fetch one session record; `None` when the registry does not know it
    pub async fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, ApiError> {
        api::get_optional(&self.http, &self.url(&format!("/sessions/{}", session_id))).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        api::get(&self.http, &self.url("/sessions")).await
    }

    pub async fn delete_session(&self, session_id: &SessionId) -> Result<(), ApiError> {
        api::delete(&self.http, &self.url(&format!("/sessions/{}", session_id))).await
    }
}

/// Long-lived read of a session's candidate event stream
pub struct CandidateStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
}

impl CandidateStream {
    /// Next event payload, or `None` once the registry closes the stream
    pub async fn next_message(&mut self) -> Option<Result<String, ApiError>> {
        loop {
            if let Some(data) = self.ready.pop_front() {
                return Some(Ok(data));
            }

            match self.body.next().await? {
                Ok(chunk) => self.ready.extend(self.decoder.push(&chunk)),
                Err(e) => return Some(Err(ApiError::Transport(e))),
            }
        }
    }
}
