use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{SessionId, StreamKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// SDP-bearing offer or answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// Body of `POST /api/webrtc/sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub telescope_name: String,
    pub offer: SessionDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<StreamKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub answer: SessionDescription,
}

/// ICE candidate in the browser's `RTCIceCandidateInit` shape
///
/// Used for both directions: the body of candidate POSTs and the payload
/// of candidate stream events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mline_index: None,
            sdp_mid: None,
            username_fragment: None,
        }
    }
}

/// One message from the ICE candidate event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateStreamEvent {
    Keepalive,
    Candidate(IceCandidate),
}

#[derive(Debug, Error)]
pub enum CandidateEventError {
    #[error("event is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("event is not an ICE candidate: {0}")]
    NotACandidate(#[source] serde_json::Error),
}

impl CandidateStreamEvent {
    /// Parse the `data` payload of a stream event
    ///
    /// `{"type": "keepalive"}` is a keepalive; every other JSON value is
    /// decoded as a candidate.
    pub fn parse(data: &str) -> Result<Self, CandidateEventError> {
        let value: Value = serde_json::from_str(data).map_err(CandidateEventError::Json)?;

        if value.get("type").and_then(Value::as_str) == Some("keepalive") {
            return Ok(CandidateStreamEvent::Keepalive);
        }

        serde_json::from_value(value)
            .map(CandidateStreamEvent::Candidate)
            .map_err(CandidateEventError::NotACandidate)
    }
}
