use std::time::Duration;
use telestream_protocol::CandidateEventError;
use thiserror::Error;

use crate::network::ApiError;
use crate::peer::ConnectionState;

/// Why a session could not be established
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("source name must not be empty")]
    InvalidSource,

    #[error("failed to get WebRTC config: {0}")]
    ConfigFetch(#[source] ApiError),

    #[error("failed to create session: {0}")]
    SessionCreate(#[source] ApiError),

    #[error("timeout waiting for remote stream after {0:?}")]
    Timeout(Duration),

    #[error("connection {0}")]
    ConnectionFailed(ConnectionState),

    #[error("peer connection error: {0}")]
    Peer(#[from] anyhow::Error),

    #[error("session attempt cancelled by disconnect")]
    Cancelled,
}

/// Per-candidate relay failures; logged, never fatal to the session
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to send ICE candidate: {0}")]
    CandidateDelivery(#[source] ApiError),

    #[error("failed to parse remote ICE candidate: {0}")]
    CandidateParse(#[from] CandidateEventError),

    #[error("failed to add remote ICE candidate: {0}")]
    CandidateApply(#[source] anyhow::Error),
}
