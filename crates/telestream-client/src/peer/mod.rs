//! Peer connection seam
//!
//! The negotiator only sees [`PeerTransport`]; transport callbacks arrive
//! as [`PeerEvent`]s on the channel handed to [`PeerFactory::create`].

mod state;
mod stream;
mod webrtc_peer;

pub use state::{ConnectionState, IceConnectionState, IceGatheringState};
pub use stream::{RemoteStream, RemoteTrack, TrackKind};
pub use webrtc_peer::WebRtcPeerFactory;

use async_trait::async_trait;
use std::sync::Arc;
use telestream_protocol::{IceCandidate, IceServer};
use tokio::sync::mpsc;

/// Asynchronous notification from the underlying transport
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A locally gathered candidate; `None` marks the end of gathering
    LocalCandidate(Option<IceCandidate>),
    ConnectionState(ConnectionState),
    IceConnectionState(IceConnectionState),
    IceGatheringState(IceGatheringState),
    Track(RemoteTrack),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Build a receive-only video offer and commit it as the local description
    async fn create_offer(&self) -> anyhow::Result<String>;

    async fn apply_answer(&self, sdp: String) -> anyhow::Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PeerFactory: Send + Sync {
    /// Create a peer connection whose callbacks are already wired to `events`
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> anyhow::Result<Arc<dyn PeerTransport>>;
}
