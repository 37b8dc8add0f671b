//! webrtc-rs implementation of the peer seam

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use telestream_protocol::{IceCandidate, IceServer};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

use super::{
    ConnectionState, IceConnectionState, IceGatheringState, PeerEvent, PeerEventSender, PeerFactory,
    PeerTransport, RemoteTrack, TrackKind,
};

/// Builds webrtc-rs peer connections that only receive video
#[derive(Debug, Clone, Copy, Default)]
pub struct WebRtcPeerFactory;

impl WebRtcPeerFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);
        attach_handlers(&pc, events);

        // Receive-only video; audio is never requested
        pc.add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await?;

        tracing::debug!("Created peer connection with {} ICE servers", ice_servers.len());
        Ok(Arc::new(WebRtcPeer { pc }))
    }
}

fn attach_handlers(pc: &RTCPeerConnection, events: PeerEventSender) {
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            let candidate = match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => Some(candidate_from_init(init)),
                    Err(e) => {
                        tracing::warn!("Failed to serialize local ICE candidate: {}", e);
                        return;
                    }
                },
                None => None,
            };
            let _ = tx.send(PeerEvent::LocalCandidate(candidate));
        })
    }));

    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let _ = tx.send(PeerEvent::ConnectionState(connection_state(state)));
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let _ = tx.send(PeerEvent::IceConnectionState(ice_connection_state(state)));
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        let _ = tx.send(PeerEvent::IceGatheringState(ice_gathering_state(state)));
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
        tracing::debug!(
            "on_track fired: id {}, stream {}, kind {:?}",
            track.id(),
            track.stream_id(),
            track.kind()
        );
        let kind = match track.kind() {
            RTPCodecType::Video => Some(TrackKind::Video),
            RTPCodecType::Audio => Some(TrackKind::Audio),
            _ => None,
        };
        if let Some(kind) = kind {
            let remote = RemoteTrack::new(track.id(), kind).with_source(track);
            let _ = tx.send(PeerEvent::Track(remote));
        }
        Box::pin(async {})
    }));
}

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn create_offer(&self) -> Result<String> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

fn candidate_from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mline_index: init.sdp_mline_index,
        sdp_mid: init.sdp_mid,
        username_fragment: init.username_fragment,
    }
}

fn connection_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
    }
}

fn ice_connection_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
    }
}

fn ice_gathering_state(state: RTCIceGathererState) -> IceGatheringState {
    match state {
        RTCIceGathererState::Unspecified | RTCIceGathererState::New => IceGatheringState::New,
        RTCIceGathererState::Gathering => IceGatheringState::Gathering,
        RTCIceGathererState::Complete | RTCIceGathererState::Closed => IceGatheringState::Complete,
    }
}
