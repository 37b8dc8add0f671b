//! Trickle ICE relay
//!
//! Outbound: local candidates are POSTed to the registry. Inbound: the
//! registry's candidate stream is applied to the peer connection.

use std::sync::Arc;
use telestream_protocol::{CandidateEventError, CandidateStreamEvent, IceCandidate, SessionId};
use tokio::task::JoinSet;

use super::events::CandidateCounters;
use crate::error::RelayError;
use crate::network::RegistryClient;
use crate::peer::PeerTransport;

/// Posts locally gathered candidates for the active session
///
/// Candidates gathered before the registry has issued a session id are
/// held back and flushed, in order, once [`attach`](Self::attach) is called.
pub(crate) struct OutboundRelay {
    registry: RegistryClient,
    counters: Arc<CandidateCounters>,
    session_id: Option<SessionId>,
    pending: Vec<IceCandidate>,
    in_flight: JoinSet<()>,
}

impl OutboundRelay {
    pub fn new(registry: RegistryClient, counters: Arc<CandidateCounters>) -> Self {
        Self {
            registry,
            counters,
            session_id: None,
            pending: Vec::new(),
            in_flight: JoinSet::new(),
        }
    }

    pub fn on_local_candidate(&mut self, candidate: Option<IceCandidate>) {
        let Some(candidate) = candidate else {
            tracing::info!(
                "ICE gathering complete, {} local candidates",
                self.counters.snapshot().local_generated
            );
            return;
        };

        let count = self.counters.record_local();
        tracing::debug!("Local ICE candidate #{} generated: {}", count, candidate.candidate);

        match self.session_id.clone() {
            Some(session_id) => self.post(session_id, candidate),
            None => {
                tracing::debug!("No session id yet, holding local ICE candidate #{}", count);
                self.pending.push(candidate);
            }
        }
    }

    pub fn attach(&mut self, session_id: SessionId) {
        if let Some(existing) = &self.session_id {
            tracing::warn!("Relay already bound to session {}, ignoring {}", existing, session_id);
            return;
        }

        self.session_id = Some(session_id.clone());
        for candidate in std::mem::take(&mut self.pending) {
            self.post(session_id.clone(), candidate);
        }
    }

    fn post(&mut self, session_id: SessionId, candidate: IceCandidate) {
        while self.in_flight.try_join_next().is_some() {}

        let registry = self.registry.clone();
        self.in_flight.spawn(async move {
            match registry.post_ice_candidate(&session_id, &candidate).await {
                Ok(()) => tracing::debug!("ICE candidate sent for session {}", session_id),
                Err(e) => {
                    let error = RelayError::CandidateDelivery(e);
                    tracing::warn!("Session {}: {}", session_id, error);
                }
            }
        });
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InboundOutcome {
    Keepalive,
    Applied,
}

/// Consume the registry's candidate stream until it ends
///
/// Per-message failures are logged and skipped. Transport errors end the
/// read; reconnecting is left to whoever owns the session.
pub(crate) async fn run_inbound(
    registry: RegistryClient,
    session_id: SessionId,
    peer: Arc<dyn PeerTransport>,
    counters: Arc<CandidateCounters>,
) {
    let mut stream = match registry.open_candidate_stream(&session_id).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to open ICE candidate stream for session {}: {}", session_id, e);
            return;
        }
    };

    tracing::info!("Listening for remote ICE candidates on session {}", session_id);

    while let Some(message) = stream.next_message().await {
        match message {
            Ok(data) => {
                if let Err(e) = handle_inbound(&data, peer.as_ref(), &counters).await {
                    tracing::warn!("Session {}: {}", session_id, e);
                }
            }
            Err(e) => {
                tracing::error!("ICE candidate stream error on session {}: {}", session_id, e);
                break;
            }
        }
    }

    tracing::info!("ICE candidate stream for session {} ended", session_id);
}

/// Apply one stream message
///
/// Every non-keepalive JSON message counts as received, whether or not it
/// turns out to be a usable candidate.
pub(crate) async fn handle_inbound(
    data: &str,
    peer: &dyn PeerTransport,
    counters: &CandidateCounters,
) -> Result<InboundOutcome, RelayError> {
    let candidate = match CandidateStreamEvent::parse(data) {
        Ok(CandidateStreamEvent::Keepalive) => {
            tracing::trace!("ICE candidate stream keepalive");
            return Ok(InboundOutcome::Keepalive);
        }
        Ok(CandidateStreamEvent::Candidate(candidate)) => candidate,
        Err(e @ CandidateEventError::NotACandidate(_)) => {
            counters.record_remote();
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let count = counters.record_remote();
    tracing::debug!("Received remote ICE candidate #{}: {}", count, candidate.candidate);

    peer.add_remote_candidate(candidate)
        .await
        .map_err(RelayError::CandidateApply)?;

    tracing::debug!("Added remote ICE candidate #{}", count);
    Ok(InboundOutcome::Applied)
}
