//! Telestream client library
//!
//! Negotiates receive-only WebRTC video sessions with a telescope
//! signaling registry: offer/answer over HTTP, trickle ICE in both
//! directions and a single observable connection state.

pub mod config;
pub mod error;
pub mod network;
pub mod peer;
pub mod session;

pub use config::ClientConfig;
pub use error::{RelayError, SessionError};
pub use network::{ApiError, RegistryClient};
pub use peer::{ConnectionState, RemoteStream, RemoteTrack, TrackKind, WebRtcPeerFactory};
pub use session::{CandidateStats, SessionEvent, SessionNegotiator, DEFAULT_STARTUP_TIMEOUT};
