//! Shared wire definitions for the Telestream signaling registry
//!
//! These types mirror the JSON bodies exchanged with the registry's
//! `/api/webrtc` endpoints and its ICE candidate event stream.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
