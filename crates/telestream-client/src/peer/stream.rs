use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Inbound media track
///
/// Clones share the stopped flag.
#[derive(Clone)]
pub struct RemoteTrack {
    id: String,
    kind: TrackKind,
    stopped: Arc<AtomicBool>,
    source: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            stopped: Arc::new(AtomicBool::new(false)),
            source: None,
        }
    }

    pub(crate) fn with_source(mut self, source: Arc<TrackRemote>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// RTP source, present for tracks produced by a real peer connection
    pub fn rtp_source(&self) -> Option<Arc<TrackRemote>> {
        self.source.clone()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Accumulates the inbound tracks of one session
#[derive(Clone, Default)]
pub struct RemoteStream {
    tracks: Arc<Mutex<Vec<RemoteTrack>>>,
}

impl RemoteStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RemoteTrack>> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a track; a track id already present is ignored
    pub fn add_track(&self, track: RemoteTrack) {
        let mut tracks = self.lock();
        if !tracks.iter().any(|t| t.id == track.id) {
            tracks.push(track);
        }
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.lock().clone()
    }

    pub fn video_tracks(&self) -> Vec<RemoteTrack> {
        self.lock()
            .iter()
            .filter(|t| t.kind == TrackKind::Video)
            .cloned()
            .collect()
    }

    pub fn has_video(&self) -> bool {
        self.lock().iter().any(|t| t.kind == TrackKind::Video)
    }

    pub fn stop_all(&self) {
        for track in self.lock().iter() {
            track.stop();
        }
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("tracks", &*self.lock())
            .finish()
    }
}
