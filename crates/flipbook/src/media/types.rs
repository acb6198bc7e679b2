use std::fmt;

/// A decoded frame on its way from the reader to the display.
///
/// Deliberately not `Clone`: a frame is moved from stage to stage and is never
/// held by two of them at once.
#[derive(Debug)]
pub struct Frame {
    pub pixels: Vec<u8>, // RGBA8
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in seconds.
    pub timestamp: f64,
    /// Index of the container sample this frame was decoded from.
    pub sample: usize,
}

impl Frame {
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Raw, still-encoded sample bytes as stored in the container.
#[derive(Debug, Clone)]
pub struct Sample {
    pub data: Vec<u8>,
    /// Presentation timestamp in seconds.
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

/// Immutable per-track metadata, resolved once when the container is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescription {
    pub kind: TrackKind,
    /// Codec identifier as reported by the container (e.g. `"jpeg"`, `"mjpeg"`).
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub framerate: f32,
    pub sample_count: usize,
    /// Track length in seconds.
    pub duration: f64,
}

impl TrackDescription {
    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }

    /// Length of one sample in seconds, or 0 for empty tracks.
    pub fn sample_duration(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.duration / self.sample_count as f64
        }
    }
}

/// Transport state of a movie. Only the playback controller changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Whether the background reader should be alive in this state.
    pub fn keeps_reader_alive(self) -> bool {
        !matches!(self, PlaybackState::Stopped)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(label)
    }
}
