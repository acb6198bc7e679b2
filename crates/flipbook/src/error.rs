use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while opening or playing a movie.
///
/// Open-time variants are fatal and returned from the constructor. Per-sample
/// variants (`Sample`, `Decode`, `Graphics`) surface during playback through
/// [`crate::Movie::last_error`] instead.
#[derive(Debug, Error)]
pub enum MovieError {
    #[error("cannot open input file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid container: {0}")]
    Container(String),

    #[error("could not find video track in {0}")]
    NoVideoTrack(String),

    #[error("found {count} video tracks in {source_name}, only one is supported")]
    MultipleVideoTracks { source_name: String, count: usize },

    #[error("video track has no samples")]
    EmptyTrack,

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("could not read sample {index}: {reason}")]
    Sample { index: usize, reason: String },

    #[error("failed to decode sample {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error("graphics upload failed: {0}")]
    Graphics(String),

    #[error("invalid playback rate {0} (must be finite and >= 0)")]
    InvalidRate(f32),

    #[error("movie was not opened from a file")]
    NotFileBacked,

    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MovieError>;
