//! Error types for playback

use thiserror::Error;

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The audio pipeline rejected or failed an operation
    #[error("pipeline failure: {0}")]
    Pipeline(String),

    /// A track cannot be handed to the pipeline
    #[error("track has no usable filename: {0}")]
    Unplayable(String),

    /// A play order could not advance
    #[error(transparent)]
    Stop(#[from] StopError),
}

/// Raised when a play order hits a condition that must stop playback
/// rather than silently skip.
#[derive(Debug, Error)]
pub enum StopError {
    /// The current playlist entry vanished from the playlist
    #[error("playlist entry {0} is no longer in the playlist")]
    EntryGone(String),

    /// The current track is no longer part of its entry's expansion
    #[error("track {0} is no longer part of its playlist entry")]
    TrackGone(String),

    /// An adjacent entry exists but expands to nothing playable
    #[error("playlist entry {0} has nothing to play")]
    EmptyEntry(String),

    /// The playlist could not be read
    #[error(transparent)]
    Storage(#[from] quaver_storage::StorageError),
}
