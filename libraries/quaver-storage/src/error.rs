/// Storage-specific errors
use thiserror::Error;

/// Result type alias using `StorageError`
pub type Result<T> = std::result::Result<T, StorageError>;

/// An end of the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The first entry.
    First,
    /// The last entry.
    Last,
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Edge::First => "first",
            Edge::Last => "last",
        })
    }
}

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database error from `SQLx`
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Stored rows no longer form a valid entity
    #[error(transparent)]
    Entity(#[from] quaver_core::EntityError),

    /// Entity not found
    #[error("{entity} not found: {token}")]
    NotFound {
        /// Kind of entity looked up, e.g. "track".
        entity: String,
        /// The token that matched nothing.
        token: String,
    },

    /// A scanned file is already in the library
    #[error("file already in library: {dirname}/{filename}")]
    DuplicateFile {
        /// Absolute directory name of the duplicate.
        dirname: String,
        /// Filename of the duplicate.
        filename: String,
    },

    /// The playlist has no entries at all
    #[error("playlist is empty, it has no {0} entry")]
    EmptyPlaylist(Edge),

    /// Navigation ran off an end of the playlist
    #[error("entry {token} is the {edge} entry of the playlist")]
    AtPlaylistEdge {
        /// The entry navigation started from.
        token: String,
        /// Which end was run off.
        edge: Edge,
    },

    /// A stored entry row references an unknown library token kind
    #[error("entry {token} has unknown library token type {kind:?}")]
    UnknownTokenType {
        /// The entry whose row is unreadable.
        token: String,
        /// The unrecognized kind discriminant.
        kind: String,
    },
}

impl StorageError {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, token: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            token: token.into(),
        }
    }
}
