//! Quaver Storage
//!
//! Embedded `SQLite` persistence for Quaver: the library store (scan records
//! and entity lookups) and the playlist store (a linked list of entries).
//!
//! Each store owns its own database file, named for its schema and schema
//! version; stores with different versions never share a file.
//!
//! # Example
//!
//! ```rust,no_run
//! use quaver_bus::PubSub;
//! use quaver_core::LibraryToken;
//! use quaver_storage::{Library, Playlist};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = std::path::Path::new("/var/lib/quaver");
//! let bus = PubSub::new();
//! let library = Library::open(dir).await?;
//! let playlist = Playlist::open(dir, library.clone(), bus).await?;
//!
//! for token in library.tokens().await? {
//!     if let LibraryToken::Album(_) = token {
//!         playlist.append(token).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod database;
mod error;
pub mod library;
pub mod playlist;

pub use database::{Database, Schema};
pub use error::{Edge, Result, StorageError};
pub use library::Library;
pub use playlist::{Playlist, PlaylistUpdate};
