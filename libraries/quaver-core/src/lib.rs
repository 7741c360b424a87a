//! Quaver Core
//!
//! Tag model, identity tokens, and metadata entities for Quaver.
//!
//! This crate has no storage or playback machinery; it defines the domain
//! the other crates agree on:
//! - **Tags**: multi-valued [`Tags`] with derived pseudo-tags and
//!   [`compose`] for building group tags out of constituents' tags.
//! - **Tokens**: deterministic tag-derived identities for library entities,
//!   random identities for playlist entries.
//! - **Entities**: [`Track`] / [`Medium`] / [`Album`], plus the playlist's
//!   [`PlaylistEntry`] and [`PlayableUnit`].
//!
//! # Example
//!
//! ```rust
//! use quaver_core::{Tag, Tags, Track};
//!
//! let track = Track::new(Tags::new([
//!     ("~filename", vec!["/music/song.flac"]),
//!     ("~dirname", vec!["/music"]),
//!     ("album", vec!["My Album"]),
//!     ("tracknumber", vec!["3/12"]),
//! ]));
//!
//! assert_eq!(track.tags.get(Tag::ParsedTrackNumber), ["3"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod entity;
pub mod error;
pub mod tags;
pub mod token;

// Re-export commonly used types
pub use error::{EntityError, Result};
pub use tags::{compose, Tag, TagName, Tags, PSEUDO_PREFIX};

pub use entity::{Album, Medium, PlayableUnit, PlaylistEntry, ScannedFile, Track};
pub use token::{
    AlbumToken, EntryToken, LibraryToken, MediumSortKey, MediumToken, SortKey, TrackToken,
};
