//! Opaque identity tokens
//!
//! Library entities are identified by tokens derived deterministically from
//! their tags, so the same files scanned on two machines produce the same
//! identities. Playlist entries get random tokens instead; two entries for
//! the same track are still distinct.
//!
//! Token payloads carry a version prefix. Changing any derivation input set
//! bumps the prefix, so identities from different derivation rules never
//! collide.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Formats a derived token payload from the entity kind and the tag value
/// lists that define its identity.
fn derive_payload(kind: &str, fields: &[&[String]]) -> String {
    format!("{kind}/v1:{fields:?}")
}

macro_rules! library_token_type {
    ($(#[$doc:meta])* $name:ident, $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing token value, e.g. one read back from storage.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Derives the token from the tag values that define identity.
            pub(crate) fn derive(fields: &[&[String]]) -> Self {
                Self(derive_payload($kind, fields))
            }

            /// The token's payload.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

library_token_type!(
    /// Identity of a single track, derived from its filename.
    TrackToken,
    "track"
);
library_token_type!(
    /// Identity of a medium (disc, cassette side, etc.).
    MediumToken,
    "medium"
);
library_token_type!(
    /// Identity of an album.
    AlbumToken,
    "album"
);

/// Identity of one playlist entry.
///
/// Random rather than derived: appending the same track twice yields two
/// distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryToken(String);

impl EntryToken {
    /// Wraps an existing token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("entry/v1:{}", uuid::Uuid::new_v4()))
    }

    /// The token's payload.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A token for any of the library entity kinds.
///
/// Used where a reference can point at a track, a medium, or an album, e.g.
/// a playlist entry's target. Stored as a (kind, value) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LibraryToken {
    /// A track token.
    Track(TrackToken),
    /// A medium token.
    Medium(MediumToken),
    /// An album token.
    Album(AlbumToken),
}

impl LibraryToken {
    /// The kind discriminant, as stored alongside the value.
    pub const fn kind(&self) -> &'static str {
        match self {
            LibraryToken::Track(_) => "track",
            LibraryToken::Medium(_) => "medium",
            LibraryToken::Album(_) => "album",
        }
    }

    /// The token payload.
    pub fn as_str(&self) -> &str {
        match self {
            LibraryToken::Track(token) => token.as_str(),
            LibraryToken::Medium(token) => token.as_str(),
            LibraryToken::Album(token) => token.as_str(),
        }
    }

    /// Reconstructs a token from its stored (kind, value) pair.
    pub fn from_kind_and_value(kind: &str, value: &str) -> Option<Self> {
        match kind {
            "track" => Some(LibraryToken::Track(TrackToken::new(value))),
            "medium" => Some(LibraryToken::Medium(MediumToken::new(value))),
            "album" => Some(LibraryToken::Album(AlbumToken::new(value))),
            _ => None,
        }
    }
}

impl From<TrackToken> for LibraryToken {
    fn from(token: TrackToken) -> Self {
        LibraryToken::Track(token)
    }
}

impl From<MediumToken> for LibraryToken {
    fn from(token: MediumToken) -> Self {
        LibraryToken::Medium(token)
    }
}

impl From<AlbumToken> for LibraryToken {
    fn from(token: AlbumToken) -> Self {
        LibraryToken::Album(token)
    }
}

impl fmt::Display for LibraryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! sort_key_type {
    ($(#[$doc:meta])* $name:ident, $len:literal, [$($field:ident),+]) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            pub(crate) fn new($($field: u32),+) -> Self {
                let mut bytes = [0u8; $len];
                bytes[0] = 1;
                let mut offset = 1;
                $(
                    bytes[offset..offset + 4].copy_from_slice(&$field.to_be_bytes());
                    #[allow(unused_assignments)]
                    {
                        offset += 4;
                    }
                )+
                Self(bytes)
            }

            /// The key as bytes, ordered so that byte order is sort order.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Reconstructs a key from stored bytes.
            pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
                let bytes: [u8; $len] = bytes.try_into().ok()?;
                (bytes[0] == 1).then_some(Self(bytes))
            }
        }
    };
}

sort_key_type!(
    /// Sort key ordering tracks within an album: disc number, then track
    /// number. Byte comparison matches semantic comparison.
    SortKey,
    9,
    [disc, track]
);
sort_key_type!(
    /// Sort key ordering mediums within an album by disc number.
    MediumSortKey,
    5,
    [disc]
);
