//! Metadata entities
//!
//! The library's domain model: a [`Track`] is one audio file, a [`Medium`]
//! is one disc (or side, or reel) grouping tracks, and an [`Album`] groups
//! mediums. Grouping is purely tag-derived: constructing a track computes
//! the tokens of the medium and album it belongs to, and the higher-level
//! entities validate that their constituents agree.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EntityError, Result};
use crate::tags::{Tag, Tags};
use crate::token::{
    AlbumToken, EntryToken, LibraryToken, MediumSortKey, MediumToken, SortKey, TrackToken,
};

/// Tags that define which album a track belongs to.
const ALBUM_IDENTITY_TAGS: [Tag; 4] = [
    Tag::Dirname,
    Tag::Album,
    Tag::AlbumArtist,
    Tag::MusicbrainzAlbumId,
];

/// A single audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// The track's identity.
    pub token: TrackToken,
    /// Identity of the medium the track belongs to.
    pub medium_token: MediumToken,
    /// Identity of the album the track belongs to.
    pub album_token: AlbumToken,
    /// The track's tags, with derived pseudo-tags recomputed.
    pub tags: Tags,
    /// Orders the track within its album.
    #[serde(skip, default = "zero_sort_key")]
    pub sort_key: SortKey,
    /// Orders the track's medium within its album.
    #[serde(skip, default = "zero_medium_sort_key")]
    pub medium_sort_key: MediumSortKey,
}

fn zero_sort_key() -> SortKey {
    SortKey::new(0, 0)
}

fn zero_medium_sort_key() -> MediumSortKey {
    MediumSortKey::new(0)
}

impl Track {
    /// Builds a track from its tags.
    ///
    /// Derived pseudo-tags are recomputed first, so stale values in `tags`
    /// cannot influence identity.
    #[must_use]
    pub fn new(tags: Tags) -> Self {
        let tags = tags.derive();
        let album_fields: Vec<&[String]> =
            ALBUM_IDENTITY_TAGS.iter().map(|tag| tags.get(*tag)).collect();
        let mut medium_fields = album_fields.clone();
        medium_fields.push(tags.get(Tag::ParsedDiscNumber));

        let disc = numeric_or_zero(&tags, Tag::ParsedDiscNumber);
        let track = numeric_or_zero(&tags, Tag::ParsedTrackNumber);

        Self {
            token: TrackToken::derive(&[tags.get(Tag::Filename)]),
            medium_token: MediumToken::derive(&medium_fields),
            album_token: AlbumToken::derive(&album_fields),
            sort_key: SortKey::new(disc, track),
            medium_sort_key: MediumSortKey::new(disc),
            tags,
        }
    }
}

/// Sort position from a numeric tag, with 0 for missing or unusable values.
///
/// Entities with no position sort together at the front rather than failing
/// to load.
fn numeric_or_zero(tags: &Tags, tag: Tag) -> u32 {
    if !tags.contains(tag) {
        debug!(tag = tag.name(), "no value for sort position, using 0");
        return 0;
    }
    match tags.int_or_none(tag) {
        Some(value) => value,
        None => {
            warn!(
                tag = tag.name(),
                values = ?tags.get(tag),
                "unusable value for sort position, using 0",
            );
            0
        }
    }
}

/// A medium, e.g. a disc or a cassette side, with its tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medium {
    /// The medium's identity.
    pub token: MediumToken,
    /// Identity of the album the medium belongs to.
    pub album_token: AlbumToken,
    /// Tags common to the medium's tracks.
    pub tags: Tags,
    /// The medium's tracks, in play order.
    pub tracks: Vec<Track>,
}

impl Medium {
    /// Builds a medium around the given tracks.
    ///
    /// The tracks are sorted into play order. Fails unless every track
    /// agrees on the medium (and album) it belongs to.
    pub fn new(tags: Tags, mut tracks: Vec<Track>) -> Result<Self> {
        let token = require_one_token(tracks.iter().map(|track| &track.medium_token))?.clone();
        let album_token =
            require_one_token(tracks.iter().map(|track| &track.album_token))?.clone();
        tracks.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
        Ok(Self {
            token,
            album_token,
            tags,
            tracks,
        })
    }

    fn sort_key(&self) -> MediumSortKey {
        self.tracks
            .first()
            .map_or_else(|| MediumSortKey::new(0), |track| track.medium_sort_key)
    }
}

/// An album, with its mediums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    /// The album's identity.
    pub token: AlbumToken,
    /// Tags common to the album's tracks.
    pub tags: Tags,
    /// The album's mediums, in order.
    pub mediums: Vec<Medium>,
}

impl Album {
    /// Builds an album around the given mediums.
    ///
    /// The mediums are sorted into order. Fails unless every medium agrees
    /// on the album it belongs to.
    pub fn new(tags: Tags, mut mediums: Vec<Medium>) -> Result<Self> {
        let token = require_one_token(mediums.iter().map(|medium| &medium.album_token))?.clone();
        mediums.sort_by_key(Medium::sort_key);
        Ok(Self {
            token,
            tags,
            mediums,
        })
    }
}

/// The single token shared by all constituents, or an error naming the
/// distinct tokens actually found.
fn require_one_token<'a, T, I>(tokens: I) -> Result<&'a T>
where
    T: PartialEq + fmt::Display + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut distinct: Vec<&T> = Vec::new();
    for token in tokens {
        if !distinct.contains(&token) {
            distinct.push(token);
        }
    }
    match distinct.as_slice() {
        [token] => Ok(token),
        found => Err(EntityError::TokenMismatch {
            found: found.iter().map(ToString::to_string).collect(),
        }),
    }
}

/// One entry in the playlist.
///
/// Entries are positions, not targets: appending the same album twice
/// produces two entries with distinct tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// The entry's identity.
    pub token: EntryToken,
    /// What the entry plays: a track, a medium, or an album.
    pub library_token: LibraryToken,
}

impl PlaylistEntry {
    /// Builds an entry with a fresh token.
    #[must_use]
    pub fn new(library_token: LibraryToken) -> Self {
        Self {
            token: EntryToken::generate(),
            library_token,
        }
    }

    /// Builds an entry with a known token, e.g. one read back from storage.
    #[must_use]
    pub fn with_token(token: EntryToken, library_token: LibraryToken) -> Self {
        Self {
            token,
            library_token,
        }
    }
}

/// One playable track within the context of the playlist entry it came from.
///
/// The same track can appear in many units; the entry distinguishes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayableUnit {
    /// The playlist entry the unit was expanded from.
    pub playlist_entry: PlaylistEntry,
    /// The track to play.
    pub track: Track,
}

/// One file found by a library scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScannedFile {
    /// A file that is not (readable) audio. Tracked so a future scan can
    /// tell deleted files from never-seen ones.
    File {
        /// Absolute directory name.
        dirname: String,
        /// Filename within the directory.
        filename: String,
    },
    /// An audio file with its tags.
    Audio {
        /// Absolute directory name.
        dirname: String,
        /// Filename within the directory.
        filename: String,
        /// Tags as read from the file, plus scanner pseudo-tags.
        tags: Tags,
    },
}

impl ScannedFile {
    /// Absolute directory name.
    pub fn dirname(&self) -> &str {
        match self {
            ScannedFile::File { dirname, .. } | ScannedFile::Audio { dirname, .. } => dirname,
        }
    }

    /// Filename within the directory.
    pub fn filename(&self) -> &str {
        match self {
            ScannedFile::File { filename, .. } | ScannedFile::Audio { filename, .. } => filename,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(filename: &str, album: &str, disc: &str, number: &str) -> Track {
        Track::new(Tags::new([
            ("~filename", vec![filename]),
            ("~dirname", vec!["/music"]),
            ("album", vec![album]),
            ("discnumber", vec![disc]),
            ("tracknumber", vec![number]),
        ]))
    }

    #[test]
    fn identical_tags_derive_identical_identities() {
        let a = track("/music/a.flac", "Album", "1", "1");
        let b = track("/music/a.flac", "Album", "1", "1");
        assert_eq!(a.token, b.token);
        assert_eq!(a.medium_token, b.medium_token);
        assert_eq!(a.album_token, b.album_token);
    }

    #[test]
    fn discs_of_one_album_share_the_album_token_only() {
        let disc1 = track("/music/a.flac", "Album", "1", "1");
        let disc2 = track("/music/b.flac", "Album", "2", "1");
        assert_eq!(disc1.album_token, disc2.album_token);
        assert_ne!(disc1.medium_token, disc2.medium_token);
    }

    #[test]
    fn stale_derived_tags_do_not_change_identity() {
        let clean = track("/music/a.flac", "Album", "1", "1");
        let stale = Track::new(Tags::new([
            ("~filename", vec!["/music/a.flac"]),
            ("~dirname", vec!["/music"]),
            ("album", vec!["Album"]),
            ("discnumber", vec!["1"]),
            ("tracknumber", vec!["1"]),
            ("~parsed_discnumber", vec!["9"]),
        ]));
        assert_eq!(clean.medium_token, stale.medium_token);
        assert_eq!(clean.sort_key, stale.sort_key);
    }

    #[test]
    fn unusable_track_number_sorts_first() {
        let odd = track("/music/a.flac", "Album", "1", "A1");
        let normal = track("/music/b.flac", "Album", "1", "2");
        assert!(odd.sort_key < normal.sort_key);
    }

    #[test]
    fn medium_sorts_tracks_into_play_order() {
        let t1 = track("/music/a.flac", "Album", "1", "1");
        let t2 = track("/music/b.flac", "Album", "1", "2");
        let medium = Medium::new(Tags::default(), vec![t2.clone(), t1.clone()]).unwrap();
        assert_eq!(medium.tracks, vec![t1, t2]);
    }

    #[test]
    fn medium_rejects_tracks_from_different_mediums() {
        let t1 = track("/music/a.flac", "Album", "1", "1");
        let t2 = track("/music/b.flac", "Album", "2", "1");
        let err = Medium::new(Tags::default(), vec![t1, t2]).unwrap_err();
        assert!(matches!(err, EntityError::TokenMismatch { found } if found.len() == 2));
    }

    #[test]
    fn medium_rejects_empty_track_list() {
        let err = Medium::new(Tags::default(), vec![]).unwrap_err();
        assert!(matches!(err, EntityError::TokenMismatch { found } if found.is_empty()));
    }

    #[test]
    fn album_sorts_mediums_by_disc_number() {
        let disc1 =
            Medium::new(Tags::default(), vec![track("/music/a.flac", "Album", "1", "1")]).unwrap();
        let disc2 =
            Medium::new(Tags::default(), vec![track("/music/b.flac", "Album", "2", "1")]).unwrap();
        let album = Album::new(Tags::default(), vec![disc2.clone(), disc1.clone()]).unwrap();
        assert_eq!(album.mediums, vec![disc1, disc2]);
    }

    #[test]
    fn playlist_entries_for_one_target_are_distinct() {
        let target = LibraryToken::from(TrackToken::new("track/v1:x"));
        let a = PlaylistEntry::new(target.clone());
        let b = PlaylistEntry::new(target);
        assert_ne!(a.token, b.token);
        assert_eq!(a.library_token, b.library_token);
    }
}
