//! Play orders
//!
//! A play order decides what plays after (or before) a given playable unit.
//! Orders re-read the playlist on every call rather than caching positions,
//! so edits to the playlist take effect immediately.

use async_trait::async_trait;
use tracing::warn;

use quaver_core::{PlayableUnit, PlaylistEntry};
use quaver_storage::{Playlist, StorageError};

use crate::error::StopError;

/// How an order reports a [`StopError`] to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the error and resolve to `Ok(None)`. The player uses this: a
    /// broken playlist stops playback the same way the end of it does.
    #[default]
    ReturnNone,
    /// Propagate the error to the caller.
    RaiseStopError,
}

impl ErrorPolicy {
    fn resolve(
        self,
        result: Result<Option<PlayableUnit>, StopError>,
    ) -> Result<Option<PlayableUnit>, StopError> {
        match (self, result) {
            (ErrorPolicy::ReturnNone, Err(err)) => {
                warn!(%err, "play order stopped");
                Ok(None)
            }
            (_, result) => result,
        }
    }
}

/// A policy for advancing through the playlist.
#[async_trait]
pub trait Order: Send + Sync {
    /// The unit after `current`, or the first unit for `None`. `Ok(None)`
    /// means playback should end.
    async fn next(
        &self,
        current: Option<&PlayableUnit>,
        policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError>;

    /// The unit before `current`, or the last unit for `None`.
    async fn previous(
        &self,
        current: Option<&PlayableUnit>,
        policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError>;
}

/// Never plays anything. The player's default until an order is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOrder;

#[async_trait]
impl Order for NullOrder {
    async fn next(
        &self,
        _current: Option<&PlayableUnit>,
        _policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError> {
        Ok(None)
    }

    async fn previous(
        &self,
        _current: Option<&PlayableUnit>,
        _policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError> {
        Ok(None)
    }
}

/// Plays the playlist front to back, crossing entry boundaries.
#[derive(Clone)]
pub struct LinearOrder {
    playlist: Playlist,
}

impl LinearOrder {
    /// Builds a linear order over `playlist`.
    #[must_use]
    pub fn new(playlist: Playlist) -> Self {
        Self { playlist }
    }

    /// First unit of the adjacent entry in `direction`, or `Ok(None)` at the
    /// playlist's end.
    async fn adjacent(
        &self,
        from: Option<&PlaylistEntry>,
        direction: Direction,
    ) -> Result<Option<PlayableUnit>, StopError> {
        let token = from.map(|entry| &entry.token);
        let result = match direction {
            Direction::Forward => self.playlist.next_entry(token).await,
            Direction::Backward => self.playlist.previous_entry(token).await,
        };
        let entry = match result {
            Ok(entry) => entry,
            Err(StorageError::EmptyPlaylist(_) | StorageError::AtPlaylistEdge { .. }) => {
                return Ok(None);
            }
            Err(StorageError::NotFound { token, .. }) => {
                return Err(StopError::EntryGone(token));
            }
            Err(err) => return Err(err.into()),
        };

        let units = self.playlist.playable_units(&entry).await.map_err(map_units_error)?;
        let unit = match direction {
            Direction::Forward => units.into_iter().next(),
            Direction::Backward => units.into_iter().next_back(),
        };
        unit.map_or_else(
            || Err(StopError::EmptyEntry(entry.token.as_str().to_string())),
            |unit| Ok(Some(unit)),
        )
    }

    async fn advance(
        &self,
        current: Option<&PlayableUnit>,
        direction: Direction,
    ) -> Result<Option<PlayableUnit>, StopError> {
        let Some(current) = current else {
            return self.adjacent(None, direction).await;
        };

        let units = self
            .playlist
            .playable_units(&current.playlist_entry)
            .await
            .map_err(map_units_error)?;
        let index = units
            .iter()
            .position(|unit| unit.track.token == current.track.token)
            .ok_or_else(|| StopError::TrackGone(current.track.token.to_string()))?;

        let within = match direction {
            Direction::Forward => index.checked_add(1).filter(|next| *next < units.len()),
            Direction::Backward => index.checked_sub(1),
        };
        if let Some(index) = within {
            let mut units = units;
            return Ok(Some(units.swap_remove(index)));
        }
        self.adjacent(Some(&current.playlist_entry), direction).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

fn map_units_error(err: StorageError) -> StopError {
    match err {
        StorageError::NotFound { token, .. } => StopError::EntryGone(token),
        err => StopError::Storage(err),
    }
}

#[async_trait]
impl Order for LinearOrder {
    async fn next(
        &self,
        current: Option<&PlayableUnit>,
        policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError> {
        policy.resolve(self.advance(current, Direction::Forward).await)
    }

    async fn previous(
        &self,
        current: Option<&PlayableUnit>,
        policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError> {
        policy.resolve(self.advance(current, Direction::Backward).await)
    }
}

/// A [`LinearOrder`] that wraps around at both ends of the playlist.
#[derive(Clone)]
pub struct RepeatOrder {
    inner: LinearOrder,
}

impl RepeatOrder {
    /// Builds a repeating order over `playlist`.
    #[must_use]
    pub fn new(playlist: Playlist) -> Self {
        Self {
            inner: LinearOrder::new(playlist),
        }
    }
}

#[async_trait]
impl Order for RepeatOrder {
    async fn next(
        &self,
        current: Option<&PlayableUnit>,
        policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError> {
        let result = self
            .inner
            .advance(current, Direction::Forward)
            .await;
        match result {
            // Off the end: wrap to the front. An empty playlist yields None
            // here too, which ends the recursion.
            Ok(None) if current.is_some() => {
                policy.resolve(self.inner.advance(None, Direction::Forward).await)
            }
            result => policy.resolve(result),
        }
    }

    async fn previous(
        &self,
        current: Option<&PlayableUnit>,
        policy: ErrorPolicy,
    ) -> Result<Option<PlayableUnit>, StopError> {
        let result = self
            .inner
            .advance(current, Direction::Backward)
            .await;
        match result {
            Ok(None) if current.is_some() => {
                policy.resolve(self.inner.advance(None, Direction::Backward).await)
            }
            result => policy.resolve(result),
        }
    }
}
