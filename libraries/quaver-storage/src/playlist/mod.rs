//! The playlist store.
//!
//! Entries form a singly linked list in SQL: each row points at its
//! successor, the first entry is the one no row points at, and the last is
//! the one pointing at nothing. Appending re-points the old tail inside the
//! same transaction that inserts the new row, so the list is never observed
//! half-linked.

use std::collections::HashMap;
use std::path::Path;

use sqlx::{Sqlite, Transaction};

use quaver_bus::PubSub;
use quaver_core::{EntryToken, LibraryToken, PlayableUnit, PlaylistEntry};

use crate::database::{Database, Schema};
use crate::error::{Edge, Result, StorageError};
use crate::library::Library;

const SCHEMA: Schema = Schema {
    name: "playlist",
    version: "v1",
    create: &[
        // next_token is re-pointed before the new row exists, so the
        // self-reference must be deferred to commit.
        "CREATE TABLE Entry (
            token TEXT PRIMARY KEY,
            next_token TEXT DEFAULT NULL
                UNIQUE
                REFERENCES Entry (token)
                ON DELETE SET DEFAULT
                DEFERRABLE INITIALLY DEFERRED,
            library_token_type TEXT NOT NULL,
            library_token TEXT NOT NULL
        )",
    ],
    drop: &["DROP TABLE IF EXISTS Entry"],
};

/// Published on the bus after any committed playlist change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistUpdate;

/// The playlist store.
#[derive(Clone)]
pub struct Playlist {
    database: Database,
    library: Library,
    bus: PubSub,
}

impl Playlist {
    /// Opens the playlist store under `dir`.
    ///
    /// `library` resolves entries to tracks; `bus` carries
    /// [`PlaylistUpdate`] messages.
    pub async fn open(dir: &Path, library: Library, bus: PubSub) -> Result<Self> {
        Ok(Self {
            database: Database::open(SCHEMA, dir).await?,
            library,
            bus,
        })
    }

    /// Appends a new entry for `library_token` at the end of the playlist.
    pub async fn append(&self, library_token: LibraryToken) -> Result<PlaylistEntry> {
        let entry = PlaylistEntry::new(library_token);
        let mut tx = self.database.transaction().await?;
        sqlx::query("UPDATE Entry SET next_token = ? WHERE next_token IS NULL")
            .bind(entry.token.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO Entry (token, next_token, library_token_type, library_token)
             VALUES (?, NULL, ?, ?)",
        )
        .bind(entry.token.as_str())
        .bind(entry.library_token.kind())
        .bind(entry.library_token.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        self.bus.publish(PlaylistUpdate);
        Ok(entry)
    }

    /// The entry after `entry`, or the first entry for `None`.
    ///
    /// Errors: [`StorageError::EmptyPlaylist`] when there is no first entry,
    /// [`StorageError::NotFound`] when `entry` is gone from the playlist,
    /// [`StorageError::AtPlaylistEdge`] when `entry` is the last entry.
    pub async fn next_entry(&self, entry: Option<&EntryToken>) -> Result<PlaylistEntry> {
        let mut tx = self.database.snapshot().await?;
        match entry {
            None => first_entry(&mut tx).await,
            Some(token) => {
                let next_token: Option<Option<String>> =
                    sqlx::query_scalar("SELECT next_token FROM Entry WHERE token = ?")
                        .bind(token.as_str())
                        .fetch_optional(&mut *tx)
                        .await?;
                let next_token = next_token
                    .ok_or_else(|| StorageError::not_found("playlist entry", token.as_str()))?
                    .ok_or_else(|| StorageError::AtPlaylistEdge {
                        token: token.as_str().to_string(),
                        edge: Edge::Last,
                    })?;
                entry_by_token(&mut tx, &next_token).await
            }
        }
    }

    /// The entry before `entry`, or the last entry for `None`.
    ///
    /// Errors mirror [`next_entry`](Playlist::next_entry).
    pub async fn previous_entry(&self, entry: Option<&EntryToken>) -> Result<PlaylistEntry> {
        let mut tx = self.database.snapshot().await?;
        match entry {
            None => {
                let row: Option<(String, String, String)> = sqlx::query_as(
                    "SELECT token, library_token_type, library_token
                     FROM Entry WHERE next_token IS NULL",
                )
                .fetch_optional(&mut *tx)
                .await?;
                row.map_or(Err(StorageError::EmptyPlaylist(Edge::Last)), entry_from_row)
            }
            Some(token) => {
                let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM Entry WHERE token = ?")
                    .bind(token.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
                if exists.is_none() {
                    return Err(StorageError::not_found("playlist entry", token.as_str()));
                }
                let row: Option<(String, String, String)> = sqlx::query_as(
                    "SELECT token, library_token_type, library_token
                     FROM Entry WHERE next_token = ?",
                )
                .bind(token.as_str())
                .fetch_optional(&mut *tx)
                .await?;
                row.map_or(
                    Err(StorageError::AtPlaylistEdge {
                        token: token.as_str().to_string(),
                        edge: Edge::First,
                    }),
                    entry_from_row,
                )
            }
        }
    }

    /// Expands `entry` into its playable units, in play order.
    ///
    /// Verifies the entry is still in the playlist with the same target
    /// before resolving the target against the library.
    pub async fn playable_units(&self, entry: &PlaylistEntry) -> Result<Vec<PlayableUnit>> {
        let stored = {
            let mut tx = self.database.snapshot().await?;
            entry_by_token(&mut tx, entry.token.as_str()).await?
        };
        if stored.library_token != entry.library_token {
            return Err(StorageError::not_found(
                "playlist entry",
                entry.token.as_str(),
            ));
        }

        let tracks = match &entry.library_token {
            LibraryToken::Track(token) => vec![self.library.track(token).await?],
            LibraryToken::Medium(token) => self.library.medium(token).await?.tracks,
            LibraryToken::Album(token) => self
                .library
                .album(token)
                .await?
                .mediums
                .into_iter()
                .flat_map(|medium| medium.tracks)
                .collect(),
        };
        Ok(tracks
            .into_iter()
            .map(|track| PlayableUnit {
                playlist_entry: entry.clone(),
                track,
            })
            .collect())
    }

    /// All entries, first to last.
    pub async fn entries(&self) -> Result<Vec<PlaylistEntry>> {
        let mut tx = self.database.snapshot().await?;
        let rows: Vec<(String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT token, next_token, library_token_type, library_token FROM Entry",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut successors: HashMap<&str, &str> = HashMap::new();
        let mut by_token: HashMap<&str, &(String, Option<String>, String, String)> =
            HashMap::new();
        for row in &rows {
            by_token.insert(row.0.as_str(), row);
            if let Some(next) = &row.1 {
                successors.insert(row.0.as_str(), next.as_str());
            }
        }
        let pointed_at: std::collections::HashSet<&str> =
            successors.values().copied().collect();

        let mut ordered = Vec::with_capacity(rows.len());
        let mut current = rows
            .iter()
            .map(|row| row.0.as_str())
            .find(|token| !pointed_at.contains(token));
        while let Some(token) = current {
            let row = by_token
                .get(token)
                .ok_or_else(|| StorageError::not_found("playlist entry", token))?;
            ordered.push(entry_from_row((row.0.clone(), row.2.clone(), row.3.clone()))?);
            current = successors.get(token).copied();
        }
        Ok(ordered)
    }

    /// Whether the playlist has no entries.
    pub async fn is_empty(&self) -> Result<bool> {
        let mut tx = self.database.snapshot().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Entry")
            .fetch_one(&mut *tx)
            .await?;
        Ok(count == 0)
    }
}

async fn first_entry(tx: &mut Transaction<'static, Sqlite>) -> Result<PlaylistEntry> {
    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT entry.token, entry.library_token_type, entry.library_token
         FROM Entry entry
         LEFT JOIN Entry predecessor ON predecessor.next_token = entry.token
         WHERE predecessor.token IS NULL",
    )
    .fetch_optional(&mut **tx)
    .await?;
    row.map_or(Err(StorageError::EmptyPlaylist(Edge::First)), entry_from_row)
}

async fn entry_by_token(
    tx: &mut Transaction<'static, Sqlite>,
    token: &str,
) -> Result<PlaylistEntry> {
    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT token, library_token_type, library_token FROM Entry WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(&mut **tx)
    .await?;
    row.map_or_else(
        || Err(StorageError::not_found("playlist entry", token)),
        entry_from_row,
    )
}

fn entry_from_row((token, kind, value): (String, String, String)) -> Result<PlaylistEntry> {
    let library_token = LibraryToken::from_kind_and_value(&kind, &value).ok_or_else(|| {
        StorageError::UnknownTokenType {
            token: token.clone(),
            kind,
        }
    })?;
    Ok(PlaylistEntry::with_token(
        EntryToken::new(token),
        library_token,
    ))
}
