//! The library store.
//!
//! Persists scan records and answers entity lookups. Rows only ever store a
//! file's tags plus the derived tokens and sort keys; full [`Track`] /
//! [`Medium`] / [`Album`] values are rebuilt from tags at fetch time, so the
//! store never holds denormalized entity state that could drift.

use std::path::Path;

use sqlx::{QueryBuilder, Sqlite};

use quaver_core::{
    compose, Album, AlbumToken, LibraryToken, Medium, MediumToken, ScannedFile, Tags, Track,
    TrackToken,
};

use crate::database::{Database, Schema};
use crate::error::{Result, StorageError};

const SCHEMA: Schema = Schema {
    name: "library",
    version: "v1",
    create: &[
        "CREATE TABLE File (
            id INTEGER PRIMARY KEY,
            dirname TEXT NOT NULL,
            filename TEXT NOT NULL,
            UNIQUE (dirname, filename)
        )",
        "CREATE TABLE AudioFile (
            file_id INTEGER PRIMARY KEY REFERENCES File (id) ON DELETE CASCADE,
            token TEXT NOT NULL UNIQUE,
            medium_token TEXT NOT NULL,
            album_token TEXT NOT NULL,
            sort_key BLOB NOT NULL,
            medium_sort_key BLOB NOT NULL
        )",
        "CREATE INDEX AudioFile_mediumTokenIndex ON AudioFile (medium_token)",
        "CREATE INDEX AudioFile_albumTokenIndex ON AudioFile (album_token)",
        "CREATE TABLE AudioFileTag (
            file_id INTEGER NOT NULL REFERENCES File (id) ON DELETE CASCADE,
            tag_name TEXT NOT NULL,
            tag_value TEXT NOT NULL
        )",
        "CREATE INDEX AudioFileTag_fileIndex ON AudioFileTag (file_id)",
        "CREATE INDEX AudioFileTag_valueIndex ON AudioFileTag (tag_name, tag_value)",
    ],
    drop: &[
        "DROP TABLE IF EXISTS AudioFileTag",
        "DROP TABLE IF EXISTS AudioFile",
        "DROP TABLE IF EXISTS File",
    ],
};

/// The library store.
#[derive(Debug, Clone)]
pub struct Library {
    database: Database,
}

impl Library {
    /// Opens the library store under `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            database: Database::open(SCHEMA, dir).await?,
        })
    }

    /// Discards the whole library, e.g. before a full rescan.
    pub async fn reset(&self) -> Result<()> {
        self.database.reset().await
    }

    /// Inserts a batch of scan records atomically.
    ///
    /// Audio records also get their derived tokens, sort keys, and tag rows.
    /// A record for an already-known (dirname, filename) fails the whole
    /// batch with [`StorageError::DuplicateFile`] and inserts nothing.
    pub async fn insert_files(&self, files: &[ScannedFile]) -> Result<()> {
        let mut tx = self.database.transaction().await?;
        for file in files {
            let file_id = insert_file_row(&mut tx, file.dirname(), file.filename()).await?;
            if let ScannedFile::Audio { tags, .. } = file {
                insert_audio_rows(&mut tx, file_id, tags).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// All track, medium, and album tokens in the library, deduplicated.
    pub async fn tokens(&self) -> Result<Vec<LibraryToken>> {
        let mut tx = self.database.snapshot().await?;
        let tracks: Vec<String> = sqlx::query_scalar("SELECT token FROM AudioFile")
            .fetch_all(&mut *tx)
            .await?;
        let mediums: Vec<String> = sqlx::query_scalar("SELECT DISTINCT medium_token FROM AudioFile")
            .fetch_all(&mut *tx)
            .await?;
        let albums: Vec<String> = sqlx::query_scalar("SELECT DISTINCT album_token FROM AudioFile")
            .fetch_all(&mut *tx)
            .await?;

        let mut tokens: Vec<LibraryToken> = Vec::with_capacity(
            tracks.len() + mediums.len() + albums.len(),
        );
        tokens.extend(tracks.into_iter().map(|t| TrackToken::new(t).into()));
        tokens.extend(mediums.into_iter().map(|t| MediumToken::new(t).into()));
        tokens.extend(albums.into_iter().map(|t| AlbumToken::new(t).into()));
        Ok(tokens)
    }

    /// The track identified by `token`.
    pub async fn track(&self, token: &TrackToken) -> Result<Track> {
        let mut tx = self.database.snapshot().await?;
        track_in(&mut tx, token).await
    }

    /// The medium identified by `token`, tracks in play order.
    pub async fn medium(&self, token: &MediumToken) -> Result<Medium> {
        let mut tx = self.database.snapshot().await?;
        medium_in(&mut tx, token).await
    }

    /// The album identified by `token`, mediums and tracks in play order.
    pub async fn album(&self, token: &AlbumToken) -> Result<Album> {
        let mut tx = self.database.snapshot().await?;
        let file_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT file_id FROM AudioFile
             WHERE album_token = ?
             ORDER BY medium_sort_key, sort_key",
        )
        .bind(token.as_str())
        .fetch_all(&mut *tx)
        .await?;
        if file_ids.is_empty() {
            return Err(StorageError::not_found("album", token.as_str()));
        }

        let mut mediums: Vec<Medium> = Vec::new();
        let mut group: Vec<Track> = Vec::new();
        let mut all_tags: Vec<Tags> = Vec::new();
        for file_id in file_ids {
            let track = Track::new(load_tags(&mut tx, file_id).await?);
            all_tags.push(track.tags.clone());
            if let Some(previous) = group.last() {
                if previous.medium_token != track.medium_token {
                    mediums.push(build_medium(std::mem::take(&mut group))?);
                }
            }
            group.push(track);
        }
        mediums.push(build_medium(group)?);

        let tags = compose(&all_tags);
        Ok(Album::new(tags, mediums)?)
    }
}

async fn insert_file_row(
    tx: &mut sqlx::Transaction<'static, Sqlite>,
    dirname: &str,
    filename: &str,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO File (dirname, filename) VALUES (?, ?)")
        .bind(dirname)
        .bind(filename)
        .execute(&mut **tx)
        .await;
    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(StorageError::DuplicateFile {
                dirname: dirname.to_string(),
                filename: filename.to_string(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

async fn insert_audio_rows(
    tx: &mut sqlx::Transaction<'static, Sqlite>,
    file_id: i64,
    tags: &Tags,
) -> Result<()> {
    let track = Track::new(tags.clone());
    sqlx::query(
        "INSERT INTO AudioFile
             (file_id, token, medium_token, album_token, sort_key, medium_sort_key)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(file_id)
    .bind(track.token.as_str())
    .bind(track.medium_token.as_str())
    .bind(track.album_token.as_str())
    .bind(track.sort_key.as_bytes())
    .bind(track.medium_sort_key.as_bytes())
    .execute(&mut **tx)
    .await?;

    if track.tags.is_empty() {
        return Ok(());
    }
    let pairs = track
        .tags
        .iter()
        .flat_map(|(name, values)| values.iter().map(move |value| (name, value)));
    let mut builder: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("INSERT INTO AudioFileTag (file_id, tag_name, tag_value) ");
    builder.push_values(pairs, |mut row, (name, value)| {
        row.push_bind(file_id)
            .push_bind(name.to_string())
            .push_bind(value.clone());
    });
    builder.build().execute(&mut **tx).await?;
    Ok(())
}

async fn load_tags(
    tx: &mut sqlx::Transaction<'static, Sqlite>,
    file_id: i64,
) -> Result<Tags> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT tag_name, tag_value FROM AudioFileTag WHERE file_id = ? ORDER BY rowid",
    )
    .bind(file_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(Tags::new(rows.into_iter().map(|(name, value)| (name, [value]))))
}

async fn track_in(
    tx: &mut sqlx::Transaction<'static, Sqlite>,
    token: &TrackToken,
) -> Result<Track> {
    let file_id: Option<i64> = sqlx::query_scalar("SELECT file_id FROM AudioFile WHERE token = ?")
        .bind(token.as_str())
        .fetch_optional(&mut **tx)
        .await?;
    let file_id = file_id.ok_or_else(|| StorageError::not_found("track", token.as_str()))?;
    Ok(Track::new(load_tags(tx, file_id).await?))
}

async fn medium_in(
    tx: &mut sqlx::Transaction<'static, Sqlite>,
    token: &MediumToken,
) -> Result<Medium> {
    let file_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT file_id FROM AudioFile WHERE medium_token = ? ORDER BY sort_key",
    )
    .bind(token.as_str())
    .fetch_all(&mut **tx)
    .await?;
    if file_ids.is_empty() {
        return Err(StorageError::not_found("medium", token.as_str()));
    }
    let mut tracks = Vec::with_capacity(file_ids.len());
    for file_id in file_ids {
        tracks.push(Track::new(load_tags(tx, file_id).await?));
    }
    Ok(build_medium(tracks)?)
}

fn build_medium(tracks: Vec<Track>) -> quaver_core::Result<Medium> {
    let tags = compose(tracks.iter().map(|track| &track.tags));
    Medium::new(tags, tracks)
}
