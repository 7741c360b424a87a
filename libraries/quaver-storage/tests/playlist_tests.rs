//! Integration tests for the playlist store, against real SQLite files.

use std::sync::{Arc, Mutex};

use quaver_bus::PubSub;
use quaver_core::{EntryToken, LibraryToken, PlaylistEntry, ScannedFile, Tags, Track, TrackToken};
use quaver_storage::{Edge, Library, Playlist, PlaylistUpdate, StorageError};

fn audio(filename: &str, album: &str, disc: &str, number: &str) -> ScannedFile {
    ScannedFile::Audio {
        dirname: "/music".to_string(),
        filename: filename.to_string(),
        tags: Tags::new([
            ("~filename", vec![format!("/music/{filename}")]),
            ("~dirname", vec!["/music".to_string()]),
            ("~basename", vec![filename.to_string()]),
            ("album", vec![album.to_string()]),
            ("discnumber", vec![disc.to_string()]),
            ("tracknumber", vec![number.to_string()]),
        ]),
    }
}

fn track_of(file: &ScannedFile) -> Track {
    match file {
        ScannedFile::Audio { tags, .. } => Track::new(tags.clone()),
        ScannedFile::File { .. } => panic!("not an audio file"),
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    playlist: Playlist,
    bus: PubSub,
    files: Vec<ScannedFile>,
}

/// Two-disc album: d1t1, d1t2, d2t1.
async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let bus = PubSub::new();
    let library = Library::open(dir.path()).await.expect("Failed to open library");
    let files = vec![
        audio("d1t1.flac", "Album", "1", "1"),
        audio("d1t2.flac", "Album", "1", "2"),
        audio("d2t1.flac", "Album", "2", "1"),
    ];
    library.insert_files(&files).await.unwrap();
    let playlist = Playlist::open(dir.path(), library, bus.clone())
        .await
        .expect("Failed to open playlist");
    Fixture {
        _dir: dir,
        playlist,
        bus,
        files,
    }
}

#[tokio::test]
async fn append_links_entries_in_order() {
    let fx = fixture().await;
    assert!(fx.playlist.is_empty().await.unwrap());

    let mut appended = Vec::new();
    for file in &fx.files {
        let token = LibraryToken::from(track_of(file).token);
        appended.push(fx.playlist.append(token).await.unwrap());
    }

    assert!(!fx.playlist.is_empty().await.unwrap());
    assert_eq!(fx.playlist.entries().await.unwrap(), appended);
}

#[tokio::test]
async fn navigation_walks_the_list_both_ways() {
    let fx = fixture().await;
    let mut appended = Vec::new();
    for file in &fx.files {
        let token = LibraryToken::from(track_of(file).token);
        appended.push(fx.playlist.append(token).await.unwrap());
    }

    let first = fx.playlist.next_entry(None).await.unwrap();
    assert_eq!(first, appended[0]);
    let second = fx.playlist.next_entry(Some(&first.token)).await.unwrap();
    assert_eq!(second, appended[1]);
    let last = fx.playlist.previous_entry(None).await.unwrap();
    assert_eq!(last, appended[2]);
    assert_eq!(
        fx.playlist.previous_entry(Some(&last.token)).await.unwrap(),
        appended[1]
    );
}

#[tokio::test]
async fn navigation_reports_edges_and_emptiness() {
    let fx = fixture().await;
    assert!(matches!(
        fx.playlist.next_entry(None).await.unwrap_err(),
        StorageError::EmptyPlaylist(Edge::First)
    ));
    assert!(matches!(
        fx.playlist.previous_entry(None).await.unwrap_err(),
        StorageError::EmptyPlaylist(Edge::Last)
    ));

    let only = fx
        .playlist
        .append(LibraryToken::from(track_of(&fx.files[0]).token))
        .await
        .unwrap();
    assert!(matches!(
        fx.playlist.next_entry(Some(&only.token)).await.unwrap_err(),
        StorageError::AtPlaylistEdge { edge: Edge::Last, .. }
    ));
    assert!(matches!(
        fx.playlist
            .previous_entry(Some(&only.token))
            .await
            .unwrap_err(),
        StorageError::AtPlaylistEdge { edge: Edge::First, .. }
    ));

    let bogus = EntryToken::generate();
    assert!(matches!(
        fx.playlist.next_entry(Some(&bogus)).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
}

#[tokio::test]
async fn track_entry_expands_to_one_unit() {
    let fx = fixture().await;
    let track = track_of(&fx.files[0]);
    let entry = fx
        .playlist
        .append(LibraryToken::from(track.token.clone()))
        .await
        .unwrap();

    let units = fx.playlist.playable_units(&entry).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].playlist_entry, entry);
    assert_eq!(units[0].track.token, track.token);
}

#[tokio::test]
async fn medium_entry_expands_in_track_order() {
    let fx = fixture().await;
    let entry = fx
        .playlist
        .append(LibraryToken::from(track_of(&fx.files[0]).medium_token))
        .await
        .unwrap();

    let units = fx.playlist.playable_units(&entry).await.unwrap();
    let basenames: Vec<_> = units
        .iter()
        .map(|unit| unit.track.tags.get("~basename")[0].as_str())
        .collect();
    assert_eq!(basenames, ["d1t1.flac", "d1t2.flac"]);
}

#[tokio::test]
async fn album_entry_flattens_across_mediums() {
    let fx = fixture().await;
    let entry = fx
        .playlist
        .append(LibraryToken::from(track_of(&fx.files[0]).album_token))
        .await
        .unwrap();

    let units = fx.playlist.playable_units(&entry).await.unwrap();
    let basenames: Vec<_> = units
        .iter()
        .map(|unit| unit.track.tags.get("~basename")[0].as_str())
        .collect();
    assert_eq!(basenames, ["d1t1.flac", "d1t2.flac", "d2t1.flac"]);
    assert!(units.iter().all(|unit| unit.playlist_entry == entry));
}

#[tokio::test]
async fn stale_entry_is_not_expanded() {
    let fx = fixture().await;
    let real = fx
        .playlist
        .append(LibraryToken::from(track_of(&fx.files[0]).token))
        .await
        .unwrap();

    // Same token, different remembered target.
    let stale = PlaylistEntry::with_token(
        real.token.clone(),
        LibraryToken::from(TrackToken::new("track/v1:other")),
    );
    assert!(matches!(
        fx.playlist.playable_units(&stale).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));

    let never_appended = PlaylistEntry::new(LibraryToken::from(track_of(&fx.files[0]).token));
    assert!(matches!(
        fx.playlist.playable_units(&never_appended).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
}

#[tokio::test]
async fn entry_for_missing_library_entity_is_not_found() {
    let fx = fixture().await;
    let entry = fx
        .playlist
        .append(LibraryToken::from(TrackToken::new("track/v1:ghost")))
        .await
        .unwrap();
    assert!(matches!(
        fx.playlist.playable_units(&entry).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
}

#[tokio::test]
async fn append_publishes_playlist_update() {
    let fx = fixture().await;
    let updates = Arc::new(Mutex::new(0_u32));
    let sink = Arc::clone(&updates);
    fx.bus
        .subscribe(move |_: &PlaylistUpdate| *sink.lock().unwrap() += 1, false);

    fx.playlist
        .append(LibraryToken::from(track_of(&fx.files[0]).token))
        .await
        .unwrap();
    fx.bus.join().await;
    assert_eq!(*updates.lock().unwrap(), 1);
}
