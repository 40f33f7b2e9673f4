//! "Now playing" JSON file written by the media player.
//!
//! ```json
//! {"title": "Song", "artist": "Artist", "album": "Album",
//!  "position_secs": 12.5, "duration_secs": 200.0, "paused": false, "video": false}
//! ```
//!
//! A missing or empty file means nothing is loaded.

use fs_err as fs;
use presence_core::{MediaMetadata, MetadataProvider};
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NowPlaying {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    position_secs: f64,
    duration_secs: Option<f64>,
    paused: bool,
    video: bool,
}

impl NowPlaying {
    fn into_metadata(self, now_epoch: i64) -> MediaMetadata {
        MediaMetadata::from_playback(
            self.title.as_deref(),
            self.artist.as_deref(),
            self.album.as_deref(),
            seconds(self.position_secs).unwrap_or_default(),
            self.duration_secs.and_then(seconds),
            now_epoch,
            self.paused,
            self.video,
        )
    }
}

/// Negative, NaN, and infinite values are treated as absent.
fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

#[derive(Debug, Clone)]
pub struct NowPlayingFile {
    path: PathBuf,
}

impl NowPlayingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self, now_epoch: i64) -> Option<MediaMetadata> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::debug!(error = %err, "Failed to read now-playing file");
                return None;
            }
        };
        if content.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<NowPlaying>(&content) {
            Ok(now_playing) => Some(now_playing.into_metadata(now_epoch)),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "Ignoring malformed now-playing file"
                );
                None
            }
        }
    }
}

impl MetadataProvider for NowPlayingFile {
    fn current_metadata(&self) -> Option<MediaMetadata> {
        self.read(chrono::Utc::now().timestamp())
    }
}
