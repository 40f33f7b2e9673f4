//! Media metadata consumed from the host player.
//!
//! This is the boundary where external text enters the crate, so every string
//! is cut down to [`presence_protocol::MAX_TEXT_CHARS`] here.

use presence_protocol::BoundedText;
use std::time::Duration;

/// Title used when the player exposes neither a title tag nor an item name.
pub const FALLBACK_TITLE: &str = "VLC Media Player";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaMetadata {
    pub title: BoundedText,
    pub artist: BoundedText,
    pub album: BoundedText,
    pub is_video: bool,
    pub is_paused: bool,
    /// True whenever an item is loaded, paused or not.
    pub is_playing: bool,
    /// Epoch seconds at which playback would have started given the current
    /// position.
    pub start: i64,
    /// Epoch seconds at which playback will end; `0` when the length is
    /// unknown.
    pub end: i64,
}

impl MediaMetadata {
    /// Builds metadata for a loaded item from its playback position.
    ///
    /// `start = now - position` and `end = start + duration`, with `end` left
    /// at `0` when the duration is unknown, zero, or out of range. `start`
    /// never goes below `0`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_playback(
        title: Option<&str>,
        artist: Option<&str>,
        album: Option<&str>,
        position: Duration,
        duration: Option<Duration>,
        now_epoch: i64,
        paused: bool,
        is_video: bool,
    ) -> Self {
        let title = title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(FALLBACK_TITLE);
        let position = i64::try_from(position.as_secs()).unwrap_or(i64::MAX);
        let start = now_epoch.saturating_sub(position).max(0);
        let end = duration
            .filter(|length| !length.is_zero())
            .and_then(|length| i64::try_from(length.as_secs()).ok())
            .and_then(|length| start.checked_add(length))
            .unwrap_or(0);

        Self {
            title: BoundedText::new(title),
            artist: BoundedText::new(artist.unwrap_or_default()),
            album: BoundedText::new(album.unwrap_or_default()),
            is_video,
            is_paused: paused,
            is_playing: true,
            start,
            end,
        }
    }
}

/// Source of the currently playing item. `None` means nothing is loaded.
pub trait MetadataProvider: Send {
    fn current_metadata(&self) -> Option<MediaMetadata>;
}

/// Provider that never reports active media.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMedia;

impl MetadataProvider for NoMedia {
    fn current_metadata(&self) -> Option<MediaMetadata> {
        None
    }
}

impl<F> MetadataProvider for F
where
    F: Fn() -> Option<MediaMetadata> + Send,
{
    fn current_metadata(&self) -> Option<MediaMetadata> {
        self()
    }
}
