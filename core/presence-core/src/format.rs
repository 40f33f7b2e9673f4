//! Turns host metadata into the presence shown by the peer.

use presence_protocol::{BoundedText, Presence};

use crate::metadata::MediaMetadata;
use crate::settings::Settings;

pub const LARGE_IMAGE_DEFAULT: &str = "large_image_default";
pub const LARGE_TEXT_DEFAULT: &str = "VLC Media Player";
pub const SMALL_IMAGE_PLAY: &str = "play";
pub const SMALL_IMAGE_PAUSE: &str = "pause";
pub const SMALL_TEXT_PLAYING: &str = "Playing";
pub const SMALL_TEXT_PAUSED: &str = "Paused";
pub const IDLE_DETAILS: &str = "Idling";

/// Builds a fresh presence from the current metadata.
///
/// - No active media: idle details with the default large image, nothing else.
/// - Paused: pause badge, no timestamps (remaining time is meaningless).
/// - Playing: play badge, timestamps from the metadata, and a state line made
///   of artist and/or album as allowed by the settings.
pub fn format_presence(metadata: Option<&MediaMetadata>, settings: &Settings) -> Presence {
    let mut presence = Presence {
        large_image: LARGE_IMAGE_DEFAULT.into(),
        large_text: LARGE_TEXT_DEFAULT.into(),
        ..Presence::default()
    };

    let metadata = match metadata.filter(|m| m.is_playing) {
        Some(metadata) => metadata,
        None => {
            presence.details = IDLE_DETAILS.into();
            return presence;
        }
    };

    if metadata.is_paused {
        presence.small_image = SMALL_IMAGE_PAUSE.into();
        presence.small_text = SMALL_TEXT_PAUSED.into();
    } else {
        presence.small_image = SMALL_IMAGE_PLAY.into();
        presence.small_text = SMALL_TEXT_PLAYING.into();
        presence.start = metadata.start;
        presence.end = metadata.end;
    }

    presence.state = state_line(metadata, settings);
    presence.details = metadata.title.clone();
    presence
}

fn state_line(metadata: &MediaMetadata, settings: &Settings) -> BoundedText {
    let artist = Some(metadata.artist.as_str()).filter(|a| settings.show_artist && !a.is_empty());
    let album = Some(metadata.album.as_str()).filter(|a| settings.show_album && !a.is_empty());

    match (artist, album) {
        (Some(artist), Some(album)) => BoundedText::new(format!("{} - {}", artist, album)),
        (Some(only), None) | (None, Some(only)) => BoundedText::new(only),
        (None, None) => BoundedText::empty(),
    }
}
