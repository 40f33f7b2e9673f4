//! Builders for the outbound message bodies.
//!
//! Only the handshake and the `SET_ACTIVITY` command (set and clear) are
//! needed by this client.

use rand::Rng;
use serde::Serialize;

use crate::activity::Presence;
use crate::frame::{Frame, Opcode};
use crate::ProtocolError;

pub const HANDSHAKE_VERSION: u32 = 1;
pub const SET_ACTIVITY: &str = "SET_ACTIVITY";

#[derive(Serialize)]
struct Handshake {
    v: u32,
    client_id: String,
}

#[derive(Serialize)]
struct CommandEnvelope<'a> {
    cmd: &'static str,
    args: ActivityArgs<'a>,
    nonce: &'a str,
}

#[derive(Serialize)]
struct ActivityArgs<'a> {
    pid: u64,
    // `None` serialises as `null`, which is how an activity is cleared.
    activity: Option<ActivityBody<'a>>,
}

#[derive(Serialize)]
struct ActivityBody<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    state: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    details: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamps: Option<Timestamps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assets: Option<Assets<'a>>,
}

#[derive(Serialize)]
struct Timestamps {
    start: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<i64>,
}

#[derive(Serialize)]
struct Assets<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    large_image: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    large_text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    small_image: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    small_text: &'a str,
}

impl<'a> From<&'a Presence> for ActivityBody<'a> {
    fn from(presence: &'a Presence) -> Self {
        let timestamps = (presence.start > 0).then(|| Timestamps {
            start: presence.start,
            end: (presence.end > 0).then_some(presence.end),
        });
        let assets = presence.has_assets().then(|| Assets {
            large_image: presence.large_image.as_str(),
            large_text: presence.large_text.as_str(),
            small_image: presence.small_image.as_str(),
            small_text: presence.small_text.as_str(),
        });

        Self {
            state: presence.state.as_str(),
            details: presence.details.as_str(),
            timestamps,
            assets,
        }
    }
}

/// Random six-digit nonce. The peer echoes it back; it is never used to match
/// responses.
pub fn generate_nonce() -> String {
    rand::thread_rng().gen_range(100_000u32..=999_999).to_string()
}

/// `{"v":1,"client_id":"<app id>"}` framed with the handshake opcode.
pub fn build_handshake(app_id: u64) -> Result<Frame, ProtocolError> {
    let body = serde_json::to_string(&Handshake {
        v: HANDSHAKE_VERSION,
        client_id: app_id.to_string(),
    })?;
    Frame::new(Opcode::Handshake, body)
}

/// `SET_ACTIVITY` carrying only the non-empty fields of `presence`.
pub fn build_set_activity(
    pid: u64,
    presence: &Presence,
    nonce: &str,
) -> Result<Frame, ProtocolError> {
    command_frame(pid, Some(ActivityBody::from(presence)), nonce)
}

/// `SET_ACTIVITY` with `"activity":null`.
pub fn build_clear_activity(pid: u64, nonce: &str) -> Result<Frame, ProtocolError> {
    command_frame(pid, None, nonce)
}

fn command_frame(
    pid: u64,
    activity: Option<ActivityBody<'_>>,
    nonce: &str,
) -> Result<Frame, ProtocolError> {
    let body = serde_json::to_string(&CommandEnvelope {
        cmd: SET_ACTIVITY,
        args: ActivityArgs { pid, activity },
        nonce,
    })?;
    Ok(Frame::new(Opcode::Frame, body)?.with_nonce(nonce))
}
