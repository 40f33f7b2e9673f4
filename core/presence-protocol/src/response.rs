//! Classification of response bodies returned by the peer.
//!
//! Matching is substring based. Responses are small and only a handful of
//! shapes matter, so the three success markers are checked literally.

const READY_MARKER: &str = r#""evt":"READY""#;
const ACTIVITY_MARKER: &str = r#""cmd":"SET_ACTIVITY""#;
const OK_CODE_MARKER: &str = r#""code":0"#;
const MESSAGE_KEY: &str = r#""message":""#;

pub const UNKNOWN_ERROR: &str = "Unknown Discord error occurred.";
pub const UNRECOGNIZED_RESPONSE: &str = "Unrecognized Discord response or protocol error.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Ready,
    ActivityAck,
    GenericOk,
    Error(String),
}

impl ResponseKind {
    pub fn is_success(&self) -> bool {
        !matches!(self, ResponseKind::Error(_))
    }
}

pub fn classify_response(body: &str) -> ResponseKind {
    if body.contains(READY_MARKER) {
        return ResponseKind::Ready;
    }
    if body.contains(ACTIVITY_MARKER) {
        return ResponseKind::ActivityAck;
    }
    if body.contains(OK_CODE_MARKER) {
        return ResponseKind::GenericOk;
    }

    let message = match body.find(MESSAGE_KEY) {
        Some(pos) => {
            let rest = &body[pos + MESSAGE_KEY.len()..];
            match rest.find('"') {
                Some(end) => rest[..end].to_string(),
                None => UNKNOWN_ERROR.to_string(),
            }
        }
        None => UNRECOGNIZED_RESPONSE.to_string(),
    };
    ResponseKind::Error(message)
}
