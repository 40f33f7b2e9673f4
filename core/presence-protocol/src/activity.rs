//! Presence data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of characters kept in any presence text field.
pub const MAX_TEXT_CHARS: usize = 127;

/// Owned text truncated to [`MAX_TEXT_CHARS`] characters on construction.
///
/// An empty value means "omit this field from the outbound message".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundedText(String);

impl BoundedText {
    pub fn new(value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        match value.char_indices().nth(MAX_TEXT_CHARS) {
            Some((cut, _)) => Self(value[..cut].to_string()),
            None => Self(value.to_string()),
        }
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for BoundedText {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BoundedText {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for BoundedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoundedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for BoundedText {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Snapshot of the activity to broadcast.
///
/// Timestamps are epoch seconds; `0` means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presence {
    pub state: BoundedText,
    pub details: BoundedText,
    pub large_image: BoundedText,
    pub large_text: BoundedText,
    pub small_image: BoundedText,
    pub small_text: BoundedText,
    pub start: i64,
    pub end: i64,
}

impl Presence {
    pub fn has_assets(&self) -> bool {
        !(self.large_image.is_empty()
            && self.large_text.is_empty()
            && self.small_image.is_empty()
            && self.small_text.is_empty())
    }
}
