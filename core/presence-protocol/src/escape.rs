use std::fmt::Write;

/// Escapes `input` for embedding inside a JSON string literal.
///
/// `"` and `\` are backslash-escaped and control characters use their JSON
/// escapes. Output never exceeds `capacity - 1` bytes, leaving room for a
/// terminator. Truncation happens on whole characters, so an escape sequence or
/// multi-byte character is never split and the result is always a valid (if
/// shortened) string body.
pub fn escape_json_string(input: &str, capacity: usize) -> String {
    let limit = capacity.saturating_sub(1);
    let mut out = String::with_capacity(limit.min(input.len() * 2));
    let mut piece = String::with_capacity(6);

    for ch in input.chars() {
        piece.clear();
        match ch {
            '"' => piece.push_str("\\\""),
            '\\' => piece.push_str("\\\\"),
            '\n' => piece.push_str("\\n"),
            '\r' => piece.push_str("\\r"),
            '\t' => piece.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(piece, "\\u{:04x}", c as u32);
            }
            c => piece.push(c),
        }

        if out.len() + piece.len() > limit {
            break;
        }
        out.push_str(&piece);
    }

    out
}
