/// Shorten `html` to at most `max_bytes` bytes without splitting a UTF-8
/// character.
///
/// Returns the stored value and whether it is strictly shorter than the
/// input. No marker is appended, so the result never exceeds the cap.
pub fn truncate(html: &str, max_bytes: usize) -> (String, bool) {
    if html.len() <= max_bytes {
        return (html.to_string(), false);
    }

    let mut end = max_bytes;
    while end > 0 && !html.is_char_boundary(end) {
        end -= 1;
    }

    (html[..end].to_string(), true)
}
