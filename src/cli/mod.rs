pub mod branch;
pub mod branches;
pub mod create;
pub mod delete;
pub mod list;
pub mod post;
pub mod show;
pub mod tree;

/// Shorten an id for table display.
pub(crate) fn short(id: &str) -> &str {
    &id[..8.min(id.len())]
}

/// First line of a message body, truncated for table display. Message text
/// is opaque and may be any UTF-8, so the cut lands on a char boundary.
pub(crate) fn preview(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or(text);
    if line.len() > width {
        let mut end = width.saturating_sub(3);
        while end > 0 && !line.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &line[..end])
    } else {
        line.to_string()
    }
}
