//! Address lists from plain text or CSV exports.

/// First column of every non-blank line, unquoted. A header cell without an
/// `@` is passed through like any other and rejected by validation.
pub fn candidates(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .filter_map(|line| line.split([',', ';', '\t']).next())
        .map(|cell| cell.trim().trim_matches('"').trim())
        .filter(|cell| !cell.is_empty())
}
