//! Note merging and outbound truncation
//!
//! External notes are appended to the local note under a bracketed
//! provenance tag. Merging the same content twice is a no-op, so passes
//! stay idempotent.

/// Marker appended when an outbound note is cut at the remote limit
const TRUNCATION_MARKER: &str = "… [truncated; full note in BlackBook]";

/// The provenance tag for notes merged from the given account
#[must_use]
pub fn provenance_tag(source: &str) -> String {
    format!("[From {source}]")
}

/// Merge an external note into the local note.
///
/// Returns the merged text, or `None` when nothing changes: the external
/// note is empty, equals the local note, or was already merged under the
/// same tag.
#[must_use]
pub fn merge_external_note(local: &str, external: &str, source: &str) -> Option<String> {
    let external = external.trim();
    if external.is_empty() {
        return None;
    }

    let local_trimmed = local.trim();
    if local_trimmed.is_empty() {
        return Some(external.to_string());
    }
    if local_trimmed == external {
        return None;
    }

    let block = format!("{} {external}", provenance_tag(source));
    if local.contains(&block) {
        return None;
    }

    Some(format!("{local_trimmed}\n\n{block}"))
}

/// Truncate an outbound note to the remote system's hard limit,
/// replacing the tail with a marker pointing back to the full record.
///
/// Counts characters, not bytes, so multi-byte text never splits.
#[must_use]
pub fn truncate_for_remote(note: &str, limit: usize) -> String {
    let length = note.chars().count();
    if length <= limit {
        return note.to_string();
    }

    let marker_length = TRUNCATION_MARKER.chars().count();
    let keep = limit.saturating_sub(marker_length);
    let mut out: String = note.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
