//! Pure trigger-phrase matching over recognizer transcripts.
//!
//! Matching is case-insensitive substring search with no word-boundary
//! requirement, which tolerates recognizers that merge adjacent words.
//! Triggers are scanned in configured order; empty or whitespace-only
//! entries are skipped.

/// Returns true when `text` contains any configured trigger phrase.
///
/// Empty `text` never matches. Each trigger is trimmed before comparison.
pub fn matches(text: &str, triggers: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }
    triggers
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .any(|t| find_match_end(text, t).is_some())
}

/// Returns the original-case text strictly after the first matching trigger,
/// trimmed of surrounding whitespace.
///
/// When no trigger is found the input is returned unchanged. This is also the
/// path taken while mid-capture, where the transcript no longer contains the
/// trigger but trimming is reapplied on every update.
pub fn trim_after_trigger<'a>(text: &'a str, triggers: &[String]) -> &'a str {
    for trig in triggers.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if let Some(end) = find_match_end(text, trig) {
            return text[end..].trim();
        }
    }
    text
}

/// Case-insensitive scan for `trigger` inside `text`.
///
/// Returns the byte offset in `text` just past the end of the first match.
/// Walks char boundaries of the original string rather than indexing into a
/// `to_lowercase()` copy, since case mapping can change byte lengths.
fn find_match_end(text: &str, trigger: &str) -> Option<usize> {
    let wanted: Vec<char> = trigger.chars().flat_map(char::to_lowercase).collect();
    if wanted.is_empty() {
        return None;
    }
    for (start, _) in text.char_indices() {
        let mut matched = 0;
        for (offset, ch) in text[start..].char_indices() {
            let mut ok = true;
            for folded in ch.to_lowercase() {
                if matched >= wanted.len() || wanted[matched] != folded {
                    ok = false;
                    break;
                }
                matched += 1;
            }
            if !ok {
                break;
            }
            if matched == wanted.len() {
                return Some(start + offset + ch.len_utf8());
            }
        }
    }
    None
}
