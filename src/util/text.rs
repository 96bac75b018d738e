//! Truncation helpers for subprocess diagnostics.

/// Return the last `max_chars` characters of `text`, prefixed with an ellipsis
/// marker when anything was dropped.
///
/// Render tooling can emit megabytes of output; error messages and logs carry
/// only the tail, which is where CLIs put the actual failure. Truncation is by
/// character so multi-byte output never splits mid-codepoint.
pub fn tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let skipped = total - max_chars;
    let kept: String = text.chars().skip(skipped).collect();
    format!("… {kept}")
}
