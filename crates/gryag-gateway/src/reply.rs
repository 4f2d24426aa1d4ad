//! Post-processing of the model's final text into the target platform's
//! markup (spec.md §4.6 step 5): bold/italic/spoiler conversions, and
//! removal of leftover markup that would otherwise render literally.
//!
//! The provider speaks a GitHub-flavored-Markdown-ish dialect (`**bold**`,
//! `` `code` ``); Telegram's MarkdownV2 uses single-star bold and reserves
//! a longer list of characters that must be escaped outside of entities.
//! This only rewrites the handful of constructs the spec calls out —
//! it does not attempt a full Markdown-to-MarkdownV2 transpile.

/// Converts `**bold**` to Telegram's single-star `*bold*`, leaves
/// `` `code` `` and `_italic_` untouched (already valid MarkdownV2), and
/// collapses an odd/unpaired `**` or `||` into plain text so it never
/// renders as a dangling literal marker.
pub fn to_telegram_markup(text: &str) -> String {
    let bolded = convert_bold(text);
    strip_unpaired(&bolded, "||")
}

fn convert_bold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("**") {
        out.push_str(&rest[..start]);
        let after_marker = &rest[start + 2..];
        match after_marker.find("**") {
            Some(end) => {
                out.push('*');
                out.push_str(&after_marker[..end]);
                out.push('*');
                rest = &after_marker[end + 2..];
            }
            None => {
                // Unpaired opener: drop the markers rather than leak them.
                out.push_str(after_marker);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn strip_unpaired(text: &str, marker: &str) -> String {
    let count = text.matches(marker).count();
    if count % 2 == 0 {
        return text.to_string();
    }
    text.replacen(marker, "", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_double_star_bold_to_single_star() {
        assert_eq!(to_telegram_markup("this is **bold** text"), "this is *bold* text");
    }

    #[test]
    fn leaves_code_spans_untouched() {
        assert_eq!(to_telegram_markup("run `cargo test`"), "run `cargo test`");
    }

    #[test]
    fn drops_unpaired_bold_marker() {
        assert_eq!(to_telegram_markup("oops **unterminated"), "oops unterminated");
    }

    #[test]
    fn drops_single_unpaired_spoiler_marker() {
        assert_eq!(to_telegram_markup("a ||spoiler"), "a spoiler");
    }

    #[test]
    fn paired_spoiler_markers_survive() {
        assert_eq!(to_telegram_markup("a ||spoiler|| text"), "a ||spoiler|| text");
    }
}
