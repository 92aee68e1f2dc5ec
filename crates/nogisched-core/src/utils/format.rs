/// Entities decoded after tags are removed, in replacement order.
/// `&nbsp;` goes first so `&amp;nbsp;` decodes to the literal text `&nbsp;`.
const BASIC_ENTITIES: [(&str, &str); 5] = [
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
];

/// Remove every `<...>` tag from `html`, calling `on_tag` with the text
/// between the angle brackets so callers can substitute replacement text.
///
/// A `<` with no closing `>` is kept as literal text.
fn remove_tags(html: &str, mut on_tag: impl FnMut(&str, &mut String)) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            Some(close) => {
                on_tag(&after[..close], &mut out);
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entities(text: String, extra: &[(&str, &str)]) -> String {
    BASIC_ENTITIES
        .iter()
        .chain(extra.iter())
        .fold(text, |acc, (entity, replacement)| acc.replace(entity, replacement))
}

/// Strip markup from a schedule description for searching and export.
pub fn strip_html(html: &str) -> String {
    let text = remove_tags(html, |_, _| {});
    decode_entities(text, &[]).trim().to_string()
}

/// Convert description markup to readable plain text, keeping line breaks
/// for `<br>` and paragraph ends.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = remove_tags(html, |tag, out| {
        let lower = tag.to_ascii_lowercase();
        if is_line_break(&lower) {
            out.push('\n');
        } else if lower == "/p" {
            out.push_str("\n\n");
        }
    });
    decode_entities(text, &[("&#39;", "'")]).trim().to_string()
}

/// Matches `br`, `br/` and `br /` (any whitespace before the slash).
fn is_line_break(tag: &str) -> bool {
    match tag.strip_prefix("br") {
        Some(rest) => {
            let rest = rest.trim_start();
            rest.is_empty() || rest == "/"
        }
        None => false,
    }
}

/// Case-insensitive substring test.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Human-readable age: "just now", "5m ago", "2h ago", "3d ago".
/// Hours and days are rounded to the nearest unit.
pub fn format_age(minutes: i64) -> String {
    if minutes < 1 {
        // Also covers clock skew (negative ages)
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
