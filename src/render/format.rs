//! Key-points bullet formatting.

const BULLET: &str = "• ";

/// Turn model-style `*` bullets into `•` bullets on their own paragraphs.
///
/// A leading `*` (plus one optional whitespace char) becomes `• `; every
/// whitespace-`*`-whitespace run becomes a blank line and `• `.  Applying it
/// twice gives the same text as applying it once.
///
/// ```
/// use page_summarizer::render::format_key_points;
///
/// let raw = "* First point * Second point";
/// assert_eq!(format_key_points(raw), "• First point\n\n• Second point");
/// ```
pub fn format_key_points(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = format_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn format_pass(text: &str) -> String {
    let rest = match text.strip_prefix('*') {
        Some(after) => {
            let mut chars = after.chars();
            match chars.next() {
                Some(c) if c.is_whitespace() => chars.as_str(),
                _ => after,
            }
        }
        None => text,
    };

    let mut out = String::with_capacity(text.len() + 8);
    if rest.len() != text.len() {
        out.push_str(BULLET);
    }

    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let inline_bullet = chars[i].is_whitespace()
            && chars.get(i + 1) == Some(&'*')
            && chars.get(i + 2).is_some_and(|c| c.is_whitespace());
        if inline_bullet {
            out.push_str("\n\n");
            out.push_str(BULLET);
            i += 3;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
