use std::sync::LazyLock;

use regex::Regex;

static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z][A-Za-z0-9]*(?:\s[^<>]*)?/?>").expect("valid regex")
});

/// Single-character glyphs the chat transport treats as markup.
const MARKUP_GLYPHS: [char; 4] = ['*', '_', '~', '`'];

/// Strips markup tags and collapses runs of a repeated markup glyph to one,
/// so "**bold**" renders as "*bold*" instead of breaking the transport.
pub fn sanitize_for_transport(text: &str) -> String {
    let stripped = MARKUP_TAG.replace_all(text, "");

    let mut output = String::with_capacity(stripped.len());
    let mut previous: Option<char> = None;
    for character in stripped.chars() {
        if MARKUP_GLYPHS.contains(&character) && previous == Some(character) {
            continue;
        }
        output.push(character);
        previous = Some(character);
    }

    output.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::sanitize_for_transport;

    #[test]
    fn strips_tags_and_collapses_glyph_runs() {
        assert_eq!(
            sanitize_for_transport("<p>**Blue Mug** has __12__ units~~</p>"),
            "*Blue Mug* has _12_ units~"
        );
        assert_eq!(sanitize_for_transport("``code``"), "`code`");
    }

    #[test]
    fn plain_text_is_untouched_and_idempotent() {
        let text = "Order #1042 shipped on 2026-03-01 (3 items).";
        assert_eq!(sanitize_for_transport(text), text);
        assert_eq!(sanitize_for_transport(&sanitize_for_transport(text)), text);
        assert_eq!(sanitize_for_transport("a < b and c > d"), "a < b and c > d");
    }

    #[test]
    fn markup_only_text_becomes_empty() {
        assert_eq!(sanitize_for_transport("<br/>  <hr>"), "");
    }
}
