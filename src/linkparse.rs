//! Link parsing and title normalization (spec section 4.2, component C2).
//!
//! Grounded in the teacher's `link_regex` in `parse.rs`, generalized to the
//! non-greedy `\[\[(.+?)(\]\]|\||#)` pattern the original Go `ParseLinks`
//! uses so that piped labels and section anchors terminate a link the same
//! way a `]]` does.

use regex::Regex;
use std::sync::OnceLock;

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[(.+?)(\]\]|\||#)").expect("static regex is valid"))
}

/// Extracts all `[[target]]`, `[[target|label]]` and `[[target#section]]`
/// link targets from wikitext, normalizing each with [`normalize_title`], in
/// document order.
pub fn parse_links(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    link_regex()
        .captures_iter(content)
        .map(|caps| normalize_title(caps.get(1).unwrap().as_str()))
        .collect()
}

/// Normalizes a title: uppercases the first full code point, then replaces
/// ASCII spaces with underscores in the remainder. No URL-encoding (spec
/// section 9 — the storage format is not URL-escaped).
pub fn normalize_title(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }

    let mut chars = title.chars();
    // `.next()` takes the first full code point, not the first byte, so
    // this avoids the original's `s[0:1]` multi-byte bug (spec section 9).
    let first = chars.next().expect("non-empty checked above");
    let rest = chars.as_str();

    let mut normalized = String::with_capacity(title.len());
    normalized.extend(first.to_uppercase());
    normalized.extend(rest.chars().map(|c| if c == ' ' { '_' } else { c }));
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_idempotence_table() {
        let cases = [
            ("", ""),
            ("dog", "Dog"),
            ("dog cat", "Dog_cat"),
            ("DOG", "DOG"),
            ("dOG", "DOG"),
            ("dOG cAT", "DOG_cAT"),
        ];
        for (input, expected) in cases {
            let once = normalize_title(input);
            assert_eq!(once, expected);
            assert_eq!(normalize_title(&once), once, "normalize must be idempotent");
        }
    }

    #[test]
    fn normalize_uppercases_full_code_point_not_first_byte() {
        // 'ß' is a single code point but its UTF-8 encoding is two bytes;
        // the original's strings.ToUpper(s[0:1]) would mangle this.
        assert_eq!(normalize_title("ßeta"), "SSeta");
    }

    #[test]
    fn parse_links_basic() {
        let content = "prefix [[Foo]] middle [[bar|label]] end [[Baz#s]]";
        assert_eq!(parse_links(content), vec!["Foo", "Bar", "Baz"]);
    }

    #[test]
    fn parse_links_empty_input() {
        assert!(parse_links("").is_empty());
    }

    #[test]
    fn parse_links_unclosed_bracket_no_match() {
        assert!(parse_links("some [[unterminated text").is_empty());
    }

    #[test]
    fn parse_links_preserves_document_order_and_allows_duplicates() {
        let content = "[[A]] [[B]] [[A]]";
        assert_eq!(parse_links(content), vec!["A", "B", "A"]);
    }
}
