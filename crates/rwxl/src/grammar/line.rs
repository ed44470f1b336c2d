//! Per-line parsing of the config grammar (spec §4.1 step 3).
//!
//! Every physical line is classified into a [`Line`]. Anything the rewriter
//! won't touch keeps its exact original text around so it can be emitted
//! byte-for-byte regardless of how (or whether) it was structurally parsed —
//! this is what makes the `self.height<=1.4` boundary case safe even though
//! the key/value regex below would cheerfully carve that line up in a way we
//! never intend to reconstruct from.

use regex::Regex;
use std::sync::LazyLock;

use super::keys;

/// A key/value line's decomposed grammar: `indent key pre sep post value trailing`.
#[derive(Debug, Clone)]
pub struct KeyValueLine {
    pub raw: String,
    pub indent: String,
    pub key: String,
    pub pre: String,
    pub sep: char,
    pub post: String,
    pub value: String,
    pub trailing: String,
    /// `None` if `key` is not on the allow-list (base or localized form).
    pub base: Option<String>,
    pub lang_tag: Option<String>,
}

impl KeyValueLine {
    /// Renders this line with `value` substituted in, keeping the original
    /// indent/separator/surrounding whitespace (spec §4.1 step 9).
    pub fn with_value(&self, value: &str) -> String {
        format!(
            "{}{}{}{}{}{}{}",
            self.indent, self.key, self.pre, self.sep, self.post, value, self.trailing
        )
    }

    /// Synthesizes a brand-new localized line for `key`, styled after this
    /// line's indent/separator/whitespace.
    pub fn sibling_for(&self, key: &str, value: &str) -> String {
        format!(
            "{}{}{}{}{}{}{}",
            self.indent, key, self.pre, self.sep, self.post, value, self.trailing
        )
    }
}

#[derive(Debug, Clone)]
pub enum Line {
    /// Comments, blank lines, section headers, non-allow-listed KV lines,
    /// and anything inside (or opening/closing) a `"""` block. Emitted
    /// unchanged.
    Verbatim(String),
    /// A section header `[Name]`; also carries the verbatim text so it's
    /// emitted unchanged, but exposes the parsed name for scoping.
    Section { raw: String, name: String },
    /// An allow-listed key/value line (base or localized).
    KeyValue(KeyValueLine),
}

static SECTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\[([^\]]*)\]\s*$").unwrap());
static COMMENT_OR_BLANK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([#;].*)?$").unwrap());
static KV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)(?P<key>[^\s:=]+)(?P<pre>[ \t]*)(?P<sep>[:=])(?P<post>[ \t]*)(?P<value>.*?)(?P<trailing>[ \t]*)$").unwrap()
});

/// Counts occurrences of `"""` in a line — odd means the line toggles
/// whether we're inside a multi-line literal block (spec §4.1 step 2).
pub fn triple_quote_count(line: &str) -> usize {
    line.matches("\"\"\"").count()
}

/// Classifies one physical line. Never called while a `"""` block is open —
/// the caller handles that state outside this function.
pub fn parse_line(raw: &str) -> Line {
    if let Some(caps) = SECTION.captures(raw) {
        return Line::Section {
            raw: raw.to_string(),
            name: caps[1].to_string(),
        };
    }
    if COMMENT_OR_BLANK.is_match(raw) {
        return Line::Verbatim(raw.to_string());
    }
    if let Some(caps) = KV.captures(raw) {
        let key = caps["key"].to_string();
        let (base, lang_tag) = keys::split_localized(&key);
        if keys::is_allowed_base_key(base) {
            return Line::KeyValue(KeyValueLine {
                raw: raw.to_string(),
                indent: caps["indent"].to_string(),
                key: key.clone(),
                pre: caps["pre"].to_string(),
                sep: caps["sep"].chars().next().unwrap(),
                post: caps["post"].to_string(),
                value: caps["value"].to_string(),
                trailing: caps["trailing"].to_string(),
                base: Some(base.to_string()),
                lang_tag: lang_tag.map(|t| t.to_string()),
            });
        }
    }
    Line::Verbatim(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_section_header() {
        match parse_line("[CORE]") {
            Line::Section { name, .. } => assert_eq!(name, "CORE"),
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn parses_allow_listed_kv_line() {
        match parse_line("  title: Hello") {
            Line::KeyValue(kv) => {
                assert_eq!(kv.indent, "  ");
                assert_eq!(kv.key, "title");
                assert_eq!(kv.sep, ':');
                assert_eq!(kv.value, "Hello");
                assert_eq!(kv.base.as_deref(), Some("title"));
            }
            other => panic!("expected kv, got {other:?}"),
        }
    }

    #[test]
    fn non_allow_listed_key_is_verbatim_even_though_it_parses_as_kv() {
        let raw = "onDeath: if self.height<=1.4 then foo";
        match parse_line(raw) {
            Line::Verbatim(text) => assert_eq!(text, raw),
            other => panic!("expected verbatim, got {other:?}"),
        }
    }

    #[test]
    fn localized_key_resolves_to_base_and_tag() {
        match parse_line("description_ru = А вот и он") {
            Line::KeyValue(kv) => {
                assert_eq!(kv.base.as_deref(), Some("description"));
                assert_eq!(kv.lang_tag.as_deref(), Some("ru"));
            }
            other => panic!("expected kv, got {other:?}"),
        }
    }
}
