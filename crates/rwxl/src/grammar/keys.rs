//! The allow-list of natural-language keys (spec §4.1) and the localized-key
//! suffix grammar (spec §4.2's `<base>_<tag>` form).

use regex::Regex;
use std::sync::LazyLock;

/// Fixed allow-list of base keys that hold natural-language text.
/// Case-insensitive; `displayNameShort` is kept per the spec's explicit
/// resolution of the allow-list-union open question (see DESIGN.md).
const BASE_ALLOW_LIST: &[&str] = &[
    "description",
    "title",
    "displaydescription",
    "text",
    "displaytext",
    "islockedaltmessage",
    "cannotplacemessage",
    "displayname",
    "displaynameshort",
    "showmessagetoplayer",
    "showmessagetoallplayers",
];

static INDEXED_ACTION_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^action_(\d+)_(text|displayname)$").unwrap());

/// `<tag>` in `<base>_<tag>`: `[a-z]{2,3}` primary subtag optionally followed
/// by `-`/`_`-separated extension segments of 2-8 alphanumerics.
static LANG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z]{2,3}(?:[-_][a-z0-9]{2,8})*$").unwrap());

/// True if `key` (case-insensitive) is on the natural-language allow-list —
/// either a fixed base key or an `action_N_text`/`action_N_displayName` form.
pub fn is_allowed_base_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    BASE_ALLOW_LIST.contains(&lower.as_str()) || INDEXED_ACTION_KEY.is_match(key)
}

/// Splits a key into `(base, Some(lang_tag))` if it is a localized variant of
/// an allow-listed base key, or `(key, None)` otherwise. The split point is
/// the last `_` such that the prefix is itself allow-listed and the suffix is
/// a well-formed language tag — this handles `action_3_text_zh_cn` correctly
/// by preferring the longest valid base.
pub fn split_localized<'a>(key: &'a str) -> (&'a str, Option<&'a str>) {
    if is_allowed_base_key(key) {
        return (key, None);
    }
    // Try every `_`-delimited suffix position, longest base first, so that
    // `text_zh_cn` resolves to base `text` with tag `zh_cn`, not base `text_zh`.
    let mut positions: Vec<usize> = key
        .char_indices()
        .filter(|&(_, c)| c == '_')
        .map(|(i, _)| i)
        .collect();
    positions.sort_unstable();
    for &pos in &positions {
        let base = &key[..pos];
        let tag = &key[pos + 1..];
        if is_allowed_base_key(base) && LANG_TAG.is_match(tag) {
            return (base, Some(tag));
        }
    }
    (key, None)
}

/// The primary subtag of a language tag: its first `-`/`_`-delimited segment,
/// lowercased.
pub fn primary_subtag(tag: &str) -> String {
    tag.split(|c| c == '-' || c == '_')
        .next()
        .unwrap_or(tag)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_keys_are_case_insensitive() {
        assert!(is_allowed_base_key("Description"));
        assert!(is_allowed_base_key("DISPLAYNAME"));
        assert!(!is_allowed_base_key("speed"));
    }

    #[test]
    fn indexed_action_keys_match_any_n() {
        assert!(is_allowed_base_key("action_0_text"));
        assert!(is_allowed_base_key("action_42_displayName"));
        assert!(!is_allowed_base_key("action_text"));
    }

    #[test]
    fn localized_split_picks_longest_valid_base() {
        assert_eq!(split_localized("description_ru"), ("description", Some("ru")));
        assert_eq!(
            split_localized("action_3_text_zh_cn"),
            ("action_3_text", Some("zh_cn"))
        );
        assert_eq!(split_localized("speed"), ("speed", None));
    }

    #[test]
    fn primary_subtag_lowercases_first_segment() {
        assert_eq!(primary_subtag("ZH_CN"), "zh");
        assert_eq!(primary_subtag("ru"), "ru");
    }
}
