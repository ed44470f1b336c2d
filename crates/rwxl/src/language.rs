//! Language-tag resolution (spec §4.2).
//!
//! Turns whatever the submitter typed — a BCP-47 tag, an English name, a
//! native-script alias — into a prompt language name for the Translator and
//! an ordered list of key-suffix variants the rewriter inserts.
//!
//! Ported from `original_source/utils/language.py`'s alias table, not
//! translated line-for-line: the five well-known families get their own
//! curated variant lists, everything else falls back to its primary subtag.

/// The result of resolving a raw `target_language` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLanguage {
    /// Human-readable name handed to the Translator's prompt.
    pub prompt_name: String,
    /// Ordered suffix variants to write, e.g. `["zh", "zh_cn", "cn"]`.
    pub variants: Vec<String>,
}

impl ResolvedLanguage {
    /// The primary subtag — the first variant, which is always present.
    pub fn primary_subtag(&self) -> &str {
        &self.variants[0]
    }
}

/// Resolves a raw language input per spec §4.2's normalization table.
///
/// Matching is case-insensitive with surrounding whitespace stripped; the
/// five curated families recognize both their BCP-47 forms and the
/// original's native-script aliases. Anything else resolves to its own
/// lowercased primary subtag, verbatim as the prompt name.
pub fn resolve(raw: &str) -> ResolvedLanguage {
    let norm = raw.trim().to_lowercase();

    const CHINESE: &[&str] = &["zh", "zh-cn", "zh_cn", "zh-hans", "中文", "汉化", "cn"];
    const RUSSIAN: &[&str] = &["ru", "russian", "俄文", "俄语", "俄", "русский"];
    const ENGLISH: &[&str] = &["en", "english", "英文", "英语"];
    const JAPANESE: &[&str] = &["ja", "japanese", "日文", "日语"];
    const KOREAN: &[&str] = &["ko", "korean", "韩文", "韩语"];

    if CHINESE.contains(&norm.as_str()) {
        return ResolvedLanguage {
            prompt_name: "中文".to_string(),
            variants: vec!["zh".into(), "zh_cn".into(), "cn".into()],
        };
    }
    if RUSSIAN.contains(&norm.as_str()) {
        return ResolvedLanguage {
            prompt_name: "俄文".to_string(),
            variants: vec!["ru".into(), "ru_ru".into()],
        };
    }
    if ENGLISH.contains(&norm.as_str()) {
        return ResolvedLanguage {
            prompt_name: "英文".to_string(),
            variants: vec!["en".into(), "en_us".into()],
        };
    }
    if JAPANESE.contains(&norm.as_str()) {
        return ResolvedLanguage {
            prompt_name: "日文".to_string(),
            variants: vec!["ja".into(), "ja_jp".into()],
        };
    }
    if KOREAN.contains(&norm.as_str()) {
        return ResolvedLanguage {
            prompt_name: "韩文".to_string(),
            variants: vec!["ko".into(), "ko_kr".into()],
        };
    }

    // Fallback: any other well-formed tag. Primary subtag is the segment
    // before the first `-` or `_`; the prompt name is the raw input as given.
    let primary = norm
        .split(|c| c == '-' || c == '_')
        .next()
        .unwrap_or(&norm)
        .to_string();
    ResolvedLanguage {
        prompt_name: raw.trim().to_string(),
        variants: vec![primary],
    }
}
