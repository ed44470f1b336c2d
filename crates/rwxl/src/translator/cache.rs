//! The translation cache supplement (SPEC_FULL §4.14, grounded on
//! `original_source/services/cache_service.py`). Keyed on
//! `blake3(target_language || source_text)` — the `Translator` contract
//! (component B) carries no file path, and a source string translates the
//! same way regardless of which file it came from, so the cache is scoped
//! to target language rather than path. A cache hit never touches the
//! Translator (B) at all.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fred::prelude::*;

/// Looks up and stores translated strings in Redis, independent of the
/// Completion Registry's TTL (component I uses the same connection, a
/// different key namespace).
#[async_trait]
pub trait TranslationCache: std::fmt::Debug + Send + Sync {
    async fn get(&self, target_language: &str, source_text: &str) -> Result<Option<String>>;
    async fn put(
        &self,
        target_language: &str,
        source_text: &str,
        translated: &str,
        ttl: Duration,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RedisTranslationCache {
    pool: Pool,
}

impl RedisTranslationCache {
    pub fn new(pool: Pool) -> Self {
        RedisTranslationCache { pool }
    }
}

fn cache_key(target_language: &str, source_text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(target_language.as_bytes());
    hasher.update(b"\0");
    hasher.update(source_text.as_bytes());
    format!("translate_cache:{}", hasher.finalize().to_hex())
}

#[async_trait]
impl TranslationCache for RedisTranslationCache {
    async fn get(&self, target_language: &str, source_text: &str) -> Result<Option<String>> {
        let key = cache_key(target_language, source_text);
        let value: Option<String> = self.pool.get(key).await?;
        Ok(value)
    }

    async fn put(
        &self,
        target_language: &str,
        source_text: &str,
        translated: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = cache_key(target_language, source_text);
        let _: () = self
            .pool
            .set(key, translated, Some(Expiration::EX(ttl.as_secs() as i64)), None, false)
            .await?;
        Ok(())
    }
}

/// 30-day default TTL, matching `cache_service.py`.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_language_sensitive() {
        let a = cache_key("zh", "Hello");
        let b = cache_key("ru", "Hello");
        assert_ne!(a, b);
        assert_eq!(a, cache_key("zh", "Hello"));
    }
}
