//! Component B — the Translator client (spec §4.3), plus the translation
//! cache supplement (SPEC_FULL §4.14).

pub mod cache;
pub mod http;

pub use cache::{RedisTranslationCache, TranslationCache, DEFAULT_CACHE_TTL};
pub use http::{HttpTranslator, RetryPolicy};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::capability::Translator;

/// Wraps a `Translator` with the cache lookup from SPEC_FULL §4.14: every
/// batch entry is checked against the cache first, only misses are sent to
/// the inner client, and fresh results are written back before returning.
/// Never changes the rewriter's idempotence property (§4.1) — a cache hit
/// and a fresh translation are indistinguishable to the caller.
#[derive(Debug)]
pub struct CachingTranslator {
    inner: Arc<dyn Translator>,
    cache: Arc<dyn TranslationCache>,
    ttl: Duration,
}

impl CachingTranslator {
    pub fn new(inner: Arc<dyn Translator>, cache: Arc<dyn TranslationCache>, ttl: Duration) -> Self {
        CachingTranslator { inner, cache, ttl }
    }
}

#[async_trait]
impl Translator for CachingTranslator {
    async fn translate(&self, batch: &[String], style_hint: &str, target_language: &str) -> Result<Vec<String>> {
        let mut resolved: Vec<Option<String>> = Vec::with_capacity(batch.len());
        let mut misses: Vec<String> = Vec::new();
        for source in batch {
            match self.cache.get(target_language, source).await? {
                Some(hit) => resolved.push(Some(hit)),
                None => {
                    resolved.push(None);
                    misses.push(source.clone());
                }
            }
        }

        if !misses.is_empty() {
            let translated = self.inner.translate(&misses, style_hint, target_language).await?;
            anyhow::ensure!(
                translated.len() == misses.len(),
                "translator returned {} results for {} misses",
                translated.len(),
                misses.len()
            );
            let mut by_source: HashMap<&str, &str> = HashMap::new();
            for (source, result) in misses.iter().zip(translated.iter()) {
                by_source.insert(source.as_str(), result.as_str());
                self.cache.put(target_language, source, result, self.ttl).await?;
            }
            for (slot, source) in resolved.iter_mut().zip(batch.iter()) {
                if slot.is_none() {
                    *slot = by_source.get(source.as_str()).map(|s| s.to_string());
                }
            }
        }

        Ok(resolved.into_iter().map(|r| r.expect("every batch entry resolved by cache or translator")).collect())
    }

    async fn analyze_style(&self, samples: &[String], target_language: &str) -> Result<String> {
        // Style derivation is a one-off per task, not worth caching.
        self.inner.analyze_style(samples, target_language).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct InMemoryCache {
        entries: Mutex<HashMap<(String, String), String>>,
    }

    #[async_trait]
    impl TranslationCache for InMemoryCache {
        async fn get(&self, target_language: &str, source_text: &str) -> Result<Option<String>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(&(target_language.to_string(), source_text.to_string()))
                .cloned())
        }
        async fn put(&self, target_language: &str, source_text: &str, translated: &str, _ttl: Duration) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert((target_language.to_string(), source_text.to_string()), translated.to_string());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct CountingTranslator {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Translator for CountingTranslator {
        async fn translate(&self, batch: &[String], _style_hint: &str, _target_language: &str) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push(batch.to_vec());
            Ok(batch.iter().map(|s| format!("[{s}]")).collect())
        }
        async fn analyze_style(&self, _samples: &[String], _target_language: &str) -> Result<String> {
            Ok("neutral".to_string())
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_the_inner_translator() {
        let inner = Arc::new(CountingTranslator::default());
        let cache = Arc::new(InMemoryCache::default());
        let caching = CachingTranslator::new(inner.clone(), cache.clone(), Duration::from_secs(60));

        let first = caching
            .translate(&["Hello".to_string()], "", "zh")
            .await
            .unwrap();
        assert_eq!(first, vec!["[Hello]".to_string()]);
        assert_eq!(inner.calls.lock().unwrap().len(), 1);

        let second = caching
            .translate(&["Hello".to_string()], "", "zh")
            .await
            .unwrap();
        assert_eq!(second, vec!["[Hello]".to_string()]);
        assert_eq!(inner.calls.lock().unwrap().len(), 1, "second call should be served entirely from cache");
    }

    #[tokio::test]
    async fn mixed_batch_only_sends_misses() {
        let inner = Arc::new(CountingTranslator::default());
        let cache = Arc::new(InMemoryCache::default());
        cache.put("zh", "cached", "[already]", Duration::from_secs(60)).await.unwrap();
        let caching = CachingTranslator::new(inner.clone(), cache.clone(), Duration::from_secs(60));

        let out = caching
            .translate(&["cached".to_string(), "fresh".to_string()], "", "zh")
            .await
            .unwrap();
        assert_eq!(out, vec!["[already]".to_string(), "[fresh]".to_string()]);
        assert_eq!(inner.calls.lock().unwrap()[0], vec!["fresh".to_string()]);
    }
}
