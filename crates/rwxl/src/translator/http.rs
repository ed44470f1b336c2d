//! The real Translator client (component B, spec §4.3): a numbered-list
//! prompt over a chat-completion-shaped HTTP endpoint, a strict
//! JSON-array-of-strings contract, and exponential backoff with jitter.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::Translator;

/// Retry policy knobs (spec §4.3: "base ~0.5s, cap ~10s, jitter ±50%").
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// One of two translator modes: a live HTTP-backed client, or a degraded
/// passthrough used when no credentials are configured (spec §4.3).
#[derive(Debug)]
pub enum HttpTranslator {
    Live(LiveClient),
    Degraded,
}

#[derive(Debug)]
pub struct LiveClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl HttpTranslator {
    /// Builds the client from config. `api_key.is_none()` is exactly the
    /// condition that puts the pipeline into degraded/passthrough mode.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        retry: RetryPolicy,
    ) -> Self {
        match api_key {
            Some(key) if !key.is_empty() => HttpTranslator::Live(LiveClient {
                http: reqwest::Client::new(),
                base_url,
                api_key: key,
                model,
                retry,
            }),
            _ => HttpTranslator::Degraded,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Builds the numbered-list user prompt: one source string per line, 1-based
/// index (spec §4.3 "Protocol with the model").
fn build_prompt(batch: &[String], style_hint: &str, target_language: &str) -> (String, String) {
    let system = format!(
        "You are a precise translation engine. Translate each numbered line into {target}. \
         Style guidance: {style}. Return ONLY a JSON array of strings, in the same order, \
         with exactly {n} elements. No prose, no explanation.",
        target = target_language,
        style = if style_hint.is_empty() { "neutral" } else { style_hint },
        n = batch.len(),
    );
    let user = batch
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    (system, user)
}

/// Strips a single leading/trailing fenced code block (```` ``` `` or
/// ` ```json `) before JSON parsing, then parses a JSON array of exactly
/// `expected_len` strings.
fn parse_json_array(raw: &str, expected_len: usize) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    let unfenced = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    };

    let value: Value =
        serde_json::from_str(unfenced).context("translator response was not valid JSON")?;
    let Value::Array(items) = value else {
        bail!("translator response was not a JSON array");
    };
    if items.len() != expected_len {
        bail!(
            "translator returned {} items, expected {}",
            items.len(),
            expected_len
        );
    }
    items
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            other => bail!("translator array element was not a string: {other}"),
        })
        .collect()
}

fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exp = policy.base_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    let capped = exp.min(policy.max_delay.as_secs_f64());
    let jitter = 0.5 + rand::thread_rng().gen::<f64>() / 2.0;
    Duration::from_secs_f64(capped * jitter)
}

impl LiveClient {
    async fn call_once(&self, system: &str, user: &str) -> Result<String> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
            temperature: 0.2,
        };
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("translator HTTP request failed")?
            .error_for_status()
            .context("translator returned an error status")?
            .json::<ChatResponse>()
            .await
            .context("translator response was not valid chat-completion JSON")?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            bail!("translator returned an empty completion");
        }
        Ok(content)
    }

    async fn call_with_retry(&self, system: &str, user: &str, expected_len: usize) -> Result<Vec<String>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self
                .call_once(system, user)
                .await
                .and_then(|content| parse_json_array(&content, expected_len));
            match outcome {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= self.retry.max_attempts => return Err(e),
                Err(e) => {
                    let delay = backoff_delay(attempt, &self.retry);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis(), "translator call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        batch: &[String],
        style_hint: &str,
        target_language: &str,
    ) -> Result<Vec<String>> {
        match self {
            HttpTranslator::Degraded => {
                debug!(n = batch.len(), "degraded translator: passthrough");
                Ok(batch.to_vec())
            }
            HttpTranslator::Live(client) => {
                let (system, user) = build_prompt(batch, style_hint, target_language);
                client.call_with_retry(&system, &user, batch.len()).await
            }
        }
    }

    async fn analyze_style(&self, samples: &[String], target_language: &str) -> Result<String> {
        match self {
            HttpTranslator::Degraded => Ok("neutral".to_string()),
            HttpTranslator::Live(client) => {
                let system = format!(
                    "Given these sample strings from a game mod, describe in one short phrase \
                     the tone/register a translator into {target_language} should use. \
                     Return ONLY a JSON array containing that one string. No prose."
                );
                let user = samples.join("\n");
                match client.call_with_retry(&system, &user, 1).await {
                    Ok(mut v) if v.len() == 1 => Ok(v.remove(0)),
                    _ => Ok("neutral".to_string()),
                }
            }
        }
    }
}
