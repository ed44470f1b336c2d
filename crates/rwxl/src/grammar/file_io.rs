//! Encoding-aware read and atomic write for one config file (spec §4.1 steps
//! 1 and 10). Mirrors the original's `chardet`-based auto-detection, grounded
//! here on `chardetng` + `encoding_rs` — the real-crate equivalent the pack
//! doesn't carry directly but every encoding-sniffing Rust tool reaches for.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;

/// Reads `path`, auto-detecting its encoding from the raw bytes and decoding
/// to a `String`. Falls back through `utf-8`, `gbk`, `latin-1` if the
/// detector's guess fails to decode cleanly, matching the original's
/// fallback chain.
pub async fn read_detecting_encoding(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(&bytes, true);
    let guessed = detector.guess(None, true);
    let (text, _, had_errors) = guessed.decode(&bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }

    for fallback in [
        encoding_rs::UTF_8,
        encoding_rs::GBK,
        encoding_rs::WINDOWS_1252,
    ] {
        let (text, _, had_errors) = fallback.decode(&bytes);
        if !had_errors {
            return Ok(text.into_owned());
        }
    }
    // Nothing decoded cleanly; take the detector's best guess rather than
    // failing the file outright — a handful of replacement characters beats
    // losing the whole translation for one mangled file.
    Ok(guessed.decode(&bytes).0.into_owned())
}

/// Writes `contents` to `path` atomically: a temp file in the same
/// directory, then a rename (spec §4.1 step 10).
pub async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .context("target path has no parent directory")?;
    let tmp_name = format!(
        ".{}.rwxl-tmp",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("rewrite")
    );
    let tmp_path = dir.join(tmp_name);
    fs::write(&tmp_path, contents.as_bytes())
        .await
        .with_context(|| format!("writing temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}
