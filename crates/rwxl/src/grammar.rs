//! Component A — the config-grammar rewriter (spec §4.1).

pub mod file_io;
pub mod keys;
pub mod line;
pub mod rewrite;

pub use rewrite::{rewrite_text, Terminator};

/// Runs the full rewrite pipeline against a file on disk: detect encoding,
/// rewrite in memory, write back atomically. Called by the file worker
/// (spec §4.10 step 3).
pub async fn rewrite_file(
    path: &std::path::Path,
    translator: &dyn crate::capability::Translator,
    style_hint: &str,
    language: &crate::language::ResolvedLanguage,
) -> anyhow::Result<()> {
    let input = file_io::read_detecting_encoding(path).await?;
    let output = rewrite_text(&input, translator, style_hint, language).await?;
    if output != input {
        file_io::write_atomic(path, &output).await?;
    }
    Ok(())
}
