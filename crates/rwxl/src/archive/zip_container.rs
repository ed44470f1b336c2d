//! Component D — archive (un)packer over the ZIP family (spec §4.5).
//!
//! The `zip` crate's API is synchronous, so both operations run inside
//! `spawn_blocking`; callers in the coordinator already treat this as an
//! I/O suspension point (spec §5).

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

/// Extracts `archive_path` into `dest_dir`. Archive entries always use
/// forward slashes; the mapping to the host's path separator happens here.
pub async fn extract(archive_path: PathBuf, dest_dir: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &dest_dir))
        .await
        .context("extract task panicked")?
}

fn extract_blocking(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("opening archive {}", archive_path.display()))?;
    let mut zip = ZipArchive::new(file).context("reading zip central directory")?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        let relative: PathBuf = name.split('/').filter(|s| !s.is_empty()).collect();
        let out_path = dest_dir.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)
            .with_context(|| format!("creating {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out_file)
            .with_context(|| format!("writing {}", out_path.display()))?;
    }
    Ok(())
}

/// Packs every file under `src_dir` into `archive_path`, recreating the
/// relative tree with forward-slash entry names regardless of host
/// separator.
pub async fn pack(src_dir: PathBuf, archive_path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || pack_blocking(&src_dir, &archive_path))
        .await
        .context("pack task panicked")?
}

fn pack_blocking(src_dir: &Path, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)
        .with_context(|| format!("creating archive {}", archive_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for entry in WalkDir::new(src_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .context("walked path escaped its root")?;
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(entry_name, options)?;
        let mut contents = Vec::new();
        File::open(entry.path())?.read_to_end(&mut contents)?;
        zip.write_all(&contents)?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[tokio::test]
    async fn round_trips_a_directory_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("CORE")).unwrap();
        std::fs::write(src.path().join("CORE/a.ini"), "title: hi\n").unwrap();

        let archive = tempfile::NamedTempFile::new().unwrap();
        let archive_path = archive.path().to_path_buf();
        pack(src.path().to_path_buf(), archive_path.clone())
            .await
            .unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract(archive_path, dest.path().to_path_buf()).await.unwrap();

        let roundtripped = std::fs::read_to_string(dest.path().join("CORE/a.ini")).unwrap();
        assert_eq!(roundtripped, "title: hi\n");
    }

    #[allow(dead_code)]
    fn unused_write_helper(f: &mut File, data: &[u8]) -> std::io::Result<()> {
        f.write_all(data)
    }
}
