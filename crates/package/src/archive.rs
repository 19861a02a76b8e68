//! Archive extraction and SIP compression

use flate2::write::GzEncoder;
use flate2::Compression;
use sipforge_errors::{Error, StageError};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tokio::task;
use walkdir::WalkDir;

fn extraction_failed(path: &Path, message: impl std::fmt::Display) -> Error {
    StageError::ExtractionFailed {
        path: path.display().to_string(),
        message: message.to_string(),
    }
    .into()
}

fn compression_failed(path: &Path, message: impl std::fmt::Display) -> Error {
    StageError::CompressionFailed {
        path: path.display().to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Extract a zip archive into `dest_dir`, returning the extracted entry
/// names
///
/// Entries that would escape `dest_dir` are skipped.
///
/// # Errors
///
/// Returns `StageError::ExtractionFailed` if the archive cannot be read or
/// an entry cannot be written.
pub async fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<String>, Error> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    task::spawn_blocking(move || {
        let file = File::open(&archive_path).map_err(|e| extraction_failed(&archive_path, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| extraction_failed(&archive_path, e))?;
        std::fs::create_dir_all(&dest_dir).map_err(|e| extraction_failed(&dest_dir, e))?;

        let mut names = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| extraction_failed(&archive_path, e))?;
            let Some(relative) = entry.enclosed_name() else {
                continue;
            };
            let outpath = dest_dir.join(&relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&outpath).map_err(|e| extraction_failed(&outpath, e))?;
                continue;
            }
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent).map_err(|e| extraction_failed(parent, e))?;
            }
            let mut outfile = File::create(&outpath).map_err(|e| extraction_failed(&outpath, e))?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| extraction_failed(&outpath, e))?;
            names.push(relative.display().to_string());
        }
        Ok(names)
    })
    .await
    .map_err(|e| Error::internal(format!("extraction task failed: {e}")))?
}

/// Archive the contents of `source_dir` as an uncompressed tar at
/// `tar_path`, returning the entry names in archive order
///
/// Entries are relative to `source_dir` and added in sorted order with
/// normalized metadata, so the same tree always yields the same archive.
///
/// # Errors
///
/// Returns `StageError::CompressionFailed` if the tree cannot be read or the
/// archive cannot be written.
pub async fn create_tar(source_dir: &Path, tar_path: &Path) -> Result<Vec<String>, Error> {
    let source_dir = source_dir.to_path_buf();
    let tar_path = tar_path.to_path_buf();

    task::spawn_blocking(move || {
        let file = File::create(&tar_path).map_err(|e| compression_failed(&tar_path, e))?;
        let mut builder = tar::Builder::new(file);
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        let mut names = Vec::new();
        for entry in WalkDir::new(&source_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| compression_failed(&source_dir, e))?;
            let relative: PathBuf = entry
                .path()
                .strip_prefix(&source_dir)
                .map_err(|e| compression_failed(entry.path(), e))?
                .to_path_buf();

            if entry.file_type().is_dir() {
                builder
                    .append_dir(&relative, entry.path())
                    .map_err(|e| compression_failed(entry.path(), e))?;
            } else {
                builder
                    .append_path_with_name(entry.path(), &relative)
                    .map_err(|e| compression_failed(entry.path(), e))?;
            }
            names.push(relative.display().to_string());
        }

        builder
            .into_inner()
            .and_then(|file| file.sync_all())
            .map_err(|e| compression_failed(&tar_path, e))?;
        Ok(names)
    })
    .await
    .map_err(|e| Error::internal(format!("compression task failed: {e}")))?
}

/// Gzip each of `files` into `dest_dir` as `{name}.gz`, returning the
/// written paths
///
/// # Errors
///
/// Returns `StageError::CompressionFailed` if a file cannot be read or
/// written.
pub async fn gzip_into(files: Vec<PathBuf>, dest_dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let dest_dir = dest_dir.to_path_buf();

    task::spawn_blocking(move || {
        let mut written = Vec::with_capacity(files.len());
        for source in files {
            let Some(name) = source.file_name() else {
                continue;
            };
            let mut gz_name = name.to_os_string();
            gz_name.push(".gz");
            let dest = dest_dir.join(gz_name);

            let mut reader =
                BufReader::new(File::open(&source).map_err(|e| compression_failed(&source, e))?);
            let output = File::create(&dest).map_err(|e| compression_failed(&dest, e))?;
            let mut encoder = GzEncoder::new(output, Compression::default());
            io::copy(&mut reader, &mut encoder).map_err(|e| compression_failed(&source, e))?;
            encoder
                .finish()
                .and_then(|file| file.sync_all())
                .map_err(|e| compression_failed(&dest, e))?;
            written.push(dest);
        }
        Ok(written)
    })
    .await
    .map_err(|e| Error::internal(format!("gzip task failed: {e}")))?
}
