use std::{
    io,
    path::{Path, PathBuf},
};

use dropvault_core::{ContentStream, DavError};
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const STAGING_SUFFIX: &str = "dropvault-tmp";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("content stream failed: {0}")]
    Protocol(#[from] DavError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },
}

/// Directory for in-flight downloads: a hidden sibling of the cache root,
/// so no remote name can collide with it and renames stay on one filesystem.
pub fn staging_dir(cache_root: &Path) -> PathBuf {
    let name = cache_root
        .file_name()
        .map(|name| format!(".{}.{STAGING_SUFFIX}", name.to_string_lossy()))
        .unwrap_or_else(|| format!(".{STAGING_SUFFIX}"));
    match cache_root.parent() {
        Some(parent) => parent.join(name),
        None => std::env::temp_dir().join(name),
    }
}

/// Makes room for a file at `target`: removes a directory sitting at
/// `target` and any non-directory on the way down from `cache_root`.
/// Leftovers from an earlier sync may have a different kind.
pub async fn clear_way_for_file(cache_root: &Path, target: &Path) -> io::Result<()> {
    let Ok(relative) = target.strip_prefix(cache_root) else {
        return Ok(());
    };

    let mut current = cache_root.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        current.push(component);
        let metadata = match tokio::fs::symlink_metadata(&current).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        let is_target = components.peek().is_none();
        if is_target && metadata.is_dir() {
            debug!(path = %current.display(), "replacing cached folder with file");
            tokio::fs::remove_dir_all(&current).await?;
        } else if !is_target && !metadata.is_dir() {
            debug!(path = %current.display(), "replacing cached file with folder");
            tokio::fs::remove_file(&current).await?;
            return Ok(());
        }
    }
    Ok(())
}

/// Copies `stream` to `target`, returning the number of bytes written.
///
/// Content lands in a temporary file under `staging` first and is renamed
/// into place only once every byte has been written, so `target` never
/// holds a truncated file. On failure the temporary file is removed.
pub async fn write_stream_to_path(
    stream: ContentStream,
    target: &Path,
    staging: &Path,
    expected_len: Option<u64>,
) -> Result<u64, TransferError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::create_dir_all(staging).await?;

    let (file, temp_path) = NamedTempFile::new_in(staging)?.into_parts();
    let written = copy_into(stream, tokio::fs::File::from_std(file), expected_len).await?;
    temp_path.persist(target).map_err(|err| err.error)?;
    Ok(written)
}

async fn copy_into(
    mut stream: ContentStream,
    file: tokio::fs::File,
    expected_len: Option<u64>,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    let file = writer.into_inner();
    file.sync_all().await?;

    let on_disk = file.metadata().await?.len();
    if on_disk != written {
        return Err(TransferError::LengthMismatch {
            expected: written,
            actual: on_disk,
        });
    }
    if let Some(expected) = expected_len
        && expected != written
    {
        return Err(TransferError::LengthMismatch {
            expected,
            actual: written,
        });
    }
    Ok(written)
}
