use std::path::PathBuf;

use dropvault_core::{DavError, DavResource, ResourceKind};
use thiserror::Error;
use tracing::{debug, info};

use super::index::{IndexError, IndexStore, ResourceRecord};
use super::paths::{PathError, PathMapper};
use super::remote::RemoteTree;
use super::transfer::{TransferError, clear_way_for_file, staging_dir, write_stream_to_path};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("protocol error: {0}")]
    Protocol(#[from] DavError),
    #[error("decode error: {0}")]
    Decode(#[from] PathError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("index error: {0}")]
    Store(#[from] IndexError),
    #[error("remote content truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    Protocol,
    Decode,
    Io,
    Store,
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::Protocol(_) | SyncError::Truncated { .. } => SyncErrorKind::Protocol,
            SyncError::Decode(_) => SyncErrorKind::Decode,
            SyncError::Io(_) => SyncErrorKind::Io,
            SyncError::Store(_) => SyncErrorKind::Store,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Protocol(err) if err.is_auth())
    }
}

impl From<TransferError> for SyncError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Protocol(err) => SyncError::Protocol(err),
            TransferError::Io(err) => SyncError::Io(err),
            TransferError::LengthMismatch { expected, actual } => {
                SyncError::Truncated { expected, actual }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub folders: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Rebuilds the local mirror from scratch on every run.
///
/// The index is cleared before the first remote call and repopulated in
/// depth-first pre-order. A failure stops the walk where it is: whatever
/// was inserted so far stays in the index.
pub struct SyncEngine {
    index: IndexStore,
    cache_root: PathBuf,
    staging: PathBuf,
}

impl SyncEngine {
    pub fn new(index: IndexStore, cache_root: PathBuf) -> Self {
        let staging = staging_dir(&cache_root);
        Self {
            index,
            cache_root,
            staging,
        }
    }

    pub async fn sync<R: RemoteTree>(&self, remote: &R) -> Result<SyncReport, SyncError> {
        self.index.clear().await?;

        let base = remote.base_identifier().await?;
        self.index.set_base_identifier(&base).await?;
        let mapper = PathMapper::new(self.cache_root.clone(), base);
        let root = remote.root_resource().await?;
        info!(base = mapper.base_identifier(), "rebuilding mirror");

        let mut report = SyncReport::default();
        let mut pending: Vec<(Option<ResourceRecord>, DavResource)> = vec![(None, root)];

        while let Some((parent, node)) = pending.pop() {
            // Content first: a file only enters the index once it is cached.
            if node.kind == ResourceKind::File {
                report.bytes += self.download(remote, &mapper, &node).await?;
                report.files += 1;
            }

            let record = match &parent {
                Some(parent) => self.index.insert_child(parent, &node).await?,
                None => self.index.insert_root(&node).await?,
            };

            if node.kind == ResourceKind::Folder {
                report.folders += 1;
                let children = remote.list_children(&node).await?;
                debug!(
                    identifier = %node.identifier,
                    children = children.len(),
                    "listed folder"
                );
                pending.extend(
                    children
                        .into_iter()
                        .rev()
                        .map(|child| (Some(record.clone()), child)),
                );
            }
        }

        info!(
            folders = report.folders,
            files = report.files,
            bytes = report.bytes,
            "mirror rebuilt"
        );
        Ok(report)
    }

    async fn download<R: RemoteTree>(
        &self,
        remote: &R,
        mapper: &PathMapper,
        node: &DavResource,
    ) -> Result<u64, SyncError> {
        let target = mapper.local_path(&node.identifier)?;
        clear_way_for_file(mapper.cache_root(), &target).await?;
        let stream = remote.fetch(node).await?;
        let written = write_stream_to_path(stream, &target, &self.staging, node.size).await?;
        debug!(identifier = %node.identifier, bytes = written, "cached file");
        Ok(written)
    }
}
