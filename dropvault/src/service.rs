use std::io;
use std::path::{Path, PathBuf};

use dropvault_core::{Credentials, DavClient};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::sync::engine::{SyncEngine, SyncError, SyncReport};
use crate::sync::index::{IndexError, IndexStore, ResourceRecord};
use crate::sync::paths::{PathError, PathMapper};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),
    #[error("index error: {0}")]
    Store(#[from] IndexError),
    #[error("decode error: {0}")]
    Decode(#[from] PathError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no credentials configured")]
    MissingCredentials,
    #[error("no server URL configured")]
    MissingServerUrl,
    #[error("nothing has been synchronized yet")]
    NotSynced,
    #[error("a sync is already running")]
    SyncInProgress,
}

impl ServiceError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ServiceError::Sync(err) if err.is_auth())
    }
}

/// Entry point for front ends: reads come from the index and the cache,
/// `sync` rebuilds both from the server.
pub struct ResourceService {
    index: IndexStore,
    engine: SyncEngine,
    cache_root: PathBuf,
    server_url: Option<String>,
    credentials: Option<Credentials>,
    sync_lock: Mutex<()>,
}

impl ResourceService {
    pub fn new(index: IndexStore, cache_root: PathBuf, server_url: Option<String>) -> Self {
        Self {
            engine: SyncEngine::new(index.clone(), cache_root.clone()),
            index,
            cache_root,
            server_url,
            credentials: None,
            sync_lock: Mutex::new(()),
        }
    }

    pub async fn open(config: &AppConfig) -> Result<Self, ServiceError> {
        tokio::fs::create_dir_all(&config.cache_root).await?;
        let index = IndexStore::open(&config.db_path).await?;
        let mut service = Self::new(index, config.cache_root.clone(), config.server_url.clone());
        service.credentials = config.credentials.clone();
        Ok(service)
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.credentials = Some(Credentials::new(username, password));
    }

    pub async fn get_root(&self) -> Result<Option<ResourceRecord>, ServiceError> {
        Ok(self.index.get_root().await?)
    }

    pub async fn get_resource(
        &self,
        identifier: &str,
    ) -> Result<Option<ResourceRecord>, ServiceError> {
        Ok(self.index.get_resource(identifier).await?)
    }

    pub async fn get_parent(
        &self,
        resource: &ResourceRecord,
    ) -> Result<Option<ResourceRecord>, ServiceError> {
        Ok(self.index.get_parent(resource).await?)
    }

    pub async fn get_children(
        &self,
        resource: &ResourceRecord,
    ) -> Result<Vec<ResourceRecord>, ServiceError> {
        Ok(self.index.get_children(resource).await?)
    }

    /// Where `resource` lives in the cache. Nothing is checked on disk.
    pub async fn get_file(&self, resource: &ResourceRecord) -> Result<PathBuf, ServiceError> {
        Ok(self.mapper().await?.local_path(&resource.identifier)?)
    }

    /// Removes `resource` and its descendants from the index together with
    /// their cached content. The server is not contacted.
    pub async fn delete(&self, resource: &ResourceRecord) -> Result<usize, ServiceError> {
        let mapper = self.mapper().await?;
        let removed = self.index.subtree(resource).await?.len();
        let target = mapper.local_path(&resource.identifier)?;

        self.index.delete(resource).await?;

        let cleanup = if resource.is_file() {
            tokio::fs::remove_file(&target).await
        } else {
            tokio::fs::remove_dir_all(&target).await
        };
        match cleanup {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %target.display(), "nothing cached to remove");
            }
            Err(err) => return Err(err.into()),
        }

        info!(identifier = %resource.identifier, removed, "deleted resource");
        Ok(removed)
    }

    /// Full rebuild with the configured credentials.
    pub async fn sync(&self) -> Result<SyncReport, ServiceError> {
        let credentials = self
            .credentials
            .clone()
            .ok_or(ServiceError::MissingCredentials)?;
        self.sync_with(credentials).await
    }

    /// Full rebuild with one-off credentials; they are not kept.
    pub async fn sync_with(&self, credentials: Credentials) -> Result<SyncReport, ServiceError> {
        let server_url = self
            .server_url
            .as_deref()
            .ok_or(ServiceError::MissingServerUrl)?;
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| ServiceError::SyncInProgress)?;

        let client = DavClient::new(server_url, credentials).map_err(SyncError::from)?;
        match self.engine.sync(&client).await {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(kind = ?err.kind(), "sync aborted: {err}");
                Err(err.into())
            }
        }
    }

    async fn mapper(&self) -> Result<PathMapper, ServiceError> {
        let base = self
            .index
            .base_identifier()
            .await?
            .ok_or(ServiceError::NotSynced)?;
        Ok(PathMapper::new(self.cache_root.clone(), base))
    }
}
