use std::{fs, path::Path};

use dropvault_core::{DavResource, ResourceKind};
use serde::Serialize;
use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions, sqlite::SqliteRow};
use thiserror::Error;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const BASE_IDENTIFIER_KEY: &str = "base_identifier";
const RESOURCE_COLUMNS: &str = "id, identifier, parent_id, name, kind, content_type, size";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid resource kind: {0}")]
    InvalidKind(String),
    #[error("a root resource already exists: {0}")]
    RootExists(String),
    #[error("resource not found after insert: {0}")]
    MissingResource(String),
}

fn kind_as_str(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Folder => "folder",
        ResourceKind::File => "file",
    }
}

fn parse_kind(value: &str) -> Result<ResourceKind, IndexError> {
    match value {
        "folder" => Ok(ResourceKind::Folder),
        "file" => Ok(ResourceKind::File),
        other => Err(IndexError::InvalidKind(other.to_string())),
    }
}

/// A resource as persisted in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRecord {
    pub id: i64,
    pub identifier: String,
    pub parent_id: Option<i64>,
    pub name: String,
    pub kind: ResourceKind,
    pub content_type: Option<String>,
    pub size: Option<i64>,
}

impl ResourceRecord {
    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    fn from_row(row: &SqliteRow) -> Result<Self, IndexError> {
        let kind: String = row.try_get("kind")?;
        Ok(Self {
            id: row.try_get("id")?,
            identifier: row.try_get("identifier")?,
            parent_id: row.try_get("parent_id")?,
            name: row.try_get("name")?,
            kind: parse_kind(&kind)?,
            content_type: row.try_get("content_type")?,
            size: row.try_get("size")?,
        })
    }
}

/// Metadata store for the mirrored tree.
///
/// Children reference their parent through `parent_id`; deleting a record
/// cascades to its descendants. Children are returned in insertion order.
#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db_path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), IndexError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Removes every resource. The base identifier is kept.
    pub async fn clear(&self) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM resources")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_root(&self, resource: &DavResource) -> Result<ResourceRecord, IndexError> {
        if let Some(existing) = self.get_root().await? {
            return Err(IndexError::RootExists(existing.identifier));
        }
        self.insert(None, resource).await
    }

    pub async fn insert_child(
        &self,
        parent: &ResourceRecord,
        resource: &DavResource,
    ) -> Result<ResourceRecord, IndexError> {
        self.insert(Some(parent.id), resource).await
    }

    async fn insert(
        &self,
        parent_id: Option<i64>,
        resource: &DavResource,
    ) -> Result<ResourceRecord, IndexError> {
        sqlx::query(
            "INSERT INTO resources (identifier, parent_id, name, kind, content_type, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&resource.identifier)
        .bind(parent_id)
        .bind(&resource.name)
        .bind(kind_as_str(resource.kind))
        .bind(&resource.content_type)
        .bind(resource.size.map(|v| v as i64))
        .execute(&self.pool)
        .await?;

        self.get_resource(&resource.identifier)
            .await?
            .ok_or_else(|| IndexError::MissingResource(resource.identifier.clone()))
    }

    pub async fn get_resource(&self, identifier: &str) -> Result<Option<ResourceRecord>, IndexError> {
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE identifier = ?1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(ResourceRecord::from_row).transpose()
    }

    pub async fn get_root(&self) -> Result<Option<ResourceRecord>, IndexError> {
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE parent_id IS NULL ORDER BY id ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(ResourceRecord::from_row).transpose()
    }

    pub async fn get_parent(
        &self,
        resource: &ResourceRecord,
    ) -> Result<Option<ResourceRecord>, IndexError> {
        let Some(parent_id) = resource.parent_id else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1"
        ))
        .bind(parent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(ResourceRecord::from_row).transpose()
    }

    pub async fn get_children(
        &self,
        resource: &ResourceRecord,
    ) -> Result<Vec<ResourceRecord>, IndexError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE parent_id = ?1 ORDER BY id ASC"
        ))
        .bind(resource.id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ResourceRecord::from_row).collect()
    }

    /// `resource` followed by all of its descendants.
    pub async fn subtree(&self, resource: &ResourceRecord) -> Result<Vec<ResourceRecord>, IndexError> {
        let rows = sqlx::query(&format!(
            "WITH RECURSIVE tree(tid) AS (
                 SELECT ?1
                 UNION ALL
                 SELECT r.id FROM resources r JOIN tree t ON r.parent_id = t.tid
             )
             SELECT {RESOURCE_COLUMNS} FROM resources WHERE id IN (SELECT tid FROM tree)
             ORDER BY id ASC"
        ))
        .bind(resource.id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ResourceRecord::from_row).collect()
    }

    /// Deletes `resource`; descendants go with it through the foreign key.
    pub async fn delete(&self, resource: &ResourceRecord) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM resources WHERE id = ?1")
            .bind(resource.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, IndexError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM resources")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    pub async fn base_identifier(&self) -> Result<Option<String>, IndexError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(BASE_IDENTIFIER_KEY)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get("value").map_err(IndexError::from))
            .transpose()
    }

    pub async fn set_base_identifier(&self, base: &str) -> Result<(), IndexError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(BASE_IDENTIFIER_KEY)
        .bind(base)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> IndexStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = IndexStore::from_pool(pool);
        store.init().await.unwrap();
        store
    }

    fn folder(identifier: &str, name: &str) -> DavResource {
        DavResource {
            identifier: identifier.into(),
            name: name.into(),
            kind: ResourceKind::Folder,
            content_type: None,
            size: None,
        }
    }

    fn file(identifier: &str, name: &str, size: u64) -> DavResource {
        DavResource {
            identifier: identifier.into(),
            name: name.into(),
            kind: ResourceKind::File,
            content_type: Some("text/plain".into()),
            size: Some(size),
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_resources() {
        let store = make_store().await;
        let root = store
            .insert_root(&folder("/dav/alice/", "alice"))
            .await
            .unwrap();
        let child = store
            .insert_child(&root, &file("/dav/alice/a.txt", "a.txt", 10))
            .await
            .unwrap();

        assert_eq!(root.parent_id, None);
        assert_eq!(child.parent_id, Some(root.id));
        assert_eq!(child.size, Some(10));
        assert_eq!(child.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            store.get_resource("/dav/alice/a.txt").await.unwrap(),
            Some(child.clone())
        );
        assert_eq!(store.get_root().await.unwrap(), Some(root.clone()));
        assert_eq!(store.get_parent(&child).await.unwrap(), Some(root.clone()));
        assert_eq!(store.get_parent(&root).await.unwrap(), None);
    }

    #[tokio::test]
    async fn children_keep_insertion_order() {
        let store = make_store().await;
        let root = store
            .insert_root(&folder("/dav/alice/", "alice"))
            .await
            .unwrap();
        for name in ["zeta.txt", "alpha.txt", "mid.txt"] {
            store
                .insert_child(&root, &file(&format!("/dav/alice/{name}"), name, 1))
                .await
                .unwrap();
        }

        let names: Vec<_> = store
            .get_children(&root)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["zeta.txt", "alpha.txt", "mid.txt"]);
    }

    #[tokio::test]
    async fn rejects_second_root_and_duplicate_identifier() {
        let store = make_store().await;
        let root = store
            .insert_root(&folder("/dav/alice/", "alice"))
            .await
            .unwrap();
        assert!(matches!(
            store.insert_root(&folder("/dav/bob/", "bob")).await,
            Err(IndexError::RootExists(_))
        ));

        store
            .insert_child(&root, &file("/dav/alice/a.txt", "a.txt", 1))
            .await
            .unwrap();
        assert!(matches!(
            store
                .insert_child(&root, &file("/dav/alice/a.txt", "again", 1))
                .await,
            Err(IndexError::Sqlx(_))
        ));
    }

    #[tokio::test]
    async fn delete_cascades_to_descendants() {
        let store = make_store().await;
        let root = store
            .insert_root(&folder("/dav/alice/", "alice"))
            .await
            .unwrap();
        let sub = store
            .insert_child(&root, &folder("/dav/alice/sub/", "sub"))
            .await
            .unwrap();
        let deep = store
            .insert_child(&sub, &folder("/dav/alice/sub/deep/", "deep"))
            .await
            .unwrap();
        store
            .insert_child(&deep, &file("/dav/alice/sub/deep/x.bin", "x.bin", 3))
            .await
            .unwrap();
        store
            .insert_child(&root, &file("/dav/alice/keep.txt", "keep.txt", 1))
            .await
            .unwrap();

        let subtree: Vec<_> = store
            .subtree(&sub)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(
            subtree,
            [
                "/dav/alice/sub/",
                "/dav/alice/sub/deep/",
                "/dav/alice/sub/deep/x.bin"
            ]
        );

        store.delete(&sub).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(
            store
                .get_resource("/dav/alice/sub/deep/x.bin")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .get_resource("/dav/alice/keep.txt")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn clear_keeps_base_identifier() {
        let store = make_store().await;
        store.set_base_identifier("/dav/alice/").await.unwrap();
        store
            .insert_root(&folder("/dav/alice/", "alice"))
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.get_root().await.unwrap(), None);
        assert_eq!(
            store.base_identifier().await.unwrap().as_deref(),
            Some("/dav/alice/")
        );

        store.set_base_identifier("/dav/bob/").await.unwrap();
        assert_eq!(
            store.base_identifier().await.unwrap().as_deref(),
            Some("/dav/bob/")
        );
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/index.db");
        let store = IndexStore::open(&db_path).await.unwrap();
        store.set_base_identifier("/dav/alice/").await.unwrap();
        assert!(db_path.exists());
    }
}
