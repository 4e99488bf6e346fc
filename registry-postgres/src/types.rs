//! Row types and `sea_query::Iden` table/column enums for every entity in
//! §3. Digest-bearing columns get a manual `sqlx::FromRow` impl that decodes
//! through `registry_core::Digest`, exactly as `Blob`/`Manifest`/`Tag` do in
//! the teacher's `portfolio_postgres-s3/src/metadata/types.rs`.

use chrono::{DateTime, Utc};
use sea_query::Iden;
use sqlx::Row;
use uuid::Uuid;

use registry_core::Digest;

fn decode_digest(row: &sqlx_postgres::PgRow, column: &str) -> sqlx::Result<Digest> {
    let bytes: Vec<u8> = row.try_get(column)?;
    Digest::decode(&bytes).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("{e}").into(),
    })
}

#[derive(Iden)]
pub enum Namespaces {
    Table,
    Id,
    Name,
}

#[derive(Clone, sqlx::FromRow)]
pub struct Namespace {
    pub id: Uuid,
    pub name: String,
}

#[derive(Iden)]
pub enum Repositories {
    Table,
    Id,
    NamespaceId,
    ParentId,
    Path,
    Name,
    CreatedAt,
    DeletedAt,
}

#[derive(Clone, sqlx::FromRow)]
pub struct Repository {
    pub id: Uuid,
    pub namespace_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub path: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Iden)]
pub enum Blobs {
    Table,
    Digest,
    MediaType,
    Size,
    CreatedAt,
    MarkedAt,
}

pub struct Blob {
    pub digest: Digest,
    pub media_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub marked_at: Option<DateTime<Utc>>,
}

impl sqlx::FromRow<'_, sqlx_postgres::PgRow> for Blob {
    fn from_row(row: &sqlx_postgres::PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            digest: decode_digest(row, "digest")?,
            media_type: row.try_get("media_type")?,
            size: row.try_get("size")?,
            created_at: row.try_get("created_at")?,
            marked_at: row.try_get("marked_at")?,
        })
    }
}

#[derive(Iden)]
pub enum RepositoryBlobs {
    Table,
    RepositoryId,
    BlobDigest,
}

#[derive(Iden)]
pub enum Manifests {
    Table,
    Id,
    RepositoryId,
    SchemaVersion,
    MediaType,
    Digest,
    Payload,
    CreatedAt,
    MarkedAt,
}

pub struct Manifest {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub schema_version: i32,
    pub media_type: String,
    pub digest: Digest,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub marked_at: Option<DateTime<Utc>>,
}

impl sqlx::FromRow<'_, sqlx_postgres::PgRow> for Manifest {
    fn from_row(row: &sqlx_postgres::PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            repository_id: row.try_get("repository_id")?,
            schema_version: row.try_get("schema_version")?,
            media_type: row.try_get("media_type")?,
            digest: decode_digest(row, "digest")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            marked_at: row.try_get("marked_at")?,
        })
    }
}

#[derive(Iden)]
pub enum ManifestReferences {
    Table,
    ParentManifestId,
    ChildManifestId,
}

#[derive(Iden)]
pub enum Configurations {
    Table,
    ManifestId,
    BlobDigest,
    PayloadExcerpt,
}

pub struct Configuration {
    pub manifest_id: Uuid,
    pub blob_digest: Digest,
    pub payload_excerpt: Option<serde_json::Value>,
}

impl sqlx::FromRow<'_, sqlx_postgres::PgRow> for Configuration {
    fn from_row(row: &sqlx_postgres::PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            manifest_id: row.try_get("manifest_id")?,
            blob_digest: decode_digest(row, "blob_digest")?,
            payload_excerpt: row
                .try_get::<Option<sqlx::types::Json<serde_json::Value>>, _>("payload_excerpt")?
                .map(|j| j.0),
        })
    }
}

#[derive(Iden)]
pub enum ManifestLayers {
    Table,
    ManifestId,
    BlobDigest,
    LayerIndex,
}

#[derive(Iden)]
pub enum Tags {
    Table,
    RepositoryId,
    Name,
    ManifestId,
    CreatedAt,
    UpdatedAt,
}

pub struct Tag {
    pub repository_id: Uuid,
    pub name: String,
    pub manifest_id: Uuid,
    pub digest: Digest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx_postgres::PgRow> for Tag {
    fn from_row(row: &sqlx_postgres::PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            repository_id: row.try_get("repository_id")?,
            name: row.try_get("name")?,
            manifest_id: row.try_get("manifest_id")?,
            digest: decode_digest(row, "digest")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Iden)]
pub enum BlobTasks {
    #[iden = "blob_task"]
    Table,
    Digest,
    ReviewAfter,
    ReviewCount,
}

pub struct BlobTask {
    pub digest: Digest,
    pub review_after: DateTime<Utc>,
    pub review_count: i32,
}

impl sqlx::FromRow<'_, sqlx_postgres::PgRow> for BlobTask {
    fn from_row(row: &sqlx_postgres::PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            digest: decode_digest(row, "digest")?,
            review_after: row.try_get("review_after")?,
            review_count: row.try_get("review_count")?,
        })
    }
}

#[derive(Iden)]
pub enum ManifestTasks {
    #[iden = "manifest_task"]
    Table,
    RepositoryId,
    ManifestId,
    ReviewAfter,
    ReviewCount,
}

#[derive(Clone, sqlx::FromRow)]
pub struct ManifestTask {
    pub repository_id: Uuid,
    pub manifest_id: Uuid,
    pub review_after: DateTime<Utc>,
    pub review_count: i32,
}

#[derive(Iden)]
pub enum ConfigLinks {
    #[iden = "config_link"]
    Table,
    BlobDigest,
    RepositoryId,
    ManifestId,
}

#[derive(Iden)]
pub enum LayerLinks {
    #[iden = "layer_link"]
    Table,
    BlobDigest,
    RepositoryId,
    ManifestId,
}
