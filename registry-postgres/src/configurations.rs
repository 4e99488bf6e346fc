//! Configuration store (C3, §3 "Configuration").
//!
//! Links a manifest to its config blob plus an optional JSON excerpt,
//! grounded on the `Json<...>` column handling
//! `portfolio_postgres-s3/src/metadata/types.rs` uses for
//! `UploadSessions::DigestState`.

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;
use uuid::Uuid;

use registry_core::{Digest, Error, Result};

use crate::conn::PgMetadataTx;
use crate::types::{Configuration, Configurations};

pub async fn find_by_manifest(executor: &mut PgConnection, manifest_id: Uuid) -> Result<Option<Configuration>> {
    let (sql, values) = Query::select()
        .from(Configurations::Table)
        .columns([
            Configurations::ManifestId,
            Configurations::BlobDigest,
            Configurations::PayloadExcerpt,
        ])
        .and_where(Expr::col(Configurations::ManifestId).eq(manifest_id))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Configuration, _>(&sql, values)
        .fetch_optional(executor)
        .await?)
}

/// Idempotent: a manifest has at most one configuration row (§3), so a
/// re-import links the same blob without erroring (§4.3 "Link ... is
/// idempotent").
pub async fn link(
    executor: &mut PgConnection,
    manifest_id: Uuid,
    blob_digest: &Digest,
    payload_excerpt: Option<&serde_json::Value>,
) -> Result<()> {
    let (sql, values) = Query::insert()
        .into_table(Configurations::Table)
        .columns([
            Configurations::ManifestId,
            Configurations::BlobDigest,
            Configurations::PayloadExcerpt,
        ])
        .values([
            manifest_id.into(),
            blob_digest.encode().into(),
            payload_excerpt.cloned().into(),
        ])?
        .on_conflict(OnConflict::column(Configurations::ManifestId).do_nothing().to_owned())
        .build_sqlx(PostgresQueryBuilder);

    match sqlx::query_with(&sql, values).execute(executor).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(dberr))
            if dberr.kind() == sqlx::error::ErrorKind::ForeignKeyViolation =>
        {
            Err(Error::InvalidInput(format!("unknown config blob: {dberr}")))
        }
        Err(e) => Err(e.into()),
    }
}

impl<'a> PgMetadataTx<'a> {
    pub async fn find_configuration_by_manifest(&mut self, manifest_id: Uuid) -> Result<Option<Configuration>> {
        find_by_manifest(self.conn_mut()?, manifest_id).await
    }

    pub async fn link_configuration(
        &mut self,
        manifest_id: Uuid,
        blob_digest: &Digest,
        payload_excerpt: Option<&serde_json::Value>,
    ) -> Result<()> {
        link(self.conn_mut()?, manifest_id, blob_digest, payload_excerpt).await
    }
}
