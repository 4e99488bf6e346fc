//! Manifest-layer link store (C3 "associate/dissociate ... manifests↔blobs",
//! §3 "Manifest-layer link").
//!
//! Grounded on the teacher's `associate_image_layers`/`delete_image_layers`
//! multi-row-insert idiom, renamed from the teacher's `layers` table to
//! match glossary naming ("layer blobs").

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;
use uuid::Uuid;

use registry_core::{Digest, Error, Result};

use crate::conn::PgMetadataTx;
use crate::types::ManifestLayers;

/// `layers` is ordered top-to-bottom; `layer_index` preserves that order
/// (the glossary calls these "ordered layer blobs"). Idempotent: re-running
/// the importer over the same manifest is a no-op per layer.
pub async fn associate(executor: &mut PgConnection, manifest_id: Uuid, layers: &[Digest]) -> Result<()> {
    if layers.is_empty() {
        return Ok(());
    }

    let mut builder = Query::insert();
    builder
        .into_table(ManifestLayers::Table)
        .columns([
            ManifestLayers::ManifestId,
            ManifestLayers::BlobDigest,
            ManifestLayers::LayerIndex,
        ])
        .on_conflict(
            OnConflict::columns([ManifestLayers::ManifestId, ManifestLayers::BlobDigest])
                .do_nothing()
                .to_owned(),
        );

    for (index, digest) in layers.iter().enumerate() {
        builder.values([manifest_id.into(), digest.encode().into(), (index as i32).into()])?;
    }

    let (sql, values) = builder.build_sqlx(PostgresQueryBuilder);
    match sqlx::query_with(&sql, values).execute(executor).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(dberr))
            if dberr.kind() == sqlx::error::ErrorKind::ForeignKeyViolation =>
        {
            Err(Error::InvalidInput(format!("unknown layer blob: {dberr}")))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn dissociate(executor: &mut PgConnection, manifest_id: Uuid, blob_digest: &Digest) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(ManifestLayers::Table)
        .and_where(Expr::col(ManifestLayers::ManifestId).eq(manifest_id))
        .and_where(Expr::col(ManifestLayers::BlobDigest).eq(blob_digest.encode()))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

pub async fn dissociate_all(executor: &mut PgConnection, manifest_id: Uuid) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(ManifestLayers::Table)
        .and_where(Expr::col(ManifestLayers::ManifestId).eq(manifest_id))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

impl<'a> PgMetadataTx<'a> {
    pub async fn associate_manifest_layers(&mut self, manifest_id: Uuid, layers: &[Digest]) -> Result<()> {
        associate(self.conn_mut()?, manifest_id, layers).await
    }

    pub async fn dissociate_manifest_layer(&mut self, manifest_id: Uuid, blob_digest: &Digest) -> Result<()> {
        dissociate(self.conn_mut()?, manifest_id, blob_digest).await
    }

    pub async fn dissociate_all_manifest_layers(&mut self, manifest_id: Uuid) -> Result<()> {
        dissociate_all(self.conn_mut()?, manifest_id).await
    }
}
