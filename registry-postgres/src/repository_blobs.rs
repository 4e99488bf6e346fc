//! Repository↔blob link store (C3 "Link/Unlink", §3 "many repositories can
//! link the same blob" / "dangling-blob import mode").
//!
//! New relative to the teacher: the teacher never tracked a blob's
//! repository membership independently of a manifest reference. Follows the
//! same idempotent-link idiom as `manifest_references::associate`.

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;
use uuid::Uuid;

use registry_core::{Digest, Result};

use crate::conn::PgMetadataTx;
use crate::types::RepositoryBlobs;

pub async fn link(executor: &mut PgConnection, repository_id: Uuid, blob_digest: &Digest) -> Result<()> {
    let (sql, values) = Query::insert()
        .into_table(RepositoryBlobs::Table)
        .columns([RepositoryBlobs::RepositoryId, RepositoryBlobs::BlobDigest])
        .values([repository_id.into(), blob_digest.encode().into()])?
        .on_conflict(
            OnConflict::columns([RepositoryBlobs::RepositoryId, RepositoryBlobs::BlobDigest])
                .do_nothing()
                .to_owned(),
        )
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

pub async fn unlink(executor: &mut PgConnection, repository_id: Uuid, blob_digest: &Digest) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(RepositoryBlobs::Table)
        .and_where(Expr::col(RepositoryBlobs::RepositoryId).eq(repository_id))
        .and_where(Expr::col(RepositoryBlobs::BlobDigest).eq(blob_digest.encode()))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

impl<'a> PgMetadataTx<'a> {
    pub async fn link_repository_blob(&mut self, repository_id: Uuid, blob_digest: &Digest) -> Result<()> {
        link(self.conn_mut()?, repository_id, blob_digest).await
    }

    pub async fn unlink_repository_blob(&mut self, repository_id: Uuid, blob_digest: &Digest) -> Result<()> {
        unlink(self.conn_mut()?, repository_id, blob_digest).await
    }
}
