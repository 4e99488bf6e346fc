//! Manifest-reference store (C3 "associate/dissociate manifests↔manifests",
//! §3 "Manifest reference").
//!
//! Grounded on the teacher's `associate_index_manifests`/
//! `delete_index_manifests` multi-row-insert-in-one-statement idiom.
//! `associate` is idempotent via `on_conflict` do-nothing on `(parent,
//! child)`; self-loops are rejected before the statement is even built,
//! matching the schema's own `manifest_references_no_self_loop` check.

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;
use uuid::Uuid;

use registry_core::{Error, Result};

use crate::conn::PgMetadataTx;
use crate::types::ManifestReferences;

pub async fn associate(executor: &mut PgConnection, parent: Uuid, children: &[Uuid]) -> Result<()> {
    if children.is_empty() {
        return Ok(());
    }
    if children.iter().any(|c| *c == parent) {
        return Err(Error::InvalidInput(
            "manifest reference must not be a self-loop".to_string(),
        ));
    }

    let mut builder = Query::insert();
    builder
        .into_table(ManifestReferences::Table)
        .columns([
            ManifestReferences::ParentManifestId,
            ManifestReferences::ChildManifestId,
        ])
        .on_conflict(
            OnConflict::columns([
                ManifestReferences::ParentManifestId,
                ManifestReferences::ChildManifestId,
            ])
            .do_nothing()
            .to_owned(),
        );

    for child in children {
        builder.values([parent.into(), (*child).into()])?;
    }

    let (sql, values) = builder.build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

/// A no-op if the edge doesn't exist (§4.3: unlinking a missing link is a
/// no-op, not an error).
pub async fn dissociate(executor: &mut PgConnection, parent: Uuid, child: Uuid) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(ManifestReferences::Table)
        .and_where(Expr::col(ManifestReferences::ParentManifestId).eq(parent))
        .and_where(Expr::col(ManifestReferences::ChildManifestId).eq(child))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

pub async fn dissociate_all(executor: &mut PgConnection, parent: Uuid) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(ManifestReferences::Table)
        .and_where(Expr::col(ManifestReferences::ParentManifestId).eq(parent))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

impl<'a> PgMetadataTx<'a> {
    pub async fn associate_manifest_references(&mut self, parent: Uuid, children: &[Uuid]) -> Result<()> {
        associate(self.conn_mut()?, parent, children).await
    }

    pub async fn dissociate_manifest_reference(&mut self, parent: Uuid, child: Uuid) -> Result<()> {
        dissociate(self.conn_mut()?, parent, child).await
    }

    pub async fn dissociate_all_manifest_references(&mut self, parent: Uuid) -> Result<()> {
        dissociate_all(self.conn_mut()?, parent).await
    }
}
