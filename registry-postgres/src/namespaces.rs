//! Namespace entity store (C3, §3 "Namespace (top-level)").
//!
//! New relative to the teacher; grounded on the same `create_or_find`-by-
//! natural-key idiom as `blobs::create_or_find`/`tags::upsert`.

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;

use registry_core::{Error, Result};

use crate::conn::{PgMetadataConn, PgMetadataTx};
use crate::types::{Namespace, Namespaces};

pub async fn find_by_name(executor: &mut PgConnection, name: &str) -> Result<Option<Namespace>> {
    let (sql, values) = Query::select()
        .from(Namespaces::Table)
        .columns([Namespaces::Id, Namespaces::Name])
        .and_where(Expr::col(Namespaces::Name).eq(name))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Namespace, _>(&sql, values)
        .fetch_optional(executor)
        .await?)
}

pub async fn create_or_find(executor: &mut PgConnection, name: &str) -> Result<Namespace> {
    let (sql, values) = Query::insert()
        .into_table(Namespaces::Table)
        .columns([Namespaces::Name])
        .values([name.into()])?
        .on_conflict(OnConflict::column(Namespaces::Name).do_nothing().to_owned())
        .returning(Query::returning().columns([Namespaces::Id, Namespaces::Name]))
        .build_sqlx(PostgresQueryBuilder);

    match sqlx::query_as_with::<_, Namespace, _>(&sql, values)
        .fetch_optional(executor)
        .await?
    {
        Some(row) => Ok(row),
        None => find_by_name(executor, name)
            .await?
            .ok_or_else(|| Error::statement_failed(sqlx::Error::RowNotFound)),
    }
}

impl PgMetadataConn {
    pub async fn find_namespace_by_name(&mut self, name: &str) -> Result<Option<Namespace>> {
        find_by_name(self.conn_mut(), name).await
    }
}

impl<'a> PgMetadataTx<'a> {
    pub async fn create_or_find_namespace(&mut self, name: &str) -> Result<Namespace> {
        create_or_find(self.conn_mut()?, name).await
    }
}
