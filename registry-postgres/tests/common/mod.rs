//! Shared setup for the integration suite: connect to `DATABASE_URL`, run
//! migrations once per process, truncate everything between tests so each
//! scenario starts from an empty schema.

use registry_postgres::PgMetadataPool;

pub async fn pool() -> PgMetadataPool {
    let dsn = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set to run this suite");
    let pool = PgMetadataPool::connect(&dsn).await.expect("connect to test database");
    pool.migrate_up().await.expect("run migrations");
    truncate(&pool).await;
    pool
}

async fn truncate(pool: &PgMetadataPool) {
    let mut conn = pool.get_conn().await.expect("acquire connection");
    sqlx::query(
        r#"
        TRUNCATE TABLE
            blob_task, manifest_task, config_link, layer_link,
            tags, manifest_layers, manifest_references, configurations,
            manifests, repository_blobs, blobs, repositories, namespaces
        RESTART IDENTITY CASCADE
        "#,
    )
    .execute(conn.conn_mut())
    .await
    .expect("truncate tables");
}
