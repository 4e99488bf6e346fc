//! # registry-postgres
//!
//! The Postgres backend for the metadata datastore: pooled connection and
//! transaction handles (C2), entity stores (C3), the schema and its GC
//! triggers as embedded migrations (C4), and the GC review-queue stores
//! (C5). Grounded on `portfolio_postgres-s3::metadata` and
//! `portfolio_backend_postgres`'s module layout -- one file per entity,
//! thin forwarding methods on the connection/transaction types delegating
//! into free functions parametric over `&mut PgConnection`.

pub mod config;
pub mod conn;
pub mod types;

pub mod blobs;
pub mod configurations;
pub mod gc;
pub mod manifest_layers;
pub mod manifest_references;
pub mod manifests;
pub mod namespaces;
pub mod repositories;
pub mod repository_blobs;
pub mod tags;

pub use config::PostgresConfig;
pub use conn::{PgMetadataConn, PgMetadataPool, PgMetadataTx};
pub use manifests::ManifestRef;
