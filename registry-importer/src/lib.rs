//! # registry-importer
//!
//! One-shot bootstrap from a legacy filesystem content-store layout into
//! the metadata datastore (C6, §4.6). Consumes `registry_core::ContentStore`
//! / `BlobTransfer` for the blob side and a importer-local
//! `RepositorySource` for the repository/tag/manifest side, and drives
//! `registry_postgres` stores the same way the teacher's
//! `PgManifestStore::put` drives a single manifest upsert, generalized to a
//! whole source tree.

pub mod config;
pub mod errors;
pub mod importer;
pub mod manifest;
pub mod source;

pub use config::ImporterConfig;
pub use errors::{Error, Result};
pub use importer::{Importer, RowCounts};
pub use manifest::ManifestSpec;
pub use source::{ManifestPayload, RepositorySource};
