//! Tagged-enum backend selection and YAML loading, in the same style as
//! `crates/portfolio/src/config.rs` -- generalized from "one backend, one
//! variant" only in name, since Postgres remains the only datastore backend
//! this spec defines.

use std::path::PathBuf;

use serde::Deserialize;

use registry_importer::ImporterConfig;
use registry_postgres::PostgresConfig;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub backend: RepositoryBackend,
    pub source: SourceConfig,
    #[serde(default)]
    pub importer: ImporterConfig,
}

#[derive(Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RepositoryBackend {
    Postgres(PostgresConfig),
}

/// Where the legacy on-disk registry layout lives, and optionally where
/// blob bytes should be transferred to. `destination_root` absent means
/// "don't transfer bytes, just record rows" (§4.6 step 2 is entirely
/// optional: "if transferring blobs").
#[derive(Clone, Deserialize)]
pub struct SourceConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub destination_root: Option<PathBuf>,
}
