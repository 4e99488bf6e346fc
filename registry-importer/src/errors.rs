//! Error taxonomy for the importer, layered over `registry_core::Error`
//! exactly as `portfolio_backend_postgres::errors::Error` wraps
//! `portfolio_core::Error`.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] registry_core::Error),

    /// A manifest payload that doesn't parse as either an OCI/schema-2 image
    /// manifest or an OCI index (§4.6 step 5).
    #[error("unrecognized manifest payload: {0}")]
    ManifestInvalid(String),

    /// Distinguished per the open question on schema-1: the datastore has
    /// no schema-1 code path, so the importer rejects it by name rather than
    /// folding it into `ManifestInvalid` (§9).
    #[error("schema-1 manifests are not supported for import: {0}")]
    Schema1Unsupported(String),
}

impl Error {
    /// Mirrors `registry_core::Error::is_non_fatal_for_import`: a
    /// `Core(PathNotFound | RepositoryUnknown)` is demoted to a warning and
    /// the current repository is skipped, everything else aborts the run
    /// (§4.6 step 7, §7).
    pub fn is_non_fatal_for_import(&self) -> bool {
        match self {
            Error::Core(e) => e.is_non_fatal_for_import(),
            _ => false,
        }
    }
}
