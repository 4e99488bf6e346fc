//! # registry-core
//!
//! Shared types between `registry-postgres` (the metadata datastore
//! backend) and `registry-importer` (the filesystem-to-database
//! bootstrapper): the digest codec (C1), the error taxonomy (§7), and the
//! trait-level interfaces consumed at the importer's boundary (§6).
pub mod digest;
pub use digest::{Algorithm, Digest};

pub mod errors;
pub use errors::{Error, Result};

pub mod content_store;
pub use content_store::{BlobTransfer, ContentStore, Descriptor, ObjectBody};
