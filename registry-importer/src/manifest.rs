//! Manifest payload dispatch (§4.6 step 5).
//!
//! Mirrors the teacher's `ManifestSpec` (`portfolio_core::registry`):
//! a sum type over `oci_spec::image::{ImageManifest, ImageIndex}` that a
//! manifest payload is parsed into before the importer associates its
//! layers or children. The teacher gets there via `axum::Json::from_bytes`
//! trial-and-error; this datastore has no HTTP framework in its dependency
//! stack, so the same trial-and-error is done directly against
//! `serde_json`, with an up-front peek at `schemaVersion` to give schema-1
//! payloads their own distinguished rejection (§9) instead of folding them
//! into a generic parse failure.

use oci_spec::image::{ImageIndex, ImageManifest};
use serde_json::Value;

use crate::errors::{Error, Result};

pub enum ManifestSpec {
    Image(ImageManifest),
    Index(ImageIndex),
}

impl ManifestSpec {
    /// `media_type` is whatever hint the source layout attached to the
    /// payload (a sidecar content-type, often absent for legacy layouts);
    /// it narrows the parse but is never trusted blindly -- the JSON body
    /// is still the source of truth for schema-1 rejection.
    pub fn parse(media_type: Option<&str>, bytes: &[u8]) -> Result<Self> {
        if is_schema1(bytes) {
            return Err(Error::Schema1Unsupported(
                media_type.unwrap_or("unknown").to_string(),
            ));
        }

        if is_index_media_type(media_type) {
            return Ok(ManifestSpec::Index(parse_index(bytes)?));
        }
        if is_image_media_type(media_type) {
            return Ok(ManifestSpec::Image(parse_image(bytes)?));
        }

        let index_err = match parse_index(bytes) {
            Ok(ind) => return Ok(ManifestSpec::Index(ind)),
            Err(e) => e,
        };
        match parse_image(bytes) {
            Ok(img) => Ok(ManifestSpec::Image(img)),
            Err(image_err) => {
                tracing::warn!(%index_err, %image_err, "payload is neither a valid image manifest nor an index");
                Err(Error::ManifestInvalid(format!(
                    "not an image manifest ({image_err}) or an index ({index_err})"
                )))
            }
        }
    }
}

fn is_schema1(bytes: &[u8]) -> bool {
    matches!(
        serde_json::from_slice::<Value>(bytes).ok().and_then(|v| v.get("schemaVersion").and_then(Value::as_i64)),
        Some(1)
    )
}

fn is_index_media_type(media_type: Option<&str>) -> bool {
    matches!(
        media_type,
        Some("application/vnd.docker.distribution.manifest.list.v2+json")
            | Some("application/vnd.oci.image.index.v1+json")
    )
}

fn is_image_media_type(media_type: Option<&str>) -> bool {
    matches!(
        media_type,
        Some("application/vnd.docker.distribution.manifest.v2+json")
            | Some("application/vnd.oci.image.manifest.v1+json")
    )
}

fn parse_image(bytes: &[u8]) -> Result<ImageManifest> {
    serde_json::from_slice(bytes).map_err(|e| Error::ManifestInvalid(e.to_string()))
}

fn parse_index(bytes: &[u8]) -> Result<ImageIndex> {
    serde_json::from_slice(bytes).map_err(|e| Error::ManifestInvalid(e.to_string()))
}
