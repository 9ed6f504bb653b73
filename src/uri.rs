/*!
 * URI parsing for object references
 */

use crate::error::{Result, StoreError};
use crate::store::types::ObjectRef;

/// Parse an `s3://bucket/key[?versionId=...]` URI into an object reference.
///
/// The key part may be empty (`s3://bucket` or `s3://bucket/`), which is
/// useful for bucket-level operations like listing.
pub fn parse_object_uri(uri: &str) -> Result<ObjectRef> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| StoreError::Usage(format!("not an s3:// URI: {}", uri)))?;

    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let (bucket, key) = match path.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (path, ""),
    };

    if bucket.is_empty() {
        return Err(StoreError::Usage(format!("missing bucket in URI: {}", uri)));
    }

    let mut version = None;
    if let Some(query) = query {
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("versionId", v)) if !v.is_empty() => version = Some(v.to_string()),
                _ => {
                    return Err(StoreError::Usage(format!(
                        "unsupported URI query parameter '{}' in {}",
                        pair, uri
                    )))
                }
            }
        }
    }

    Ok(ObjectRef {
        bucket: bucket.to_string(),
        key: key.to_string(),
        version,
    })
}
