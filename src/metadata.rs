//! Object metadata codec
//!
//! Every object this tool writes carries a small set of user-metadata fields
//! that make it interpretable by any future reader: the format version, the
//! plaintext chunk size and file length, and, for encrypted objects, the key
//! pair name(s) and the wrapped symmetric key(s). All other metadata keys
//! pass through untouched.

use std::collections::HashMap;

use crate::error::{Result, StoreError};

/// Current metadata format version, fixed at build time
pub const FORMAT_VERSION: &str = "1";

/// Metadata key holding the format version
pub const VERSION_KEY: &str = "s3tool-version";

/// Metadata key holding the key-pair name list (present iff encrypted)
pub const KEY_NAME_KEY: &str = "s3tool-key-name";

/// Metadata key holding the wrapped symmetric key list (present iff encrypted)
pub const SYMMETRIC_KEY_KEY: &str = "s3tool-symmetric-key";

/// Metadata key holding the plaintext chunk size in bytes
pub const CHUNK_SIZE_KEY: &str = "s3tool-chunk-size";

/// Metadata key holding the plaintext total length in bytes
pub const FILE_LENGTH_KEY: &str = "s3tool-file-length";

/// The decoded form of the metadata this tool stamps on objects.
///
/// `key_names` and `wrapped_keys` are index-matched: `wrapped_keys[i]` is the
/// symmetric key wrapped under the key pair named `key_names[i]`. Every
/// wrapping on one object decrypts to the same 32-byte symmetric key. On the
/// wire both fields are comma-separated lists; base64 never contains commas,
/// so the separator is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAnnotations {
    /// Format version the object was written with
    pub version: String,

    /// Plaintext chunk size in bytes
    pub chunk_size: u64,

    /// Plaintext total length in bytes
    pub file_length: u64,

    /// Key-pair names, one per wrapping; empty for unencrypted objects
    pub key_names: Vec<String>,

    /// Base64 RSA-wrapped symmetric keys, index-matched with `key_names`
    pub wrapped_keys: Vec<String>,
}

impl ObjectAnnotations {
    /// Annotations for an unencrypted object
    pub fn new_plain(chunk_size: u64, file_length: u64) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            chunk_size,
            file_length,
            key_names: Vec::new(),
            wrapped_keys: Vec::new(),
        }
    }

    /// Annotations for an encrypted object with a single initial wrapping
    pub fn new_encrypted(
        chunk_size: u64,
        file_length: u64,
        key_name: String,
        wrapped_key: String,
    ) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            chunk_size,
            file_length,
            key_names: vec![key_name],
            wrapped_keys: vec![wrapped_key],
        }
    }

    /// Whether the object payload is encrypted
    pub fn is_encrypted(&self) -> bool {
        !self.key_names.is_empty()
    }

    /// The wrapped symmetric key stored under the given key-pair name
    pub fn wrapping_for(&self, key_name: &str) -> Option<&str> {
        self.key_names
            .iter()
            .position(|n| n == key_name)
            .map(|i| self.wrapped_keys[i].as_str())
    }

    /// Append a new wrapping of the object's symmetric key.
    ///
    /// Fails if a wrapping under the same name already exists.
    pub fn add_wrapping(&mut self, key_name: String, wrapped_key: String) -> Result<()> {
        if !self.is_encrypted() {
            return Err(StoreError::Usage(
                "object is not encrypted, cannot add a key wrapping".to_string(),
            ));
        }
        if self.key_names.contains(&key_name) {
            return Err(StoreError::Usage(format!(
                "object already carries a wrapping under key '{}'",
                key_name
            )));
        }
        self.key_names.push(key_name);
        self.wrapped_keys.push(wrapped_key);
        Ok(())
    }

    /// Remove the wrapping stored under the given name.
    ///
    /// The last wrapping must not be removed: without it the payload would
    /// become undecryptable.
    pub fn remove_wrapping(&mut self, key_name: &str) -> Result<()> {
        let idx = self
            .key_names
            .iter()
            .position(|n| n == key_name)
            .ok_or_else(|| {
                StoreError::Usage(format!(
                    "object carries no wrapping under key '{}'",
                    key_name
                ))
            })?;
        if self.key_names.len() == 1 {
            return Err(StoreError::Usage(format!(
                "refusing to remove the last key wrapping '{}' from the object",
                key_name
            )));
        }
        self.key_names.remove(idx);
        self.wrapped_keys.remove(idx);
        Ok(())
    }

    /// Fail with `UnsupportedVersion` if the object's format version does
    /// not match the build-time version.
    pub fn validate_version(&self, uri: &str) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                uri: uri.to_string(),
                found: self.version.clone(),
                expected: FORMAT_VERSION.to_string(),
            });
        }
        Ok(())
    }

    /// Decode annotations from an object's user metadata.
    ///
    /// Returns `Ok(None)` when the object carries no version key, i.e. was
    /// not written by this tool.
    pub fn from_map(metadata: &HashMap<String, String>) -> Result<Option<Self>> {
        let version = match metadata.get(VERSION_KEY) {
            Some(v) => v.clone(),
            None => return Ok(None),
        };

        let chunk_size = parse_decimal_field(metadata, CHUNK_SIZE_KEY)?;
        if chunk_size == 0 {
            return Err(StoreError::Usage(format!(
                "object metadata field '{}' must be positive",
                CHUNK_SIZE_KEY
            )));
        }
        let file_length = parse_decimal_field(metadata, FILE_LENGTH_KEY)?;

        let key_names: Vec<String> = metadata
            .get(KEY_NAME_KEY)
            .map(|v| v.split(',').map(|s| s.to_string()).collect())
            .unwrap_or_default();
        let wrapped_keys: Vec<String> = metadata
            .get(SYMMETRIC_KEY_KEY)
            .map(|v| v.split(',').map(|s| s.to_string()).collect())
            .unwrap_or_default();

        if key_names.len() != wrapped_keys.len() {
            return Err(StoreError::Crypto(format!(
                "metadata carries {} key name(s) but {} wrapped key(s)",
                key_names.len(),
                wrapped_keys.len()
            )));
        }

        Ok(Some(Self {
            version,
            chunk_size,
            file_length,
            key_names,
            wrapped_keys,
        }))
    }

    /// Write the annotation fields into a metadata map, leaving every other
    /// key untouched.
    pub fn apply_to(&self, metadata: &mut HashMap<String, String>) {
        metadata.insert(VERSION_KEY.to_string(), self.version.clone());
        metadata.insert(CHUNK_SIZE_KEY.to_string(), self.chunk_size.to_string());
        metadata.insert(FILE_LENGTH_KEY.to_string(), self.file_length.to_string());
        if self.is_encrypted() {
            metadata.insert(KEY_NAME_KEY.to_string(), self.key_names.join(","));
            metadata.insert(SYMMETRIC_KEY_KEY.to_string(), self.wrapped_keys.join(","));
        } else {
            metadata.remove(KEY_NAME_KEY);
            metadata.remove(SYMMETRIC_KEY_KEY);
        }
    }

    /// The annotation fields as a standalone metadata map
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        self.apply_to(&mut map);
        map
    }
}

fn parse_decimal_field(metadata: &HashMap<String, String>, key: &str) -> Result<u64> {
    let raw = metadata
        .get(key)
        .ok_or_else(|| StoreError::Usage(format!("object metadata is missing '{}'", key)))?;
    raw.parse::<u64>().map_err(|_| {
        StoreError::Usage(format!(
            "object metadata field '{}' is not a decimal byte count: '{}'",
            key, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypted() -> ObjectAnnotations {
        ObjectAnnotations::new_encrypted(
            4 * 1024 * 1024,
            12_582_912,
            "alice".to_string(),
            "QWxpY2VLZXk=".to_string(),
        )
    }

    #[test]
    fn test_round_trip_plain() {
        let ann = ObjectAnnotations::new_plain(5 * 1024 * 1024, 42);
        let map = ann.to_map();
        assert_eq!(map.get(VERSION_KEY).unwrap(), FORMAT_VERSION);
        assert_eq!(map.get(FILE_LENGTH_KEY).unwrap(), "42");
        assert!(!map.contains_key(KEY_NAME_KEY));

        let parsed = ObjectAnnotations::from_map(&map).unwrap().unwrap();
        assert_eq!(parsed, ann);
        assert!(!parsed.is_encrypted());
    }

    #[test]
    fn test_round_trip_encrypted() {
        let ann = encrypted();
        let parsed = ObjectAnnotations::from_map(&ann.to_map()).unwrap().unwrap();
        assert_eq!(parsed, ann);
        assert!(parsed.is_encrypted());
        assert_eq!(parsed.wrapping_for("alice"), Some("QWxpY2VLZXk="));
        assert_eq!(parsed.wrapping_for("bob"), None);
    }

    #[test]
    fn test_foreign_object_yields_none() {
        let mut map = HashMap::new();
        map.insert("content-kind".to_string(), "csv".to_string());
        assert!(ObjectAnnotations::from_map(&map).unwrap().is_none());
    }

    #[test]
    fn test_apply_preserves_foreign_keys() {
        let mut map = HashMap::new();
        map.insert("owner-team".to_string(), "data-eng".to_string());
        encrypted().apply_to(&mut map);
        assert_eq!(map.get("owner-team").unwrap(), "data-eng");
        assert!(map.contains_key(SYMMETRIC_KEY_KEY));
    }

    #[test]
    fn test_multiple_wrappings_preserve_order() {
        let mut ann = encrypted();
        ann.add_wrapping("bob".to_string(), "Qm9iS2V5".to_string())
            .unwrap();

        let map = ann.to_map();
        assert_eq!(map.get(KEY_NAME_KEY).unwrap(), "alice,bob");
        assert_eq!(map.get(SYMMETRIC_KEY_KEY).unwrap(), "QWxpY2VLZXk=,Qm9iS2V5");

        let parsed = ObjectAnnotations::from_map(&map).unwrap().unwrap();
        assert_eq!(parsed.wrapping_for("bob"), Some("Qm9iS2V5"));
        assert_eq!(parsed.key_names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_duplicate_wrapping_rejected() {
        let mut ann = encrypted();
        let err = ann
            .add_wrapping("alice".to_string(), "eA==".to_string())
            .unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
    }

    #[test]
    fn test_add_wrapping_to_plain_object_rejected() {
        let mut ann = ObjectAnnotations::new_plain(16, 0);
        assert!(ann.add_wrapping("a".to_string(), "eA==".to_string()).is_err());
    }

    #[test]
    fn test_remove_wrapping() {
        let mut ann = encrypted();
        ann.add_wrapping("bob".to_string(), "Qm9iS2V5".to_string())
            .unwrap();
        ann.remove_wrapping("alice").unwrap();
        assert_eq!(ann.key_names, vec!["bob"]);
        assert_eq!(ann.wrapped_keys, vec!["Qm9iS2V5"]);
    }

    #[test]
    fn test_last_wrapping_cannot_be_removed() {
        let mut ann = encrypted();
        let err = ann.remove_wrapping("alice").unwrap_err();
        assert!(matches!(err, StoreError::Usage(_)));
        assert!(ann.is_encrypted());
    }

    #[test]
    fn test_remove_unknown_wrapping() {
        let mut ann = encrypted();
        assert!(ann.remove_wrapping("mallory").is_err());
    }

    #[test]
    fn test_version_validation() {
        let mut ann = encrypted();
        ann.validate_version("s3://b/k").unwrap();

        ann.version = "99".to_string();
        let err = ann.validate_version("s3://b/k").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_mismatched_wrapping_lists_rejected() {
        let mut map = encrypted().to_map();
        map.insert(KEY_NAME_KEY.to_string(), "alice,bob".to_string());
        assert!(ObjectAnnotations::from_map(&map).is_err());
    }

    #[test]
    fn test_bad_decimal_field_rejected() {
        let mut map = encrypted().to_map();
        map.insert(CHUNK_SIZE_KEY.to_string(), "4MiB".to_string());
        assert!(ObjectAnnotations::from_map(&map).is_err());

        let mut map = encrypted().to_map();
        map.insert(CHUNK_SIZE_KEY.to_string(), "0".to_string());
        assert!(ObjectAnnotations::from_map(&map).is_err());
    }
}
