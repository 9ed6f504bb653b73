//! Key pair provider
//!
//! Key pairs live in a directory (default `~/.s3lib-keys`) as PEM files named
//! `<name>.pem`. A file may hold a private key (PKCS#8 or PKCS#1), in which
//! case the public half is derived from it, or a public key only, which is
//! enough to upload but not to download.

use std::path::PathBuf;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{Result, StoreError};

/// A provider of named RSA key pairs. Key material never leaves the
/// provider; callers hold key names and the keys they resolve to.
pub trait KeyProvider: Send + Sync {
    /// The public half of the named key pair
    fn public_key(&self, name: &str) -> Result<RsaPublicKey>;

    /// The private half of the named key pair
    fn private_key(&self, name: &str) -> Result<RsaPrivateKey>;

    /// Whether the private half of the named key pair is available
    fn has_private_key(&self, name: &str) -> bool {
        self.private_key(name).is_ok()
    }
}

/// The default key directory, `~/.s3lib-keys`
pub fn default_key_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".s3lib-keys")
}

/// Key provider backed by a directory of PEM files
pub struct DirKeyProvider {
    dir: PathBuf,
}

impl DirKeyProvider {
    /// Create a provider reading key files from the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_file(&self, name: &str) -> Result<PathBuf> {
        // Key names become file names; reject anything that could escape the
        // key directory.
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(StoreError::Usage(format!("invalid key name '{}'", name)));
        }
        let path = self.dir.join(format!("{}.pem", name));
        if !path.is_file() {
            return Err(StoreError::MissingKey(name.to_string()));
        }
        Ok(path)
    }

    fn read_pem(&self, name: &str) -> Result<String> {
        let path = self.key_file(name)?;
        std::fs::read_to_string(&path).map_err(StoreError::Io)
    }
}

impl KeyProvider for DirKeyProvider {
    fn public_key(&self, name: &str) -> Result<RsaPublicKey> {
        let pem = self.read_pem(name)?;
        if let Some(private) = parse_private_pem(&pem) {
            return Ok(RsaPublicKey::from(&private));
        }
        parse_public_pem(&pem).ok_or_else(|| {
            StoreError::Crypto(format!("key file for '{}' is not a usable RSA key", name))
        })
    }

    fn private_key(&self, name: &str) -> Result<RsaPrivateKey> {
        let pem = self.read_pem(name)?;
        parse_private_pem(&pem).ok_or_else(|| {
            StoreError::Crypto(format!(
                "key file for '{}' does not contain an RSA private key",
                name
            ))
        })
    }

    fn has_private_key(&self, name: &str) -> bool {
        self.read_pem(name)
            .map(|pem| parse_private_pem(&pem).is_some())
            .unwrap_or(false)
    }
}

fn parse_private_pem(pem: &str) -> Option<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .ok()
        .or_else(|| RsaPrivateKey::from_pkcs1_pem(pem).ok())
}

fn parse_public_pem(pem: &str) -> Option<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .ok()
        .or_else(|| RsaPublicKey::from_pkcs1_pem(pem).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use tempfile::TempDir;

    // Small keys keep the tests fast; key size is irrelevant to the
    // provider logic under test.
    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut OsRng, 1024).unwrap()
    }

    fn write_key(dir: &TempDir, name: &str, pem: &str) {
        std::fs::write(dir.path().join(format!("{}.pem", name)), pem).unwrap();
    }

    #[test]
    fn test_loads_private_key_pair() {
        let dir = TempDir::new().unwrap();
        let key = test_key();
        write_key(
            &dir,
            "alice",
            key.to_pkcs8_pem(LineEnding::LF).unwrap().as_str(),
        );

        let provider = DirKeyProvider::new(dir.path());
        let private = provider.private_key("alice").unwrap();
        let public = provider.public_key("alice").unwrap();
        assert_eq!(public, RsaPublicKey::from(&private));
        assert!(provider.has_private_key("alice"));
    }

    #[test]
    fn test_loads_public_only_key() {
        let dir = TempDir::new().unwrap();
        let public = RsaPublicKey::from(&test_key());
        write_key(
            &dir,
            "bob",
            &public.to_public_key_pem(LineEnding::LF).unwrap(),
        );

        let provider = DirKeyProvider::new(dir.path());
        assert_eq!(provider.public_key("bob").unwrap(), public);
        assert!(!provider.has_private_key("bob"));
        assert!(matches!(
            provider.private_key("bob").unwrap_err(),
            StoreError::Crypto(_)
        ));
    }

    #[test]
    fn test_unknown_name_is_missing_key() {
        let dir = TempDir::new().unwrap();
        let provider = DirKeyProvider::new(dir.path());
        assert!(matches!(
            provider.public_key("nobody").unwrap_err(),
            StoreError::MissingKey(name) if name == "nobody"
        ));
    }

    #[test]
    fn test_garbage_key_file_is_crypto_error() {
        let dir = TempDir::new().unwrap();
        write_key(&dir, "broken", "not a pem at all");
        let provider = DirKeyProvider::new(dir.path());
        assert!(matches!(
            provider.public_key("broken").unwrap_err(),
            StoreError::Crypto(_)
        ));
    }

    #[test]
    fn test_path_escaping_names_rejected() {
        let dir = TempDir::new().unwrap();
        let provider = DirKeyProvider::new(dir.path());
        assert!(matches!(
            provider.public_key("../etc/shadow").unwrap_err(),
            StoreError::Usage(_)
        ));
        assert!(matches!(
            provider.public_key("").unwrap_err(),
            StoreError::Usage(_)
        ));
    }
}
