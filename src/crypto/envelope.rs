//! Symmetric key generation and RSA wrapping
//!
//! PKCS#1 v1.5 padding is the compatibility baseline: objects written by
//! earlier versions of the tool were wrapped that way and must stay
//! decryptable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{Result, StoreError};
use crate::metadata::ObjectAnnotations;

use super::keys::KeyProvider;

/// Length of the per-object symmetric key in bytes (AES-256)
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Generate a fresh per-object symmetric key
pub fn generate_symmetric_key() -> [u8; SYMMETRIC_KEY_LEN] {
    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// RSA-encrypt the symmetric key under the given public key and encode the
/// result as base64 for storage in object metadata.
pub fn wrap_symmetric_key(
    public_key: &RsaPublicKey,
    key: &[u8; SYMMETRIC_KEY_LEN],
) -> Result<String> {
    let wrapped = public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, key.as_slice())
        .map_err(|e| StoreError::Crypto(format!("failed to wrap symmetric key: {}", e)))?;
    Ok(BASE64.encode(wrapped))
}

/// Decode and RSA-decrypt a wrapped symmetric key. The plaintext must be
/// exactly [`SYMMETRIC_KEY_LEN`] bytes.
pub fn unwrap_symmetric_key(
    private_key: &RsaPrivateKey,
    wrapped_b64: &str,
) -> Result<[u8; SYMMETRIC_KEY_LEN]> {
    let wrapped = BASE64
        .decode(wrapped_b64)
        .map_err(|e| StoreError::Crypto(format!("wrapped key is not valid base64: {}", e)))?;

    let plain = private_key
        .decrypt(Pkcs1v15Encrypt, &wrapped)
        .map_err(|e| StoreError::Crypto(format!("failed to unwrap symmetric key: {}", e)))?;

    plain.as_slice().try_into().map_err(|_| {
        StoreError::Crypto(format!(
            "unwrapped symmetric key has {} bytes, expected {}",
            plain.len(),
            SYMMETRIC_KEY_LEN
        ))
    })
}

/// Recover the object's symmetric key from its annotations using the first
/// wrapping whose private key the provider holds.
///
/// Returns the key-pair name that worked along with the key material.
pub fn recover_symmetric_key(
    provider: &dyn KeyProvider,
    annotations: &ObjectAnnotations,
) -> Result<(String, [u8; SYMMETRIC_KEY_LEN])> {
    for (name, wrapped) in annotations
        .key_names
        .iter()
        .zip(annotations.wrapped_keys.iter())
    {
        if !provider.has_private_key(name) {
            continue;
        }
        let private = provider.private_key(name)?;
        let key = unwrap_symmetric_key(&private, wrapped)?;
        return Ok((name.clone(), key));
    }
    Err(StoreError::MissingKey(annotations.key_names.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key_pair() -> (RsaPrivateKey, RsaPublicKey) {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let (private, public) = test_key_pair();
        let key = generate_symmetric_key();

        let wrapped = wrap_symmetric_key(&public, &key).unwrap();
        let recovered = unwrap_symmetric_key(&private, &wrapped).unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn test_distinct_keys_generated() {
        assert_ne!(generate_symmetric_key(), generate_symmetric_key());
    }

    #[test]
    fn test_unwrap_with_wrong_private_key_fails() {
        let (_, public) = test_key_pair();
        let (other_private, _) = test_key_pair();
        let key = generate_symmetric_key();

        let wrapped = wrap_symmetric_key(&public, &key).unwrap();
        let err = unwrap_symmetric_key(&other_private, &wrapped).unwrap_err();
        assert!(matches!(err, StoreError::Crypto(_)));
    }

    #[test]
    fn test_unwrap_rejects_wrong_length_plaintext() {
        let (private, public) = test_key_pair();
        // A wrapping of something that is not a 32-byte key
        let wrapped = public
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, b"short".as_slice())
            .unwrap();
        let err = unwrap_symmetric_key(&private, &BASE64.encode(wrapped)).unwrap_err();
        assert!(err.to_string().contains("expected 32"));
    }

    #[test]
    fn test_unwrap_rejects_bad_base64() {
        let (private, _) = test_key_pair();
        assert!(unwrap_symmetric_key(&private, "!!!not-base64!!!").is_err());
    }

    #[test]
    fn test_recover_prefers_available_private_key() {
        struct TwoKeys {
            alice: RsaPrivateKey,
            bob: RsaPrivateKey,
        }
        impl KeyProvider for TwoKeys {
            fn public_key(&self, name: &str) -> Result<RsaPublicKey> {
                self.private_key(name).map(|k| RsaPublicKey::from(&k))
            }
            fn private_key(&self, name: &str) -> Result<RsaPrivateKey> {
                match name {
                    // alice's private key is not on this machine
                    "alice" => Err(StoreError::MissingKey(name.to_string())),
                    "bob" => Ok(self.bob.clone()),
                    _ => Err(StoreError::MissingKey(name.to_string())),
                }
            }
        }

        let provider = TwoKeys {
            alice: RsaPrivateKey::new(&mut OsRng, 1024).unwrap(),
            bob: RsaPrivateKey::new(&mut OsRng, 1024).unwrap(),
        };

        let key = generate_symmetric_key();
        let mut annotations = ObjectAnnotations::new_encrypted(
            16,
            0,
            "alice".to_string(),
            wrap_symmetric_key(&RsaPublicKey::from(&provider.alice), &key).unwrap(),
        );
        annotations
            .add_wrapping(
                "bob".to_string(),
                wrap_symmetric_key(&RsaPublicKey::from(&provider.bob), &key).unwrap(),
            )
            .unwrap();

        let (name, recovered) = recover_symmetric_key(&provider, &annotations).unwrap();
        assert_eq!(name, "bob");
        assert_eq!(recovered, key);
    }

    #[test]
    fn test_recover_fails_when_no_private_key_available() {
        struct NoKeys;
        impl KeyProvider for NoKeys {
            fn public_key(&self, name: &str) -> Result<RsaPublicKey> {
                Err(StoreError::MissingKey(name.to_string()))
            }
            fn private_key(&self, name: &str) -> Result<RsaPrivateKey> {
                Err(StoreError::MissingKey(name.to_string()))
            }
        }

        let annotations =
            ObjectAnnotations::new_encrypted(16, 0, "alice".to_string(), "eA==".to_string());
        let err = recover_symmetric_key(&NoKeys, &annotations).unwrap_err();
        assert!(matches!(err, StoreError::MissingKey(_)));
    }
}
