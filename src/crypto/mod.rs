//! Client-side envelope encryption
//!
//! Objects are encrypted with a per-object 32-byte AES key. The AES key never
//! leaves the process in the clear: it is wrapped (RSA-encrypted) under one
//! or more named key pairs and stored base64-encoded in the object metadata.
//! Each part of the object payload is an independent AES-256-CBC stream with
//! its own random IV written inline as the first cipher block.

pub mod envelope;
pub mod keys;
pub mod stream;

pub use envelope::{
    generate_symmetric_key, recover_symmetric_key, unwrap_symmetric_key, wrap_symmetric_key,
    SYMMETRIC_KEY_LEN,
};
pub use keys::{default_key_directory, DirKeyProvider, KeyProvider};
pub use stream::{decrypt_part, encrypt_part};
