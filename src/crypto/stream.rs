//! Per-part AES-256-CBC cipher with inline IV
//!
//! Each part is its own CBC session: a fresh random IV is generated per part
//! and written as the first cipher block, followed by the Pkcs7-padded
//! ciphertext. Decryption reads the first block back as the IV. Parts are
//! therefore independently decryptable, which is what permits concurrent
//! range-GETs.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::chunk::AES_BLOCK_SIZE;
use crate::error::{Result, StoreError};

use super::envelope::SYMMETRIC_KEY_LEN;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK: usize = AES_BLOCK_SIZE as usize;

/// Encrypt one part, returning `IV || ciphertext`.
///
/// The output length is always `16 * (plaintext.len()/16 + 2)`, matching the
/// planner's stored-size formula.
pub fn encrypt_part(key: &[u8; SYMMETRIC_KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; BLOCK];
    OsRng.fill_bytes(&mut iv);
    encrypt_part_with_iv(key, &iv, plaintext)
}

fn encrypt_part_with_iv(
    key: &[u8; SYMMETRIC_KEY_LEN],
    iv: &[u8; BLOCK],
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(BLOCK + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypt one part previously produced by [`encrypt_part`].
pub fn decrypt_part(key: &[u8; SYMMETRIC_KEY_LEN], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 2 * BLOCK || data.len() % BLOCK != 0 {
        return Err(StoreError::Crypto(format!(
            "part ciphertext has invalid length {}",
            data.len()
        )));
    }

    let (iv, ciphertext) = data.split_at(BLOCK);
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| StoreError::Crypto(format!("invalid cipher parameters: {}", e)))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| StoreError::Crypto("part decryption failed (bad key or corrupt data)".to_string()))
}
