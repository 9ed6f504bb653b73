//! Part planning for multipart transfers
//!
//! The planner is pure arithmetic: given the plaintext length, the configured
//! chunk size and whether client-side encryption is on, it produces the byte
//! ranges each part occupies in both the plaintext and the stored object.
//!
//! With encryption enabled every plaintext chunk of capacity `C` (a multiple
//! of the AES block size `B`) becomes at most `C/B + 1` cipher blocks after
//! padding, plus one block for the inline IV, so `C/B + 2` blocks total. The
//! stored object uses a fixed stride of `B * (C/B + 2)` between parts, which
//! makes every ciphertext offset computable without reading the object. That
//! is what allows parallel range-GETs and server-side part copies to address
//! ciphertext directly.

use serde::{Deserialize, Serialize};

/// AES block size in bytes
pub const AES_BLOCK_SIZE: u64 = 16;

/// One planned part of a multipart transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartPlan {
    /// 0-based part index
    pub index: u64,

    /// Plaintext byte offset this part starts at
    pub plaintext_start: u64,

    /// Plaintext length of this part
    pub plaintext_len: u64,

    /// Byte offset of this part within the stored object
    pub ciphertext_start: u64,

    /// Stored length of this part
    pub ciphertext_len: u64,
}

impl PartPlan {
    /// The 1-based part number used on the wire
    pub fn part_number(&self) -> i32 {
        self.index as i32 + 1
    }
}

/// Number of parts a transfer of `file_length` bytes needs.
///
/// A zero-length file still transfers as exactly one empty part.
pub fn part_count(file_length: u64, chunk_size: u64) -> u64 {
    if file_length == 0 {
        1
    } else {
        file_length.div_ceil(chunk_size)
    }
}

/// Distance between consecutive part offsets in an encrypted object
pub fn ciphertext_stride(chunk_size: u64) -> u64 {
    AES_BLOCK_SIZE * (chunk_size / AES_BLOCK_SIZE + 2)
}

/// Stored size of a part holding `plaintext_len` bytes of plaintext
pub fn encrypted_part_len(plaintext_len: u64) -> u64 {
    AES_BLOCK_SIZE * (plaintext_len / AES_BLOCK_SIZE + 2)
}

/// Plan every part of a transfer.
///
/// Plaintext parts are `[i*C, min((i+1)*C, L))`. When encryption is off, the
/// stored ranges equal the plaintext ranges. When it is on, `chunk_size`
/// must be a multiple of [`AES_BLOCK_SIZE`] (validated by the options layer)
/// and the stored ranges follow the fixed stride described in the module
/// docs. Upload and download call this with the same inputs and agree
/// byte-for-byte.
pub fn plan_parts(file_length: u64, chunk_size: u64, encrypted: bool) -> Vec<PartPlan> {
    let count = part_count(file_length, chunk_size);

    (0..count)
        .map(|index| {
            let plaintext_start = index * chunk_size;
            let plaintext_len = (file_length - plaintext_start).min(chunk_size);

            let (ciphertext_start, ciphertext_len) = if encrypted {
                (
                    index * ciphertext_stride(chunk_size),
                    encrypted_part_len(plaintext_len),
                )
            } else {
                (plaintext_start, plaintext_len)
            };

            PartPlan {
                index,
                plaintext_start,
                plaintext_len,
                ciphertext_start,
                ciphertext_len,
            }
        })
        .collect()
}
