//! AES-256-CBC content decryption.
//!
//! Blobs published by the content host are `[16-byte IV][ciphertext]` with PKCS#7 padding.
//! There is no authentication tag: a valid padding trailer is the only integrity signal, so a
//! wrong key, a corrupted transfer and tampered content are indistinguishable here.

use alloc::vec::Vec;
use core::fmt;

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const BLOCK_LEN: usize = 16;
/// IV plus one ciphertext block.
pub const MIN_BLOB_LEN: usize = IV_LEN + BLOCK_LEN;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecryptError {
    /// Too short, or the ciphertext is not a whole number of blocks.
    MalformedInput,
    /// PKCS#7 trailer did not verify.
    PaddingInvalid,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KeyError {
    InvalidHex,
}

/// 256-bit content key.
#[derive(Clone, Eq, PartialEq)]
pub struct ContentKey([u8; KEY_LEN]);

impl ContentKey {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses the 64-digit hex form kept in the persistent store.
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let hex_key = hex_key.trim();
        if hex_key.len() != KEY_LEN * 2 {
            return Err(KeyError::InvalidHex);
        }

        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(hex_key, &mut bytes).map_err(|_| KeyError::InvalidHex)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

/// Decrypts `blob` in place and returns the unpadded plaintext.
///
/// The blob buffer is reused for the plaintext, so at most one payload-sized allocation is
/// alive during the call.
pub fn decrypt(key: &ContentKey, mut blob: Vec<u8>) -> Result<Vec<u8>, DecryptError> {
    if blob.len() < MIN_BLOB_LEN || !(blob.len() - IV_LEN).is_multiple_of(BLOCK_LEN) {
        return Err(DecryptError::MalformedInput);
    }

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&blob[..IV_LEN]);

    let ciphertext_len = blob.len() - IV_LEN;
    Aes256CbcDec::new(key.as_bytes().into(), &iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut blob[IV_LEN..])
        .map_err(|_| DecryptError::MalformedInput)?;

    let plaintext_len = ciphertext_len - pkcs7_pad_len(&blob[IV_LEN..])?;
    blob.copy_within(IV_LEN..IV_LEN + plaintext_len, 0);
    blob.truncate(plaintext_len);
    Ok(blob)
}

/// Length of a valid PKCS#7 trailer at the end of `block_data`.
fn pkcs7_pad_len(block_data: &[u8]) -> Result<usize, DecryptError> {
    let Some(&last) = block_data.last() else {
        return Err(DecryptError::MalformedInput);
    };

    let pad = last as usize;
    if pad == 0 || pad > BLOCK_LEN || pad > block_data.len() {
        return Err(DecryptError::PaddingInvalid);
    }

    if block_data[block_data.len() - pad..]
        .iter()
        .all(|byte| *byte == last)
    {
        Ok(pad)
    } else {
        Err(DecryptError::PaddingInvalid)
    }
}
