//! Layered symmetric text cipher used by the `encrypt`/`decrypt` builtins.
//!
//! Each layer XORs the bytes with a SHA-256 keystream derived from the key,
//! the layer index and the block index, then hex-encodes the result. The
//! next layer works on that hex text, so `depth` layers nest.

use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

const BLOCK: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("depth must be at least 1")]
    ZeroDepth,
    #[error("ciphertext is not valid hex at byte {0}")]
    InvalidHex(usize),
    #[error("ciphertext has odd length {0}")]
    OddLength(usize),
    #[error("decrypted bytes are not valid UTF-8; wrong key or depth?")]
    InvalidUtf8,
}

/// A random key in the positive 32-bit range.
pub fn random_key() -> i64 {
    rand::thread_rng().gen_range(1..=i64::from(u32::MAX))
}

/// Encrypt `text` with `depth` layers.
pub fn encrypt(text: &str, key: i64, depth: u32) -> Result<String, CipherError> {
    if depth == 0 {
        return Err(CipherError::ZeroDepth);
    }
    let mut data = text.as_bytes().to_vec();
    for layer in 0..depth {
        apply_keystream(&mut data, key, layer);
        data = to_hex(&data).into_bytes();
    }
    // hex output is always ASCII
    String::from_utf8(data).map_err(|_| CipherError::InvalidUtf8)
}

/// Undo [`encrypt`] with the same key and depth.
pub fn decrypt(text: &str, key: i64, depth: u32) -> Result<String, CipherError> {
    if depth == 0 {
        return Err(CipherError::ZeroDepth);
    }
    let mut data = text.as_bytes().to_vec();
    for layer in (0..depth).rev() {
        data = from_hex(&data)?;
        apply_keystream(&mut data, key, layer);
    }
    String::from_utf8(data).map_err(|_| CipherError::InvalidUtf8)
}

fn apply_keystream(data: &mut [u8], key: i64, layer: u32) {
    for (block, chunk) in data.chunks_mut(BLOCK).enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(key.to_le_bytes());
        hasher.update(layer.to_le_bytes());
        hasher.update((block as u64).to_le_bytes());
        let stream = hasher.finalize();
        for (byte, mask) in chunk.iter_mut().zip(stream.iter()) {
            *byte ^= mask;
        }
    }
}

fn to_hex(data: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push(DIGITS[usize::from(byte >> 4)] as char);
        out.push(DIGITS[usize::from(byte & 0x0f)] as char);
    }
    out
}

fn from_hex(data: &[u8]) -> Result<Vec<u8>, CipherError> {
    if data.len() % 2 != 0 {
        return Err(CipherError::OddLength(data.len()));
    }
    data.chunks(2)
        .enumerate()
        .map(|(index, pair)| {
            let high = nibble(pair[0]).ok_or(CipherError::InvalidHex(index * 2))?;
            let low = nibble(pair[1]).ok_or(CipherError::InvalidHex(index * 2 + 1))?;
            Ok((high << 4) | low)
        })
        .collect()
}

fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}
