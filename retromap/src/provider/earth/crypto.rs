//! Keystream cipher and packet decompression for the quadtree service.
//!
//! Every payload from the quadtree provider (root descriptor body, metadata
//! packets, nothing else) is obfuscated with a symmetric XOR keystream and
//! then wrapped in a small compression envelope. The keystream index walk is
//! reverse engineered and must be reproduced exactly:
//!
//! - the index starts at 16, advances by 1 per plaintext byte;
//! - it jumps forward by 16 whenever it lands on a multiple of 8;
//! - past the end of the key it wraps via `(index + 8) % 24`.
//!
//! The compression envelope is a 4-byte magic (either byte order, which is
//! how the stream's endianness is detected), a 4-byte decompressed size in
//! the same byte order, and a zlib deflate stream.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::provider::ProviderError;

/// Magic value opening a compression envelope, in the provider's native
/// byte order. Seen byte-swapped on some endpoints.
pub const ENVELOPE_MAGIC: u32 = 0x7468DEAD;

/// Minimum key length for the index walk: the wrap keeps the index below
/// 24, so every byte of a 24-byte key is addressable.
const MIN_KEY_LEN: usize = 24;

/// Applies the keystream in place. XOR is symmetric, so this both
/// encrypts and decrypts.
pub fn apply_keystream(key: &[u8], data: &mut [u8]) -> Result<(), ProviderError> {
    if key.len() < MIN_KEY_LEN {
        return Err(ProviderError::Decode(format!(
            "cipher key too short: {} bytes",
            key.len()
        )));
    }

    let mut index: usize = 16;
    for byte in data.iter_mut() {
        *byte ^= key[index];
        index += 1;
        if index % 8 == 0 {
            index += 16;
        }
        if index >= key.len() {
            index = (index + 8) % 24;
        }
    }
    Ok(())
}

/// Unwraps a compression envelope and inflates the payload.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ProviderError> {
    if data.len() < 8 {
        return Err(ProviderError::Decode(format!(
            "envelope truncated: {} bytes",
            data.len()
        )));
    }

    let head = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let expected_len = if head == ENVELOPE_MAGIC {
        u32::from_le_bytes([data[4], data[5], data[6], data[7]])
    } else if head == ENVELOPE_MAGIC.swap_bytes() {
        u32::from_be_bytes([data[4], data[5], data[6], data[7]])
    } else {
        return Err(ProviderError::Decode(format!(
            "bad envelope magic: {:#010x}",
            head
        )));
    } as usize;

    let mut out = Vec::with_capacity(expected_len);
    ZlibDecoder::new(&data[8..])
        .read_to_end(&mut out)
        .map_err(|e| ProviderError::Decode(format!("inflate failed: {}", e)))?;

    if out.len() != expected_len {
        return Err(ProviderError::Decode(format!(
            "envelope size mismatch: header {} bytes, stream {} bytes",
            expected_len,
            out.len()
        )));
    }
    Ok(out)
}
