//! Root descriptor parsing for the quadtree service.
//!
//! Each flavor of the service (current and historical imagery) publishes a
//! small binary root descriptor. Its outer envelope is a flat sequence of
//! tagged, length-delimited fields:
//!
//! ```text
//! [u8 tag][u32 LE length][length bytes] ...
//! ```
//!
//! Tag 1 carries the session's keystream key in the clear; tag 2 carries the
//! descriptor body, encrypted with that key and wrapped in the compression
//! envelope of [`super::crypto`]. Unknown tags are skipped. The decrypted
//! body uses the same field scheme; tag 1 there is the 4-byte quadtree
//! version the metadata and tile endpoints are parameterized with.

use crate::provider::ProviderError;

use super::crypto;

const FIELD_KEY: u8 = 1;
const FIELD_BODY: u8 = 2;
const FIELD_QUADTREE_VERSION: u8 = 1;

/// Decoded root descriptor: everything a session needs.
#[derive(Debug, Clone)]
pub struct RootDescriptor {
    /// Symmetric keystream key for this session's packets.
    pub key: Vec<u8>,
    /// Version the quadtree metadata endpoint must be asked for.
    pub quadtree_version: u32,
}

/// Iterate tagged length-delimited fields, yielding (tag, payload).
fn fields(mut data: &[u8]) -> impl Iterator<Item = Result<(u8, &[u8]), ProviderError>> {
    std::iter::from_fn(move || {
        if data.is_empty() {
            return None;
        }
        if data.len() < 5 {
            data = &[];
            return Some(Err(ProviderError::Decode(
                "truncated descriptor field header".into(),
            )));
        }
        let tag = data[0];
        let len = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
        if data.len() < 5 + len {
            data = &[];
            return Some(Err(ProviderError::Decode(format!(
                "descriptor field {} overruns buffer",
                tag
            ))));
        }
        let payload = &data[5..5 + len];
        data = &data[5 + len..];
        Some(Ok((tag, payload)))
    })
}

/// Parse a raw root descriptor response.
pub fn parse_root_descriptor(raw: &[u8]) -> Result<RootDescriptor, ProviderError> {
    let mut key: Option<Vec<u8>> = None;
    let mut body: Option<Vec<u8>> = None;

    for field in fields(raw) {
        let (tag, payload) = field?;
        match tag {
            FIELD_KEY => key = Some(payload.to_vec()),
            FIELD_BODY => body = Some(payload.to_vec()),
            _ => {}
        }
    }

    let key = key.ok_or_else(|| ProviderError::Decode("descriptor missing key field".into()))?;
    let mut body =
        body.ok_or_else(|| ProviderError::Decode("descriptor missing body field".into()))?;

    crypto::apply_keystream(&key, &mut body)?;
    let plain = crypto::decompress(&body)?;

    let mut quadtree_version: Option<u32> = None;
    for field in fields(&plain) {
        let (tag, payload) = field?;
        if tag == FIELD_QUADTREE_VERSION {
            if payload.len() != 4 {
                return Err(ProviderError::Decode(format!(
                    "quadtree version field has {} bytes, expected 4",
                    payload.len()
                )));
            }
            quadtree_version =
                Some(u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]));
        }
    }

    let quadtree_version = quadtree_version
        .ok_or_else(|| ProviderError::Decode("descriptor body missing quadtree version".into()))?;

    Ok(RootDescriptor {
        key,
        quadtree_version,
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::provider::earth::crypto::tests::{seal, test_key};

    fn field(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Build a wire root descriptor for tests.
    pub fn encode_root_descriptor(key: &[u8], quadtree_version: u32) -> Vec<u8> {
        let body_plain = field(FIELD_QUADTREE_VERSION, &quadtree_version.to_le_bytes());
        let body_wire = seal(key, &body_plain);

        let mut out = field(FIELD_KEY, key);
        out.extend_from_slice(&field(FIELD_BODY, &body_wire));
        out
    }

    #[test]
    fn test_parse_roundtrip() {
        let key = test_key();
        let wire = encode_root_descriptor(&key, 357);

        let descriptor = parse_root_descriptor(&wire).unwrap();
        assert_eq!(descriptor.key, key);
        assert_eq!(descriptor.quadtree_version, 357);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let key = test_key();
        let mut wire = field(9, b"future extension");
        wire.extend_from_slice(&encode_root_descriptor(&key, 42));

        let descriptor = parse_root_descriptor(&wire).unwrap();
        assert_eq!(descriptor.quadtree_version, 42);
    }

    #[test]
    fn test_missing_key_field() {
        let wire = field(FIELD_BODY, b"opaque");
        let result = parse_root_descriptor(&wire);
        assert!(matches!(result, Err(ProviderError::Decode(_))));
    }

    #[test]
    fn test_truncated_field_header() {
        let key = test_key();
        let mut wire = encode_root_descriptor(&key, 1);
        wire.extend_from_slice(&[3, 0]); // tag + partial length
        assert!(matches!(
            parse_root_descriptor(&wire),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_field_overrunning_buffer() {
        let mut wire = vec![FIELD_KEY];
        wire.extend_from_slice(&100u32.to_le_bytes());
        wire.extend_from_slice(&[0u8; 10]); // claims 100 bytes, has 10
        assert!(matches!(
            parse_root_descriptor(&wire),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_corrupted_body_fails_decode() {
        let key = test_key();
        let mut wire = encode_root_descriptor(&key, 7);
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(matches!(
            parse_root_descriptor(&wire),
            Err(ProviderError::Decode(_))
        ));
    }
}
