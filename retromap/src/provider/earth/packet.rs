//! Quadtree metadata packet parsing.
//!
//! Historical date/epoch metadata is embedded in compact binary packets,
//! one packet per 4-level subtree of the quadtree. A packet rooted at path
//! `r` (where `r`'s length is a multiple of 4, the empty path being the
//! root) describes nodes at relative subpaths of 1 to 4 digits.
//!
//! After the cipher and compression envelope are stripped, a packet reads:
//!
//! ```text
//! [u16 LE node count]
//! per node:
//!   [u8 subpath length (1..=4)] [subpath digits, one byte each, 0..=3]
//!   [u16 LE entry count]
//!   per entry: [u32 LE packed date] [u32 LE epoch]
//! ```
//!
//! The metadata is observably incomplete at high zoom for recent dates;
//! epochs under which pixel data exists are sometimes absent here. That is
//! why [`super::epoch`] layers fallbacks on top of what a packet reports.

use std::collections::HashMap;

use crate::coord::QuadtreePath;
use crate::provider::ProviderError;

use super::dates::PackedDate;

/// Number of quadtree levels spanned by one metadata packet.
pub const PACKET_LEVELS: u8 = 4;

/// One (date, epoch) pair reported for a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatedEntry {
    pub date: PackedDate,
    pub epoch: u32,
}

/// Everything the metadata tree reports for a single tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileMetadata {
    pub entries: Vec<DatedEntry>,
}

impl TileMetadata {
    /// The epoch reported for an exact date, if any.
    pub fn epoch_for_date(&self, date: PackedDate) -> Option<u32> {
        self.entries.iter().find(|e| e.date == date).map(|e| e.epoch)
    }

    /// All distinct dates, newest first.
    pub fn dates(&self) -> Vec<PackedDate> {
        let mut dates: Vec<PackedDate> = self.entries.iter().map(|e| e.date).collect();
        dates.sort_unstable();
        dates.dedup();
        dates.reverse();
        dates
    }
}

/// A parsed metadata packet: nodes keyed by relative subpath digits.
#[derive(Debug, Clone, Default)]
pub struct QuadtreePacket {
    nodes: HashMap<String, TileMetadata>,
}

impl QuadtreePacket {
    /// Look up the node at a relative subpath (digit string, 1..=4 digits).
    pub fn node(&self, subpath: &str) -> Option<&TileMetadata> {
        self.nodes.get(subpath)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The root path of the packet covering `path`, plus the relative subpath.
///
/// Paths of length 1..=4 live in the root packet (empty root path); length
/// 5..=8 in a packet rooted at the first 4 digits, and so on.
pub fn packet_root_for(path: &QuadtreePath) -> (QuadtreePath, String) {
    let len = path.as_str().len();
    if len == 0 {
        return (path.clone(), String::new());
    }
    let root_len = ((len - 1) / PACKET_LEVELS as usize) * PACKET_LEVELS as usize;
    let root = path.truncated(root_len as u8);
    let subpath = path.as_str()[root_len..].to_string();
    (root, subpath)
}

/// Parse a decrypted, decompressed metadata packet.
pub fn parse_packet(data: &[u8]) -> Result<QuadtreePacket, ProviderError> {
    let mut cursor = Cursor::new(data);
    let node_count = cursor.read_u16()? as usize;
    let mut nodes = HashMap::with_capacity(node_count);

    for _ in 0..node_count {
        let subpath_len = cursor.read_u8()? as usize;
        if subpath_len == 0 || subpath_len > PACKET_LEVELS as usize {
            return Err(ProviderError::Decode(format!(
                "packet node subpath length {} outside 1..={}",
                subpath_len, PACKET_LEVELS
            )));
        }
        let mut subpath = String::with_capacity(subpath_len);
        for _ in 0..subpath_len {
            let digit = cursor.read_u8()?;
            if digit > 3 {
                return Err(ProviderError::Decode(format!(
                    "packet node digit {} outside 0..=3",
                    digit
                )));
            }
            subpath.push((b'0' + digit) as char);
        }

        let entry_count = cursor.read_u16()? as usize;
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let date = PackedDate::from_raw(cursor.read_u32()?);
            let epoch = cursor.read_u32()?;
            entries.push(DatedEntry { date, epoch });
        }

        nodes.insert(subpath, TileMetadata { entries });
    }

    if !cursor.at_end() {
        return Err(ProviderError::Decode(format!(
            "{} trailing bytes after packet nodes",
            cursor.remaining()
        )));
    }

    Ok(QuadtreePacket { nodes })
}

/// Minimal byte cursor; every read is bounds-checked.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProviderError> {
        if self.pos + n > self.data.len() {
            return Err(ProviderError::Decode(format!(
                "packet truncated at byte {} (wanted {} more)",
                self.pos, n
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ProviderError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ProviderError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ProviderError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Serialize a packet for tests; inverse of [`parse_packet`].
    pub fn encode_packet(nodes: &[(&str, Vec<(u32, u32)>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(nodes.len() as u16).to_le_bytes());
        for (subpath, entries) in nodes {
            out.push(subpath.len() as u8);
            for b in subpath.bytes() {
                out.push(b - b'0');
            }
            out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for (date, epoch) in entries {
                out.extend_from_slice(&date.to_le_bytes());
                out.extend_from_slice(&epoch.to_le_bytes());
            }
        }
        out
    }

    fn date(year: u16, month: u8, day: u8) -> u32 {
        PackedDate::pack(year, month, day).raw()
    }

    #[test]
    fn test_parse_single_node() {
        let wire = encode_packet(&[("021", vec![(date(2020, 5, 1), 301), (date(2018, 3, 9), 287)])]);
        let packet = parse_packet(&wire).unwrap();

        assert_eq!(packet.len(), 1);
        let node = packet.node("021").unwrap();
        assert_eq!(node.entries.len(), 2);
        assert_eq!(node.entries[0].epoch, 301);
        assert_eq!(
            node.epoch_for_date(PackedDate::pack(2018, 3, 9)),
            Some(287)
        );
        assert_eq!(node.epoch_for_date(PackedDate::pack(2018, 3, 10)), None);
    }

    #[test]
    fn test_parse_empty_packet() {
        let packet = parse_packet(&encode_packet(&[])).unwrap();
        assert!(packet.is_empty());
    }

    #[test]
    fn test_dates_newest_first_deduplicated() {
        let wire = encode_packet(&[(
            "3",
            vec![
                (date(2015, 1, 1), 100),
                (date(2021, 6, 30), 200),
                (date(2015, 1, 1), 150),
            ],
        )]);
        let packet = parse_packet(&wire).unwrap();
        let dates = packet.node("3").unwrap().dates();
        assert_eq!(
            dates,
            vec![PackedDate::pack(2021, 6, 30), PackedDate::pack(2015, 1, 1)]
        );
    }

    #[test]
    fn test_reject_truncated_packet() {
        let mut wire = encode_packet(&[("01", vec![(date(2020, 1, 1), 5)])]);
        wire.truncate(wire.len() - 3);
        assert!(matches!(
            parse_packet(&wire),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_reject_trailing_garbage() {
        let mut wire = encode_packet(&[]);
        wire.push(0xAB);
        assert!(matches!(
            parse_packet(&wire),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_reject_bad_digit() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&1u16.to_le_bytes());
        wire.push(1); // subpath length
        wire.push(7); // invalid digit
        wire.extend_from_slice(&0u16.to_le_bytes());
        assert!(matches!(
            parse_packet(&wire),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_reject_oversized_subpath() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&1u16.to_le_bytes());
        wire.push(5); // longer than one packet spans
        assert!(matches!(
            parse_packet(&wire),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_packet_root_for() {
        let path = |s: &str| QuadtreePath::parse(s).unwrap();

        let (root, sub) = packet_root_for(&path("021"));
        assert_eq!(root.as_str(), "");
        assert_eq!(sub, "021");

        let (root, sub) = packet_root_for(&path("0213"));
        assert_eq!(root.as_str(), "");
        assert_eq!(sub, "0213");

        let (root, sub) = packet_root_for(&path("02131"));
        assert_eq!(root.as_str(), "0213");
        assert_eq!(sub, "1");

        let (root, sub) = packet_root_for(&path("021310213102"));
        assert_eq!(root.as_str(), "02131021");
        assert_eq!(sub, "3102");
    }
}
