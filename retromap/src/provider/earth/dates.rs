//! Packed date codec for the quadtree service.
//!
//! Dates ride the wire as a 32-bit integer: bits 9-19 carry the year,
//! bits 5-8 the month, bits 0-4 the day. The token the tile endpoint accepts
//! is the lowercase hexadecimal rendering of that integer.

use std::fmt;

use chrono::NaiveDate;

use crate::provider::ProviderError;

const DAY_BITS: u32 = 5;
const MONTH_BITS: u32 = 4;
const YEAR_BITS: u32 = 11;

const DAY_MASK: u32 = (1 << DAY_BITS) - 1;
const MONTH_MASK: u32 = (1 << MONTH_BITS) - 1;
const YEAR_MASK: u32 = (1 << YEAR_BITS) - 1;

/// A (year, month, day) triple packed into the provider's wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedDate(u32);

impl PackedDate {
    /// Pack a calendar date. Fields are masked to their wire widths, so
    /// out-of-range components are the caller's responsibility.
    pub fn pack(year: u16, month: u8, day: u8) -> Self {
        Self(
            ((year as u32 & YEAR_MASK) << (MONTH_BITS + DAY_BITS))
                | ((month as u32 & MONTH_MASK) << DAY_BITS)
                | (day as u32 & DAY_MASK),
        )
    }

    /// Reinterpret a raw wire integer.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn year(&self) -> u16 {
        ((self.0 >> (MONTH_BITS + DAY_BITS)) & YEAR_MASK) as u16
    }

    pub fn month(&self) -> u8 {
        ((self.0 >> DAY_BITS) & MONTH_MASK) as u8
    }

    pub fn day(&self) -> u8 {
        (self.0 & DAY_MASK) as u8
    }

    /// The lowercase hex token used by the tile-fetch endpoint.
    pub fn hex_token(&self) -> String {
        format!("{:x}", self.0)
    }

    /// Parse a hex token back into a packed date.
    pub fn from_hex_token(token: &str) -> Result<Self, ProviderError> {
        u32::from_str_radix(token, 16)
            .map(Self)
            .map_err(|e| ProviderError::Decode(format!("bad date token {:?}: {}", token, e)))
    }

    /// Convert to a calendar date, rejecting impossible combinations
    /// (month 0, day 32, ...) that the wire format can express.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year() as i32, self.month() as u32, self.day() as u32)
    }

    /// Pack a calendar date from chrono.
    pub fn from_naive_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::pack(date.year() as u16, date.month() as u8, date.day() as u8)
    }
}

impl fmt::Display for PackedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
    }
}
