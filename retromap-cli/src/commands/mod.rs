//! CLI command implementations.

pub mod cache;
pub mod common;
pub mod dates;
pub mod export;
