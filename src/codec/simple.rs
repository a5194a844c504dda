//! Single-file codec decoded fully into memory.
//!
//! The whole segment lives in `{segment}.mem`:
//!
//! ```text
//! header        magic u32, version u32
//! block size    varint
//! field count   varint
//! per field     name, number, options u8, payloads u8,
//!               sum_total_term_freq, sum_doc_freq, doc_count, term count
//! per term      text (length prefixed), doc_freq, total_term_freq, postings
//! footer        crc32
//! ```
//!
//! Postings follow the delta layout of a classic posting list: the doc delta,
//! then the frequency when the field has one, then each position as a delta.
//! When the field stores payloads the position delta is shifted left one bit
//! and the low bit flags a length-prefixed payload.

use serde::{Deserialize, Serialize};

pub mod reader;
pub mod writer;

/// File extension of the segment file.
pub const EXTENSION: &str = "mem";

pub(crate) const MAGIC: u32 = 0x5453_4D50;
pub(crate) const VERSION: u32 = 1;

/// Configuration specific to the simple codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleCodecConfig {
    /// Postings per block summary used to speed up `advance`. Stored in the
    /// segment, so readers always use the size the writer was given.
    pub block_size: usize,
}

impl Default for SimpleCodecConfig {
    fn default() -> Self {
        SimpleCodecConfig { block_size: 32 }
    }
}
