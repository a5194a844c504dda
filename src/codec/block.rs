//! Block-structured codec with a sparse term index and skip data.
//!
//! A segment is written to five files:
//!
//! | File | Contents |
//! |------|----------|
//! | `.tim` | term records, prefix compressed, with delta-coded file pointers |
//! | `.tip` | codec geometry, per-field summary, sparse term index |
//! | `.doc` | doc deltas with the frequency folded in, then per-term skip data |
//! | `.pos` | position deltas with a payload flag and payload length |
//! | `.pay` | payload bytes |
//!
//! Every `term_index_interval`-th term of a field starts an index block: its
//! record is written without a shared prefix and with absolute file pointers,
//! and the `.tip` index points at it. A reader can therefore start decoding at
//! any index entry. Terms with more than `skip_interval` documents carry a
//! skip list with one entry per `skip_interval` documents.

use serde::{Deserialize, Serialize};

pub mod postings_reader;
pub mod postings_writer;
pub mod skip;
pub mod terms_reader;
pub mod terms_writer;

pub const TERMS_EXTENSION: &str = "tim";
pub const TERMS_INDEX_EXTENSION: &str = "tip";
pub const DOC_EXTENSION: &str = "doc";
pub const POS_EXTENSION: &str = "pos";
pub const PAY_EXTENSION: &str = "pay";

pub(crate) const TERMS_MAGIC: u32 = 0x5442_544D;
pub(crate) const TERMS_INDEX_MAGIC: u32 = 0x5442_5450;
pub(crate) const DOC_MAGIC: u32 = 0x5442_444F;
pub(crate) const POS_MAGIC: u32 = 0x5442_5053;
pub(crate) const PAY_MAGIC: u32 = 0x5442_5041;
pub(crate) const VERSION: u32 = 1;

/// Configuration specific to the block codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockCodecConfig {
    /// Terms per sparse index entry.
    pub term_index_interval: u32,

    /// Documents per skip entry.
    pub skip_interval: u32,
}

impl Default for BlockCodecConfig {
    fn default() -> Self {
        BlockCodecConfig {
            term_index_interval: 16,
            skip_interval: 8,
        }
    }
}

/// Where a term's postings live and how many there are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermMeta {
    pub doc_freq: u32,
    pub total_term_freq: u64,
    pub doc_fp: u64,
    pub pos_fp: u64,
    pub pay_fp: u64,
    /// Offset of the skip data from `doc_fp`, present when
    /// `doc_freq > skip_interval`.
    pub skip_offset: Option<u64>,
}
