//! Postings codecs.
//!
//! A codec persists per-field term dictionaries and postings through a
//! [`FieldsConsumer`] and reads them back through a [`FieldsProducer`]. Two
//! codecs are available, selected at runtime by [`CodecConfig`]:
//!
//! - **Simple**: one file decoded fully into memory at open. Supports ordinal
//!   seeks.
//! - **Block**: a prefix-compressed term dictionary with a sparse index and
//!   separate doc, position and payload streams with skip data. Ordinal seeks
//!   are [`Capability::Unsupported`].
//!
//! # Design Pattern
//!
//! The read side is a closed set of enum variants ([`TermsEnum`],
//! [`DocsEnum`], [`DocsAndPositionsEnum`], [`FieldsProducer`]), one per codec,
//! so capability gaps are values and never errors. The write side is a set of
//! object-safe traits whose sessions borrow each other to enforce nesting.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tessera::codec::{
//!     CodecConfig, CodecFactory, FieldStats, SegmentReadState, SegmentWriteState, SeekStatus,
//!     TermStats,
//! };
//! use tessera::schema::{FieldInfos, IndexOptions};
//! use tessera::storage::memory::MemoryStorage;
//!
//! # fn main() -> tessera::error::Result<()> {
//! let storage = Arc::new(MemoryStorage::default());
//! let mut field_infos = FieldInfos::new();
//! let field = field_infos.add("id", IndexOptions::DocsOnly, false)?.clone();
//!
//! let config = CodecConfig::default();
//! let state = SegmentWriteState::new(storage.clone(), "seg", field_infos.clone());
//! let mut consumer = CodecFactory::fields_consumer(&config, state)?;
//! {
//!     let mut terms = consumer.add_field(&field)?;
//!     let postings = terms.start_term(b"abc")?;
//!     postings.start_doc(4, 0)?;
//!     postings.finish_doc()?;
//!     terms.finish_term(b"abc", TermStats::new(1, 0))?;
//!     terms.finish(FieldStats { sum_total_term_freq: 0, sum_doc_freq: 1, doc_count: 1 })?;
//! }
//! consumer.close()?;
//!
//! let producer =
//!     CodecFactory::fields_producer(&config, SegmentReadState::new(storage, "seg", field_infos))?;
//! let mut terms = producer.terms("id")?.expect("field exists");
//! assert_eq!(terms.seek_ceil(b"abc")?, SeekStatus::Found);
//! assert_eq!(terms.doc_freq()?, 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::schema::FieldInfos;
use crate::storage::Storage;

pub mod block;
pub mod consumer;
pub mod postings_enum;
pub mod producer;
pub mod simple;
pub mod terms_enum;

pub use block::BlockCodecConfig;
pub use consumer::{FieldStats, FieldsConsumer, PostingsConsumer, TermStats, TermsConsumer};
pub use postings_enum::{DocId, DocIdSetIterator, DocsAndPositionsEnum, DocsEnum, NO_MORE_DOCS};
pub use producer::FieldsProducer;
pub use simple::SimpleCodecConfig;
pub use terms_enum::{Capability, SeekStatus, TermsEnum};

/// Configuration for codec types.
///
/// Each variant carries the configuration of one codec implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CodecConfig {
    /// Whole-segment in-memory codec.
    Simple(SimpleCodecConfig),
    /// Block-structured codec with a sparse term index and skip data.
    Block(BlockCodecConfig),
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig::Block(BlockCodecConfig::default())
    }
}

impl CodecConfig {
    /// Get a human-readable name for the codec.
    pub fn name(&self) -> &'static str {
        match self {
            CodecConfig::Simple(_) => "simple",
            CodecConfig::Block(_) => "block",
        }
    }

    /// Parse a codec name as printed by [`CodecConfig::name`].
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "simple" => Ok(CodecConfig::Simple(SimpleCodecConfig::default())),
            "block" => Ok(CodecConfig::Block(BlockCodecConfig::default())),
            other => Err(TesseraError::invalid_argument(format!(
                "Unknown codec '{other}' (expected 'simple' or 'block')"
            ))),
        }
    }

    /// Every codec with its default configuration.
    pub fn all() -> Vec<CodecConfig> {
        vec![
            CodecConfig::Simple(SimpleCodecConfig::default()),
            CodecConfig::Block(BlockCodecConfig::default()),
        ]
    }

    /// Whether the codec's terms enumerator can seek by ordinal.
    pub fn supports_ord(&self) -> bool {
        matches!(self, CodecConfig::Simple(_))
    }

    /// The same codec with randomly chosen block geometry.
    pub fn randomized<R: Rng>(&self, rng: &mut R) -> CodecConfig {
        match self {
            CodecConfig::Simple(_) => CodecConfig::Simple(SimpleCodecConfig {
                block_size: rng.random_range(2..=64),
            }),
            CodecConfig::Block(_) => CodecConfig::Block(BlockCodecConfig {
                term_index_interval: rng.random_range(13..=27),
                skip_interval: rng.random_range(2..=16),
            }),
        }
    }

    /// Reject configurations the codecs cannot work with.
    pub fn validate(&self) -> Result<()> {
        match self {
            CodecConfig::Simple(config) => {
                if config.block_size < 2 {
                    return Err(TesseraError::invalid_config(
                        "simple codec block_size must be at least 2",
                    ));
                }
            }
            CodecConfig::Block(config) => {
                if config.term_index_interval < 2 {
                    return Err(TesseraError::invalid_config(
                        "block codec term_index_interval must be at least 2",
                    ));
                }
                if config.skip_interval < 2 {
                    return Err(TesseraError::invalid_config(
                        "block codec skip_interval must be at least 2",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Everything a codec needs to write a segment.
#[derive(Debug, Clone)]
pub struct SegmentWriteState {
    pub storage: Arc<dyn Storage>,
    pub segment: String,
    pub field_infos: FieldInfos,
}

impl SegmentWriteState {
    pub fn new<S: Into<String>>(
        storage: Arc<dyn Storage>,
        segment: S,
        field_infos: FieldInfos,
    ) -> Self {
        SegmentWriteState {
            storage,
            segment: segment.into(),
            field_infos,
        }
    }

    /// File name of this segment with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        segment_file_name(&self.segment, extension)
    }
}

/// Everything a codec needs to open a segment.
#[derive(Debug, Clone)]
pub struct SegmentReadState {
    pub storage: Arc<dyn Storage>,
    pub segment: String,
    pub field_infos: FieldInfos,
}

impl SegmentReadState {
    pub fn new<S: Into<String>>(
        storage: Arc<dyn Storage>,
        segment: S,
        field_infos: FieldInfos,
    ) -> Self {
        SegmentReadState {
            storage,
            segment: segment.into(),
            field_infos,
        }
    }

    /// File name of this segment with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        segment_file_name(&self.segment, extension)
    }
}

fn segment_file_name(segment: &str, extension: &str) -> String {
    format!("{segment}.{extension}")
}

/// A factory for codec writers and readers.
pub struct CodecFactory;

impl CodecFactory {
    /// Create a writer for a new segment.
    pub fn fields_consumer(
        config: &CodecConfig,
        state: SegmentWriteState,
    ) -> Result<Box<dyn FieldsConsumer>> {
        config.validate()?;
        match config {
            CodecConfig::Simple(simple_config) => Ok(Box::new(
                simple::writer::SimpleFieldsWriter::new(simple_config.clone(), state)?,
            )),
            CodecConfig::Block(block_config) => Ok(Box::new(
                block::terms_writer::BlockFieldsWriter::new(block_config.clone(), state)?,
            )),
        }
    }

    /// Open a written segment for reading.
    pub fn fields_producer(
        config: &CodecConfig,
        state: SegmentReadState,
    ) -> Result<FieldsProducer> {
        config.validate()?;
        match config {
            CodecConfig::Simple(_) => Ok(FieldsProducer::Simple(
                simple::reader::SimpleFieldsReader::open(&state)?,
            )),
            CodecConfig::Block(_) => Ok(FieldsProducer::Block(
                block::terms_reader::BlockFieldsReader::open(&state)?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_codec_config_names() {
        for config in CodecConfig::all() {
            assert_eq!(CodecConfig::from_name(config.name()).unwrap(), config);
        }
        assert!(CodecConfig::from_name("lucene").is_err());
        assert_eq!(CodecConfig::default().name(), "block");
    }

    #[test]
    fn test_supports_ord() {
        assert!(CodecConfig::Simple(SimpleCodecConfig::default()).supports_ord());
        assert!(!CodecConfig::Block(BlockCodecConfig::default()).supports_ord());
    }

    #[test]
    fn test_randomized_stays_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for config in CodecConfig::all() {
            for _ in 0..50 {
                let randomized = config.randomized(&mut rng);
                assert_eq!(randomized.name(), config.name());
                randomized.validate().unwrap();
                if let CodecConfig::Block(block) = randomized {
                    assert!((13..=27).contains(&block.term_index_interval));
                }
            }
        }
    }

    #[test]
    fn test_validate_rejects_small_intervals() {
        let config = CodecConfig::Block(BlockCodecConfig {
            term_index_interval: 1,
            skip_interval: 8,
        });
        assert!(config.validate().is_err());

        let config = CodecConfig::Simple(SimpleCodecConfig { block_size: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_codec_config_serialization() {
        let config = CodecConfig::Block(BlockCodecConfig {
            term_index_interval: 16,
            skip_interval: 4,
        });
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"Block\""));

        let parsed: CodecConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);

        let parsed: CodecConfig = serde_json::from_str(r#"{"type":"Simple"}"#).unwrap();
        assert_eq!(parsed, CodecConfig::Simple(SimpleCodecConfig::default()));
    }
}
