//! Randomized model-based conformance checking of postings codecs.
//!
//! A run generates a random [`Model`], writes it through a codec, opens the
//! segment again and lets several [`Verifier`] threads compare every read path
//! against the model concurrently. All randomness flows from one seed, which
//! is reported on both success and failure.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tessera::codec::CodecConfig;
//! use tessera::conformance::{ConformanceConfig, ConformanceRunner};
//! use tessera::storage::memory::MemoryStorage;
//!
//! let mut config = ConformanceConfig {
//!     seed: Some(42),
//!     codec: CodecConfig::from_name("block").unwrap(),
//!     ..Default::default()
//! };
//! config.model.max_terms = 8;
//! config.model.max_doc_freq = 30;
//! config.verify.iterations = 2;
//!
//! let runner = ConformanceRunner::new(config, Arc::new(MemoryStorage::default())).unwrap();
//! let report = runner.run().unwrap();
//! assert_eq!(report.seed, 42);
//! ```

pub mod config;
pub mod fixed;
pub mod model;
pub mod runner;
pub mod verifier;
pub mod writer;

pub use config::{ConformanceConfig, ModelConfig, VerifyConfig};
pub use fixed::{FixedReport, check_fixed_postings};
pub use model::{FieldData, Model, ModelGenerator, PositionData, TermData};
pub use runner::{ConformanceRunner, RunReport, derive_thread_seed};
pub use verifier::{Verifier, VerifyReport};
pub use writer::{WriteSummary, write_segment};
