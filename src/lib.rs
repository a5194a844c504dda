//! # Tessera
//!
//! A postings codec contract with two reference codecs and a randomized
//! conformance checker.
//!
//! ## Features
//!
//! - Streaming write side: fields, terms, documents and positions pushed in order
//! - Read side with term seeking, document skipping and payload retrieval
//! - `simple` codec: one file, decoded into memory, ordinal seeks
//! - `block` codec: sparse term index, skip lists, separate payload stream
//! - Model-based verification from several threads sharing one reader

pub mod cli;
pub mod codec;
pub mod conformance;
pub mod error;
pub mod schema;
pub mod storage;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
