//! Write side of the codec boundary.
//!
//! A segment is written through three nested sessions:
//!
//! ```text
//! FieldsConsumer::add_field ─► TermsConsumer::start_term ─► PostingsConsumer
//!                              TermsConsumer::finish_term ◄─┘
//!                  finish  ◄───┘
//! ```
//!
//! Each inner session mutably borrows the outer one, so a term cannot outlive
//! its field and a field cannot be finished while a term is open.
//!
//! Callers must present fields in ascending name order, terms in ascending
//! byte order, documents in ascending id order and positions in ascending
//! order. Implementations are free to assume this and do not check it.

use serde::{Deserialize, Serialize};

use crate::codec::DocId;
use crate::error::Result;
use crate::schema::FieldInfo;

/// Statistics of one term, reported when the term is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStats {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Sum of the term's frequency over those documents. 0 for docs-only fields.
    pub total_term_freq: u64,
}

impl TermStats {
    pub fn new(doc_freq: u32, total_term_freq: u64) -> Self {
        TermStats {
            doc_freq,
            total_term_freq,
        }
    }
}

/// Statistics of one field, reported when the field is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    pub sum_total_term_freq: u64,
    pub sum_doc_freq: u64,
    /// Number of distinct documents containing any term of the field.
    pub doc_count: u32,
}

/// Top-level writer for one segment.
pub trait FieldsConsumer: Send {
    /// Start writing the terms of `field`.
    fn add_field(&mut self, field: &FieldInfo) -> Result<Box<dyn TermsConsumer + '_>>;

    /// Flush every file of the segment.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Writer for the terms of one field.
pub trait TermsConsumer {
    /// Start a term. Its postings are written through the returned consumer.
    fn start_term(&mut self, text: &[u8]) -> Result<&mut dyn PostingsConsumer>;

    /// Finish the term started last.
    fn finish_term(&mut self, text: &[u8], stats: TermStats) -> Result<()>;

    /// Finish the field.
    fn finish(self: Box<Self>, stats: FieldStats) -> Result<()>;
}

/// Writer for the postings of one term.
pub trait PostingsConsumer {
    /// Start a document. `freq` is 0 for docs-only fields.
    fn start_doc(&mut self, doc: DocId, freq: u32) -> Result<()>;

    /// Add one position of the current document.
    fn add_position(&mut self, position: u32, payload: Option<&[u8]>) -> Result<()>;

    /// Finish the current document.
    fn finish_doc(&mut self) -> Result<()>;
}
