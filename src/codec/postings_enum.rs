//! Document and position enumeration for one term.

use crate::codec::block::postings_reader::BlockPostingsEnum;
use crate::codec::simple::reader::SimplePostingsEnum;
use crate::error::Result;

/// Document identifier within a segment.
pub type DocId = u32;

/// Returned by [`DocIdSetIterator`] once the documents are exhausted.
pub const NO_MORE_DOCS: DocId = DocId::MAX;

/// Iteration over the ascending document ids of one term.
pub trait DocIdSetIterator {
    /// The current document: `None` before the first call to
    /// [`next_doc`](Self::next_doc) or [`advance`](Self::advance), then the
    /// last returned id (possibly [`NO_MORE_DOCS`]).
    fn doc_id(&self) -> Option<DocId>;

    /// Move to the next document, returning [`NO_MORE_DOCS`] when exhausted.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Move to the first document at or after `target`.
    ///
    /// Always moves at least one document forward: a `target` at or below the
    /// current document behaves like [`next_doc`](Self::next_doc).
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Frequency of the term in the current document. 0 for docs-only fields.
    fn freq(&self) -> u32;
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Self::Simple($inner) => $body,
            Self::Block($inner) => $body,
        }
    };
}

/// Document enumerator, one variant per codec.
#[derive(Debug, Clone)]
pub enum DocsEnum {
    Simple(SimplePostingsEnum),
    Block(BlockPostingsEnum),
}

impl DocIdSetIterator for DocsEnum {
    fn doc_id(&self) -> Option<DocId> {
        dispatch!(self, postings => postings.doc_id())
    }

    fn next_doc(&mut self) -> Result<DocId> {
        dispatch!(self, postings => postings.next_doc())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        dispatch!(self, postings => postings.advance(target))
    }

    fn freq(&self) -> u32 {
        dispatch!(self, postings => postings.freq())
    }
}

/// Document and position enumerator, one variant per codec.
#[derive(Debug, Clone)]
pub enum DocsAndPositionsEnum {
    Simple(SimplePostingsEnum),
    Block(BlockPostingsEnum),
}

impl DocsAndPositionsEnum {
    /// Next position of the current document.
    ///
    /// Calling this more than [`freq`](DocIdSetIterator::freq) times for one
    /// document is an invalid-operation error.
    pub fn next_position(&mut self) -> Result<u32> {
        dispatch!(self, postings => postings.next_position())
    }

    /// Whether the last returned position carries a payload.
    pub fn has_payload(&self) -> bool {
        dispatch!(self, postings => postings.has_payload())
    }

    /// Payload of the last returned position.
    ///
    /// Skipping this call never affects later positions or documents.
    pub fn payload(&self) -> Result<Option<&[u8]>> {
        dispatch!(self, postings => postings.payload())
    }
}

impl DocIdSetIterator for DocsAndPositionsEnum {
    fn doc_id(&self) -> Option<DocId> {
        dispatch!(self, postings => postings.doc_id())
    }

    fn next_doc(&mut self) -> Result<DocId> {
        dispatch!(self, postings => postings.next_doc())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        dispatch!(self, postings => postings.advance(target))
    }

    fn freq(&self) -> u32 {
        dispatch!(self, postings => postings.freq())
    }
}
