//! Term enumeration over one field.
//!
//! A [`TermsEnum`] starts unpositioned. [`TermsEnum::next`] walks terms in
//! ascending byte order and [`TermsEnum::seek_ceil`] repositions to the
//! smallest term not less than a target. Once `next` returns `None` or
//! `seek_ceil` returns [`SeekStatus::End`] the enumerator is exhausted: it
//! stays exhausted until the next seek.

use crate::codec::block::terms_reader::BlockTermsEnum;
use crate::codec::postings_enum::{DocsAndPositionsEnum, DocsEnum};
use crate::codec::simple::reader::SimpleTermsEnum;
use crate::error::Result;

/// Outcome of [`TermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// Positioned on the target term.
    Found,
    /// Positioned on the smallest term greater than the target.
    NotFound,
    /// No term is greater than or equal to the target.
    End,
}

/// Result of an operation a codec may not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<T> {
    Supported(T),
    Unsupported,
}

impl<T> Capability<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Capability<U> {
        match self {
            Capability::Supported(value) => Capability::Supported(f(value)),
            Capability::Unsupported => Capability::Unsupported,
        }
    }
}

/// Enumerator over the terms of one field, one variant per codec.
#[derive(Debug, Clone)]
pub enum TermsEnum {
    Simple(SimpleTermsEnum),
    Block(BlockTermsEnum),
}

impl TermsEnum {
    /// Advance to the next term, or `None` once every term has been seen.
    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        match self {
            TermsEnum::Simple(terms) => terms.next(),
            TermsEnum::Block(terms) => terms.next(),
        }
    }

    /// Position on the smallest term greater than or equal to `target`.
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        match self {
            TermsEnum::Simple(terms) => terms.seek_ceil(target),
            TermsEnum::Block(terms) => terms.seek_ceil(target),
        }
    }

    /// Position on the term with zero-based rank `ord`.
    ///
    /// An `ord` past the last term is an invalid-argument error for codecs
    /// that support ordinals.
    pub fn seek_exact_ord(&mut self, ord: u64) -> Result<Capability<&[u8]>> {
        match self {
            TermsEnum::Simple(terms) => terms.seek_exact_ord(ord).map(Capability::Supported),
            TermsEnum::Block(_) => Ok(Capability::Unsupported),
        }
    }

    /// The current term, or `None` when unpositioned or exhausted.
    pub fn term(&self) -> Option<&[u8]> {
        match self {
            TermsEnum::Simple(terms) => terms.term(),
            TermsEnum::Block(terms) => terms.term(),
        }
    }

    /// Document frequency of the current term.
    pub fn doc_freq(&self) -> Result<u32> {
        match self {
            TermsEnum::Simple(terms) => terms.doc_freq(),
            TermsEnum::Block(terms) => terms.doc_freq(),
        }
    }

    /// Total term frequency of the current term. 0 for docs-only fields.
    pub fn total_term_freq(&self) -> Result<u64> {
        match self {
            TermsEnum::Simple(terms) => terms.total_term_freq(),
            TermsEnum::Block(terms) => terms.total_term_freq(),
        }
    }

    /// Documents of the current term.
    ///
    /// A `reuse` enumerator from the same codec is reset in place.
    pub fn docs(&self, reuse: Option<DocsEnum>) -> Result<DocsEnum> {
        match self {
            TermsEnum::Simple(terms) => {
                let reuse = match reuse {
                    Some(DocsEnum::Simple(postings)) => Some(postings),
                    _ => None,
                };
                terms.docs(reuse).map(DocsEnum::Simple)
            }
            TermsEnum::Block(terms) => {
                let reuse = match reuse {
                    Some(DocsEnum::Block(postings)) => Some(postings),
                    _ => None,
                };
                terms.docs(reuse).map(DocsEnum::Block)
            }
        }
    }

    /// Documents and positions of the current term.
    ///
    /// Returns `None` when the field does not index positions.
    pub fn docs_and_positions(
        &self,
        reuse: Option<DocsAndPositionsEnum>,
    ) -> Result<Option<DocsAndPositionsEnum>> {
        match self {
            TermsEnum::Simple(terms) => {
                let reuse = match reuse {
                    Some(DocsAndPositionsEnum::Simple(postings)) => Some(postings),
                    _ => None,
                };
                Ok(terms
                    .docs_and_positions(reuse)?
                    .map(DocsAndPositionsEnum::Simple))
            }
            TermsEnum::Block(terms) => {
                let reuse = match reuse {
                    Some(DocsAndPositionsEnum::Block(postings)) => Some(postings),
                    _ => None,
                };
                Ok(terms
                    .docs_and_positions(reuse)?
                    .map(DocsAndPositionsEnum::Block))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability() {
        let supported: Capability<u32> = Capability::Supported(3);
        assert_eq!(supported.map(|v| v * 2), Capability::Supported(6));

        let unsupported: Capability<u32> = Capability::Unsupported;
        assert_eq!(unsupported.map(|v| v + 1), Capability::Unsupported);
    }
}
