//! Postings enumerator of the block codec.

use std::sync::Arc;

use crate::codec::block::TermMeta;
use crate::codec::block::skip::SkipList;
use crate::codec::block::terms_reader::BlockSegmentData;
use crate::codec::postings_enum::{DocId, DocIdSetIterator, NO_MORE_DOCS};
use crate::error::{Result, TesseraError};
use crate::schema::FieldInfo;
use crate::storage::structured::SliceReader;

/// Decodes the doc stream of one term and, on request, its positions.
///
/// Positions of documents the caller never looked at are skipped lazily the
/// first time `next_position` is called on a later document. Payload bytes
/// are located by offset and only copied out by `payload`.
#[derive(Debug, Clone)]
pub struct BlockPostingsEnum {
    doc_in: SliceReader,
    pos_in: SliceReader,
    pay: SliceReader,

    has_freqs: bool,
    has_positions: bool,
    has_payloads: bool,
    with_positions: bool,

    meta: TermMeta,
    skip: SkipList,

    /// Documents decoded so far.
    doc_upto: u32,
    accum: DocId,
    doc: Option<DocId>,
    freq: u32,

    /// Positions in `pos_in` not yet decoded, the current doc's included.
    pending_positions: u64,
    positions_read: u32,
    position: u32,
    pay_upto: u64,
    payload: Option<(u64, usize)>,
}

impl BlockPostingsEnum {
    pub(crate) fn new(
        segment: &Arc<BlockSegmentData>,
        field: &FieldInfo,
        meta: TermMeta,
        with_positions: bool,
    ) -> Result<Self> {
        let mut postings = BlockPostingsEnum {
            doc_in: segment.doc.clone(),
            pos_in: segment.pos.clone(),
            pay: segment.pay.clone(),
            has_freqs: false,
            has_positions: false,
            has_payloads: false,
            with_positions: false,
            meta,
            skip: SkipList::new(segment.skip_interval),
            doc_upto: 0,
            accum: 0,
            doc: None,
            freq: 0,
            pending_positions: 0,
            positions_read: 0,
            position: 0,
            pay_upto: 0,
            payload: None,
        };
        postings.reset(segment, field, meta, with_positions)?;
        Ok(postings)
    }

    /// Point this enumerator at another term, as if freshly created.
    pub(crate) fn reset(
        &mut self,
        segment: &Arc<BlockSegmentData>,
        field: &FieldInfo,
        meta: TermMeta,
        with_positions: bool,
    ) -> Result<()> {
        self.doc_in.clone_from(&segment.doc);
        self.pos_in.clone_from(&segment.pos);
        self.pay.clone_from(&segment.pay);

        self.has_freqs = field.has_freqs();
        self.has_positions = field.has_positions();
        self.has_payloads = field.has_payloads();
        self.with_positions = with_positions && self.has_positions;

        self.meta = meta;
        self.skip.reset(segment.skip_interval);

        self.doc_upto = 0;
        self.accum = 0;
        self.doc = None;
        self.freq = 0;
        self.pending_positions = 0;
        self.positions_read = 0;
        self.position = 0;
        self.pay_upto = meta.pay_fp;
        self.payload = None;

        self.doc_in.seek(meta.doc_fp)?;
        if self.with_positions {
            self.pos_in.seek(meta.pos_fp)?;
        }
        Ok(())
    }

    fn exhaust(&mut self) -> DocId {
        self.doc = Some(NO_MORE_DOCS);
        self.freq = 0;
        self.payload = None;
        NO_MORE_DOCS
    }

    /// Jump over whole skip intervals that end before `target`.
    fn skip_to(&mut self, target: DocId) -> Result<()> {
        let Some(skip_offset) = self.meta.skip_offset else {
            return Ok(());
        };

        if !self.skip.is_loaded() {
            let mut input = self.doc_in.clone();
            input.seek(self.meta.doc_fp + skip_offset)?;
            self.skip
                .load(&mut input, &self.meta, self.has_positions, self.has_payloads)?;
        }

        if let Some((docs_skipped, entry)) = self.skip.skip_target(target, self.doc_upto) {
            self.doc_in.seek(entry.doc_fp)?;
            self.doc_upto = docs_skipped;
            self.accum = entry.doc;
            if self.with_positions {
                self.pos_in.seek(entry.pos_fp)?;
                self.pay_upto = entry.pay_fp;
                self.pending_positions = 0;
            }
        }
        Ok(())
    }

    /// Decode past positions left unread by earlier documents.
    fn skip_pending_positions(&mut self) -> Result<()> {
        let stale = self.pending_positions - self.freq as u64;
        for _ in 0..stale {
            let code = self.pos_in.read_varint()?;
            if self.has_payloads && code & 1 == 1 {
                self.pay_upto += self.pos_in.read_varint()?;
            }
        }
        self.pending_positions = self.freq as u64;
        Ok(())
    }

    pub fn next_position(&mut self) -> Result<u32> {
        if !self.with_positions {
            return Err(TesseraError::invalid_operation(
                "Positions were not requested from this enumerator",
            ));
        }
        let doc = match self.doc {
            Some(doc) if doc != NO_MORE_DOCS => doc,
            _ => {
                return Err(TesseraError::invalid_operation(
                    "Postings enum is not positioned on a document",
                ));
            }
        };
        if self.positions_read >= self.freq {
            return Err(TesseraError::invalid_operation(format!(
                "All {} positions of doc {doc} already read",
                self.freq
            )));
        }

        if self.positions_read == 0 {
            self.skip_pending_positions()?;
        }

        let code = self.pos_in.read_varint()?;
        let delta = if self.has_payloads { code >> 1 } else { code };
        self.position = u32::try_from(self.position as u64 + delta)
            .map_err(|_| TesseraError::codec(format!("Position overflow in doc {doc}")))?;

        self.payload = if self.has_payloads && code & 1 == 1 {
            let len = self.pos_in.read_varint()?;
            let start = self.pay_upto;
            self.pay_upto += len;
            Some((start, len as usize))
        } else {
            None
        };

        self.positions_read += 1;
        self.pending_positions -= 1;
        Ok(self.position)
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn payload(&self) -> Result<Option<&[u8]>> {
        match self.payload {
            Some((offset, len)) => Ok(Some(self.pay.bytes_at(offset, len)?)),
            None => Ok(None),
        }
    }
}

impl DocIdSetIterator for BlockPostingsEnum {
    fn doc_id(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == Some(NO_MORE_DOCS) {
            return Ok(NO_MORE_DOCS);
        }
        if self.doc_upto >= self.meta.doc_freq {
            return Ok(self.exhaust());
        }

        let code = self.doc_in.read_varint()?;
        let (delta, freq) = if self.has_freqs {
            let freq = if code & 1 == 1 {
                1
            } else {
                self.doc_in.read_varint_u32()?
            };
            (code >> 1, freq)
        } else {
            (code, 0)
        };

        self.accum = u32::try_from(delta)
            .ok()
            .and_then(|delta| self.accum.checked_add(delta))
            .filter(|doc| *doc != NO_MORE_DOCS)
            .ok_or_else(|| TesseraError::codec("Doc id overflow in postings"))?;
        self.doc_upto += 1;
        self.doc = Some(self.accum);
        self.freq = freq;

        if self.with_positions {
            self.pending_positions += freq as u64;
            self.positions_read = 0;
            self.position = 0;
            self.payload = None;
        }
        Ok(self.accum)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == Some(NO_MORE_DOCS) {
            return Ok(NO_MORE_DOCS);
        }

        self.skip_to(target)?;
        loop {
            let doc = self.next_doc()?;
            if doc >= target {
                return Ok(doc);
            }
        }
    }

    fn freq(&self) -> u32 {
        match self.doc {
            Some(doc) if doc != NO_MORE_DOCS => self.freq,
            _ => 0,
        }
    }
}
