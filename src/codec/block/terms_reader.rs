//! Term dictionary reader of the block codec.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::codec::block::postings_reader::BlockPostingsEnum;
use crate::codec::block::terms_writer::IndexEntry;
use crate::codec::block::{
    DOC_EXTENSION, DOC_MAGIC, PAY_EXTENSION, PAY_MAGIC, POS_EXTENSION, POS_MAGIC,
    TERMS_EXTENSION, TERMS_INDEX_EXTENSION, TERMS_INDEX_MAGIC, TERMS_MAGIC, TermMeta, VERSION,
};
use crate::codec::consumer::FieldStats;
use crate::codec::terms_enum::SeekStatus;
use crate::codec::SegmentReadState;
use crate::error::{Result, TesseraError};
use crate::schema::{FieldInfo, IndexOptions};
use crate::storage::structured::{SliceReader, read_checked};

/// The five loaded files of a segment plus its geometry.
#[derive(Debug)]
pub(crate) struct BlockSegmentData {
    pub(crate) terms: SliceReader,
    pub(crate) doc: SliceReader,
    pub(crate) pos: SliceReader,
    pub(crate) pay: SliceReader,
    pub(crate) term_index_interval: u32,
    pub(crate) skip_interval: u32,
}

/// Per-field summary read from `.tip`.
#[derive(Debug)]
struct BlockFieldMeta {
    info: FieldInfo,
    num_terms: u64,
    stats: FieldStats,
    terms_start: u64,
    index: Vec<IndexEntry>,
}

/// Opened block-codec segment.
#[derive(Debug)]
pub struct BlockFieldsReader {
    segment: Arc<BlockSegmentData>,
    fields: BTreeMap<String, Arc<BlockFieldMeta>>,
}

impl BlockFieldsReader {
    /// Load and verify the segment files, then parse the terms index.
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let load = |extension: &str, magic: u32| -> Result<SliceReader> {
            let mut input = read_checked(state.storage.as_ref(), &state.file_name(extension))?;
            input.check_header(magic, VERSION)?;
            Ok(input)
        };

        let terms = load(TERMS_EXTENSION, TERMS_MAGIC)?;
        let doc = load(DOC_EXTENSION, DOC_MAGIC)?;
        let pos = load(POS_EXTENSION, POS_MAGIC)?;
        let pay = load(PAY_EXTENSION, PAY_MAGIC)?;
        let mut index = load(TERMS_INDEX_EXTENSION, TERMS_INDEX_MAGIC)?;

        let term_index_interval = index.read_varint_u32()?;
        let skip_interval = index.read_varint_u32()?;
        if term_index_interval < 2 || skip_interval < 2 {
            return Err(TesseraError::codec(format!(
                "Invalid block geometry: term_index_interval={term_index_interval}, skip_interval={skip_interval}"
            )));
        }

        let num_fields = index.read_varint()?;
        let mut fields = BTreeMap::new();
        for _ in 0..num_fields {
            let meta = Self::read_field(&mut index, state, term_index_interval, terms.len())?;
            fields.insert(meta.info.name.clone(), Arc::new(meta));
        }

        if !index.is_eof() {
            return Err(TesseraError::codec(format!(
                "Trailing bytes in {} at offset {}",
                state.file_name(TERMS_INDEX_EXTENSION),
                index.position()
            )));
        }

        debug!(
            "Opened block segment {} ({} fields, term_index_interval={}, skip_interval={})",
            state.segment,
            fields.len(),
            term_index_interval,
            skip_interval
        );

        Ok(BlockFieldsReader {
            segment: Arc::new(BlockSegmentData {
                terms,
                doc,
                pos,
                pay,
                term_index_interval,
                skip_interval,
            }),
            fields,
        })
    }

    fn read_field(
        index: &mut SliceReader,
        state: &SegmentReadState,
        term_index_interval: u32,
        terms_len: u64,
    ) -> Result<BlockFieldMeta> {
        let name = index.read_string()?;
        let number = index.read_varint_u32()?;
        let options = IndexOptions::from_code(index.read_u8()?)
            .ok_or_else(|| TesseraError::codec("Unknown index options"))?;
        let store_payloads = index.read_u8()? != 0;
        let info = FieldInfo::new(name, number, options).with_payloads(store_payloads);
        state.field_infos.check_persisted(&info)?;

        let num_terms = index.read_varint()?;
        let stats = FieldStats {
            sum_total_term_freq: index.read_varint()?,
            sum_doc_freq: index.read_varint()?,
            doc_count: index.read_varint_u32()?,
        };
        let terms_start = index.read_varint()?;
        if terms_start > terms_len {
            return Err(TesseraError::codec(format!(
                "Terms of field '{}' start past the end of the dictionary",
                info.name
            )));
        }

        let num_entries = index.read_varint()?;
        let expected = num_terms.div_ceil(term_index_interval as u64);
        if num_entries != expected {
            return Err(TesseraError::codec(format!(
                "Field '{}' has {num_entries} index entries, expected {expected}",
                info.name
            )));
        }

        let mut entries = Vec::with_capacity(num_entries as usize);
        for i in 0..num_entries {
            let entry = IndexEntry {
                term: index.read_bytes()?,
                term_fp: index.read_varint()?,
                ord: index.read_varint()?,
            };
            if entry.ord != i * term_index_interval as u64 {
                return Err(TesseraError::codec(format!(
                    "Index entry {i} of field '{}' has ordinal {}",
                    info.name, entry.ord
                )));
            }
            entries.push(entry);
        }

        Ok(BlockFieldMeta {
            info,
            num_terms,
            stats,
            terms_start,
            index: entries,
        })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn terms(&self, field: &str) -> Result<Option<BlockTermsEnum>> {
        let Some(meta) = self.fields.get(field) else {
            return Ok(None);
        };

        let mut input = self.segment.terms.clone();
        input.seek(meta.terms_start)?;
        Ok(Some(BlockTermsEnum {
            segment: Arc::clone(&self.segment),
            field: Arc::clone(meta),
            input,
            state: TermState::Unpositioned,
            ord: 0,
            term: Vec::new(),
            meta: TermMeta::default(),
        }))
    }

    pub fn field_stats(&self, field: &str) -> Option<FieldStats> {
        self.fields.get(field).map(|meta| meta.stats)
    }

    pub fn field_info(&self, field: &str) -> Option<&FieldInfo> {
        self.fields.get(field).map(|meta| &meta.info)
    }

    pub fn num_terms(&self, field: &str) -> Option<u64> {
        self.fields.get(field).map(|meta| meta.num_terms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermState {
    Unpositioned,
    Positioned,
    Exhausted,
}

/// Terms enumerator of the block codec.
///
/// Terms are decoded one record at a time from `.tim`; a seek first jumps to
/// the closest index block at or before the target.
#[derive(Debug, Clone)]
pub struct BlockTermsEnum {
    segment: Arc<BlockSegmentData>,
    field: Arc<BlockFieldMeta>,
    input: SliceReader,
    state: TermState,
    ord: u64,
    term: Vec<u8>,
    meta: TermMeta,
}

impl BlockTermsEnum {
    /// Decode the record of term `ord`; `input` must sit at its start.
    fn read_term(&mut self, ord: u64) -> Result<()> {
        let info = &self.field.info;
        let block_start = ord % self.segment.term_index_interval as u64 == 0;

        let shared = self.input.read_varint()? as usize;
        if shared > self.term.len() || (block_start && shared != 0) {
            return Err(TesseraError::codec(format!(
                "Corrupt term record {ord} in field '{}'",
                info.name
            )));
        }
        let suffix_len = self.input.read_varint()? as usize;
        let suffix = self.input.read_raw(suffix_len)?;
        self.term.truncate(shared);
        self.term.extend_from_slice(suffix);

        let base = if block_start {
            TermMeta::default()
        } else {
            self.meta
        };

        let doc_freq = self.input.read_varint_u32()?;
        let total_term_freq = if info.has_freqs() {
            doc_freq as u64 + self.input.read_varint()?
        } else {
            0
        };
        let doc_fp = base.doc_fp + self.input.read_varint()?;
        let pos_fp = if info.has_positions() {
            base.pos_fp + self.input.read_varint()?
        } else {
            base.pos_fp
        };
        let pay_fp = if info.has_payloads() {
            base.pay_fp + self.input.read_varint()?
        } else {
            base.pay_fp
        };
        let skip_offset = if doc_freq > self.segment.skip_interval {
            Some(self.input.read_varint()?)
        } else {
            None
        };

        self.meta = TermMeta {
            doc_freq,
            total_term_freq,
            doc_fp,
            pos_fp,
            pay_fp,
            skip_offset,
        };
        self.ord = ord;
        self.state = TermState::Positioned;
        Ok(())
    }

    fn exhaust(&mut self) {
        self.state = TermState::Exhausted;
        self.term.clear();
    }

    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        let ord = match self.state {
            TermState::Unpositioned => {
                self.input.seek(self.field.terms_start)?;
                0
            }
            TermState::Positioned => self.ord + 1,
            TermState::Exhausted => return Ok(None),
        };

        if ord >= self.field.num_terms {
            self.exhaust();
            return Ok(None);
        }
        self.read_term(ord)?;
        Ok(Some(&self.term))
    }

    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        if self.term() == Some(target) {
            return Ok(SeekStatus::Found);
        }
        if self.field.num_terms == 0 {
            self.exhaust();
            return Ok(SeekStatus::End);
        }

        let field = Arc::clone(&self.field);
        let after = field
            .index
            .partition_point(|entry| entry.term.as_slice() <= target);
        let entry = &field.index[after.saturating_sub(1)];

        // Scanning on from the current term is only valid inside the block.
        let scan_from_current = self.state == TermState::Positioned
            && self.term.as_slice() < target
            && self.ord >= entry.ord;
        if !scan_from_current {
            self.input.seek(entry.term_fp)?;
            self.term.clear();
            self.read_term(entry.ord)?;
        }

        loop {
            match self.term.as_slice().cmp(target) {
                Ordering::Equal => return Ok(SeekStatus::Found),
                Ordering::Greater => return Ok(SeekStatus::NotFound),
                Ordering::Less => {
                    let ord = self.ord + 1;
                    if ord >= field.num_terms {
                        self.exhaust();
                        return Ok(SeekStatus::End);
                    }
                    self.read_term(ord)?;
                }
            }
        }
    }

    pub fn term(&self) -> Option<&[u8]> {
        match self.state {
            TermState::Positioned => Some(&self.term),
            _ => None,
        }
    }

    fn current_meta(&self) -> Result<&TermMeta> {
        match self.state {
            TermState::Positioned => Ok(&self.meta),
            TermState::Unpositioned => Err(TesseraError::invalid_operation(
                "Terms enum is not positioned on a term",
            )),
            TermState::Exhausted => Err(TesseraError::invalid_operation(
                "Terms enum is exhausted",
            )),
        }
    }

    pub fn doc_freq(&self) -> Result<u32> {
        Ok(self.current_meta()?.doc_freq)
    }

    pub fn total_term_freq(&self) -> Result<u64> {
        Ok(self.current_meta()?.total_term_freq)
    }

    pub fn docs(&self, reuse: Option<BlockPostingsEnum>) -> Result<BlockPostingsEnum> {
        let meta = *self.current_meta()?;
        match reuse {
            Some(mut postings) => {
                postings.reset(&self.segment, &self.field.info, meta, false)?;
                Ok(postings)
            }
            None => BlockPostingsEnum::new(&self.segment, &self.field.info, meta, false),
        }
    }

    pub fn docs_and_positions(
        &self,
        reuse: Option<BlockPostingsEnum>,
    ) -> Result<Option<BlockPostingsEnum>> {
        if !self.field.info.has_positions() {
            return Ok(None);
        }
        let meta = *self.current_meta()?;
        let postings = match reuse {
            Some(mut postings) => {
                postings.reset(&self.segment, &self.field.info, meta, true)?;
                postings
            }
            None => BlockPostingsEnum::new(&self.segment, &self.field.info, meta, true)?,
        };
        Ok(Some(postings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::block::BlockCodecConfig;
    use crate::codec::block::terms_writer::BlockFieldsWriter;
    use crate::codec::consumer::{FieldsConsumer, TermStats};
    use crate::codec::postings_enum::{DocIdSetIterator, NO_MORE_DOCS};
    use crate::codec::SegmentWriteState;
    use crate::schema::FieldInfos;
    use crate::storage::memory::MemoryStorage;

    const CONFIG: BlockCodecConfig = BlockCodecConfig {
        term_index_interval: 4,
        skip_interval: 2,
    };

    /// One docs-only field `f` whose terms are `t00`, `t02`, ... each holding
    /// the docs `[i, i + 100]`.
    fn write_segment(storage: Arc<MemoryStorage>, num_terms: u32) -> FieldInfos {
        let mut infos = FieldInfos::new();
        let field = infos.add("f", IndexOptions::DocsOnly, false).unwrap().clone();

        let state = SegmentWriteState::new(storage, "seg", infos.clone());
        let mut writer: Box<dyn FieldsConsumer> =
            Box::new(BlockFieldsWriter::new(CONFIG, state).unwrap());
        {
            let mut terms = writer.add_field(&field).unwrap();
            for i in 0..num_terms {
                let text = format!("t{:02}", i * 2);
                let postings = terms.start_term(text.as_bytes()).unwrap();
                for doc in [i, i + 100] {
                    postings.start_doc(doc, 0).unwrap();
                    postings.finish_doc().unwrap();
                }
                terms
                    .finish_term(text.as_bytes(), TermStats::new(2, 0))
                    .unwrap();
            }
            terms
                .finish(FieldStats {
                    sum_total_term_freq: 0,
                    sum_doc_freq: 2 * num_terms as u64,
                    doc_count: 2 * num_terms,
                })
                .unwrap();
        }
        writer.close().unwrap();
        infos
    }

    fn open(storage: Arc<MemoryStorage>, infos: FieldInfos) -> BlockFieldsReader {
        BlockFieldsReader::open(&SegmentReadState::new(storage, "seg", infos)).unwrap()
    }

    #[test]
    fn test_next_walks_every_term() {
        let storage = Arc::new(MemoryStorage::default());
        let infos = write_segment(storage.clone(), 10);
        let reader = open(storage, infos);

        assert_eq!(reader.field_names(), vec!["f"]);
        assert_eq!(reader.num_terms("f"), Some(10));
        assert_eq!(reader.field_stats("f").unwrap().sum_doc_freq, 20);
        assert!(reader.terms("g").unwrap().is_none());

        let mut terms = reader.terms("f").unwrap().unwrap();
        let mut seen = Vec::new();
        while let Some(term) = terms.next().unwrap() {
            seen.push(String::from_utf8(term.to_vec()).unwrap());
        }
        let expected: Vec<String> = (0..10).map(|i| format!("t{:02}", i * 2)).collect();
        assert_eq!(seen, expected);
        assert_eq!(terms.next().unwrap(), None);
        assert!(terms.doc_freq().is_err());
    }

    #[test]
    fn test_seek_ceil_across_index_blocks() {
        let storage = Arc::new(MemoryStorage::default());
        let infos = write_segment(storage.clone(), 10);
        let reader = open(storage, infos);
        let mut terms = reader.terms("f").unwrap().unwrap();

        assert_eq!(terms.seek_ceil(b"t10").unwrap(), SeekStatus::Found);
        assert_eq!(terms.doc_freq().unwrap(), 2);
        // Backwards into the first block.
        assert_eq!(terms.seek_ceil(b"t03").unwrap(), SeekStatus::NotFound);
        assert_eq!(terms.term(), Some(&b"t04"[..]));
        // Forwards within the same block.
        assert_eq!(terms.seek_ceil(b"t06").unwrap(), SeekStatus::Found);
        assert_eq!(terms.next().unwrap(), Some(&b"t08"[..]));
        assert_eq!(terms.seek_ceil(b"").unwrap(), SeekStatus::NotFound);
        assert_eq!(terms.term(), Some(&b"t00"[..]));
        assert_eq!(terms.seek_ceil(b"t18").unwrap(), SeekStatus::Found);
        assert_eq!(terms.seek_ceil(b"t18").unwrap(), SeekStatus::Found);
        assert_eq!(terms.seek_ceil(b"t19").unwrap(), SeekStatus::End);
        assert_eq!(terms.term(), None);
        assert_eq!(terms.next().unwrap(), None);
        assert_eq!(terms.seek_ceil(b"t16.").unwrap(), SeekStatus::NotFound);
        assert_eq!(terms.term(), Some(&b"t18"[..]));
    }

    #[test]
    fn test_docs_after_seek() {
        let storage = Arc::new(MemoryStorage::default());
        let infos = write_segment(storage.clone(), 10);
        let reader = open(storage, infos);
        let mut terms = reader.terms("f").unwrap().unwrap();

        terms.seek_ceil(b"t14").unwrap();
        let mut docs = terms.docs(None).unwrap();
        assert_eq!(docs.next_doc().unwrap(), 7);
        assert_eq!(docs.freq(), 0);
        assert_eq!(docs.next_doc().unwrap(), 107);
        assert_eq!(docs.next_doc().unwrap(), NO_MORE_DOCS);
        assert!(terms.docs_and_positions(None).unwrap().is_none());

        terms.seek_ceil(b"t02").unwrap();
        let mut docs = terms.docs(Some(docs)).unwrap();
        assert_eq!(docs.doc_id(), None);
        assert_eq!(docs.advance(50).unwrap(), 101);
    }

    #[test]
    fn test_empty_field() {
        let storage = Arc::new(MemoryStorage::default());
        let infos = write_segment(storage.clone(), 0);
        let reader = open(storage, infos);
        let mut terms = reader.terms("f").unwrap().unwrap();

        assert_eq!(terms.seek_ceil(b"a").unwrap(), SeekStatus::End);
        assert_eq!(terms.next().unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let storage = Arc::new(MemoryStorage::default());
        let infos = write_segment(storage.clone(), 10);
        storage.corrupt_byte("seg.tim", 12).unwrap();

        let err = BlockFieldsReader::open(&SegmentReadState::new(storage, "seg", infos))
            .unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }
}
