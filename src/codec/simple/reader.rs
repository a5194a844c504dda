//! Reader for the simple codec.
//!
//! Each field is decoded into flat arrays shared behind an `Arc`; enumerators
//! only hold indexes into them.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::codec::consumer::{FieldStats, TermStats};
use crate::codec::postings_enum::{DocId, DocIdSetIterator, NO_MORE_DOCS};
use crate::codec::simple::{EXTENSION, MAGIC, VERSION};
use crate::codec::terms_enum::SeekStatus;
use crate::codec::SegmentReadState;
use crate::error::{Result, TesseraError};
use crate::schema::{FieldInfo, IndexOptions};
use crate::storage::structured::{SliceReader, read_checked};

/// A block of postings for efficient skip-to operations.
#[derive(Debug, Clone)]
pub struct PostingBlock {
    /// Minimum document ID in this block.
    pub min_doc_id: DocId,

    /// Maximum document ID in this block.
    pub max_doc_id: DocId,

    /// Index of the first posting of the block in the field's doc array.
    pub start_position: usize,

    /// Number of postings in this block.
    pub count: usize,
}

#[derive(Debug)]
struct SimpleTerm {
    text: Vec<u8>,
    stats: TermStats,
    doc_start: usize,
    doc_end: usize,
    block_start: usize,
    block_end: usize,
}

/// Decoded contents of one field.
#[derive(Debug)]
pub struct SimpleFieldData {
    info: FieldInfo,
    stats: FieldStats,
    terms: Vec<SimpleTerm>,
    docs: Vec<DocId>,
    freqs: Vec<u32>,
    /// Index of each doc's first position; one extra trailing entry.
    pos_starts: Vec<usize>,
    positions: Vec<u32>,
    /// Payload byte range per position, empty unless the field stores payloads.
    payloads: Vec<Option<(usize, usize)>>,
    payload_bytes: Vec<u8>,
    blocks: Vec<PostingBlock>,
}

impl SimpleFieldData {
    fn decode(
        input: &mut SliceReader,
        info: FieldInfo,
        stats: FieldStats,
        num_terms: u64,
        block_size: usize,
    ) -> Result<Self> {
        let mut field = SimpleFieldData {
            info,
            stats,
            terms: Vec::with_capacity(num_terms as usize),
            docs: Vec::new(),
            freqs: Vec::new(),
            pos_starts: Vec::new(),
            positions: Vec::new(),
            payloads: Vec::new(),
            payload_bytes: Vec::new(),
            blocks: Vec::new(),
        };

        let has_freqs = field.info.has_freqs();
        let has_positions = field.info.has_positions();
        let has_payloads = field.info.has_payloads();

        for _ in 0..num_terms {
            let text = input.read_bytes()?;
            let doc_freq = input.read_varint_u32()?;
            let total_term_freq = input.read_varint()?;

            if let Some(previous) = field.terms.last() {
                if previous.text >= text {
                    return Err(TesseraError::codec(format!(
                        "Terms out of order in field '{}'",
                        field.info.name
                    )));
                }
            }

            let doc_start = field.docs.len();
            let mut doc: DocId = 0;
            for i in 0..doc_freq {
                let delta = input.read_varint_u32()?;
                doc = doc.checked_add(delta).filter(|d| *d != NO_MORE_DOCS).ok_or_else(|| {
                    TesseraError::codec(format!("Doc id overflow in field '{}'", field.info.name))
                })?;
                if i > 0 && delta == 0 {
                    return Err(TesseraError::codec("Duplicate doc id in postings"));
                }
                let freq = if has_freqs { input.read_varint_u32()? } else { 0 };

                field.docs.push(doc);
                field.freqs.push(freq);

                if has_positions {
                    field.pos_starts.push(field.positions.len());
                    let mut position = 0u32;
                    for _ in 0..freq {
                        let code = input.read_varint()?;
                        let delta = if has_payloads { code >> 1 } else { code };
                        position = position
                            .checked_add(delta as u32)
                            .ok_or_else(|| TesseraError::codec("Position overflow"))?;
                        field.positions.push(position);

                        if has_payloads {
                            let payload = if code & 1 == 1 {
                                let len = input.read_varint()? as usize;
                                let start = field.payload_bytes.len();
                                field.payload_bytes.extend_from_slice(input.read_raw(len)?);
                                Some((start, start + len))
                            } else {
                                None
                            };
                            field.payloads.push(payload);
                        }
                    }
                }
            }

            let doc_end = field.docs.len();
            let block_start = field.blocks.len();
            let mut start = doc_start;
            while start < doc_end {
                let end = (start + block_size).min(doc_end);
                field.blocks.push(PostingBlock {
                    min_doc_id: field.docs[start],
                    max_doc_id: field.docs[end - 1],
                    start_position: start,
                    count: end - start,
                });
                start = end;
            }

            field.terms.push(SimpleTerm {
                text,
                stats: TermStats::new(doc_freq, total_term_freq),
                doc_start,
                doc_end,
                block_start,
                block_end: field.blocks.len(),
            });
        }

        if has_positions {
            field.pos_starts.push(field.positions.len());
        }

        Ok(field)
    }
}

/// Opened simple-codec segment.
#[derive(Debug)]
pub struct SimpleFieldsReader {
    fields: BTreeMap<String, Arc<SimpleFieldData>>,
}

impl SimpleFieldsReader {
    /// Load and decode `{segment}.mem`.
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let name = state.file_name(EXTENSION);
        let mut input = read_checked(state.storage.as_ref(), &name)?;
        input.check_header(MAGIC, VERSION)?;

        let block_size = input.read_varint()? as usize;
        if block_size < 2 {
            return Err(TesseraError::codec(format!(
                "Invalid block size {block_size} in {name}"
            )));
        }

        let num_fields = input.read_varint()?;
        let mut fields = BTreeMap::new();
        for _ in 0..num_fields {
            let field_name = input.read_string()?;
            let number = input.read_varint_u32()?;
            let options = IndexOptions::from_code(input.read_u8()?)
                .ok_or_else(|| TesseraError::codec("Unknown index options"))?;
            let store_payloads = input.read_u8()? != 0;
            let info = FieldInfo::new(field_name, number, options).with_payloads(store_payloads);
            state.field_infos.check_persisted(&info)?;

            let stats = FieldStats {
                sum_total_term_freq: input.read_varint()?,
                sum_doc_freq: input.read_varint()?,
                doc_count: input.read_varint_u32()?,
            };
            let num_terms = input.read_varint()?;

            let data =
                SimpleFieldData::decode(&mut input, info, stats, num_terms, block_size)?;
            fields.insert(data.info.name.clone(), Arc::new(data));
        }

        if !input.is_eof() {
            return Err(TesseraError::codec(format!(
                "Trailing bytes in {name} at offset {}",
                input.position()
            )));
        }

        debug!(
            "Opened simple segment {} ({} fields, block size {})",
            name,
            fields.len(),
            block_size
        );
        Ok(SimpleFieldsReader { fields })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn terms(&self, field: &str) -> Option<SimpleTermsEnum> {
        self.fields.get(field).map(|data| SimpleTermsEnum {
            field: Arc::clone(data),
            state: TermState::Unpositioned,
        })
    }

    pub fn field_stats(&self, field: &str) -> Option<FieldStats> {
        self.fields.get(field).map(|data| data.stats)
    }

    pub fn field_info(&self, field: &str) -> Option<&FieldInfo> {
        self.fields.get(field).map(|data| &data.info)
    }

    pub fn num_terms(&self, field: &str) -> Option<u64> {
        self.fields.get(field).map(|data| data.terms.len() as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermState {
    Unpositioned,
    Positioned(usize),
    Exhausted,
}

/// Terms enumerator of the simple codec.
#[derive(Debug, Clone)]
pub struct SimpleTermsEnum {
    field: Arc<SimpleFieldData>,
    state: TermState,
}

impl SimpleTermsEnum {
    fn position_at(&mut self, index: usize) -> Option<&[u8]> {
        if index < self.field.terms.len() {
            self.state = TermState::Positioned(index);
            Some(&self.field.terms[index].text)
        } else {
            self.state = TermState::Exhausted;
            None
        }
    }

    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        Ok(match self.state {
            TermState::Unpositioned => self.position_at(0),
            TermState::Positioned(index) => self.position_at(index + 1),
            TermState::Exhausted => None,
        })
    }

    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        if self.term() == Some(target) {
            return Ok(SeekStatus::Found);
        }

        let result = self
            .field
            .terms
            .binary_search_by(|term| term.text.as_slice().cmp(target));

        Ok(match result {
            Ok(index) => {
                self.state = TermState::Positioned(index);
                SeekStatus::Found
            }
            Err(index) => match self.position_at(index) {
                Some(_) => SeekStatus::NotFound,
                None => SeekStatus::End,
            },
        })
    }

    pub fn seek_exact_ord(&mut self, ord: u64) -> Result<&[u8]> {
        let num_terms = self.field.terms.len();
        if ord >= num_terms as u64 {
            return Err(TesseraError::invalid_argument(format!(
                "Term ordinal {ord} out of range for field '{}' with {num_terms} terms",
                self.field.info.name
            )));
        }
        self.state = TermState::Positioned(ord as usize);
        Ok(&self.field.terms[ord as usize].text)
    }

    pub fn term(&self) -> Option<&[u8]> {
        match self.state {
            TermState::Positioned(index) => Some(&self.field.terms[index].text),
            _ => None,
        }
    }

    fn current_index(&self) -> Result<usize> {
        match self.state {
            TermState::Positioned(index) => Ok(index),
            TermState::Unpositioned => Err(TesseraError::invalid_operation(
                "Terms enum is not positioned on a term",
            )),
            TermState::Exhausted => Err(TesseraError::invalid_operation(
                "Terms enum is exhausted",
            )),
        }
    }

    pub fn doc_freq(&self) -> Result<u32> {
        Ok(self.field.terms[self.current_index()?].stats.doc_freq)
    }

    pub fn total_term_freq(&self) -> Result<u64> {
        Ok(self.field.terms[self.current_index()?].stats.total_term_freq)
    }

    pub fn docs(&self, reuse: Option<SimplePostingsEnum>) -> Result<SimplePostingsEnum> {
        let index = self.current_index()?;
        Ok(match reuse {
            Some(mut postings) => {
                postings.reset(Arc::clone(&self.field), index, false);
                postings
            }
            None => SimplePostingsEnum::new(Arc::clone(&self.field), index, false),
        })
    }

    pub fn docs_and_positions(
        &self,
        reuse: Option<SimplePostingsEnum>,
    ) -> Result<Option<SimplePostingsEnum>> {
        if !self.field.info.has_positions() {
            return Ok(None);
        }
        let index = self.current_index()?;
        Ok(Some(match reuse {
            Some(mut postings) => {
                postings.reset(Arc::clone(&self.field), index, true);
                postings
            }
            None => SimplePostingsEnum::new(Arc::clone(&self.field), index, true),
        }))
    }
}

/// Postings enumerator of the simple codec.
#[derive(Debug, Clone)]
pub struct SimplePostingsEnum {
    field: Arc<SimpleFieldData>,
    doc_start: usize,
    doc_end: usize,
    block_start: usize,
    block_end: usize,
    /// Index of the current doc; `doc_end` once exhausted.
    upto: Option<usize>,
    doc: Option<DocId>,
    positions_read: u32,
    with_positions: bool,
}

impl SimplePostingsEnum {
    fn new(field: Arc<SimpleFieldData>, term: usize, with_positions: bool) -> Self {
        let (doc_start, doc_end, block_start, block_end) = {
            let term = &field.terms[term];
            (term.doc_start, term.doc_end, term.block_start, term.block_end)
        };
        SimplePostingsEnum {
            field,
            doc_start,
            doc_end,
            block_start,
            block_end,
            upto: None,
            doc: None,
            positions_read: 0,
            with_positions,
        }
    }

    fn reset(&mut self, field: Arc<SimpleFieldData>, term: usize, with_positions: bool) {
        *self = SimplePostingsEnum::new(field, term, with_positions);
    }

    fn set_doc(&mut self, index: usize) -> DocId {
        self.positions_read = 0;
        if index >= self.doc_end {
            self.upto = Some(self.doc_end);
            self.doc = Some(NO_MORE_DOCS);
            NO_MORE_DOCS
        } else {
            let doc = self.field.docs[index];
            self.upto = Some(index);
            self.doc = Some(doc);
            doc
        }
    }

    fn next_index(&self) -> usize {
        self.upto.map_or(self.doc_start, |index| index + 1)
    }

    fn current(&self) -> Option<usize> {
        self.upto.filter(|index| *index < self.doc_end)
    }

    /// Find the block holding the first doc not below `target`.
    fn find_block(&self, target: DocId) -> Option<&PostingBlock> {
        let blocks = &self.field.blocks[self.block_start..self.block_end];
        let index = blocks.partition_point(|block| block.max_doc_id < target);
        blocks.get(index)
    }

    pub fn next_position(&mut self) -> Result<u32> {
        if !self.with_positions {
            return Err(TesseraError::invalid_operation(
                "Positions were not requested from this enumerator",
            ));
        }
        let index = self.current().ok_or_else(|| {
            TesseraError::invalid_operation("Postings enum is not positioned on a document")
        })?;
        if self.positions_read >= self.field.freqs[index] {
            return Err(TesseraError::invalid_operation(format!(
                "All {} positions of doc {} already read",
                self.field.freqs[index], self.field.docs[index]
            )));
        }

        let position = self.field.positions[self.field.pos_starts[index] + self.positions_read as usize];
        self.positions_read += 1;
        Ok(position)
    }

    fn current_position_index(&self) -> Option<usize> {
        if self.positions_read == 0 {
            return None;
        }
        self.current()
            .map(|index| self.field.pos_starts[index] + self.positions_read as usize - 1)
    }

    pub fn has_payload(&self) -> bool {
        self.current_position_index()
            .and_then(|index| self.field.payloads.get(index))
            .is_some_and(|payload| payload.is_some())
    }

    pub fn payload(&self) -> Result<Option<&[u8]>> {
        Ok(self
            .current_position_index()
            .and_then(|index| self.field.payloads.get(index).copied().flatten())
            .map(|(start, end)| &self.field.payload_bytes[start..end]))
    }
}

impl DocIdSetIterator for SimplePostingsEnum {
    fn doc_id(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == Some(NO_MORE_DOCS) {
            return Ok(NO_MORE_DOCS);
        }
        let next = self.next_index();
        Ok(self.set_doc(next))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == Some(NO_MORE_DOCS) {
            return Ok(NO_MORE_DOCS);
        }

        let next = self.next_index();
        if next >= self.doc_end || self.field.docs[next] >= target {
            return Ok(self.set_doc(next));
        }

        let mut index = match self.find_block(target) {
            Some(block) => block.start_position.max(next),
            None => return Ok(self.set_doc(self.doc_end)),
        };

        // Linear search within the block
        while index < self.doc_end && self.field.docs[index] < target {
            index += 1;
        }
        Ok(self.set_doc(index))
    }

    fn freq(&self) -> u32 {
        self.current().map_or(0, |index| self.field.freqs[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::consumer::{FieldsConsumer, PostingsConsumer, TermsConsumer};
    use crate::codec::producer::FieldsProducer;
    use crate::codec::simple::SimpleCodecConfig;
    use crate::codec::simple::writer::SimpleFieldsWriter;
    use crate::codec::{CodecConfig, CodecFactory, SegmentWriteState};
    use crate::schema::FieldInfos;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::structured::StructWriter;

    /// Write `docs` (doc, positions) for each term into a one-field segment.
    fn write_segment(
        storage: Arc<MemoryStorage>,
        options: IndexOptions,
        terms: &[(&str, Vec<(DocId, Vec<u32>)>)],
    ) -> (FieldInfos, FieldInfo) {
        let mut infos = FieldInfos::new();
        let field = infos.add("f", options, false).unwrap().clone();

        let state = SegmentWriteState::new(storage, "seg", infos.clone());
        let mut writer: Box<dyn FieldsConsumer> =
            Box::new(SimpleFieldsWriter::new(SimpleCodecConfig { block_size: 2 }, state).unwrap());
        {
            let mut terms_writer = writer.add_field(&field).unwrap();
            let mut stats = FieldStats::default();
            for (text, docs) in terms {
                let postings = terms_writer.start_term(text.as_bytes()).unwrap();
                let mut ttf = 0;
                for (doc, positions) in docs {
                    let freq = if field.has_freqs() { positions.len() as u32 } else { 0 };
                    postings.start_doc(*doc, freq).unwrap();
                    if field.has_positions() {
                        for position in positions {
                            postings.add_position(*position, None).unwrap();
                        }
                    }
                    postings.finish_doc().unwrap();
                    ttf += freq as u64;
                }
                terms_writer
                    .finish_term(text.as_bytes(), TermStats::new(docs.len() as u32, ttf))
                    .unwrap();
                stats.sum_doc_freq += docs.len() as u64;
                stats.sum_total_term_freq += ttf;
            }
            terms_writer.finish(stats).unwrap();
        }
        writer.close().unwrap();
        (infos, field)
    }

    fn open(storage: Arc<MemoryStorage>, infos: FieldInfos) -> SimpleFieldsReader {
        let state = SegmentReadState::new(storage, "seg", infos);
        SimpleFieldsReader::open(&state).unwrap()
    }

    #[test]
    fn test_terms_enum_seek_and_next() {
        let storage = Arc::new(MemoryStorage::default());
        let (infos, _) = write_segment(
            storage.clone(),
            IndexOptions::DocsOnly,
            &[("b", vec![(1, vec![])]), ("d", vec![(2, vec![])])],
        );
        let reader = open(storage, infos);
        assert_eq!(reader.field_names(), vec!["f"]);
        assert_eq!(reader.num_terms("f"), Some(2));

        let mut terms = reader.terms("f").unwrap();
        assert!(terms.doc_freq().is_err());
        assert_eq!(terms.seek_ceil(b"a").unwrap(), SeekStatus::NotFound);
        assert_eq!(terms.term(), Some(&b"b"[..]));
        assert_eq!(terms.seek_ceil(b"c").unwrap(), SeekStatus::NotFound);
        assert_eq!(terms.term(), Some(&b"d"[..]));
        assert_eq!(terms.seek_ceil(b"d").unwrap(), SeekStatus::Found);
        assert_eq!(terms.seek_ceil(b"e").unwrap(), SeekStatus::End);
        assert_eq!(terms.term(), None);
        assert_eq!(terms.next().unwrap(), None);
        assert!(terms.doc_freq().is_err());

        assert_eq!(terms.seek_exact_ord(0).unwrap(), b"b");
        assert_eq!(terms.next().unwrap(), Some(&b"d"[..]));
        assert_eq!(terms.next().unwrap(), None);
        assert!(terms.seek_exact_ord(2).is_err());
    }

    #[test]
    fn test_advance_uses_blocks() {
        let storage = Arc::new(MemoryStorage::default());
        let docs: Vec<(DocId, Vec<u32>)> = (0..10).map(|i| (i * 10, vec![])).collect();
        let (infos, _) = write_segment(storage.clone(), IndexOptions::DocsOnly, &[("t", docs)]);
        let reader = open(storage, infos);

        let mut terms = reader.terms("f").unwrap();
        terms.next().unwrap();
        let mut postings = terms.docs(None).unwrap();
        assert_eq!(postings.doc_id(), None);
        assert_eq!(postings.advance(0).unwrap(), 0);
        assert_eq!(postings.advance(0).unwrap(), 10);
        assert_eq!(postings.advance(55).unwrap(), 60);
        assert_eq!(postings.freq(), 0);
        assert_eq!(postings.next_doc().unwrap(), 70);
        assert_eq!(postings.advance(90).unwrap(), 90);
        assert_eq!(postings.advance(91).unwrap(), NO_MORE_DOCS);
        assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);
        assert_eq!(postings.doc_id(), Some(NO_MORE_DOCS));
    }

    #[test]
    fn test_block_size_is_read_from_segment() {
        let storage = Arc::new(MemoryStorage::default());
        let docs: Vec<(DocId, Vec<u32>)> = (0..9).map(|i| (i * 3, vec![])).collect();
        let (infos, _) = write_segment(storage.clone(), IndexOptions::DocsOnly, &[("t", docs)]);

        // Opening through the factory with a different configured size still
        // summarizes postings in blocks of two, as written.
        let producer = CodecFactory::fields_producer(
            &CodecConfig::Simple(SimpleCodecConfig { block_size: 64 }),
            SegmentReadState::new(storage, "seg", infos),
        )
        .unwrap();
        let FieldsProducer::Simple(reader) = &producer else {
            panic!("Expected simple producer");
        };
        let field = &reader.fields["f"];
        assert_eq!(field.blocks.len(), 5);
        assert!(field.blocks.iter().all(|block| block.count <= 2));

        let mut terms = producer.terms("f").unwrap().unwrap();
        terms.next().unwrap();
        let mut postings = terms.docs(None).unwrap();
        assert_eq!(postings.advance(13).unwrap(), 15);
        assert_eq!(postings.advance(25).unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_invalid_block_size_rejected() {
        let storage = Arc::new(MemoryStorage::default());
        let infos = FieldInfos::new();
        let mut writer = StructWriter::new(storage.create_output("seg.mem").unwrap());
        writer.write_header(MAGIC, VERSION).unwrap();
        writer.write_varint(1).unwrap();
        writer.write_varint(0).unwrap();
        writer.close().unwrap();

        let state = SegmentReadState::new(storage, "seg", infos);
        let err = SimpleFieldsReader::open(&state).unwrap_err();
        assert!(err.to_string().contains("Invalid block size 1"));
    }

    #[test]
    fn test_positions_and_reuse() {
        let storage = Arc::new(MemoryStorage::default());
        let (infos, _) = write_segment(
            storage.clone(),
            IndexOptions::DocsAndFreqsAndPositions,
            &[
                ("x", vec![(3, vec![1, 4]), (8, vec![2])]),
                ("y", vec![(5, vec![7])]),
            ],
        );
        let reader = open(storage.clone(), infos);
        assert_eq!(storage.list_files().unwrap(), vec!["seg.mem"]);

        let mut terms = reader.terms("f").unwrap();
        terms.next().unwrap();
        assert_eq!(terms.total_term_freq().unwrap(), 3);

        let mut postings = terms.docs_and_positions(None).unwrap().unwrap();
        assert_eq!(postings.next_doc().unwrap(), 3);
        assert_eq!(postings.freq(), 2);
        assert_eq!(postings.next_position().unwrap(), 1);
        assert!(!postings.has_payload());
        assert_eq!(postings.payload().unwrap(), None);
        assert_eq!(postings.next_position().unwrap(), 4);
        assert!(postings.next_position().is_err());
        // Positions of doc 8 are independent of how many of doc 3 were read.
        assert_eq!(postings.next_doc().unwrap(), 8);
        assert_eq!(postings.next_position().unwrap(), 2);

        terms.next().unwrap();
        let mut reused = terms.docs_and_positions(Some(postings)).unwrap().unwrap();
        assert_eq!(reused.doc_id(), None);
        assert_eq!(reused.next_doc().unwrap(), 5);
        assert_eq!(reused.next_position().unwrap(), 7);
        assert_eq!(reused.next_doc().unwrap(), NO_MORE_DOCS);

        let mut docs_only = terms.docs(None).unwrap();
        docs_only.next_doc().unwrap();
        assert!(docs_only.next_position().is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let storage = Arc::new(MemoryStorage::default());
        write_segment(
            storage.clone(),
            IndexOptions::DocsOnly,
            &[("t", vec![(1, vec![])])],
        );

        let mut other = FieldInfos::new();
        other.add("g", IndexOptions::DocsOnly, false).unwrap();
        let state = SegmentReadState::new(storage, "seg", other);
        assert!(SimpleFieldsReader::open(&state).is_err());
    }
}
