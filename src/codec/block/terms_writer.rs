//! Term dictionary writer of the block codec.

use log::debug;

use crate::codec::block::postings_writer::BlockPostingsWriter;
use crate::codec::block::{
    BlockCodecConfig, TERMS_EXTENSION, TERMS_INDEX_EXTENSION, TERMS_INDEX_MAGIC, TERMS_MAGIC,
    TermMeta, VERSION,
};
use crate::codec::consumer::{
    FieldStats, FieldsConsumer, PostingsConsumer, TermStats, TermsConsumer,
};
use crate::codec::SegmentWriteState;
use crate::error::{Result, TesseraError};
use crate::schema::FieldInfo;
use crate::storage::StorageOutput;
use crate::storage::structured::StructWriter;

/// A sparse index entry pointing at the first term of an index block.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) term: Vec<u8>,
    pub(crate) term_fp: u64,
    pub(crate) ord: u64,
}

/// Everything `.tip` records about one finished field.
#[derive(Debug)]
struct FieldSummary {
    info: FieldInfo,
    num_terms: u64,
    stats: FieldStats,
    terms_start: u64,
    index: Vec<IndexEntry>,
}

/// Segment writer for the block codec.
#[derive(Debug)]
pub struct BlockFieldsWriter {
    config: BlockCodecConfig,
    state: SegmentWriteState,
    terms_out: StructWriter<Box<dyn StorageOutput>>,
    postings: BlockPostingsWriter,
    summaries: Vec<FieldSummary>,
}

impl BlockFieldsWriter {
    pub fn new(config: BlockCodecConfig, state: SegmentWriteState) -> Result<Self> {
        let output = state
            .storage
            .create_output(&state.file_name(TERMS_EXTENSION))?;
        let mut terms_out = StructWriter::new(output);
        terms_out.write_header(TERMS_MAGIC, VERSION)?;

        let postings = BlockPostingsWriter::new(&state, config.skip_interval)?;

        Ok(BlockFieldsWriter {
            config,
            state,
            terms_out,
            postings,
            summaries: Vec::new(),
        })
    }

    fn write_index(&self) -> Result<()> {
        let name = self.state.file_name(TERMS_INDEX_EXTENSION);
        let mut out = StructWriter::new(self.state.storage.create_output(&name)?);

        out.write_header(TERMS_INDEX_MAGIC, VERSION)?;
        out.write_varint(self.config.term_index_interval as u64)?;
        out.write_varint(self.config.skip_interval as u64)?;
        out.write_varint(self.summaries.len() as u64)?;

        for summary in &self.summaries {
            out.write_string(&summary.info.name)?;
            out.write_varint(summary.info.number as u64)?;
            out.write_u8(summary.info.index_options.to_code())?;
            out.write_u8(summary.info.store_payloads as u8)?;
            out.write_varint(summary.num_terms)?;
            out.write_varint(summary.stats.sum_total_term_freq)?;
            out.write_varint(summary.stats.sum_doc_freq)?;
            out.write_varint(summary.stats.doc_count as u64)?;
            out.write_varint(summary.terms_start)?;

            out.write_varint(summary.index.len() as u64)?;
            for entry in &summary.index {
                out.write_bytes(&entry.term)?;
                out.write_varint(entry.term_fp)?;
                out.write_varint(entry.ord)?;
            }
        }

        out.close()
    }
}

impl FieldsConsumer for BlockFieldsWriter {
    fn add_field(&mut self, field: &FieldInfo) -> Result<Box<dyn TermsConsumer + '_>> {
        let info = self.state.field_infos.check_persisted(field)?.clone();

        if let Some(last) = self.summaries.last() {
            if last.info.name.as_str() >= info.name.as_str() {
                return Err(TesseraError::invalid_operation(format!(
                    "Field '{}' added after '{}'",
                    info.name, last.info.name
                )));
            }
        }

        self.postings.set_field(&info);
        let terms_start = self.terms_out.position();
        Ok(Box::new(BlockTermsWriter {
            info,
            index_interval: self.config.term_index_interval as u64,
            terms_out: &mut self.terms_out,
            postings: &mut self.postings,
            summaries: &mut self.summaries,
            terms_start,
            num_terms: 0,
            last_term: Vec::new(),
            last_meta: TermMeta::default(),
            index: Vec::new(),
        }))
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.write_index()?;

        let BlockFieldsWriter {
            state,
            terms_out,
            postings,
            summaries,
            ..
        } = *self;

        terms_out.close()?;
        postings.close()?;

        debug!(
            "Wrote block segment {} ({} fields)",
            state.segment,
            summaries.len()
        );
        Ok(())
    }
}

/// Term writer for one field of the block codec.
struct BlockTermsWriter<'a> {
    info: FieldInfo,
    index_interval: u64,
    terms_out: &'a mut StructWriter<Box<dyn StorageOutput>>,
    postings: &'a mut BlockPostingsWriter,
    summaries: &'a mut Vec<FieldSummary>,
    terms_start: u64,
    num_terms: u64,
    last_term: Vec<u8>,
    last_meta: TermMeta,
    index: Vec<IndexEntry>,
}

impl TermsConsumer for BlockTermsWriter<'_> {
    fn start_term(&mut self, _text: &[u8]) -> Result<&mut dyn PostingsConsumer> {
        self.postings.start_term();
        Ok(&mut *self.postings)
    }

    fn finish_term(&mut self, text: &[u8], stats: TermStats) -> Result<()> {
        let meta = self.postings.finish_term(stats)?;
        let out = &mut *self.terms_out;

        // Index block starts carry no shared prefix and absolute pointers.
        let block_start = self.num_terms % self.index_interval == 0;
        let (shared, base) = if block_start {
            self.index.push(IndexEntry {
                term: text.to_vec(),
                term_fp: out.position(),
                ord: self.num_terms,
            });
            (0, TermMeta::default())
        } else {
            let shared = self
                .last_term
                .iter()
                .zip(text)
                .take_while(|(a, b)| a == b)
                .count();
            (shared, self.last_meta)
        };

        out.write_varint(shared as u64)?;
        out.write_bytes(&text[shared..])?;
        out.write_varint(meta.doc_freq as u64)?;
        if self.info.has_freqs() {
            out.write_varint(meta.total_term_freq - meta.doc_freq as u64)?;
        }
        out.write_varint(meta.doc_fp - base.doc_fp)?;
        if self.info.has_positions() {
            out.write_varint(meta.pos_fp - base.pos_fp)?;
        }
        if self.info.has_payloads() {
            out.write_varint(meta.pay_fp - base.pay_fp)?;
        }
        if let Some(skip_offset) = meta.skip_offset {
            out.write_varint(skip_offset)?;
        }

        self.last_term.clear();
        self.last_term.extend_from_slice(text);
        self.last_meta = meta;
        self.num_terms += 1;
        Ok(())
    }

    fn finish(self: Box<Self>, stats: FieldStats) -> Result<()> {
        let BlockTermsWriter {
            info,
            summaries,
            terms_start,
            num_terms,
            index,
            ..
        } = *self;

        debug!(
            "Finished field '{}': {} terms, {} index entries, sum_doc_freq={}, doc_count={}",
            info.name,
            num_terms,
            index.len(),
            stats.sum_doc_freq,
            stats.doc_count
        );
        summaries.push(FieldSummary {
            info,
            num_terms,
            stats,
            terms_start,
            index,
        });
        Ok(())
    }
}
