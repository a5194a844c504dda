//! Doc, position and payload stream writer of the block codec.

use crate::codec::block::skip::{SkipEntry, write_skip_entries};
use crate::codec::block::{
    DOC_EXTENSION, DOC_MAGIC, PAY_EXTENSION, PAY_MAGIC, POS_EXTENSION, POS_MAGIC, TermMeta,
    VERSION,
};
use crate::codec::consumer::{PostingsConsumer, TermStats};
use crate::codec::postings_enum::DocId;
use crate::codec::SegmentWriteState;
use crate::error::{Result, TesseraError};
use crate::schema::FieldInfo;
use crate::storage::StorageOutput;
use crate::storage::structured::StructWriter;

type Output = StructWriter<Box<dyn StorageOutput>>;

/// Writes the postings of every term of a segment.
pub struct BlockPostingsWriter {
    doc_out: Output,
    pos_out: Output,
    pay_out: Output,
    skip_interval: u32,

    has_freqs: bool,
    has_positions: bool,
    has_payloads: bool,

    doc_start_fp: u64,
    pos_start_fp: u64,
    pay_start_fp: u64,
    last_doc: DocId,
    last_position: u32,
    doc_count: u32,
    skip_entries: Vec<SkipEntry>,
}

impl std::fmt::Debug for BlockPostingsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockPostingsWriter")
            .field("doc_fp", &self.doc_out.position())
            .field("pos_fp", &self.pos_out.position())
            .field("pay_fp", &self.pay_out.position())
            .field("skip_interval", &self.skip_interval)
            .finish()
    }
}

impl BlockPostingsWriter {
    /// Create the `.doc`, `.pos` and `.pay` files of the segment.
    pub fn new(state: &SegmentWriteState, skip_interval: u32) -> Result<Self> {
        let open = |extension: &str, magic: u32| -> Result<Output> {
            let output = state.storage.create_output(&state.file_name(extension))?;
            let mut writer = StructWriter::new(output);
            writer.write_header(magic, VERSION)?;
            Ok(writer)
        };

        Ok(BlockPostingsWriter {
            doc_out: open(DOC_EXTENSION, DOC_MAGIC)?,
            pos_out: open(POS_EXTENSION, POS_MAGIC)?,
            pay_out: open(PAY_EXTENSION, PAY_MAGIC)?,
            skip_interval,
            has_freqs: false,
            has_positions: false,
            has_payloads: false,
            doc_start_fp: 0,
            pos_start_fp: 0,
            pay_start_fp: 0,
            last_doc: 0,
            last_position: 0,
            doc_count: 0,
            skip_entries: Vec::new(),
        })
    }

    /// Switch to a new field.
    pub fn set_field(&mut self, field: &FieldInfo) {
        self.has_freqs = field.has_freqs();
        self.has_positions = field.has_positions();
        self.has_payloads = field.has_payloads();
    }

    /// Start a new term, remembering where its postings begin.
    pub fn start_term(&mut self) {
        self.doc_start_fp = self.doc_out.position();
        self.pos_start_fp = self.pos_out.position();
        self.pay_start_fp = self.pay_out.position();
        self.last_doc = 0;
        self.doc_count = 0;
        self.skip_entries.clear();
    }

    /// Finish the term: write its skip data and return where everything is.
    pub fn finish_term(&mut self, stats: TermStats) -> Result<TermMeta> {
        debug_assert_eq!(stats.doc_freq, self.doc_count);

        // An entry at the very end has no documents after it.
        if self.doc_count % self.skip_interval == 0 {
            self.skip_entries.pop();
        }

        let mut meta = TermMeta {
            doc_freq: stats.doc_freq,
            total_term_freq: stats.total_term_freq,
            doc_fp: self.doc_start_fp,
            pos_fp: self.pos_start_fp,
            pay_fp: self.pay_start_fp,
            skip_offset: None,
        };

        if self.doc_count > self.skip_interval {
            meta.skip_offset = Some(self.doc_out.position() - self.doc_start_fp);
            write_skip_entries(
                &mut self.doc_out,
                &self.skip_entries,
                &meta,
                self.has_positions,
                self.has_payloads,
            )?;
        }

        Ok(meta)
    }

    /// Close the three postings files.
    pub fn close(self) -> Result<()> {
        self.doc_out.close()?;
        self.pos_out.close()?;
        self.pay_out.close()
    }
}

impl PostingsConsumer for BlockPostingsWriter {
    fn start_doc(&mut self, doc: DocId, freq: u32) -> Result<()> {
        let delta = (doc - self.last_doc) as u64;
        if self.has_freqs {
            if freq == 1 {
                self.doc_out.write_varint((delta << 1) | 1)?;
            } else {
                self.doc_out.write_varint(delta << 1)?;
                self.doc_out.write_varint(freq as u64)?;
            }
        } else {
            self.doc_out.write_varint(delta)?;
        }

        self.last_doc = doc;
        self.last_position = 0;
        self.doc_count += 1;
        Ok(())
    }

    fn add_position(&mut self, position: u32, payload: Option<&[u8]>) -> Result<()> {
        if !self.has_positions {
            return Err(TesseraError::invalid_operation(
                "Positions added to a field that does not index them",
            ));
        }

        let delta = (position - self.last_position) as u64;
        self.last_position = position;

        if self.has_payloads {
            match payload.filter(|p| !p.is_empty()) {
                Some(payload) => {
                    self.pos_out.write_varint((delta << 1) | 1)?;
                    self.pos_out.write_varint(payload.len() as u64)?;
                    self.pay_out.write_raw(payload)?;
                }
                None => self.pos_out.write_varint(delta << 1)?,
            }
        } else {
            self.pos_out.write_varint(delta)?;
        }
        Ok(())
    }

    fn finish_doc(&mut self) -> Result<()> {
        if self.doc_count % self.skip_interval == 0 {
            self.skip_entries.push(SkipEntry {
                doc: self.last_doc,
                doc_fp: self.doc_out.position(),
                pos_fp: self.pos_out.position(),
                pay_fp: self.pay_out.position(),
            });
        }
        Ok(())
    }
}
