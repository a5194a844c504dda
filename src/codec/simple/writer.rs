//! Writer for the simple codec.
//!
//! Everything is buffered per field and serialized when the consumer is
//! closed, since the field count heads the file.

use log::debug;

use crate::codec::consumer::{
    FieldStats, FieldsConsumer, PostingsConsumer, TermStats, TermsConsumer,
};
use crate::codec::postings_enum::DocId;
use crate::codec::simple::{EXTENSION, MAGIC, SimpleCodecConfig, VERSION};
use crate::codec::SegmentWriteState;
use crate::error::{Result, TesseraError};
use crate::schema::FieldInfo;
use crate::storage::structured::StructWriter;
use crate::util::varint::encode_u64_into;

/// One finished field waiting to be serialized.
#[derive(Debug)]
struct BufferedField {
    info: FieldInfo,
    stats: FieldStats,
    num_terms: u64,
    terms: Vec<u8>,
}

/// Segment writer for the simple codec.
#[derive(Debug)]
pub struct SimpleFieldsWriter {
    config: SimpleCodecConfig,
    state: SegmentWriteState,
    fields: Vec<BufferedField>,
}

impl SimpleFieldsWriter {
    pub fn new(config: SimpleCodecConfig, state: SegmentWriteState) -> Result<Self> {
        Ok(SimpleFieldsWriter {
            config,
            state,
            fields: Vec::new(),
        })
    }
}

impl FieldsConsumer for SimpleFieldsWriter {
    fn add_field(&mut self, field: &FieldInfo) -> Result<Box<dyn TermsConsumer + '_>> {
        let info = self.state.field_infos.check_persisted(field)?.clone();

        if let Some(last) = self.fields.last() {
            if last.info.name.as_str() >= field.name.as_str() {
                return Err(TesseraError::invalid_operation(format!(
                    "Field '{}' added after '{}'",
                    field.name, last.info.name
                )));
            }
        }

        let postings = SimplePostingsWriter::new(&info);
        Ok(Box::new(SimpleTermsWriter {
            info,
            fields: &mut self.fields,
            num_terms: 0,
            terms: Vec::new(),
            postings,
        }))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let name = self.state.file_name(EXTENSION);
        let output = self.state.storage.create_output(&name)?;
        let mut writer = StructWriter::new(output);

        writer.write_header(MAGIC, VERSION)?;
        writer.write_varint(self.config.block_size as u64)?;
        writer.write_varint(self.fields.len() as u64)?;
        for field in &self.fields {
            writer.write_string(&field.info.name)?;
            writer.write_varint(field.info.number as u64)?;
            writer.write_u8(field.info.index_options.to_code())?;
            writer.write_u8(field.info.store_payloads as u8)?;
            writer.write_varint(field.stats.sum_total_term_freq)?;
            writer.write_varint(field.stats.sum_doc_freq)?;
            writer.write_varint(field.stats.doc_count as u64)?;
            writer.write_varint(field.num_terms)?;
            writer.write_raw(&field.terms)?;
        }

        debug!(
            "Wrote simple segment {} ({} fields, {} bytes)",
            name,
            self.fields.len(),
            writer.position()
        );
        writer.close()
    }
}

/// Term writer for one field of the simple codec.
struct SimpleTermsWriter<'a> {
    info: FieldInfo,
    fields: &'a mut Vec<BufferedField>,
    num_terms: u64,
    terms: Vec<u8>,
    postings: SimplePostingsWriter,
}

impl TermsConsumer for SimpleTermsWriter<'_> {
    fn start_term(&mut self, _text: &[u8]) -> Result<&mut dyn PostingsConsumer> {
        self.postings.reset();
        Ok(&mut self.postings)
    }

    fn finish_term(&mut self, text: &[u8], stats: TermStats) -> Result<()> {
        debug_assert_eq!(stats.doc_freq, self.postings.doc_count);

        encode_u64_into(&mut self.terms, text.len() as u64);
        self.terms.extend_from_slice(text);
        encode_u64_into(&mut self.terms, stats.doc_freq as u64);
        encode_u64_into(&mut self.terms, stats.total_term_freq);
        self.terms.extend_from_slice(&self.postings.bytes);
        self.num_terms += 1;
        Ok(())
    }

    fn finish(self: Box<Self>, stats: FieldStats) -> Result<()> {
        let SimpleTermsWriter {
            info,
            fields,
            num_terms,
            terms,
            ..
        } = *self;

        debug!(
            "Finished field '{}': {} terms, sum_doc_freq={}, doc_count={}",
            info.name, num_terms, stats.sum_doc_freq, stats.doc_count
        );
        fields.push(BufferedField {
            info,
            stats,
            num_terms,
            terms,
        });
        Ok(())
    }
}

/// Postings writer for the current term.
struct SimplePostingsWriter {
    has_freqs: bool,
    has_positions: bool,
    has_payloads: bool,
    bytes: Vec<u8>,
    last_doc: DocId,
    last_position: u32,
    doc_count: u32,
}

impl SimplePostingsWriter {
    fn new(info: &FieldInfo) -> Self {
        SimplePostingsWriter {
            has_freqs: info.has_freqs(),
            has_positions: info.has_positions(),
            has_payloads: info.has_payloads(),
            bytes: Vec::new(),
            last_doc: 0,
            last_position: 0,
            doc_count: 0,
        }
    }

    fn reset(&mut self) {
        self.bytes.clear();
        self.last_doc = 0;
        self.last_position = 0;
        self.doc_count = 0;
    }
}

impl PostingsConsumer for SimplePostingsWriter {
    fn start_doc(&mut self, doc: DocId, freq: u32) -> Result<()> {
        encode_u64_into(&mut self.bytes, (doc - self.last_doc) as u64);
        if self.has_freqs {
            encode_u64_into(&mut self.bytes, freq as u64);
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
                    encode_u64_into(&mut self.bytes, (delta << 1) | 1);
                    encode_u64_into(&mut self.bytes, payload.len() as u64);
                    self.bytes.extend_from_slice(payload);
                }
                None => {
                    encode_u64_into(&mut self.bytes, delta << 1);
                }
            }
        } else {
            encode_u64_into(&mut self.bytes, delta);
        }
        Ok(())
    }

    fn finish_doc(&mut self) -> Result<()> {
        Ok(())
    }
}
