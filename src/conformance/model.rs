//! Randomized in-memory reference index.
//!
//! The model is the ground truth of a conformance run: it is written through a
//! codec and every reader observation is compared against it.

use ahash::AHashSet;
use rand::Rng;

use crate::codec::consumer::{FieldStats, TermStats};
use crate::codec::postings_enum::DocId;
use crate::conformance::config::ModelConfig;
use crate::error::{Result, TesseraError};
use crate::schema::{FieldInfo, FieldInfos, IndexOptions};

/// Generated terms never end with this character, so appending it to any text
/// yields a term that is guaranteed to be absent.
pub const RESERVED_SUFFIX: char = '.';

/// Attempts at finding a fresh term text before giving up.
const MAX_TEXT_ATTEMPTS: usize = 10_000;

/// One position of a posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionData {
    pub position: u32,
    pub payload: Option<Vec<u8>>,
}

/// A term with its postings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermData {
    pub text: String,
    pub docs: Vec<DocId>,
    /// Positions per doc; `None` for a field that indexes documents only.
    pub positions: Option<Vec<Vec<PositionData>>>,
}

impl TermData {
    pub fn doc_freq(&self) -> u32 {
        self.docs.len() as u32
    }

    /// Sum of the term's frequencies; zero for documents-only terms.
    pub fn total_term_freq(&self) -> u64 {
        self.positions
            .as_ref()
            .map_or(0, |positions| positions.iter().map(|p| p.len() as u64).sum())
    }

    /// Frequency of the `index`-th posting.
    pub fn freq(&self, index: usize) -> u32 {
        self.positions
            .as_ref()
            .map_or(0, |positions| positions[index].len() as u32)
    }

    pub fn stats(&self) -> TermStats {
        TermStats::new(self.doc_freq(), self.total_term_freq())
    }
}

/// A field with its terms sorted by text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldData {
    pub info: FieldInfo,
    pub terms: Vec<TermData>,
}

impl FieldData {
    /// Build a field, sorting `terms` by their UTF-8 bytes.
    pub fn new(info: FieldInfo, mut terms: Vec<TermData>) -> Self {
        terms.sort_by(|a, b| a.text.as_bytes().cmp(b.text.as_bytes()));
        FieldData { info, terms }
    }

    /// Statistics a writer must report for this field.
    pub fn stats(&self) -> FieldStats {
        let mut docs = AHashSet::new();
        let mut stats = FieldStats::default();
        for term in &self.terms {
            stats.sum_doc_freq += term.doc_freq() as u64;
            stats.sum_total_term_freq += term.total_term_freq();
            docs.extend(term.docs.iter().copied());
        }
        stats.doc_count = docs.len() as u32;
        stats
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }
}

/// A complete reference index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub field_infos: FieldInfos,
    /// Fields sorted by name.
    pub fields: Vec<FieldData>,
}

impl Model {
    pub fn new(field_infos: FieldInfos, mut fields: Vec<FieldData>) -> Self {
        fields.sort_by(|a, b| a.info.name.cmp(&b.info.name));
        Model {
            field_infos,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldData> {
        self.fields.iter().find(|field| field.info.name == name)
    }

    pub fn num_terms(&self) -> usize {
        self.fields.iter().map(|field| field.terms.len()).sum()
    }

    pub fn num_postings(&self) -> usize {
        self.fields
            .iter()
            .flat_map(|field| &field.terms)
            .map(|term| term.docs.len())
            .sum()
    }
}

/// Builds random models within the bounds of a [`ModelConfig`].
#[derive(Debug, Clone)]
pub struct ModelGenerator<'a> {
    config: &'a ModelConfig,
}

impl<'a> ModelGenerator<'a> {
    pub fn new(config: &'a ModelConfig) -> Self {
        ModelGenerator { config }
    }

    /// Generate a model; the same rng state always yields the same model.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> Result<Model> {
        let mut field_infos = FieldInfos::new();
        let mut fields = Vec::with_capacity(self.config.field_names.len());

        for (i, name) in self.config.field_names.iter().enumerate() {
            let docs_only = i % 3 == 0;
            let store_payloads = i % 3 == 1;
            let options = if docs_only {
                IndexOptions::DocsOnly
            } else {
                IndexOptions::DocsAndFreqsAndPositions
            };

            let info = field_infos.add(name.as_str(), options, store_payloads)?.clone();
            let terms = self.random_terms(rng, &info)?;
            fields.push(FieldData::new(info, terms));
        }

        Ok(Model::new(field_infos, fields))
    }

    fn random_terms<R: Rng>(&self, rng: &mut R, info: &FieldInfo) -> Result<Vec<TermData>> {
        let num_terms = rng.random_range(1..=self.config.max_terms);
        let mut seen = AHashSet::with_capacity(num_terms as usize);
        let mut terms = Vec::with_capacity(num_terms as usize);

        for _ in 0..num_terms {
            let text = self.fresh_text(rng, &mut seen)?;
            let doc_freq = rng.random_range(1..=self.config.max_doc_freq);

            let mut docs = Vec::with_capacity(doc_freq as usize);
            let mut positions = info
                .has_positions()
                .then(|| Vec::with_capacity(doc_freq as usize));

            let mut doc: DocId = 0;
            for _ in 0..doc_freq {
                doc += rng.random_range(1..=self.config.max_gap);
                docs.push(doc);
                if let Some(positions) = positions.as_mut() {
                    positions.push(self.random_positions(rng, info));
                }
            }

            terms.push(TermData {
                text,
                docs,
                positions,
            });
        }
        Ok(terms)
    }

    fn random_positions<R: Rng>(&self, rng: &mut R, info: &FieldInfo) -> Vec<PositionData> {
        let freq = rng.random_range(1..=self.config.max_term_freq);
        let mut position = 0u32;
        (0..freq)
            .map(|_| {
                position += rng.random_range(1..=self.config.max_gap);
                let payload = (info.store_payloads
                    && rng.random_bool(self.config.payload_probability))
                .then(|| {
                    let len = rng.random_range(1..=self.config.max_payload_len);
                    (0..len).map(|_| rng.random_range(0..=254u8)).collect()
                });
                PositionData { position, payload }
            })
            .collect()
    }

    fn fresh_text<R: Rng>(&self, rng: &mut R, seen: &mut AHashSet<String>) -> Result<String> {
        for _ in 0..MAX_TEXT_ATTEMPTS {
            let text = random_unicode_string(rng, self.config.max_text_len);
            if !text.ends_with(RESERVED_SUFFIX) && !seen.contains(&text) {
                seen.insert(text.clone());
                return Ok(text);
            }
        }
        Err(TesseraError::invalid_config(format!(
            "no fresh term text found in {MAX_TEXT_ATTEMPTS} attempts; raise max_text_len"
        )))
    }
}

/// A text guaranteed not to be a generated term.
pub fn absent_term<R: Rng>(rng: &mut R, max_len: usize) -> String {
    let mut text = random_unicode_string(rng, max_len);
    text.push(RESERVED_SUFFIX);
    text
}

/// A random string of up to `max_len` code points from mixed Unicode ranges.
pub fn random_unicode_string<R: Rng>(rng: &mut R, max_len: usize) -> String {
    let len = rng.random_range(0..=max_len);
    (0..len).map(|_| random_char(rng)).collect()
}

fn random_char<R: Rng>(rng: &mut R) -> char {
    let code = match rng.random_range(0..4) {
        0 => rng.random_range(0x00..=0x7F),
        1 => rng.random_range(0x80..=0x7FF),
        // Basic multilingual plane without the surrogate block.
        2 => {
            if rng.random_bool(0.5) {
                rng.random_range(0x800..0xD800)
            } else {
                rng.random_range(0xE000..=0xFFFF)
            }
        }
        _ => rng.random_range(0x1_0000..=0x10_FFFF),
    };
    char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
}
