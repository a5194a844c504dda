//! Drives a codec's write side from a [`Model`].

use std::sync::Arc;
use std::time::Instant;

use bit_vec::BitVec;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::codec::consumer::{FieldStats, FieldsConsumer, TermStats, TermsConsumer};
use crate::codec::{CodecConfig, CodecFactory, SegmentWriteState};
use crate::conformance::model::{FieldData, Model, TermData};
use crate::error::Result;
use crate::storage::Storage;

/// Statistics reported to the codec for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWriteSummary {
    pub name: String,
    pub stats: FieldStats,
    /// Per-term statistics in write order.
    pub terms: Vec<TermStats>,
}

/// Everything the adapter reported to the codec, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub fields: Vec<FieldWriteSummary>,
    /// Files of the segment present in storage once the consumer closed.
    pub files: Vec<String>,
}

impl WriteSummary {
    pub fn field(&self, name: &str) -> Option<&FieldWriteSummary> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Write `model` as segment `segment` with the codec described by `config`.
pub fn write_segment(
    config: &CodecConfig,
    storage: Arc<dyn Storage>,
    segment: &str,
    model: &Model,
) -> Result<WriteSummary> {
    let start = Instant::now();
    let state = SegmentWriteState::new(storage.clone(), segment, model.field_infos.clone());
    let consumer = CodecFactory::fields_consumer(config, state)?;
    let mut summary = write_fields(consumer, model)?;

    let prefix = format!("{segment}.");
    summary.files = storage
        .list_files()?
        .into_iter()
        .filter(|name| name.starts_with(&prefix))
        .collect();

    info!(
        "Wrote segment {} with the {} codec: {} files, {} fields, {} terms, {} postings in {:?}",
        segment,
        config.name(),
        summary.files.len(),
        model.fields.len(),
        model.num_terms(),
        model.num_postings(),
        start.elapsed()
    );
    Ok(summary)
}

/// Write every field of `model` in name order, then close the consumer.
pub fn write_fields(mut consumer: Box<dyn FieldsConsumer>, model: &Model) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();
    for field in &model.fields {
        summary.fields.push(write_field(consumer.as_mut(), field)?);
    }
    consumer.close()?;
    Ok(summary)
}

fn write_field(consumer: &mut dyn FieldsConsumer, field: &FieldData) -> Result<FieldWriteSummary> {
    let mut terms_consumer = consumer.add_field(&field.info)?;

    let mut visited = BitVec::new();
    let mut stats = FieldStats::default();
    let mut term_stats = Vec::with_capacity(field.terms.len());

    for term in &field.terms {
        for &doc in &term.docs {
            let doc = doc as usize;
            if doc >= visited.len() {
                visited.grow(doc + 1 - visited.len(), false);
            }
            visited.set(doc, true);
        }

        let written = write_term(terms_consumer.as_mut(), term)?;
        stats.sum_doc_freq += written.doc_freq as u64;
        stats.sum_total_term_freq += written.total_term_freq;
        term_stats.push(written);
    }

    stats.doc_count = visited.iter().filter(|bit| *bit).count() as u32;
    terms_consumer.finish(stats)?;

    debug!(
        "Field '{}': {} terms, sum_doc_freq={}, sum_total_term_freq={}, doc_count={}",
        field.info.name,
        term_stats.len(),
        stats.sum_doc_freq,
        stats.sum_total_term_freq,
        stats.doc_count
    );

    Ok(FieldWriteSummary {
        name: field.info.name.clone(),
        stats,
        terms: term_stats,
    })
}

fn write_term(terms_consumer: &mut dyn TermsConsumer, term: &TermData) -> Result<TermStats> {
    let text = term.text.as_bytes();
    let postings = terms_consumer.start_term(text)?;

    let mut total_term_freq = 0u64;
    for (i, &doc) in term.docs.iter().enumerate() {
        let freq = term.freq(i);
        postings.start_doc(doc, freq)?;
        if let Some(positions) = &term.positions {
            for position in &positions[i] {
                postings.add_position(position.position, position.payload.as_deref())?;
            }
        }
        postings.finish_doc()?;
        total_term_freq += freq as u64;
    }

    let stats = TermStats::new(term.doc_freq(), total_term_freq);
    terms_consumer.finish_term(text, stats)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::config::ModelConfig;
    use crate::conformance::model::ModelGenerator;
    use crate::storage::memory::MemoryStorage;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_summary_matches_model() {
        let config = ModelConfig {
            max_terms: 10,
            max_doc_freq: 40,
            ..Default::default()
        };
        let model = ModelGenerator::new(&config)
            .generate(&mut StdRng::seed_from_u64(17))
            .unwrap();

        for codec in CodecConfig::all() {
            let storage = Arc::new(MemoryStorage::default());
            let summary = write_segment(&codec, storage.clone(), "_w", &model).unwrap();

            assert_eq!(summary.fields.len(), model.fields.len());
            for field in &model.fields {
                let written = summary.field(field.name()).unwrap();
                assert_eq!(written.stats, field.stats());
                let expected: Vec<TermStats> = field.terms.iter().map(TermData::stats).collect();
                assert_eq!(written.terms, expected);
            }
            assert!(!summary.files.is_empty());
            assert!(summary.files.iter().all(|name| name.starts_with("_w.")));
            assert_eq!(summary.files, storage.list_files().unwrap());
        }
    }
}
