//! Deterministic smoke check with a hand-built segment.
//!
//! One documents-only field `field` holds the base-36 renderings of `0..100`,
//! term `i` occurring in document `i` only. Docs enumerators are reused from
//! term to term, so a reader that fails to reset reused state shows up here
//! before any randomized run.

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::codec::postings_enum::{DocIdSetIterator, DocsEnum, NO_MORE_DOCS};
use crate::codec::terms_enum::SeekStatus;
use crate::codec::{CodecConfig, CodecFactory, SegmentReadState};
use crate::conformance::model::{FieldData, Model, TermData};
use crate::conformance::writer::write_segment;
use crate::error::{Result, TesseraError};
use crate::schema::{FieldInfos, IndexOptions};
use crate::storage::Storage;

pub const FIXED_SEGMENT: &str = "_fixed";
pub const FIXED_FIELD: &str = "field";
const NUM_TERMS: u32 = 100;

/// Outcome of a successful fixed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedReport {
    pub codec: String,
    pub terms: usize,
    pub docs: usize,
}

/// Lowercase base-36 rendering of `value`.
pub fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// The fixed model, terms sorted by text.
pub fn fixed_model() -> Result<Model> {
    let mut infos = FieldInfos::new();
    let info = infos.add(FIXED_FIELD, IndexOptions::DocsOnly, false)?.clone();
    let terms = (0..NUM_TERMS)
        .map(|i| TermData {
            text: to_base36(i),
            docs: vec![i],
            positions: None,
        })
        .collect();
    Ok(Model::new(infos, vec![FieldData::new(info, terms)]))
}

fn fixed_failure(codec: &CodecConfig, message: String) -> TesseraError {
    TesseraError::conformance(format!("fixed {} check: {}", codec.name(), message))
}

/// Write the fixed segment with `codec` and check every read path on it.
pub fn check_fixed_postings(codec: &CodecConfig, storage: Arc<dyn Storage>) -> Result<FixedReport> {
    let model = fixed_model()?;
    write_segment(codec, storage.clone(), FIXED_SEGMENT, &model)?;
    let producer = CodecFactory::fields_producer(
        codec,
        SegmentReadState::new(storage, FIXED_SEGMENT, model.field_infos.clone()),
    )?;

    let names = producer.field_names();
    if names != [FIXED_FIELD] {
        return Err(fixed_failure(codec, format!("segment has fields {names:?}")));
    }
    let expected = &model.fields[0].terms;
    let mut terms = producer
        .terms(FIXED_FIELD)?
        .ok_or_else(|| fixed_failure(codec, "field missing from reader".to_string()))?;

    let mut reuse: Option<DocsEnum> = None;
    let mut docs_checked = 0;
    for term in expected {
        match terms.next()? {
            Some(text) if text == term.text.as_bytes() => {}
            other => {
                return Err(fixed_failure(
                    codec,
                    format!(
                        "next returned {:?}, expected {:?}",
                        other.map(String::from_utf8_lossy),
                        term.text
                    ),
                ));
            }
        }

        let doc = term.docs[0];
        for _ in 0..2 {
            let mut docs = terms.docs(reuse.take())?;
            let first = docs.next_doc()?;
            let second = docs.next_doc()?;
            if first != doc || second != NO_MORE_DOCS {
                return Err(fixed_failure(
                    codec,
                    format!(
                        "term {:?} returned docs [{first}, {second}], expected [{doc}, end]",
                        term.text
                    ),
                ));
            }
            docs_checked += 1;
            reuse = Some(docs);
        }
    }
    if terms.next()?.is_some() {
        return Err(fixed_failure(codec, "next after the last term returned a term".to_string()));
    }

    for term in expected {
        let status = terms.seek_ceil(term.text.as_bytes())?;
        if status != SeekStatus::Found {
            return Err(fixed_failure(
                codec,
                format!("seek_ceil({:?}) returned {status:?}", term.text),
            ));
        }
    }

    info!(
        "Fixed postings check passed for the {} codec ({} terms)",
        codec.name(),
        expected.len()
    );
    Ok(FixedReport {
        codec: codec.name().to_string(),
        terms: expected.len(),
        docs: docs_checked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(9), "9");
        assert_eq!(to_base36(10), "a");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(99), "2r");
    }

    #[test]
    fn test_fixed_model_is_sorted() {
        let model = fixed_model().unwrap();
        let texts: Vec<&str> = model.fields[0].terms.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts.len(), 100);
        assert!(texts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(texts[0], "0");
        assert_eq!(texts[99], "z");
    }

    #[test]
    fn test_fixed_check_passes_for_every_codec() {
        for codec in CodecConfig::all() {
            let report = check_fixed_postings(&codec, Arc::new(MemoryStorage::default())).unwrap();
            assert_eq!(report.terms, 100);
            assert_eq!(report.docs, 200);
        }
    }
}
