//! Compares reader output against the reference model.
//!
//! Each round picks a random field and runs, in order: a full forward scan, a
//! random seek by text, a random seek by ordinal, seeks to absent terms, every
//! term sought backwards by text and then by ordinal, a seek to the empty
//! term, and a forward scan over all terms mixing `next_doc` with `advance`.
//! Every postings list that is visited is checked doc by doc (and position by
//! position where the field has them) until exhaustion.

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::codec::postings_enum::{
    DocIdSetIterator, DocsAndPositionsEnum, DocsEnum, NO_MORE_DOCS,
};
use crate::codec::producer::FieldsProducer;
use crate::codec::terms_enum::{Capability, SeekStatus, TermsEnum};
use crate::conformance::config::ConformanceConfig;
use crate::conformance::model::{FieldData, Model, PositionData, TermData, absent_term};
use crate::error::{Result, TesseraError};

/// Counters of what a verifier looked at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub iterations: u64,
    pub terms_scanned: u64,
    pub seeks: u64,
    pub ord_seeks: u64,
    pub unsupported_ord_seeks: u64,
    pub absent_seeks: u64,
    pub docs: u64,
    pub advances: u64,
    pub positions: u64,
    pub payload_bytes: u64,
}

impl VerifyReport {
    /// Add the counters of `other` to this report.
    pub fn merge(&mut self, other: &VerifyReport) {
        self.iterations += other.iterations;
        self.terms_scanned += other.terms_scanned;
        self.seeks += other.seeks;
        self.ord_seeks += other.ord_seeks;
        self.unsupported_ord_seeks += other.unsupported_ord_seeks;
        self.absent_seeks += other.absent_seeks;
        self.docs += other.docs;
        self.advances += other.advances;
        self.positions += other.positions;
        self.payload_bytes += other.payload_bytes;
    }
}

/// Return a conformance failure from the enclosing function unless `$cond`.
macro_rules! check {
    ($self:ident, $field:expr, $term:expr, $cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err($self.failure($field, $term, format!($($msg)+)));
        }
    };
}

/// One verifier, normally owned by one thread.
pub struct Verifier<'a> {
    name: String,
    producer: &'a FieldsProducer,
    model: &'a Model,
    config: &'a ConformanceConfig,
    rng: StdRng,
    report: VerifyReport,
}

impl<'a> Verifier<'a> {
    pub fn new<S: Into<String>>(
        name: S,
        producer: &'a FieldsProducer,
        model: &'a Model,
        config: &'a ConformanceConfig,
        seed: u64,
    ) -> Self {
        Verifier {
            name: name.into(),
            producer,
            model,
            config,
            rng: StdRng::seed_from_u64(seed),
            report: VerifyReport::default(),
        }
    }

    /// Run every configured round.
    pub fn run(mut self) -> Result<VerifyReport> {
        for iteration in 0..self.config.verify.iterations {
            self.run_iteration(iteration)?;
            self.report.iterations += 1;
        }
        info!(
            "{}: {} rounds passed ({} docs, {} positions, {} seeks)",
            self.name,
            self.report.iterations,
            self.report.docs,
            self.report.positions,
            self.report.seeks
        );
        Ok(self.report)
    }

    fn failure(&self, field: &FieldData, term: Option<&TermData>, message: String) -> TesseraError {
        let term = term.map_or_else(|| "-".to_string(), |term| format!("{:?}", term.text));
        TesseraError::conformance(format!(
            "{}: field={} term={}: {}",
            self.name,
            field.name(),
            term,
            message
        ))
    }

    /// Run one round against a randomly chosen field.
    pub fn run_iteration(&mut self, iteration: usize) -> Result<()> {
        let model = self.model;
        if model.fields.is_empty() {
            return Err(TesseraError::invalid_argument("model has no fields"));
        }
        let field = &model.fields[self.rng.random_range(0..model.fields.len())];
        debug!(
            "{}: round {} on field '{}' ({} terms)",
            self.name,
            iteration,
            field.name(),
            field.terms.len()
        );

        self.check_field_stats(field)?;
        let Some(mut terms) = self.producer.terms(field.name())? else {
            return Err(self.failure(field, None, "field missing from reader".to_string()));
        };

        self.scan_terms(field, &mut terms)?;
        if field.terms.is_empty() {
            let status = terms.seek_ceil(b"")?;
            check!(self, field, None, status == SeekStatus::End, "seek_ceil(\"\") returned {status:?}");
            return Ok(());
        }

        self.seek_random_term(field, &mut terms)?;
        self.seek_random_ord(field, &mut terms)?;
        self.seek_absent_terms(field, &mut terms)?;
        self.seek_backwards(field, &mut terms)?;
        self.seek_ords_backwards(field, &mut terms)?;
        self.seek_empty_term(field, &mut terms)?;
        self.scan_with_skips(field, &mut terms)
    }

    fn check_field_stats(&mut self, field: &FieldData) -> Result<()> {
        let expected = field.stats();
        let actual = self.producer.field_stats(field.name());
        check!(
            self,
            field,
            None,
            actual == Some(expected),
            "field stats {actual:?}, expected {expected:?}"
        );

        let num_terms = self.producer.num_terms(field.name());
        check!(
            self,
            field,
            None,
            num_terms == Some(field.terms.len() as u64),
            "reader reports {num_terms:?} terms, expected {}",
            field.terms.len()
        );
        Ok(())
    }

    /// Exhaust the enumerator with `next` and compare every term.
    fn scan_terms(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        let mut upto = 0;
        while let Some(text) = terms.next()? {
            let expected = field.terms.get(upto);
            check!(
                self,
                field,
                expected,
                expected.is_some_and(|term| term.text.as_bytes() == text),
                "term #{upto} is {:?}",
                String::from_utf8_lossy(text)
            );
            if let Some(term) = expected {
                let total_term_freq = terms.total_term_freq()?;
                check!(
                    self,
                    field,
                    Some(term),
                    total_term_freq == term.total_term_freq(),
                    "total_term_freq {total_term_freq}, expected {}",
                    term.total_term_freq()
                );
            }
            upto += 1;
        }
        self.report.terms_scanned += upto as u64;

        check!(
            self,
            field,
            None,
            upto == field.terms.len(),
            "scan returned {upto} terms, expected {}",
            field.terms.len()
        );
        check!(
            self,
            field,
            None,
            terms.next()?.is_none(),
            "next after the end returned a term"
        );
        Ok(())
    }

    fn check_doc_freq(&self, field: &FieldData, term: &TermData, terms: &TermsEnum) -> Result<()> {
        let doc_freq = terms.doc_freq()?;
        check!(
            self,
            field,
            Some(term),
            doc_freq == term.doc_freq(),
            "doc_freq {doc_freq}, expected {}",
            term.doc_freq()
        );
        Ok(())
    }

    fn seek_random_term(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        let term = &field.terms[self.rng.random_range(0..field.terms.len())];
        let status = terms.seek_ceil(term.text.as_bytes())?;
        self.report.seeks += 1;
        check!(self, field, Some(term), status == SeekStatus::Found, "seek_ceil returned {status:?}");

        self.check_doc_freq(field, term, terms)?;
        self.verify_term(field, term, terms)
    }

    fn seek_random_ord(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        let ord = self.rng.random_range(0..field.terms.len());
        let term = &field.terms[ord];

        let matched = terms
            .seek_exact_ord(ord as u64)?
            .map(|text| text == term.text.as_bytes());
        match matched {
            Capability::Supported(matched) => {
                self.report.ord_seeks += 1;
                check!(self, field, Some(term), matched, "seek_exact_ord({ord}) landed elsewhere");
                self.check_doc_freq(field, term, terms)?;
                self.verify_term(field, term, terms)
            }
            Capability::Unsupported => {
                self.report.unsupported_ord_seeks += 1;
                Ok(())
            }
        }
    }

    fn seek_absent_terms(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        for _ in 0..self.config.verify.absent_seeks {
            let text = absent_term(&mut self.rng, self.config.model.max_text_len);
            let status = terms.seek_ceil(text.as_bytes())?;
            self.report.absent_seeks += 1;
            check!(
                self,
                field,
                None,
                status != SeekStatus::Found,
                "absent term {text:?} was found"
            );
        }
        Ok(())
    }

    fn seek_backwards(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        for term in field.terms.iter().rev() {
            let status = terms.seek_ceil(term.text.as_bytes())?;
            self.report.seeks += 1;
            check!(self, field, Some(term), status == SeekStatus::Found, "seek_ceil returned {status:?}");
            self.check_doc_freq(field, term, terms)?;
        }
        Ok(())
    }

    fn seek_ords_backwards(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        for (ord, term) in field.terms.iter().enumerate().rev() {
            let matched = terms
                .seek_exact_ord(ord as u64)?
                .map(|text| text == term.text.as_bytes());
            match matched {
                Capability::Supported(matched) => {
                    self.report.ord_seeks += 1;
                    check!(self, field, Some(term), matched, "seek_exact_ord({ord}) landed elsewhere");
                    self.check_doc_freq(field, term, terms)?;
                }
                Capability::Unsupported => {
                    self.report.unsupported_ord_seeks += 1;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// The empty text sorts before everything, so the enumerator must land on
    /// the first term, and do so again when asked twice.
    fn seek_empty_term(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        let first = &field.terms[0];
        let expected = if first.text.is_empty() {
            SeekStatus::Found
        } else {
            SeekStatus::NotFound
        };

        for _ in 0..2 {
            let status = terms.seek_ceil(b"")?;
            self.report.seeks += 1;
            check!(self, field, Some(first), status == expected, "seek_ceil(\"\") returned {status:?}");
            check!(
                self,
                field,
                Some(first),
                terms.term() == Some(first.text.as_bytes()),
                "seek_ceil(\"\") is not on the first term"
            );
        }
        Ok(())
    }

    /// Step through every term from the first, walking a random subset of
    /// postings lists with a mix of `next_doc` and `advance`.
    fn scan_with_skips(&mut self, field: &FieldData, terms: &mut TermsEnum) -> Result<()> {
        terms.seek_ceil(b"")?;
        let mut upto = 0;
        loop {
            let term = &field.terms[upto];
            if self.rng.random_bool(self.config.verify.scan_probability) {
                match terms.docs_and_positions(None)? {
                    Some(mut postings) => {
                        self.skip_through(field, term, &mut postings, |verifier, postings, i| {
                            verifier.maybe_verify_positions(field, term, i, postings)
                        })?
                    }
                    None => {
                        check!(
                            self,
                            field,
                            Some(term),
                            !field.info.has_positions(),
                            "positions unavailable on a positional field"
                        );
                        let mut docs = terms.docs(None)?;
                        self.skip_through(field, term, &mut docs, |_, _, _| Ok(()))?
                    }
                }
            }
            upto += 1;

            match terms.next()? {
                Some(text) => check!(
                    self,
                    field,
                    field.terms.get(upto),
                    field
                        .terms
                        .get(upto)
                        .is_some_and(|next| next.text.as_bytes() == text),
                    "next returned {:?} after {upto} terms",
                    String::from_utf8_lossy(text)
                ),
                None => break,
            }
        }

        check!(
            self,
            field,
            None,
            upto == field.terms.len(),
            "mixed scan visited {upto} terms, expected {}",
            field.terms.len()
        );
        Ok(())
    }

    fn skip_through<D: DocIdSetIterator>(
        &mut self,
        field: &FieldData,
        term: &TermData,
        docs: &mut D,
        mut check_positions: impl FnMut(&mut Self, &mut D, usize) -> Result<()>,
    ) -> Result<()> {
        let num_docs = term.docs.len();
        let mut next = 0;
        while next < num_docs {
            let mut index = next;
            let doc = if self.rng.random_bool(self.config.verify.skip_probability) {
                index = self.rng.random_range(next..num_docs);
                self.report.advances += 1;

                if self.rng.random_bool(self.config.verify.exact_target_probability) {
                    docs.advance(term.docs[index])?
                } else {
                    let doc = docs.advance(term.docs[index] + 1)?;
                    if doc == NO_MORE_DOCS {
                        check!(
                            self,
                            field,
                            Some(term),
                            index == num_docs - 1,
                            "advance({}) exhausted before doc #{}",
                            term.docs[index] + 1,
                            index + 1
                        );
                        break;
                    }
                    index += 1;
                    doc
                }
            } else {
                docs.next_doc()?
            };

            check!(
                self,
                field,
                Some(term),
                term.docs.get(index) == Some(&doc),
                "doc #{index} is {doc}, expected {:?}",
                term.docs.get(index)
            );
            self.report.docs += 1;
            next = index + 1;

            // Documents-only fields report a frequency of 0.
            let freq = docs.freq();
            check!(
                self,
                field,
                Some(term),
                freq == term.freq(index),
                "freq of doc {doc} is {freq}, expected {}",
                term.freq(index)
            );
            if field.info.has_freqs() {
                check_positions(self, docs, index)?;
            }
        }

        let doc = docs.next_doc()?;
        check!(self, field, Some(term), doc == NO_MORE_DOCS, "doc {doc} after the last doc");
        Ok(())
    }

    fn maybe_verify_positions(
        &mut self,
        field: &FieldData,
        term: &TermData,
        index: usize,
        postings: &mut DocsAndPositionsEnum,
    ) -> Result<()> {
        if !self.rng.random_bool(self.config.verify.position_probability) {
            return Ok(());
        }
        match &term.positions {
            Some(positions) => self.verify_positions(field, term, &positions[index], postings),
            None => Ok(()),
        }
    }

    /// Check a whole postings list from the current term until exhaustion.
    fn verify_term(&mut self, field: &FieldData, term: &TermData, terms: &TermsEnum) -> Result<()> {
        match (&term.positions, terms.docs_and_positions(None)?) {
            (Some(positions), Some(mut postings)) => {
                for i in 0..term.docs.len() {
                    self.expect_next_doc(field, term, &mut postings, i)?;
                    self.verify_positions(field, term, &positions[i], &mut postings)?;
                }
                self.expect_exhausted(field, term, &mut postings)
            }
            (None, None) => {
                let mut docs: DocsEnum = terms.docs(None)?;
                for i in 0..term.docs.len() {
                    self.expect_next_doc(field, term, &mut docs, i)?;
                }
                self.expect_exhausted(field, term, &mut docs)
            }
            (Some(_), None) => Err(self.failure(
                field,
                Some(term),
                "positions unavailable on a positional field".to_string(),
            )),
            (None, Some(_)) => Err(self.failure(
                field,
                Some(term),
                "positions offered on a documents-only field".to_string(),
            )),
        }
    }

    fn expect_next_doc<D: DocIdSetIterator>(
        &mut self,
        field: &FieldData,
        term: &TermData,
        docs: &mut D,
        index: usize,
    ) -> Result<()> {
        let expected = term.docs[index];
        let doc = docs.next_doc()?;
        check!(self, field, Some(term), doc == expected, "next_doc returned {doc}, expected {expected}");

        let freq = docs.freq();
        check!(
            self,
            field,
            Some(term),
            freq == term.freq(index),
            "freq of doc {doc} is {freq}, expected {}",
            term.freq(index)
        );
        self.report.docs += 1;
        Ok(())
    }

    fn expect_exhausted<D: DocIdSetIterator>(
        &mut self,
        field: &FieldData,
        term: &TermData,
        docs: &mut D,
    ) -> Result<()> {
        for _ in 0..2 {
            let doc = docs.next_doc()?;
            check!(self, field, Some(term), doc == NO_MORE_DOCS, "doc {doc} after the last doc");
        }
        Ok(())
    }

    fn verify_positions(
        &mut self,
        field: &FieldData,
        term: &TermData,
        expected: &[PositionData],
        postings: &mut DocsAndPositionsEnum,
    ) -> Result<()> {
        for data in expected {
            let position = postings.next_position()?;
            check!(
                self,
                field,
                Some(term),
                position == data.position,
                "position {position}, expected {}",
                data.position
            );
            self.report.positions += 1;

            match &data.payload {
                Some(payload) => {
                    check!(
                        self,
                        field,
                        Some(term),
                        postings.has_payload(),
                        "no payload at position {position}"
                    );
                    if self.rng.random_bool(self.config.verify.payload_fetch_probability) {
                        let actual = postings.payload()?;
                        check!(
                            self,
                            field,
                            Some(term),
                            actual == Some(payload.as_slice()),
                            "payload {actual:?} at position {position}, expected {payload:?}"
                        );
                        self.report.payload_bytes += payload.len() as u64;
                    }
                }
                None => check!(
                    self,
                    field,
                    Some(term),
                    !postings.has_payload(),
                    "unexpected payload at position {position}"
                ),
            }
        }
        trace!("{}: {} positions matched", self.name, expected.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rand::rngs::StdRng;

    use crate::codec::consumer::FieldStats;
    use crate::codec::{CodecConfig, CodecFactory, SegmentReadState};
    use crate::conformance::config::ModelConfig;
    use crate::conformance::model::{FieldData, ModelGenerator};
    use crate::conformance::writer::write_segment;
    use crate::schema::{FieldInfos, IndexOptions};
    use crate::storage::memory::MemoryStorage;

    fn small_config(codec: CodecConfig) -> ConformanceConfig {
        let mut config = ConformanceConfig {
            seed: Some(1),
            codec,
            ..Default::default()
        };
        config.model = ModelConfig {
            max_terms: 12,
            max_doc_freq: 60,
            max_term_freq: 6,
            ..Default::default()
        };
        config.verify.iterations = 6;
        config.verify.absent_seeks = 10;
        config
    }

    fn build(config: &ConformanceConfig, model: &Model) -> FieldsProducer {
        let storage = Arc::new(MemoryStorage::default());
        write_segment(&config.codec, storage.clone(), "_v", model).unwrap();
        CodecFactory::fields_producer(
            &config.codec,
            SegmentReadState::new(storage, "_v", model.field_infos.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_verifier_passes_on_every_codec() {
        for codec in CodecConfig::all() {
            let config = small_config(codec.clone());
            let model = ModelGenerator::new(&config.model)
                .generate(&mut StdRng::seed_from_u64(21))
                .unwrap();
            let producer = build(&config, &model);

            let report = Verifier::new("test", &producer, &model, &config, 8)
                .run()
                .unwrap();
            assert_eq!(report.iterations, 6);
            assert!(report.docs > 0);
            assert_eq!(report.absent_seeks, 60);
            if codec.supports_ord() {
                assert_eq!(report.unsupported_ord_seeks, 0);
            } else {
                assert_eq!(report.ord_seeks, 0);
                assert!(report.unsupported_ord_seeks >= 6);
            }
        }
    }

    #[test]
    fn test_verifier_detects_wrong_model() {
        let config = small_config(CodecConfig::default());
        let model = ModelGenerator::new(&config.model)
            .generate(&mut StdRng::seed_from_u64(4))
            .unwrap();
        let producer = build(&config, &model);

        // Same fields, one doc shifted in every term.
        let mut tampered = model.clone();
        for field in &mut tampered.fields {
            for term in &mut field.terms {
                let last = term.docs.len() - 1;
                term.docs[last] += 1;
            }
        }

        let err = Verifier::new("tamper", &producer, &tampered, &config, 2)
            .run()
            .unwrap_err();
        assert!(err.is_conformance());
        assert!(err.to_string().contains("tamper: field="));
    }

    #[test]
    fn test_mixed_scan_checks_documents_only_freq() {
        let mut infos = FieldInfos::new();
        let info = infos.add("f", IndexOptions::DocsOnly, false).unwrap().clone();
        let term = TermData {
            text: "cat".to_string(),
            docs: vec![1, 4, 9],
            positions: None,
        };
        let model = Model::new(infos, vec![FieldData::new(info, vec![term])]);

        // A model claiming one occurrence per doc disagrees with the freq of 0
        // a documents-only field reports.
        let mut tampered = model.clone();
        let once = vec![PositionData {
            position: 0,
            payload: None,
        }];
        tampered.fields[0].terms[0].positions = Some(vec![once; 3]);

        for codec in CodecConfig::all() {
            let mut config = small_config(codec);
            config.verify.scan_probability = 1.0;
            config.verify.skip_probability = 0.0;
            let producer = build(&config, &model);

            let mut verifier = Verifier::new("scan", &producer, &model, &config, 3);
            let mut terms = producer.terms("f").unwrap().unwrap();
            verifier.scan_with_skips(&model.fields[0], &mut terms).unwrap();
            assert_eq!(verifier.report.docs, 3);

            let mut verifier = Verifier::new("scan", &producer, &tampered, &config, 3);
            let mut terms = producer.terms("f").unwrap().unwrap();
            let err = verifier
                .scan_with_skips(&tampered.fields[0], &mut terms)
                .unwrap_err();
            assert!(
                err.to_string().contains("freq of doc 1 is 0, expected 1"),
                "{err}"
            );
        }
    }

    #[test]
    fn test_failure_names_field_and_term() {
        let mut infos = FieldInfos::new();
        let info = infos.add("f", IndexOptions::DocsOnly, false).unwrap().clone();
        let field = FieldData::new(
            info,
            vec![TermData {
                text: "cat".to_string(),
                docs: vec![1],
                positions: None,
            }],
        );
        let model = Model::new(infos, vec![field]);
        let config = small_config(CodecConfig::default());
        let producer = build(&config, &model);

        let verifier = Verifier::new("t0", &producer, &model, &config, 0);
        let err = verifier.failure(&model.fields[0], Some(&model.fields[0].terms[0]), "boom".into());
        assert_eq!(
            err.to_string(),
            "Conformance failure: t0: field=f term=\"cat\": boom"
        );
        assert_eq!(
            producer.field_stats("f"),
            Some(FieldStats {
                sum_total_term_freq: 0,
                sum_doc_freq: 1,
                doc_count: 1,
            })
        );
    }
}
