//! Criterion benchmarks for the tessera codecs.
//!
//! Covers writing a segment, seeking terms, and walking postings with and
//! without skipping, for every codec.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use tessera::codec::{
    CodecConfig, CodecFactory, DocIdSetIterator, FieldsProducer, NO_MORE_DOCS, SegmentReadState,
};
use tessera::conformance::{Model, ModelConfig, ModelGenerator, write_segment};
use tessera::storage::memory::MemoryStorage;

/// Generate the benchmark model: one documents-only field and one with positions.
fn generate_model() -> Model {
    let config = ModelConfig {
        field_names: vec!["body".to_string(), "title".to_string()],
        max_terms: 200,
        max_doc_freq: 2000,
        max_term_freq: 8,
        ..Default::default()
    };
    ModelGenerator::new(&config)
        .generate(&mut StdRng::seed_from_u64(42))
        .unwrap()
}

fn open_segment(codec: &CodecConfig, model: &Model) -> FieldsProducer {
    let storage = Arc::new(MemoryStorage::default());
    write_segment(codec, storage.clone(), "_bench", model).unwrap();
    CodecFactory::fields_producer(
        codec,
        SegmentReadState::new(storage, "_bench", model.field_infos.clone()),
    )
    .unwrap()
}

fn bench_write(c: &mut Criterion) {
    let model = generate_model();
    let mut group = c.benchmark_group("write_segment");
    group.sample_size(20);
    group.throughput(Throughput::Elements(model.num_postings() as u64));

    for codec in CodecConfig::all() {
        group.bench_function(codec.name(), |b| {
            b.iter(|| {
                let storage = Arc::new(MemoryStorage::default());
                write_segment(&codec, storage, "_bench", black_box(&model)).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let model = generate_model();
    let mut group = c.benchmark_group("seek_ceil");
    group.throughput(Throughput::Elements(model.num_terms() as u64));

    for codec in CodecConfig::all() {
        let producer = open_segment(&codec, &model);
        group.bench_function(codec.name(), |b| {
            b.iter(|| {
                for field in &model.fields {
                    let mut terms = producer.terms(field.name()).unwrap().unwrap();
                    for term in field.terms.iter().rev() {
                        black_box(terms.seek_ceil(term.text.as_bytes()).unwrap());
                    }
                }
            });
        });
    }
    group.finish();
}

fn bench_postings(c: &mut Criterion) {
    let model = generate_model();
    let mut group = c.benchmark_group("postings");
    group.throughput(Throughput::Elements(model.num_postings() as u64));

    for codec in CodecConfig::all() {
        let producer = open_segment(&codec, &model);

        group.bench_function(format!("{}/next_doc", codec.name()), |b| {
            b.iter(|| {
                for field in &model.fields {
                    let mut terms = producer.terms(field.name()).unwrap().unwrap();
                    let mut reuse = None;
                    while terms.next().unwrap().is_some() {
                        let mut docs = terms.docs(reuse.take()).unwrap();
                        while docs.next_doc().unwrap() != NO_MORE_DOCS {}
                        reuse = Some(docs);
                    }
                }
            });
        });

        group.bench_function(format!("{}/advance", codec.name()), |b| {
            b.iter(|| {
                for field in &model.fields {
                    let mut terms = producer.terms(field.name()).unwrap().unwrap();
                    for term in &field.terms {
                        terms.seek_ceil(term.text.as_bytes()).unwrap();
                        let mut docs = terms.docs(None).unwrap();
                        for doc in term.docs.iter().step_by(16) {
                            black_box(docs.advance(*doc).unwrap());
                        }
                    }
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_write, bench_seek, bench_postings);
criterion_main!(benches);
