//! End-to-end conformance run: generate, write, read back, verify concurrently.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::codec::producer::FieldsProducer;
use crate::codec::{CodecConfig, CodecFactory, SegmentReadState};
use crate::conformance::config::ConformanceConfig;
use crate::conformance::model::{Model, ModelGenerator};
use crate::conformance::verifier::{VerifyReport, Verifier};
use crate::conformance::writer::{WriteSummary, write_segment};
use crate::error::{Result, TesseraError};
use crate::storage::Storage;

/// Segment name used by conformance runs.
pub const SEGMENT: &str = "_0";

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Codec as actually used, after randomization.
    pub codec: CodecConfig,
    /// Seed that reproduces the run.
    pub seed: u64,
    pub segment: String,
    /// Files the codec wrote for the segment.
    pub files: Vec<String>,
    pub fields: usize,
    pub terms: usize,
    pub postings: usize,
    /// One report per verifier thread, in thread order.
    pub threads: Vec<VerifyReport>,
    pub total: VerifyReport,
    pub elapsed_ms: u64,
}

/// Seed of verifier thread `thread`, derived from the run seed with a
/// SplitMix64 finalizer so that neighbouring threads get unrelated streams.
pub fn derive_thread_seed(seed: u64, thread: usize) -> u64 {
    let mut x = seed ^ ((thread as u64) << 1);
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Runs one conformance check of one codec against one storage.
pub struct ConformanceRunner {
    config: ConformanceConfig,
    storage: Arc<dyn Storage>,
}

impl ConformanceRunner {
    pub fn new(config: ConformanceConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        config.validate()?;
        Ok(ConformanceRunner { config, storage })
    }

    pub fn config(&self) -> &ConformanceConfig {
        &self.config
    }

    /// Generate a model, write it, and verify it from every thread.
    ///
    /// The first failure of any thread fails the run. Its message names the
    /// thread, field and term; rerunning with the reported seed reproduces it.
    pub fn run(&self) -> Result<RunReport> {
        let seed = self.config.seed.unwrap_or_else(|| rand::rng().random());
        self.run_with_seed(seed).map_err(|e| {
            error!("Conformance run with seed {seed} failed: {e}");
            match e {
                TesseraError::Conformance(message) => {
                    TesseraError::conformance(format!("seed {seed}: {message}"))
                }
                other => other,
            }
        })
    }

    /// Like [`run`](Self::run) with an explicit seed, ignoring the configured one.
    pub fn run_with_seed(&self, seed: u64) -> Result<RunReport> {
        let start = Instant::now();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut config = self.config.clone();
        if config.randomize_codec {
            config.codec = config.codec.randomized(&mut rng);
        }
        info!(
            "Conformance run of the {} codec with seed {} ({:?})",
            config.codec.name(),
            seed,
            config.codec
        );

        let model = ModelGenerator::new(&config.model).generate(&mut rng)?;
        let summary = write_segment(&config.codec, self.storage.clone(), SEGMENT, &model)?;
        let producer = CodecFactory::fields_producer(
            &config.codec,
            SegmentReadState::new(self.storage.clone(), SEGMENT, model.field_infos.clone()),
        )?;
        check_segment(&producer, &model, &summary)?;

        let threads = verify_concurrently(&producer, &model, &config, seed)?;
        let mut total = VerifyReport::default();
        for report in &threads {
            total.merge(report);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "Conformance run passed in {}ms: {} threads, {} docs, {} positions",
            elapsed_ms,
            threads.len(),
            total.docs,
            total.positions
        );

        Ok(RunReport {
            codec: config.codec,
            seed,
            segment: SEGMENT.to_string(),
            files: summary.files,
            fields: model.fields.len(),
            terms: model.num_terms(),
            postings: model.num_postings(),
            threads,
            total,
            elapsed_ms,
        })
    }
}

/// The opened segment must expose exactly the model's fields with the
/// statistics the writer reported.
fn check_segment(producer: &FieldsProducer, model: &Model, summary: &WriteSummary) -> Result<()> {
    let expected: Vec<&str> = model.fields.iter().map(|field| field.name()).collect();
    let actual = producer.field_names();
    if actual != expected {
        return Err(TesseraError::conformance(format!(
            "segment fields {actual:?}, expected {expected:?}"
        )));
    }

    for field in &model.fields {
        let persisted = producer.field_info(field.name());
        if persisted != Some(&field.info) {
            return Err(TesseraError::conformance(format!(
                "field={}: segment describes the field as {:?}, expected {:?}",
                field.name(),
                persisted,
                field.info
            )));
        }
    }

    for written in &summary.fields {
        let stats = producer.field_stats(&written.name);
        if stats != Some(written.stats) {
            return Err(TesseraError::conformance(format!(
                "field={}: reader stats {:?}, writer reported {:?}",
                written.name, stats, written.stats
            )));
        }
    }
    debug!("Segment exposes {} fields as written", actual.len());
    Ok(())
}

fn verify_concurrently(
    producer: &FieldsProducer,
    model: &Model,
    config: &ConformanceConfig,
    seed: u64,
) -> Result<Vec<VerifyReport>> {
    let num_threads = config.verify.threads;
    let results: Vec<Result<VerifyReport>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let name = format!("verify-{i}");
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(scope, move || {
                    Verifier::new(name, producer, model, config, derive_thread_seed(seed, i)).run()
                });
            match spawned {
                Ok(handle) => handles.push(Ok(handle)),
                Err(e) => {
                    warn!("Failed to spawn verifier thread {i}: {e}");
                    handles.push(Err(TesseraError::from(e)));
                }
            }
        }

        handles
            .into_iter()
            .map(|handle| {
                handle?
                    .join()
                    .unwrap_or_else(|panic| Err(TesseraError::ThreadJoinError(panic_message(&*panic))))
            })
            .collect()
    });

    results.into_iter().collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "verifier thread panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::config::ModelConfig;
    use crate::storage::memory::MemoryStorage;

    fn quick_config(codec: CodecConfig, seed: u64) -> ConformanceConfig {
        let mut config = ConformanceConfig {
            seed: Some(seed),
            codec,
            model: ModelConfig {
                max_terms: 15,
                max_doc_freq: 80,
                max_term_freq: 8,
                ..Default::default()
            },
            ..Default::default()
        };
        config.verify.iterations = 4;
        config.verify.absent_seeks = 20;
        config
    }

    #[test]
    fn test_thread_seeds_differ() {
        let seeds: Vec<u64> = (0..8).map(|i| derive_thread_seed(42, i)).collect();
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(derive_thread_seed(42, 3), derive_thread_seed(42, 3));
        assert_ne!(derive_thread_seed(42, 0), derive_thread_seed(43, 0));
    }

    #[test]
    fn test_run_passes_for_every_codec() {
        for codec in CodecConfig::all() {
            let storage = Arc::new(MemoryStorage::default());
            let runner = ConformanceRunner::new(quick_config(codec.clone(), 5), storage).unwrap();
            let report = runner.run().unwrap();

            assert_eq!(report.seed, 5);
            assert_eq!(report.codec.name(), codec.name());
            assert_eq!(report.threads.len(), 3);
            assert_eq!(report.total.iterations, 12);
            assert_eq!(report.segment, SEGMENT);
        }
    }

    #[test]
    fn test_same_seed_same_report() {
        let config = quick_config(CodecConfig::default(), 77);
        let first = ConformanceRunner::new(config.clone(), Arc::new(MemoryStorage::default()))
            .unwrap()
            .run()
            .unwrap();
        let second = ConformanceRunner::new(config, Arc::new(MemoryStorage::default()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(first.codec, second.codec);
        assert_eq!(first.threads, second.threads);
        assert_eq!(first.postings, second.postings);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = quick_config(CodecConfig::default(), 1);
        config.verify.iterations = 0;
        let result = ConformanceRunner::new(config, Arc::new(MemoryStorage::default()));
        assert!(result.is_err());
    }
}
