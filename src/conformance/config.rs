//! Configuration of conformance runs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::CodecConfig;
use crate::error::{Result, TesseraError};

/// Bounds of the randomly generated reference model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Field names, in registration order. Field `i` indexes documents only
    /// when `i % 3 == 0` and stores payloads when `i % 3 == 1`.
    pub field_names: Vec<String>,

    /// Maximum number of terms per field.
    pub max_terms: u32,

    /// Maximum number of documents per term.
    pub max_doc_freq: u32,

    /// Maximum number of positions per document.
    pub max_term_freq: u32,

    /// Largest gap between consecutive doc ids or positions.
    pub max_gap: u32,

    /// Chance that a position carries a payload in a payload field.
    pub payload_probability: f64,

    /// Maximum payload length in bytes.
    pub max_payload_len: usize,

    /// Maximum term length in code points.
    pub max_text_len: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            field_names: ["one", "two", "three", "four"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_terms: 50,
            max_doc_freq: 500,
            max_term_freq: 20,
            max_gap: 10,
            payload_probability: 0.25,
            max_payload_len: 5,
            max_text_len: 20,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.field_names.is_empty() {
            return Err(TesseraError::invalid_config("at least one field is required"));
        }
        for (i, name) in self.field_names.iter().enumerate() {
            if name.is_empty() {
                return Err(TesseraError::invalid_config("field names must not be empty"));
            }
            if self.field_names[..i].contains(name) {
                return Err(TesseraError::invalid_config(format!(
                    "field '{name}' is listed twice"
                )));
            }
        }

        for (name, value) in [
            ("max_terms", self.max_terms as u64),
            ("max_doc_freq", self.max_doc_freq as u64),
            ("max_term_freq", self.max_term_freq as u64),
            ("max_gap", self.max_gap as u64),
            ("max_payload_len", self.max_payload_len as u64),
            ("max_text_len", self.max_text_len as u64),
        ] {
            if value == 0 {
                return Err(TesseraError::invalid_config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        // Doc ids must stay below the exhaustion sentinel.
        if self.max_doc_freq as u64 * self.max_gap as u64 >= u32::MAX as u64 {
            return Err(TesseraError::invalid_config(
                "max_doc_freq * max_gap overflows the doc id space",
            ));
        }
        if self.max_term_freq as u64 * self.max_gap as u64 > u32::MAX as u64 {
            return Err(TesseraError::invalid_config(
                "max_term_freq * max_gap overflows the position space",
            ));
        }

        check_probability("payload_probability", self.payload_probability)
    }
}

/// Knobs of the verifier threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Rounds each thread runs.
    pub iterations: usize,

    /// Number of concurrent verifier threads.
    pub threads: usize,

    /// Seeks to guaranteed-absent terms per round.
    pub absent_seeks: usize,

    /// Chance that a term's documents are walked in the mixed scan.
    pub scan_probability: f64,

    /// Chance that a stop of the mixed scan uses `advance`.
    pub skip_probability: f64,

    /// Chance that an `advance` targets the expected doc exactly rather than
    /// one past it.
    pub exact_target_probability: f64,

    /// Chance that positions of a document are checked in the mixed scan.
    pub position_probability: f64,

    /// Chance that payload bytes are fetched and compared.
    pub payload_fetch_probability: f64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            iterations: 20,
            threads: 3,
            absent_seeks: 100,
            scan_probability: 1.0 / 3.0,
            skip_probability: 1.0 / 3.0,
            exact_target_probability: 0.5,
            position_probability: 0.5,
            payload_fetch_probability: 2.0 / 3.0,
        }
    }
}

impl VerifyConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(TesseraError::invalid_config(
                "iterations must be greater than zero",
            ));
        }
        if self.threads == 0 {
            return Err(TesseraError::invalid_config(
                "threads must be greater than zero",
            ));
        }

        check_probability("scan_probability", self.scan_probability)?;
        check_probability("skip_probability", self.skip_probability)?;
        check_probability("exact_target_probability", self.exact_target_probability)?;
        check_probability("position_probability", self.position_probability)?;
        check_probability("payload_fetch_probability", self.payload_fetch_probability)
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TesseraError::invalid_config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// A complete conformance run.
///
/// # Example
///
/// ```
/// use tessera::codec::CodecConfig;
/// use tessera::conformance::ConformanceConfig;
///
/// let config = ConformanceConfig {
///     seed: Some(7),
///     codec: CodecConfig::from_name("simple").unwrap(),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
///
/// let json = config.to_json().unwrap();
/// assert!(json.contains("\"type\": \"Simple\""));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformanceConfig {
    /// Seed of the whole run; drawn at random when absent.
    pub seed: Option<u64>,

    /// Codec under test.
    pub codec: CodecConfig,

    /// Replace the codec's tuning knobs with random values drawn from the seed.
    pub randomize_codec: bool,

    pub model: ModelConfig,
    pub verify: VerifyConfig,
}

impl Default for ConformanceConfig {
    fn default() -> Self {
        ConformanceConfig {
            seed: None,
            codec: CodecConfig::default(),
            randomize_codec: true,
            model: ModelConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl ConformanceConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ConformanceConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty-printed JSON rendering.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.codec.validate()?;
        self.model.validate()?;
        self.verify.validate()
    }
}
