//! Per-field indexing metadata.

use serde::{Deserialize, Serialize};

/// What a field's postings carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    /// Only document ids are indexed. Frequencies are reported as 0.
    DocsOnly,
    /// Document ids, term frequencies and positions are indexed.
    DocsAndFreqsAndPositions,
}

impl IndexOptions {
    /// Check if term frequencies are stored.
    pub fn has_freqs(&self) -> bool {
        matches!(self, IndexOptions::DocsAndFreqsAndPositions)
    }

    /// Check if positions are stored.
    pub fn has_positions(&self) -> bool {
        matches!(self, IndexOptions::DocsAndFreqsAndPositions)
    }

    pub(crate) fn to_code(self) -> u8 {
        match self {
            IndexOptions::DocsOnly => 0,
            IndexOptions::DocsAndFreqsAndPositions => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(IndexOptions::DocsOnly),
            1 => Some(IndexOptions::DocsAndFreqsAndPositions),
            _ => None,
        }
    }
}

/// Metadata for one indexed field.
///
/// `number` is the stable identity of the field inside a segment; codecs
/// persist it alongside the name and check it when a segment is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
    pub store_payloads: bool,
}

impl FieldInfo {
    /// Create a new field definition.
    pub fn new<S: Into<String>>(name: S, number: u32, index_options: IndexOptions) -> Self {
        FieldInfo {
            name: name.into(),
            number,
            index_options,
            store_payloads: false,
        }
    }

    /// Set whether payloads are stored with positions.
    pub fn with_payloads(mut self, store_payloads: bool) -> Self {
        self.store_payloads = store_payloads;
        self
    }

    /// Check if term frequencies are stored.
    pub fn has_freqs(&self) -> bool {
        self.index_options.has_freqs()
    }

    /// Check if positions are stored.
    pub fn has_positions(&self) -> bool {
        self.index_options.has_positions()
    }

    /// Payloads require positions; a docs-only field never has them.
    pub fn has_payloads(&self) -> bool {
        self.store_payloads && self.has_positions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_options() {
        assert!(!IndexOptions::DocsOnly.has_freqs());
        assert!(!IndexOptions::DocsOnly.has_positions());
        assert!(IndexOptions::DocsAndFreqsAndPositions.has_positions());

        for options in [IndexOptions::DocsOnly, IndexOptions::DocsAndFreqsAndPositions] {
            assert_eq!(IndexOptions::from_code(options.to_code()), Some(options));
        }
        assert_eq!(IndexOptions::from_code(9), None);
    }

    #[test]
    fn test_payloads_need_positions() {
        let docs_only = FieldInfo::new("id", 0, IndexOptions::DocsOnly).with_payloads(true);
        assert!(!docs_only.has_payloads());

        let body =
            FieldInfo::new("body", 1, IndexOptions::DocsAndFreqsAndPositions).with_payloads(true);
        assert!(body.has_payloads());
        assert!(body.has_freqs());
    }

    #[test]
    fn test_field_info_serialization() {
        let field = FieldInfo::new("title", 3, IndexOptions::DocsAndFreqsAndPositions);
        let json = serde_json::to_string(&field).unwrap();
        let parsed: FieldInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, field);
    }
}
