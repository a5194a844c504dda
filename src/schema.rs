//! Field registry shared by writers and readers.
//!
//! A [`FieldInfos`] maps field names to their [`FieldInfo`]. It must be built
//! identically before a segment is written and before it is opened; codecs
//! reject a segment whose persisted fields disagree with the registry.

use std::collections::BTreeMap;

use crate::error::{Result, TesseraError};

pub mod field;

pub use field::{FieldInfo, IndexOptions};

/// The set of fields known to a segment, iterated in ascending name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldInfos {
    fields: BTreeMap<String, FieldInfo>,
}

impl FieldInfos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field, assigning it the next field number.
    ///
    /// Registering an existing name with identical options returns the
    /// existing entry. Conflicting options are a schema error.
    pub fn add<S: Into<String>>(
        &mut self,
        name: S,
        index_options: IndexOptions,
        store_payloads: bool,
    ) -> Result<&FieldInfo> {
        let name = name.into();
        if name.is_empty() {
            return Err(TesseraError::schema("Field name cannot be empty"));
        }

        let number = self.fields.len() as u32;
        let info = FieldInfo::new(name, number, index_options).with_payloads(store_payloads);
        self.add_or_update(info)
    }

    /// Insert `info` as-is, or return the existing entry when it matches.
    pub fn add_or_update(&mut self, info: FieldInfo) -> Result<&FieldInfo> {
        if let Some(existing) = self.fields.get(&info.name) {
            if existing.index_options != info.index_options
                || existing.store_payloads != info.store_payloads
            {
                return Err(TesseraError::schema(format!(
                    "Field '{}' already registered with different options",
                    info.name
                )));
            }
        } else if self.fields.values().any(|f| f.number == info.number) {
            return Err(TesseraError::schema(format!(
                "Field number {} is already in use",
                info.number
            )));
        }

        let name = info.name.clone();
        Ok(self.fields.entry(name).or_insert(info))
    }

    /// Look up a field by name.
    pub fn field_info(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.get(name)
    }

    /// Check a persisted field description against the registry.
    pub fn check_persisted(&self, persisted: &FieldInfo) -> Result<&FieldInfo> {
        let info = self.field_info(&persisted.name).ok_or_else(|| {
            TesseraError::schema(format!("Unknown field '{}' in segment", persisted.name))
        })?;

        if info != persisted {
            return Err(TesseraError::schema(format!(
                "Field '{}' in segment does not match registry: persisted {:?}, registered {:?}",
                persisted.name, persisted, info
            )));
        }
        Ok(info)
    }

    /// Iterate over fields in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
