//! Read side entry point of a segment.

use crate::codec::block::terms_reader::BlockFieldsReader;
use crate::codec::consumer::FieldStats;
use crate::codec::simple::reader::SimpleFieldsReader;
use crate::codec::terms_enum::TermsEnum;
use crate::error::Result;
use crate::schema::FieldInfo;

/// An opened segment, one variant per codec.
///
/// A producer is immutable once opened. It is `Send + Sync`, and every
/// [`TermsEnum`] it hands out owns its own cursor state, so any number of
/// threads can enumerate the same producer at once.
#[derive(Debug)]
pub enum FieldsProducer {
    Simple(SimpleFieldsReader),
    Block(BlockFieldsReader),
}

impl FieldsProducer {
    /// Names of the fields in the segment, ascending.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            FieldsProducer::Simple(reader) => reader.field_names(),
            FieldsProducer::Block(reader) => reader.field_names(),
        }
    }

    /// A fresh terms enumerator for `field`, or `None` if the field is absent.
    pub fn terms(&self, field: &str) -> Result<Option<TermsEnum>> {
        match self {
            FieldsProducer::Simple(reader) => Ok(reader.terms(field).map(TermsEnum::Simple)),
            FieldsProducer::Block(reader) => Ok(reader.terms(field)?.map(TermsEnum::Block)),
        }
    }

    /// Statistics recorded when `field` was finished.
    pub fn field_stats(&self, field: &str) -> Option<FieldStats> {
        match self {
            FieldsProducer::Simple(reader) => reader.field_stats(field),
            FieldsProducer::Block(reader) => reader.field_stats(field),
        }
    }

    /// Metadata of `field` as persisted in the segment.
    pub fn field_info(&self, field: &str) -> Option<&FieldInfo> {
        match self {
            FieldsProducer::Simple(reader) => reader.field_info(field),
            FieldsProducer::Block(reader) => reader.field_info(field),
        }
    }

    /// Number of distinct terms in `field`.
    pub fn num_terms(&self, field: &str) -> Option<u64> {
        match self {
            FieldsProducer::Simple(reader) => reader.num_terms(field),
            FieldsProducer::Block(reader) => reader.num_terms(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_producer_is_send_sync() {
        assert_send_sync::<FieldsProducer>();
        assert_send_sync::<TermsEnum>();
    }
}
