//! Skip data for long postings lists.
//!
//! After every `skip_interval` documents of a term the writer records where
//! the next document starts in each stream. Entries are written after the
//! term's documents as deltas against the previous entry (the first against
//! the term's own file pointers). An entry is only kept when more documents
//! follow it.

use crate::codec::block::TermMeta;
use crate::codec::postings_enum::DocId;
use crate::error::Result;
use crate::storage::StorageOutput;
use crate::storage::structured::{SliceReader, StructWriter};

/// Stream positions after `(index + 1) * skip_interval` documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipEntry {
    /// Last document before the entry.
    pub doc: DocId,
    pub doc_fp: u64,
    pub pos_fp: u64,
    pub pay_fp: u64,
}

/// Write `entries` for the term described by `meta`.
pub fn write_skip_entries<W: StorageOutput>(
    out: &mut StructWriter<W>,
    entries: &[SkipEntry],
    meta: &TermMeta,
    has_positions: bool,
    has_payloads: bool,
) -> Result<()> {
    out.write_varint(entries.len() as u64)?;

    let mut last = SkipEntry {
        doc: 0,
        doc_fp: meta.doc_fp,
        pos_fp: meta.pos_fp,
        pay_fp: meta.pay_fp,
    };
    for entry in entries {
        out.write_varint((entry.doc - last.doc) as u64)?;
        out.write_varint(entry.doc_fp - last.doc_fp)?;
        if has_positions {
            out.write_varint(entry.pos_fp - last.pos_fp)?;
        }
        if has_payloads {
            out.write_varint(entry.pay_fp - last.pay_fp)?;
        }
        last = *entry;
    }
    Ok(())
}

/// Decoded skip entries of one term.
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    entries: Vec<SkipEntry>,
    interval: u32,
    loaded: bool,
}

impl SkipList {
    pub fn new(interval: u32) -> Self {
        SkipList {
            entries: Vec::new(),
            interval,
            loaded: false,
        }
    }

    /// Forget the current term's entries, keeping the allocation.
    pub fn reset(&mut self, interval: u32) {
        self.entries.clear();
        self.interval = interval;
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Decode the entries of the term described by `meta`.
    ///
    /// `input` must be positioned at the start of the skip data.
    pub fn load(
        &mut self,
        input: &mut SliceReader,
        meta: &TermMeta,
        has_positions: bool,
        has_payloads: bool,
    ) -> Result<()> {
        self.entries.clear();
        let count = input.read_varint()? as usize;

        let mut entry = SkipEntry {
            doc: 0,
            doc_fp: meta.doc_fp,
            pos_fp: meta.pos_fp,
            pay_fp: meta.pay_fp,
        };
        for _ in 0..count {
            entry.doc += input.read_varint_u32()?;
            entry.doc_fp += input.read_varint()?;
            if has_positions {
                entry.pos_fp += input.read_varint()?;
            }
            if has_payloads {
                entry.pay_fp += input.read_varint()?;
            }
            self.entries.push(entry);
        }
        self.loaded = true;
        Ok(())
    }

    /// The furthest entry that stays below `target` and lies past the
    /// `docs_read` documents already consumed.
    ///
    /// Returns the entry with the number of documents it accounts for.
    pub fn skip_target(&self, target: DocId, docs_read: u32) -> Option<(u32, SkipEntry)> {
        let below = self.entries.partition_point(|entry| entry.doc < target);
        if below == 0 {
            return None;
        }

        let docs_skipped = below as u32 * self.interval;
        if docs_skipped > docs_read {
            Some((docs_skipped, self.entries[below - 1]))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::structured::read_checked;

    fn entries() -> Vec<SkipEntry> {
        vec![
            SkipEntry {
                doc: 30,
                doc_fp: 110,
                pos_fp: 60,
                pay_fp: 8,
            },
            SkipEntry {
                doc: 70,
                doc_fp: 125,
                pos_fp: 90,
                pay_fp: 8,
            },
        ]
    }

    fn meta() -> TermMeta {
        TermMeta {
            doc_freq: 25,
            total_term_freq: 40,
            doc_fp: 100,
            pos_fp: 50,
            pay_fp: 3,
            skip_offset: Some(40),
        }
    }

    #[test]
    fn test_write_then_load() {
        let storage = MemoryStorage::default();
        let mut out = StructWriter::new(storage.create_output("skip.bin").unwrap());
        write_skip_entries(&mut out, &entries(), &meta(), true, true).unwrap();
        out.close().unwrap();

        let mut input = read_checked(&storage, "skip.bin").unwrap();
        let mut skip = SkipList::new(10);
        assert!(!skip.is_loaded());
        skip.load(&mut input, &meta(), true, true).unwrap();
        assert!(skip.is_loaded());
        assert_eq!(skip.entries.len(), 2);
        assert_eq!(skip.entries, entries());
    }

    #[test]
    fn test_skip_target() {
        let mut skip = SkipList::new(10);
        skip.entries = entries();
        skip.loaded = true;

        // Nothing below the first entry.
        assert_eq!(skip.skip_target(30, 0), None);
        assert_eq!(skip.skip_target(31, 0), Some((10, entries()[0])));
        assert_eq!(skip.skip_target(500, 0), Some((20, entries()[1])));
        // Already past the candidate entry.
        assert_eq!(skip.skip_target(500, 20), None);
        assert_eq!(skip.skip_target(71, 15), Some((20, entries()[1])));

        skip.reset(4);
        assert!(skip.entries.is_empty());
        assert!(!skip.is_loaded());
    }
}
