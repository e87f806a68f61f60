//! Cross-reference index (C4 data model).

use std::collections::BTreeMap;

/// Which on-disk form produced this section, kept so diagnostics and the
/// hybrid-xref merge rule (`/XRefStm` entries must come from a stream) can
/// tell sections apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XrefType {
    #[default]
    Table,
    CrossReferenceStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free { next_free_number: u64, next_generation: u16 },
    Normal { offset: u64, generation: u16 },
    Compressed { container: u64, index: u32 },
}

impl XrefEntry {
    pub fn is_normal(&self) -> bool {
        matches!(self, XrefEntry::Normal { .. })
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, XrefEntry::Compressed { .. })
    }
}

/// Mapping from object number to its xref entry. Generation numbers for
/// `Normal`/`Compressed` entries are carried inside the entry rather than
/// in the map key: exactly one in-use/compressed entry is kept per object
/// number, matching "at most one InUse/Compressed entry exists per key".
#[derive(Debug, Clone, Default)]
pub struct Xref {
    entries: BTreeMap<u64, XrefEntry>,
    pub size: u64,
    pub kind: XrefType,
}

impl Xref {
    pub fn new(size: u64, kind: XrefType) -> Xref {
        Xref { entries: BTreeMap::new(), size, kind }
    }

    pub fn get(&self, object_number: u64) -> Option<&XrefEntry> {
        self.entries.get(&object_number)
    }

    pub fn insert(&mut self, object_number: u64, entry: XrefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// First-seen-wins merge: used when folding an older `/Prev` section's
    /// entries into a newer one, and when merging a hybrid `/XRefStm`.
    pub fn extend(&mut self, other: &Xref) {
        for (&num, entry) in other.entries.iter() {
            self.entries.entry(num).or_insert(*entry);
        }
        if other.size > self.size {
            self.size = other.size;
        }
    }

    pub fn max_id(&self) -> u64 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &XrefEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_keeps_first_seen_entry() {
        let mut newer = Xref::new(2, XrefType::Table);
        newer.insert(1, XrefEntry::Normal { offset: 100, generation: 0 });

        let mut older = Xref::new(2, XrefType::Table);
        older.insert(1, XrefEntry::Normal { offset: 10, generation: 0 });
        older.insert(2, XrefEntry::Normal { offset: 20, generation: 0 });

        newer.extend(&older);
        assert_eq!(newer.get(1), Some(&XrefEntry::Normal { offset: 100, generation: 0 }));
        assert_eq!(newer.get(2), Some(&XrefEntry::Normal { offset: 20, generation: 0 }));
    }
}
