//! Brute-force recovery (C6).
//!
//! Scans the whole file for object headers, xref markers, and trailer
//! dictionaries so a broken declared structure can be rebuilt from scratch.
//! Grounded in scostello-pdf_oxide's `xref_reconstruction.rs`, which uses
//! `regex::bytes` for the same "N G obj"/"trailer <<" scans; kept here as a
//! `std::sync::LazyLock`-backed regex rather than `lazy_static!`, since the
//! rest of this crate targets a recent enough Rust for the std equivalent.

use crate::lexer::Lexer;
use crate::object::{Dictionary, ObjectId};
use crate::source::Cursor;
use crate::xref::{Xref, XrefEntry, XrefType};
use std::collections::HashMap;
use std::sync::LazyLock;

static RE_OBJ: LazyLock<regex::bytes::Regex> =
    LazyLock::new(|| regex::bytes::Regex::new(r"(\d{1,10})[ \t\r\n]+(\d{1,5})[ \t\r\n]+obj\b").unwrap());
static RE_XREF_KEYWORD: LazyLock<regex::bytes::Regex> =
    LazyLock::new(|| regex::bytes::Regex::new(r"(?:^|[ \t\r\n])xref[ \t\r\n]").unwrap());
static RE_XREF_STREAM: LazyLock<regex::bytes::Regex> = LazyLock::new(|| regex::bytes::Regex::new(r"/XRef\b").unwrap());
static RE_OBJSTM: LazyLock<regex::bytes::Regex> = LazyLock::new(|| regex::bytes::Regex::new(r"/ObjStm\b").unwrap());
static RE_TRAILER: LazyLock<regex::bytes::Regex> = LazyLock::new(|| regex::bytes::Regex::new(r"trailer\b").unwrap());
static RE_EOF: LazyLock<regex::bytes::Regex> = LazyLock::new(|| regex::bytes::Regex::new(r"%%EOF").unwrap());

/// An object header found by scanning, with enough context to finish
/// bounding it once a subsequent `endobj` is seen.
#[derive(Debug, Clone, Copy)]
pub struct ObjectCandidate {
    pub id: ObjectId,
    pub offset: usize,
}

#[derive(Debug, Default)]
pub struct RecoveryScan {
    pub object_candidates: Vec<ObjectCandidate>,
    pub xref_table_offsets: Vec<usize>,
    pub xref_stream_offsets: Vec<usize>,
    pub objstm_offsets: Vec<usize>,
    pub trailer_offsets: Vec<usize>,
    pub last_eof: Option<usize>,
}

pub fn scan(buf: &[u8]) -> RecoveryScan {
    let mut result = RecoveryScan::default();

    for caps in RE_OBJ.captures_iter(buf) {
        let full = caps.get(0).unwrap();
        let num_group = caps.get(1).unwrap();
        let gen_group = caps.get(2).unwrap();
        let (Ok(num), Ok(gen)) = (
            std::str::from_utf8(num_group.as_bytes()).unwrap_or("").parse::<u64>(),
            std::str::from_utf8(gen_group.as_bytes()).unwrap_or("").parse::<u16>(),
        ) else {
            continue;
        };
        result.object_candidates.push(ObjectCandidate { id: (num, gen), offset: full.start() });
    }

    for m in RE_XREF_KEYWORD.find_iter(buf) {
        let start = if buf[m.start()] == b'x' { m.start() } else { m.start() + 1 };
        result.xref_table_offsets.push(start);
    }

    for m in RE_XREF_STREAM.find_iter(buf) {
        if let Some(start) = enclosing_object_start(buf, m.start(), &result.object_candidates) {
            result.xref_stream_offsets.push(start);
        }
    }

    for m in RE_OBJSTM.find_iter(buf) {
        if let Some(start) = enclosing_object_start(buf, m.start(), &result.object_candidates) {
            result.objstm_offsets.push(start);
        }
    }

    for m in RE_TRAILER.find_iter(buf) {
        result.trailer_offsets.push(m.end());
    }

    result.last_eof = RE_EOF.find_iter(buf).map(|m| m.start()).max();

    result
}

fn enclosing_object_start(buf: &[u8], marker_pos: usize, candidates: &[ObjectCandidate]) -> Option<usize> {
    candidates.iter().filter(|c| c.offset <= marker_pos).map(|c| c.offset).max().or_else(|| {
        let window_start = marker_pos.saturating_sub(256);
        buf[window_start..marker_pos].windows(4).rposition(|w| w == b" obj").map(|p| window_start + p)
    })
}

/// Builds an `Xref` from the object-scan results (later entries in file
/// order lose to earlier ones only via the normal first-seen merge rule the
/// caller applies; here each object number keeps its *last* observed
/// offset, since later definitions in a linear scan are the ones a working
/// parser without xref metadata would actually want).
pub fn build_xref_from_candidates(candidates: &[ObjectCandidate]) -> Xref {
    let mut by_number: HashMap<u64, (u16, usize)> = HashMap::new();
    for c in candidates {
        by_number.insert(c.id.0, (c.id.1, c.offset));
    }
    let size = by_number.keys().max().map(|&n| n + 1).unwrap_or(0);
    let mut xref = Xref::new(size, XrefType::Table);
    for (num, (gen, offset)) in by_number {
        xref.insert(num, XrefEntry::Normal { offset: offset as u64, generation: gen });
    }
    xref
}

/// Parses the dictionary following a `trailer` keyword occurrence and
/// checks it against the §4.6 acceptance heuristic (Root → Catalog-shaped
/// dict, Info looks info-like).
pub fn parse_candidate_trailer(buf: &[u8], after_keyword: usize) -> Option<Dictionary> {
    let mut lexer = Lexer::new(Cursor::at(buf, after_keyword), true);
    match lexer.parse_value().ok()? {
        Some(crate::object::Object::Dictionary(dict)) => Some(dict),
        _ => None,
    }
}

const INFO_KEYS: [&[u8]; 8] =
    [b"Title", b"Author", b"Subject", b"Keywords", b"Creator", b"Producer", b"CreationDate", b"ModDate"];

pub fn looks_like_info_dict(dict: &Dictionary) -> bool {
    if dict.has(b"Parent") || dict.has(b"A") || dict.has(b"Dest") {
        return false;
    }
    INFO_KEYS.iter().any(|k| dict.has(k))
}

/// Picks the brute-force candidate offset nearest a declared (but invalid)
/// one, removing it from `pool` so each candidate is used at most once.
pub fn nearest_candidate(pool: &mut Vec<ObjectCandidate>, declared_offset: usize) -> Option<ObjectCandidate> {
    let idx = pool
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.offset.abs_diff(declared_offset))
        .map(|(i, _)| i)?;
    Some(pool.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_headers() {
        let data = b"garbage\n1 0 obj\n<< >>\nendobj\n2 0 obj\n<< >>\nendobj\n";
        let scan_result = scan(data);
        let ids: Vec<ObjectId> = scan_result.object_candidates.iter().map(|c| c.id).collect();
        assert!(ids.contains(&(1, 0)));
        assert!(ids.contains(&(2, 0)));
    }

    #[test]
    fn finds_trailer_and_eof() {
        let data = b"trailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF";
        let scan_result = scan(data);
        assert_eq!(scan_result.trailer_offsets.len(), 1);
        assert!(scan_result.last_eof.is_some());
    }

    #[test]
    fn info_dict_heuristic_accepts_title_rejects_parent() {
        let mut info = Dictionary::new();
        info.set("Title", "hello");
        assert!(looks_like_info_dict(&info));

        let mut not_info = Dictionary::new();
        not_info.set("Parent", (1u64, 0u16));
        not_info.set("Title", "x");
        assert!(!looks_like_info_dict(&not_info));
    }

    #[test]
    fn nearest_candidate_picks_closest_and_removes_it() {
        let mut pool = vec![
            ObjectCandidate { id: (1, 0), offset: 100 },
            ObjectCandidate { id: (2, 0), offset: 500 },
        ];
        let found = nearest_candidate(&mut pool, 480).unwrap();
        assert_eq!(found.id, (2, 0));
        assert_eq!(pool.len(), 1);
    }
}
