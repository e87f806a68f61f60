//! Cross-reference & trailer engine (C4): locates `startxref`, walks the
//! xref chain (tables and xref-streams, including hybrid `/XRefStm`), and
//! merges sections into one `Xref` plus a materialized trailer.
//!
//! Grounded in the teacher's now-deleted `parser_aux.rs` (`decode_xref_stream`
//! lived there) and `reader.rs`'s `get_xref_start`/`search_substring`
//! byte-scanning style, generalized to the lenient recovery semantics in
//! §4.4 and rebuilt on the new `Lexer`/`Cursor` pair instead of nom.

use crate::config::ParserConfig;
use crate::error::{Error, Result, Warning};
use crate::lexer::{read_object_header, Lexer};
use crate::object::{Dictionary, Object};
use crate::recovery::{self, RecoveryScan};
use crate::source::Cursor;
use crate::xref::{Xref, XrefEntry, XrefType};
use std::collections::HashSet;

pub struct XrefSection {
    pub xref: Xref,
    pub trailer: Dictionary,
}

/// Reads the PDF/FDF header line, skipping leading garbage up to a handful
/// of lines as §6 allows, and returns the version string (e.g. `"1.4"`).
pub fn read_header(buf: &[u8], lenient: bool) -> Result<String> {
    const MAX_LEADING_LINES: usize = 8;
    let mut pos = 0;
    for _ in 0..MAX_LEADING_LINES {
        if pos >= buf.len() {
            break;
        }
        if let Some(rel) = buf[pos..].windows(5).position(|w| w == b"%PDF-" || w == b"%FDF-") {
            let start = pos + rel + 5;
            let end = buf[start..].iter().position(|&b| b == b'\n' || b == b'\r').map(|i| start + i).unwrap_or(buf.len());
            let version = String::from_utf8_lossy(&buf[start..end]).trim().to_string();
            return Ok(version);
        }
        let next_nl = buf[pos..].iter().position(|&b| b == b'\n').map(|i| pos + i + 1);
        match next_nl {
            Some(n) => pos = n,
            None => break,
        }
    }
    if lenient {
        Ok("1.4".to_string())
    } else {
        Err(Error::Header)
    }
}

/// Finds the last `%%EOF` within the configured lookup window, then the
/// last `startxref` before it, and returns the integer offset that follows.
pub fn locate_startxref(buf: &[u8], config: &ParserConfig, warnings: &mut Vec<Warning>) -> Result<usize> {
    let window_start = buf.len().saturating_sub(config.eof_lookup_range() as usize);
    let window = &buf[window_start..];

    let eof_pos = rfind(window, b"%%EOF");
    let search_bound = match eof_pos {
        Some(p) => window_start + p,
        None => {
            if config.lenient() {
                warnings.push(Warning::new(buf.len(), "missing %%EOF marker"));
                buf.len()
            } else {
                return Err(Error::Header);
            }
        }
    };

    let before_eof = &buf[window_start..search_bound.min(buf.len())];
    let startxref_pos = rfind(before_eof, b"startxref").map(|p| window_start + p).ok_or(Error::NoValidXref)?;

    let mut lexer = Lexer::new(Cursor::at(buf, startxref_pos + b"startxref".len()), config.lenient());
    lexer.skip_ws_and_comments();
    let start = lexer.cursor.position();
    while matches!(lexer.cursor.peek_byte(), b if b >= 0 && (b as u8).is_ascii_digit()) {
        lexer.cursor.advance(1);
    }
    let text = lexer.cursor.create_view(start, lexer.cursor.position() - start);
    std::str::from_utf8(text).ok().and_then(|s| s.parse::<usize>().ok()).ok_or(Error::NoValidXref)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Confirms an offset plausibly begins an xref section, per
/// `check_xref_offset` (§4.4): either the `xref` keyword or an indirect
/// object whose dictionary has `/Type /XRef`.
pub fn check_xref_offset(buf: &[u8], offset: usize) -> bool {
    if offset >= buf.len() {
        return false;
    }
    if buf[offset..].starts_with(b"xref") {
        return true;
    }
    let mut lexer = Lexer::new(Cursor::at(buf, offset), true);
    let Some(_id) = read_object_header(&mut lexer) else { return false };
    lexer.skip_ws_and_comments();
    match lexer.parse_value() {
        Ok(Some(Object::Dictionary(dict))) => dict.has_type(b"XRef"),
        _ => false,
    }
}

/// Walks the xref chain starting at `startxref`, following `/Prev` and
/// merging `/XRefStm` hybrid sections, with loop detection via a
/// visited-offsets set (§4.4 "Merging").
pub fn walk_xref_chain(buf: &[u8], start: usize, config: &ParserConfig, warnings: &mut Vec<Warning>) -> Result<(Xref, Dictionary)> {
    let mut visited = HashSet::new();
    let mut merged = Xref::new(0, XrefType::Table);
    let mut newest_trailer: Option<Dictionary> = None;
    let mut next_offset = Some(start);

    // Built once so a single nearest-offset candidate is never handed out
    // twice across the `/Prev` hops of one chain walk (§4.6: "each candidate
    // used at most once — remove it from the pool").
    let mut repair_pool: Vec<recovery::ObjectCandidate> = if config.lenient() {
        let scan = recovery::scan(buf);
        scan.xref_table_offsets
            .iter()
            .chain(scan.xref_stream_offsets.iter())
            .map(|&offset| recovery::ObjectCandidate { id: (0, 0), offset })
            .collect()
    } else {
        Vec::new()
    };

    while let Some(offset) = next_offset {
        if !visited.insert(offset) {
            return Err(Error::XRefLoop(offset as u64));
        }
        if offset >= buf.len() {
            break;
        }

        let effective_offset = if check_xref_offset(buf, offset) {
            offset
        } else if config.lenient() {
            warnings.push(Warning::new(offset, "declared xref offset failed validation"));
            match recovery::nearest_candidate(&mut repair_pool, offset) {
                Some(candidate) => candidate.offset,
                None => break,
            }
        } else {
            return Err(Error::NoValidXref);
        };

        let section = parse_xref_section(buf, effective_offset, config, warnings)?;

        if let Some(xrefstm) = section.trailer.get(b"XRefStm").ok().and_then(Object::as_i64) {
            if xrefstm >= 0 && (xrefstm as usize) < buf.len() {
                if let Ok(hybrid) = parse_xref_section(buf, xrefstm as usize, config, warnings) {
                    merged.extend(&hybrid.xref);
                }
            }
        }

        merged.extend(&section.xref);
        if newest_trailer.is_none() {
            newest_trailer = Some(section.trailer.clone());
        }

        next_offset = section.trailer.get(b"Prev").ok().and_then(Object::as_i64).and_then(|v| if v > 0 { Some(v as usize) } else { None });
    }

    let trailer = newest_trailer.unwrap_or_default();
    Ok((merged, trailer))
}

fn parse_xref_section(buf: &[u8], offset: usize, config: &ParserConfig, warnings: &mut Vec<Warning>) -> Result<XrefSection> {
    let mut lexer = Lexer::new(Cursor::at(buf, offset), config.lenient());
    lexer.skip_ws_and_comments();
    if lexer.cursor.starts_with(b"xref") {
        parse_classical_xref(&mut lexer)
    } else {
        parse_xref_stream(&mut lexer, warnings)
    }
}

fn parse_classical_xref(lexer: &mut Lexer) -> Result<XrefSection> {
    lexer.cursor.advance(4); // "xref"
    let mut xref = Xref::new(0, XrefType::Table);

    loop {
        lexer.skip_ws_and_comments();
        if lexer.cursor.starts_with(b"trailer") {
            lexer.cursor.advance(b"trailer".len());
            break;
        }
        let start_num = match crate::lexer::read_object_number(lexer) {
            Some(n) => n,
            None => break,
        };
        lexer.skip_ws_and_comments();
        let count = crate::lexer::read_generation_number(lexer).map(|v| v as u64).unwrap_or(0);
        for i in 0..count {
            lexer.skip_ws_and_comments();
            let offset_start = lexer.cursor.position();
            let offset_bytes = lexer.cursor.read(10);
            let offset: u64 = std::str::from_utf8(offset_bytes).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
            lexer.skip_ws_and_comments();
            let gen_bytes = lexer.cursor.read(5);
            let generation: u16 = std::str::from_utf8(gen_bytes).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
            lexer.skip_ws_and_comments();
            let status = lexer.cursor.read_byte();
            let _ = offset_start;
            let object_number = start_num + i;
            if status == b'n' as i32 {
                if offset > 0 {
                    xref.insert(object_number, XrefEntry::Normal { offset, generation });
                }
            } else if status == b'f' as i32 {
                xref.insert(object_number, XrefEntry::Free { next_free_number: offset, next_generation: generation });
            }
        }
    }

    lexer.skip_ws_and_comments();
    let trailer = match lexer.parse_value()? {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };
    if let Ok(size) = trailer.get(b"Size").and_then(Object::as_i64) {
        xref.size = size.max(0) as u64;
    }
    Ok(XrefSection { xref, trailer })
}

/// Decodes an xref stream object (§4.4.2): reads `/W`, `/Index`, `/Size`,
/// decompresses the payload via the standard filter chain, and unpacks each
/// fixed-width row.
fn parse_xref_stream(lexer: &mut Lexer, warnings: &mut Vec<Warning>) -> Result<XrefSection> {
    let Some(id) = read_object_header(lexer) else { return Err(Error::NoValidXref) };
    lexer.skip_ws_and_comments();
    let Some(Object::Dictionary(dict)) = lexer.parse_value()? else { return Err(Error::StreamWithoutDict) };
    lexer.skip_ws_and_comments();
    if !lexer.cursor.eat(b"stream") {
        return Err(Error::NoValidXref);
    }
    crate::stream_scan::consume_stream_eol(&mut lexer.cursor, lexer.lenient, warnings);

    let declared_length = dict.get(b"Length").ok().and_then(Object::as_i64);
    let scan = crate::stream_scan::scan(&mut lexer.cursor, declared_length, lexer.lenient, warnings)?;
    let _ = id;

    let stream = crate::object::Stream::new(dict, scan.payload);
    let decoded = stream.decoded_content()?;

    let widths: Vec<usize> = stream
        .dict
        .get(b"W")
        .and_then(Object::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_i64().ok()).map(|v| v as usize).collect())
        .unwrap_or_else(|_| vec![1, 4, 2]);
    let (w0, w1, w2) = (widths.first().copied().unwrap_or(1), widths.get(1).copied().unwrap_or(4), widths.get(2).copied().unwrap_or(2));
    let row_len = w0 + w1 + w2;

    let size = stream.dict.get(b"Size").and_then(Object::as_i64).unwrap_or(0).max(0) as u64;
    let index: Vec<u64> = stream
        .dict
        .get(b"Index")
        .and_then(Object::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_i64().ok()).map(|v| v as u64).collect())
        .unwrap_or_else(|_| vec![0, size]);

    let mut xref = Xref::new(size, XrefType::CrossReferenceStream);
    let mut row_pos = 0;
    let mut pair_iter = index.chunks(2);
    while let Some(pair) = pair_iter.next() {
        if pair.len() < 2 {
            break;
        }
        let (start, count) = (pair[0], pair[1]);
        for i in 0..count {
            if row_pos + row_len > decoded.len() {
                break;
            }
            let row = &decoded[row_pos..row_pos + row_len];
            row_pos += row_len;
            let obj_type = if w0 == 0 { 1 } else { be_value(&row[..w0]) };
            let field1 = be_value(&row[w0..w0 + w1]);
            let field2 = be_value(&row[w0 + w1..w0 + w1 + w2]);
            let object_number = start + i;
            match obj_type {
                0 => xref.insert(object_number, XrefEntry::Free { next_free_number: field1, next_generation: field2 as u16 }),
                1 => xref.insert(object_number, XrefEntry::Normal { offset: field1, generation: field2 as u16 }),
                2 => xref.insert(object_number, XrefEntry::Compressed { container: field1, index: field2 as u32 }),
                _ => {}
            }
        }
    }

    Ok(XrefSection { xref, trailer: stream.dict })
}

fn be_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Rebuilds the xref index and trailer entirely from a brute-force scan
/// (§4.6), used when `startxref`/the declared chain cannot produce a usable
/// trailer with `/Root`.
pub fn recover(buf: &[u8], warnings: &mut Vec<Warning>) -> Result<(Xref, Dictionary)> {
    let scan: RecoveryScan = recovery::scan(buf);
    warnings.push(Warning::new(0, "running brute-force recovery"));

    let mut xref = recovery::build_xref_from_candidates(&scan.object_candidates);

    for &objstm_offset in &scan.objstm_offsets {
        let mut lexer = Lexer::new(Cursor::at(buf, objstm_offset), true);
        if let Some(id) = read_object_header(&mut lexer) {
            xref.insert(id.0, XrefEntry::Normal { offset: objstm_offset as u64, generation: id.1 });
        }
    }

    let mut trailer = None;
    for &after in &scan.trailer_offsets {
        if let Some(dict) = recovery::parse_candidate_trailer(buf, after) {
            if dict.has(b"Root") {
                trailer = Some(dict);
                break;
            }
        }
    }

    let trailer = match trailer {
        Some(t) => t,
        None => {
            let mut synthesized = Dictionary::new();
            for candidate in &scan.object_candidates {
                let mut lexer = Lexer::new(Cursor::at(buf, candidate.offset), true);
                if read_object_header(&mut lexer).is_none() {
                    continue;
                }
                lexer.skip_ws_and_comments();
                if let Ok(Some(Object::Dictionary(dict))) = lexer.parse_value() {
                    if dict.has_type(b"Catalog") {
                        synthesized.set("Root", candidate.id);
                        break;
                    }
                }
            }
            if !synthesized.has(b"Root") {
                return Err(Error::MissingTrailerRoot);
            }
            synthesized
        }
    };

    Ok((xref, trailer))
}
