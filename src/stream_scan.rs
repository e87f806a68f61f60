//! Stream-payload scanner (C3).
//!
//! Bounds a stream's byte payload either by its declared `/Length` or, when
//! that fails to validate, by a forward scan for `endstream`/`endobj`. The
//! scan loop is grounded in the component design's Boyer-Moore shortcut
//! (peek 5 bytes ahead, skip the scan head there when it cannot possibly be
//! inside either keyword) rather than the teacher's approach of deferring
//! entirely to a declared length.

use crate::error::{Error, Result, Warning};
use crate::source::Cursor;

const ENDSTREAM: &[u8] = b"endstream";
const ENDOBJ: &[u8] = b"endobj";
const CHUNK: usize = 2048;

pub struct ScanResult {
    pub payload: Vec<u8>,
    pub observed_length: usize,
    pub used_endobj: bool,
    pub length_corrected: bool,
}

/// Consumes the single EOL required immediately after the `stream` keyword
/// (LF, CRLF, or, leniently, a lone CR).
pub fn consume_stream_eol(cursor: &mut Cursor, lenient: bool, warnings: &mut Vec<Warning>) {
    match cursor.peek_byte() {
        b if b == b'\r' as i32 => {
            cursor.advance(1);
            if cursor.peek_byte() == b'\n' as i32 {
                cursor.advance(1);
            } else if !lenient {
                warnings.push(Warning::new(cursor.position(), "stream keyword followed by lone CR"));
            }
        }
        b if b == b'\n' as i32 => cursor.advance(1),
        _ => {
            if lenient {
                warnings.push(Warning::new(cursor.position(), "stream keyword not followed by EOL"));
            }
        }
    }
}

pub fn scan(cursor: &mut Cursor, declared_length: Option<i64>, lenient: bool, warnings: &mut Vec<Warning>) -> Result<ScanResult> {
    let start = cursor.position();

    if let Some(len) = declared_length {
        if len >= 0 {
            let len = len as usize;
            let candidate_end = start + len;
            if candidate_end <= cursor.length() {
                let mut probe = cursor.clone();
                probe.seek(candidate_end)?;
                probe.skip_trailing_ws_for_probe();
                if probe.starts_with(ENDSTREAM) {
                    cursor.seek(candidate_end)?;
                    let payload = cursor.create_view(start, len).to_vec();
                    return Ok(ScanResult { payload, observed_length: len, used_endobj: false, length_corrected: false });
                }
            }
        }
    }

    scan_by_keyword(cursor, start, lenient, warnings)
}

fn scan_by_keyword(cursor: &mut Cursor, start: usize, lenient: bool, warnings: &mut Vec<Warning>) -> Result<ScanResult> {
    let mut keyword = ENDSTREAM;
    let mut used_endobj = false;
    let mut pos = start;
    let len = cursor.length();

    'outer: while pos < len {
        let chunk_end = (pos + CHUNK).min(len);
        while pos < chunk_end {
            if pos + 5 < len {
                let lookahead = cursor.peek_at_abs(pos + 5);
                if !(b'a'..=b't').contains(&(lookahead as u8)) && lookahead >= 0 {
                    pos += 1;
                    continue;
                }
            }
            if matches_at(cursor, pos, keyword) {
                break 'outer;
            }
            // diverging partial match at position 3 ('d') with an 'o' switches
            // the target keyword from endstream to endobj (§4.3).
            if keyword == ENDSTREAM && matches_at(cursor, pos, b"endo") && cursor.peek_at_abs(pos + 3) == b'o' as i32 {
                keyword = ENDOBJ;
                used_endobj = true;
                if matches_at(cursor, pos, keyword) {
                    break 'outer;
                }
            }
            pos += 1;
        }
    }

    if pos >= len {
        if !lenient {
            return Err(Error::StreamLengthInvalid);
        }
        let observed_length = len.saturating_sub(start);
        warnings.push(Warning::new(start, "stream payload ran to EOF without a terminator"));
        cursor.seek(len)?;
        let payload = cursor.create_view(start, observed_length).to_vec();
        return Ok(ScanResult { payload, observed_length, used_endobj: false, length_corrected: true });
    }

    let mut payload_end = pos;
    if payload_end > start && cursor.peek_at_abs(payload_end - 1) == b'\n' as i32 {
        payload_end -= 1;
        if payload_end > start && cursor.peek_at_abs(payload_end - 1) == b'\r' as i32 {
            payload_end -= 1;
        }
    } else if payload_end > start && cursor.peek_at_abs(payload_end - 1) == b'\r' as i32 {
        payload_end -= 1;
    }

    let observed_length = payload_end - start;
    let payload = cursor.create_view(start, observed_length).to_vec();
    cursor.seek(pos)?;
    Ok(ScanResult { payload, observed_length, used_endobj, length_corrected: true })
}

fn matches_at(cursor: &Cursor, pos: usize, needle: &[u8]) -> bool {
    for (i, &b) in needle.iter().enumerate() {
        if cursor.peek_at_abs(pos + i) != b as i32 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_length_matches_exactly() {
        let data = b"stream\nhello world\nendstream";
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(7).unwrap();
        let mut warnings = Vec::new();
        let result = scan(&mut cursor, Some(11), true, &mut warnings).unwrap();
        assert_eq!(result.payload, b"hello world");
        assert!(!result.length_corrected);
    }

    #[test]
    fn wrong_declared_length_falls_back_to_scan() {
        let data = b"stream\nhello world!!\nendstream";
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(7).unwrap();
        let mut warnings = Vec::new();
        let result = scan(&mut cursor, Some(5), true, &mut warnings).unwrap();
        assert_eq!(result.payload, b"hello world!!");
        assert!(result.length_corrected);
    }

    #[test]
    fn scan_falls_back_to_endobj_when_endstream_missing() {
        let data = b"stream\npayload\nendobj";
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(7).unwrap();
        let mut warnings = Vec::new();
        let result = scan(&mut cursor, None, true, &mut warnings).unwrap();
        assert_eq!(result.payload, b"payload");
        assert!(result.used_endobj);
    }

    #[test]
    fn strict_mode_errors_when_no_terminator_is_found() {
        let data = b"stream\npayload with no terminator at all";
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(7).unwrap();
        let mut warnings = Vec::new();
        let result = scan(&mut cursor, None, false, &mut warnings);
        assert!(matches!(result, Err(Error::StreamLengthInvalid)));
    }

    #[test]
    fn lenient_mode_still_recovers_when_no_terminator_is_found() {
        let data = b"stream\npayload with no terminator at all";
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(7).unwrap();
        let mut warnings = Vec::new();
        let result = scan(&mut cursor, None, true, &mut warnings).unwrap();
        assert_eq!(result.payload, b"payload with no terminator at all");
        assert!(result.length_corrected);
    }
}
