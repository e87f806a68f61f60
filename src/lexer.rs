//! Lenient value lexer (C2).
//!
//! Grounded in the teacher's nom-combinator grammar (now removed) and in
//! scostello-pdf_oxide's hand-written `lexer.rs` token set, but driven off
//! a [`Cursor`] instead of nom's `&[u8]` remainder-passing so the dictionary
//! and array parsers can rewind on partial matches the way the component
//! design requires (retroactive `int int R` recognition, mid-dictionary
//! garbage scanning, literal-string imbalance heuristics).

use crate::error::{Error, Result, Warning};
use crate::object::{Dictionary, Object, ObjectId, StringFormat, MAX_OBJECT_NUMBER};
use crate::source::Cursor;

fn is_whitespace(b: u8) -> bool {
    matches!(b, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

fn is_eol(b: u8) -> bool {
    matches!(b, 0x0A | 0x0D)
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'/' | b'%' | b'{' | b'}')
}

fn is_name_terminator(b: i32) -> bool {
    b < 0 || is_whitespace(b as u8) || is_delimiter(b as u8)
}

pub struct Lexer<'a> {
    pub cursor: Cursor<'a>,
    pub lenient: bool,
    pub warnings: Vec<Warning>,
}

impl<'a> Lexer<'a> {
    pub fn new(cursor: Cursor<'a>, lenient: bool) -> Self {
        Lexer { cursor, lenient, warnings: Vec::new() }
    }

    fn warn(&mut self, message: impl Into<String>) {
        let offset = self.cursor.position();
        log::warn!("{}", message.into());
        self.warnings.push(Warning::new(offset, "lexer"));
    }

    pub fn skip_ws_and_comments(&mut self) {
        loop {
            let b = self.cursor.peek_byte();
            if b >= 0 && is_whitespace(b as u8) {
                self.cursor.advance(1);
                continue;
            }
            if b == b'%' as i32 {
                self.cursor.advance(1);
                while {
                    let c = self.cursor.peek_byte();
                    c >= 0 && !is_eol(c as u8)
                } {
                    self.cursor.advance(1);
                }
                continue;
            }
            break;
        }
    }

    /// Reads a whitespace/delimiter-terminated bare token, used both for the
    /// `true`/`false`/`null` keywords and for the "unknown token" leniency
    /// path in §4.2's `parse_value` dispatch.
    fn read_bare_token(&mut self) -> Vec<u8> {
        let start = self.cursor.position();
        while {
            let b = self.cursor.peek_byte();
            !is_name_terminator(b)
        } {
            self.cursor.advance(1);
        }
        self.cursor.create_view(start, self.cursor.position() - start).to_vec()
    }

    /// Top-level value dispatch (§4.2). Returns `Ok(None)` for the "absent"
    /// cases: EOF, or a bare token that turns out to be `endobj`/`endstream`
    /// (the cursor is rewound so the caller sees that keyword next).
    pub fn parse_value(&mut self) -> Result<Option<Object>> {
        self.skip_ws_and_comments();
        let b = self.cursor.peek_byte();
        if b < 0 {
            return Ok(None);
        }
        match b as u8 {
            b'<' => {
                if self.cursor.peek_at(1) == b'<' as i32 {
                    self.cursor.advance(2);
                    Ok(Some(Object::Dictionary(self.parse_dict()?)))
                } else {
                    self.cursor.advance(1);
                    Ok(Some(self.parse_hex_string()?))
                }
            }
            b'[' => {
                self.cursor.advance(1);
                Ok(Some(self.parse_array()?))
            }
            b'(' => {
                self.cursor.advance(1);
                Ok(Some(self.parse_literal_string()?))
            }
            b'/' => {
                self.cursor.advance(1);
                Ok(Some(self.parse_name()?))
            }
            b'0'..=b'9' | b'+' | b'-' | b'.' => Ok(Some(self.parse_number_or_reference()?)),
            _ => {
                let start = self.cursor.position();
                let token = self.read_bare_token();
                if token.is_empty() {
                    // A lone delimiter we don't otherwise handle (e.g. stray `>`, `)`).
                    self.cursor.advance(1);
                    if self.lenient {
                        self.warn(format!("unexpected delimiter at offset {start}"));
                        return Ok(Some(Object::Null));
                    }
                    return Err(Error::MalformedValue { offset: start });
                }
                match token.as_slice() {
                    b"true" => Ok(Some(Object::Boolean(true))),
                    b"false" => Ok(Some(Object::Boolean(false))),
                    b"null" => Ok(Some(Object::Null)),
                    b"endobj" | b"endstream" => {
                        self.cursor.rewind(token.len());
                        Ok(None)
                    }
                    _ => {
                        if self.lenient {
                            self.warn(format!("unknown token at offset {start}"));
                            Ok(Some(Object::Null))
                        } else {
                            Err(Error::MalformedValue { offset: start })
                        }
                    }
                }
            }
        }
    }

    /// Parses a number, then attempts the `int int R` lookahead (§4.2.1).
    /// The lookahead always runs, regardless of the first number's sign or
    /// value: a full `int int R` shape is recognized and collapsed either to
    /// a `Reference` (when both numbers are in range) or to `Null` (when the
    /// object number is non-positive, the generation is negative, or either
    /// is out of range) — it's only on a non-match of the three-token shape
    /// itself that the cursor rewinds to just after the first number, so the
    /// caller observes only that value.
    fn parse_number_or_reference(&mut self) -> Result<Object> {
        let first = self.parse_number()?;
        let Object::Integer(n1) = first else { return Ok(first) };
        let after_first = self.cursor.position();
        self.skip_ws_and_comments();
        let gen_byte = self.cursor.peek_byte();
        let looks_like_number = gen_byte >= 0 && matches!(gen_byte as u8, b'0'..=b'9' | b'+' | b'-');
        if looks_like_number {
            if let Ok(Object::Integer(n2)) = self.parse_number() {
                self.skip_ws_and_comments();
                let r_pos = self.cursor.position();
                if self.cursor.peek_byte() == b'R' as i32 && is_name_terminator(self.cursor.peek_at(1)) {
                    self.cursor.advance(1);
                    if n1 > 0 && n1 < MAX_OBJECT_NUMBER as i64 && n2 >= 0 && n2 <= u16::MAX as i64 {
                        return Ok(Object::Reference((n1 as u64, n2 as u16)));
                    }
                    self.warn(format!("reference with out-of-range number/generation at offset {r_pos}"));
                    return Ok(Object::Null);
                }
            }
        }
        self.cursor.seek(after_first)?;
        Ok(first)
    }

    fn parse_number(&mut self) -> Result<Object> {
        let start = self.cursor.position();
        let mut has_digit = false;
        let mut has_dot = false;
        let mut has_exp = false;
        if matches!(self.cursor.peek_byte(), b if b == b'+' as i32 || b == b'-' as i32) {
            self.cursor.advance(1);
        }
        loop {
            let b = self.cursor.peek_byte();
            match b {
                b if b >= 0 && (b as u8).is_ascii_digit() => {
                    has_digit = true;
                    self.cursor.advance(1);
                }
                b if b == b'.' as i32 => {
                    has_dot = true;
                    self.cursor.advance(1);
                }
                b if b == b'e' as i32 || b == b'E' as i32 => {
                    has_exp = true;
                    self.cursor.advance(1);
                }
                b if b == b'+' as i32 || b == b'-' as i32 => {
                    self.cursor.advance(1);
                }
                _ => break,
            }
        }
        let text = self.cursor.create_view(start, self.cursor.position() - start);
        if !has_digit {
            if self.lenient {
                self.warn(format!("malformed number at offset {start}"));
                return Ok(Object::Integer(0));
            }
            return Err(Error::MalformedNumber { offset: start });
        }
        let text_str = std::str::from_utf8(text).unwrap_or("0");
        if has_dot || has_exp {
            match text_str.parse::<f64>() {
                Ok(v) => Ok(Object::Real(v)),
                Err(_) => {
                    if self.lenient {
                        self.warn(format!("malformed real at offset {start}"));
                        Ok(Object::Real(0.0))
                    } else {
                        Err(Error::MalformedNumber { offset: start })
                    }
                }
            }
        } else {
            match text_str.parse::<i64>() {
                Ok(v) => Ok(Object::Integer(v)),
                Err(_) => {
                    if self.lenient {
                        self.warn(format!("integer overflow at offset {start}"));
                        Ok(Object::Integer(0))
                    } else {
                        Err(Error::MalformedNumber { offset: start })
                    }
                }
            }
        }
    }

    fn parse_name(&mut self) -> Result<Object> {
        let mut raw = Vec::new();
        loop {
            let b = self.cursor.peek_byte();
            if is_name_terminator(b) {
                break;
            }
            let b = b as u8;
            if b == b'#' {
                let h1 = self.cursor.peek_at(1);
                let h2 = self.cursor.peek_at(2);
                let hex = |c: i32| -> Option<u8> { if c < 0 { None } else { (c as u8 as char).to_digit(16).map(|d| d as u8) } };
                if let (Some(d1), Some(d2)) = (hex(h1), hex(h2)) {
                    raw.push((d1 << 4) | d2);
                    self.cursor.advance(3);
                    continue;
                }
            }
            raw.push(b);
            self.cursor.advance(1);
        }
        Ok(Object::Name(decode_name_bytes(&raw)))
    }

    fn parse_hex_string(&mut self) -> Result<Object> {
        let mut bytes = Vec::new();
        let mut hi: Option<u8> = None;
        loop {
            let b = self.cursor.peek_byte();
            if b < 0 {
                if self.lenient {
                    self.warn("unterminated hex string");
                    break;
                }
                return Err(Error::MalformedString { offset: self.cursor.position() });
            }
            if b == b'>' as i32 {
                self.cursor.advance(1);
                break;
            }
            let byte = b as u8;
            if is_whitespace(byte) {
                self.cursor.advance(1);
                continue;
            }
            if byte.is_ascii_hexdigit() {
                let nibble = (byte as char).to_digit(16).unwrap() as u8;
                match hi.take() {
                    Some(h) => bytes.push((h << 4) | nibble),
                    None => hi = Some(nibble),
                }
                self.cursor.advance(1);
            } else {
                // drop a dangling unpaired nibble and scan forward to `>`.
                hi = None;
                while {
                    let c = self.cursor.peek_byte();
                    c >= 0 && c != b'>' as i32
                } {
                    self.cursor.advance(1);
                }
                if self.cursor.peek_byte() == b'>' as i32 {
                    self.cursor.advance(1);
                }
                break;
            }
        }
        if let Some(h) = hi {
            bytes.push(h << 4);
        }
        Ok(Object::String(bytes, StringFormat::Hexadecimal))
    }

    fn parse_literal_string(&mut self) -> Result<Object> {
        let mut bytes = Vec::new();
        let mut depth = 1;
        loop {
            let b = self.cursor.peek_byte();
            if b < 0 {
                if self.lenient {
                    self.warn("unterminated literal string at EOF");
                    break;
                }
                return Err(Error::MalformedString { offset: self.cursor.position() });
            }
            match b as u8 {
                b'\\' => {
                    self.cursor.advance(1);
                    let e = self.cursor.peek_byte();
                    if e < 0 {
                        break;
                    }
                    match e as u8 {
                        b'n' => { bytes.push(b'\n'); self.cursor.advance(1); }
                        b'r' => { bytes.push(b'\r'); self.cursor.advance(1); }
                        b't' => { bytes.push(b'\t'); self.cursor.advance(1); }
                        b'b' => { bytes.push(0x08); self.cursor.advance(1); }
                        b'f' => { bytes.push(0x0C); self.cursor.advance(1); }
                        b'(' => { bytes.push(b'('); self.cursor.advance(1); }
                        b')' => { bytes.push(b')'); self.cursor.advance(1); }
                        b'\\' => { bytes.push(b'\\'); self.cursor.advance(1); }
                        b'\r' => {
                            self.cursor.advance(1);
                            if self.cursor.peek_byte() == b'\n' as i32 {
                                self.cursor.advance(1);
                            }
                        }
                        b'\n' => { self.cursor.advance(1); }
                        d if d.is_ascii_digit() => {
                            let mut value: u32 = 0;
                            let mut count = 0;
                            while count < 3 {
                                let c = self.cursor.peek_byte();
                                if c < 0 || !(b'0'..=b'7').contains(&(c as u8)) {
                                    break;
                                }
                                value = value * 8 + (c as u8 - b'0') as u32;
                                self.cursor.advance(1);
                                count += 1;
                            }
                            bytes.push((value & 0xFF) as u8);
                        }
                        other => {
                            bytes.push(other);
                            self.cursor.advance(1);
                        }
                    }
                }
                b'(' => {
                    depth += 1;
                    bytes.push(b'(');
                    self.cursor.advance(1);
                }
                b')' => {
                    depth -= 1;
                    self.cursor.advance(1);
                    if depth == 0 {
                        break;
                    }
                    bytes.push(b')');
                }
                _ => {
                    bytes.push(b as u8);
                    self.cursor.advance(1);
                }
            }
            if depth > 0 && self.cursor.is_eof() {
                // End-of-string heuristic (§4.2.4): an unbalanced literal at
                // EOF is accepted leniently rather than erroring.
                break;
            }
        }
        Ok(Object::String(bytes, StringFormat::Literal))
    }

    fn parse_dict(&mut self) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            self.skip_ws_and_comments();
            let b = self.cursor.peek_byte();
            if b < 0 {
                if self.lenient {
                    self.warn("unterminated dictionary at EOF");
                    break;
                }
                return Err(Error::MalformedValue { offset: self.cursor.position() });
            }
            if b == b'>' as i32 && self.cursor.peek_at(1) == b'>' as i32 {
                self.cursor.advance(2);
                break;
            }
            if b == b'/' as i32 {
                self.cursor.advance(1);
                let Object::Name(key) = self.parse_name()? else { unreachable!() };
                let value = self.parse_value()?.unwrap_or(Object::Null);
                dict.set(key, value);
                continue;
            }
            // Leniency: scan forward past garbage until a new key, the
            // dictionary close, or an enclosing-object terminator appears.
            let scan_start = self.cursor.position();
            loop {
                if self.cursor.starts_with(b"endstream") || self.cursor.starts_with(b"endobj") {
                    self.warn(format!("dictionary truncated by object terminator at offset {scan_start}"));
                    return Ok(dict);
                }
                let c = self.cursor.peek_byte();
                if c < 0 || c == b'/' as i32 || c == b'>' as i32 {
                    break;
                }
                self.cursor.advance(1);
            }
            if self.cursor.peek_byte() < 0 {
                self.warn(format!("unterminated dictionary starting garbage scan at offset {scan_start}"));
                break;
            }
        }
        Ok(dict)
    }

    fn parse_array(&mut self) -> Result<Object> {
        let mut items = Vec::new();
        loop {
            self.skip_ws_and_comments();
            let b = self.cursor.peek_byte();
            if b < 0 {
                if self.lenient {
                    self.warn("unterminated array at EOF");
                    break;
                }
                return Err(Error::MalformedValue { offset: self.cursor.position() });
            }
            if b == b']' as i32 {
                self.cursor.advance(1);
                break;
            }
            if self.cursor.starts_with(b"endobj") || self.cursor.starts_with(b"endstream") {
                self.warn("array truncated by object terminator");
                break;
            }
            let before = self.cursor.position();
            match self.parse_value() {
                Ok(Some(value)) => items.push(value),
                Ok(None) => break,
                Err(_) if self.lenient => {
                    if self.cursor.position() == before {
                        self.cursor.advance(1);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Object::Array(items))
    }
}

/// Decodes a name's raw (post `#HH`-unescaped) bytes as UTF-8, falling back
/// to Windows-1252 (§4.2.6, §6 encoding rules).
fn decode_name_bytes(raw: &[u8]) -> Vec<u8> {
    if std::str::from_utf8(raw).is_ok() {
        return raw.to_vec();
    }
    let (cow, _, had_errors) = encoding_rs::WINDOWS_1252.decode(raw);
    if had_errors {
        raw.to_vec()
    } else {
        cow.as_bytes().to_vec()
    }
}

/// Reads an object number, enforcing `0 < n < 10^10` (§4.2.7).
pub fn read_object_number(lexer: &mut Lexer) -> Option<u64> {
    lexer.skip_ws_and_comments();
    let start = lexer.cursor.position();
    let mut digits = Vec::new();
    while {
        let c = lexer.cursor.peek_byte();
        c >= 0 && (c as u8).is_ascii_digit()
    } {
        digits.push(lexer.cursor.peek_byte() as u8);
        lexer.cursor.advance(1);
    }
    if digits.is_empty() {
        lexer.cursor.seek(start).ok();
        return None;
    }
    let text = std::str::from_utf8(&digits).ok()?;
    let n: u64 = text.parse().ok()?;
    if n > 0 && n < MAX_OBJECT_NUMBER { Some(n) } else { None }
}

/// Reads a generation number, enforcing `0 <= g <= 65535` (§4.2.7).
pub fn read_generation_number(lexer: &mut Lexer) -> Option<u16> {
    lexer.skip_ws_and_comments();
    let start = lexer.cursor.position();
    let mut digits = Vec::new();
    while {
        let c = lexer.cursor.peek_byte();
        c >= 0 && (c as u8).is_ascii_digit()
    } {
        digits.push(lexer.cursor.peek_byte() as u8);
        lexer.cursor.advance(1);
    }
    if digits.is_empty() {
        lexer.cursor.seek(start).ok();
        return None;
    }
    let text = std::str::from_utf8(&digits).ok()?;
    text.parse::<u32>().ok().filter(|&g| g <= u16::MAX as u32).map(|g| g as u16)
}

/// Reads `<num> <gen> obj`, returning the header's ObjectId. On a mismatch
/// between the claimed number/generation and what the caller expected, the
/// caller (the resolver, §4.5 step 4) decides whether to log-and-continue
/// or fail `WrongObjectHeader`.
pub fn read_object_header(lexer: &mut Lexer) -> Option<ObjectId> {
    let num = read_object_number(lexer)?;
    let gen = read_generation_number(lexer)?;
    lexer.skip_ws_and_comments();
    if lexer.cursor.eat(b"obj") { Some((num, gen)) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(bytes: &'static [u8]) -> Lexer<'static> {
        Lexer::new(Cursor::new(bytes), true)
    }

    #[test]
    fn parses_minimal_dict() {
        let mut lexer = lex(b"<< /Type /Catalog /Pages 2 0 R >>");
        let value = lexer.parse_value().unwrap().unwrap();
        let dict = value.as_dict().unwrap();
        assert_eq!(dict.get(b"Type").unwrap().as_name().unwrap(), b"Catalog");
        assert_eq!(dict.get(b"Pages").unwrap().as_reference().unwrap(), (2, 0));
    }

    #[test]
    fn literal_string_with_escape_and_unbalanced_paren() {
        let mut lexer = lex(b"(abc\\)def)");
        let value = lexer.parse_value().unwrap().unwrap();
        assert_eq!(value.as_str().unwrap(), b"abc)def");
    }

    #[test]
    fn hex_string_with_whitespace() {
        let mut lexer = lex(b"<48 65 6C 6C 6F>");
        let value = lexer.parse_value().unwrap().unwrap();
        assert_eq!(value.as_str().unwrap(), b"Hello");
    }

    #[test]
    fn name_with_hash_escape() {
        let mut lexer = lex(b"/A#20B");
        let value = lexer.parse_value().unwrap().unwrap();
        assert_eq!(value.as_name().unwrap(), b"A B");
    }

    #[test]
    fn integer_not_followed_by_generation_stays_integer() {
        let mut lexer = lex(b"42 /Foo");
        let value = lexer.parse_value().unwrap().unwrap();
        assert_eq!(value.as_i64().unwrap(), 42);
    }

    #[test]
    fn array_with_reference_and_plain_integer() {
        let mut lexer = lex(b"[1 0 R 7]");
        let value = lexer.parse_value().unwrap().unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr[0].as_reference().unwrap(), (1, 0));
        assert_eq!(arr[1].as_i64().unwrap(), 7);
    }

    #[test]
    fn object_header_reads_number_generation_obj() {
        let mut lexer = lex(b"12 0 obj");
        assert_eq!(read_object_header(&mut lexer), Some((12, 0)));
    }

    #[test]
    fn zero_object_number_in_reference_position_collapses_to_null() {
        let mut lexer = lex(b"0 0 R");
        let value = lexer.parse_value().unwrap().unwrap();
        assert!(value.is_null());
        assert!(lexer.cursor.is_eof());
    }

    #[test]
    fn negative_generation_in_reference_position_collapses_to_null() {
        let mut lexer = lex(b"1 -5 R");
        let value = lexer.parse_value().unwrap().unwrap();
        assert!(value.is_null());
        assert!(lexer.cursor.is_eof());
    }
}
