//! Conservative round-trip value writer (§8's testable round-trip property).
//!
//! The write/save path is out of scope for this core; what remains, kept
//! from the teacher's `Writer`, is byte-level re-serialization of a parsed
//! `Object` good enough to prove Names/Strings/Numbers/Arrays/Dictionaries
//! round-trip their payload.

use std::io::{Result, Write};

use crate::object::{Dictionary, Object, Stream, StringFormat};

pub struct Writer;

impl Writer {
    fn need_separator(object: &Object) -> bool {
        matches!(object, Object::Null | Object::Boolean(_) | Object::Integer(_) | Object::Real(_) | Object::Reference(_))
    }

    pub fn write_object(file: &mut dyn Write, object: &Object) -> Result<()> {
        match object {
            Object::Null => file.write_all(b"null"),
            Object::Boolean(value) => file.write_all(if *value { b"true" } else { b"false" }),
            Object::Integer(value) => write!(file, "{value}"),
            Object::Real(value) => write!(file, "{value:.02}"),
            Object::Name(name) => Writer::write_name(file, name),
            Object::String(text, format) => Writer::write_string(file, text, format),
            Object::Array(array) => Writer::write_array(file, array),
            Object::Dictionary(dict) => Writer::write_dictionary(file, dict),
            Object::Stream(stream) => Writer::write_stream(file, stream),
            Object::Reference(id) => write!(file, "{} {} R", id.0, id.1),
        }
    }

    fn write_name(file: &mut dyn Write, name: &[u8]) -> Result<()> {
        file.write_all(b"/")?;
        for &byte in name {
            if b" \t\n\r\x0C()<>[]{}/%#".contains(&byte) || !(33..=126).contains(&byte) {
                write!(file, "#{byte:02X}")?;
            } else {
                file.write_all(&[byte])?;
            }
        }
        Ok(())
    }

    fn write_string(file: &mut dyn Write, text: &[u8], format: &StringFormat) -> Result<()> {
        match format {
            StringFormat::Literal => {
                file.write_all(b"(")?;
                let mut depth = 0i32;
                for &byte in text {
                    match byte {
                        b'(' => {
                            depth += 1;
                            file.write_all(b"(")?;
                        }
                        b')' => {
                            if depth > 0 {
                                depth -= 1;
                                file.write_all(b")")?;
                            } else {
                                file.write_all(b"\\)")?;
                            }
                        }
                        b'\\' => file.write_all(b"\\\\")?,
                        b'\r' => file.write_all(b"\\r")?,
                        _ => file.write_all(&[byte])?,
                    }
                }
                file.write_all(b")")
            }
            StringFormat::Hexadecimal => {
                file.write_all(b"<")?;
                for &byte in text {
                    write!(file, "{byte:02X}")?;
                }
                file.write_all(b">")
            }
        }
    }

    fn write_array(file: &mut dyn Write, array: &[Object]) -> Result<()> {
        file.write_all(b"[")?;
        for (index, object) in array.iter().enumerate() {
            if index > 0 && Writer::need_separator(object) {
                file.write_all(b" ")?;
            }
            Writer::write_object(file, object)?;
        }
        file.write_all(b"]")
    }

    pub fn write_dictionary(file: &mut dyn Write, dictionary: &Dictionary) -> Result<()> {
        file.write_all(b"<<")?;
        for (key, value) in dictionary {
            Writer::write_name(file, key)?;
            if Writer::need_separator(value) {
                file.write_all(b" ")?;
            }
            Writer::write_object(file, value)?;
        }
        file.write_all(b">>")
    }

    fn write_stream(file: &mut dyn Write, stream: &Stream) -> Result<()> {
        Writer::write_dictionary(file, &stream.dict)?;
        file.write_all(b"\nstream\n")?;
        file.write_all(&stream.content)?;
        file.write_all(b"\nendstream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(object: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        Writer::write_object(&mut buf, object).unwrap();
        buf
    }

    #[test]
    fn name_round_trips_with_hash_escapes() {
        let out = roundtrip(&Object::Name(b"A B".to_vec()));
        assert_eq!(out, b"/A#20B");
    }

    #[test]
    fn literal_string_escapes_parens_and_backslash() {
        let out = roundtrip(&Object::string_literal(b"a(b)\\c".to_vec()));
        assert_eq!(out, b"(a(b\\)\\\\c)");
    }

    #[test]
    fn dictionary_preserves_first_seen_key_order() {
        let mut dict = Dictionary::new();
        dict.set("B", 1i64);
        dict.set("A", 2i64);
        dict.set("B", 99i64);
        let out = roundtrip(&Object::Dictionary(dict));
        assert_eq!(out, b"<</B 1/A 2>>");
    }

    #[test]
    fn array_preserves_order() {
        let out = roundtrip(&Object::Array(vec![Object::Integer(1), Object::Integer(2), Object::Integer(3)]));
        assert_eq!(out, b"[1 2 3]");
    }
}
