//! Object-stream decoder (`ObjectStreamParser` collaborator, §6).
//!
//! Decodes the packed index of an `/ObjStm` stream into its contained
//! objects, keyed `(objectNumber, 0)` as the spec's `Compressed` entries
//! require. Grounded in the teacher's `ObjectStream::new`, rebuilt against
//! the new `Stream`/`Lexer` API and returning a `HashMap` instead of a
//! `BTreeMap` since callers only ever look up by key.

use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::object::{Object, ObjectId, Stream};
use crate::source::Cursor;
use std::collections::HashMap;

pub trait ObjectStreamParser {
    fn parse_all(&self, stream: &Stream) -> Result<HashMap<ObjectId, Object>>;
}

pub struct StandardObjectStreamParser;

impl ObjectStreamParser for StandardObjectStreamParser {
    fn parse_all(&self, stream: &Stream) -> Result<HashMap<ObjectId, Object>> {
        let content = stream.decoded_content()?;
        if content.is_empty() {
            return Ok(HashMap::new());
        }

        let first_offset = stream.dict.get(b"First").and_then(Object::as_i64)? as usize;
        let count = stream.dict.get(b"N").and_then(Object::as_i64)? as usize;

        let index_block = content.get(..first_offset).ok_or(Error::OutOfRange(first_offset))?;
        let index_text = std::str::from_utf8(index_block).map_err(|_| Error::MalformedValue { offset: 0 })?;
        let numbers: Vec<u64> = index_text.split_whitespace().filter_map(|n| n.parse().ok()).collect();

        let mut objects = HashMap::with_capacity(count);
        for pair in numbers.chunks(2) {
            let [object_number, relative_offset] = pair else { break };
            let abs_offset = first_offset + *relative_offset as usize;
            if abs_offset >= content.len() {
                continue;
            }
            let mut lexer = Lexer::new(Cursor::at(&content, abs_offset), true);
            if let Ok(Some(value)) = lexer.parse_value() {
                objects.insert((*object_number, 0u16), value);
            }
        }

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;

    #[test]
    fn decodes_two_packed_objects() {
        let index = b"1 0 2 8";
        let body = b"42 /Foo";
        let mut content = index.to_vec();
        content.extend_from_slice(body);

        let mut dict = Dictionary::new();
        dict.set("Type", "ObjStm");
        dict.set("N", 2i64);
        dict.set("First", index.len() as i64);

        let stream = Stream::new(dict, content);
        let parser = StandardObjectStreamParser;
        let objects = parser.parse_all(&stream).unwrap();

        assert_eq!(objects.get(&(1, 0)).unwrap().as_i64().unwrap(), 42);
        assert_eq!(objects.get(&(2, 0)).unwrap().as_name().unwrap(), b"Foo");
    }
}
