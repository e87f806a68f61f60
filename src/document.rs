//! `Document` (C5): the public API. Owns the source buffer, the merged
//! xref/trailer produced by C4 (falling back to C6 when needed), and the
//! object resolver described by §4.5.
//!
//! Grounded in the teacher's `Document::load`/`get_object` split of
//! concerns, rebuilt around a lazy `ObjectPool` instead of the teacher's
//! eager `BTreeMap<ObjectId, Object>` since this core never parses an object
//! it hasn't been asked to resolve.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::ParserConfig;
use crate::encryption::{KeyMaterial, KeyStore, PasswordKeyStore, SecurityHandler, StandardSecurityHandler};
use crate::error::{EncryptionError, Error, Result, Warning};
use crate::lexer::{read_object_header, Lexer};
use crate::object::{Dictionary, Object, ObjectId, Stream};
use crate::object_stream::{ObjectStreamParser, StandardObjectStreamParser};
use crate::reader;
use crate::recovery;
use crate::source::Cursor;
use crate::stream_scan;
use crate::xref::{Xref, XrefEntry};

/// One slot of the `ObjectPool` (§4.5's data model): a resolution either
/// is in progress (cycle guard) or has a final answer. Absence from the
/// map is the implicit "Unresolved" state.
#[derive(Debug, Clone)]
enum Slot {
    Resolving,
    Resolved(Object),
    Null,
}

pub struct Document {
    buffer: Vec<u8>,
    pub version: String,
    xref: Xref,
    trailer: Dictionary,
    config: ParserConfig,
    pool: RefCell<HashMap<ObjectId, Slot>>,
    /// Container object number → its still-unconsumed decoded members.
    decompressed: RefCell<HashMap<u64, HashMap<ObjectId, Object>>>,
    warnings: RefCell<Vec<Warning>>,
    pub rebuilt: bool,
    key: Option<KeyMaterial>,
}

impl Document {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Document> {
        Document::load_with_config(fs::read(path)?, ParserConfig::default())
    }

    pub fn load_mem(buffer: Vec<u8>) -> Result<Document> {
        Document::load_with_config(buffer, ParserConfig::default())
    }

    pub fn load_with_config(buffer: Vec<u8>, config: ParserConfig) -> Result<Document> {
        Document::load_with_key_store(buffer, config, &PasswordKeyStore::default())
    }

    /// Like [`Document::load_with_config`], but resolves `/Encrypt` through a
    /// caller-supplied [`KeyStore`] instead of assuming an empty password.
    pub fn load_with_key_store(buffer: Vec<u8>, config: ParserConfig, key_store: &dyn KeyStore) -> Result<Document> {
        let mut warnings = Vec::new();
        let version = reader::read_header(&buffer, config.lenient())?;

        let declared = reader::locate_startxref(&buffer, &config, &mut warnings)
            .and_then(|start| reader::walk_xref_chain(&buffer, start, &config, &mut warnings));

        let (xref, trailer, rebuilt) = match declared {
            Ok((xref, trailer)) if trailer.has(b"Root") => (xref, trailer, false),
            Ok((xref, trailer)) if config.lenient() => {
                warnings.push(Warning::new(0, "trailer missing /Root, falling back to recovery"));
                match reader::recover(&buffer, &mut warnings) {
                    Ok(recovered) => (recovered.0, recovered.1, true),
                    Err(_) => (xref, trailer, false),
                }
            }
            Ok(_) => return Err(Error::MissingTrailerRoot),
            Err(_) if config.lenient() => {
                let (xref, trailer) = reader::recover(&buffer, &mut warnings)?;
                (xref, trailer, true)
            }
            Err(e) => return Err(e),
        };

        let mut document = Document {
            buffer,
            version,
            xref,
            trailer,
            config,
            pool: RefCell::new(HashMap::new()),
            decompressed: RefCell::new(HashMap::new()),
            warnings: RefCell::new(warnings),
            rebuilt,
            key: None,
        };
        document.key = document.resolve_encryption_key(key_store)?;
        Ok(document)
    }

    fn resolve_encryption_key(&self, key_store: &dyn KeyStore) -> Result<Option<KeyMaterial>> {
        let Ok(enc_entry) = self.trailer.get(b"Encrypt").cloned() else { return Ok(None) };
        let enc_dict = match enc_entry {
            Object::Reference(id) => self.resolve(id)?.as_dict()?.clone(),
            Object::Dictionary(dict) => dict,
            _ => return Err(EncryptionError::MalformedDict("/Encrypt is not a dictionary or reference".into()).into()),
        };

        let id_bytes = self
            .trailer
            .get(b"ID")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| o.as_str().ok())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let password = key_store.material(&id_bytes, b"", "default").unwrap_or_default();
        let handler = StandardSecurityHandler;
        Ok(Some(handler.prepare(&enc_dict, &id_bytes, &password)?))
    }

    pub fn warnings(&self) -> std::cell::Ref<'_, Vec<Warning>> {
        self.warnings.borrow()
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    fn push_warning(&self, offset: usize, message: impl Into<String>) {
        self.warnings.borrow_mut().push(Warning::new(offset, message));
    }

    /// Resolves `id` to its value, implementing the seven-step algorithm of
    /// §4.5 (cycle detection, xref lookup with C6 fallback, object-header
    /// validation, stream-body scanning, object-stream decompression,
    /// encryption, and cache population).
    pub fn resolve(&self, id: ObjectId) -> Result<Object> {
        if let Some(slot) = self.pool.borrow().get(&id) {
            match slot {
                Slot::Resolved(value) => return Ok(value.clone()),
                Slot::Null => return Ok(Object::Null),
                Slot::Resolving => return Err(Error::CycleDetected(id.0, id.1)),
            }
        }
        self.pool.borrow_mut().insert(id, Slot::Resolving);

        let result = self.resolve_uncached(id);

        let slot = match &result {
            Ok(value) => Slot::Resolved(value.clone()),
            Err(_) => Slot::Null,
        };
        self.pool.borrow_mut().insert(id, slot);
        result
    }

    fn resolve_uncached(&self, id: ObjectId) -> Result<Object> {
        let entry = match self.xref.get(id.0).copied() {
            Some(entry) => entry,
            None if self.config.lenient() => {
                let scan = recovery::scan(&self.buffer);
                match scan.object_candidates.iter().find(|c| c.id.0 == id.0) {
                    Some(candidate) => XrefEntry::Normal { offset: candidate.offset as u64, generation: candidate.id.1 },
                    None => return Ok(Object::Null),
                }
            }
            None => return Ok(Object::Null),
        };

        match entry {
            XrefEntry::Normal { offset, generation } => self.resolve_normal(id, offset as usize, generation),
            XrefEntry::Compressed { container, index } => self.resolve_compressed(id, container, index),
            XrefEntry::Free { .. } => Ok(Object::Null),
        }
    }

    fn resolve_normal(&self, id: ObjectId, offset: usize, generation: u16) -> Result<Object> {
        let mut lexer = Lexer::new(Cursor::at(&self.buffer, offset), self.config.lenient());
        let header = read_object_header(&mut lexer);
        match header {
            Some(found) if found == id || found.1 == generation => {}
            Some(_found) if self.config.lenient() => self.push_warning(offset, "object header number/generation mismatch"),
            Some(_found) => return Err(Error::WrongObjectHeader { offset }),
            None if self.config.lenient() => self.push_warning(offset, "missing object header, parsing value anyway"),
            None => return Err(Error::WrongObjectHeader { offset }),
        }

        lexer.skip_ws_and_comments();
        let value = lexer.parse_value()?.unwrap_or(Object::Null);
        lexer.skip_ws_and_comments();

        let resolved = if lexer.cursor.starts_with(b"stream") {
            lexer.cursor.advance(b"stream".len());
            stream_scan::consume_stream_eol(&mut lexer.cursor, lexer.lenient, &mut self.warnings.borrow_mut());

            let Object::Dictionary(dict) = value else { return Err(Error::StreamWithoutDict) };
            let declared_length = self.resolve_length(&dict)?;
            let scan = stream_scan::scan(&mut lexer.cursor, declared_length, lexer.lenient, &mut self.warnings.borrow_mut())?;

            // The token immediately following the payload must be the
            // canonical `endstream`, or (in the lenient endobj-divergence
            // case) `endobj` left in place for the enclosing object to
            // consume; anything else is a malformed stream trailer (§4.3).
            let trailing_offset = lexer.cursor.position();
            if lexer.cursor.starts_with(b"endstream") {
                lexer.cursor.advance(b"endstream".len());
            } else if lexer.cursor.starts_with(b"endobj") {
                // left for the caller's `endobj` handling.
            } else if lexer.lenient {
                self.push_warning(trailing_offset, "stream payload not followed by endstream/endobj");
            } else {
                return Err(Error::MalformedStream {
                    offset: trailing_offset,
                    reason: "expected endstream or endobj after stream payload".into(),
                });
            }

            Object::Stream(Stream::new(dict, scan.payload))
        } else {
            value
        };

        if let Some(key) = &self.key {
            if id.0 != self.encrypt_dict_object_number() {
                return self.decrypt_value(resolved, key, id);
            }
        }
        Ok(resolved)
    }

    /// The `/Encrypt` dictionary (when indirect) is never itself encrypted.
    fn encrypt_dict_object_number(&self) -> u64 {
        self.trailer.get(b"Encrypt").ok().and_then(|o| o.as_reference().ok()).map(|(num, _)| num).unwrap_or(u64::MAX)
    }

    fn decrypt_value(&self, value: Object, key: &KeyMaterial, id: ObjectId) -> Result<Object> {
        let handler = StandardSecurityHandler;
        match value {
            Object::Stream(stream) => {
                let decrypted = handler.decrypt_stream(&stream.content, key, id)?;
                let dict = handler.decrypt_object(Object::Dictionary(stream.dict), key, id)?;
                let Object::Dictionary(dict) = dict else { unreachable!() };
                Ok(Object::Stream(Stream::new(dict, decrypted)))
            }
            other => handler.decrypt_object(other, key, id),
        }
    }

    /// §4.5's "Dictionary-value length resolution": `/Length` may itself be
    /// an indirect reference, whose referent is resolved recursively.
    fn resolve_length(&self, dict: &Dictionary) -> Result<Option<i64>> {
        match dict.get(b"Length") {
            Ok(Object::Integer(n)) => Ok(Some(*n)),
            Ok(Object::Reference(length_id)) => {
                let length_id = *length_id;
                match self.resolve(length_id) {
                    Ok(Object::Integer(n)) => Ok(Some(n)),
                    Ok(Object::Null) => Ok(None),
                    Ok(_) => Err(Error::MalformedLength),
                    Err(_) => Ok(None),
                }
            }
            Ok(_) => Err(Error::MalformedLength),
            Err(_) => Ok(None),
        }
    }

    fn resolve_compressed(&self, id: ObjectId, container: u64, _index: u32) -> Result<Object> {
        if let Some(value) = self.decompressed.borrow_mut().get_mut(&container).and_then(|members| members.remove(&id)) {
            return Ok(value);
        }

        let container_value = self.resolve((container, 0))?;
        let Object::Stream(stream) = container_value else { return Err(Error::ObjectType { expected: "Stream", found: "other" }) };
        if !stream.dict.has_type(b"ObjStm") {
            return Err(Error::ObjectType { expected: "ObjStm", found: "Stream" });
        }

        let parser = StandardObjectStreamParser;
        let mut members = parser.parse_all(&stream)?;
        let value = members.remove(&id).unwrap_or(Object::Null);
        self.decompressed.borrow_mut().insert(container, members);
        Ok(value)
    }

    /// Convenience over `resolve` for dictionary values that may be direct
    /// or indirect.
    pub fn dereference<'a>(&self, object: &'a Object) -> Result<std::borrow::Cow<'a, Object>> {
        match object {
            Object::Reference(id) => Ok(std::borrow::Cow::Owned(self.resolve(*id)?)),
            other => Ok(std::borrow::Cow::Borrowed(other)),
        }
    }

    pub fn catalog(&self) -> Result<Dictionary> {
        let root = self.trailer.get(b"Root")?;
        let resolved = self.dereference(root)?;
        resolved.as_dict().cloned()
    }

    pub fn max_object_number(&self) -> u64 {
        self.xref.max_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_pdf() -> Vec<u8> {
        let body = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n";
        let mut buf = body.to_vec();
        let xref_offset = buf.len();
        buf.extend_from_slice(b"xref\n0 3\n0000000000 65535 f \n0000000009 00000 n \n0000000061 00000 n \n");
        buf.extend_from_slice(b"trailer\n<< /Size 3 /Root 1 0 R >>\n");
        buf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());
        buf
    }

    #[test]
    fn loads_and_resolves_catalog() {
        let doc = Document::load_mem(minimal_pdf()).unwrap();
        let catalog = doc.catalog().unwrap();
        assert!(catalog.has_type(b"Catalog"));
    }

    #[test]
    fn repeated_resolve_is_cached() {
        let doc = Document::load_mem(minimal_pdf()).unwrap();
        let first = doc.resolve((2, 0)).unwrap();
        let second = doc.resolve((2, 0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_object_resolves_to_null_in_lenient_mode() {
        let doc = Document::load_mem(minimal_pdf()).unwrap();
        let value = doc.resolve((999, 0)).unwrap();
        assert!(value.is_null());
    }

    fn pdf_with_stream(payload: &[u8], terminator: &[u8]) -> Vec<u8> {
        let obj1 = b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
        let obj2 = b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n";

        let mut buf = b"%PDF-1.4\n".to_vec();
        let off1 = buf.len();
        buf.extend_from_slice(obj1);
        let off2 = buf.len();
        buf.extend_from_slice(obj2);
        let off3 = buf.len();
        buf.extend_from_slice(format!("3 0 obj\n<< /Length {} >>\nstream\n", payload.len()).as_bytes());
        buf.extend_from_slice(payload);
        buf.extend_from_slice(b"\n");
        buf.extend_from_slice(terminator);

        let xref_offset = buf.len();
        buf.extend_from_slice(b"xref\n0 4\n0000000000 65535 f \n");
        buf.extend_from_slice(format!("{off1:010} 00000 n \n").as_bytes());
        buf.extend_from_slice(format!("{off2:010} 00000 n \n").as_bytes());
        buf.extend_from_slice(format!("{off3:010} 00000 n \n").as_bytes());
        buf.extend_from_slice(b"trailer\n<< /Size 4 /Root 1 0 R >>\n");
        buf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());
        buf
    }

    #[test]
    fn resolves_stream_with_canonical_terminator() {
        let doc = Document::load_mem(pdf_with_stream(b"hello world", b"endstream\nendobj\n")).unwrap();
        let value = doc.resolve((3, 0)).unwrap();
        assert_eq!(value.as_stream().unwrap().content, b"hello world");
    }

    #[test]
    fn stream_running_to_eof_without_a_terminator_warns_but_still_resolves_in_lenient_mode() {
        let doc = Document::load_mem(pdf_with_stream(b"truncated", b"")).unwrap();
        let value = doc.resolve((3, 0)).unwrap();
        assert!(!value.as_stream().unwrap().content.is_empty());
        assert!(doc.warnings().iter().any(|w| w.message.contains("terminator")));
    }

    #[test]
    fn stream_without_a_recognized_terminator_is_a_hard_error_in_strict_mode() {
        let config = ParserConfig::default().with_lenient(false);
        let doc = Document::load_with_config(pdf_with_stream(b"truncated", b""), config).unwrap();
        let err = doc.resolve((3, 0)).unwrap_err();
        assert!(matches!(err, Error::StreamLengthInvalid));
    }
}
