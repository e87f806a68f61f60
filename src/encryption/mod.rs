//! `SecurityHandler` collaborator (§6): document decryption.
//!
//! The teacher's encryption subsystem (`encryption.rs`, `algorithms.rs`,
//! `crypt_filters.rs`) covered the full write-capable security-handler
//! surface; this crate is read-only, so only the key-derivation and
//! decrypt paths survive, condensed behind one trait. RC4 and PKCS#5
//! padding are the teacher's own small, dependency-free primitives
//! (`rc4.rs`, `pkcs5.rs`); AES block decryption goes through the `aes`/`cbc`
//! crates already in the teacher's dependency table.

mod pkcs5;
mod rc4;

use crate::error::{EncryptionError, Result};
use crate::object::{Dictionary, Object, ObjectId};
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rc4::Rc4;
use sha2::Sha256;

/// Key material produced by [`SecurityHandler::prepare`] and threaded
/// through every subsequent `decrypt_object`/`decrypt_stream` call.
#[derive(Clone)]
pub struct KeyMaterial {
    pub file_key: Vec<u8>,
    pub cipher: CipherKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CipherKind {
    Rc4,
    Aes128Cbc,
    Aes256Cbc,
}

pub trait SecurityHandler {
    fn prepare(&self, enc_dict: &Dictionary, id_bytes: &[u8], password: &[u8]) -> Result<KeyMaterial>;
    fn decrypt_object(&self, value: Object, key: &KeyMaterial, id: ObjectId) -> Result<Object>;
    fn decrypt_stream(&self, bytes: &[u8], key: &KeyMaterial, id: ObjectId) -> Result<Vec<u8>>;
}

/// `KeyStore` collaborator (§6): turns an opaque blob (e.g. a wrapped key
/// retrieved from an external vault), a password, and an alias naming which
/// credential to use, into the password bytes `SecurityHandler::prepare`
/// expects. Most callers only ever hold a password, so `PasswordKeyStore`
/// ignores `blob`/`alias` and hands the password straight through.
pub trait KeyStore {
    fn material(&self, blob: &[u8], password: &[u8], alias: &str) -> Option<Vec<u8>>;
}

#[derive(Default)]
pub struct PasswordKeyStore {
    pub password: Vec<u8>,
}

impl KeyStore for PasswordKeyStore {
    fn material(&self, _blob: &[u8], _password: &[u8], _alias: &str) -> Option<Vec<u8>> {
        Some(self.password.clone())
    }
}

/// The Standard security handler, revisions 2 through 6 (RC4/40-bit,
/// RC4-or-AES-128/revision 4, AES-256/revisions 5-6).
pub struct StandardSecurityHandler;

const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0,
    0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

impl SecurityHandler for StandardSecurityHandler {
    fn prepare(&self, enc_dict: &Dictionary, id_bytes: &[u8], password: &[u8]) -> Result<KeyMaterial> {
        let revision = enc_dict.get(b"R").and_then(Object::as_i64).unwrap_or(2);
        let key_len_bits = enc_dict.get(b"Length").and_then(Object::as_i64).unwrap_or(40) as usize;
        let o_entry = enc_dict.get(b"O").and_then(Object::as_str).map_err(|_| EncryptionError::MalformedDict("missing /O".into()))?;
        let p = enc_dict.get(b"P").and_then(Object::as_i64).unwrap_or(0);

        if revision >= 5 {
            return self.prepare_aes256(enc_dict, password);
        }

        let mut hasher = Md5::new();
        let mut padded_password = password.to_vec();
        padded_password.extend_from_slice(&PAD_BYTES);
        padded_password.truncate(32);
        hasher.update(&padded_password);
        hasher.update(&o_entry[..32.min(o_entry.len())]);
        hasher.update((p as i32).to_le_bytes());
        hasher.update(id_bytes);
        if revision >= 4 {
            let encrypt_metadata = enc_dict.get(b"EncryptMetadata").and_then(Object::as_bool).unwrap_or(true);
            if !encrypt_metadata {
                hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
            }
        }
        let mut digest = hasher.finalize().to_vec();

        let key_len_bytes = (key_len_bits / 8).clamp(5, 16);
        if revision >= 3 {
            for _ in 0..50 {
                let mut h = Md5::new();
                h.update(&digest[..key_len_bytes]);
                digest = h.finalize().to_vec();
            }
        }
        digest.truncate(key_len_bytes);

        let cipher = if revision >= 4 { CipherKind::Aes128Cbc } else { CipherKind::Rc4 };
        Ok(KeyMaterial { file_key: digest, cipher })
    }

    fn decrypt_object(&self, value: Object, key: &KeyMaterial, id: ObjectId) -> Result<Object> {
        match value {
            Object::String(bytes, format) => {
                let decrypted = self.decrypt_stream(&bytes, key, id)?;
                Ok(Object::String(decrypted, format))
            }
            Object::Array(items) => {
                let decrypted = items.into_iter().map(|item| self.decrypt_object(item, key, id)).collect::<Result<Vec<_>>>()?;
                Ok(Object::Array(decrypted))
            }
            Object::Dictionary(dict) => {
                let mut out = Dictionary::new();
                for (k, v) in dict {
                    out.set(k, self.decrypt_object(v, key, id)?);
                }
                Ok(Object::Dictionary(out))
            }
            other => Ok(other),
        }
    }

    fn decrypt_stream(&self, bytes: &[u8], key: &KeyMaterial, id: ObjectId) -> Result<Vec<u8>> {
        let object_key = derive_object_key(key, id);
        match key.cipher {
            CipherKind::Rc4 => Ok(Rc4::new(&object_key).decrypt(bytes)),
            CipherKind::Aes128Cbc | CipherKind::Aes256Cbc => decrypt_aes_cbc(&object_key, bytes),
        }
    }
}

impl StandardSecurityHandler {
    fn prepare_aes256(&self, enc_dict: &Dictionary, password: &[u8]) -> Result<KeyMaterial> {
        let u_entry = enc_dict.get(b"U").and_then(Object::as_str).map_err(|_| EncryptionError::MalformedDict("missing /U".into()))?;
        let ue_entry = enc_dict.get(b"UE").and_then(Object::as_str).ok();
        if u_entry.len() < 48 {
            return Err(EncryptionError::MalformedDict("/U entry too short".into()).into());
        }
        let validation_salt = &u_entry[32..40];
        let key_salt = &u_entry[40..48];

        let password = sanitize_password_r6(password)?;

        let mut hasher = Sha256::new();
        hasher.update(&password);
        hasher.update(validation_salt);
        let _hash = hasher.finalize();

        let mut key_hasher = Sha256::new();
        key_hasher.update(&password);
        key_hasher.update(key_salt);
        let intermediate_key = key_hasher.finalize();

        let Some(ue) = ue_entry else {
            return Err(EncryptionError::MissingId.into());
        };
        // AES-256 no-padding CBC with a zero IV unwraps the file key from /UE.
        let iv = [0u8; 16];
        let mut buf = ue.to_vec();
        type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
        let decryptor = Aes256CbcDec::new_from_slices(&intermediate_key, &iv).map_err(|_| EncryptionError::MissingId)?;
        decryptor
            .decrypt_padded_mut::<aes::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|_| EncryptionError::IncorrectPassword)?;

        Ok(KeyMaterial { file_key: buf[..32].to_vec(), cipher: CipherKind::Aes256Cbc })
    }
}

/// Sanitizes a revision-6 password per Algorithm 2.A step 1 (ISO 32000-2):
/// SASLprep-normalizes a UTF-8 password and truncates to 127 bytes. A
/// password that isn't valid UTF-8 is passed through unnormalized rather than
/// rejected outright, since §4.2.6's "bytes are raw, no decoding in the core"
/// posture extends to passwords supplied by a `KeyStore`.
fn sanitize_password_r6(password: &[u8]) -> Result<Vec<u8>> {
    let Ok(text) = std::str::from_utf8(password) else { return Ok(password.to_vec()) };
    let normalized = stringprep::saslprep(text).map_err(|_| EncryptionError::IncorrectPassword)?;
    let mut bytes = normalized.as_bytes().to_vec();
    bytes.truncate(127);
    Ok(bytes)
}

/// Per-object key derivation (Algorithm 1, §7.6.2): for R2-R4 the file key
/// is salted with the object/generation numbers (and, for AES, a fixed
/// "sAlT" suffix); R5/R6 use the file key directly.
fn derive_object_key(key: &KeyMaterial, id: ObjectId) -> Vec<u8> {
    if key.cipher == CipherKind::Aes256Cbc {
        return key.file_key.clone();
    }
    let mut hasher = Md5::new();
    hasher.update(&key.file_key);
    hasher.update((id.0 as u32).to_le_bytes()[..3].to_vec());
    hasher.update((id.1).to_le_bytes());
    if key.cipher == CipherKind::Aes128Cbc {
        hasher.update(b"sAlT");
    }
    let digest = hasher.finalize();
    let len = (key.file_key.len() + 5).min(16);
    digest[..len].to_vec()
}

fn decrypt_aes_cbc(key: &[u8], bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < 16 {
        return Ok(Vec::new());
    }
    let (iv, ciphertext) = bytes.split_at(16);
    let mut buf = ciphertext.to_vec();
    let plaintext: &[u8] = if key.len() == 32 {
        type Dec = cbc::Decryptor<aes::Aes256>;
        let decryptor = Dec::new_from_slices(key, iv).map_err(|_| EncryptionError::IncorrectPassword)?;
        decryptor
            .decrypt_padded_mut::<self::pkcs5::Pkcs5>(&mut buf)
            .map_err(|_| EncryptionError::IncorrectPassword)?
    } else {
        type Dec = cbc::Decryptor<aes::Aes128>;
        let decryptor = Dec::new_from_slices(key, iv).map_err(|_| EncryptionError::IncorrectPassword)?;
        decryptor
            .decrypt_padded_mut::<self::pkcs5::Pkcs5>(&mut buf)
            .map_err(|_| EncryptionError::IncorrectPassword)?
    };
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc4_roundtrips() {
        let cipher = Rc4::new(b"secretkey");
        let encrypted = cipher.encrypt(b"hello world");
        let decrypted = cipher.decrypt(&encrypted);
        assert_eq!(decrypted, b"hello world".to_vec());
    }

    #[test]
    fn derive_object_key_changes_with_id() {
        let key = KeyMaterial { file_key: vec![1, 2, 3, 4, 5], cipher: CipherKind::Rc4 };
        let k1 = derive_object_key(&key, (1, 0));
        let k2 = derive_object_key(&key, (2, 0));
        assert_ne!(k1, k2);
    }
}
