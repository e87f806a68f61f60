//! Error taxonomy for the parsing core.
//!
//! Most failure modes below are only ever observed in strict mode; in the
//! default lenient mode the resolver downgrades the corresponding condition
//! to a [`Warning`] and substitutes `Object::Null` instead of propagating
//! the error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("missing or unparseable PDF/FDF header")]
    Header,

    #[error("unknown token at offset {offset}, expected a value")]
    MalformedValue { offset: usize },

    #[error("malformed number at offset {offset}")]
    MalformedNumber { offset: usize },

    #[error("malformed literal or hex string at offset {offset}")]
    MalformedString { offset: usize },

    #[error("malformed name at offset {offset}")]
    MalformedName { offset: usize },

    #[error("malformed stream payload at offset {offset}: {reason}")]
    MalformedStream { offset: usize, reason: String },

    #[error("stream declared Length did not validate and no terminator was found")]
    StreamLengthInvalid,

    #[error("stream /Length resolved to a non-numeric object")]
    MalformedLength,

    #[error("object header at offset {offset} did not match the expected object number")]
    WrongObjectHeader { offset: usize },

    #[error("a stream's dictionary value was not a Dictionary")]
    StreamWithoutDict,

    #[error("cycle detected while resolving object ({0}, {1})")]
    CycleDetected(u64, u16),

    #[error("cross-reference /Prev chain contains a loop (offset {0} revisited)")]
    XRefLoop(u64),

    #[error("trailer lacks /Root and recovery could not synthesize one")]
    MissingTrailerRoot,

    #[error("could not locate a valid cross-reference section")]
    NoValidXref,

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("object is not of the expected type: expected {expected}, found {found}")]
    ObjectType { expected: &'static str, found: &'static str },

    #[error("dictionary is missing required key /{0}")]
    DictKey(String),

    #[error("object {0} generation {1} was not found")]
    ObjectNotFound(u64, u16),

    #[error("seek or read out of range (position {0})")]
    OutOfRange(usize),

    #[error("feature not implemented: {0}")]
    Unimplemented(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("document is encrypted with an unsupported handler/version")]
    UnsupportedHandler,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("encryption dictionary is malformed: {0}")]
    MalformedDict(String),
    #[error("missing /ID entry required for key derivation")]
    MissingId,
}

/// A recoverable-condition record kept for diagnostic surface in lenient mode.
#[derive(Debug, Clone)]
pub struct Warning {
    pub offset: usize,
    pub message: String,
}

impl Warning {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Warning { offset, message: message.into() }
    }
}
