#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(clippy::all)]

#[macro_use]
mod object;
pub use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};

mod config;
mod document;
mod lexer;
mod recovery;
mod reader;
mod source;
mod stream_scan;
pub mod xref;
pub use crate::config::{ParserConfig, StreamCacheStrategy};
pub use crate::document::Document;
pub use crate::xref::{Xref, XrefEntry, XrefType};

mod object_stream;
pub use crate::object_stream::{ObjectStreamParser, StandardObjectStreamParser};

pub mod encryption;
pub use crate::encryption::{CipherKind, KeyMaterial, KeyStore, PasswordKeyStore, SecurityHandler, StandardSecurityHandler};

mod error;
pub use error::{EncryptionError, Error, Result, Warning};

pub mod filters;
pub use crate::filters::{FilterChain, StandardFilterChain};

mod writer;
pub use crate::writer::Writer;
