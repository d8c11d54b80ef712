// nrbf-edit - An MS-NRBF document model, editor and re-encoder.
// Copyright (C) 2026  nrbf-edit contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::io;
use thiserror::Error;

/// Result type for NRBF decoding, editing and encoding.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(io::Error),

    #[error("stream does not start with a serialization header")]
    BadHeader,

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("invalid record type: {0}")]
    InvalidRecordType(u8),

    #[error("invalid binary type: {0}")]
    InvalidBinaryType(u8),

    #[error("invalid primitive type: {0}")]
    InvalidPrimitiveType(u8),

    #[error("invalid binary array type: {0}")]
    InvalidArrayType(u8),

    #[error("variable-length int exceeds 32 bits")]
    VarIntOverflow,

    #[error("malformed UTF-8 string")]
    MalformedString,

    #[error("invalid length-prefixed string: {0}")]
    InvalidStringLength(i32),

    #[error("duplicate object id: {0}")]
    DuplicateObjectId(i32),

    #[error("metadata id {0} not found")]
    UnknownMetadataId(i32),

    #[error("record budget exceeded")]
    RecordBudgetExceeded,

    #[error("root object {0} not found")]
    RootNotFound(i32),

    #[error("reference to unknown object id {0}")]
    UnresolvableReference(i32),

    #[error("dangling reference to object id {0}")]
    DanglingReference(i32),

    #[error("no type info for member {0}")]
    MissingTypeInfo(String),

    #[error("integer {0} not encodable on the wire")]
    EncodeIntegerOutOfRange(i64),

    #[error("array declares {declared} elements but holds {actual}")]
    InconsistentArrayLength { declared: i32, actual: usize },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("invalid GUID format: {0}")]
    InvalidGuidFormat(String),

    #[error("value at {0} is not editable")]
    NotEditable(String),

    #[error("path not found: {0}")]
    PathNotFound(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
