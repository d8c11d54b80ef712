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

//! An MS-NRBF document model for save-file editing: decode a
//! `BinaryFormatter` stream into an inspectable record graph, change leaf
//! values in place, and re-encode. An unedited document re-encodes
//! byte-for-byte; an edited one differs only where the edit landed.

pub mod decoder;
pub mod diff;
pub mod document;
mod edit;
pub mod encoder;
pub mod error;
pub mod guid;
pub mod path;
pub mod records;

pub use decoder::{DecodeOptions, Decoder};
pub use diff::{ChangeKind, FieldChange, diff};
pub use document::{Document, DocumentIter, DocumentStats};
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use records::{PrimitiveType, PrimitiveValue, Record, RecordHandle, Value};

/// Decodes a full NRBF stream into a [`Document`].
pub fn load(bytes: &[u8]) -> Result<Document> {
    Document::decode(bytes)
}

/// Encodes a document back to bytes.
pub fn save(document: &Document) -> Result<Vec<u8>> {
    document.encode()
}

/// Provisional NRBF identification: a header tag at offset 0 and version
/// 1.0 at the standard offsets. Cheap enough for file pickers to probe with.
pub fn is_nrbf(bytes: &[u8]) -> bool {
    bytes.len() >= 17
        && bytes[0] == 0x00
        && bytes[9..17] == [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_check_needs_header_shape() {
        let mut bytes = vec![0u8; 17];
        bytes[9] = 0x01;
        assert!(is_nrbf(&bytes));

        assert!(!is_nrbf(&bytes[..16]));
        bytes[0] = 0x06;
        assert!(!is_nrbf(&bytes));
        bytes[0] = 0x00;
        bytes[10] = 0x01;
        assert!(!is_nrbf(&bytes));
    }
}
