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

//! `System.Guid` serializes as a class record with eleven members: `_a`
//! (Int32), `_b`/`_c` (Int16) and `_d` through `_k` (Byte). These map onto
//! the standard GUID field layout, so composition and decomposition go
//! through [`uuid::Uuid`].

use crate::error::{Error, Result};
use crate::records::{ClassRecord, PrimitiveValue, Value};
use uuid::Uuid;

pub const GUID_CLASS_NAME: &str = "System.Guid";

pub(crate) const GUID_MEMBERS: [&str; 11] = [
    "_a", "_b", "_c", "_d", "_e", "_f", "_g", "_h", "_i", "_j", "_k",
];

pub fn is_guid_class(class: &ClassRecord) -> bool {
    class.class_info.name == GUID_CLASS_NAME
}

/// Canonical 36-character lowercase text of a `System.Guid` class record.
/// `None` if the record does not carry the expected eleven fields.
pub fn guid_text(class: &ClassRecord) -> Option<String> {
    let a = match class.member("_a")? {
        Value::Primitive(PrimitiveValue::Int32(v)) => *v as u32,
        _ => return None,
    };
    let b = guid_short(class, "_b")?;
    let c = guid_short(class, "_c")?;
    let mut tail = [0u8; 8];
    for (i, name) in GUID_MEMBERS[3..].iter().enumerate() {
        tail[i] = match class.member(name)? {
            Value::Primitive(PrimitiveValue::Byte(v)) => *v,
            _ => return None,
        };
    }
    Some(Uuid::from_fields(a, b, c, &tail).hyphenated().to_string())
}

fn guid_short(class: &ClassRecord, name: &str) -> Option<u16> {
    match class.member(name)? {
        Value::Primitive(PrimitiveValue::Int16(v)) => Some(*v as u16),
        _ => None,
    }
}

/// Decomposes GUID text into the eleven member values, ordered `_a`..`_k`.
pub fn guid_fields(text: &str) -> Result<[PrimitiveValue; 11]> {
    let uuid = Uuid::parse_str(text).map_err(|_| Error::InvalidGuidFormat(text.to_string()))?;
    let (a, b, c, tail) = uuid.as_fields();
    Ok([
        PrimitiveValue::Int32(a as i32),
        PrimitiveValue::Int16(b as i16),
        PrimitiveValue::Int16(c as i16),
        PrimitiveValue::Byte(tail[0]),
        PrimitiveValue::Byte(tail[1]),
        PrimitiveValue::Byte(tail[2]),
        PrimitiveValue::Byte(tail[3]),
        PrimitiveValue::Byte(tail[4]),
        PrimitiveValue::Byte(tail[5]),
        PrimitiveValue::Byte(tail[6]),
        PrimitiveValue::Byte(tail[7]),
    ])
}
