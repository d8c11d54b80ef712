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

//! Locate-and-mutate editing. Every edit either fully commits or leaves the
//! document untouched; structural changes (adding members, resizing arrays)
//! are rejected.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::guid;
use crate::path::SlotRef;
use crate::records::{
    BinaryType, PrimitiveType, PrimitiveValue, Record, RecordHandle, Value,
};

impl Document {
    /// Replaces the primitive at `path`, coercing `value` to the slot's
    /// declared primitive type.
    pub fn set_primitive(&mut self, path: &str, value: PrimitiveValue) -> Result<()> {
        let slot = self
            .locate(path)
            .ok_or_else(|| Error::PathNotFound(path.to_string()))?;

        match self.slot_target(slot, path)? {
            EditTarget::Inline(target) => {
                let coerced = coerce(value, target)?;
                let place = self
                    .slot_value_mut(slot)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                *place = Value::Primitive(coerced);
            }
            EditTarget::PrimitiveRecord(handle) => {
                let Record::MemberPrimitiveTyped {
                    primitive_type,
                    value: stored,
                } = self.record_mut(handle)
                else {
                    return Err(Error::NotEditable(path.to_string()));
                };
                let coerced = coerce(value, *primitive_type)?;
                *stored = coerced;
            }
        }
        Ok(())
    }

    /// Replaces the contents of the `BinaryObjectString` at `path`, keeping
    /// its object id. Also accepts primitive-typed string members.
    pub fn set_string(&mut self, path: &str, new_value: &str) -> Result<()> {
        let (slot, value) = self
            .locate_value(path)
            .ok_or_else(|| Error::PathNotFound(path.to_string()))?;

        match value {
            Value::Primitive(PrimitiveValue::String(_)) => {
                let slot = slot.ok_or_else(|| Error::NotEditable(path.to_string()))?;
                let place = self
                    .slot_value_mut(slot)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                *place = Value::Primitive(PrimitiveValue::String(new_value.to_string()));
                Ok(())
            }
            other => {
                let resolved = self.resolve(&other)?;
                let Value::Record(handle) = resolved else {
                    return Err(Error::NotEditable(path.to_string()));
                };
                let Record::BinaryObjectString { value: stored, .. } = self.record_mut(handle)
                else {
                    return Err(Error::NotEditable(path.to_string()));
                };
                *stored = new_value.to_string();
                Ok(())
            }
        }
    }

    /// Recomputes the eleven fields of the `System.Guid` class record at
    /// `path` from GUID text.
    pub fn set_guid(&mut self, path: &str, guid_text: &str) -> Result<()> {
        let fields = guid::guid_fields(guid_text)?;
        let handle = self.guid_record_at(path)?;

        let Some(class) = self.record_mut(handle).as_class_mut() else {
            return Err(Error::NotEditable(path.to_string()));
        };
        let mut indices = [0usize; 11];
        for (i, name) in guid::GUID_MEMBERS.iter().enumerate() {
            indices[i] = class
                .member_index(name)
                .ok_or_else(|| Error::NotEditable(path.to_string()))?;
        }
        for (i, field) in fields.into_iter().enumerate() {
            class.member_values[indices[i]] = Value::Primitive(field);
        }
        Ok(())
    }

    /// Canonical text of the `System.Guid` record at `path`.
    pub fn guid_at(&self, path: &str) -> Option<String> {
        let value = self.get(path)?;
        let Value::Record(handle) = value else {
            return None;
        };
        guid::guid_text(self.record(handle).as_class()?)
    }

    fn guid_record_at(&self, path: &str) -> Result<RecordHandle> {
        let (_, value) = self
            .locate_value(path)
            .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
        let resolved = self.resolve(&value)?;
        let Value::Record(handle) = resolved else {
            return Err(Error::NotEditable(path.to_string()));
        };
        match self.record(handle).as_class() {
            Some(class) if guid::is_guid_class(class) => Ok(handle),
            _ => Err(Error::NotEditable(path.to_string())),
        }
    }

    /// What a primitive edit at `slot` writes to, and as which type.
    fn slot_target(&self, slot: SlotRef, path: &str) -> Result<EditTarget> {
        let value = self
            .slot_value(slot)
            .ok_or_else(|| Error::PathNotFound(path.to_string()))?;

        if let Value::Record(handle) = value {
            if matches!(self.record(*handle), Record::MemberPrimitiveTyped { .. }) {
                return Ok(EditTarget::PrimitiveRecord(*handle));
            }
            return Err(Error::NotEditable(path.to_string()));
        }
        if !matches!(value, Value::Primitive(_)) {
            return Err(Error::NotEditable(path.to_string()));
        }

        let declared = match slot {
            SlotRef::Member { record, index } => {
                let class = self
                    .record(record)
                    .as_class()
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                class
                    .member_type_info
                    .as_ref()
                    .and_then(|mti| mti.primitive_type_of(index))
            }
            SlotRef::Element { record, .. } => match self.record(record) {
                Record::ArraySinglePrimitive(array) => Some(array.primitive_type),
                Record::BinaryArray(array) if array.element_type == BinaryType::Primitive => {
                    array.element_primitive_type()
                }
                _ => None,
            },
        };

        // Untyped slots keep the type of the value they already hold.
        let target = declared.or_else(|| match value {
            Value::Primitive(p) => Some(p.primitive_type()),
            _ => None,
        });
        target
            .filter(|t| *t != PrimitiveType::Null)
            .map(EditTarget::Inline)
            .ok_or_else(|| Error::NotEditable(path.to_string()))
    }
}

enum EditTarget {
    Inline(PrimitiveType),
    PrimitiveRecord(RecordHandle),
}

/// Converts `value` to the declared type of a slot. Lossless numeric
/// widening/narrowing and text parsing only; anything lossy is a mismatch.
pub(crate) fn coerce(value: PrimitiveValue, target: PrimitiveType) -> Result<PrimitiveValue> {
    if value.primitive_type() == target {
        return Ok(value);
    }
    let mismatch = Error::TypeMismatch {
        expected: target.name().to_string(),
        actual: value.primitive_type().name().to_string(),
    };

    let coerced = match (&value, target) {
        (PrimitiveValue::String(s), _) => return coerce_from_text(s, target, mismatch),
        (_, PrimitiveType::Boolean) => match as_i128(&value) {
            Some(0) => Some(PrimitiveValue::Boolean(false)),
            Some(1) => Some(PrimitiveValue::Boolean(true)),
            _ => None,
        },
        (_, PrimitiveType::Byte) => int_to(&value, |n| u8::try_from(n).ok().map(PrimitiveValue::Byte)),
        (_, PrimitiveType::SByte) => int_to(&value, |n| i8::try_from(n).ok().map(PrimitiveValue::SByte)),
        (_, PrimitiveType::Int16) => int_to(&value, |n| i16::try_from(n).ok().map(PrimitiveValue::Int16)),
        (_, PrimitiveType::UInt16) => int_to(&value, |n| u16::try_from(n).ok().map(PrimitiveValue::UInt16)),
        (_, PrimitiveType::Int32) => int_to(&value, |n| i32::try_from(n).ok().map(PrimitiveValue::Int32)),
        (_, PrimitiveType::UInt32) => int_to(&value, |n| u32::try_from(n).ok().map(PrimitiveValue::UInt32)),
        (_, PrimitiveType::Int64) => int_to(&value, |n| i64::try_from(n).ok().map(PrimitiveValue::Int64)),
        (_, PrimitiveType::UInt64) => int_to(&value, |n| u64::try_from(n).ok().map(PrimitiveValue::UInt64)),
        (_, PrimitiveType::TimeSpan) => {
            int_to(&value, |n| i64::try_from(n).ok().map(PrimitiveValue::TimeSpan))
        }
        (_, PrimitiveType::DateTime) => {
            int_to(&value, |n| i64::try_from(n).ok().map(PrimitiveValue::DateTime))
        }
        (_, PrimitiveType::Single) => as_f64(&value).map(|f| PrimitiveValue::Single(f as f32)),
        (_, PrimitiveType::Double) => as_f64(&value).map(PrimitiveValue::Double),
        (PrimitiveValue::Char(c), PrimitiveType::String) => {
            Some(PrimitiveValue::String(c.to_string()))
        }
        _ => None,
    };
    coerced.ok_or(mismatch)
}

fn coerce_from_text(
    text: &str,
    target: PrimitiveType,
    mismatch: Error,
) -> Result<PrimitiveValue> {
    let parsed = match target {
        PrimitiveType::Boolean => match text {
            "true" | "True" | "1" => Some(PrimitiveValue::Boolean(true)),
            "false" | "False" | "0" => Some(PrimitiveValue::Boolean(false)),
            _ => None,
        },
        PrimitiveType::Byte => text.parse().ok().map(PrimitiveValue::Byte),
        PrimitiveType::SByte => text.parse().ok().map(PrimitiveValue::SByte),
        PrimitiveType::Int16 => text.parse().ok().map(PrimitiveValue::Int16),
        PrimitiveType::UInt16 => text.parse().ok().map(PrimitiveValue::UInt16),
        PrimitiveType::Int32 => text.parse().ok().map(PrimitiveValue::Int32),
        PrimitiveType::UInt32 => text.parse().ok().map(PrimitiveValue::UInt32),
        PrimitiveType::Int64 => text.parse().ok().map(PrimitiveValue::Int64),
        PrimitiveType::UInt64 => text.parse().ok().map(PrimitiveValue::UInt64),
        PrimitiveType::Single => text.parse().ok().map(PrimitiveValue::Single),
        PrimitiveType::Double => text.parse().ok().map(PrimitiveValue::Double),
        PrimitiveType::TimeSpan => text.parse().ok().map(PrimitiveValue::TimeSpan),
        PrimitiveType::DateTime => text.parse().ok().map(PrimitiveValue::DateTime),
        PrimitiveType::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(PrimitiveValue::Char(c)),
                _ => None,
            }
        }
        PrimitiveType::Decimal => {
            match hex::decode(text) {
                Ok(bytes) if bytes.len() == 16 => {
                    Some(PrimitiveValue::Decimal(text.to_ascii_lowercase()))
                }
                _ => None,
            }
        }
        PrimitiveType::String | PrimitiveType::Null => None,
    };
    parsed.ok_or(mismatch)
}

fn int_to(
    value: &PrimitiveValue,
    convert: impl FnOnce(i128) -> Option<PrimitiveValue>,
) -> Option<PrimitiveValue> {
    as_i128(value).and_then(convert)
}

fn as_i128(value: &PrimitiveValue) -> Option<i128> {
    match value {
        PrimitiveValue::Byte(v) => Some(*v as i128),
        PrimitiveValue::SByte(v) => Some(*v as i128),
        PrimitiveValue::Int16(v) => Some(*v as i128),
        PrimitiveValue::UInt16(v) => Some(*v as i128),
        PrimitiveValue::Int32(v) => Some(*v as i128),
        PrimitiveValue::UInt32(v) => Some(*v as i128),
        PrimitiveValue::Int64(v) => Some(*v as i128),
        PrimitiveValue::UInt64(v) => Some(*v as i128),
        PrimitiveValue::TimeSpan(v) => Some(*v as i128),
        PrimitiveValue::DateTime(v) => Some(*v as i128),
        _ => None,
    }
}

fn as_f64(value: &PrimitiveValue) -> Option<f64> {
    match value {
        PrimitiveValue::Single(v) => Some(*v as f64),
        PrimitiveValue::Double(v) => Some(*v),
        other => as_i128(other).map(|n| n as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_passes_through() {
        assert_eq!(
            coerce(PrimitiveValue::Int32(42), PrimitiveType::Int32).unwrap(),
            PrimitiveValue::Int32(42)
        );
    }

    #[test]
    fn widens_and_narrows_integers_exactly() {
        assert_eq!(
            coerce(PrimitiveValue::Int32(43), PrimitiveType::Int64).unwrap(),
            PrimitiveValue::Int64(43)
        );
        assert_eq!(
            coerce(PrimitiveValue::Int64(200), PrimitiveType::Byte).unwrap(),
            PrimitiveValue::Byte(200)
        );
        assert!(coerce(PrimitiveValue::Int32(300), PrimitiveType::Byte).is_err());
        assert!(coerce(PrimitiveValue::Int32(-1), PrimitiveType::UInt32).is_err());
    }

    #[test]
    fn parses_from_text() {
        assert_eq!(
            coerce(PrimitiveValue::String("-2.5".into()), PrimitiveType::Single).unwrap(),
            PrimitiveValue::Single(-2.5)
        );
        assert_eq!(
            coerce(PrimitiveValue::String("true".into()), PrimitiveType::Boolean).unwrap(),
            PrimitiveValue::Boolean(true)
        );
        assert!(coerce(PrimitiveValue::String("abc".into()), PrimitiveType::Int32).is_err());
    }

    #[test]
    fn floats_do_not_narrow_to_integers() {
        assert!(coerce(PrimitiveValue::Double(1.5), PrimitiveType::Int32).is_err());
    }
}
