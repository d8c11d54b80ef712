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

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    SerializedStreamHeader = 0,
    ClassWithId = 1,
    SystemClassWithMembers = 2,
    ClassWithMembers = 3,
    SystemClassWithMembersAndTypes = 4,
    ClassWithMembersAndTypes = 5,
    BinaryObjectString = 6,
    BinaryArray = 7,
    MemberPrimitiveTyped = 8,
    MemberReference = 9,
    ObjectNull = 10,
    MessageEnd = 11,
    BinaryLibrary = 12,
    ObjectNullMultiple256 = 13,
    ObjectNullMultiple = 14,
    ArraySinglePrimitive = 15,
    ArraySingleObject = 16,
    ArraySingleString = 17,
}

impl TryFrom<u8> for RecordType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> crate::error::Result<Self> {
        match value {
            0 => Ok(RecordType::SerializedStreamHeader),
            1 => Ok(RecordType::ClassWithId),
            2 => Ok(RecordType::SystemClassWithMembers),
            3 => Ok(RecordType::ClassWithMembers),
            4 => Ok(RecordType::SystemClassWithMembersAndTypes),
            5 => Ok(RecordType::ClassWithMembersAndTypes),
            6 => Ok(RecordType::BinaryObjectString),
            7 => Ok(RecordType::BinaryArray),
            8 => Ok(RecordType::MemberPrimitiveTyped),
            9 => Ok(RecordType::MemberReference),
            10 => Ok(RecordType::ObjectNull),
            11 => Ok(RecordType::MessageEnd),
            12 => Ok(RecordType::BinaryLibrary),
            13 => Ok(RecordType::ObjectNullMultiple256),
            14 => Ok(RecordType::ObjectNullMultiple),
            15 => Ok(RecordType::ArraySinglePrimitive),
            16 => Ok(RecordType::ArraySingleObject),
            17 => Ok(RecordType::ArraySingleString),
            _ => Err(crate::error::Error::InvalidRecordType(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryType {
    Primitive = 0,
    String = 1,
    Object = 2,
    SystemClass = 3,
    Class = 4,
    ObjectArray = 5,
    StringArray = 6,
    PrimitiveArray = 7,
}

impl TryFrom<u8> for BinaryType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> crate::error::Result<Self> {
        match value {
            0 => Ok(BinaryType::Primitive),
            1 => Ok(BinaryType::String),
            2 => Ok(BinaryType::Object),
            3 => Ok(BinaryType::SystemClass),
            4 => Ok(BinaryType::Class),
            5 => Ok(BinaryType::ObjectArray),
            6 => Ok(BinaryType::StringArray),
            7 => Ok(BinaryType::PrimitiveArray),
            _ => Err(crate::error::Error::InvalidBinaryType(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    Null = 17,
    String = 18,
}

impl TryFrom<u8> for PrimitiveType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> crate::error::Result<Self> {
        match value {
            1 => Ok(PrimitiveType::Boolean),
            2 => Ok(PrimitiveType::Byte),
            3 => Ok(PrimitiveType::Char),
            5 => Ok(PrimitiveType::Decimal),
            6 => Ok(PrimitiveType::Double),
            7 => Ok(PrimitiveType::Int16),
            8 => Ok(PrimitiveType::Int32),
            9 => Ok(PrimitiveType::Int64),
            10 => Ok(PrimitiveType::SByte),
            11 => Ok(PrimitiveType::Single),
            12 => Ok(PrimitiveType::TimeSpan),
            13 => Ok(PrimitiveType::DateTime),
            14 => Ok(PrimitiveType::UInt16),
            15 => Ok(PrimitiveType::UInt32),
            16 => Ok(PrimitiveType::UInt64),
            17 => Ok(PrimitiveType::Null),
            18 => Ok(PrimitiveType::String),
            _ => Err(crate::error::Error::InvalidPrimitiveType(value)),
        }
    }
}

impl PrimitiveType {
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Byte => "Byte",
            PrimitiveType::Char => "Char",
            PrimitiveType::Decimal => "Decimal",
            PrimitiveType::Double => "Double",
            PrimitiveType::Int16 => "Int16",
            PrimitiveType::Int32 => "Int32",
            PrimitiveType::Int64 => "Int64",
            PrimitiveType::SByte => "SByte",
            PrimitiveType::Single => "Single",
            PrimitiveType::TimeSpan => "TimeSpan",
            PrimitiveType::DateTime => "DateTime",
            PrimitiveType::UInt16 => "UInt16",
            PrimitiveType::UInt32 => "UInt32",
            PrimitiveType::UInt64 => "UInt64",
            PrimitiveType::Null => "Null",
            PrimitiveType::String => "String",
        }
    }
}

/// Array shape byte of a BinaryArray record. The offset variants carry a
/// lower-bound vector on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryArrayType {
    Single = 0,
    Jagged = 1,
    Rectangular = 2,
    SingleOffset = 3,
    JaggedOffset = 4,
    RectangularOffset = 5,
}

impl TryFrom<u8> for BinaryArrayType {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> crate::error::Result<Self> {
        match value {
            0 => Ok(BinaryArrayType::Single),
            1 => Ok(BinaryArrayType::Jagged),
            2 => Ok(BinaryArrayType::Rectangular),
            3 => Ok(BinaryArrayType::SingleOffset),
            4 => Ok(BinaryArrayType::JaggedOffset),
            5 => Ok(BinaryArrayType::RectangularOffset),
            _ => Err(crate::error::Error::InvalidArrayType(value)),
        }
    }
}

impl BinaryArrayType {
    pub fn has_lower_bounds(self) -> bool {
        matches!(
            self,
            BinaryArrayType::SingleOffset
                | BinaryArrayType::JaggedOffset
                | BinaryArrayType::RectangularOffset
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializationHeader {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryLibrary {
    pub library_id: i32,
    pub library_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub object_id: i32,
    pub name: String,
    pub member_count: i32,
    pub member_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberTypeInfo {
    pub binary_types: Vec<BinaryType>,
    pub additional_infos: Vec<AdditionalTypeInfo>,
}

impl MemberTypeInfo {
    /// The declared primitive type of member `index`, if that member is
    /// primitive-typed.
    pub fn primitive_type_of(&self, index: usize) -> Option<PrimitiveType> {
        match self.additional_infos.get(index) {
            Some(AdditionalTypeInfo::Primitive(pt)) => Some(*pt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdditionalTypeInfo {
    Primitive(PrimitiveType),
    SystemClass(String),
    Class(ClassTypeInfo),
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassTypeInfo {
    pub type_name: String,
    pub library_id: i32,
}

/// Index of a record inside a document's arena. Handles are only meaningful
/// for the document that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle(pub(crate) usize);

impl RecordHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One member or array slot. References are kept symbolic; the referent is
/// looked up through the document on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Primitive(PrimitiveValue),
    Null,
    Record(RecordHandle),
    Reference(i32),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(u8),
    Char(char),
    /// 16 raw bytes carried as a 32-character hex fingerprint.
    Decimal(String),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    /// Raw ticks, not interpreted.
    TimeSpan(i64),
    /// Raw ticks, not interpreted.
    DateTime(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    String(String),
    Null,
}

impl PrimitiveValue {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveType::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveType::Byte,
            PrimitiveValue::Char(_) => PrimitiveType::Char,
            PrimitiveValue::Decimal(_) => PrimitiveType::Decimal,
            PrimitiveValue::Double(_) => PrimitiveType::Double,
            PrimitiveValue::Int16(_) => PrimitiveType::Int16,
            PrimitiveValue::Int32(_) => PrimitiveType::Int32,
            PrimitiveValue::Int64(_) => PrimitiveType::Int64,
            PrimitiveValue::SByte(_) => PrimitiveType::SByte,
            PrimitiveValue::Single(_) => PrimitiveType::Single,
            PrimitiveValue::TimeSpan(_) => PrimitiveType::TimeSpan,
            PrimitiveValue::DateTime(_) => PrimitiveType::DateTime,
            PrimitiveValue::UInt16(_) => PrimitiveType::UInt16,
            PrimitiveValue::UInt32(_) => PrimitiveType::UInt32,
            PrimitiveValue::UInt64(_) => PrimitiveType::UInt64,
            PrimitiveValue::String(_) => PrimitiveType::String,
            PrimitiveValue::Null => PrimitiveType::Null,
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Boolean(v) => write!(f, "{}", v),
            PrimitiveValue::Byte(v) => write!(f, "{}", v),
            PrimitiveValue::Char(v) => write!(f, "{}", v),
            PrimitiveValue::Decimal(v) => write!(f, "{}", v),
            PrimitiveValue::Double(v) => write!(f, "{}", v),
            PrimitiveValue::Int16(v) => write!(f, "{}", v),
            PrimitiveValue::Int32(v) => write!(f, "{}", v),
            PrimitiveValue::Int64(v) => write!(f, "{}", v),
            PrimitiveValue::SByte(v) => write!(f, "{}", v),
            PrimitiveValue::Single(v) => write!(f, "{}", v),
            PrimitiveValue::TimeSpan(v) => write!(f, "{}", v),
            PrimitiveValue::DateTime(v) => write!(f, "{}", v),
            PrimitiveValue::UInt16(v) => write!(f, "{}", v),
            PrimitiveValue::UInt32(v) => write!(f, "{}", v),
            PrimitiveValue::UInt64(v) => write!(f, "{}", v),
            PrimitiveValue::String(v) => write!(f, "{}", v),
            PrimitiveValue::Null => write!(f, "null"),
        }
    }
}

/// A run of nulls that occupied several consecutive slots on the wire as a
/// single ObjectNullMultiple / ObjectNullMultiple256 record. `start` indexes
/// into the expanded slot list; re-encoding emits the original record form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NullRun {
    pub start: usize,
    pub count: i32,
    /// true for the i32-count form, false for the single-byte form.
    pub wide: bool,
}

/// Any of the five class record kinds, unified. `wire_kind` remembers which
/// kind the record was decoded as so encoding reproduces the original choice
/// of inline metadata vs. ClassWithId reuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRecord {
    pub class_info: ClassInfo,
    pub member_type_info: Option<MemberTypeInfo>,
    pub library_id: Option<i32>,
    pub wire_kind: RecordType,
    /// Set only when `wire_kind` is ClassWithId.
    pub metadata_id: Option<i32>,
    /// One slot per member, ordered as `class_info.member_names`.
    pub member_values: Vec<Value>,
    pub null_runs: Vec<NullRun>,
}

impl ClassRecord {
    pub fn object_id(&self) -> i32 {
        self.class_info.object_id
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.class_info
            .name_iter()
            .zip(self.member_values.iter())
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.class_info.member_names.iter().position(|n| n == name)
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        self.member_index(name).map(|i| &self.member_values[i])
    }
}

impl ClassInfo {
    fn name_iter(&self) -> impl Iterator<Item = &str> {
        self.member_names.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryArrayRecord {
    pub object_id: i32,
    pub array_type: BinaryArrayType,
    pub rank: i32,
    pub lengths: Vec<i32>,
    pub lower_bounds: Option<Vec<i32>>,
    pub element_type: BinaryType,
    pub additional_type_info: AdditionalTypeInfo,
    pub element_values: Vec<Value>,
    pub null_runs: Vec<NullRun>,
}

impl BinaryArrayRecord {
    pub fn total_elements(&self) -> i64 {
        self.lengths.iter().map(|l| *l as i64).product()
    }

    pub fn element_primitive_type(&self) -> Option<PrimitiveType> {
        match &self.additional_type_info {
            AdditionalTypeInfo::Primitive(pt) => Some(*pt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySinglePrimitiveRecord {
    pub object_id: i32,
    pub length: i32,
    pub primitive_type: PrimitiveType,
    /// Always `Value::Primitive` slots of `primitive_type`.
    pub element_values: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySingleObjectRecord {
    pub object_id: i32,
    pub length: i32,
    pub element_values: Vec<Value>,
    pub null_runs: Vec<NullRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySingleStringRecord {
    pub object_id: i32,
    pub length: i32,
    pub element_values: Vec<Value>,
    pub null_runs: Vec<NullRun>,
}

/// One decoded record. The framing header and MessageEnd never appear here;
/// they are carried by the document itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record {
    Class(ClassRecord),
    BinaryObjectString {
        object_id: i32,
        value: String,
    },
    BinaryArray(BinaryArrayRecord),
    ArraySinglePrimitive(ArraySinglePrimitiveRecord),
    ArraySingleObject(ArraySingleObjectRecord),
    ArraySingleString(ArraySingleStringRecord),
    BinaryLibrary(BinaryLibrary),
    MemberPrimitiveTyped {
        primitive_type: PrimitiveType,
        value: PrimitiveValue,
    },
    MemberReference {
        id_ref: i32,
    },
    ObjectNull,
    ObjectNullMultiple {
        null_count: i32,
    },
    ObjectNullMultiple256 {
        null_count: u8,
    },
}

impl Record {
    /// The object id this record registers in the identity map, if any.
    /// Library ids live in the library map, not here.
    pub fn object_id(&self) -> Option<i32> {
        match self {
            Record::Class(c) => Some(c.object_id()),
            Record::BinaryObjectString { object_id, .. } => Some(*object_id),
            Record::BinaryArray(a) => Some(a.object_id),
            Record::ArraySinglePrimitive(a) => Some(a.object_id),
            Record::ArraySingleObject(a) => Some(a.object_id),
            Record::ArraySingleString(a) => Some(a.object_id),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassRecord> {
        match self {
            Record::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassRecord> {
        match self {
            Record::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Record::BinaryArray(_)
                | Record::ArraySinglePrimitive(_)
                | Record::ArraySingleObject(_)
                | Record::ArraySingleString(_)
        )
    }

    /// Expanded element slots for the four array kinds.
    pub fn element_values(&self) -> Option<&[Value]> {
        match self {
            Record::BinaryArray(a) => Some(&a.element_values),
            Record::ArraySinglePrimitive(a) => Some(&a.element_values),
            Record::ArraySingleObject(a) => Some(&a.element_values),
            Record::ArraySingleString(a) => Some(&a.element_values),
            _ => None,
        }
    }

    pub fn element_values_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Record::BinaryArray(a) => Some(&mut a.element_values),
            Record::ArraySinglePrimitive(a) => Some(&mut a.element_values),
            Record::ArraySingleObject(a) => Some(&mut a.element_values),
            Record::ArraySingleString(a) => Some(&mut a.element_values),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_tags_round_trip() {
        for tag in 0u8..=17 {
            let rt = RecordType::try_from(tag).unwrap();
            assert_eq!(rt as u8, tag);
        }
        assert!(RecordType::try_from(18).is_err());
        assert!(RecordType::try_from(21).is_err());
    }

    #[test]
    fn primitive_type_tag_four_is_unassigned() {
        assert!(PrimitiveType::try_from(4).is_err());
        for tag in [1u8, 2, 3, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18] {
            let pt = PrimitiveType::try_from(tag).unwrap();
            assert_eq!(pt as u8, tag);
        }
    }

    #[test]
    fn array_type_lower_bounds() {
        assert!(!BinaryArrayType::Single.has_lower_bounds());
        assert!(!BinaryArrayType::Rectangular.has_lower_bounds());
        assert!(BinaryArrayType::SingleOffset.has_lower_bounds());
        assert!(BinaryArrayType::RectangularOffset.has_lower_bounds());
        assert!(BinaryArrayType::try_from(6).is_err());
    }

    #[test]
    fn class_record_member_lookup() {
        let class = ClassRecord {
            class_info: ClassInfo {
                object_id: 1,
                name: "Player".into(),
                member_count: 2,
                member_names: vec!["Name".into(), "Level".into()],
            },
            member_type_info: None,
            library_id: None,
            wire_kind: RecordType::SystemClassWithMembers,
            metadata_id: None,
            member_values: vec![
                Value::Reference(7),
                Value::Primitive(PrimitiveValue::Int32(3)),
            ],
            null_runs: Vec::new(),
        };
        assert_eq!(class.member_index("Level"), Some(1));
        assert!(matches!(
            class.member("Level"),
            Some(Value::Primitive(PrimitiveValue::Int32(3)))
        ));
        assert!(class.member("Score").is_none());
        let names: Vec<&str> = class.members().map(|(n, _)| n).collect();
        assert_eq!(names, ["Name", "Level"]);
    }

    #[test]
    fn primitive_display_is_canonical() {
        assert_eq!(PrimitiveValue::Boolean(true).to_string(), "true");
        assert_eq!(PrimitiveValue::Int32(1000).to_string(), "1000");
        assert_eq!(PrimitiveValue::Null.to_string(), "null");
        assert_eq!(
            PrimitiveValue::Decimal("000102030405060708090a0b0c0d0e0f".into()).to_string(),
            "000102030405060708090a0b0c0d0e0f"
        );
    }
}
