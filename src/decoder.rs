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

use crate::document::Document;
use crate::error::{Error, Result};
use crate::records::*;
use log::debug;
use std::collections::HashMap;
use std::io::Read;

/// Default ceiling on the number of records in one stream.
pub const DEFAULT_MAX_RECORDS: usize = 100_000;

#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Abort with `RecordBudgetExceeded` past this many records.
    pub max_records: usize,
    /// Read Char as a two-byte UTF-16 code unit instead of one raw byte.
    pub wide_chars: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            wide_chars: false,
        }
    }
}

/// Metadata shape shared between a defining class record and the ClassWithId
/// records that reuse it.
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    pub class_info: ClassInfo,
    pub member_type_info: Option<MemberTypeInfo>,
    pub library_id: Option<i32>,
}

/// A decoder for MS-NRBF binary streams. Consumes the reader and produces a
/// [`Document`] owning the full record graph.
pub struct Decoder<R: Read> {
    reader: R,
    options: DecodeOptions,
    arena: Vec<Record>,
    order: Vec<RecordHandle>,
    objects: HashMap<i32, RecordHandle>,
    metadata: HashMap<i32, ClassMetadata>,
    libraries: HashMap<i32, String>,
    record_count: usize,
    /// Current offset in the stream.
    pub offset: usize,
}

/// One decoded member or element position. A null run covers several
/// consecutive positions with a single wire record.
enum Slot {
    Value(Value),
    NullRun { count: i32, wide: bool },
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, DecodeOptions::default())
    }

    pub fn with_options(reader: R, options: DecodeOptions) -> Self {
        Self {
            reader,
            options,
            arena: Vec::new(),
            order: Vec::new(),
            objects: HashMap::new(),
            metadata: HashMap::new(),
            libraries: HashMap::new(),
            record_count: 0,
            offset: 0,
        }
    }

    /// Decodes the whole stream: framing header, every record up to
    /// MessageEnd, and the root lookup.
    pub fn decode(mut self) -> Result<Document> {
        let tag = match self.read_u8() {
            Ok(tag) => tag,
            Err(Error::UnexpectedEof) => return Err(Error::BadHeader),
            Err(e) => return Err(e),
        };
        if tag != RecordType::SerializedStreamHeader as u8 {
            return Err(Error::BadHeader);
        }
        let header = self.read_serialization_header()?;
        debug!(
            "stream header: root={} header={} version={}.{}",
            header.root_id, header.header_id, header.major_version, header.minor_version
        );

        loop {
            let tag = self.read_u8()?;
            let record_type = RecordType::try_from(tag)?;
            match record_type {
                RecordType::MessageEnd => break,
                RecordType::SerializedStreamHeader => return Err(Error::BadHeader),
                _ => {
                    let handle = self.read_record(record_type)?;
                    self.order.push(handle);
                }
            }
        }

        let root = self
            .objects
            .get(&header.root_id)
            .copied()
            .ok_or(Error::RootNotFound(header.root_id))?;
        debug!(
            "decoded {} records, {} objects, {} libraries",
            self.record_count,
            self.objects.len(),
            self.libraries.len()
        );

        Ok(Document::from_parts(
            header,
            self.arena,
            self.order,
            self.objects,
            self.metadata,
            self.libraries,
            root,
            self.options.wide_chars,
        ))
    }

    fn bump_budget(&mut self) -> Result<()> {
        self.record_count += 1;
        if self.record_count > self.options.max_records {
            return Err(Error::RecordBudgetExceeded);
        }
        Ok(())
    }

    fn reserve(&mut self) -> RecordHandle {
        let handle = RecordHandle(self.arena.len());
        self.arena.push(Record::ObjectNull);
        handle
    }

    fn commit(&mut self, handle: RecordHandle, record: Record) {
        self.arena[handle.0] = record;
    }

    fn push(&mut self, record: Record) -> RecordHandle {
        let handle = RecordHandle(self.arena.len());
        self.arena.push(record);
        handle
    }

    fn register_object(&mut self, object_id: i32, handle: RecordHandle) -> Result<()> {
        if self.objects.insert(object_id, handle).is_some() {
            return Err(Error::DuplicateObjectId(object_id));
        }
        Ok(())
    }

    /// Reads one full record, registering identities and metadata as it goes.
    /// The caller has already consumed and dispatched the tag byte.
    fn read_record(&mut self, record_type: RecordType) -> Result<RecordHandle> {
        self.bump_budget()?;
        debug!("record {:?} at offset {}", record_type, self.offset - 1);
        match record_type {
            RecordType::ClassWithId
            | RecordType::SystemClassWithMembers
            | RecordType::ClassWithMembers
            | RecordType::SystemClassWithMembersAndTypes
            | RecordType::ClassWithMembersAndTypes => self.read_class_record(record_type),
            RecordType::BinaryObjectString => {
                let object_id = self.read_i32()?;
                let value = self.read_length_prefixed_string()?;
                let handle = self.push(Record::BinaryObjectString { object_id, value });
                self.register_object(object_id, handle)?;
                Ok(handle)
            }
            RecordType::BinaryArray => self.read_binary_array(),
            RecordType::ArraySinglePrimitive => self.read_array_single_primitive(),
            RecordType::ArraySingleObject => self.read_array_single_object(),
            RecordType::ArraySingleString => self.read_array_single_string(),
            RecordType::BinaryLibrary => {
                let library_id = self.read_i32()?;
                let library_name = self.read_length_prefixed_string()?;
                self.libraries.insert(library_id, library_name.clone());
                Ok(self.push(Record::BinaryLibrary(BinaryLibrary {
                    library_id,
                    library_name,
                })))
            }
            RecordType::MemberPrimitiveTyped => {
                let primitive_type = PrimitiveType::try_from(self.read_u8()?)?;
                let value = self.read_primitive_value(primitive_type)?;
                Ok(self.push(Record::MemberPrimitiveTyped {
                    primitive_type,
                    value,
                }))
            }
            RecordType::MemberReference => {
                let id_ref = self.read_i32()?;
                Ok(self.push(Record::MemberReference { id_ref }))
            }
            RecordType::ObjectNull => Ok(self.push(Record::ObjectNull)),
            RecordType::ObjectNullMultiple256 => {
                let null_count = self.read_u8()?;
                Ok(self.push(Record::ObjectNullMultiple256 { null_count }))
            }
            RecordType::ObjectNullMultiple => {
                let null_count = self.read_i32()?;
                Ok(self.push(Record::ObjectNullMultiple { null_count }))
            }
            RecordType::SerializedStreamHeader => Err(Error::BadHeader),
            RecordType::MessageEnd => Err(Error::UnexpectedEof),
        }
    }

    fn read_class_record(&mut self, kind: RecordType) -> Result<RecordHandle> {
        if kind == RecordType::ClassWithId {
            let object_id = self.read_i32()?;
            let metadata_id = self.read_i32()?;
            let meta = self
                .metadata
                .get(&metadata_id)
                .cloned()
                .ok_or(Error::UnknownMetadataId(metadata_id))?;

            let handle = self.reserve();
            self.register_object(object_id, handle)?;
            let (member_values, null_runs) =
                self.read_member_values(&meta.class_info, meta.member_type_info.as_ref())?;

            let mut class_info = meta.class_info;
            class_info.object_id = object_id;
            self.commit(
                handle,
                Record::Class(ClassRecord {
                    class_info,
                    member_type_info: meta.member_type_info,
                    library_id: meta.library_id,
                    wire_kind: kind,
                    metadata_id: Some(metadata_id),
                    member_values,
                    null_runs,
                }),
            );
            return Ok(handle);
        }

        let class_info = self.read_class_info()?;
        let member_type_info = match kind {
            RecordType::SystemClassWithMembersAndTypes | RecordType::ClassWithMembersAndTypes => {
                Some(self.read_member_type_info(class_info.member_count)?)
            }
            _ => None,
        };
        let library_id = match kind {
            RecordType::ClassWithMembers | RecordType::ClassWithMembersAndTypes => {
                Some(self.read_i32()?)
            }
            _ => None,
        };

        // Registered before the member values so a nested ClassWithId can
        // already refer back to this shape.
        self.metadata.insert(
            class_info.object_id,
            ClassMetadata {
                class_info: class_info.clone(),
                member_type_info: member_type_info.clone(),
                library_id,
            },
        );

        let handle = self.reserve();
        self.register_object(class_info.object_id, handle)?;
        let (member_values, null_runs) =
            self.read_member_values(&class_info, member_type_info.as_ref())?;

        self.commit(
            handle,
            Record::Class(ClassRecord {
                class_info,
                member_type_info,
                library_id,
                wire_kind: kind,
                metadata_id: None,
                member_values,
                null_runs,
            }),
        );
        Ok(handle)
    }

    fn read_binary_array(&mut self) -> Result<RecordHandle> {
        let object_id = self.read_i32()?;
        let array_type = BinaryArrayType::try_from(self.read_u8()?)?;
        let rank = self.read_i32()?;
        let rank_count = rank.max(0) as usize;
        let mut lengths = Vec::with_capacity(rank_count.min(64));
        for _ in 0..rank_count {
            lengths.push(self.read_i32()?);
        }

        let mut lower_bounds = None;
        if array_type.has_lower_bounds() {
            let mut bounds = Vec::with_capacity(rank_count.min(64));
            for _ in 0..rank_count {
                bounds.push(self.read_i32()?);
            }
            lower_bounds = Some(bounds);
        }

        let element_type = BinaryType::try_from(self.read_u8()?)?;
        let additional_type_info = self.read_additional_type_info(element_type)?;

        let total: i64 = lengths.iter().map(|l| *l as i64).product();
        if total < 0 || total > i32::MAX as i64 {
            return Err(Error::InconsistentArrayLength {
                declared: total as i32,
                actual: 0,
            });
        }

        let handle = self.reserve();
        self.register_object(object_id, handle)?;
        let (element_values, null_runs) =
            self.read_elements(total as usize, element_type, &additional_type_info)?;

        self.commit(
            handle,
            Record::BinaryArray(BinaryArrayRecord {
                object_id,
                array_type,
                rank,
                lengths,
                lower_bounds,
                element_type,
                additional_type_info,
                element_values,
                null_runs,
            }),
        );
        Ok(handle)
    }

    fn read_array_single_primitive(&mut self) -> Result<RecordHandle> {
        let object_id = self.read_i32()?;
        let length = self.read_i32()?;
        if length < 0 {
            return Err(Error::InconsistentArrayLength {
                declared: length,
                actual: 0,
            });
        }
        let primitive_type = PrimitiveType::try_from(self.read_u8()?)?;
        let count = length as usize;
        let mut element_values = Vec::with_capacity(count.min(65_536));
        for _ in 0..count {
            let value = self.read_primitive_value(primitive_type)?;
            element_values.push(Value::Primitive(value));
        }
        let handle = self.push(Record::ArraySinglePrimitive(ArraySinglePrimitiveRecord {
            object_id,
            length,
            primitive_type,
            element_values,
        }));
        self.register_object(object_id, handle)?;
        Ok(handle)
    }

    fn read_array_single_object(&mut self) -> Result<RecordHandle> {
        let object_id = self.read_i32()?;
        let length = self.read_i32()?;
        if length < 0 {
            return Err(Error::InconsistentArrayLength {
                declared: length,
                actual: 0,
            });
        }
        let handle = self.reserve();
        self.register_object(object_id, handle)?;
        let (element_values, null_runs) =
            self.read_elements(length as usize, BinaryType::Object, &AdditionalTypeInfo::None)?;
        self.commit(
            handle,
            Record::ArraySingleObject(ArraySingleObjectRecord {
                object_id,
                length,
                element_values,
                null_runs,
            }),
        );
        Ok(handle)
    }

    fn read_array_single_string(&mut self) -> Result<RecordHandle> {
        let object_id = self.read_i32()?;
        let length = self.read_i32()?;
        if length < 0 {
            return Err(Error::InconsistentArrayLength {
                declared: length,
                actual: 0,
            });
        }
        let handle = self.reserve();
        self.register_object(object_id, handle)?;
        let (element_values, null_runs) =
            self.read_elements(length as usize, BinaryType::String, &AdditionalTypeInfo::None)?;
        self.commit(
            handle,
            Record::ArraySingleString(ArraySingleStringRecord {
                object_id,
                length,
                element_values,
                null_runs,
            }),
        );
        Ok(handle)
    }

    /// Reads exactly `class_info.member_count` member positions. Typed
    /// members read primitives inline; everything else reads nested records.
    fn read_member_values(
        &mut self,
        class_info: &ClassInfo,
        member_type_info: Option<&MemberTypeInfo>,
    ) -> Result<(Vec<Value>, Vec<NullRun>)> {
        let count = class_info.member_count.max(0) as usize;
        let mut values = Vec::with_capacity(count.min(1024));
        let mut runs = Vec::new();
        while values.len() < count {
            let slot = match member_type_info {
                Some(mti) => {
                    let i = values.len();
                    self.read_member_slot(mti.binary_types[i], &mti.additional_infos[i])?
                }
                None => self.read_nested_slot()?,
            };
            expand_slot(slot, &mut values, &mut runs, count)?;
        }
        Ok((values, runs))
    }

    /// Reads exactly `total` array element positions, expanding null runs.
    fn read_elements(
        &mut self,
        total: usize,
        element_type: BinaryType,
        additional_info: &AdditionalTypeInfo,
    ) -> Result<(Vec<Value>, Vec<NullRun>)> {
        let mut values = Vec::with_capacity(total.min(65_536));
        let mut runs = Vec::new();
        while values.len() < total {
            let slot = self.read_member_slot(element_type, additional_info)?;
            expand_slot(slot, &mut values, &mut runs, total)?;
        }
        Ok((values, runs))
    }

    fn read_member_slot(
        &mut self,
        binary_type: BinaryType,
        additional_info: &AdditionalTypeInfo,
    ) -> Result<Slot> {
        match binary_type {
            BinaryType::Primitive => {
                let AdditionalTypeInfo::Primitive(pt) = additional_info else {
                    return Err(Error::MissingTypeInfo("<primitive member>".into()));
                };
                let value = self.read_primitive_value(*pt)?;
                Ok(Slot::Value(Value::Primitive(value)))
            }
            _ => self.read_nested_slot(),
        }
    }

    /// Reads the record occupying one member or element position. Null and
    /// reference forms stay inline values; everything else lands in the arena.
    fn read_nested_slot(&mut self) -> Result<Slot> {
        let tag = self.read_u8()?;
        let record_type = RecordType::try_from(tag)?;
        match record_type {
            RecordType::ObjectNull => {
                self.bump_budget()?;
                Ok(Slot::Value(Value::Null))
            }
            RecordType::ObjectNullMultiple256 => {
                self.bump_budget()?;
                let null_count = self.read_u8()?;
                Ok(Slot::NullRun {
                    count: null_count as i32,
                    wide: false,
                })
            }
            RecordType::ObjectNullMultiple => {
                self.bump_budget()?;
                let null_count = self.read_i32()?;
                Ok(Slot::NullRun {
                    count: null_count,
                    wide: true,
                })
            }
            RecordType::MemberReference => {
                self.bump_budget()?;
                let id_ref = self.read_i32()?;
                Ok(Slot::Value(Value::Reference(id_ref)))
            }
            RecordType::SerializedStreamHeader => Err(Error::BadHeader),
            RecordType::MessageEnd => Err(Error::UnexpectedEof),
            _ => {
                let handle = self.read_record(record_type)?;
                Ok(Slot::Value(Value::Record(handle)))
            }
        }
    }

    fn read_serialization_header(&mut self) -> Result<SerializationHeader> {
        Ok(SerializationHeader {
            root_id: self.read_i32()?,
            header_id: self.read_i32()?,
            major_version: self.read_i32()?,
            minor_version: self.read_i32()?,
        })
    }

    fn read_class_info(&mut self) -> Result<ClassInfo> {
        let object_id = self.read_i32()?;
        let name = self.read_length_prefixed_string()?;
        let member_count = self.read_i32()?;
        let count = member_count.max(0) as usize;
        let mut member_names = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            member_names.push(self.read_length_prefixed_string()?);
        }
        Ok(ClassInfo {
            object_id,
            name,
            member_count,
            member_names,
        })
    }

    fn read_member_type_info(&mut self, count: i32) -> Result<MemberTypeInfo> {
        let count = count.max(0) as usize;
        let mut binary_types = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            binary_types.push(BinaryType::try_from(self.read_u8()?)?);
        }

        let mut additional_infos = Vec::with_capacity(count.min(1024));
        for i in 0..count {
            additional_infos.push(self.read_additional_type_info(binary_types[i])?);
        }

        Ok(MemberTypeInfo {
            binary_types,
            additional_infos,
        })
    }

    fn read_additional_type_info(&mut self, binary_type: BinaryType) -> Result<AdditionalTypeInfo> {
        Ok(match binary_type {
            BinaryType::Primitive | BinaryType::PrimitiveArray => {
                AdditionalTypeInfo::Primitive(PrimitiveType::try_from(self.read_u8()?)?)
            }
            BinaryType::SystemClass => {
                AdditionalTypeInfo::SystemClass(self.read_length_prefixed_string()?)
            }
            BinaryType::Class => AdditionalTypeInfo::Class(ClassTypeInfo {
                type_name: self.read_length_prefixed_string()?,
                library_id: self.read_i32()?,
            }),
            _ => AdditionalTypeInfo::None,
        })
    }

    fn read_primitive_value(&mut self, pt: PrimitiveType) -> Result<PrimitiveValue> {
        match pt {
            PrimitiveType::Boolean => Ok(PrimitiveValue::Boolean(self.read_u8()? != 0)),
            PrimitiveType::Byte => Ok(PrimitiveValue::Byte(self.read_u8()?)),
            PrimitiveType::Char => {
                if self.options.wide_chars {
                    let unit = u16::from_le_bytes(self.read_bytes::<2>()?);
                    let c = char::from_u32(unit as u32).ok_or(Error::MalformedString)?;
                    Ok(PrimitiveValue::Char(c))
                } else {
                    let b = self.read_u8()?;
                    Ok(PrimitiveValue::Char(b as char))
                }
            }
            PrimitiveType::Decimal => {
                let raw = self.read_bytes::<16>()?;
                Ok(PrimitiveValue::Decimal(hex::encode(raw)))
            }
            PrimitiveType::Double => Ok(PrimitiveValue::Double(f64::from_le_bytes(
                self.read_bytes::<8>()?,
            ))),
            PrimitiveType::Int16 => Ok(PrimitiveValue::Int16(i16::from_le_bytes(
                self.read_bytes::<2>()?,
            ))),
            PrimitiveType::Int32 => Ok(PrimitiveValue::Int32(self.read_i32()?)),
            PrimitiveType::Int64 => Ok(PrimitiveValue::Int64(i64::from_le_bytes(
                self.read_bytes::<8>()?,
            ))),
            PrimitiveType::SByte => Ok(PrimitiveValue::SByte(self.read_u8()? as i8)),
            PrimitiveType::Single => Ok(PrimitiveValue::Single(f32::from_le_bytes(
                self.read_bytes::<4>()?,
            ))),
            PrimitiveType::TimeSpan => Ok(PrimitiveValue::TimeSpan(i64::from_le_bytes(
                self.read_bytes::<8>()?,
            ))),
            PrimitiveType::DateTime => Ok(PrimitiveValue::DateTime(i64::from_le_bytes(
                self.read_bytes::<8>()?,
            ))),
            PrimitiveType::UInt16 => Ok(PrimitiveValue::UInt16(u16::from_le_bytes(
                self.read_bytes::<2>()?,
            ))),
            PrimitiveType::UInt32 => Ok(PrimitiveValue::UInt32(u32::from_le_bytes(
                self.read_bytes::<4>()?,
            ))),
            PrimitiveType::UInt64 => Ok(PrimitiveValue::UInt64(u64::from_le_bytes(
                self.read_bytes::<8>()?,
            ))),
            PrimitiveType::String => {
                Ok(PrimitiveValue::String(self.read_length_prefixed_string()?))
            }
            PrimitiveType::Null => Ok(PrimitiveValue::Null),
        }
    }

    fn read_length_prefixed_string(&mut self) -> Result<String> {
        let length = self.read_variable_length_int()?;
        if length < 0 {
            return Err(Error::InvalidStringLength(length));
        }
        if length == 0 {
            return Ok(String::new());
        }
        let mut buf = vec![0u8; length as usize];
        self.reader.read_exact(&mut buf)?;
        self.offset += length as usize;
        String::from_utf8(buf).map_err(|_| Error::MalformedString)
    }

    /// 7-bit variable-length int, at most 5 bytes. The 5th byte may only
    /// carry the top 3 bits of a 31-bit value.
    fn read_variable_length_int(&mut self) -> Result<i32> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            let b = self.read_u8()?;
            if shift == 28 && b > 0x07 {
                return Err(Error::VarIntOverflow);
            }
            value |= u32::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(Error::VarIntOverflow);
            }
        }
        Ok(value as i32)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes::<1>()?[0])
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_bytes::<4>()?))
    }

    fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf)?;
        self.offset += N;
        Ok(buf)
    }
}

fn expand_slot(
    slot: Slot,
    values: &mut Vec<Value>,
    runs: &mut Vec<NullRun>,
    capacity: usize,
) -> Result<()> {
    match slot {
        Slot::Value(v) => values.push(v),
        Slot::NullRun { count, wide } => {
            if count < 0 || values.len() + count as usize > capacity {
                return Err(Error::InconsistentArrayLength {
                    declared: capacity as i32,
                    actual: values.len() + count.max(0) as usize,
                });
            }
            runs.push(NullRun {
                start: values.len(),
                count,
                wide,
            });
            for _ in 0..count {
                values.push(Value::Null);
            }
        }
    }
    Ok(())
}
