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
use std::collections::HashSet;
use std::io::Write;

/// An encoder for MS-NRBF binary streams. Driven by a document's wire
/// emission order so an unedited document re-encodes byte-for-byte.
pub struct Encoder<W: Write> {
    writer: W,
    wide_chars: bool,
    /// Set in structural-fallback mode; records whose ids were already
    /// emitted collapse to MemberReference.
    emitted: Option<HashSet<i32>>,
    pending_refs: Vec<i32>,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            wide_chars: false,
            emitted: None,
            pending_refs: Vec::new(),
        }
    }

    /// Write Char values as two-byte UTF-16 code units. Must match the mode
    /// the document was decoded with.
    pub fn wide_chars(mut self, wide: bool) -> Self {
        self.wide_chars = wide;
        self
    }

    pub fn encode_document(&mut self, doc: &Document) -> Result<()> {
        self.encode_document_with_root(doc, doc.header.root_id)
    }

    /// Encodes the whole stream, overriding the header's root id.
    pub fn encode_document_with_root(&mut self, doc: &Document, root_id: i32) -> Result<()> {
        self.write_u8(RecordType::SerializedStreamHeader as u8)?;
        self.write_i32(root_id)?;
        self.write_i32(doc.header.header_id)?;
        self.write_i32(doc.header.major_version)?;
        self.write_i32(doc.header.minor_version)?;

        if doc.order.is_empty() {
            self.encode_structural(doc)?;
        } else {
            for handle in doc.records_in_order() {
                self.write_record(doc, handle)?;
            }
        }

        self.write_u8(RecordType::MessageEnd as u8)?;
        Ok(())
    }

    /// Fallback for documents without a wire order: libraries first, then the
    /// root tree depth-first, then any records reachable only by reference.
    /// The output re-decodes to an equivalent graph but carries no layout
    /// guarantee.
    fn encode_structural(&mut self, doc: &Document) -> Result<()> {
        self.emitted = Some(HashSet::new());

        let mut library_ids: Vec<i32> = doc.libraries.keys().copied().collect();
        library_ids.sort_unstable();
        for library_id in library_ids {
            self.write_u8(RecordType::BinaryLibrary as u8)?;
            self.write_i32(library_id)?;
            self.write_length_prefixed_string(&doc.libraries[&library_id])?;
        }

        self.write_record(doc, doc.root)?;
        while let Some(id) = self.pending_refs.pop() {
            if self.emitted.as_ref().is_some_and(|e| e.contains(&id)) {
                continue;
            }
            let handle = doc.lookup(id).ok_or(Error::UnresolvableReference(id))?;
            self.write_record(doc, handle)?;
        }

        self.emitted = None;
        Ok(())
    }

    fn write_record(&mut self, doc: &Document, handle: RecordHandle) -> Result<()> {
        let record = doc.record(handle);
        if let (Some(emitted), Some(id)) = (self.emitted.as_mut(), record.object_id()) {
            if !emitted.insert(id) {
                self.write_u8(RecordType::MemberReference as u8)?;
                self.write_i32(id)?;
                return Ok(());
            }
        }

        match record {
            Record::Class(class) => self.write_class_record(doc, class),
            Record::BinaryObjectString { object_id, value } => {
                self.write_u8(RecordType::BinaryObjectString as u8)?;
                self.write_i32(*object_id)?;
                self.write_length_prefixed_string(value)
            }
            Record::BinaryArray(array) => self.write_binary_array(doc, array),
            Record::ArraySinglePrimitive(array) => {
                self.write_u8(RecordType::ArraySinglePrimitive as u8)?;
                self.write_i32(array.object_id)?;
                self.write_i32(array.length)?;
                self.write_u8(array.primitive_type as u8)?;
                check_length(array.length, array.element_values.len())?;
                for value in &array.element_values {
                    let Value::Primitive(p) = value else {
                        return Err(Error::TypeMismatch {
                            expected: array.primitive_type.name().into(),
                            actual: "non-primitive element".into(),
                        });
                    };
                    self.write_primitive_value(p)?;
                }
                Ok(())
            }
            Record::ArraySingleObject(array) => {
                self.write_u8(RecordType::ArraySingleObject as u8)?;
                self.write_i32(array.object_id)?;
                self.write_i32(array.length)?;
                check_length(array.length, array.element_values.len())?;
                self.write_values(doc, &array.element_values, &array.null_runs, false, None)
            }
            Record::ArraySingleString(array) => {
                self.write_u8(RecordType::ArraySingleString as u8)?;
                self.write_i32(array.object_id)?;
                self.write_i32(array.length)?;
                check_length(array.length, array.element_values.len())?;
                self.write_values(doc, &array.element_values, &array.null_runs, false, None)
            }
            Record::BinaryLibrary(library) => {
                self.write_u8(RecordType::BinaryLibrary as u8)?;
                self.write_i32(library.library_id)?;
                self.write_length_prefixed_string(&library.library_name)
            }
            Record::MemberPrimitiveTyped {
                primitive_type,
                value,
            } => {
                self.write_u8(RecordType::MemberPrimitiveTyped as u8)?;
                self.write_u8(*primitive_type as u8)?;
                self.write_primitive_value(value)
            }
            Record::MemberReference { id_ref } => {
                if doc.lookup(*id_ref).is_none() {
                    return Err(Error::UnresolvableReference(*id_ref));
                }
                self.write_u8(RecordType::MemberReference as u8)?;
                self.write_i32(*id_ref)
            }
            Record::ObjectNull => self.write_u8(RecordType::ObjectNull as u8),
            Record::ObjectNullMultiple { null_count } => {
                self.write_u8(RecordType::ObjectNullMultiple as u8)?;
                self.write_i32(*null_count)
            }
            Record::ObjectNullMultiple256 { null_count } => {
                self.write_u8(RecordType::ObjectNullMultiple256 as u8)?;
                self.write_u8(*null_count)
            }
        }
    }

    fn write_class_record(&mut self, doc: &Document, class: &ClassRecord) -> Result<()> {
        let info = &class.class_info;
        check_length(info.member_count, class.member_values.len())?;

        match class.wire_kind {
            RecordType::ClassWithId => {
                let metadata_id = class
                    .metadata_id
                    .ok_or_else(|| Error::MissingTypeInfo(info.name.clone()))?;
                self.write_u8(RecordType::ClassWithId as u8)?;
                self.write_i32(info.object_id)?;
                self.write_i32(metadata_id)?;
            }
            RecordType::SystemClassWithMembers => {
                self.write_u8(RecordType::SystemClassWithMembers as u8)?;
                self.write_class_info(info)?;
            }
            RecordType::ClassWithMembers => {
                let library_id = class
                    .library_id
                    .ok_or_else(|| Error::MissingTypeInfo(info.name.clone()))?;
                self.write_u8(RecordType::ClassWithMembers as u8)?;
                self.write_class_info(info)?;
                self.write_i32(library_id)?;
            }
            RecordType::SystemClassWithMembersAndTypes => {
                let mti = class
                    .member_type_info
                    .as_ref()
                    .ok_or_else(|| Error::MissingTypeInfo(info.name.clone()))?;
                self.write_u8(RecordType::SystemClassWithMembersAndTypes as u8)?;
                self.write_class_info(info)?;
                self.write_member_type_info(mti)?;
            }
            RecordType::ClassWithMembersAndTypes => {
                let mti = class
                    .member_type_info
                    .as_ref()
                    .ok_or_else(|| Error::MissingTypeInfo(info.name.clone()))?;
                let library_id = class
                    .library_id
                    .ok_or_else(|| Error::MissingTypeInfo(info.name.clone()))?;
                self.write_u8(RecordType::ClassWithMembersAndTypes as u8)?;
                self.write_class_info(info)?;
                self.write_member_type_info(mti)?;
                self.write_i32(library_id)?;
            }
            other => return Err(Error::InvalidRecordType(other as u8)),
        }

        // Bare primitives are only legal where member type info declares
        // them; the type-less kinds carry every member as a nested record.
        let bare_primitives =
            class.member_type_info.is_some() || class.wire_kind == RecordType::ClassWithId;
        self.write_values(
            doc,
            &class.member_values,
            &class.null_runs,
            bare_primitives,
            Some(&info.member_names),
        )
    }

    fn write_binary_array(&mut self, doc: &Document, array: &BinaryArrayRecord) -> Result<()> {
        let total = array.total_elements();
        if total < 0 || total as usize != array.element_values.len() {
            return Err(Error::InconsistentArrayLength {
                declared: total as i32,
                actual: array.element_values.len(),
            });
        }

        self.write_u8(RecordType::BinaryArray as u8)?;
        self.write_i32(array.object_id)?;
        self.write_u8(array.array_type as u8)?;
        self.write_i32(array.rank)?;
        for length in &array.lengths {
            self.write_i32(*length)?;
        }
        if let Some(bounds) = &array.lower_bounds {
            for bound in bounds {
                self.write_i32(*bound)?;
            }
        }
        self.write_u8(array.element_type as u8)?;
        self.write_additional_type_info(&array.additional_type_info)?;

        let bare_primitives = array.element_type == BinaryType::Primitive;
        self.write_values(
            doc,
            &array.element_values,
            &array.null_runs,
            bare_primitives,
            None,
        )
    }

    /// Emits a slot sequence, re-collapsing the null runs recorded at decode
    /// time into their original ObjectNullMultiple form.
    fn write_values(
        &mut self,
        doc: &Document,
        values: &[Value],
        null_runs: &[NullRun],
        bare_primitives: bool,
        member_names: Option<&[String]>,
    ) -> Result<()> {
        let mut runs = null_runs.iter().peekable();
        let mut i = 0;
        while i < values.len() {
            if let Some(run) = runs.peek() {
                if run.start == i {
                    if run.wide {
                        self.write_u8(RecordType::ObjectNullMultiple as u8)?;
                        self.write_i32(run.count)?;
                    } else {
                        self.write_u8(RecordType::ObjectNullMultiple256 as u8)?;
                        self.write_u8(run.count as u8)?;
                    }
                    i += run.count.max(0) as usize;
                    runs.next();
                    continue;
                }
            }

            match &values[i] {
                Value::Primitive(p) => {
                    if !bare_primitives {
                        let name = member_names
                            .and_then(|names| names.get(i))
                            .cloned()
                            .unwrap_or_else(|| format!("[{}]", i));
                        return Err(Error::MissingTypeInfo(name));
                    }
                    self.write_primitive_value(p)?;
                }
                Value::Null => self.write_u8(RecordType::ObjectNull as u8)?,
                Value::Reference(id) => {
                    if doc.lookup(*id).is_none() {
                        return Err(Error::UnresolvableReference(*id));
                    }
                    if let Some(emitted) = self.emitted.as_ref() {
                        if !emitted.contains(id) {
                            self.pending_refs.push(*id);
                        }
                    }
                    self.write_u8(RecordType::MemberReference as u8)?;
                    self.write_i32(*id)?;
                }
                Value::Record(handle) => self.write_record(doc, *handle)?,
            }
            i += 1;
        }
        Ok(())
    }

    fn write_class_info(&mut self, info: &ClassInfo) -> Result<()> {
        self.write_i32(info.object_id)?;
        self.write_length_prefixed_string(&info.name)?;
        self.write_i32(info.member_count)?;
        for name in &info.member_names {
            self.write_length_prefixed_string(name)?;
        }
        Ok(())
    }

    fn write_member_type_info(&mut self, info: &MemberTypeInfo) -> Result<()> {
        for bt in &info.binary_types {
            self.write_u8(*bt as u8)?;
        }
        for additional in &info.additional_infos {
            self.write_additional_type_info(additional)?;
        }
        Ok(())
    }

    fn write_additional_type_info(&mut self, info: &AdditionalTypeInfo) -> Result<()> {
        match info {
            AdditionalTypeInfo::Primitive(pt) => self.write_u8(*pt as u8),
            AdditionalTypeInfo::SystemClass(name) => self.write_length_prefixed_string(name),
            AdditionalTypeInfo::Class(c) => {
                self.write_length_prefixed_string(&c.type_name)?;
                self.write_i32(c.library_id)
            }
            AdditionalTypeInfo::None => Ok(()),
        }
    }

    fn write_primitive_value(&mut self, value: &PrimitiveValue) -> Result<()> {
        match value {
            PrimitiveValue::Boolean(b) => self.write_u8(if *b { 1 } else { 0 }),
            PrimitiveValue::Byte(b) => self.write_u8(*b),
            PrimitiveValue::Char(c) => {
                if self.wide_chars {
                    let unit = *c as u32;
                    if unit > u16::MAX as u32 {
                        return Err(Error::EncodeIntegerOutOfRange(unit as i64));
                    }
                    self.write_all(&(unit as u16).to_le_bytes())
                } else {
                    let unit = *c as u32;
                    if unit > u8::MAX as u32 {
                        return Err(Error::EncodeIntegerOutOfRange(unit as i64));
                    }
                    self.write_u8(unit as u8)
                }
            }
            PrimitiveValue::Decimal(fingerprint) => {
                let bytes = hex::decode(fingerprint).map_err(|_| Error::MalformedString)?;
                if bytes.len() != 16 {
                    return Err(Error::MalformedString);
                }
                self.write_all(&bytes)
            }
            PrimitiveValue::Double(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::Int16(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::Int32(v) => self.write_i32(*v),
            PrimitiveValue::Int64(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::SByte(v) => self.write_u8(*v as u8),
            PrimitiveValue::Single(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::TimeSpan(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::DateTime(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::UInt16(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::UInt32(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::UInt64(v) => self.write_all(&v.to_le_bytes()),
            PrimitiveValue::String(s) => self.write_length_prefixed_string(s),
            // Carried by ObjectNull or a null run, never by value bytes.
            PrimitiveValue::Null => Ok(()),
        }
    }

    fn write_length_prefixed_string(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > i32::MAX as usize {
            return Err(Error::EncodeIntegerOutOfRange(bytes.len() as i64));
        }
        self.write_variable_length_int(bytes.len() as i32)?;
        self.write_all(bytes)
    }

    fn write_variable_length_int(&mut self, value: i32) -> Result<()> {
        if value < 0 {
            return Err(Error::EncodeIntegerOutOfRange(value as i64));
        }
        let mut value = value as u32;
        loop {
            let mut b = (value & 0x7F) as u8;
            value >>= 7;
            if value > 0 {
                b |= 0x80;
                self.write_u8(b)?;
            } else {
                self.write_u8(b)?;
                break;
            }
        }
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_all(&[value])
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }
}

fn check_length(declared: i32, actual: usize) -> Result<()> {
    if declared.max(0) as usize != actual {
        return Err(Error::InconsistentArrayLength { declared, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint_bytes(value: i32) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).write_variable_length_int(value)?;
        Ok(buf)
    }

    #[test]
    fn varint_boundary_encodings() {
        assert_eq!(varint_bytes(0).unwrap(), [0x00]);
        assert_eq!(varint_bytes(127).unwrap(), [0x7F]);
        assert_eq!(varint_bytes(128).unwrap(), [0x80, 0x01]);
        assert_eq!(varint_bytes(16383).unwrap(), [0xFF, 0x7F]);
        assert_eq!(varint_bytes(16384).unwrap(), [0x80, 0x80, 0x01]);
        assert_eq!(
            varint_bytes(i32::MAX).unwrap(),
            [0xFF, 0xFF, 0xFF, 0xFF, 0x07]
        );
    }

    #[test]
    fn varint_rejects_negative() {
        assert!(matches!(
            varint_bytes(-1),
            Err(Error::EncodeIntegerOutOfRange(-1))
        ));
    }

    #[test]
    fn decimal_fingerprint_must_be_sixteen_bytes() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        assert!(enc
            .write_primitive_value(&PrimitiveValue::Decimal("0011".into()))
            .is_err());
        assert!(enc
            .write_primitive_value(&PrimitiveValue::Decimal(
                "000102030405060708090a0b0c0d0e0f".into()
            ))
            .is_ok());
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn structural_fallback_re_decodes_equivalently() {
        let mut bytes = vec![0x00];
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.push(0x06);
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&[0x02, b'h', b'i']);
        bytes.push(0x0B);

        let mut doc = Document::decode(&bytes).unwrap();
        doc.order.clear();
        let out = doc.encode().unwrap();
        assert_eq!(out, bytes);

        let redecoded = Document::decode(&out).unwrap();
        assert!(matches!(
            redecoded.record(redecoded.root()),
            Record::BinaryObjectString { object_id: 1, value } if value == "hi"
        ));
    }

    #[test]
    fn char_width_follows_mode() {
        let mut narrow = Vec::new();
        Encoder::new(&mut narrow)
            .write_primitive_value(&PrimitiveValue::Char('A'))
            .unwrap();
        assert_eq!(narrow, [0x41]);

        let mut wide = Vec::new();
        Encoder::new(&mut wide)
            .wide_chars(true)
            .write_primitive_value(&PrimitiveValue::Char('A'))
            .unwrap();
        assert_eq!(wide, [0x41, 0x00]);
    }
}
