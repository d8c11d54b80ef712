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

use crate::decoder::{ClassMetadata, DecodeOptions, Decoder};
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::records::*;
use log::warn;
use std::collections::{HashMap, HashSet};

/// A decoded NRBF stream: the record arena, the wire emission order, and the
/// id-keyed maps needed to resolve references and ClassWithId reuse. All
/// mutation goes through the edit API; dropping the document releases the
/// whole graph.
pub struct Document {
    pub(crate) header: SerializationHeader,
    pub(crate) arena: Vec<Record>,
    /// Top-level records in the order they appeared on the wire, libraries
    /// included, framing header and MessageEnd excluded.
    pub(crate) order: Vec<RecordHandle>,
    pub(crate) objects: HashMap<i32, RecordHandle>,
    pub(crate) metadata: HashMap<i32, ClassMetadata>,
    pub(crate) libraries: HashMap<i32, String>,
    pub(crate) root: RecordHandle,
    pub(crate) wide_chars: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStats {
    pub record_count: usize,
    pub object_count: usize,
    pub library_count: usize,
}

impl Document {
    /// Decodes a full NRBF stream from a byte buffer.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Decoder::new(bytes).decode()
    }

    pub fn decode_with_options(bytes: &[u8], options: DecodeOptions) -> Result<Self> {
        Decoder::with_options(bytes, options).decode()
    }

    /// Re-encodes the document. For an unedited document the output is
    /// byte-identical to the decoded input.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .wide_chars(self.wide_chars)
            .encode_document(self)?;
        Ok(buf)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        header: SerializationHeader,
        arena: Vec<Record>,
        order: Vec<RecordHandle>,
        objects: HashMap<i32, RecordHandle>,
        metadata: HashMap<i32, ClassMetadata>,
        libraries: HashMap<i32, String>,
        root: RecordHandle,
        wide_chars: bool,
    ) -> Self {
        Self {
            header,
            arena,
            order,
            objects,
            metadata,
            libraries,
            root,
            wide_chars,
        }
    }

    pub fn header(&self) -> &SerializationHeader {
        &self.header
    }

    pub fn root(&self) -> RecordHandle {
        self.root
    }

    pub fn record(&self, handle: RecordHandle) -> &Record {
        &self.arena[handle.0]
    }

    pub(crate) fn record_mut(&mut self, handle: RecordHandle) -> &mut Record {
        &mut self.arena[handle.0]
    }

    pub fn lookup(&self, object_id: i32) -> Option<RecordHandle> {
        self.objects.get(&object_id).copied()
    }

    pub fn records_in_order(&self) -> impl Iterator<Item = RecordHandle> + '_ {
        self.order.iter().copied()
    }

    pub fn library_name(&self, library_id: i32) -> Option<&str> {
        self.libraries.get(&library_id).map(String::as_str)
    }

    pub fn stats(&self) -> DocumentStats {
        DocumentStats {
            record_count: self.arena.len(),
            object_count: self.objects.len(),
            library_count: self.libraries.len(),
        }
    }

    /// Follows a reference one hop. Non-reference values come back unchanged.
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Reference(id) => {
                let handle = self.lookup(*id).ok_or(Error::DanglingReference(*id))?;
                Ok(Value::Record(handle))
            }
            Value::Record(handle) => {
                // A reference that was a top-level record rather than an
                // inline member value still resolves like one.
                if let Record::MemberReference { id_ref } = self.record(*handle) {
                    let target = self
                        .lookup(*id_ref)
                        .ok_or(Error::DanglingReference(*id_ref))?;
                    Ok(Value::Record(target))
                } else {
                    Ok(value.clone())
                }
            }
            other => Ok(other.clone()),
        }
    }

    /// `(name, value)` pairs of a class record; empty for anything else.
    pub fn members(&self, handle: RecordHandle) -> impl Iterator<Item = (&str, &Value)> {
        self.record(handle)
            .as_class()
            .into_iter()
            .flat_map(|c| c.members())
    }

    /// Element slots of an array record, null runs expanded; empty for
    /// anything else.
    pub fn elements(&self, handle: RecordHandle) -> impl Iterator<Item = &Value> {
        self.record(handle)
            .element_values()
            .into_iter()
            .flatten()
    }

    /// Depth-first traversal over every member and element slot reachable
    /// from the root. Paths are rooted at the root record's class name.
    /// References are yielded as-is and never followed, so cyclic graphs
    /// terminate.
    pub fn iter(&self) -> DocumentIter<'_> {
        let mut iter = DocumentIter {
            doc: self,
            stack: Vec::new(),
            visited: HashSet::new(),
        };
        if let Some(id) = self.record(self.root).object_id() {
            iter.visited.insert(id);
        }
        iter.push_children(self.root, &self.root_path_prefix());
        iter
    }

    pub(crate) fn root_path_prefix(&self) -> String {
        match self.record(self.root) {
            Record::Class(c) => c.class_info.name.clone(),
            _ => String::new(),
        }
    }
}

pub struct DocumentIter<'a> {
    doc: &'a Document,
    stack: Vec<(String, &'a Value)>,
    visited: HashSet<i32>,
}

impl<'a> DocumentIter<'a> {
    fn push_children(&mut self, handle: RecordHandle, prefix: &str) {
        match self.doc.record(handle) {
            Record::Class(c) => {
                for (name, value) in c.members().collect::<Vec<_>>().into_iter().rev() {
                    self.stack.push((join_member(prefix, name), value));
                }
            }
            record if record.is_array() => {
                let elements = record.element_values().unwrap_or(&[]);
                for (i, value) in elements.iter().enumerate().rev() {
                    self.stack.push((join_index(prefix, i), value));
                }
            }
            _ => {}
        }
    }
}

impl<'a> Iterator for DocumentIter<'a> {
    type Item = (String, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, value) = self.stack.pop()?;
        match value {
            Value::Record(handle) => {
                let record = self.doc.record(*handle);
                let fresh = match record.object_id() {
                    Some(id) => self.visited.insert(id),
                    None => true,
                };
                if fresh {
                    self.push_children(*handle, &path);
                }
            }
            Value::Reference(id) => {
                if self.doc.lookup(*id).is_none() {
                    warn!("dangling reference to object id {} at {}", id, path);
                }
            }
            _ => {}
        }
        Some((path, value))
    }
}

pub(crate) fn join_member(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

pub(crate) fn join_index(prefix: &str, index: usize) -> String {
    format!("{}[{}]", prefix, index)
}
