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

//! Dotted-path lookup over a document: `Stats.Inventory[3].Count`. Each
//! segment is a member name, an element index, or both (`name[i]`).
//! References are followed transparently. Lookup never fails hard; anything
//! that does not resolve is `None`.

use crate::document::Document;
use crate::error::Error;
use crate::records::{Record, RecordHandle, Value};
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Member(String),
    Index(usize),
}

/// Address of one member or element slot inside a document.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotRef {
    Member { record: RecordHandle, index: usize },
    Element { record: RecordHandle, index: usize },
}

/// Splits a path into steps. `name[3]` contributes a member step and an
/// index step; a bare `[3]` indexes the current value directly.
pub fn parse_path(path: &str) -> Option<Vec<PathStep>> {
    if path.is_empty() {
        return None;
    }
    let mut steps = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let (name, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if name.contains(']') {
            return None;
        }
        if !name.is_empty() {
            steps.push(PathStep::Member(name.to_string()));
        }
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return None;
            }
            let end = rest.find(']')?;
            let index: usize = rest[1..end].parse().ok()?;
            steps.push(PathStep::Index(index));
            rest = &rest[end + 1..];
        }
    }
    if steps.is_empty() { None } else { Some(steps) }
}

impl Document {
    /// Looks up the value at `path`, walking from the root. A trailing
    /// reference is resolved one extra hop. `None` for anything that does
    /// not resolve.
    pub fn get(&self, path: &str) -> Option<Value> {
        let (_, value) = self.locate_value(path)?;
        match value {
            Value::Reference(id) => match self.resolve(&Value::Reference(id)) {
                Ok(resolved) => Some(resolved),
                Err(Error::DanglingReference(id)) => {
                    debug!("path {} ends in dangling reference {}", path, id);
                    None
                }
                Err(_) => None,
            },
            other => Some(other),
        }
    }

    /// The slot a path addresses, for in-place mutation.
    pub(crate) fn locate(&self, path: &str) -> Option<SlotRef> {
        self.locate_value(path).and_then(|(slot, _)| slot)
    }

    pub(crate) fn locate_value(&self, path: &str) -> Option<(Option<SlotRef>, Value)> {
        let steps = parse_path(path)?;
        let mut cursor = Value::Record(self.root);
        let mut slot = None;
        let mut first = true;

        for step in &steps {
            let current = match self.resolve(&cursor) {
                Ok(v) => v,
                Err(Error::DanglingReference(id)) => {
                    debug!("path {} crosses dangling reference {}", path, id);
                    return None;
                }
                Err(_) => return None,
            };
            let Value::Record(handle) = current else {
                return None;
            };

            match step {
                PathStep::Member(name) => {
                    let class = self.record(handle).as_class()?;
                    match class.member_index(name) {
                        Some(index) => {
                            slot = Some(SlotRef::Member {
                                record: handle,
                                index,
                            });
                            cursor = class.member_values[index].clone();
                        }
                        // Rooted paths (as produced by diff and iter) carry
                        // the root class name as their first segment.
                        None if first && *name == class.class_info.name => {
                            cursor = Value::Record(handle);
                        }
                        None => return None,
                    }
                }
                PathStep::Index(index) => {
                    let elements = self.record(handle).element_values()?;
                    let value = elements.get(*index)?;
                    slot = Some(SlotRef::Element {
                        record: handle,
                        index: *index,
                    });
                    cursor = value.clone();
                }
            }
            first = false;
        }

        Some((slot, cursor))
    }

    pub(crate) fn slot_value(&self, slot: SlotRef) -> Option<&Value> {
        match slot {
            SlotRef::Member { record, index } => self
                .record(record)
                .as_class()
                .and_then(|c| c.member_values.get(index)),
            SlotRef::Element { record, index } => self
                .record(record)
                .element_values()
                .and_then(|e| e.get(index)),
        }
    }

    pub(crate) fn slot_value_mut(&mut self, slot: SlotRef) -> Option<&mut Value> {
        match slot {
            SlotRef::Member { record, index } => match self.record_mut(record) {
                Record::Class(c) => c.member_values.get_mut(index),
                _ => None,
            },
            SlotRef::Element { record, index } => self
                .record_mut(record)
                .element_values_mut()
                .and_then(|e| e.get_mut(index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_members() {
        let steps = parse_path("Player.Stats.XP").unwrap();
        assert_eq!(
            steps,
            [
                PathStep::Member("Player".into()),
                PathStep::Member("Stats".into()),
                PathStep::Member("XP".into()),
            ]
        );
    }

    #[test]
    fn parses_indexed_members() {
        let steps = parse_path("Inventory[3].Count").unwrap();
        assert_eq!(
            steps,
            [
                PathStep::Member("Inventory".into()),
                PathStep::Index(3),
                PathStep::Member("Count".into()),
            ]
        );
    }

    #[test]
    fn parses_bare_index() {
        let steps = parse_path("[0][1]").unwrap();
        assert_eq!(steps, [PathStep::Index(0), PathStep::Index(1)]);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(parse_path("").is_none());
        assert!(parse_path("a..b").is_none());
        assert!(parse_path("a[").is_none());
        assert!(parse_path("a[x]").is_none());
        assert!(parse_path("a]b").is_none());
        assert!(parse_path("a[1]b").is_none());
    }
}
