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

//! Structural comparison of two documents. References are resolved before
//! comparing, leaf values compare by canonical text, and a structural
//! mismatch records one `Modified` at the deepest common path instead of
//! failing.

use crate::document::{Document, join_index, join_member};
use crate::guid;
use crate::records::{ClassRecord, Record, RecordHandle, Value};
use log::warn;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Modified,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub path: String,
    pub kind: ChangeKind,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeKind::Modified => write!(
                f,
                "~ {}: {} -> {}",
                self.path,
                self.old.as_deref().unwrap_or(""),
                self.new.as_deref().unwrap_or("")
            ),
            ChangeKind::Added => {
                write!(f, "+ {}: {}", self.path, self.new.as_deref().unwrap_or(""))
            }
            ChangeKind::Removed => {
                write!(f, "- {}: {}", self.path, self.old.as_deref().unwrap_or(""))
            }
        }
    }
}

/// Compares two documents and returns the changed fields in pre-order of the
/// `before` tree, with fields only present in `after` at the position they
/// occur there.
pub fn diff(before: &Document, after: &Document) -> Vec<FieldChange> {
    let mut walker = DiffWalker {
        before,
        after,
        visited: HashSet::new(),
        changes: Vec::new(),
    };
    let prefix = before.root_path_prefix();
    walker.diff_values(
        &Value::Record(before.root()),
        &Value::Record(after.root()),
        &prefix,
    );
    walker.changes
}

struct DiffWalker<'a> {
    before: &'a Document,
    after: &'a Document,
    /// `(before id, after id)` pairs already compared, for cyclic graphs.
    visited: HashSet<(i32, i32)>,
    changes: Vec<FieldChange>,
}

/// A value reduced to its comparable shape.
enum Node<'a> {
    Leaf(String),
    Class(&'a ClassRecord),
    Array(&'a Record),
}

impl<'a> DiffWalker<'a> {
    fn diff_values(&mut self, va: &Value, vb: &Value, path: &str) {
        let a = classify(self.before, va);
        let b = classify(self.after, vb);

        match (a, b) {
            (Node::Leaf(ta), Node::Leaf(tb)) => {
                if ta != tb {
                    self.push(path, ChangeKind::Modified, Some(ta), Some(tb));
                }
            }
            (Node::Class(ca), Node::Class(cb)) => {
                if !self.enter(ca.object_id(), cb.object_id()) {
                    return;
                }
                if ca.class_info.name != cb.class_info.name {
                    self.push(
                        path,
                        ChangeKind::Modified,
                        Some(ca.class_info.name.clone()),
                        Some(cb.class_info.name.clone()),
                    );
                    return;
                }
                for (name, value_a) in ca.members() {
                    let member_path = join_member(path, name);
                    match cb.member(name) {
                        Some(value_b) => self.diff_values(value_a, value_b, &member_path),
                        None => {
                            let old = summarize(self.before, value_a);
                            self.push(&member_path, ChangeKind::Removed, Some(old), None);
                        }
                    }
                }
                for (name, value_b) in cb.members() {
                    if ca.member(name).is_none() {
                        let member_path = join_member(path, name);
                        let new = summarize(self.after, value_b);
                        self.push(&member_path, ChangeKind::Added, None, Some(new));
                    }
                }
            }
            (Node::Array(ra), Node::Array(rb)) => {
                if let (Some(ida), Some(idb)) = (ra.object_id(), rb.object_id()) {
                    if !self.enter(ida, idb) {
                        return;
                    }
                }
                let ea = ra.element_values().unwrap_or(&[]);
                let eb = rb.element_values().unwrap_or(&[]);
                for i in 0..ea.len().max(eb.len()) {
                    let element_path = join_index(path, i);
                    match (ea.get(i), eb.get(i)) {
                        (Some(value_a), Some(value_b)) => {
                            self.diff_values(value_a, value_b, &element_path)
                        }
                        (Some(value_a), None) => {
                            let old = summarize(self.before, value_a);
                            self.push(&element_path, ChangeKind::Removed, Some(old), None);
                        }
                        (None, Some(value_b)) => {
                            let new = summarize(self.after, value_b);
                            self.push(&element_path, ChangeKind::Added, None, Some(new));
                        }
                        (None, None) => {}
                    }
                }
            }
            // Different categories: one Modified at the deepest common path.
            (a, b) => {
                let old = node_summary(&a);
                let new = node_summary(&b);
                self.push(path, ChangeKind::Modified, Some(old), Some(new));
            }
        }
    }

    fn enter(&mut self, id_a: i32, id_b: i32) -> bool {
        self.visited.insert((id_a, id_b))
    }

    fn push(&mut self, path: &str, kind: ChangeKind, old: Option<String>, new: Option<String>) {
        self.changes.push(FieldChange {
            path: path.to_string(),
            kind,
            old,
            new,
        });
    }
}

fn classify<'a>(doc: &'a Document, value: &Value) -> Node<'a> {
    let resolved = match doc.resolve(value) {
        Ok(v) => v,
        Err(_) => {
            if let Value::Reference(id) = value {
                warn!("diff crossed dangling reference to object id {}", id);
                return Node::Leaf(format!("<unresolved #{}>", id));
            }
            return Node::Leaf("<unresolvable>".to_string());
        }
    };

    match resolved {
        Value::Primitive(p) => Node::Leaf(p.to_string()),
        Value::Null => Node::Leaf("null".to_string()),
        Value::Reference(id) => Node::Leaf(format!("<unresolved #{}>", id)),
        Value::Record(handle) => classify_record(doc, handle),
    }
}

fn classify_record(doc: &Document, handle: RecordHandle) -> Node<'_> {
    match doc.record(handle) {
        Record::Class(class) => match guid::guid_text(class) {
            Some(text) => Node::Leaf(text),
            None => Node::Class(class),
        },
        Record::BinaryObjectString { value, .. } => Node::Leaf(value.clone()),
        Record::MemberPrimitiveTyped { value, .. } => Node::Leaf(value.to_string()),
        Record::ObjectNull
        | Record::ObjectNullMultiple { .. }
        | Record::ObjectNullMultiple256 { .. } => Node::Leaf("null".to_string()),
        Record::BinaryLibrary(library) => Node::Leaf(library.library_name.clone()),
        Record::MemberReference { id_ref } => Node::Leaf(format!("<unresolved #{}>", id_ref)),
        array => Node::Array(array),
    }
}

fn summarize(doc: &Document, value: &Value) -> String {
    node_summary(&classify(doc, value))
}

fn node_summary(node: &Node<'_>) -> String {
    match node {
        Node::Leaf(text) => text.clone(),
        Node::Class(class) => class.class_info.name.clone(),
        Node::Array(record) => {
            let len = record.element_values().map(<[Value]>::len).unwrap_or(0);
            format!("<array[{}]>", len)
        }
    }
}
