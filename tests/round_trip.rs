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

//! End-to-end fixtures built byte-by-byte: decode, inspect, edit, re-encode.

use nrbf_edit::decoder::DecodeOptions;
use nrbf_edit::{
    ChangeKind, Document, Error, PrimitiveValue, Record, Value, diff, is_nrbf, load, save,
};

/// Builds an NRBF stream: header up front, MessageEnd on `end()`.
struct Stream(Vec<u8>);

impl Stream {
    fn new(root_id: i32) -> Self {
        let mut bytes = vec![0x00];
        bytes.extend_from_slice(&root_id.to_le_bytes());
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        Stream(bytes)
    }

    fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    fn i16(mut self, v: i16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn f32(mut self, v: f32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Length-prefixed string; fixture strings stay under 128 bytes.
    fn str(mut self, s: &str) -> Self {
        assert!(s.len() < 128);
        self.0.push(s.len() as u8);
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    fn end(mut self) -> Vec<u8> {
        self.0.push(0x0B);
        self.0
    }
}

fn differing_positions(a: &[u8], b: &[u8]) -> Vec<usize> {
    assert_eq!(a.len(), b.len(), "streams changed length");
    a.iter()
        .zip(b.iter())
        .enumerate()
        .filter(|(_, (x, y))| x != y)
        .map(|(i, _)| i)
        .collect()
}

/// One system class "Sys.Int" with a single Int32 member X = 42.
fn single_class_fixture() -> Vec<u8> {
    Stream::new(1)
        .u8(4) // SystemClassWithMembersAndTypes
        .i32(1)
        .str("Sys.Int")
        .i32(1)
        .str("X")
        .u8(0) // BinaryType::Primitive
        .u8(8) // PrimitiveType::Int32
        .i32(42)
        .end()
}

/// Class A whose member B references an earlier string record id 7.
fn reference_fixture() -> Vec<u8> {
    Stream::new(1)
        .u8(6) // BinaryObjectString
        .i32(7)
        .str("hi")
        .u8(4) // SystemClassWithMembersAndTypes
        .i32(1)
        .str("A")
        .i32(1)
        .str("B")
        .u8(1) // BinaryType::String
        .u8(9) // MemberReference
        .i32(7)
        .end()
}

/// A library, then an object array holding one Vec3 shape definition and
/// four ClassWithId reuses of it.
fn class_with_id_fixture() -> Vec<u8> {
    let mut s = Stream::new(1)
        .u8(12) // BinaryLibrary
        .i32(2)
        .str("Game")
        .u8(16) // ArraySingleObject
        .i32(1)
        .i32(5)
        .u8(5) // ClassWithMembersAndTypes
        .i32(10)
        .str("Vec3")
        .i32(3)
        .str("x")
        .str("y")
        .str("z")
        .u8(0)
        .u8(0)
        .u8(0) // three Primitive members
        .u8(11)
        .u8(11)
        .u8(11) // three Single
        .i32(2) // library id
        .f32(1.0)
        .f32(1.0)
        .f32(1.0);
    for object_id in 11..=14 {
        s = s
            .u8(1) // ClassWithId
            .i32(object_id)
            .i32(10)
            .f32(1.0)
            .f32(1.0)
            .f32(1.0);
    }
    s.end()
}

/// An object array of length 10: one ObjectNullMultiple(5), then five
/// strings.
fn null_run_fixture() -> Vec<u8> {
    let mut s = Stream::new(1)
        .u8(16) // ArraySingleObject
        .i32(1)
        .i32(10)
        .u8(14) // ObjectNullMultiple
        .i32(5);
    for k in 0..5 {
        s = s.u8(6).i32(2 + k).str("s");
    }
    s.end()
}

/// Root class "Save" with an inline System.Guid member.
fn guid_fixture() -> Vec<u8> {
    let mut s = Stream::new(1)
        .u8(4)
        .i32(1)
        .str("Save")
        .i32(1)
        .str("Id")
        .u8(3) // BinaryType::SystemClass
        .str("System.Guid")
        .u8(4)
        .i32(2)
        .str("System.Guid")
        .i32(11);
    for name in ["_a", "_b", "_c", "_d", "_e", "_f", "_g", "_h", "_i", "_j", "_k"] {
        s = s.str(name);
    }
    for _ in 0..11 {
        s = s.u8(0); // all Primitive
    }
    s = s.u8(8).u8(7).u8(7); // Int32, Int16, Int16
    for _ in 0..8 {
        s = s.u8(2); // Byte
    }
    s = s.i32(0x12345678).i16(0x1234).i16(0x5678);
    for b in [0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78] {
        s = s.u8(b);
    }
    s.end()
}

/// Root "Player" with a nested "Stats" class carrying one Int32 XP member.
fn player_fixture(xp: i32) -> Vec<u8> {
    Stream::new(1)
        .u8(4)
        .i32(1)
        .str("Player")
        .i32(1)
        .str("Stats")
        .u8(3)
        .str("Stats")
        .u8(4)
        .i32(2)
        .str("Stats")
        .i32(1)
        .str("XP")
        .u8(0)
        .u8(8)
        .i32(xp)
        .end()
}

#[test]
fn fixtures_pass_the_magic_check() {
    assert!(is_nrbf(&single_class_fixture()));
    assert!(is_nrbf(&class_with_id_fixture()));
    assert!(!is_nrbf(&[0u8; 4]));
}

#[test]
fn single_class_decodes_and_round_trips() {
    let bytes = single_class_fixture();
    let doc = load(&bytes).unwrap();

    assert_eq!(doc.header().root_id, 1);
    let root = doc.record(doc.root()).as_class().unwrap();
    assert_eq!(root.class_info.name, "Sys.Int");
    assert!(matches!(
        doc.get("X"),
        Some(Value::Primitive(PrimitiveValue::Int32(42)))
    ));

    assert_eq!(save(&doc).unwrap(), bytes);
}

#[test]
fn single_class_edit_touches_only_the_field_bytes() {
    let bytes = single_class_fixture();
    let mut doc = load(&bytes).unwrap();
    doc.set_primitive("X", PrimitiveValue::Int32(43)).unwrap();

    let edited = save(&doc).unwrap();
    let field_offset = bytes.len() - 5; // 4 value bytes then MessageEnd
    for position in differing_positions(&bytes, &edited) {
        assert!(position >= field_offset && position < field_offset + 4);
    }
    let redecoded = load(&edited).unwrap();
    assert!(matches!(
        redecoded.get("X"),
        Some(Value::Primitive(PrimitiveValue::Int32(43)))
    ));
}

#[test]
fn edits_are_idempotent() {
    let bytes = single_class_fixture();
    let mut doc = load(&bytes).unwrap();
    doc.set_primitive("X", PrimitiveValue::Int32(43)).unwrap();
    let first = save(&doc).unwrap();
    doc.set_primitive("X", PrimitiveValue::Int32(43)).unwrap();
    assert_eq!(save(&doc).unwrap(), first);
}

#[test]
fn references_are_preserved_not_inlined() {
    let bytes = reference_fixture();
    let doc = load(&bytes).unwrap();

    // The member still holds a reference after decoding.
    let root = doc.record(doc.root()).as_class().unwrap();
    assert!(matches!(root.member("B"), Some(Value::Reference(7))));

    // The string record comes first in wire order, the class second.
    let order: Vec<_> = doc.records_in_order().collect();
    assert_eq!(order.len(), 2);
    assert!(matches!(
        doc.record(order[0]),
        Record::BinaryObjectString { object_id: 7, .. }
    ));

    // Resolution reaches the referent.
    let resolved = doc.resolve(&Value::Reference(7)).unwrap();
    let Value::Record(handle) = resolved else {
        panic!("expected record");
    };
    assert!(matches!(
        doc.record(handle),
        Record::BinaryObjectString { value, .. } if value == "hi"
    ));

    assert_eq!(save(&doc).unwrap(), bytes);
}

#[test]
fn set_string_keeps_the_object_id() {
    let mut doc = load(&reference_fixture()).unwrap();
    doc.set_string("B", "world").unwrap();

    let redecoded = load(&save(&doc).unwrap()).unwrap();
    let value = redecoded.get("B").unwrap();
    let Value::Record(handle) = value else {
        panic!("expected record");
    };
    assert!(matches!(
        redecoded.record(handle),
        Record::BinaryObjectString { object_id: 7, value } if value == "world"
    ));
}

#[test]
fn class_with_id_reuse_round_trips_and_edits_minimally() {
    let bytes = class_with_id_fixture();
    let doc = load(&bytes).unwrap();
    assert_eq!(save(&doc).unwrap(), bytes);

    // Element 3 is object id 13; its shape comes from metadata id 10.
    let mut doc = load(&bytes).unwrap();
    assert!(matches!(
        doc.get("[3].y"),
        Some(Value::Primitive(PrimitiveValue::Single(v))) if v == 1.0
    ));
    doc.set_primitive("[3].y", PrimitiveValue::Single(-2.5))
        .unwrap();

    // Everything outside the 4 bytes of that one Single is untouched.
    let edited = save(&doc).unwrap();
    let positions = differing_positions(&bytes, &edited);
    assert!(!positions.is_empty() && positions.len() <= 4);
    assert!(positions[positions.len() - 1] - positions[0] <= 3);

    let redecoded = load(&edited).unwrap();
    assert!(matches!(
        redecoded.get("[3].y"),
        Some(Value::Primitive(PrimitiveValue::Single(v))) if v == -2.5
    ));
    // Neighbouring reuses are untouched.
    assert!(matches!(
        redecoded.get("[2].y"),
        Some(Value::Primitive(PrimitiveValue::Single(v))) if v == 1.0
    ));
}

#[test]
fn null_runs_expand_and_re_collapse() {
    let bytes = null_run_fixture();
    let doc = load(&bytes).unwrap();

    let elements: Vec<_> = doc.elements(doc.root()).collect();
    assert_eq!(elements.len(), 10);
    assert!(elements[..5].iter().all(|v| v.is_null()));
    assert!(elements[5..].iter().all(|v| matches!(v, Value::Record(_))));

    // The ObjectNullMultiple record is re-emitted as-is, not as five
    // ObjectNulls.
    assert_eq!(save(&doc).unwrap(), bytes);
}

#[test]
fn guid_composes_decomposes_and_edits() {
    let bytes = guid_fixture();
    let doc = load(&bytes).unwrap();
    assert_eq!(save(&doc).unwrap(), bytes);
    assert_eq!(
        doc.guid_at("Id").unwrap(),
        "12345678-1234-5678-1234-567812345678"
    );

    let mut doc = load(&bytes).unwrap();
    doc.set_guid("Id", "aabbccdd-eeff-0011-2233-445566778899")
        .unwrap();
    let redecoded = load(&save(&doc).unwrap()).unwrap();
    assert_eq!(
        redecoded.guid_at("Id").unwrap(),
        "aabbccdd-eeff-0011-2233-445566778899"
    );
}

#[test]
fn diff_reports_a_single_modified_leaf() {
    let before = load(&player_fixture(1000)).unwrap();
    let after = load(&player_fixture(1250)).unwrap();

    let changes = diff(&before, &after);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, "Player.Stats.XP");
    assert_eq!(changes[0].kind, ChangeKind::Modified);
    assert_eq!(changes[0].old.as_deref(), Some("1000"));
    assert_eq!(changes[0].new.as_deref(), Some("1250"));

    assert!(diff(&before, &before).is_empty());
}

#[test]
fn diff_is_symmetric() {
    let before = load(&player_fixture(1000)).unwrap();
    let after = load(&player_fixture(1250)).unwrap();

    let forward = diff(&before, &after);
    let backward = diff(&after, &before);
    assert_eq!(forward.len(), backward.len());
    for (f, b) in forward.iter().zip(backward.iter()) {
        assert_eq!(f.path, b.path);
        assert_eq!(f.old, b.new);
        assert_eq!(f.new, b.old);
    }
}

#[test]
fn traversal_yields_rooted_paths() {
    let doc = load(&player_fixture(1000)).unwrap();
    let paths: Vec<String> = doc.iter().map(|(path, _)| path).collect();
    assert_eq!(paths, ["Player.Stats", "Player.Stats.XP"]);

    let xp = doc
        .iter()
        .find(|(path, _)| path == "Player.Stats.XP")
        .map(|(_, value)| value.clone())
        .unwrap();
    assert!(matches!(xp, Value::Primitive(PrimitiveValue::Int32(1000))));
}

#[test]
fn reference_integrity_holds_for_reachable_references() {
    let doc = load(&reference_fixture()).unwrap();
    for (_, value) in doc.iter() {
        if let Value::Reference(id) = value {
            assert!(doc.lookup(*id).is_some());
        }
    }
}

#[test]
fn type_mismatch_rejects_the_edit() {
    let mut doc = load(&single_class_fixture()).unwrap();
    assert!(matches!(
        doc.set_primitive("X", PrimitiveValue::String("abc".into())),
        Err(Error::TypeMismatch { .. })
    ));
    // The failed edit committed nothing.
    assert_eq!(save(&doc).unwrap(), single_class_fixture());
}

#[test]
fn missing_paths_are_not_errors_for_get() {
    let doc = load(&single_class_fixture()).unwrap();
    assert!(doc.get("Y").is_none());
    assert!(doc.get("X[0]").is_none());
    assert!(doc.get("X.Y").is_none());
}

#[test]
fn missing_paths_fail_edits() {
    let mut doc = load(&single_class_fixture()).unwrap();
    assert!(matches!(
        doc.set_primitive("Y", PrimitiveValue::Int32(1)),
        Err(Error::PathNotFound(_))
    ));
}

#[test]
fn duplicate_object_ids_are_rejected() {
    let bytes = Stream::new(7)
        .u8(6)
        .i32(7)
        .str("a")
        .u8(6)
        .i32(7)
        .str("b")
        .end();
    assert!(matches!(load(&bytes), Err(Error::DuplicateObjectId(7))));
}

#[test]
fn missing_root_is_rejected() {
    let bytes = Stream::new(99).u8(6).i32(1).str("a").end();
    assert!(matches!(load(&bytes), Err(Error::RootNotFound(99))));
}

#[test]
fn unknown_metadata_id_is_rejected() {
    let bytes = Stream::new(1).u8(1).i32(1).i32(55).end();
    assert!(matches!(load(&bytes), Err(Error::UnknownMetadataId(55))));
}

#[test]
fn record_budget_bounds_decoding() {
    let bytes = reference_fixture();
    let options = DecodeOptions {
        max_records: 1,
        ..Default::default()
    };
    assert!(matches!(
        Document::decode_with_options(&bytes, options),
        Err(Error::RecordBudgetExceeded)
    ));
}

#[test]
fn truncated_streams_are_eof() {
    let bytes = single_class_fixture();
    assert!(matches!(
        load(&bytes[..bytes.len() - 6]),
        Err(Error::UnexpectedEof)
    ));
}

#[test]
fn stats_count_the_graph() {
    let doc = load(&class_with_id_fixture()).unwrap();
    let stats = doc.stats();
    // Library, array, Vec3, four ClassWithId.
    assert_eq!(stats.record_count, 7);
    assert_eq!(stats.object_count, 6);
    assert_eq!(stats.library_count, 1);
}

#[test]
fn records_serialize_to_json() {
    let doc = load(&single_class_fixture()).unwrap();
    let json = serde_json::to_string(doc.record(doc.root())).unwrap();
    assert!(json.contains("Sys.Int"));
}
