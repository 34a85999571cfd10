// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use slicer::errors::{DependencyError, TraceError};
use slicer::options::Options;
use slicer::trace::{self, Trace};

fn parse(text: &str) -> Trace {
    serde_json::from_str(text).unwrap()
}

const STORE_TRACE: &str = r#"{
  "values": [
    {"kind": "constant", "name": "k", "value_type": {"Integer": 8}},
    {"kind": "instruction", "name": "p", "function": "f", "opcode": "Alloca", "value_type": "Pointer"},
    {"kind": "instruction", "name": "x", "function": "f", "opcode": "Add", "operands": ["k", "k"], "value_type": {"Integer": 8}},
    {"kind": "instruction", "name": "st", "function": "f", "opcode": "Store", "operands": ["x", "p"], "value_type": "Void"},
    {"kind": "instruction", "name": "ld", "function": "f", "opcode": "Load", "operands": ["p"], "value_type": {"Integer": 8}},
    {"kind": "instruction", "name": "cmp", "function": "f", "opcode": "ICmp", "operands": ["ld", "k"], "value_type": {"Integer": 1}},
    {"kind": "instruction", "name": "br", "function": "f", "opcode": "Br", "operands": ["cmp"], "value_type": "Void"}
  ],
  "events": [
    {"event": "execute", "instruction": "p", "expressions": [{"Constant": {"value": 64, "width": 64}}]},
    {"event": "execute", "instruction": "x", "expressions": [
      {"Read": {"updates": {"root": {"name": "in", "size": 1}, "head": null}, "index": {"Constant": {"value": 0, "width": 32}}}},
      {"Read": {"updates": {"root": {"name": "in", "size": 1}, "head": null}, "index": {"Constant": {"value": 0, "width": 32}}}},
      {"Constant": {"value": 0, "width": 8}}]},
    {"event": "execute", "instruction": "st", "expressions": [
      {"Read": {"updates": {"root": {"name": "in", "size": 1}, "head": null}, "index": {"Constant": {"value": 0, "width": 32}}}},
      {"Constant": {"value": 64, "width": 64}}]},
    {"event": "execute", "instruction": "ld", "expressions": [
      {"Read": {"updates": {"root": {"name": "in", "size": 1}, "head": null}, "index": {"Constant": {"value": 0, "width": 32}}}},
      {"Constant": {"value": 64, "width": 64}}]},
    {"event": "execute", "instruction": "cmp", "expressions": [
      {"Constant": {"value": 1, "width": 1}},
      {"Read": {"updates": {"root": {"name": "in", "size": 1}, "head": null}, "index": {"Constant": {"value": 0, "width": 32}}}},
      {"Constant": {"value": 0, "width": 8}}]},
    {"event": "execute", "instruction": "br", "expressions": []}
  ]
}"#;

#[test]
fn store_report_is_shadowed() {
    let mut trace = parse(STORE_TRACE);
    let shadow: trace::TraceEvent = serde_json::from_str(
        r#"{"event": "shadow_array", "source": {"name": "in", "size": 1}, "target": {"name": "in'", "size": 1}}"#,
    )
    .unwrap();
    trace.events.insert(0, shadow);

    let report = trace::replay(&trace, &Options::default()).unwrap();
    assert!(report.failed_expectations.is_empty());
    assert_eq!(report.events, 7);
    assert_eq!(report.stores.shadow_arrays, vec!["in'"]);
    let stores = report.stores.concrete.get("f/%p = Alloca").unwrap();
    let entry = stores.get(&64).unwrap();
    assert_eq!(entry.value, "(Read w8 (w32 0) in')");
    assert!(report.stores.symbolic.is_empty());
    assert!(report.dump.is_none());
}

#[test]
fn store_report_without_shadows() {
    let trace = parse(STORE_TRACE);
    let mut options = Options::default();
    options.parse_from_str("--no_existential --dump").unwrap();
    let report = trace::replay(&trace, &options).unwrap();
    assert!(report.stores.shadow_arrays.is_empty());
    let stores = report.stores.concrete.get("f/%p = Alloca").unwrap();
    assert_eq!(stores.get(&64).unwrap().value, "(Read w8 (w32 0) in)");
    assert!(report.dump.unwrap().contains("STORAGE:"));
}

#[test]
fn shadowing_without_a_shadow_array() {
    let trace = parse(STORE_TRACE);
    match trace::replay(&trace, &Options::default()) {
        Err(TraceError::Dependency {
            index,
            source: DependencyError::MissingShadowArray(name),
        }) => {
            assert_eq!(index, 6);
            assert_eq!(name, "in");
        }
        other => panic!("unexpected result {:?}", other.map(|r| r.events)),
    }
}

#[test]
fn the_report_serializes() {
    let trace = parse(STORE_TRACE);
    let mut options = Options::default();
    options.parse_from_str("--no_existential").unwrap();
    let report = trace::replay(&trace, &options).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["events"], 6);
    assert!(json.get("dump").is_none());
    assert!(json["stores"]["concrete"]["f/%p = Alloca"]["64"].is_object());
}

#[test]
fn failed_expectations_are_reported() {
    let trace = parse(
        r#"{
  "values": [
    {"kind": "constant", "name": "k", "value_type": {"Integer": 8}},
    {"kind": "instruction", "name": "x", "function": "f", "opcode": "Add", "operands": ["k", "k"], "value_type": {"Integer": 8}}
  ],
  "events": [
    {"event": "execute", "instruction": "x", "expressions": [
      {"Constant": {"value": 2, "width": 8}}, {"Constant": {"value": 1, "width": 8}}, {"Constant": {"value": 1, "width": 8}}]},
    {"event": "expect", "core": ["x"], "core_locations": 1},
    {"event": "backtrack"}
  ]
}"#,
    );
    let report = trace::replay(&trace, &Options::default()).unwrap();
    assert_eq!(report.failed_expectations.len(), 3);
}

#[test]
fn declarations_must_be_in_order() {
    let trace = parse(
        r#"{
  "values": [
    {"kind": "instruction", "name": "x", "function": "f", "opcode": "Add", "operands": ["k"], "value_type": {"Integer": 8}},
    {"kind": "constant", "name": "k", "value_type": {"Integer": 8}}
  ],
  "events": []
}"#,
    );
    assert!(matches!(
        trace::declare_values(&trace.values),
        Err(TraceError::UnknownValueName(name)) if name == "k"
    ));

    let trace = parse(
        r#"{
  "values": [
    {"kind": "global_variable", "name": "g"},
    {"kind": "global_variable", "name": "g"}
  ],
  "events": []
}"#,
    );
    assert!(matches!(
        trace::replay(&trace, &Options::default()),
        Err(TraceError::DuplicateValueName(..))
    ));
}
