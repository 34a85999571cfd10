// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use slicer::errors::OptionsError;
use slicer::options::Options;

#[test]
fn defaults() {
    let options = Options::default();
    assert!(options.existential);
    assert!(!options.all_stores);
    assert!(!options.dump);
    assert!(options.traces.is_empty());
}

#[test]
fn parse_flags_and_traces() {
    let mut options = Options::default();
    options
        .parse_from_str("--no_existential --dump a.json 'b c.json'")
        .unwrap();
    assert!(!options.existential);
    assert!(options.dump);
    assert!(!options.all_stores);
    assert_eq!(options.traces, vec!["a.json", "b c.json"]);
}

#[test]
fn everything_after_double_dash_is_a_trace() {
    let mut options = Options::default();
    options.parse_from_str("--all_stores -- --dump x.json").unwrap();
    assert!(options.all_stores);
    assert!(!options.dump);
    assert_eq!(options.traces, vec!["--dump", "x.json"]);
}

#[test]
fn parsing_accumulates() {
    let mut options = Options::default();
    options.parse_from_str("--dump").unwrap();
    options.parse_from_str("t.json").unwrap();
    assert!(options.dump);
    assert_eq!(options.traces, vec!["t.json"]);
}

#[test]
fn bad_arguments() {
    let mut options = Options::default();
    assert!(matches!(
        options.parse_from_str("\"unterminated"),
        Err(OptionsError::Split(..))
    ));
    assert!(matches!(
        options.parse_from_str("--bogus"),
        Err(OptionsError::Clap(..))
    ));
}
