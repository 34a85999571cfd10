// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use slicer::options::Options;
use slicer::trace;
use std::path::PathBuf;
use std::str::FromStr;
use walkdir::WalkDir;

// Replays the traces in the tests/run-pass directory.
#[test]
fn run_pass() {
    let mut run_pass_path = PathBuf::from_str("tests/run-pass").unwrap();
    if !run_pass_path.exists() {
        run_pass_path = PathBuf::from_str("slicer/tests/run-pass").unwrap();
    }
    assert_eq!(run_directory(run_pass_path), 0);
}

// Iterates through the trace files in the directory at the given path and replays each as a
// separate test case. Returns the number of cases that failed.
fn run_directory(directory_path: PathBuf) -> usize {
    let mut failures = 0;
    let mut cases = 0;
    for entry in WalkDir::new(directory_path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        cases += 1;
        failures += replay_case(&entry.path().to_path_buf());
    }
    assert!(cases > 0, "no traces found");
    failures
}

// Replays the single trace found at file_path, with the options given by its flags.
fn replay_case(file_path: &PathBuf) -> usize {
    let file_name = file_path.display().to_string();
    let trace = match trace::load_trace(file_path) {
        Ok(trace) => trace,
        Err(e) => {
            println!("{} failed to load: {}", file_name, e);
            return 1;
        }
    };
    let mut options = Options::default();
    if let Some(flags) = &trace.flags {
        if let Err(e) = options.parse_from_str(flags) {
            println!("{} has bad flags: {}", file_name, e);
            return 1;
        }
    }
    match trace::replay(&trace, &options) {
        Ok(report) if report.failed_expectations.is_empty() => 0,
        Ok(report) => {
            for failure in report.failed_expectations.iter() {
                println!("{}: {}", file_name, failure);
            }
            1
        }
        Err(e) => {
            println!("{} failed: {}", file_name, e);
            1
        }
    }
}
