// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

extern crate env_logger;

use slicer::errors::OptionsError;
use slicer::options::Options;
use slicer::trace;
use std::env;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize loggers.
    if env::var("SLICER_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("SLICER_LOG")
            .write_style("SLICER_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let mut options = Options::default();
    if let Ok(flags) = env::var("SLICER_FLAGS") {
        options.parse_from_str(&flags)?;
    }
    let command_line_arguments: Vec<String> = env::args().skip(1).collect();
    match options.parse(&command_line_arguments) {
        Ok(()) => {}
        Err(OptionsError::Clap(e)) => e.exit(),
        Err(e) => return Err(e.into()),
    }

    let mut failures = 0;
    for trace_path in options.traces.iter() {
        let report = trace::replay_file(Path::new(trace_path), &options)?;
        if let Some(dump) = &report.dump {
            eprintln!("{}", dump);
        }
        for failure in report.failed_expectations.iter() {
            eprintln!("{}: {}", trace_path, failure);
        }
        failures += report.failed_expectations.len();
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if failures > 0 {
        return Err(format!("{} expectations failed", failures).into());
    }
    Ok(())
}
