// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::OptionsError;

use clap::{Arg, ArgAction, ArgMatches, Command};
use itertools::Itertools;

/// Creates the clap::Command metadata for argument parsing.
fn make_options_parser() -> Command {
    Command::new("slicer")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Replays a dependency trace and reports the stores an interpolant depends on.")
        .arg(Arg::new("no_existential")
            .long("no_existential")
            .action(ArgAction::SetTrue)
            .help("Do not rewrite core stores over shadow arrays.")
            .long_help("By default the core stores are expressed over shadow arrays, so that the interpolant can quantify them existentially."))
        .arg(Arg::new("all_stores")
            .long("all_stores")
            .action(ArgAction::SetTrue)
            .help("Report every store, not just the core ones."))
        .arg(Arg::new("dump")
            .long("dump")
            .action(ArgAction::SetTrue)
            .help("Print the dependency frames to stderr after the replay."))
        .arg(Arg::new("trace")
            .value_name("TRACE")
            .num_args(0..)
            .help("JSON dependency traces to replay."))
}

/// Represents options passed to the slicer.
#[derive(Debug)]
pub struct Options {
    /// Rewrite core stores over shadow arrays.
    pub existential: bool,
    pub all_stores: bool,
    pub dump: bool,
    pub traces: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            existential: true,
            all_stores: false,
            dump: false,
            traces: Vec::new(),
        }
    }
}

impl Options {
    /// Parse options from an argument string. The argument string will be split using unix
    /// shell escaping rules.
    pub fn parse_from_str(&mut self, s: &str) -> Result<(), OptionsError> {
        let args = shellwords::split(s)?;
        self.parse(&args)
    }

    /// Parses options from a list of strings. Everything after the leftmost `--` token is
    /// taken to be a trace file name, even if it looks like an option.
    pub fn parse(&mut self, args: &[String]) -> Result<(), OptionsError> {
        let (option_args, trailing) = match args.iter().find_position(|s| s.as_str() == "--") {
            Some((p, _)) => (&args[0..p], &args[p + 1..]),
            None => (args, &args[args.len()..]),
        };
        let matches = make_options_parser().try_get_matches_from(option_args.iter())?;
        self.apply(&matches);
        self.traces.extend(trailing.iter().cloned());
        Ok(())
    }

    fn apply(&mut self, matches: &ArgMatches) {
        if matches.get_flag("no_existential") {
            self.existential = false;
        }
        if matches.get_flag("all_stores") {
            self.all_stores = true;
        }
        if matches.get_flag("dump") {
            self.dump = true;
        }
        if let Some(traces) = matches.get_many::<String>("trace") {
            self.traces.extend(traces.cloned());
        }
    }
}
