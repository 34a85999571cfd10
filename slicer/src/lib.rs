// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Computes the part of an explored execution path that an unsatisfiability core depends
//! on, so that an interpolant can be built from that slice rather than from the whole path.

#[macro_use]
extern crate log;

pub mod dependency;
pub mod errors;
pub mod expression;
pub mod known_names;
pub mod location_graph;
pub mod options;
pub mod program;
pub mod shadow_array;
pub mod trace;
pub mod utils;
pub mod versioned_value;
