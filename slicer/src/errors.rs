// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::program::Opcode;

use thiserror::Error;

/// Internal consistency violations detected while recording dependencies.
/// Any of these means that the dependency relations of the current path can no longer be
/// trusted, so the host should abandon the analysis of the path.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// The instruction table has no entry for this opcode with this number of expressions.
    #[error("unhandled instruction {name} ({opcode:?}) with {arity} expressions")]
    UnhandledInstruction {
        name: String,
        opcode: Opcode,
        arity: usize,
    },

    /// The value is not an instruction, so it has no effect to execute.
    #[error("{0} is not an instruction")]
    NotAnInstruction(String),

    /// An operand has no tracked version and none of the fallbacks apply.
    #[error("operand {operand} of {instruction} not found")]
    OperandNotFound {
        instruction: String,
        operand: String,
    },

    /// A value that feeds a branch condition or a checked address has never been recorded.
    #[error("unknown value {0}")]
    UnknownValue(String),

    /// The address operand of a load has a version but does not resolve to any location.
    #[error("address operand of {0} is not a location")]
    LoadAddressUnresolved(String),

    /// A call that returns a value was executed without an expression for the result.
    #[error("non-void call {0} missing return expression")]
    MissingReturnExpression(String),

    /// A bounds checked memory operation that is neither a load nor a store.
    #[error("unknown memory operation {0}")]
    UnknownMemoryOperation(String),

    /// An array is read by an expression that is being shadowed but it has no shadow.
    #[error("no shadow array registered for array {0}")]
    MissingShadowArray(String),
}

/// Problems with loading or replaying a dependency trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("value {0} is used before it is declared")]
    UnknownValueName(String),

    #[error("value {0} is declared more than once")]
    DuplicateValueName(String),

    #[error("event {index}: {source}")]
    Dependency {
        index: usize,
        #[source]
        source: DependencyError,
    },
}

/// Problems with the command line or with flags from the environment.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("cannot parse argument string: {0}")]
    Split(#[from] shellwords::MismatchedQuotes),

    #[error(transparent)]
    Clap(#[from] clap::Error),
}
