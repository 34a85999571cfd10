// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// External functions whose effect on dependencies is summarized by hand.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialOrd, PartialEq, Hash, Ord)]
pub enum KnownNames {
    /// This is not a known name
    None,
    Calloc,
    CtypeBLoc,
    CtypeBLocArgs,
    ErrnoLocation,
    Fchmodat,
    Fchownat,
    Fflush,
    FstreamIsOpen,
    Getenv,
    Geteuid,
    Getpagesize,
    Gettimeofday,
    Ioctl,
    IstreamSeekg,
    IstreamTellg,
    KleeGetValue,
    Malloc,
    OperatorNew,
    OperatorNewArray,
    Powl,
    Printf,
    Puts,
    Realloc,
    Strcmp,
    Strncmp,
    Syscall,
    Vprintf,
}

/// The number of expressions (the result followed by the arguments) that a call must come
/// with for its summary to apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    Any,
    AtLeast(usize),
    Exactly(usize),
}

impl Arity {
    pub fn accepts(self, number_of_expressions: usize) -> bool {
        match self {
            Arity::Any => true,
            Arity::AtLeast(n) => number_of_expressions >= n,
            Arity::Exactly(n) => number_of_expressions == n,
        }
    }
}

/// How the result of a summarized call depends on its operands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallRule {
    /// The result is a new value that depends on nothing.
    FreshResult,
    /// The result points to newly allocated memory.
    Allocation,
    /// The first few operands flow into the result.
    FlowFromOperands(usize),
    /// Every operand that has an expression flows into the result.
    FlowFromAllOperands,
}

lazy_static! {
    static ref KNOWN_NAMES: HashMap<&'static str, KnownNames> = {
        let mut map = HashMap::new();
        map.insert("__ctype_b_loc", KnownNames::CtypeBLoc);
        map.insert("__ctype_b_locargs", KnownNames::CtypeBLocArgs);
        map.insert("__errno_location", KnownNames::ErrnoLocation);
        map.insert("_Znam", KnownNames::OperatorNewArray);
        map.insert("_Znwm", KnownNames::OperatorNew);
        map.insert("_ZNSi5seekgElSt12_Ios_Seekdir", KnownNames::IstreamSeekg);
        map.insert("_ZNSi5tellgEv", KnownNames::IstreamTellg);
        map.insert(
            "_ZNSt13basic_fstreamIcSt11char_traitsIcEE7is_openEv",
            KnownNames::FstreamIsOpen,
        );
        map.insert("calloc", KnownNames::Calloc);
        map.insert("fchmodat", KnownNames::Fchmodat);
        map.insert("fchownat", KnownNames::Fchownat);
        map.insert("fflush", KnownNames::Fflush);
        map.insert("getenv", KnownNames::Getenv);
        map.insert("geteuid", KnownNames::Geteuid);
        map.insert("getpagesize", KnownNames::Getpagesize);
        map.insert("gettimeofday", KnownNames::Gettimeofday);
        map.insert("ioctl", KnownNames::Ioctl);
        map.insert("malloc", KnownNames::Malloc);
        map.insert("powl", KnownNames::Powl);
        map.insert("printf", KnownNames::Printf);
        map.insert("puts", KnownNames::Puts);
        map.insert("realloc", KnownNames::Realloc);
        map.insert("strcmp", KnownNames::Strcmp);
        map.insert("strncmp", KnownNames::Strncmp);
        map.insert("syscall", KnownNames::Syscall);
        map.insert("vprintf", KnownNames::Vprintf);
        map
    };
}

const GET_VALUE_PREFIX: &str = "klee_get_value";

impl KnownNames {
    /// Maps the name of a called function to its known name, KnownNames::None if there is
    /// no summary for it.
    pub fn from_function_name(name: &str) -> KnownNames {
        if let Some(known_name) = KNOWN_NAMES.get(name) {
            return *known_name;
        }
        if name.starts_with(GET_VALUE_PREFIX) {
            return KnownNames::KleeGetValue;
        }
        KnownNames::None
    }

    pub fn arity(self) -> Arity {
        use KnownNames::*;
        match self {
            None => Arity::Any,
            Fflush | OperatorNew | OperatorNewArray | Puts | Strcmp | Strncmp => Arity::AtLeast(1),
            Calloc | CtypeBLoc | CtypeBLocArgs | ErrnoLocation | Geteuid | Getpagesize
            | Malloc | Realloc => Arity::Exactly(1),
            FstreamIsOpen | Getenv | IstreamTellg | KleeGetValue => Arity::Exactly(2),
            Gettimeofday | Powl | Vprintf => Arity::Exactly(3),
            Ioctl | IstreamSeekg => Arity::Exactly(4),
            Fchmodat => Arity::Exactly(5),
            Fchownat => Arity::Exactly(6),
            Printf | Syscall => Arity::AtLeast(2),
        }
    }

    pub fn rule(self) -> CallRule {
        use KnownNames::*;
        match self {
            None | CtypeBLoc | CtypeBLocArgs | ErrnoLocation | Fflush | Geteuid | Getpagesize
            | Ioctl | OperatorNew | OperatorNewArray | Puts | Strcmp | Strncmp => {
                CallRule::FreshResult
            }
            Calloc | Getenv | Malloc => CallRule::Allocation,
            FstreamIsOpen | IstreamTellg | KleeGetValue | Realloc => CallRule::FlowFromOperands(1),
            Fchmodat | Fchownat | Gettimeofday | Powl | Vprintf => CallRule::FlowFromOperands(2),
            IstreamSeekg => CallRule::FlowFromOperands(3),
            Printf | Syscall => CallRule::FlowFromAllOperands,
        }
    }

    /// The rule that applies to a call of this function with the given number of expressions,
    /// or None if the call is to be handled as a call to an unknown function.
    pub fn rule_for_arity(self, number_of_expressions: usize) -> Option<CallRule> {
        if self != KnownNames::None && self.arity().accepts(number_of_expressions) {
            Some(self.rule())
        } else {
            Option::None
        }
    }
}
