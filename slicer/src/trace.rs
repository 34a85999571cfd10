// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Replays a recorded sequence of instruction effects against a dependency frame chain.
//!
//! A trace is a JSON document with two parts. `values` declares the program values the trace
//! refers to, each by a unique name. Operands and function parameters refer to values that
//! are declared earlier. `events` lists what the interpreter did along the path, in order,
//! including expectations about which values must (not) have become core.

use crate::dependency::{ConcreteStore, Dependency, SymbolicStore};
use crate::errors::TraceError;
use crate::expression::{Array, Expression};
use crate::options::Options;
use crate::program::{Opcode, ProgramValue, ValueKind, ValueType};
use crate::shadow_array::InterpolationSession;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Deserialize)]
pub struct Trace {
    /// Options to replay this trace with, in command line syntax.
    #[serde(default)]
    pub flags: Option<String>,
    pub values: Vec<ValueDeclaration>,
    pub events: Vec<TraceEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueDeclaration {
    Argument {
        name: String,
        function: String,
        ordinal: usize,
        value_type: ValueType,
    },
    Constant {
        name: String,
        value_type: ValueType,
    },
    ConstantExpr {
        name: String,
        opcode: Opcode,
        #[serde(default)]
        operands: Vec<String>,
        value_type: ValueType,
    },
    Function {
        name: String,
        #[serde(default)]
        intrinsic: bool,
        #[serde(default)]
        parameters: Vec<String>,
        return_type: ValueType,
    },
    GlobalVariable {
        name: String,
    },
    Instruction {
        name: String,
        function: String,
        opcode: Opcode,
        #[serde(default)]
        operands: Vec<String>,
        value_type: ValueType,
    },
}

impl ValueDeclaration {
    fn name(&self) -> &str {
        match self {
            ValueDeclaration::Argument { name, .. }
            | ValueDeclaration::Constant { name, .. }
            | ValueDeclaration::ConstantExpr { name, .. }
            | ValueDeclaration::Function { name, .. }
            | ValueDeclaration::GlobalVariable { name }
            | ValueDeclaration::Instruction { name, .. } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Execute {
        instruction: String,
        expressions: Vec<Rc<Expression>>,
        #[serde(default)]
        error: bool,
    },
    Phi {
        instruction: String,
        incoming: usize,
        expression: Rc<Expression>,
        #[serde(default)]
        error: bool,
    },
    MemoryOperation {
        instruction: String,
        expressions: Vec<Rc<Expression>>,
        bounds_check: bool,
        #[serde(default)]
        error: bool,
    },
    /// Continue in a new child of the current frame.
    Fork,
    /// Abandon the current frame and continue in a new sibling of it.
    Backtrack,
    BindCall {
        site: String,
        arguments: Vec<Rc<Expression>>,
    },
    BindReturn {
        site: String,
        ret: String,
        expression: Rc<Expression>,
    },
    ShadowArray {
        source: Rc<Array>,
        target: Rc<Array>,
    },
    Expect {
        #[serde(default)]
        core: Vec<String>,
        #[serde(default)]
        not_core: Vec<String>,
        #[serde(default)]
        core_locations: Option<usize>,
    },
}

/// A stored value, in the textual form of its expressions.
#[derive(Debug, Serialize, Eq, PartialEq)]
pub struct StoreEntry {
    pub address: String,
    pub value: String,
}

#[derive(Debug, Default, Serialize)]
pub struct StoreReport {
    pub concrete: BTreeMap<String, BTreeMap<u64, StoreEntry>>,
    pub symbolic: BTreeMap<String, Vec<StoreEntry>>,
    /// The shadow arrays used by the reported expressions.
    pub shadow_arrays: Vec<String>,
}

impl StoreReport {
    fn new(stores: (ConcreteStore, SymbolicStore), session: &InterpolationSession) -> StoreReport {
        let (concrete_store, symbolic_store) = stores;
        let concrete = concrete_store
            .into_iter()
            .map(|(site, by_address)| {
                let entries = by_address
                    .into_iter()
                    .map(|(address, pair)| {
                        let entry = StoreEntry {
                            address: pair.address.to_string(),
                            value: pair.value.to_string(),
                        };
                        (address, entry)
                    })
                    .collect();
                (site.to_string(), entries)
            })
            .collect();
        let symbolic = symbolic_store
            .into_iter()
            .map(|(site, pairs)| {
                let entries = pairs
                    .into_iter()
                    .map(|pair| StoreEntry {
                        address: pair.address.to_string(),
                        value: pair.value.to_string(),
                    })
                    .collect();
                (site.to_string(), entries)
            })
            .collect();
        let shadow_arrays = session
            .replacements
            .iter()
            .map(|a| a.name.to_string())
            .collect();
        StoreReport {
            concrete,
            symbolic,
            shadow_arrays,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub failed_expectations: Vec<String>,
    pub stores: StoreReport,
    /// The frame chain at the end of the replay, if asked for.
    #[serde(skip)]
    pub dump: Option<String>,
}

/// Creates the program values declared by a trace.
pub fn declare_values(
    declarations: &[ValueDeclaration],
) -> Result<HashMap<String, Rc<ProgramValue>>, TraceError> {
    let mut values: HashMap<String, Rc<ProgramValue>> = HashMap::new();
    let lookup = |values: &HashMap<String, Rc<ProgramValue>>, names: &[String]| {
        names
            .iter()
            .map(|n| {
                values
                    .get(n)
                    .cloned()
                    .ok_or_else(|| TraceError::UnknownValueName(n.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
    };

    for declaration in declarations.iter() {
        let name = declaration.name();
        if values.contains_key(name) {
            return Err(TraceError::DuplicateValueName(name.to_string()));
        }
        let value = match declaration {
            ValueDeclaration::Argument {
                function,
                ordinal,
                value_type,
                ..
            } => ProgramValue::argument(name, function, *ordinal, *value_type),
            ValueDeclaration::Constant { value_type, .. } => {
                ProgramValue::constant(name, *value_type)
            }
            ValueDeclaration::ConstantExpr {
                opcode,
                operands,
                value_type,
                ..
            } => ProgramValue::new(
                name,
                ValueKind::ConstantExpr { opcode: *opcode },
                lookup(&values, operands)?,
                *value_type,
            ),
            ValueDeclaration::Function {
                intrinsic,
                parameters,
                return_type,
                ..
            } => ProgramValue::function(
                name,
                *intrinsic,
                lookup(&values, parameters)?,
                *return_type,
            ),
            ValueDeclaration::GlobalVariable { .. } => ProgramValue::global_variable(name),
            ValueDeclaration::Instruction {
                function,
                opcode,
                operands,
                value_type,
                ..
            } => ProgramValue::instruction(
                name,
                function,
                *opcode,
                lookup(&values, operands)?,
                *value_type,
            ),
        };
        values.insert(name.to_string(), value);
    }
    Ok(values)
}

/// The state of a replay: the declared values, the current frame and the interpolation
/// session that collects shadow arrays.
pub struct Replayer {
    values: HashMap<String, Rc<ProgramValue>>,
    frame: Dependency,
    session: InterpolationSession,
    failed_expectations: Vec<String>,
}

impl Replayer {
    pub fn new(values: HashMap<String, Rc<ProgramValue>>, existential: bool) -> Replayer {
        Replayer {
            values,
            frame: Dependency::new_root(),
            session: InterpolationSession::new(existential),
            failed_expectations: Vec::new(),
        }
    }

    pub fn frame(&self) -> &Dependency {
        &self.frame
    }

    fn value(&self, name: &str) -> Result<Rc<ProgramValue>, TraceError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| TraceError::UnknownValueName(name.to_string()))
    }

    /// Applies one event to the current frame.
    pub fn apply(&mut self, index: usize, event: &TraceEvent) -> Result<(), TraceError> {
        let wrap = |source| TraceError::Dependency { index, source };
        match event {
            TraceEvent::Execute {
                instruction,
                expressions,
                error,
            } => {
                let instruction = self.value(instruction)?;
                self.frame
                    .execute(&instruction, expressions, *error)
                    .map_err(wrap)?;
            }
            TraceEvent::Phi {
                instruction,
                incoming,
                expression,
                error,
            } => {
                let instruction = self.value(instruction)?;
                self.frame
                    .execute_phi(&instruction, *incoming, expression, *error)
                    .map_err(wrap)?;
            }
            TraceEvent::MemoryOperation {
                instruction,
                expressions,
                bounds_check,
                error,
            } => {
                let instruction = self.value(instruction)?;
                self.frame
                    .execute_memory_operation(&instruction, expressions, *bounds_check, *error)
                    .map_err(wrap)?;
            }
            TraceEvent::Fork => {
                let parent = std::mem::replace(&mut self.frame, Dependency::new_root());
                self.frame = Dependency::new_child(Rc::new(parent));
            }
            TraceEvent::Backtrack => match self.frame.parent().cloned() {
                Some(parent) => self.frame = Dependency::new_child(parent),
                None => self
                    .failed_expectations
                    .push(format!("event {}: backtrack from the root frame", index)),
            },
            TraceEvent::BindCall { site, arguments } => {
                let site = self.value(site)?;
                self.frame
                    .bind_call_arguments(&site, arguments)
                    .map_err(wrap)?;
            }
            TraceEvent::BindReturn {
                site,
                ret,
                expression,
            } => {
                let site = self.value(site)?;
                let ret = self.value(ret)?;
                self.frame
                    .bind_return_value(&site, &ret, expression)
                    .map_err(wrap)?;
            }
            TraceEvent::ShadowArray { source, target } => {
                self.session
                    .add_shadow_array_map(source.clone(), target.clone());
            }
            TraceEvent::Expect {
                core,
                not_core,
                core_locations,
            } => self.check(index, core, not_core, *core_locations)?,
        }
        Ok(())
    }

    fn check(
        &mut self,
        index: usize,
        core: &[String],
        not_core: &[String],
        core_locations: Option<usize>,
    ) -> Result<(), TraceError> {
        for name in core.iter() {
            let value = self.value(name)?;
            match self.frame.get_latest_value_no_constant_check(&value) {
                Some(v) if v.is_core() => {}
                Some(v) => self
                    .failed_expectations
                    .push(format!("event {}: {} is not core", index, v)),
                None => self
                    .failed_expectations
                    .push(format!("event {}: {} has no version", index, name)),
            }
        }
        for name in not_core.iter() {
            let value = self.value(name)?;
            if let Some(v) = self.frame.get_latest_value_no_constant_check(&value) {
                if v.is_core() {
                    self.failed_expectations
                        .push(format!("event {}: {} is core", index, v));
                }
            }
        }
        if let Some(expected) = core_locations {
            let actual = self.frame.get_all_versioned_locations(true).len();
            if actual != expected {
                self.failed_expectations.push(format!(
                    "event {}: expected {} core locations, found {}",
                    index, expected, actual
                ));
            }
        }
        Ok(())
    }

    /// Produces the report of the stores of the current frame chain.
    pub fn finish(mut self, options: &Options, events: usize) -> Result<ReplayReport, TraceError> {
        let stores = self
            .frame
            .get_stored_expressions(&mut self.session, !options.all_stores)
            .map_err(|source| TraceError::Dependency {
                index: events,
                source,
            })?;
        let dump = if options.dump {
            Some(self.frame.to_string())
        } else {
            None
        };
        Ok(ReplayReport {
            events,
            failed_expectations: self.failed_expectations,
            stores: StoreReport::new(stores, &self.session),
            dump,
        })
    }
}

/// Replays every event of the trace in a new root frame.
pub fn replay(trace: &Trace, options: &Options) -> Result<ReplayReport, TraceError> {
    let values = declare_values(&trace.values)?;
    let mut replayer = Replayer::new(values, options.existential);
    for (index, event) in trace.events.iter().enumerate() {
        debug!("event {}: {:?}", index, event);
        replayer.apply(index, event)?;
    }
    replayer.finish(options, trace.events.len())
}

pub fn load_trace(path: &Path) -> Result<Trace, TraceError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn replay_file(path: &Path, options: &Options) -> Result<ReplayReport, TraceError> {
    info!("replaying {}", path.display());
    let trace = load_trace(path)?;
    replay(&trace, options)
}
