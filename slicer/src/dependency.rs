// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Field-insensitive dependency tracking along one execution path.
//!
//! A `Dependency` frame records how the values computed by executed instructions depend on
//! each other and on the content of memory. The recorded relations are all local and cheap to
//! build: which locations a value points to, which value a location currently stores, and
//! from which values a value was directly computed. Transitive questions are only answered
//! on demand, by traversing these relations, so that nothing quadratic is ever stored.
//!
//! Frames form a chain. A frame can read everything its ancestors recorded, but only ever
//! writes its own relations. Forking an execution path creates a child frame over the
//! current one, so several live paths can share the history of their common prefix.

use crate::errors::DependencyError;
use crate::expression::Expression;
use crate::known_names::{CallRule, KnownNames};
use crate::location_graph::LocationGraph;
use crate::program::{Opcode, ProgramValue};
use crate::shadow_array::InterpolationSession;
use crate::utils;
use crate::versioned_value::{MemoryLocation, VersionedValue};

use log_derive::{logfn, logfn_inputs};
use mirai_annotations::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// The address of a stored value together with the value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressValuePair {
    pub address: Rc<Expression>,
    pub value: Rc<Expression>,
}

/// Stores at constant addresses, by allocation site and then by numeric address.
pub type ConcreteStore = BTreeMap<Rc<ProgramValue>, BTreeMap<u64, AddressValuePair>>;

/// Stores at symbolic addresses, by allocation site.
pub type SymbolicStore = BTreeMap<Rc<ProgramValue>, Vec<AddressValuePair>>;

/// The locations a value was computed from, each paired with the value that was loaded from
/// the location on the way. The value is absent when the location was found by looking up
/// where a value had been stored.
pub type LocationSources = BTreeMap<Option<Rc<VersionedValue>>, Rc<MemoryLocation>>;

type FlowSources = BTreeMap<Rc<VersionedValue>, Option<Rc<MemoryLocation>>>;

/// The dependency relations recorded by one frame.
pub struct Dependency {
    id: usize,
    parent: Option<Rc<Dependency>>,

    /// All versions of a program value created by this frame, the latest last.
    values_map: BTreeMap<Rc<ProgramValue>, Vec<Rc<VersionedValue>>>,

    /// All locations created by this frame, in creation order.
    versioned_locations: Vec<Rc<MemoryLocation>>,

    /// The locations a value points to, the latest last.
    equality_map: BTreeMap<Rc<VersionedValue>, Vec<Rc<MemoryLocation>>>,

    /// The value most recently stored into a location.
    stores_map: BTreeMap<Rc<MemoryLocation>, Rc<VersionedValue>>,

    /// Every location a value was ever stored into, the latest last.
    storage_of_map: BTreeMap<Rc<VersionedValue>, Vec<Rc<MemoryLocation>>>,

    /// For a target value, the values it was computed from, each with the location the
    /// value went through if it was stored and loaded on the way.
    flows_to_map: BTreeMap<Rc<VersionedValue>, FlowSources>,

    /// Locations found to be relevant to an interpolant. Descendant frames add to this set
    /// while computing core locations, which is why it can change after the frame is shared.
    core_locations: RefCell<BTreeSet<Rc<MemoryLocation>>>,
}

impl Debug for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dependency#{}", self.id)?;
        if let Some(parent) = &self.parent {
            write!(f, " <- {:?}", parent)?;
        }
        Ok(())
    }
}

/// Construction and frame chain
impl Dependency {
    /// The outermost frame of a path.
    pub fn new_root() -> Dependency {
        Dependency {
            id: utils::fresh_identity(),
            parent: None,
            values_map: BTreeMap::new(),
            versioned_locations: Vec::new(),
            equality_map: BTreeMap::new(),
            stores_map: BTreeMap::new(),
            storage_of_map: BTreeMap::new(),
            flows_to_map: BTreeMap::new(),
            core_locations: RefCell::new(BTreeSet::new()),
        }
    }

    /// A frame that extends the history recorded by parent. The parent is kept alive for
    /// as long as this frame or any of its descendants is alive.
    pub fn new_child(parent: Rc<Dependency>) -> Dependency {
        Dependency {
            parent: Some(parent),
            ..Dependency::new_root()
        }
    }

    pub fn parent(&self) -> Option<&Rc<Dependency>> {
        self.parent.as_ref()
    }

    /// This frame followed by its ancestors, innermost first.
    fn frames(&self) -> impl Iterator<Item = &Dependency> {
        std::iter::successors(Some(self), |d| d.parent.as_deref())
    }

    /// The locations created by this frame.
    pub fn local_locations(&self) -> &[Rc<MemoryLocation>] {
        &self.versioned_locations
    }

    /// The versions of value created by this frame.
    pub fn local_versions(&self, value: &Rc<ProgramValue>) -> &[Rc<VersionedValue>] {
        self.values_map.get(value).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Creation of versions
impl Dependency {
    /// Creates a new version of value. Versions are never merged.
    #[logfn_inputs(TRACE)]
    pub fn get_new_versioned_value(
        &mut self,
        value: &Rc<ProgramValue>,
        expression: &Rc<Expression>,
    ) -> Rc<VersionedValue> {
        let result = VersionedValue::new(value.clone(), expression.clone());
        self.values_map
            .entry(value.clone())
            .or_default()
            .push(result.clone());
        result
    }

    /// Creates a new location for the memory introduced by site.
    #[logfn_inputs(TRACE)]
    pub fn get_initial_location(
        &mut self,
        site: &Rc<ProgramValue>,
        address: &Rc<Expression>,
    ) -> Rc<MemoryLocation> {
        self.register_location(MemoryLocation::new(site.clone(), address.clone()))
    }

    fn register_location(&mut self, location: Rc<MemoryLocation>) -> Rc<MemoryLocation> {
        self.versioned_locations.push(location.clone());
        location
    }

    /// The most recently created location of site at address, searching this frame first.
    pub fn get_latest_location(
        &self,
        site: &Rc<ProgramValue>,
        address: &Rc<Expression>,
    ) -> Option<Rc<MemoryLocation>> {
        self.frames().find_map(|frame| {
            frame
                .versioned_locations
                .iter()
                .rev()
                .find(|loc| loc.has_address(site, address))
                .cloned()
        })
    }

    /// The latest location of site at address, or a new one if there is none yet.
    pub fn get_new_location_version(
        &mut self,
        site: &Rc<ProgramValue>,
        address: &Rc<Expression>,
    ) -> Rc<MemoryLocation> {
        match self.get_latest_location(site, address) {
            Some(location) => location,
            None => self.get_initial_location(site, address),
        }
    }

    /// The location of site at address, which is at an offset of address - base.address
    /// from the location of base. Reuses an existing location of site at address.
    fn get_derived_location(
        &mut self,
        base: &MemoryLocation,
        address: &Rc<Expression>,
    ) -> Rc<MemoryLocation> {
        if let Some(location) = self.get_latest_location(&base.site, address) {
            return location;
        }
        let extra_offset = Expression::sub(address.clone(), base.address.clone());
        let offset = base.combined_offset(&extra_offset);
        self.register_location(base.with_expressions(address.clone(), offset))
    }
}

/// Recording relations
impl Dependency {
    #[logfn_inputs(TRACE)]
    pub fn add_pointer_equality(
        &mut self,
        value: &Rc<VersionedValue>,
        location: &Rc<MemoryLocation>,
    ) {
        self.equality_map
            .entry(value.clone())
            .or_default()
            .push(location.clone());
    }

    /// Makes value the current content of location.
    #[logfn_inputs(TRACE)]
    pub fn update_store(&mut self, location: &Rc<MemoryLocation>, value: &Rc<VersionedValue>) {
        self.stores_map.insert(location.clone(), value.clone());
        self.storage_of_map
            .entry(value.clone())
            .or_default()
            .push(location.clone());
    }

    pub fn add_dependency(&mut self, source: &Rc<VersionedValue>, target: &Rc<VersionedValue>) {
        self.add_dependency_via_location(source, target, None);
    }

    #[logfn_inputs(TRACE)]
    pub fn add_dependency_via_location(
        &mut self,
        source: &Rc<VersionedValue>,
        target: &Rc<VersionedValue>,
        via: Option<&Rc<MemoryLocation>>,
    ) {
        self.flows_to_map
            .entry(target.clone())
            .or_default()
            .entry(source.clone())
            .or_insert_with(|| via.cloned());
    }
}

/// Lookups
impl Dependency {
    /// The version of value to use as an operand of the instruction being executed.
    /// Constants get a new version every time, since their dependencies do not matter,
    /// except for global values, whose dependencies must be consistent along a path. A global
    /// value that has not been seen before is registered in this frame, with a location if it
    /// is a pointer. A constant element address also gets a location of its own.
    #[logfn_inputs(TRACE)]
    pub fn get_latest_value(
        &mut self,
        value: &Rc<ProgramValue>,
        expression: &Rc<Expression>,
    ) -> Option<Rc<VersionedValue>> {
        if value.is_constant_element_address() {
            let result = self.get_new_versioned_value(value, expression);
            let location = self.get_initial_location(value, expression);
            self.add_pointer_equality(&result, &location);
            return Some(result);
        }

        if value.is_constant() && !value.is_global() {
            return Some(self.get_new_versioned_value(value, expression));
        }

        if let Some(result) = self.get_latest_value_no_constant_check(value) {
            return Some(result);
        }

        if value.is_global() {
            let result = self.get_new_versioned_value(value, expression);
            if value.is_pointer() {
                let location = self.get_initial_location(value, expression);
                self.add_pointer_equality(&result, &location);
            }
            return Some(result);
        }
        None
    }

    /// The latest version of value recorded by this frame or an ancestor.
    #[logfn(TRACE)]
    pub fn get_latest_value_no_constant_check(
        &self,
        value: &Rc<ProgramValue>,
    ) -> Option<Rc<VersionedValue>> {
        self.frames()
            .find_map(|frame| frame.values_map.get(value).and_then(|v| v.last().cloned()))
    }

    /// The latest location value points to. An argument of the program entry point points to
    /// memory that was not allocated by the program, so a location is made up for it.
    #[logfn_inputs(TRACE)]
    pub fn resolve_location(&mut self, value: &Rc<VersionedValue>) -> Option<Rc<MemoryLocation>> {
        let found = self.frames().find_map(|frame| {
            frame
                .equality_map
                .get(value)
                .and_then(|locations| locations.last().cloned())
        });
        if found.is_some() {
            return found;
        }

        if value.value.is_main_argument() {
            let location = self.get_initial_location(&value.value, &value.expression);
            let argument = self.get_new_versioned_value(&value.value, &value.expression);
            self.add_pointer_equality(&argument, &location);
            return Some(location);
        }
        None
    }

    /// The locations value points to: either directly, or else via the values it was
    /// ultimately computed from.
    #[logfn_inputs(TRACE)]
    pub fn resolve_location_transitively(
        &mut self,
        value: &Rc<VersionedValue>,
    ) -> Vec<Rc<MemoryLocation>> {
        if let Some(location) = self.resolve_location(value) {
            return vec![location];
        }
        let value_sources = self.all_flow_sources_ends(value);
        let mut result = Vec::new();
        for source in value_sources.iter() {
            if let Some(location) = self.resolve_location(source) {
                result.push(location);
            }
        }
        result
    }

    /// The value currently stored at location, if any. There is at most one.
    pub fn stores(&self, location: &Rc<MemoryLocation>) -> Option<Rc<VersionedValue>> {
        self.frames()
            .find_map(|frame| frame.stores_map.get(location).cloned())
    }

    fn direct_local_flow_sources(&self, target: &Rc<VersionedValue>) -> Vec<Rc<VersionedValue>> {
        match self.flows_to_map.get(target) {
            Some(sources) => sources.keys().cloned().collect(),
            None => vec![],
        }
    }

    /// The values target was directly computed from, those recorded by ancestors first.
    pub fn direct_flow_sources(&self, target: &Rc<VersionedValue>) -> Vec<Rc<VersionedValue>> {
        let frames: Vec<&Dependency> = self.frames().collect();
        frames
            .into_iter()
            .rev()
            .flat_map(|frame| frame.direct_local_flow_sources(target))
            .collect()
    }

    /// Target and every value it was computed from, directly or indirectly, ordered by
    /// creation.
    pub fn all_flow_sources(&self, target: &Rc<VersionedValue>) -> Vec<Rc<VersionedValue>> {
        let mut visited = BTreeSet::new();
        visited.insert(target.clone());
        let mut worklist = vec![target.clone()];
        while let Some(value) = worklist.pop() {
            for source in self.direct_flow_sources(&value) {
                if visited.insert(source.clone()) {
                    worklist.push(source);
                }
            }
        }
        visited.into_iter().collect()
    }

    /// The values target was ultimately computed from, i.e. the sources of target that were
    /// not themselves computed from anything, ordered by creation. A value without sources is
    /// its own end.
    pub fn all_flow_sources_ends(&self, target: &Rc<VersionedValue>) -> Vec<Rc<VersionedValue>> {
        let mut ends = BTreeSet::new();
        let mut visited = HashSet::new();
        visited.insert(target.clone());
        let mut worklist = vec![target.clone()];
        while let Some(value) = worklist.pop() {
            let sources = self.direct_flow_sources(&value);
            if sources.is_empty() {
                ends.insert(value);
                continue;
            }
            for source in sources {
                if visited.insert(source.clone()) {
                    worklist.push(source);
                }
            }
        }
        ends.into_iter().collect()
    }

    fn has_local_location_sources(&self, value: &Rc<VersionedValue>) -> bool {
        self.flows_to_map
            .get(value)
            .map_or(false, |sources| !sources.is_empty())
            || self.storage_of_map.contains_key(value)
    }

    /// The nearest locations target was computed from, according to this frame alone.
    /// Direct flow edges that do not go through memory are followed to the locations beyond
    /// them. A source with nothing beyond it is returned without a location. A value that was
    /// not computed from anything is mapped to the last location it was stored into.
    fn direct_local_location_sources(
        &self,
        target: &Rc<VersionedValue>,
    ) -> BTreeMap<Option<Rc<VersionedValue>>, Option<Rc<MemoryLocation>>> {
        let mut result = BTreeMap::new();
        let mut visited = BTreeSet::new();
        visited.insert(target.clone());
        let mut worklist = vec![target.clone()];
        while let Some(value) = worklist.pop() {
            match self.flows_to_map.get(&value).filter(|s| !s.is_empty()) {
                Some(sources) => {
                    for (source, via) in sources.iter() {
                        if via.is_some() {
                            result.insert(Some(source.clone()), via.clone());
                        } else if self.has_local_location_sources(source) {
                            if visited.insert(source.clone()) {
                                worklist.push(source.clone());
                            }
                        } else {
                            result.insert(Some(source.clone()), None);
                        }
                    }
                }
                None => {
                    if let Some(locations) = self.storage_of_map.get(&value) {
                        result.insert(None, locations.last().cloned());
                    }
                }
            }
        }
        result
    }

    /// The nearest locations target was computed from, through the whole frame chain. Sources
    /// that have no location in one frame are looked up again in its parent.
    pub fn direct_location_sources(&self, target: &Rc<VersionedValue>) -> LocationSources {
        let mut result = LocationSources::new();
        let mut visited: HashSet<(usize, Rc<VersionedValue>)> = HashSet::new();
        let mut worklist: Vec<(&Dependency, Rc<VersionedValue>)> = vec![(self, target.clone())];
        while let Some((frame, value)) = worklist.pop() {
            if !visited.insert((frame.id, value.clone())) {
                continue;
            }
            let local_sources = frame.direct_local_location_sources(&value);
            if local_sources.is_empty() {
                if let Some(parent) = frame.parent.as_deref() {
                    worklist.push((parent, value));
                }
                continue;
            }
            for (source, location) in local_sources {
                match (location, frame.parent.as_deref()) {
                    (Some(location), _) => {
                        result.entry(source).or_insert(location);
                    }
                    (None, Some(parent)) => {
                        if let Some(source) = source {
                            worklist.push((parent, source));
                        }
                    }
                    (None, None) => {}
                }
            }
        }
        result
    }

    /// All locations recorded by this frame and its ancestors, ancestors first. If core_only
    /// is set, only the locations that were found to be core are returned.
    pub fn get_all_versioned_locations(&self, core_only: bool) -> Vec<Rc<MemoryLocation>> {
        let frames: Vec<&Dependency> = self.frames().collect();
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for frame in frames.into_iter().rev() {
            let locations: Vec<Rc<MemoryLocation>> = if core_only {
                frame.core_locations.borrow().iter().cloned().collect()
            } else {
                frame.versioned_locations.clone()
            };
            for location in locations {
                if seen.insert(location.clone()) {
                    result.push(location);
                }
            }
        }
        result
    }

    /// The stores to use for building an interpolant, split into stores at constant and at
    /// symbolic addresses. If core_only is set, only stores of core values at core locations
    /// are included, and their expressions are rewritten over shadow arrays if the session
    /// asks for existential quantification.
    #[logfn_inputs(TRACE)]
    pub fn get_stored_expressions(
        &self,
        session: &mut InterpolationSession,
        core_only: bool,
    ) -> Result<(ConcreteStore, SymbolicStore), DependencyError> {
        let mut concrete_store = ConcreteStore::new();
        let mut symbolic_store = SymbolicStore::new();

        for location in self.get_all_versioned_locations(core_only) {
            let Some(stored) = self.stores(&location) else {
                continue;
            };
            if core_only && !stored.is_core() {
                continue;
            }
            let pair = if core_only {
                AddressValuePair {
                    address: session.shadow_if_existential(&location.address)?,
                    value: session.shadow_if_existential(&stored.expression)?,
                }
            } else {
                AddressValuePair {
                    address: location.address.clone(),
                    value: stored.expression.clone(),
                }
            };
            match location.uint_address() {
                Some(uint_address) => {
                    concrete_store
                        .entry(location.site.clone())
                        .or_default()
                        .insert(uint_address, pair);
                }
                None => symbolic_store
                    .entry(location.site.clone())
                    .or_default()
                    .push(pair),
            }
        }
        Ok((concrete_store, symbolic_store))
    }
}

/// Instruction effects
impl Dependency {
    /// Records the effect of executing instr. The expressions are the value of the result of
    /// instr, if it has one, followed by the values of the operands that matter for its
    /// opcode. symbolic_execution_error is set if the interpreter already found an error on
    /// this path, in which case missing operands are made up rather than reported.
    #[logfn_inputs(TRACE)]
    pub fn execute(
        &mut self,
        instr: &Rc<ProgramValue>,
        args: &[Rc<Expression>],
        symbolic_execution_error: bool,
    ) -> Result<(), DependencyError> {
        let opcode = instr
            .opcode()
            .ok_or_else(|| DependencyError::NotAnInstruction(instr.to_string()))?;

        if opcode == Opcode::Call {
            return self.execute_call(instr, args);
        }

        match args.len() {
            0 => {
                if instr.is_conditional_branch() {
                    let condition = self.operand(instr, 0)?;
                    let mut graph = LocationGraph::new();
                    self.mark_all_values_of(&mut graph, &condition)?;
                    self.compute_core_locations(&mut graph);
                }
                Ok(())
            }
            1 => self.execute_unary(instr, opcode, &args[0], symbolic_execution_error),
            2 => self.execute_binary(instr, opcode, &args[0], &args[1]),
            3 => self.execute_ternary(instr, opcode, &args[0], &args[1], &args[2]),
            arity => Err(Self::unhandled(instr, opcode, arity)),
        }
    }

    fn unhandled(instr: &ProgramValue, opcode: Opcode, arity: usize) -> DependencyError {
        DependencyError::UnhandledInstruction {
            name: instr.name.to_string(),
            opcode,
            arity,
        }
    }

    fn operand(
        &self,
        instr: &Rc<ProgramValue>,
        index: usize,
    ) -> Result<Rc<ProgramValue>, DependencyError> {
        instr
            .operand(index)
            .cloned()
            .ok_or_else(|| DependencyError::OperandNotFound {
                instruction: instr.to_string(),
                operand: format!("#{}", index),
            })
    }

    fn execute_call(
        &mut self,
        instr: &Rc<ProgramValue>,
        args: &[Rc<Expression>],
    ) -> Result<(), DependencyError> {
        let Some(callee) = instr.called_function() else {
            return Ok(());
        };
        if callee.is_intrinsic() {
            return Ok(());
        }
        let result_expression = || {
            args.first()
                .ok_or_else(|| DependencyError::MissingReturnExpression(instr.to_string()))
        };

        let known_name = KnownNames::from_function_name(&callee.name);
        match known_name.rule_for_arity(args.len()) {
            Some(CallRule::FreshResult) => {
                self.get_new_versioned_value(instr, result_expression()?);
            }
            Some(CallRule::Allocation) => {
                let address = result_expression()?;
                let value = self.get_new_versioned_value(instr, address);
                let location = self.get_initial_location(instr, address);
                self.add_pointer_equality(&value, &location);
            }
            Some(CallRule::FlowFromOperands(count)) => {
                self.flow_operands_into_result(instr, args, count)?;
            }
            Some(CallRule::FlowFromAllOperands) => {
                self.flow_operands_into_result(instr, args, args.len().saturating_sub(1))?;
            }
            None => {
                // Functions that return void are ignored. For the others, the result does
                // not depend on the arguments.
                if !instr.is_void() {
                    let result = result_expression()?;
                    warn!("using default handler for external function {}", callee.name);
                    self.get_new_versioned_value(instr, result);
                }
            }
        }
        Ok(())
    }

    /// Creates a new version of the call result that depends on the first count operands.
    /// The expression of operand i is args[i + 1], or the result expression if the call came
    /// without an expression for it.
    fn flow_operands_into_result(
        &mut self,
        instr: &Rc<ProgramValue>,
        args: &[Rc<Expression>],
        count: usize,
    ) -> Result<(), DependencyError> {
        let result_expression = args
            .first()
            .ok_or_else(|| DependencyError::MissingReturnExpression(instr.to_string()))?;
        let return_value = self.get_new_versioned_value(instr, result_expression);
        for (i, operand) in instr.call_arguments().iter().take(count).enumerate() {
            let expression = args.get(i + 1).unwrap_or(result_expression);
            if let Some(argument) = self.get_latest_value(operand, expression) {
                self.add_dependency(&argument, &return_value);
            }
        }
        Ok(())
    }

    fn execute_unary(
        &mut self,
        instr: &Rc<ProgramValue>,
        opcode: Opcode,
        arg_expr: &Rc<Expression>,
        symbolic_execution_error: bool,
    ) -> Result<(), DependencyError> {
        use Opcode::*;
        match opcode {
            Alloca => {
                let value = self.get_new_versioned_value(instr, arg_expr);
                let location = self.get_initial_location(instr, arg_expr);
                self.add_pointer_equality(&value, &location);
            }
            AddrSpaceCast | BitCast | ExtractValue | FPExt | FPToSI | FPToUI | FPTrunc
            | IntToPtr | PtrToInt | SExt | SIToFP | Trunc | UIToFP | ZExt => {
                let operand = self.operand(instr, 0)?;
                if let Some(value) = self.get_latest_value(&operand, arg_expr) {
                    let result = self.get_new_versioned_value(instr, arg_expr);
                    self.add_dependency(&value, &result);
                } else if operand.is_constant() {
                    // A constant has no dependencies to propagate.
                } else if operand.is_pointer() {
                    let result = self.get_new_versioned_value(instr, arg_expr);
                    let location = self.get_initial_location(&operand, arg_expr);
                    self.add_pointer_equality(&result, &location);
                } else if operand.is_argument() || operand.is_call() || symbolic_execution_error {
                    let synthesized = self.get_new_versioned_value(&operand, arg_expr);
                    let result = self.get_new_versioned_value(instr, arg_expr);
                    self.add_dependency(&synthesized, &result);
                } else {
                    return Err(DependencyError::OperandNotFound {
                        instruction: instr.to_string(),
                        operand: operand.to_string(),
                    });
                }
            }
            _ => return Err(Self::unhandled(instr, opcode, 1)),
        }
        Ok(())
    }

    fn execute_binary(
        &mut self,
        instr: &Rc<ProgramValue>,
        opcode: Opcode,
        value_expr: &Rc<Expression>,
        address: &Rc<Expression>,
    ) -> Result<(), DependencyError> {
        match opcode {
            Opcode::Load => self.execute_load(instr, value_expr, address),
            Opcode::Store => self.execute_store(instr, value_expr, address),
            Opcode::GetElementPtr { in_bounds } => {
                self.execute_get_element_ptr(instr, in_bounds, value_expr, address)
            }
            _ => Err(Self::unhandled(instr, opcode, 2)),
        }
    }

    fn execute_load(
        &mut self,
        instr: &Rc<ProgramValue>,
        value_expr: &Rc<Expression>,
        address: &Rc<Expression>,
    ) -> Result<(), DependencyError> {
        let address_operand = self.operand(instr, 0)?;
        // Untracked globals are registered with a location by get_latest_value.
        if let Some(address_value) = self.get_latest_value(&address_operand, address) {
            let locations = self.resolve_location_transitively(&address_value);
            if locations.is_empty() {
                let location = self.get_initial_location(&address_operand, address);
                self.add_pointer_equality(&address_value, &location);
                let loaded = self.get_new_versioned_value(instr, value_expr);
                self.update_store(&location, &loaded);
                return Ok(());
            }
            if locations.len() == 1 && locations[0].site.is_main_argument() {
                // Loading from memory that the program did not allocate itself.
                let loaded = self.get_new_versioned_value(instr, value_expr);
                let location = self.get_new_location_version(instr, address);
                self.add_pointer_equality(&loaded, &location);
                return Ok(());
            }
        }

        if !self.build_load_dependency(&address_operand, address, instr, value_expr)? {
            let location = self.get_initial_location(&address_operand, address);
            let loaded = self.get_new_versioned_value(instr, value_expr);
            self.update_store(&location, &loaded);
        }
        Ok(())
    }

    /// Makes the loaded value depend on the values stored at the locations the address
    /// resolves to. A location without a stored value gets the loaded value as its content.
    /// Returns false if the address has no version.
    fn build_load_dependency(
        &mut self,
        address_operand: &Rc<ProgramValue>,
        address: &Rc<Expression>,
        instr: &Rc<ProgramValue>,
        value_expr: &Rc<Expression>,
    ) -> Result<bool, DependencyError> {
        let Some(address_value) = self.get_latest_value(address_operand, address) else {
            return Ok(false);
        };
        let locations = self.resolve_location_transitively(&address_value);
        if locations.is_empty() {
            return Err(DependencyError::LoadAddressUnresolved(instr.to_string()));
        }

        let loaded = self.get_new_versioned_value(instr, value_expr);
        for location in locations.iter() {
            match self.stores(location) {
                Some(stored) => self.add_dependency_via_location(&stored, &loaded, Some(location)),
                None => self.update_store(location, &loaded),
            }
        }
        Ok(true)
    }

    fn execute_store(
        &mut self,
        instr: &Rc<ProgramValue>,
        value_expr: &Rc<Expression>,
        address: &Rc<Expression>,
    ) -> Result<(), DependencyError> {
        let data_operand = self.operand(instr, 0)?;
        let address_operand = self.operand(instr, 1)?;

        let data = self.get_latest_value(&data_operand, value_expr);
        let locations = match self.get_latest_value(&address_operand, address) {
            Some(address_value) => self.resolve_location_transitively(&address_value),
            None => vec![],
        };
        let data = match data {
            Some(data) => data,
            None => self.get_new_versioned_value(&data_operand, value_expr),
        };

        for resolved in locations.iter() {
            let location = match self.get_latest_location(&resolved.site, &resolved.address) {
                Some(location) => location,
                None => {
                    let location = self.get_initial_location(&resolved.site, address);
                    let site_value = self.get_new_versioned_value(&resolved.site, value_expr);
                    self.add_pointer_equality(&site_value, &location);
                    location
                }
            };
            self.update_store(&location, &data);
        }
        Ok(())
    }

    fn execute_get_element_ptr(
        &mut self,
        instr: &Rc<ProgramValue>,
        in_bounds: bool,
        value_expr: &Rc<Expression>,
        address: &Rc<Expression>,
    ) -> Result<(), DependencyError> {
        let base = self.operand(instr, 0)?;

        if base.is_constant() {
            // Element addresses of constant bases are locations of the base itself, at an
            // offset from the location of the base if it has one.
            let base_location = match self.get_latest_value(&base, address) {
                Some(base_value) => self.resolve_location(&base_value),
                None => None,
            };
            let location = match base_location {
                Some(base_location) => self.get_derived_location(&base_location, value_expr),
                None => self.get_new_location_version(&base, value_expr),
            };
            let value = self.get_new_versioned_value(instr, value_expr);
            self.add_pointer_equality(&value, &location);
            return Ok(());
        }

        let address_value = match self.get_latest_value(&base, address) {
            Some(address_value) => address_value,
            None if in_bounds => self.get_new_versioned_value(&base, address),
            None => {
                return Err(DependencyError::OperandNotFound {
                    instruction: instr.to_string(),
                    operand: base.to_string(),
                })
            }
        };

        let locations = self.resolve_location_transitively(&address_value);
        if !locations.is_empty() {
            let value = self.get_new_versioned_value(instr, value_expr);
            for location in locations.iter() {
                let element = self.get_derived_location(location, value_expr);
                self.add_pointer_equality(&value, &element);
            }
            return Ok(());
        }

        let direct_sources = self.direct_flow_sources(&address_value);
        if !direct_sources.is_empty() {
            let value = self.get_new_versioned_value(instr, value_expr);
            for source in direct_sources.iter() {
                self.add_dependency(source, &value);
            }
        } else {
            // The base is some value, such as a loaded one, that is not known to be an
            // address. Treat it as the start of a memory object.
            let value = self.get_new_versioned_value(instr, value_expr);
            let location = self.get_initial_location(&address_value.value, value_expr);
            self.add_pointer_equality(&value, &location);
        }
        Ok(())
    }

    fn execute_ternary(
        &mut self,
        instr: &Rc<ProgramValue>,
        opcode: Opcode,
        result: &Rc<Expression>,
        op1_expr: &Rc<Expression>,
        op2_expr: &Rc<Expression>,
    ) -> Result<(), DependencyError> {
        use Opcode::*;
        let (first, second) = match opcode {
            Select => (1, 2),
            Add | AShr | And | FAdd | FCmp | FDiv | FMul | FRem | FSub | ICmp | InsertValue
            | LShr | Mul | Or | SDiv | Shl | SRem | Sub | UDiv | URem | Xor => (0, 1),
            _ => return Err(Self::unhandled(instr, opcode, 3)),
        };
        let operand1 = self.operand(instr, first)?;
        let operand2 = self.operand(instr, second)?;
        let mut op1 = self.get_latest_value(&operand1, op1_expr);
        let mut op2 = self.get_latest_value(&operand2, op2_expr);

        // The bounds of klee_range are parameters that may never have been bound.
        if opcode != Select && instr.parent_function() == Some("klee_range") {
            if op1.is_none() && operand1.name.as_ref() == "start" {
                op1 = Some(self.get_new_versioned_value(&operand1, op1_expr));
            }
            if op2.is_none() && operand2.name.as_ref() == "end" {
                op2 = Some(self.get_new_versioned_value(&operand2, op2_expr));
            }
        }

        if op1.is_none() && op2.is_none() {
            debug!("no operand of {} is tracked", instr);
        }
        let value = self.get_new_versioned_value(instr, result);
        for op in op1.iter().chain(op2.iter()) {
            self.add_dependency(op, &value);
        }
        Ok(())
    }

    /// Records the effect of a PHI node that selected its incoming value at incoming_index.
    #[logfn_inputs(TRACE)]
    pub fn execute_phi(
        &mut self,
        instr: &Rc<ProgramValue>,
        incoming_index: usize,
        value_expr: &Rc<Expression>,
        symbolic_execution_error: bool,
    ) -> Result<(), DependencyError> {
        let incoming = self.operand(instr, incoming_index)?;
        match self.get_latest_value(&incoming, value_expr) {
            Some(value) => {
                let result = self.get_new_versioned_value(instr, value_expr);
                self.add_dependency(&value, &result);
            }
            None if incoming.is_constant()
                || incoming.is_argument()
                || symbolic_execution_error =>
            {
                self.get_new_versioned_value(instr, value_expr);
            }
            None => {
                return Err(DependencyError::OperandNotFound {
                    instruction: instr.to_string(),
                    operand: incoming.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Records the effect of a load or store. If the bounds check of the access succeeded,
    /// the values that computed the address are marked as core, since the interpolant must
    /// keep the access in bounds.
    #[logfn_inputs(TRACE)]
    pub fn execute_memory_operation(
        &mut self,
        instr: &Rc<ProgramValue>,
        args: &[Rc<Expression>],
        bounds_check: bool,
        symbolic_execution_error: bool,
    ) -> Result<(), DependencyError> {
        self.execute(instr, args, symbolic_execution_error)?;
        if bounds_check {
            let address_operand = match instr.opcode() {
                Some(Opcode::Load) => self.operand(instr, 0)?,
                Some(Opcode::Store) => self.operand(instr, 1)?,
                _ => return Err(DependencyError::UnknownMemoryOperation(instr.to_string())),
            };
            let mut graph = LocationGraph::new();
            self.mark_all_values_of(&mut graph, &address_operand)?;
            self.compute_core_locations(&mut graph);
        }
        Ok(())
    }

    /// Binds the actual arguments of the call site to new versions of the parameters of the
    /// called function. A call without a statically known callee is not tracked.
    #[logfn_inputs(TRACE)]
    pub fn bind_call_arguments(
        &mut self,
        site: &Rc<ProgramValue>,
        arguments: &[Rc<Expression>],
    ) -> Result<(), DependencyError> {
        let Some(callee) = site.called_function().cloned() else {
            return Ok(());
        };
        let parameters = callee.parameters();
        let actuals = site.call_arguments();

        let mut argument_values = Vec::with_capacity(parameters.len());
        for i in (0..parameters.len()).rev() {
            let (Some(actual), Some(expression)) = (actuals.get(i), arguments.get(i)) else {
                return Err(DependencyError::OperandNotFound {
                    instruction: site.to_string(),
                    operand: format!("argument #{}", i),
                });
            };
            let value = match self.get_latest_value(actual, expression) {
                Some(value) => value,
                None => self.get_new_versioned_value(actual, expression),
            };
            argument_values.push(value);
        }

        verify!(argument_values.len() == parameters.len());
        argument_values.reverse();
        for (parameter, argument) in parameters.iter().zip(argument_values) {
            let bound = self.get_new_versioned_value(parameter, &argument.expression);
            self.add_dependency(&argument, &bound);
        }
        Ok(())
    }

    /// Makes the value of the call site depend on the value returned by ret_instr.
    #[logfn_inputs(TRACE)]
    pub fn bind_return_value(
        &mut self,
        site: &Rc<ProgramValue>,
        ret_instr: &Rc<ProgramValue>,
        return_value: &Rc<Expression>,
    ) -> Result<(), DependencyError> {
        // A function that returns void has nothing to bind.
        if ret_instr.opcode() != Some(Opcode::Ret) {
            return Ok(());
        }
        let Some(returned) = ret_instr.operand(0).cloned() else {
            return Ok(());
        };
        if let Some(value) = self.get_latest_value(&returned, return_value) {
            let result = self.get_new_versioned_value(site, return_value);
            self.add_dependency(&value, &result);
        }
        Ok(())
    }
}

/// Slicing
impl Dependency {
    /// Adds the locations that value was computed from to the graph and marks every value it
    /// was computed from as core.
    #[logfn_inputs(TRACE)]
    pub fn mark_all_values(&self, graph: &mut LocationGraph, value: &Rc<VersionedValue>) {
        self.build_location_graph(graph, value);
        for source in self.all_flow_sources(value) {
            source.set_as_core();
        }
    }

    /// Marks the latest version of value. Constants have no dependencies to mark. Constant
    /// expressions that mention __dso_handle are the result of linking errors and are
    /// ignored as well.
    pub fn mark_all_values_of(
        &self,
        graph: &mut LocationGraph,
        value: &Rc<ProgramValue>,
    ) -> Result<(), DependencyError> {
        match self.get_latest_value_no_constant_check(value) {
            Some(versioned) => {
                self.mark_all_values(graph, &versioned);
                Ok(())
            }
            None if value.is_constant() => {
                if value
                    .operands
                    .iter()
                    .any(|o| o.name.as_ref() == "__dso_handle")
                {
                    debug!("ignoring {}", value);
                }
                Ok(())
            }
            None => Err(DependencyError::UnknownValue(value.to_string())),
        }
    }

    /// Records the sinks of the graph as core locations of this frame. The sinks created by
    /// this frame are then consumed, and the remaining sinks are core locations of the
    /// ancestors.
    #[logfn_inputs(TRACE)]
    pub fn compute_core_locations(&self, graph: &mut LocationGraph) {
        debug!("location graph:\n{}", graph);
        trace!("{}", graph.to_dot());
        for frame in self.frames() {
            let sinks = graph.get_sink_locations();
            for sink in sinks.iter() {
                sink.set_as_core();
            }
            frame.core_locations.borrow_mut().extend(sinks);
            if frame.parent.is_none() {
                break;
            }
            graph.consume_sinks_with_locations(&frame.versioned_locations);
        }
    }

    /// Adds every location source of target as a sink, followed by the locations they were
    /// computed from. An edge back to a location that is already on the way from the sink is
    /// skipped, and every pair of value and location is expanded only once.
    #[logfn_inputs(TRACE)]
    pub fn build_location_graph(&self, graph: &mut LocationGraph, target: &Rc<VersionedValue>) {
        let mut worklist: Vec<(Rc<VersionedValue>, Rc<MemoryLocation>, Rc<BTreeSet<usize>>)> =
            Vec::new();
        for (source, location) in self.direct_location_sources(target) {
            graph.add_new_sink(&location);
            if let Some(source) = source {
                worklist.push((source, location, Rc::new(BTreeSet::new())));
            }
        }

        let mut expanded = HashSet::new();
        while let Some((source, target, parent_targets)) = worklist.pop() {
            if !expanded.insert((source.id(), target.id())) {
                continue;
            }
            let mut path = (*parent_targets).clone();
            path.insert(target.id());
            let path = Rc::new(path);
            for (next_source, location) in self.direct_location_sources(&source) {
                if location == target || parent_targets.contains(&location.id()) {
                    continue;
                }
                graph.add_new_edge(&location, &target);
                if let Some(next_source) = next_source {
                    worklist.push((next_source, location, path.clone()));
                }
            }
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (depth, frame) in self.frames().enumerate() {
            let tabs = utils::make_tabs(depth);
            let tabs_next = utils::append_tab(&tabs);
            if depth > 0 {
                writeln!(f, "{}--------- Parent Dependencies ----------", tabs)?;
            }
            writeln!(f, "{}EQUALITIES:", tabs)?;
            for (value, locations) in frame.equality_map.iter() {
                for location in locations.iter() {
                    writeln!(f, "{}{} == {}", tabs_next, value, location)?;
                }
            }
            writeln!(f, "{}STORAGE:", tabs)?;
            for (location, value) in frame.stores_map.iter() {
                writeln!(f, "{}{} |-> {}", tabs_next, location, value)?;
            }
            writeln!(f, "{}FLOWDEPENDENCY:", tabs)?;
            for (target, sources) in frame.flows_to_map.iter() {
                for (source, via) in sources.iter() {
                    write!(f, "{}{} <- {}", tabs_next, target, source)?;
                    if let Some(via) = via {
                        write!(f, " via {}", via)?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}
