// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Versioned values and versioned memory locations are the nodes of the dependency graph
//! that is built up while a path is being executed. A new version is created whenever the
//! analysis learns something new about a program value or a memory object, so that earlier
//! dependencies are never overwritten by later ones.

use crate::expression::{BinaryOperator, Expression, INT64};
use crate::program::ProgramValue;
use crate::utils;

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// One version of a program value, at the time its dependencies were recorded.
pub struct VersionedValue {
    id: usize,
    /// The program value this is a version of.
    pub value: Rc<ProgramValue>,
    /// The symbolic value of this version.
    pub expression: Rc<Expression>,
    /// Set once the value is known to matter to the interpolant. Never reset.
    core: Cell<bool>,
}

impl VersionedValue {
    pub fn new(value: Rc<ProgramValue>, expression: Rc<Expression>) -> Rc<VersionedValue> {
        Rc::new(VersionedValue {
            id: utils::fresh_identity(),
            value,
            expression,
            core: Cell::new(false),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_core(&self) -> bool {
        self.core.get()
    }

    pub fn set_as_core(&self) {
        self.core.set(true);
    }
}

impl Display for VersionedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str("V")?;
        if self.is_core() {
            f.write_str("(I)")?;
        }
        write!(f, "[{}:{}]#{}", self.value, self.expression, self.id)
    }
}

impl Debug for VersionedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Hash for VersionedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.id);
    }
}

impl PartialEq for VersionedValue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VersionedValue {}

impl PartialOrd for VersionedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// One version of an abstract memory object, identified by the allocation (or call) site
/// that introduced it together with its address.
pub struct MemoryLocation {
    id: usize,
    /// The instruction or global that introduced the memory object.
    pub site: Rc<ProgramValue>,
    pub address: Rc<Expression>,
    /// The offset of address from the start of the memory object.
    pub offset: Rc<Expression>,
    core: Cell<bool>,
}

impl MemoryLocation {
    /// A location at the start of the memory object introduced by site.
    pub fn new(site: Rc<ProgramValue>, address: Rc<Expression>) -> Rc<MemoryLocation> {
        Rc::new(MemoryLocation {
            id: utils::fresh_identity(),
            site,
            address,
            offset: Expression::pointer(0),
            core: Cell::new(false),
        })
    }

    /// The offset of this location displaced by extra_offset. If both are constants, the
    /// result is a single constant, so that constant indexing into an object always ends up
    /// at the same offset.
    pub fn combined_offset(&self, extra_offset: &Rc<Expression>) -> Rc<Expression> {
        match (self.offset.as_constant(), extra_offset.as_constant()) {
            (Some(o), Some(e)) => Expression::constant(o.wrapping_add(e), INT64),
            _ => Expression::binary(
                BinaryOperator::Add,
                self.offset.clone(),
                extra_offset.clone(),
            ),
        }
    }

    /// A location that has all the properties of this one, except for its address and offset
    /// which are displaced by extra_offset.
    pub fn with_offset(&self, extra_offset: &Rc<Expression>) -> Rc<MemoryLocation> {
        Rc::new(MemoryLocation {
            id: utils::fresh_identity(),
            site: self.site.clone(),
            address: Expression::add(self.address.clone(), extra_offset.clone()),
            offset: self.combined_offset(extra_offset),
            core: Cell::new(self.is_core()),
        })
    }

    /// Creates a location with the same site and core status, but with different expressions.
    pub fn with_expressions(
        &self,
        address: Rc<Expression>,
        offset: Rc<Expression>,
    ) -> Rc<MemoryLocation> {
        Rc::new(MemoryLocation {
            id: utils::fresh_identity(),
            site: self.site.clone(),
            address,
            offset,
            core: Cell::new(self.is_core()),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_core(&self) -> bool {
        self.core.get()
    }

    pub fn set_as_core(&self) {
        self.core.set(true);
    }

    /// True if this location was introduced by site and is at address.
    pub fn has_address(&self, site: &Rc<ProgramValue>, address: &Rc<Expression>) -> bool {
        self.site == *site && self.address == *address
    }

    pub fn has_constant_address(&self) -> bool {
        self.address.is_constant()
    }

    /// The numeric address, if the address is a constant.
    pub fn uint_address(&self) -> Option<u64> {
        self.address.as_constant()
    }
}

impl Display for MemoryLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str("A")?;
        if !self.has_constant_address() {
            f.write_str("(symbolic)")?;
        }
        if self.is_core() {
            f.write_str("(I)")?;
        }
        write!(
            f,
            "[{}:{}+{}]#{}",
            self.site, self.address, self.offset, self.id
        )
    }
}

impl Debug for MemoryLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Hash for MemoryLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.id);
    }
}

impl PartialEq for MemoryLocation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemoryLocation {}

impl PartialOrd for MemoryLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemoryLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}
