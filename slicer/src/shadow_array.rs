// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::DependencyError;
use crate::expression::{Array, Expression, UpdateList, UpdateNode};
use crate::versioned_value::MemoryLocation;

use log_derive::logfn_inputs;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// Associates every symbolic array that can occur in an interpolant with a fresh array of the
/// same size. Rewriting an expression in terms of the shadow arrays turns the free variables
/// of the expression into variables that the interpolant can quantify existentially.
///
/// The map must be populated before any rewriting is done and is not changed by rewriting.
#[derive(Clone, Debug, Default)]
pub struct ShadowArrays {
    shadow_array: HashMap<Rc<Array>, Rc<Array>>,
}

impl ShadowArrays {
    pub fn new() -> ShadowArrays {
        ShadowArrays::default()
    }

    /// Registers target as the shadow of source, replacing any earlier registration.
    #[logfn_inputs(TRACE)]
    pub fn add_shadow_array_map(&mut self, source: Rc<Array>, target: Rc<Array>) {
        self.shadow_array.insert(source, target);
    }

    pub fn get_shadow_array(&self, source: &Array) -> Option<&Rc<Array>> {
        self.shadow_array.get(source)
    }

    pub fn len(&self) -> usize {
        self.shadow_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadow_array.is_empty()
    }

    /// Returns an expression with the same structure as expr, where every read from an array
    /// is a read from its shadow instead. The shadow arrays used are added to replacements.
    pub fn get_shadow_expression(
        &self,
        expr: &Rc<Expression>,
        replacements: &mut BTreeSet<Rc<Array>>,
    ) -> Result<Rc<Expression>, DependencyError> {
        Ok(match expr.as_ref() {
            Expression::Read { updates, index } => {
                let replacement_array = self.get_shadow_array(&updates.root).ok_or_else(|| {
                    DependencyError::MissingShadowArray(updates.root.name.to_string())
                })?;
                replacements.insert(replacement_array.clone());
                let new_updates = UpdateList {
                    root: replacement_array.clone(),
                    head: self.get_shadow_update(&updates.head, replacements)?,
                };
                Expression::read(new_updates, self.get_shadow_expression(index, replacements)?)
            }
            Expression::Constant { .. } => expr.clone(),
            Expression::Select {
                condition,
                consequent,
                alternate,
            } => Expression::select(
                self.get_shadow_expression(condition, replacements)?,
                self.get_shadow_expression(consequent, replacements)?,
                self.get_shadow_expression(alternate, replacements)?,
            ),
            Expression::Extract {
                operand,
                offset,
                width,
            } => Expression::extract(
                self.get_shadow_expression(operand, replacements)?,
                *offset,
                *width,
            ),
            Expression::Cast {
                kind,
                operand,
                width,
            } => Expression::cast(
                *kind,
                self.get_shadow_expression(operand, replacements)?,
                *width,
            ),
            Expression::Binary {
                operator,
                left,
                right,
            } => Expression::binary(
                *operator,
                self.get_shadow_expression(left, replacements)?,
                self.get_shadow_expression(right, replacements)?,
            ),
            Expression::Not { operand } => {
                Expression::not(self.get_shadow_expression(operand, replacements)?)
            }
            Expression::NotOptimized { operand } => {
                Expression::not_optimized(self.get_shadow_expression(operand, replacements)?)
            }
        })
    }

    /// Rewrites the indices and values of a chain of writes, keeping their order.
    fn get_shadow_update(
        &self,
        source: &Option<Rc<UpdateNode>>,
        replacements: &mut BTreeSet<Rc<Array>>,
    ) -> Result<Option<Rc<UpdateNode>>, DependencyError> {
        let mut writes = Vec::new();
        let mut node = source;
        while let Some(n) = node {
            writes.push(n);
            node = &n.next;
        }
        let mut result = None;
        for write in writes.into_iter().rev() {
            result = Some(Rc::new(UpdateNode {
                next: result,
                index: self.get_shadow_expression(&write.index, replacements)?,
                value: self.get_shadow_expression(&write.value, replacements)?,
            }));
        }
        Ok(result)
    }

    /// A copy of the location whose address and offset are expressed over shadow arrays.
    pub fn get_shadow_location(
        &self,
        location: &MemoryLocation,
        replacements: &mut BTreeSet<Rc<Array>>,
    ) -> Result<Rc<MemoryLocation>, DependencyError> {
        let address = self.get_shadow_expression(&location.address, replacements)?;
        let offset = self.get_shadow_expression(&location.offset, replacements)?;
        Ok(location.with_expressions(address, offset))
    }
}

/// The state of one interpolant construction: whether stored values are to be quantified
/// existentially, the shadow arrays to use if so, and the shadow arrays used so far.
#[derive(Debug, Default)]
pub struct InterpolationSession {
    pub shadow_arrays: ShadowArrays,
    /// If false, core stores are emitted over the original arrays.
    pub existential: bool,
    /// The shadow arrays that occur in expressions produced during this session.
    pub replacements: BTreeSet<Rc<Array>>,
}

impl InterpolationSession {
    pub fn new(existential: bool) -> InterpolationSession {
        InterpolationSession {
            shadow_arrays: ShadowArrays::new(),
            existential,
            replacements: BTreeSet::new(),
        }
    }

    pub fn add_shadow_array_map(&mut self, source: Rc<Array>, target: Rc<Array>) {
        self.shadow_arrays.add_shadow_array_map(source, target);
    }

    /// Rewrites expr over shadow arrays if this session quantifies existentially.
    pub fn shadow_if_existential(
        &mut self,
        expr: &Rc<Expression>,
    ) -> Result<Rc<Expression>, DependencyError> {
        if self.existential {
            self.shadow_arrays
                .get_shadow_expression(expr, &mut self.replacements)
        } else {
            Ok(expr.clone())
        }
    }
}
