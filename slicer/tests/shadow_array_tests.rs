// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use slicer::errors::DependencyError;
use slicer::expression::{Array, Expression, UpdateList, INT32, INT8};
use slicer::program::{Opcode, ProgramValue, ValueType};
use slicer::shadow_array::{InterpolationSession, ShadowArrays};
use slicer::versioned_value::MemoryLocation;
use std::collections::BTreeSet;
use std::rc::Rc;

fn read(array: &Rc<Array>, index: u64) -> Rc<Expression> {
    Expression::read(UpdateList::new(array.clone()), Expression::constant(index, INT32))
}

fn arrays_of(expression: &Expression) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    expression.visit_arrays(&mut |a| {
        names.insert(a.name.to_string());
    });
    names
}

#[test]
fn reads_are_redirected_to_shadows() {
    let a = Array::new("a", 4);
    let a_shadow = Array::new("a_shadow", 4);
    let b = Array::new("b", 4);
    let b_shadow = Array::new("b_shadow", 4);
    let mut shadows = ShadowArrays::new();
    assert!(shadows.is_empty());
    shadows.add_shadow_array_map(a.clone(), a_shadow.clone());
    shadows.add_shadow_array_map(b.clone(), b_shadow.clone());
    assert_eq!(shadows.len(), 2);
    assert_eq!(shadows.get_shadow_array(&a), Some(&a_shadow));
    assert!(shadows.get_shadow_array(&a_shadow).is_none());

    let updates = UpdateList::new(a.clone())
        .extend(Expression::constant(1, INT32), read(&b, 0))
        .extend(Expression::constant(2, INT32), Expression::constant(9, INT8));
    let expression = Expression::add(
        Expression::read(updates, Expression::constant(0, INT32)),
        Expression::constant(1, INT8),
    );

    let mut replacements = BTreeSet::new();
    let shadowed = shadows
        .get_shadow_expression(&expression, &mut replacements)
        .unwrap();
    let expected: BTreeSet<String> = ["a_shadow", "b_shadow"].iter().map(|s| s.to_string()).collect();
    assert_eq!(arrays_of(&shadowed), expected);
    let used: BTreeSet<Rc<Array>> = [a_shadow, b_shadow].into_iter().collect();
    assert_eq!(replacements, used);

    // The writes keep their order.
    if let Expression::Binary { left, .. } = shadowed.as_ref() {
        if let Expression::Read { updates, .. } = left.as_ref() {
            assert_eq!(updates.len(), 2);
            let head = updates.head.as_ref().unwrap();
            assert_eq!(head.index.as_constant(), Some(2));
        } else {
            panic!("expected a read, found {}", left);
        }
    } else {
        panic!("expected an addition, found {}", shadowed);
    }

    // Rewriting is deterministic.
    let again = shadows
        .get_shadow_expression(&expression, &mut BTreeSet::new())
        .unwrap();
    assert_eq!(again, shadowed);
}

#[test]
fn constants_are_left_alone() {
    let shadows = ShadowArrays::new();
    let mut replacements = BTreeSet::new();
    let constant = Expression::constant(3, INT32);
    let shadowed = shadows
        .get_shadow_expression(&constant, &mut replacements)
        .unwrap();
    assert!(Rc::ptr_eq(&constant, &shadowed));
    assert!(replacements.is_empty());
}

#[test]
fn arrays_without_shadow() {
    let shadows = ShadowArrays::new();
    let result = shadows.get_shadow_expression(&read(&Array::new("a", 4), 0), &mut BTreeSet::new());
    assert!(matches!(result, Err(DependencyError::MissingShadowArray(name)) if name == "a"));
}

#[test]
fn shadowing_a_location() {
    let a = Array::new("a", 8);
    let mut shadows = ShadowArrays::new();
    shadows.add_shadow_array_map(a.clone(), Array::new("a'", 8));
    let site = ProgramValue::instruction("p", "f", Opcode::Alloca, vec![], ValueType::Pointer);
    let location = MemoryLocation::new(site, read(&a, 0));
    location.set_as_core();
    let mut replacements = BTreeSet::new();
    let shadowed = shadows.get_shadow_location(&location, &mut replacements).unwrap();
    assert!(shadowed.is_core());
    assert_eq!(shadowed.site, location.site);
    let expected: BTreeSet<String> = ["a'".to_string()].into_iter().collect();
    assert_eq!(arrays_of(&shadowed.address), expected);
    assert_eq!(replacements.len(), 1);
}

#[test]
fn sessions_only_shadow_when_existential() {
    let a = Array::new("a", 4);
    let expression = read(&a, 0);

    let mut session = InterpolationSession::new(false);
    let same = session.shadow_if_existential(&expression).unwrap();
    assert!(Rc::ptr_eq(&same, &expression));

    let mut session = InterpolationSession::new(true);
    session.add_shadow_array_map(a, Array::new("a_shadow", 4));
    let shadowed = session.shadow_if_existential(&expression).unwrap();
    assert_ne!(shadowed, expression);
    assert_eq!(session.replacements.len(), 1);
}
