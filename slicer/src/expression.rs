// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

/// The number of bits in the value denoted by an expression.
pub type Width = u32;

pub const BOOL: Width = 1;
pub const INT8: Width = 8;
pub const INT32: Width = 32;
pub const INT64: Width = 64;

/// A symbolic array of bytes. A read from an array denotes the unknown initial content of
/// a memory object, as modified by the writes recorded in the update list of the read.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Array {
    pub name: Rc<str>,
    pub size: u64,
}

impl Array {
    pub fn new(name: &str, size: u64) -> Rc<Array> {
        Rc::new(Array {
            name: Rc::from(name),
            size,
        })
    }
}

/// One write into a symbolic array. Writes are linked from the most recent to the oldest.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct UpdateNode {
    pub next: Option<Rc<UpdateNode>>,
    pub index: Rc<Expression>,
    pub value: Rc<Expression>,
}

/// A symbolic array together with the writes that have been applied to it.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct UpdateList {
    pub root: Rc<Array>,
    pub head: Option<Rc<UpdateNode>>,
}

impl UpdateList {
    /// An update list without any writes.
    pub fn new(root: Rc<Array>) -> UpdateList {
        UpdateList { root, head: None }
    }

    /// Returns a copy of this list with one more write on top of it.
    pub fn extend(&self, index: Rc<Expression>, value: Rc<Expression>) -> UpdateList {
        UpdateList {
            root: self.root.clone(),
            head: Some(Rc::new(UpdateNode {
                next: self.head.clone(),
                index,
                value,
            })),
        }
    }

    /// The number of writes in the list.
    pub fn len(&self) -> usize {
        let mut result = 0;
        let mut node = &self.head;
        while let Some(n) = node {
            result += 1;
            node = &n.next;
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Operators that combine two bit vectors.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum BinaryOperator {
    Concat,
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl BinaryOperator {
    /// Returns true if the operator yields a Boolean.
    pub fn is_comparison(self) -> bool {
        use self::BinaryOperator::*;
        matches!(
            self,
            Eq | Ne | Ult | Ule | Ugt | Uge | Slt | Sle | Sgt | Sge
        )
    }
}

/// The two ways to widen a bit vector.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum CastKind {
    /// Zero extend
    ZExt,
    /// Sign extend
    SExt,
}

/// Symbolic expressions over bit vectors and byte arrays, as produced by the host interpreter.
/// Nodes are immutable and shared via Rc.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Expression {
    /// left operator right
    Binary {
        operator: BinaryOperator,
        left: Rc<Expression>,
        right: Rc<Expression>,
    },

    /// The operand widened to width bits.
    Cast {
        kind: CastKind,
        operand: Rc<Expression>,
        width: Width,
    },

    /// A constant bit vector. Bits above the width are always zero.
    Constant { value: u64, width: Width },

    /// width bits of the operand, starting at bit offset.
    Extract {
        operand: Rc<Expression>,
        offset: u32,
        width: Width,
    },

    /// Bitwise negation.
    Not { operand: Rc<Expression> },

    /// Wraps an expression that must not be simplified by the host.
    NotOptimized { operand: Rc<Expression> },

    /// The byte at index of the array described by updates.
    Read {
        updates: UpdateList,
        index: Rc<Expression>,
    },

    /// if condition { consequent } else { alternate }
    Select {
        condition: Rc<Expression>,
        consequent: Rc<Expression>,
        alternate: Rc<Expression>,
    },
}

fn mask(value: u64, width: Width) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

/// Constructors
impl Expression {
    pub fn constant(value: u64, width: Width) -> Rc<Expression> {
        Rc::new(Expression::Constant {
            value: mask(value, width),
            width,
        })
    }

    /// A constant of pointer width.
    pub fn pointer(value: u64) -> Rc<Expression> {
        Self::constant(value, INT64)
    }

    pub fn binary(
        operator: BinaryOperator,
        left: Rc<Expression>,
        right: Rc<Expression>,
    ) -> Rc<Expression> {
        Rc::new(Expression::Binary {
            operator,
            left,
            right,
        })
    }

    /// Returns left + right, folded into a single constant if both are constants.
    pub fn add(left: Rc<Expression>, right: Rc<Expression>) -> Rc<Expression> {
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Self::constant(l.wrapping_add(r), left.width()),
            _ => Self::binary(BinaryOperator::Add, left, right),
        }
    }

    /// Returns left - right, folded into a single constant if both are constants.
    pub fn sub(left: Rc<Expression>, right: Rc<Expression>) -> Rc<Expression> {
        match (left.as_constant(), right.as_constant()) {
            (Some(l), Some(r)) => Self::constant(l.wrapping_sub(r), left.width()),
            _ => Self::binary(BinaryOperator::Sub, left, right),
        }
    }

    pub fn cast(kind: CastKind, operand: Rc<Expression>, width: Width) -> Rc<Expression> {
        Rc::new(Expression::Cast {
            kind,
            operand,
            width,
        })
    }

    pub fn extract(operand: Rc<Expression>, offset: u32, width: Width) -> Rc<Expression> {
        Rc::new(Expression::Extract {
            operand,
            offset,
            width,
        })
    }

    pub fn not(operand: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::Not { operand })
    }

    pub fn not_optimized(operand: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::NotOptimized { operand })
    }

    pub fn read(updates: UpdateList, index: Rc<Expression>) -> Rc<Expression> {
        Rc::new(Expression::Read { updates, index })
    }

    pub fn select(
        condition: Rc<Expression>,
        consequent: Rc<Expression>,
        alternate: Rc<Expression>,
    ) -> Rc<Expression> {
        Rc::new(Expression::Select {
            condition,
            consequent,
            alternate,
        })
    }
}

/// Queries
impl Expression {
    /// The value of a constant expression, None otherwise.
    pub fn as_constant(&self) -> Option<u64> {
        if let Expression::Constant { value, .. } = self {
            Some(*value)
        } else {
            None
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant { .. })
    }

    /// The immediate sub-expressions. The indices and values of update lists are not included.
    pub fn children(&self) -> Vec<&Rc<Expression>> {
        match self {
            Expression::Binary { left, right, .. } => vec![left, right],
            Expression::Cast { operand, .. }
            | Expression::Extract { operand, .. }
            | Expression::Not { operand }
            | Expression::NotOptimized { operand } => vec![operand],
            Expression::Constant { .. } => vec![],
            Expression::Read { index, .. } => vec![index],
            Expression::Select {
                condition,
                consequent,
                alternate,
            } => vec![condition, consequent, alternate],
        }
    }

    pub fn width(&self) -> Width {
        match self {
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                if operator.is_comparison() {
                    BOOL
                } else if *operator == BinaryOperator::Concat {
                    left.width() + right.width()
                } else {
                    left.width()
                }
            }
            Expression::Cast { width, .. }
            | Expression::Constant { width, .. }
            | Expression::Extract { width, .. } => *width,
            Expression::Not { operand } | Expression::NotOptimized { operand } => operand.width(),
            Expression::Read { .. } => INT8,
            Expression::Select { consequent, .. } => consequent.width(),
        }
    }

    /// Calls f on every array that is read from in this expression, including the arrays
    /// read by the indices and values of update lists.
    pub fn visit_arrays(&self, f: &mut dyn FnMut(&Rc<Array>)) {
        if let Expression::Read { updates, .. } = self {
            f(&updates.root);
            let mut node = &updates.head;
            while let Some(n) = node {
                n.index.visit_arrays(f);
                n.value.visit_arrays(f);
                node = &n.next;
            }
        }
        for child in self.children() {
            child.visit_arrays(f);
        }
    }
}

impl Debug for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Expression::Binary {
                operator,
                left,
                right,
            } => write!(f, "({:?} w{} {} {})", operator, self.width(), left, right),
            Expression::Cast {
                kind,
                operand,
                width,
            } => write!(f, "({:?} w{} {})", kind, width, operand),
            Expression::Constant { value, width } => {
                if *width == BOOL {
                    f.write_str(if *value == 0 { "false" } else { "true" })
                } else {
                    write!(f, "(w{} {})", width, value)
                }
            }
            Expression::Extract {
                operand,
                offset,
                width,
            } => write!(f, "(Extract w{} {} {})", width, offset, operand),
            Expression::Not { operand } => write!(f, "(Not w{} {})", operand.width(), operand),
            Expression::NotOptimized { operand } => write!(f, "(NotOptimized {})", operand),
            Expression::Read { updates, index } => {
                f.write_str("(Read w8 ")?;
                Display::fmt(index, f)?;
                f.write_str(" ")?;
                if updates.head.is_some() {
                    f.write_str("[")?;
                    let mut node = &updates.head;
                    let mut first = true;
                    while let Some(n) = node {
                        if !first {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}={}", n.index, n.value)?;
                        first = false;
                        node = &n.next;
                    }
                    f.write_str("] @ ")?;
                }
                write!(f, "{})", updates.root.name)
            }
            Expression::Select {
                condition,
                consequent,
                alternate,
            } => write!(
                f,
                "(Select w{} {} {} {})",
                self.width(),
                condition,
                consequent,
                alternate
            ),
        }
    }
}
