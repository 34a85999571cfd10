// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::expression::Width;
use crate::utils;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Instruction opcodes of the analyzed program, as far as they matter to dependency tracking.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Opcode {
    // Terminators
    Br,
    Ret,
    Switch,
    Unreachable,

    // Memory
    Alloca,
    GetElementPtr { in_bounds: bool },
    Load,
    Store,

    // Conversions
    AddrSpaceCast,
    BitCast,
    FPExt,
    FPToSI,
    FPToUI,
    FPTrunc,
    IntToPtr,
    PtrToInt,
    SExt,
    SIToFP,
    Trunc,
    UIToFP,
    ZExt,

    // Aggregates
    ExtractValue,
    InsertValue,

    // Arithmetic and logic
    Add,
    AShr,
    And,
    FAdd,
    FDiv,
    FMul,
    FRem,
    FSub,
    LShr,
    Mul,
    Or,
    SDiv,
    Shl,
    SRem,
    Sub,
    UDiv,
    URem,
    Xor,

    // Other
    Call,
    FCmp,
    ICmp,
    Phi,
    Select,
}

/// The type of a program value, coarse enough for the questions the dependency analysis asks.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ValueType {
    Aggregate,
    Float(Width),
    Integer(Width),
    Pointer,
    Void,
}

/// What kind of entity a program value is.
#[derive(Clone, Debug)]
pub enum ValueKind {
    /// A formal parameter of the named function.
    Argument { function: Rc<str>, ordinal: usize },

    /// A constant that is not a global, such as a numeric literal.
    Constant,

    /// A constant computed from other constants, for example the address of an element of
    /// a global array. The operands of the program value are the operands of the expression.
    ConstantExpr { opcode: Opcode },

    /// A function. Functions are global values.
    Function {
        intrinsic: bool,
        parameters: Vec<Rc<ProgramValue>>,
    },

    /// A global variable. The value itself is the (constant) address of the variable.
    GlobalVariable,

    /// An instruction in the body of the named function.
    /// Calls have their actual arguments as operands, followed by the called value.
    Instruction { opcode: Opcode, function: Rc<str> },
}

/// An opaque handle to a value of the program under analysis. Handles are compared, hashed
/// and ordered by identity, never by content.
pub struct ProgramValue {
    id: usize,
    pub name: Rc<str>,
    pub kind: ValueKind,
    pub operands: Vec<Rc<ProgramValue>>,
    pub value_type: ValueType,
}

impl Debug for ProgramValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(&self.name)
    }
}

impl Display for ProgramValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match &self.kind {
            ValueKind::Instruction { opcode, function } => {
                write!(f, "{}/%{} = {:?}", function, self.name, opcode)
            }
            ValueKind::Argument { function, .. } => write!(f, "{}/%{}", function, self.name),
            ValueKind::GlobalVariable | ValueKind::Function { .. } => write!(f, "@{}", self.name),
            ValueKind::Constant | ValueKind::ConstantExpr { .. } => f.write_str(&self.name),
        }
    }
}

impl Hash for ProgramValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.id);
    }
}

impl PartialEq for ProgramValue {
    fn eq(&self, other: &ProgramValue) -> bool {
        self.id == other.id
    }
}

impl Eq for ProgramValue {}

impl PartialOrd for ProgramValue {
    fn partial_cmp(&self, other: &ProgramValue) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProgramValue {
    fn cmp(&self, other: &ProgramValue) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// Constructors
impl ProgramValue {
    pub fn new(
        name: &str,
        kind: ValueKind,
        operands: Vec<Rc<ProgramValue>>,
        value_type: ValueType,
    ) -> Rc<ProgramValue> {
        Rc::new(ProgramValue {
            id: utils::fresh_identity(),
            name: Rc::from(name),
            kind,
            operands,
            value_type,
        })
    }

    pub fn argument(
        name: &str,
        function: &str,
        ordinal: usize,
        value_type: ValueType,
    ) -> Rc<ProgramValue> {
        let kind = ValueKind::Argument {
            function: Rc::from(function),
            ordinal,
        };
        Self::new(name, kind, vec![], value_type)
    }

    pub fn constant(name: &str, value_type: ValueType) -> Rc<ProgramValue> {
        Self::new(name, ValueKind::Constant, vec![], value_type)
    }

    pub fn function(
        name: &str,
        intrinsic: bool,
        parameters: Vec<Rc<ProgramValue>>,
        return_type: ValueType,
    ) -> Rc<ProgramValue> {
        let kind = ValueKind::Function {
            intrinsic,
            parameters,
        };
        Self::new(name, kind, vec![], return_type)
    }

    pub fn global_variable(name: &str) -> Rc<ProgramValue> {
        Self::new(name, ValueKind::GlobalVariable, vec![], ValueType::Pointer)
    }

    pub fn instruction(
        name: &str,
        function: &str,
        opcode: Opcode,
        operands: Vec<Rc<ProgramValue>>,
        value_type: ValueType,
    ) -> Rc<ProgramValue> {
        let kind = ValueKind::Instruction {
            opcode,
            function: Rc::from(function),
        };
        Self::new(name, kind, operands, value_type)
    }
}

/// Queries
impl ProgramValue {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Constants include global values, whose addresses are fixed for an execution.
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Constant
                | ValueKind::ConstantExpr { .. }
                | ValueKind::Function { .. }
                | ValueKind::GlobalVariable
        )
    }

    pub fn is_global(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Function { .. } | ValueKind::GlobalVariable
        )
    }

    pub fn is_global_variable(&self) -> bool {
        matches!(self.kind, ValueKind::GlobalVariable)
    }

    pub fn is_argument(&self) -> bool {
        matches!(self.kind, ValueKind::Argument { .. })
    }

    pub fn is_call(&self) -> bool {
        self.opcode() == Some(Opcode::Call)
    }

    pub fn is_pointer(&self) -> bool {
        self.value_type == ValueType::Pointer
    }

    pub fn is_void(&self) -> bool {
        self.value_type == ValueType::Void
    }

    /// Arguments of the program entry point refer to memory that the program never allocates.
    pub fn is_main_argument(&self) -> bool {
        match &self.kind {
            ValueKind::Argument { function, .. } => {
                function.as_ref() == "main" || function.as_ref() == "__user_main"
            }
            _ => false,
        }
    }

    /// Returns true for a constant expression that computes an element address.
    pub fn is_constant_element_address(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::ConstantExpr {
                opcode: Opcode::GetElementPtr { .. }
            }
        )
    }

    /// The opcode of an instruction, None for other kinds of values.
    pub fn opcode(&self) -> Option<Opcode> {
        if let ValueKind::Instruction { opcode, .. } = &self.kind {
            Some(*opcode)
        } else {
            None
        }
    }

    /// The name of the function containing this instruction or argument.
    pub fn parent_function(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::Argument { function, .. } | ValueKind::Instruction { function, .. } => {
                Some(function.as_ref())
            }
            _ => None,
        }
    }

    pub fn operand(&self, index: usize) -> Option<&Rc<ProgramValue>> {
        self.operands.get(index)
    }

    /// A branch is conditional if it has a condition operand.
    pub fn is_conditional_branch(&self) -> bool {
        self.opcode() == Some(Opcode::Br) && !self.operands.is_empty()
    }

    /// The actual arguments of a call instruction.
    pub fn call_arguments(&self) -> &[Rc<ProgramValue>] {
        if self.is_call() && !self.operands.is_empty() {
            &self.operands[0..self.operands.len() - 1]
        } else {
            &[]
        }
    }

    /// The function called by a call instruction, looking through a constant cast of the
    /// called value. None if the callee is not statically known.
    pub fn called_function(&self) -> Option<&Rc<ProgramValue>> {
        if !self.is_call() {
            return None;
        }
        let called_value = self.operands.last()?;
        match &called_value.kind {
            ValueKind::Function { .. } => Some(called_value),
            ValueKind::ConstantExpr { .. } => {
                let wrapped = called_value.operands.first()?;
                if let ValueKind::Function { .. } = &wrapped.kind {
                    Some(wrapped)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// The formal parameters of a function.
    pub fn parameters(&self) -> &[Rc<ProgramValue>] {
        if let ValueKind::Function { parameters, .. } = &self.kind {
            parameters
        } else {
            &[]
        }
    }

    pub fn is_intrinsic(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Function {
                intrinsic: true,
                ..
            }
        )
    }
}
