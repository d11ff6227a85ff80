//! IR Instructions and values
//!
//! Every SSA value of a function lives in one value arena owned by that
//! function. A slot is defined either by a function argument fetch or by an
//! instruction appended to a block. Callers only ever hold [`Value`]
//! handles, which are move-only: passing one to a builder call consumes it.

use crate::entity::{BlockId, ContextId, FuncId, ValueId};
use crate::types::Type;
use std::fmt;

/// Single-use handle to an SSA value
///
/// `Value` is neither `Clone` nor `Copy`; each handle feeds exactly one
/// instruction operand or terminator. Fetching the same function argument
/// twice yields two independent handles.
#[must_use = "a value must be consumed by an instruction or a terminator, or discarded with `Context::discard`"]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Value {
    ctx: ContextId,
    func: FuncId,
    id: ValueId,
    ty: Type,
}

impl Value {
    pub(crate) fn new(ctx: ContextId, func: FuncId, id: ValueId, ty: Type) -> Self {
        Self { ctx, func, id, ty }
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn function(&self) -> FuncId {
        self.func
    }

    pub(crate) fn context(&self) -> ContextId {
        self.ctx
    }
}

/// Binary arithmetic and bitwise operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    // Shifts
    Shl,
    LShr,
    AShr,
    // Bitwise
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 13] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::UDiv,
        BinaryOp::SDiv,
        BinaryOp::URem,
        BinaryOp::SRem,
        BinaryOp::Shl,
        BinaryOp::LShr,
        BinaryOp::AShr,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
    ];

    /// Division and remainder, which reject a constant zero divisor
    pub fn is_division(&self) -> bool {
        matches!(
            self,
            BinaryOp::UDiv | BinaryOp::SDiv | BinaryOp::URem | BinaryOp::SRem
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::URem => "urem",
            BinaryOp::SRem => "srem",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Integer comparison predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
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

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Ult => "ult",
            CompareOp::Ule => "ule",
            CompareOp::Ugt => "ugt",
            CompareOp::Uge => "uge",
            CompareOp::Slt => "slt",
            CompareOp::Sle => "sle",
            CompareOp::Sgt => "sgt",
            CompareOp::Sge => "sge",
        };
        f.write_str(name)
    }
}

/// Value-producing instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Literal constant; the payload fits the result type
    /// %dest = const ty value
    Const { value: u64 },

    /// Direct call
    /// %dest = call ty @func(args...)
    Call { callee: FuncId, args: Vec<ValueId> },

    /// Binary operation on two operands of one integer type
    /// %dest = op ty lhs, rhs
    Binary {
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },

    /// Comparison producing an i1
    /// %dest = icmp op lhs, rhs
    Compare {
        op: CompareOp,
        lhs: ValueId,
        rhs: ValueId,
    },
}

/// What defines a value slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueDef {
    /// A fetch of the function argument at this index
    Argument(u32),
    /// An instruction in `block`
    Inst { block: BlockId, inst: Instruction },
}

/// One slot of a function's value arena
#[derive(Debug, Clone)]
pub struct ValueData {
    ty: Type,
    def: ValueDef,
    consumed: bool,
}

impl ValueData {
    pub(crate) fn new(ty: Type, def: ValueDef) -> Self {
        Self {
            ty,
            def,
            consumed: false,
        }
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn def(&self) -> &ValueDef {
        &self.def
    }

    /// Checks if an instruction or terminator has consumed this value
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// The constant payload, if this slot is a `const` instruction
    pub fn as_const(&self) -> Option<u64> {
        match &self.def {
            ValueDef::Inst {
                inst: Instruction::Const { value },
                ..
            } => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn consume(&mut self) {
        self.consumed = true;
    }
}
