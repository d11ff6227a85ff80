//! Functions, basic blocks and terminators

use crate::entity::{BlockId, ContextId, EntityVec, FuncId, ValueId};
use crate::instruction::{Instruction, ValueData, ValueDef};
use crate::types::FunctionSignature;
use std::fmt;

/// Reference to a function of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    ctx: ContextId,
    id: FuncId,
}

impl FunctionRef {
    pub(crate) fn new(ctx: ContextId, id: FuncId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> FuncId {
        self.id
    }

    pub(crate) fn context(&self) -> ContextId {
        self.ctx
    }
}

/// Reference to a block of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    ctx: ContextId,
    func: FuncId,
    id: BlockId,
}

impl BlockRef {
    pub(crate) fn new(ctx: ContextId, func: FuncId, id: BlockId) -> Self {
        Self { ctx, func, id }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn function(&self) -> FunctionRef {
        FunctionRef::new(self.ctx, self.func)
    }

    pub(crate) fn context(&self) -> ContextId {
        self.ctx
    }
}

/// Block terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// br target
    Branch(BlockId),
    /// br cond, then, else
    CondBranch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// ret value
    Return(ValueId),
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch(target) => vec![*target],
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Return(_) => Vec::new(),
        }
    }
}

/// Basic block: instruction results in order, then at most one terminator
#[derive(Debug, Clone, Default)]
pub struct Block {
    instructions: Vec<ValueId>,
    terminator: Option<Terminator>,
}

impl Block {
    /// Value slots defined by this block's instructions, in order
    pub fn instructions(&self) -> &[ValueId] {
        &self.instructions
    }

    pub fn terminator(&self) -> Option<&Terminator> {
        self.terminator.as_ref()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    pub(crate) fn push(&mut self, value: ValueId) {
        self.instructions.push(value);
    }

    pub(crate) fn terminate(&mut self, terminator: Terminator) {
        self.terminator = Some(terminator);
    }
}

/// A function: name, consumed signature, blocks and the value arena
#[derive(Debug)]
pub struct Function {
    name: String,
    signature: FunctionSignature,
    blocks: EntityVec<BlockId, Block>,
    values: EntityVec<ValueId, ValueData>,
}

impl Function {
    pub(crate) fn new(name: String, signature: FunctionSignature) -> Self {
        Self {
            name,
            signature,
            blocks: EntityVec::new(),
            values: EntityVec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    pub fn blocks(&self) -> &EntityVec<BlockId, Block> {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn values(&self) -> &EntityVec<ValueId, ValueData> {
        &self.values
    }

    pub fn value(&self, id: ValueId) -> Option<&ValueData> {
        self.values.get(id)
    }

    /// Block 0, if any block was appended
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.ids().next()
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut EntityVec<BlockId, Block> {
        &mut self.blocks
    }

    pub(crate) fn values_mut(&mut self) -> &mut EntityVec<ValueId, ValueData> {
        &mut self.values
    }

    /// Writes the function in the diagnostic IR format, resolving callee
    /// names through `functions`
    pub(crate) fn write_ir(
        &self,
        f: &mut fmt::Formatter<'_>,
        functions: &EntityVec<FuncId, Function>,
    ) -> fmt::Result {
        write!(f, "define {} @{}(", self.signature.output(), self.name)?;
        for (i, input) in self.signature.inputs().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", input)?;
        }
        writeln!(f, ") {{")?;

        for (id, block) in self.blocks.iter_enumerated() {
            writeln!(f, "{}:", id)?;
            for &value in block.instructions() {
                write!(f, "  ")?;
                self.write_instruction(f, value, functions)?;
                writeln!(f)?;
            }
            match block.terminator() {
                Some(Terminator::Branch(target)) => writeln!(f, "  br {}", target)?,
                Some(Terminator::CondBranch {
                    cond,
                    then_block,
                    else_block,
                }) => writeln!(
                    f,
                    "  br {}, {}, {}",
                    self.operand_name(*cond),
                    then_block,
                    else_block
                )?,
                Some(Terminator::Return(value)) => {
                    writeln!(f, "  ret {}", self.operand_name(*value))?
                }
                None => writeln!(f, "  <unterminated>")?,
            }
        }

        writeln!(f, "}}")
    }

    fn write_instruction(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: ValueId,
        functions: &EntityVec<FuncId, Function>,
    ) -> fmt::Result {
        let Some(data) = self.values.get(id) else {
            return write!(f, "{} = <invalid>", id);
        };
        let ValueDef::Inst { inst, .. } = data.def() else {
            return write!(f, "{} = <argument>", id);
        };

        write!(f, "{} = ", id)?;
        match inst {
            Instruction::Const { value } => write!(f, "const {} {}", data.ty(), value),
            Instruction::Call { callee, args } => {
                let name = functions.get(*callee).map(Function::name).unwrap_or("?");
                write!(f, "call {} @{}(", data.ty(), name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.operand_name(*arg))?;
                }
                write!(f, ")")
            }
            Instruction::Binary { op, lhs, rhs } => write!(
                f,
                "{} {} {}, {}",
                op,
                data.ty(),
                self.operand_name(*lhs),
                self.operand_name(*rhs)
            ),
            Instruction::Compare { op, lhs, rhs } => {
                let operand_ty = self
                    .values
                    .get(*lhs)
                    .map(|lhs| lhs.ty().to_string())
                    .unwrap_or_default();
                write!(
                    f,
                    "icmp {} {} {}, {}",
                    op,
                    operand_ty,
                    self.operand_name(*lhs),
                    self.operand_name(*rhs)
                )
            }
        }
    }

    /// `%argN` for argument fetches, `%N` for instruction results
    pub fn operand_name(&self, id: ValueId) -> String {
        match self.values.get(id).map(ValueData::def) {
            Some(ValueDef::Argument(index)) => format!("%arg{}", index),
            _ => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;

    #[test]
    fn test_terminator_successors() {
        let br = Terminator::Branch(BlockId::new(1));
        assert_eq!(br.successors(), vec![BlockId::new(1)]);

        let cond = Terminator::CondBranch {
            cond: ValueId::new(4),
            then_block: BlockId::new(1),
            else_block: BlockId::new(2),
        };
        assert_eq!(cond.successors(), vec![BlockId::new(1), BlockId::new(2)]);

        assert!(Terminator::Return(ValueId::new(0)).successors().is_empty());
    }

    #[test]
    fn test_block_termination() {
        let mut block = Block::default();
        assert!(!block.is_terminated());
        block.push(ValueId::new(0));
        block.terminate(Terminator::Return(ValueId::new(0)));
        assert!(block.is_terminated());
        assert_eq!(block.instructions(), &[ValueId::new(0)]);
    }
}
