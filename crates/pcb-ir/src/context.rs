//! The context: root owner of types and functions, and the builder API
//!
//! Every builder call validates its handles and operands before touching
//! the IR. A call that fails leaves the context exactly as it was: the
//! block keeps its state and the operand slots stay unconsumed, although
//! the `Value` handles passed in are dropped with the call.

use crate::entity::{ContextId, EntityVec, FuncId};
use crate::function::{Block, BlockRef, Function, FunctionRef, Terminator};
use crate::instruction::{BinaryOp, CompareOp, Instruction, Value, ValueData, ValueDef};
use crate::types::{FunctionSignature, Type, TypeInterner, TypeKind};
use pcb_error::{Error, Result};
use std::fmt;
use tracing::debug;

/// Root of one compilation unit
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    optimize: bool,
    types: TypeInterner,
    functions: EntityVec<FuncId, Function>,
}

fn foreign(handle: &'static str) -> Error {
    Error::ForeignHandle { handle }
}

fn expect_type(site: impl FnOnce() -> String, expected: Type, found: Type) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            site: site(),
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

impl Context {
    /// Creates an empty context; `optimize` is fixed for its whole life
    pub fn new(optimize: bool) -> Self {
        let id = ContextId::fresh();
        debug!(optimize, "created context");
        Self {
            id,
            optimize,
            types: TypeInterner::new(id),
            functions: EntityVec::new(),
        }
    }

    pub fn optimize(&self) -> bool {
        self.optimize
    }

    /// Interned integer type of `width` bits
    pub fn int_type(&mut self, width: u32) -> Result<Type> {
        if width == 0 {
            return Err(Error::InvalidIntegerWidth { width });
        }
        Ok(self.types.intern(TypeKind::Integer(width)))
    }

    /// The `i1` type produced by comparisons
    pub fn bool_type(&mut self) -> Type {
        self.types.intern(TypeKind::Integer(1))
    }

    /// Number of distinct types interned so far
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Adds a function, consuming its signature
    ///
    /// Names are not required to be unique.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        signature: FunctionSignature,
    ) -> Result<FunctionRef> {
        if !signature.belongs_to(self.id) {
            return Err(foreign("signature"));
        }
        let name = name.into();
        debug!(function = %name, signature = %signature, "adding function");
        let id = self.functions.push(Function::new(name, signature));
        Ok(FunctionRef::new(self.id, id))
    }

    pub fn function(&self, func: FunctionRef) -> Result<&Function> {
        if func.context() != self.id {
            return Err(foreign("function"));
        }
        self.functions.get(func.id()).ok_or(foreign("function"))
    }

    fn function_mut(&mut self, func: FunctionRef) -> Result<&mut Function> {
        if func.context() != self.id {
            return Err(foreign("function"));
        }
        self.functions.get_mut(func.id()).ok_or(foreign("function"))
    }

    /// All functions, in creation order
    pub fn functions(&self) -> &EntityVec<FuncId, Function> {
        &self.functions
    }

    /// Appends a new open block; the first block is the entry block
    pub fn append_block(&mut self, func: FunctionRef) -> Result<BlockRef> {
        let ctx = self.id;
        let function = self.function_mut(func)?;
        let id = function.blocks_mut().push(Block::default());
        debug!(function = %function.name(), block = %id, "appended block");
        Ok(BlockRef::new(ctx, func.id(), id))
    }

    /// Fetches a fresh value of the argument at `index`
    ///
    /// Each fetch is an independent value, so one argument can feed any
    /// number of instructions.
    pub fn get_argument(&mut self, func: FunctionRef, index: usize) -> Result<Value> {
        let ctx = self.id;
        let function = self.function_mut(func)?;
        let arity = function.signature().arity();
        let ty = *function
            .signature()
            .inputs()
            .get(index)
            .ok_or(Error::IndexOutOfRange { index, arity })?;
        let id = function
            .values_mut()
            .push(ValueData::new(ty, ValueDef::Argument(index as u32)));
        Ok(Value::new(ctx, func.id(), id, ty))
    }

    fn block_data(&self, block: BlockRef) -> Result<(&Function, &Block)> {
        if block.context() != self.id {
            return Err(foreign("block"));
        }
        let function = self
            .functions
            .get(block.function().id())
            .ok_or(foreign("block"))?;
        let data = function.block(block.id()).ok_or(foreign("block"))?;
        Ok((function, data))
    }

    pub fn is_terminated(&self, block: BlockRef) -> Result<bool> {
        Ok(self.block_data(block)?.1.is_terminated())
    }

    /// Owner of `block`, provided the block still accepts instructions
    fn open_block(&self, block: BlockRef) -> Result<&Function> {
        let (function, data) = self.block_data(block)?;
        if data.is_terminated() {
            return Err(Error::BlockAlreadyTerminated {
                function: function.name().to_string(),
                block: block.id().as_u32(),
            });
        }
        Ok(function)
    }

    fn check_operand(&self, user: FuncId, value: &Value) -> Result<()> {
        if value.context() != self.id {
            return Err(foreign("value"));
        }
        let owner = self.functions.get(value.function()).ok_or(foreign("value"))?;
        if value.function() != user {
            let user = self.functions.get(user).map(Function::name).unwrap_or("?");
            return Err(Error::ValueFromOtherFunction {
                value: owner.operand_name(value.id()),
                owner: owner.name().to_string(),
                user: user.to_string(),
            });
        }
        let data = owner.value(value.id()).ok_or(foreign("value"))?;
        if data.is_consumed() {
            return Err(Error::UseAfterConsume {
                value: owner.operand_name(value.id()),
            });
        }
        Ok(())
    }

    /// Consumes `operands` and appends `inst` producing a `ty` value.
    /// Handles must have been validated.
    fn append(&mut self, block: BlockRef, ty: Type, inst: Instruction, operands: Vec<Value>) -> Value {
        let func = block.function().id();
        let function = &mut self.functions[func];
        for operand in operands {
            function.values_mut()[operand.id()].consume();
        }
        let id = function.values_mut().push(ValueData::new(
            ty,
            ValueDef::Inst {
                block: block.id(),
                inst,
            },
        ));
        function.blocks_mut()[block.id()].push(id);
        Value::new(self.id, func, id, ty)
    }

    /// Materializes a constant; `value` must fit the width of `ty`
    pub fn build_const(&mut self, block: BlockRef, ty: Type, value: u64) -> Result<Value> {
        self.open_block(block)?;
        if ty.context() != self.id {
            return Err(foreign("type"));
        }
        if !ty.fits(value) {
            return Err(Error::ConstantOverflow {
                value,
                width: ty.width(),
            });
        }
        Ok(self.append(block, ty, Instruction::Const { value }, Vec::new()))
    }

    /// Calls `callee`; the result has the callee's output type
    pub fn build_call(&mut self, block: BlockRef, callee: FunctionRef, args: Vec<Value>) -> Result<Value> {
        self.open_block(block)?;
        let target = self.function(callee)?;
        let signature = target.signature();
        if args.len() != signature.arity() {
            return Err(Error::ArityMismatch {
                callee: target.name().to_string(),
                expected: signature.arity(),
                found: args.len(),
            });
        }
        for (i, (arg, &expected)) in args.iter().zip(signature.inputs()).enumerate() {
            self.check_operand(block.function().id(), arg)?;
            expect_type(
                || format!("argument {} of call to `{}`", i, target.name()),
                expected,
                arg.ty(),
            )?;
        }
        let output = signature.output();

        let arg_ids = args.iter().map(Value::id).collect();
        let inst = Instruction::Call {
            callee: callee.id(),
            args: arg_ids,
        };
        Ok(self.append(block, output, inst, args))
    }

    /// Binary operation on two operands of the same integer type
    pub fn build_binary(&mut self, block: BlockRef, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
        self.open_block(block)?;
        let func = block.function().id();
        self.check_operand(func, &lhs)?;
        self.check_operand(func, &rhs)?;
        let ty = lhs.ty();
        expect_type(|| format!("`{}` operands", op), ty, rhs.ty())?;

        let inst = Instruction::Binary {
            op,
            lhs: lhs.id(),
            rhs: rhs.id(),
        };
        Ok(self.append(block, ty, inst, vec![lhs, rhs]))
    }

    /// Integer comparison producing an `i1`
    pub fn build_compare(&mut self, block: BlockRef, op: CompareOp, lhs: Value, rhs: Value) -> Result<Value> {
        self.open_block(block)?;
        let func = block.function().id();
        self.check_operand(func, &lhs)?;
        self.check_operand(func, &rhs)?;
        expect_type(|| format!("`icmp {}` operands", op), lhs.ty(), rhs.ty())?;

        let ty = self.bool_type();
        let inst = Instruction::Compare {
            op,
            lhs: lhs.id(),
            rhs: rhs.id(),
        };
        Ok(self.append(block, ty, inst, vec![lhs, rhs]))
    }

    fn check_target(&self, block: BlockRef, target: BlockRef) -> Result<()> {
        if target.context() != self.id {
            return Err(foreign("block"));
        }
        let function = self.function(block.function())?;
        if target.function() != block.function() {
            let owner = self
                .functions
                .get(target.function().id())
                .map(Function::name)
                .unwrap_or("?");
            return Err(Error::InvalidBranchTarget {
                function: function.name().to_string(),
                target: format!("{} of `{}`", target.id(), owner),
            });
        }
        if function.block(target.id()).is_none() {
            return Err(Error::InvalidBranchTarget {
                function: function.name().to_string(),
                target: target.id().to_string(),
            });
        }
        Ok(())
    }

    /// Handles must have been validated.
    fn terminate(&mut self, block: BlockRef, terminator: Terminator, operand: Option<Value>) {
        let function = &mut self.functions[block.function().id()];
        if let Some(value) = operand {
            function.values_mut()[value.id()].consume();
        }
        debug!(
            function = %function.name(),
            block = %block.id(),
            terminator = ?terminator,
            "terminated block"
        );
        function.blocks_mut()[block.id()].terminate(terminator);
    }

    /// Ends `block` with an unconditional jump to `target`
    pub fn set_terminator_branch(&mut self, block: BlockRef, target: BlockRef) -> Result<()> {
        self.open_block(block)?;
        self.check_target(block, target)?;
        self.terminate(block, Terminator::Branch(target.id()), None);
        Ok(())
    }

    /// Ends `block` with a two-way jump on an `i1` condition
    pub fn set_terminator_cond_branch(
        &mut self,
        block: BlockRef,
        cond: Value,
        then_block: BlockRef,
        else_block: BlockRef,
    ) -> Result<()> {
        self.open_block(block)?;
        self.check_operand(block.function().id(), &cond)?;
        if !cond.ty().is_bool() {
            return Err(Error::TypeMismatch {
                site: "branch condition".to_string(),
                expected: "i1".to_string(),
                found: cond.ty().to_string(),
            });
        }
        self.check_target(block, then_block)?;
        self.check_target(block, else_block)?;

        let terminator = Terminator::CondBranch {
            cond: cond.id(),
            then_block: then_block.id(),
            else_block: else_block.id(),
        };
        self.terminate(block, terminator, Some(cond));
        Ok(())
    }

    /// Ends `block` by returning `value`, which must have the output type
    pub fn set_terminator_return(&mut self, block: BlockRef, value: Value) -> Result<()> {
        let output = self.open_block(block)?.signature().output();
        self.check_operand(block.function().id(), &value)?;
        expect_type(|| "return value".to_string(), output, value.ty())?;

        self.terminate(block, Terminator::Return(value.id()), Some(value));
        Ok(())
    }

    /// Consumes a value nothing else will use, e.g. the result of a call
    /// executed only for its effect
    pub fn discard(&mut self, value: Value) -> Result<()> {
        self.check_operand(value.function(), &value)?;
        self.functions[value.function()].values_mut()[value.id()].consume();
        Ok(())
    }

    /// Writes the pre-lowering IR to stderr
    pub fn print(&self) {
        eprint!("{}", self);
    }

    /// Abandons the context and everything it owns
    pub fn delete(self) {
        debug!(functions = self.functions.len(), "deleted context");
    }
}

macro_rules! binary_builders {
    ($($name:ident => $op:ident, $doc:literal;)*) => {
        impl Context {
            $(
                #[doc = $doc]
                pub fn $name(&mut self, block: BlockRef, lhs: Value, rhs: Value) -> Result<Value> {
                    self.build_binary(block, BinaryOp::$op, lhs, rhs)
                }
            )*
        }
    };
}

binary_builders! {
    build_add => Add, "Wrapping addition";
    build_sub => Sub, "Wrapping subtraction";
    build_mul => Mul, "Wrapping multiplication";
    build_udiv => UDiv, "Unsigned division";
    build_sdiv => SDiv, "Signed division";
    build_urem => URem, "Unsigned remainder";
    build_srem => SRem, "Signed remainder";
    build_shl => Shl, "Shift left";
    build_lshr => LShr, "Logical shift right";
    build_ashr => AShr, "Arithmetic shift right";
    build_and => And, "Bitwise and";
    build_or => Or, "Bitwise or";
    build_xor => Xor, "Bitwise xor";
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            function.write_ir(f, &self.functions)?;
        }
        Ok(())
    }
}
