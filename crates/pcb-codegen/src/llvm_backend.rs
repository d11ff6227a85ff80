//! LLVM Backend for the pcb IR
//!
//! Lowers a context to an LLVM module and emits a native object through
//! the host target machine. Requires LLVM 17 to be installed on the system.
//!
//! # Setup
//!
//! 1. Install LLVM 17 from https://llvm.org/releases/
//! 2. Set environment variable: LLVM_SYS_170_PREFIX=/path/to/llvm
//! 3. Build with: cargo build --features llvm

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context as LlvmContext;
use inkwell::module::{Linkage, Module as LlvmModule};
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::{BasicMetadataValueEnum, FunctionValue, IntValue};
use inkwell::{IntPredicate, OptimizationLevel};
use std::collections::HashMap;

use pcb_error::{Error, Result};
use pcb_ir::{
    BinaryOp, BlockId, CompareOp, Context, EntityVec, FuncId, Function, Instruction, Terminator,
    ValueDef, ValueId,
};
use tracing::{debug, info};

use crate::layout::lowering_order;
use crate::{Artifact, CodeGen, CompileOptions};

const NAME: &str = "llvm";

fn backend_error(err: impl std::fmt::Display) -> Error {
    Error::backend(NAME, err.to_string())
}

/// LLVM code generator targeting the host
#[derive(Debug, Clone, Copy, Default)]
pub struct LlvmBackend;

impl LlvmBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGen for LlvmBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn generate(&self, ctx: &Context, options: &CompileOptions) -> Result<Artifact> {
        let llvm = LlvmContext::create();
        let mut lowering = ModuleLowering::new(&llvm, &options.module_name);
        lowering.lower(ctx)?;

        lowering
            .module
            .verify()
            .map_err(|msg| Error::backend(NAME, format!("LLVM verification failed: {}", msg)))?;

        Target::initialize_native(&InitializationConfig::default())
            .map_err(|msg| Error::backend(NAME, format!("failed to initialize target: {}", msg)))?;
        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).map_err(backend_error)?;
        let level = if options.optimize {
            OptimizationLevel::Default
        } else {
            OptimizationLevel::None
        };
        let machine = target
            .create_target_machine(&triple, "generic", "", level, RelocMode::PIC, CodeModel::Default)
            .ok_or_else(|| Error::backend(NAME, "failed to create target machine"))?;
        info!(target_triple = ?triple, optimize = options.optimize, "lowering with llvm");

        if options.optimize {
            lowering
                .module
                .run_passes("default<O2>", &machine, PassBuilderOptions::create())
                .map_err(backend_error)?;
        }

        let lowered_ir = options
            .capture_lowered_ir
            .then(|| lowering.module.print_to_string().to_string());

        let buffer = machine
            .write_to_memory_buffer(&lowering.module, FileType::Object)
            .map_err(|msg| Error::backend(NAME, format!("failed to emit object: {}", msg)))?;

        Ok(Artifact {
            object: buffer.as_slice().to_vec(),
            lowered_ir,
        })
    }
}

struct ModuleLowering<'ctx> {
    context: &'ctx LlvmContext,
    module: LlvmModule<'ctx>,
    builder: Builder<'ctx>,
    functions: EntityVec<FuncId, FunctionValue<'ctx>>,
}

impl<'ctx> ModuleLowering<'ctx> {
    fn new(context: &'ctx LlvmContext, module_name: &str) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            functions: EntityVec::new(),
        }
    }

    fn lower(&mut self, ctx: &Context) -> Result<()> {
        // Declare all functions first (for forward references)
        for function in ctx.functions().iter() {
            let signature = function.signature();
            let params: Vec<BasicMetadataTypeEnum> = signature
                .inputs()
                .iter()
                .map(|input| self.context.custom_width_int_type(input.width()).into())
                .collect();
            let fn_type = self
                .context
                .custom_width_int_type(signature.output().width())
                .fn_type(&params, false);
            let value = self
                .module
                .add_function(function.name(), fn_type, Some(Linkage::External));
            self.functions.push(value);
        }

        for (func_id, function) in ctx.functions().iter_enumerated() {
            self.lower_function(self.functions[func_id], function)?;
            debug!(function = function.name(), "lowered function");
        }
        Ok(())
    }

    fn lower_function(&self, fn_value: FunctionValue<'ctx>, function: &Function) -> Result<()> {
        let entry = self.context.append_basic_block(fn_value, "entry");
        let mut blocks: EntityVec<BlockId, BasicBlock<'ctx>> = EntityVec::new();
        for id in function.blocks().ids() {
            blocks.push(self.context.append_basic_block(fn_value, &id.to_string()));
        }
        let target = |id: BlockId| {
            blocks.get(id).copied().ok_or_else(|| Error::InvalidBranchTarget {
                function: function.name().to_string(),
                target: id.to_string(),
            })
        };

        let first = function.entry().ok_or_else(|| Error::EmptyFunction {
            function: function.name().to_string(),
        })?;
        self.builder.position_at_end(entry);
        self.builder
            .build_unconditional_branch(target(first)?)
            .map_err(backend_error)?;

        let mut values: HashMap<ValueId, IntValue<'ctx>> = HashMap::new();
        for block_id in lowering_order(function) {
            self.builder.position_at_end(target(block_id)?);
            let block = &function.blocks()[block_id];

            for &id in block.instructions() {
                let value = self.lower_instruction(fn_value, function, &values, id)?;
                values.insert(id, value);
            }

            match block.terminator() {
                Some(Terminator::Branch(to)) => {
                    self.builder
                        .build_unconditional_branch(target(*to)?)
                        .map_err(backend_error)?;
                }
                Some(Terminator::CondBranch {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    let cond = operand(fn_value, function, &values, *cond)?;
                    self.builder
                        .build_conditional_branch(cond, target(*then_block)?, target(*else_block)?)
                        .map_err(backend_error)?;
                }
                Some(Terminator::Return(value)) => {
                    let value = operand(fn_value, function, &values, *value)?;
                    self.builder
                        .build_return(Some(&value))
                        .map_err(backend_error)?;
                }
                None => {
                    return Err(Error::UnterminatedBlock {
                        function: function.name().to_string(),
                        block: block_id.as_u32(),
                    })
                }
            }
        }
        Ok(())
    }

    fn lower_instruction(
        &self,
        fn_value: FunctionValue<'ctx>,
        function: &Function,
        values: &HashMap<ValueId, IntValue<'ctx>>,
        id: ValueId,
    ) -> Result<IntValue<'ctx>> {
        let data = function
            .value(id)
            .ok_or_else(|| Error::backend(NAME, format!("unknown value {}", id)))?;
        let ValueDef::Inst { inst, .. } = data.def() else {
            return operand(fn_value, function, values, id);
        };
        let name = format!("v{}", id.as_u32());

        match inst {
            Instruction::Const { value } => Ok(self
                .context
                .custom_width_int_type(data.ty().width())
                .const_int(*value, false)),
            Instruction::Call { callee, args } => {
                let callee_value = self
                    .functions
                    .get(*callee)
                    .copied()
                    .ok_or(Error::ForeignHandle { handle: "function" })?;
                let args = args
                    .iter()
                    .map(|&arg| operand(fn_value, function, values, arg).map(BasicMetadataValueEnum::from))
                    .collect::<Result<Vec<_>>>()?;
                let call = self
                    .builder
                    .build_call(callee_value, &args, &name)
                    .map_err(backend_error)?;
                call.try_as_basic_value()
                    .left()
                    .map(|value| value.into_int_value())
                    .ok_or_else(|| Error::backend(NAME, "call produced no result"))
            }
            Instruction::Binary { op, lhs, rhs } => {
                let lhs = operand(fn_value, function, values, *lhs)?;
                let rhs = operand(fn_value, function, values, *rhs)?;
                let b = &self.builder;
                let result = match op {
                    BinaryOp::Add => b.build_int_add(lhs, rhs, &name),
                    BinaryOp::Sub => b.build_int_sub(lhs, rhs, &name),
                    BinaryOp::Mul => b.build_int_mul(lhs, rhs, &name),
                    BinaryOp::UDiv => b.build_int_unsigned_div(lhs, rhs, &name),
                    BinaryOp::SDiv => b.build_int_signed_div(lhs, rhs, &name),
                    BinaryOp::URem => b.build_int_unsigned_rem(lhs, rhs, &name),
                    BinaryOp::SRem => b.build_int_signed_rem(lhs, rhs, &name),
                    BinaryOp::Shl => b.build_left_shift(lhs, rhs, &name),
                    BinaryOp::LShr => b.build_right_shift(lhs, rhs, false, &name),
                    BinaryOp::AShr => b.build_right_shift(lhs, rhs, true, &name),
                    BinaryOp::And => b.build_and(lhs, rhs, &name),
                    BinaryOp::Or => b.build_or(lhs, rhs, &name),
                    BinaryOp::Xor => b.build_xor(lhs, rhs, &name),
                };
                result.map_err(backend_error)
            }
            Instruction::Compare { op, lhs, rhs } => {
                let lhs = operand(fn_value, function, values, *lhs)?;
                let rhs = operand(fn_value, function, values, *rhs)?;
                self.builder
                    .build_int_compare(predicate(*op), lhs, rhs, &name)
                    .map_err(backend_error)
            }
        }
    }
}

fn operand<'ctx>(
    fn_value: FunctionValue<'ctx>,
    function: &Function,
    values: &HashMap<ValueId, IntValue<'ctx>>,
    id: ValueId,
) -> Result<IntValue<'ctx>> {
    match function.value(id).map(|data| data.def()) {
        Some(ValueDef::Argument(index)) => fn_value
            .get_nth_param(*index)
            .map(|param| param.into_int_value())
            .ok_or_else(|| {
                Error::backend(NAME, format!("missing parameter {} of `{}`", index, function.name()))
            }),
        Some(ValueDef::Inst { block, .. }) => values.get(&id).copied().ok_or_else(|| {
            Error::backend(
                NAME,
                format!(
                    "{} of `{}` is used outside the blocks dominated by {}",
                    id,
                    function.name(),
                    block
                ),
            )
        }),
        None => Err(Error::backend(
            NAME,
            format!("unknown value {} in `{}`", id, function.name()),
        )),
    }
}

fn predicate(op: CompareOp) -> IntPredicate {
    match op {
        CompareOp::Eq => IntPredicate::EQ,
        CompareOp::Ne => IntPredicate::NE,
        CompareOp::Ult => IntPredicate::ULT,
        CompareOp::Ule => IntPredicate::ULE,
        CompareOp::Ugt => IntPredicate::UGT,
        CompareOp::Uge => IntPredicate::UGE,
        CompareOp::Slt => IntPredicate::SLT,
        CompareOp::Sle => IntPredicate::SLE,
        CompareOp::Sgt => IntPredicate::SGT,
        CompareOp::Sge => IntPredicate::SGE,
    }
}
