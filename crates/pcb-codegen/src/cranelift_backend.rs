//! Cranelift backend
//!
//! Every IR function becomes one exported Cranelift function. A prologue
//! block receives the ABI parameters and jumps to IR block 0, so the entry
//! block can also be a branch target. IR blocks keep their index order in
//! the layout. `i1` values live in `I8` registers holding 0 or 1.

use crate::layout::lowering_order;
use crate::{Artifact, CodeGen, CompileOptions};
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{
    types, AbiParam, Block as ClifBlock, FuncRef, InstBuilder, Signature, Type as ClifType,
    UserFuncName, Value as ClifValue,
};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId as ClifFuncId, Linkage, Module};
use cranelift_object::{ObjectBuilder, ObjectModule};
use pcb_error::{Error, Result};
use pcb_ir::{
    BinaryOp, BlockId, CompareOp, Context, EntityVec, FuncId, Function, Instruction, Terminator,
    Type, ValueDef, ValueId,
};
use std::collections::HashMap;
use tracing::{debug, info};

const NAME: &str = "cranelift";

fn backend_error(err: impl std::fmt::Display) -> Error {
    Error::backend(NAME, err.to_string())
}

/// Cranelift code generator targeting the host
#[derive(Debug, Clone, Copy, Default)]
pub struct CraneliftBackend;

impl CraneliftBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGen for CraneliftBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn generate(&self, ctx: &Context, options: &CompileOptions) -> Result<Artifact> {
        let isa = build_native_isa(options.optimize)?;
        info!(
            target_triple = %isa.triple(),
            optimize = options.optimize,
            "lowering with cranelift"
        );

        let builder = ObjectBuilder::new(
            isa,
            options.module_name.as_str(),
            cranelift_module::default_libcall_names(),
        )
        .map_err(backend_error)?;
        let mut module = ObjectModule::new(builder);

        // Declare all functions first (for forward references)
        let functions = ctx.functions();
        let mut ids: EntityVec<FuncId, ClifFuncId> = EntityVec::new();
        for function in functions.iter() {
            let signature = make_signature(&module, function)?;
            let id = module
                .declare_function(function.name(), Linkage::Export, &signature)
                .map_err(backend_error)?;
            ids.push(id);
        }

        let mut lowered_ir = options.capture_lowered_ir.then(String::new);
        let mut clif_ctx = module.make_context();
        let mut builder_ctx = FunctionBuilderContext::new();

        for (func_id, function) in functions.iter_enumerated() {
            clif_ctx.func.signature = make_signature(&module, function)?;
            clif_ctx.func.name = UserFuncName::user(0, func_id.as_u32());

            FunctionLowering {
                module: &mut module,
                ids: &ids,
                function,
                builder: FunctionBuilder::new(&mut clif_ctx.func, &mut builder_ctx),
                blocks: EntityVec::new(),
                params: Vec::new(),
                values: HashMap::new(),
                func_refs: HashMap::new(),
            }
            .lower()?;

            module
                .define_function(ids[func_id], &mut clif_ctx)
                .map_err(|err| {
                    Error::backend(NAME, format!("failed to define `{}`: {}", function.name(), err))
                })?;
            debug!(function = function.name(), "defined function");

            if let Some(text) = lowered_ir.as_mut() {
                text.push_str(&format!("; {}\n{}\n", function.name(), clif_ctx.func.display()));
            }
            module.clear_context(&mut clif_ctx);
        }

        let product = module.finish();
        let object = product.emit().map_err(|err| {
            Error::backend(NAME, format!("failed to emit object bytes: {}", err))
        })?;
        Ok(Artifact { object, lowered_ir })
    }
}

fn build_native_isa(optimize: bool) -> Result<OwnedTargetIsa> {
    let mut flags = settings::builder();
    flags
        .set("opt_level", if optimize { "speed" } else { "none" })
        .map_err(backend_error)?;
    flags.set("is_pic", "true").map_err(backend_error)?;
    // i128 parameters and returns
    flags
        .set("enable_llvm_abi_extensions", "true")
        .map_err(backend_error)?;

    let isa_builder = cranelift_native::builder()
        .map_err(|msg| Error::backend(NAME, format!("host ISA not supported: {}", msg)))?;
    isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(backend_error)
}

fn clif_type(ty: Type) -> Result<ClifType> {
    match ty.width() {
        1 | 8 => Ok(types::I8),
        16 => Ok(types::I16),
        32 => Ok(types::I32),
        64 => Ok(types::I64),
        128 => Ok(types::I128),
        width => Err(Error::backend(
            NAME,
            format!("integer width {} is not supported", width),
        )),
    }
}

fn make_signature(module: &ObjectModule, function: &Function) -> Result<Signature> {
    let mut signature = module.make_signature();
    for &input in function.signature().inputs() {
        signature.params.push(AbiParam::new(clif_type(input)?));
    }
    signature
        .returns
        .push(AbiParam::new(clif_type(function.signature().output())?));
    Ok(signature)
}

fn int_cc(op: CompareOp) -> IntCC {
    match op {
        CompareOp::Eq => IntCC::Equal,
        CompareOp::Ne => IntCC::NotEqual,
        CompareOp::Ult => IntCC::UnsignedLessThan,
        CompareOp::Ule => IntCC::UnsignedLessThanOrEqual,
        CompareOp::Ugt => IntCC::UnsignedGreaterThan,
        CompareOp::Uge => IntCC::UnsignedGreaterThanOrEqual,
        CompareOp::Slt => IntCC::SignedLessThan,
        CompareOp::Sle => IntCC::SignedLessThanOrEqual,
        CompareOp::Sgt => IntCC::SignedGreaterThan,
        CompareOp::Sge => IntCC::SignedGreaterThanOrEqual,
    }
}

fn is_signed_compare(op: CompareOp) -> bool {
    matches!(
        op,
        CompareOp::Slt | CompareOp::Sle | CompareOp::Sgt | CompareOp::Sge
    )
}

/// Lowering state of one function
struct FunctionLowering<'a, 'b> {
    module: &'a mut ObjectModule,
    ids: &'a EntityVec<FuncId, ClifFuncId>,
    function: &'a Function,
    builder: FunctionBuilder<'b>,
    blocks: EntityVec<BlockId, ClifBlock>,
    params: Vec<ClifValue>,
    values: HashMap<ValueId, ClifValue>,
    func_refs: HashMap<FuncId, FuncRef>,
}

impl FunctionLowering<'_, '_> {
    fn lower(mut self) -> Result<()> {
        let function = self.function;
        let entry = function.entry().ok_or_else(|| Error::EmptyFunction {
            function: function.name().to_string(),
        })?;

        let prologue = self.builder.create_block();
        self.builder.append_block_params_for_function_params(prologue);
        for _ in function.blocks().iter() {
            let block = self.builder.create_block();
            self.blocks.push(block);
        }

        self.builder.switch_to_block(prologue);
        self.params = self.builder.block_params(prologue).to_vec();
        let entry_block = self.clif_block(entry)?;
        self.builder.ins().jump(entry_block, &[]);

        // Layout follows IR block order; instructions are lowered in RPO
        let mut previous = prologue;
        for &block in self.blocks.iter() {
            self.builder.insert_block_after(block, previous);
            previous = block;
        }

        for block_id in lowering_order(function) {
            let clif_block = self.clif_block(block_id)?;
            self.builder.switch_to_block(clif_block);

            let block = &function.blocks()[block_id];
            for &value in block.instructions() {
                self.lower_instruction(value)?;
            }

            match block.terminator() {
                Some(Terminator::Branch(target)) => {
                    let target = self.clif_block(*target)?;
                    self.builder.ins().jump(target, &[]);
                }
                Some(Terminator::CondBranch {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    let cond = self.operand(*cond)?;
                    let then_block = self.clif_block(*then_block)?;
                    let else_block = self.clif_block(*else_block)?;
                    self.builder
                        .ins()
                        .brif(cond, then_block, &[], else_block, &[]);
                }
                Some(Terminator::Return(value)) => {
                    let value = self.operand(*value)?;
                    self.builder.ins().return_(&[value]);
                }
                None => {
                    return Err(Error::UnterminatedBlock {
                        function: function.name().to_string(),
                        block: block_id.as_u32(),
                    })
                }
            }
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn clif_block(&self, id: BlockId) -> Result<ClifBlock> {
        self.blocks.get(id).copied().ok_or_else(|| Error::InvalidBranchTarget {
            function: self.function.name().to_string(),
            target: id.to_string(),
        })
    }

    fn operand(&self, id: ValueId) -> Result<ClifValue> {
        let function = self.function;
        match function.value(id).map(|data| data.def()) {
            Some(ValueDef::Argument(index)) => {
                self.params.get(*index as usize).copied().ok_or_else(|| {
                    Error::backend(NAME, format!("missing parameter {} of `{}`", index, function.name()))
                })
            }
            Some(ValueDef::Inst { block, .. }) => self.values.get(&id).copied().ok_or_else(|| {
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

    fn func_ref(&mut self, callee: FuncId) -> Result<FuncRef> {
        if let Some(func_ref) = self.func_refs.get(&callee) {
            return Ok(*func_ref);
        }
        let id = *self
            .ids
            .get(callee)
            .ok_or(Error::ForeignHandle { handle: "function" })?;
        let func_ref = self.module.declare_func_in_func(id, self.builder.func);
        self.func_refs.insert(callee, func_ref);
        Ok(func_ref)
    }

    fn lower_instruction(&mut self, id: ValueId) -> Result<()> {
        let function = self.function;
        let Some(data) = function.value(id) else {
            return Err(Error::backend(NAME, format!("unknown value {}", id)));
        };
        let ValueDef::Inst { inst, .. } = data.def() else {
            return Ok(());
        };

        let result = match inst {
            Instruction::Const { value } => self.constant(data.ty(), *value)?,
            Instruction::Call { callee, args } => {
                let func_ref = self.func_ref(*callee)?;
                let args = args
                    .iter()
                    .map(|&arg| self.operand(arg))
                    .collect::<Result<Vec<_>>>()?;
                let call = self.builder.ins().call(func_ref, &args);
                *self
                    .builder
                    .inst_results(call)
                    .first()
                    .ok_or_else(|| Error::backend(NAME, "call produced no result"))?
            }
            Instruction::Binary { op, lhs, rhs } => self.binary(*op, data.ty(), *lhs, *rhs)?,
            Instruction::Compare { op, lhs, rhs } => {
                let narrow = function.value(*lhs).is_some_and(|lhs| lhs.ty().is_bool());
                let mut lhs = self.operand(*lhs)?;
                let mut rhs = self.operand(*rhs)?;
                if narrow && is_signed_compare(*op) {
                    // 0/1 become 0/-1
                    lhs = self.builder.ins().ineg(lhs);
                    rhs = self.builder.ins().ineg(rhs);
                }
                self.builder.ins().icmp(int_cc(*op), lhs, rhs)
            }
        };

        self.values.insert(id, result);
        Ok(())
    }

    fn constant(&mut self, ty: Type, value: u64) -> Result<ClifValue> {
        let clif_ty = clif_type(ty)?;
        if clif_ty == types::I128 {
            let low = self.builder.ins().iconst(types::I64, value as i64);
            return Ok(self.builder.ins().uextend(types::I128, low));
        }
        Ok(self.builder.ins().iconst(clif_ty, value as i64))
    }

    fn binary(&mut self, op: BinaryOp, ty: Type, lhs: ValueId, rhs: ValueId) -> Result<ClifValue> {
        let narrow = ty.is_bool();
        let mut lhs = self.operand(lhs)?;
        let mut rhs = self.operand(rhs)?;
        if narrow && matches!(op, BinaryOp::SDiv | BinaryOp::SRem | BinaryOp::AShr) {
            lhs = self.builder.ins().ineg(lhs);
            if op != BinaryOp::AShr {
                rhs = self.builder.ins().ineg(rhs);
            }
        }

        let ins = self.builder.ins();
        let result = match op {
            BinaryOp::Add => ins.iadd(lhs, rhs),
            BinaryOp::Sub => ins.isub(lhs, rhs),
            BinaryOp::Mul => ins.imul(lhs, rhs),
            BinaryOp::UDiv => ins.udiv(lhs, rhs),
            BinaryOp::SDiv => ins.sdiv(lhs, rhs),
            BinaryOp::URem => ins.urem(lhs, rhs),
            BinaryOp::SRem => ins.srem(lhs, rhs),
            BinaryOp::Shl => ins.ishl(lhs, rhs),
            BinaryOp::LShr => ins.ushr(lhs, rhs),
            BinaryOp::AShr => ins.sshr(lhs, rhs),
            BinaryOp::And => ins.band(lhs, rhs),
            BinaryOp::Or => ins.bor(lhs, rhs),
            BinaryOp::Xor => ins.bxor(lhs, rhs),
        };

        if narrow {
            return Ok(self.builder.ins().band_imm(result, 1));
        }
        Ok(result)
    }
}
