//! Whole-context verification run before lowering
//!
//! Termination of every block is checked across all functions before any
//! other property, so a context with an open block always reports
//! `UnterminatedBlock` first. Values that nothing consumed are reported as
//! warnings.

use crate::context::Context;
use crate::entity::{BlockId, FuncId, ValueId};
use crate::function::{Function, Terminator};
use crate::instruction::{Instruction, ValueDef};
use crate::types::Type;
use pcb_error::{Diagnostic, Diagnostics, Error, Result};
use tracing::{info, warn};

impl Context {
    /// Checks the whole context, returning the first problem found
    pub fn verify(&self) -> Result<()> {
        match self.verify_all().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every problem of the context, termination problems first
    pub fn verify_all(&self) -> Vec<Error> {
        info!(functions = self.functions().len(), "verifying context");
        let mut errors = Vec::new();

        for function in self.functions().iter() {
            for (id, block) in function.blocks().iter_enumerated() {
                if !block.is_terminated() {
                    errors.push(Error::UnterminatedBlock {
                        function: function.name().to_string(),
                        block: id.as_u32(),
                    });
                }
            }
        }

        for function in self.functions().iter() {
            if function.blocks().is_empty() {
                errors.push(Error::EmptyFunction {
                    function: function.name().to_string(),
                });
                continue;
            }
            check_function(self, function, &mut errors);
        }

        for err in &errors {
            warn!(code = %err.code(), "{}", err);
        }
        for function in self.functions().iter() {
            for id in unused_values(function) {
                warn!(
                    function = function.name(),
                    value = %function.operand_name(id),
                    "value is never used"
                );
            }
        }
        errors
    }

    /// Verification problems as renderable diagnostics, followed by a
    /// warning for every value that was never consumed
    pub fn diagnostics(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(self.verify_all().iter().map(Diagnostic::from));
        for function in self.functions().iter() {
            for id in unused_values(function) {
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "value {} of `{}` is never used",
                        function.operand_name(id),
                        function.name()
                    ))
                    .with_help("pass it to an instruction or terminator, or drop it with `Context::discard`"),
                );
            }
        }
        diagnostics
    }
}

fn unused_values(function: &Function) -> impl Iterator<Item = ValueId> + '_ {
    function
        .values()
        .iter_enumerated()
        .filter(|(_, data)| !data.is_consumed())
        .map(|(id, _)| id)
}

fn mismatch(site: String, expected: Type, found: Type) -> Error {
    Error::TypeMismatch {
        site,
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn check_function(ctx: &Context, function: &Function, errors: &mut Vec<Error>) {
    let name = function.name();
    let ty_of = |id| function.value(id).map(|data| data.ty());

    for (block_id, block) in function.blocks().iter_enumerated() {
        for &id in block.instructions() {
            let Some(data) = function.value(id) else {
                continue;
            };
            let ValueDef::Inst { inst, .. } = data.def() else {
                continue;
            };
            match inst {
                Instruction::Const { value } => {
                    if !data.ty().fits(*value) {
                        errors.push(Error::ConstantOverflow {
                            value: *value,
                            width: data.ty().width(),
                        });
                    }
                }
                Instruction::Call { callee, args } => {
                    check_call(ctx, *callee, args.iter().map(|&arg| ty_of(arg)), errors);
                }
                Instruction::Binary { op, lhs, rhs } => {
                    if let (Some(lhs_ty), Some(rhs_ty)) = (ty_of(*lhs), ty_of(*rhs)) {
                        if lhs_ty != rhs_ty || lhs_ty != data.ty() {
                            errors.push(mismatch(format!("`{}` operands", op), lhs_ty, rhs_ty));
                        }
                    }
                    let divisor = function.value(*rhs).and_then(|rhs| rhs.as_const());
                    if op.is_division() && divisor == Some(0) {
                        errors.push(Error::DivisionByZero {
                            function: name.to_string(),
                            block: block_id.as_u32(),
                        });
                    }
                }
                Instruction::Compare { op, lhs, rhs } => {
                    if let (Some(lhs_ty), Some(rhs_ty)) = (ty_of(*lhs), ty_of(*rhs)) {
                        if lhs_ty != rhs_ty {
                            errors.push(mismatch(format!("`icmp {}` operands", op), lhs_ty, rhs_ty));
                        }
                    }
                }
            }
        }

        match block.terminator() {
            Some(Terminator::Return(value)) => {
                let output = function.signature().output();
                if let Some(ty) = ty_of(*value) {
                    if ty != output {
                        errors.push(mismatch("return value".to_string(), output, ty));
                    }
                }
            }
            Some(Terminator::CondBranch { cond, .. }) => {
                if let Some(ty) = ty_of(*cond) {
                    if !ty.is_bool() {
                        errors.push(Error::TypeMismatch {
                            site: "branch condition".to_string(),
                            expected: "i1".to_string(),
                            found: ty.to_string(),
                        });
                    }
                }
            }
            Some(Terminator::Branch(_)) | None => {}
        }

        if let Some(terminator) = block.terminator() {
            for target in terminator.successors() {
                check_target(function, target, errors);
            }
        }
    }
}

fn check_call(
    ctx: &Context,
    callee: FuncId,
    arg_types: impl ExactSizeIterator<Item = Option<Type>>,
    errors: &mut Vec<Error>,
) {
    let Some(target) = ctx.functions().get(callee) else {
        errors.push(Error::ForeignHandle { handle: "function" });
        return;
    };
    let signature = target.signature();
    if arg_types.len() != signature.arity() {
        errors.push(Error::ArityMismatch {
            callee: target.name().to_string(),
            expected: signature.arity(),
            found: arg_types.len(),
        });
        return;
    }
    for (i, (found, &expected)) in arg_types.zip(signature.inputs()).enumerate() {
        if let Some(found) = found {
            if found != expected {
                errors.push(mismatch(
                    format!("argument {} of call to `{}`", i, target.name()),
                    expected,
                    found,
                ));
            }
        }
    }
}

fn check_target(function: &Function, target: BlockId, errors: &mut Vec<Error>) {
    if function.block(target).is_none() {
        errors.push(Error::InvalidBranchTarget {
            function: function.name().to_string(),
            target: target.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FunctionSignature;
    use pcb_error::DiagnosticRenderer;

    #[test]
    fn test_valid_context() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("main", FunctionSignature::new(vec![], int32))
            .unwrap();
        let block = ctx.append_block(func).unwrap();
        let zero = ctx.build_const(block, int32, 0).unwrap();
        ctx.set_terminator_return(block, zero).unwrap();

        assert!(ctx.verify().is_ok());
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_unterminated_reported_first() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        ctx.add_function("empty", FunctionSignature::new(vec![], int32))
            .unwrap();
        let open = ctx
            .add_function("open", FunctionSignature::new(vec![], int32))
            .unwrap();
        ctx.append_block(open).unwrap();

        let errors = ctx.verify_all();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            Error::UnterminatedBlock { function, block: 0 } if function == "open"
        ));
        assert!(matches!(&errors[1], Error::EmptyFunction { function } if function == "empty"));
        assert!(matches!(ctx.verify(), Err(Error::UnterminatedBlock { .. })));
    }

    #[test]
    fn test_division_by_constant_zero() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("div", FunctionSignature::new(vec![int32], int32))
            .unwrap();
        let block = ctx.append_block(func).unwrap();
        let x = ctx.get_argument(func, 0).unwrap();
        let zero = ctx.build_const(block, int32, 0).unwrap();
        let quotient = ctx.build_sdiv(block, x, zero).unwrap();
        ctx.set_terminator_return(block, quotient).unwrap();

        let err = ctx.verify().unwrap_err();
        assert!(matches!(err, Error::DivisionByZero { block: 0, .. }));
    }

    #[test]
    fn test_nonzero_divisor_accepted() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("rem", FunctionSignature::new(vec![int32], int32))
            .unwrap();
        let block = ctx.append_block(func).unwrap();
        let x = ctx.get_argument(func, 0).unwrap();
        let seven = ctx.build_const(block, int32, 7).unwrap();
        let rest = ctx.build_urem(block, x, seven).unwrap();
        ctx.set_terminator_return(block, rest).unwrap();

        assert!(ctx.verify().is_ok());
    }

    #[test]
    fn test_diagnostics_rendering() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("main", FunctionSignature::new(vec![], int32))
            .unwrap();
        ctx.append_block(func).unwrap();

        let diagnostics = ctx.diagnostics();
        assert!(diagnostics.has_errors());
        let output = diagnostics.render(&DiagnosticRenderer::new().without_colors());
        assert!(output.starts_with("error[ES003]: block bb0 of `main` has no terminator"));
    }

    #[test]
    fn test_unused_values_warned() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("main", FunctionSignature::new(vec![int32], int32))
            .unwrap();
        let block = ctx.append_block(func).unwrap();
        let _forgotten = ctx.build_const(block, int32, 7).unwrap();
        let dropped = ctx.build_const(block, int32, 8).unwrap();
        ctx.discard(dropped).unwrap();
        let x = ctx.get_argument(func, 0).unwrap();
        ctx.set_terminator_return(block, x).unwrap();

        assert!(ctx.verify().is_ok());
        let diagnostics = ctx.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics.has_errors());
        let output = diagnostics.render(&DiagnosticRenderer::new().without_colors());
        assert!(output.starts_with("warning: value %0 of `main` is never used"), "{}", output);
    }
}
