//! Integration tests for the pcb compiler backend
//!
//! This crate provides end-to-end testing of the complete pipeline:
//! Construction API → Verify → Lowering → Object file

use pcb_error::{Error, Result};
use pcb_ir::{Context, FunctionSignature};

/// `foo() -> i32` returning 0, and `main() -> i32` whose entry block
/// branches to a second block that calls `foo` and returns its result
pub fn round_trip_program(optimize: bool) -> Result<Context> {
    let mut ctx = Context::new(optimize);
    let int32 = ctx.int_type(32)?;
    let signature = FunctionSignature::new(vec![], int32);
    let foo = ctx.add_function("foo", signature.duplicate())?;
    let main = ctx.add_function("main", signature)?;

    let foo_entry = ctx.append_block(foo)?;
    let zero = ctx.build_const(foo_entry, int32, 0)?;
    ctx.set_terminator_return(foo_entry, zero)?;

    let entry = ctx.append_block(main)?;
    let body = ctx.append_block(main)?;
    ctx.set_terminator_branch(entry, body)?;
    let result = ctx.build_call(body, foo, vec![])?;
    ctx.set_terminator_return(body, result)?;
    Ok(ctx)
}

/// `foo(x: i32) -> i32` returning `x + x`, and `main() -> i32` returning `foo(5)`
pub fn argument_program(optimize: bool) -> Result<Context> {
    let mut ctx = Context::new(optimize);
    let int32 = ctx.int_type(32)?;
    let foo = ctx.add_function("foo", FunctionSignature::new(vec![int32], int32))?;
    let main = ctx.add_function("main", FunctionSignature::new(vec![], int32))?;

    let block = ctx.append_block(foo)?;
    let x = ctx.get_argument(foo, 0)?;
    let y = ctx.get_argument(foo, 0)?;
    let sum = ctx.build_add(block, x, y)?;
    ctx.set_terminator_return(block, sum)?;

    let entry = ctx.append_block(main)?;
    let five = ctx.build_const(entry, int32, 5)?;
    let result = ctx.build_call(entry, foo, vec![five])?;
    ctx.set_terminator_return(entry, result)?;
    Ok(ctx)
}

/// The lowered IR of one function, as captured by the Cranelift backend
pub fn lowered_function<'a>(lowered_ir: &'a str, name: &str) -> Option<&'a str> {
    let header = format!("; {}\n", name);
    let start = lowered_ir.find(&header)? + header.len();
    let rest = &lowered_ir[start..];
    let end = rest.find("\n; ").map(|i| i + 1).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Argument counts of every call instruction in lowered IR text
pub fn call_arities(lowered_ir: &str) -> Vec<usize> {
    lowered_ir
        .lines()
        .filter_map(|line| {
            let call = &line[line.find("= call ")?..];
            let open = call.find('(')?;
            let close = call.rfind(')')?;
            let args = &call[open + 1..close];
            Some(args.split(',').filter(|arg| !arg.trim().is_empty()).count())
        })
        .collect()
}

/// Asserts that a context verifies cleanly
pub fn assert_verifies(ctx: &Context) {
    if let Err(err) = ctx.verify() {
        panic!(
            "Expected context to verify, but got: {}\n\nIR:\n{}",
            err, ctx
        );
    }
}

/// Asserts that an operation failed with the expected error
pub fn assert_error<T: std::fmt::Debug>(result: Result<T>, expected: fn(&Error) -> bool) {
    match result {
        Ok(value) => panic!("Expected an error, but got {:?}", value),
        Err(err) if expected(&err) => {}
        Err(err) => panic!("Unexpected error: {} ({:?})", err, err),
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use pcb_codegen::{build_and_write, EmitReport};
    use pcb_error::{DiagnosticRenderer, ErrorKind};
    use pcb_ir::{BlockRef, CompareOp, FunctionRef, Type};

    fn emit(ctx: Context, print_lowered_ir: bool) -> (Result<EmitReport>, Vec<u8>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.o");
        let result = build_and_write(ctx, &path, print_lowered_ir);
        let bytes = std::fs::read(&path).unwrap_or_default();
        (result, bytes)
    }

    fn nullary(ctx: &mut Context, name: &str, ty: Type) -> FunctionRef {
        ctx.add_function(name, FunctionSignature::new(vec![], ty))
            .unwrap()
    }

    fn return_const(ctx: &mut Context, block: BlockRef, ty: Type, value: u64) {
        let constant = ctx.build_const(block, ty, value).unwrap();
        ctx.set_terminator_return(block, constant).unwrap();
    }

    // =========================================
    // End-to-end emission
    // =========================================

    #[test]
    fn test_round_trip() {
        let ctx = round_trip_program(false).unwrap();
        assert_verifies(&ctx);

        let (result, bytes) = emit(ctx, false);
        let report = result.unwrap();
        assert!(report.object_size > 0);
        assert_eq!(bytes.len(), report.object_size);
        assert!(report.lowered_ir.is_none());
    }

    #[test]
    fn test_round_trip_optimized() {
        let (result, bytes) = emit(round_trip_program(true).unwrap(), false);
        result.unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_argument_plumbing() {
        let ctx = argument_program(false).unwrap();
        assert_verifies(&ctx);

        let (result, _) = emit(ctx, true);
        let lowered_ir = result.unwrap().lowered_ir.unwrap();

        let main = lowered_function(&lowered_ir, "main").unwrap();
        assert_eq!(call_arities(main), vec![1]);
        assert!(main.contains("(i32) -> i32"), "{}", main);

        let foo = lowered_function(&lowered_ir, "foo").unwrap();
        assert!(foo.contains("iadd"), "{}", foo);
        assert!(call_arities(foo).is_empty());
    }

    #[test]
    fn test_all_operators_emit() {
        let mut ctx = Context::new(false);
        let int64 = ctx.int_type(64).unwrap();
        let func = ctx
            .add_function("ops", FunctionSignature::new(vec![int64, int64], int64))
            .unwrap();
        let block = ctx.append_block(func).unwrap();

        let mut acc = ctx.get_argument(func, 0).unwrap();
        for op in pcb_ir::BinaryOp::ALL {
            let rhs = if op.is_division() {
                ctx.build_const(block, int64, 3).unwrap()
            } else {
                ctx.get_argument(func, 1).unwrap()
            };
            acc = ctx.build_binary(block, op, acc, rhs).unwrap();
        }
        ctx.set_terminator_return(block, acc).unwrap();

        let (result, bytes) = emit(ctx, false);
        result.unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_compare_and_branch_emit() {
        let mut ctx = Context::new(true);
        let int8 = ctx.int_type(8).unwrap();
        let func = ctx
            .add_function("clamp", FunctionSignature::new(vec![int8], int8))
            .unwrap();
        let entry = ctx.append_block(func).unwrap();
        let high = ctx.append_block(func).unwrap();
        let low = ctx.append_block(func).unwrap();

        let x = ctx.get_argument(func, 0).unwrap();
        let limit = ctx.build_const(entry, int8, 100).unwrap();
        let above = ctx.build_compare(entry, CompareOp::Ugt, x, limit).unwrap();
        ctx.set_terminator_cond_branch(entry, above, high, low).unwrap();
        return_const(&mut ctx, high, int8, 100);
        let x = ctx.get_argument(func, 0).unwrap();
        ctx.set_terminator_return(low, x).unwrap();

        let (result, _) = emit(ctx, false);
        result.unwrap();
    }

    #[test]
    fn test_wide_return_emits() {
        let mut ctx = Context::new(false);
        let int128 = ctx.int_type(128).unwrap();
        let func = nullary(&mut ctx, "wide", int128);
        let block = ctx.append_block(func).unwrap();
        return_const(&mut ctx, block, int128, 1);

        let (result, bytes) = emit(ctx, false);
        result.unwrap();
        assert!(!bytes.is_empty());
    }

    // =========================================
    // Construction properties
    // =========================================

    #[test]
    fn test_type_interning() {
        let mut ctx = Context::new(false);
        for width in 1..=256 {
            let first = ctx.int_type(width).unwrap();
            let second = ctx.int_type(width).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.width(), width);
        }
        assert_ne!(ctx.int_type(16).unwrap(), ctx.int_type(17).unwrap());
        assert_eq!(ctx.type_count(), 256);
    }

    #[test]
    fn test_termination_is_final() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = nullary(&mut ctx, "f", int32);
        let blocks: Vec<_> = (0..3).map(|_| ctx.append_block(func).unwrap()).collect();

        ctx.set_terminator_branch(blocks[0], blocks[1]).unwrap();
        return_const(&mut ctx, blocks[1], int32, 1);
        let cond = ctx.bool_type();
        let flag = ctx.build_const(blocks[2], cond, 1).unwrap();
        ctx.set_terminator_cond_branch(blocks[2], flag, blocks[0], blocks[1])
            .unwrap();

        for &block in &blocks {
            assert!(ctx.is_terminated(block).unwrap());
            assert_error(ctx.set_terminator_branch(block, blocks[0]), |e| {
                matches!(e, Error::BlockAlreadyTerminated { .. })
            });
            assert_error(ctx.build_const(block, int32, 0), |e| {
                matches!(e, Error::BlockAlreadyTerminated { .. })
            });
        }
    }

    #[test]
    fn test_type_correctness() {
        let mut ctx = Context::new(false);
        let int16 = ctx.int_type(16).unwrap();
        let int32 = ctx.int_type(32).unwrap();
        let callee = ctx
            .add_function("callee", FunctionSignature::new(vec![int32, int16], int32))
            .unwrap();
        let caller = nullary(&mut ctx, "caller", int32);
        let block = ctx.append_block(caller).unwrap();

        let a = ctx.build_const(block, int32, 1).unwrap();
        let b = ctx.build_const(block, int16, 1).unwrap();
        assert_error(ctx.build_mul(block, a, b), |e| {
            matches!(e, Error::TypeMismatch { .. })
        });

        let a = ctx.build_const(block, int32, 1).unwrap();
        assert_error(ctx.build_call(block, callee, vec![a]), |e| {
            matches!(e, Error::ArityMismatch { expected: 2, found: 1, .. })
        });

        let a = ctx.build_const(block, int32, 1).unwrap();
        let b = ctx.build_const(block, int32, 1).unwrap();
        assert_error(ctx.build_call(block, callee, vec![a, b]), |e| {
            matches!(e, Error::TypeMismatch { .. })
        });

        assert!(!ctx.is_terminated(block).unwrap());
    }

    #[test]
    fn test_return_mismatch_keeps_block_open() {
        let mut ctx = Context::new(false);
        let int8 = ctx.int_type(8).unwrap();
        let int32 = ctx.int_type(32).unwrap();
        let main = nullary(&mut ctx, "main", int32);
        let entry = ctx.append_block(main).unwrap();

        let narrow = ctx.build_const(entry, int8, 7).unwrap();
        let err = ctx.set_terminator_return(entry, narrow).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(!ctx.is_terminated(entry).unwrap());

        // The block still accepts instructions and a valid terminator
        return_const(&mut ctx, entry, int32, 7);
        let (result, _) = emit(ctx, false);
        result.unwrap();
    }

    #[test]
    fn test_argument_out_of_range() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("one", FunctionSignature::new(vec![int32], int32))
            .unwrap();
        assert_error(ctx.get_argument(func, 3), |e| {
            matches!(e, Error::IndexOutOfRange { index: 3, arity: 1 })
        });
    }

    // =========================================
    // Verification at emission
    // =========================================

    #[test]
    fn test_unterminated_iff_open_block() {
        for mask in 0u8..8 {
            let mut ctx = Context::new(false);
            let int32 = ctx.int_type(32).unwrap();
            let func = nullary(&mut ctx, "main", int32);
            let blocks: Vec<_> = (0..3).map(|_| ctx.append_block(func).unwrap()).collect();
            for (i, &block) in blocks.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    return_const(&mut ctx, block, int32, i as u64);
                }
            }

            let (result, bytes) = emit(ctx, false);
            if mask == 0b111 {
                result.unwrap();
                assert!(!bytes.is_empty());
            } else {
                assert_error(result, |e| matches!(e, Error::UnterminatedBlock { .. }));
                assert!(bytes.is_empty());
            }
        }
    }

    #[test]
    fn test_division_by_zero_rejected() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = ctx
            .add_function("div", FunctionSignature::new(vec![int32], int32))
            .unwrap();
        let block = ctx.append_block(func).unwrap();
        let x = ctx.get_argument(func, 0).unwrap();
        let zero = ctx.build_const(block, int32, 0).unwrap();
        let quotient = ctx.build_udiv(block, x, zero).unwrap();
        ctx.set_terminator_return(block, quotient).unwrap();

        let (result, _) = emit(ctx, false);
        assert_error(result, |e| matches!(e, Error::DivisionByZero { .. }));
    }

    #[test]
    fn test_empty_function_rejected() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        nullary(&mut ctx, "declared", int32);

        let (result, _) = emit(ctx, false);
        assert_error(result, |e| matches!(e, Error::EmptyFunction { .. }));
    }

    #[test]
    fn test_duplicate_names_fail_in_backend() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        for value in [1, 2] {
            let func = nullary(&mut ctx, "same", int32);
            let block = ctx.append_block(func).unwrap();
            return_const(&mut ctx, block, int32, value);
        }
        assert_verifies(&ctx);

        let (result, _) = emit(ctx, false);
        assert_error(result, |e| matches!(e, Error::BackendFailure { .. }));
    }

    #[test]
    fn test_diagnostics_for_broken_context() {
        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let func = nullary(&mut ctx, "main", int32);
        ctx.append_block(func).unwrap();
        nullary(&mut ctx, "empty", int32);

        let diagnostics = ctx.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        let output = diagnostics.render(&DiagnosticRenderer::new().without_colors());
        assert!(output.contains("error[ES003]"));
        assert!(output.contains("error[ES007]"));
        ctx.delete();
    }

    // =========================================
    // Helpers
    // =========================================

    #[test]
    fn test_call_arities() {
        let text = "block1:\n    v1 = call fn0(v0)\n    v2 = call fn1()\n    v3 = call fn2(v1, v2)\n";
        assert_eq!(call_arities(text), vec![1, 0, 2]);
    }

    #[test]
    fn test_lowered_function() {
        let text = "; foo\nfunction u0:0() {\n}\n\n; main\nfunction u0:1() {\n}\n";
        assert_eq!(lowered_function(text, "foo"), Some("function u0:0() {\n}\n\n"));
        assert_eq!(lowered_function(text, "main"), Some("function u0:1() {\n}\n"));
        assert_eq!(lowered_function(text, "missing"), None);
    }
}
