//! Sample programs bundled with the CLI

use clap::ValueEnum;
use pcb_error::Result;
use pcb_ir::{CompareOp, Context, FunctionSignature};

/// Program to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Program {
    /// `main` returns the constant 0
    ReturnZero,
    /// `main` branches to a second block that calls `foo` and returns its result
    Call,
    /// `main` returns `foo(5)` where `foo(x) = x + x`
    Arguments,
    /// Integer arithmetic on i64 through a helper function
    Arithmetic,
    /// `max(a, b)` through a comparison and a conditional branch
    Branch,
}

impl Program {
    /// Default object file name
    pub fn file_stem(&self) -> &'static str {
        match self {
            Program::ReturnZero => "return_zero",
            Program::Call => "call",
            Program::Arguments => "arguments",
            Program::Arithmetic => "arithmetic",
            Program::Branch => "branch",
        }
    }

    pub fn build(self, optimize: bool) -> Result<Context> {
        let mut ctx = Context::new(optimize);
        match self {
            Program::ReturnZero => return_zero(&mut ctx)?,
            Program::Call => call(&mut ctx)?,
            Program::Arguments => arguments(&mut ctx)?,
            Program::Arithmetic => arithmetic(&mut ctx)?,
            Program::Branch => branch(&mut ctx)?,
        }
        Ok(ctx)
    }
}

fn return_zero(ctx: &mut Context) -> Result<()> {
    let int32 = ctx.int_type(32)?;
    let main = ctx.add_function("main", FunctionSignature::new(vec![], int32))?;
    let entry = ctx.append_block(main)?;
    let zero = ctx.build_const(entry, int32, 0)?;
    ctx.set_terminator_return(entry, zero)
}

fn call(ctx: &mut Context) -> Result<()> {
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
    ctx.set_terminator_return(body, result)
}

fn arguments(ctx: &mut Context) -> Result<()> {
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
    ctx.set_terminator_return(entry, result)
}

/// poly(x) = ((x * x + 3) srem 7) ^ ((x & 0xff) << 2)
fn arithmetic(ctx: &mut Context) -> Result<()> {
    let int64 = ctx.int_type(64)?;
    let poly = ctx.add_function("poly", FunctionSignature::new(vec![int64], int64))?;
    let main = ctx.add_function("main", FunctionSignature::new(vec![], int64))?;

    let block = ctx.append_block(poly)?;
    let x = ctx.get_argument(poly, 0)?;
    let y = ctx.get_argument(poly, 0)?;
    let square = ctx.build_mul(block, x, y)?;
    let three = ctx.build_const(block, int64, 3)?;
    let sum = ctx.build_add(block, square, three)?;
    let seven = ctx.build_const(block, int64, 7)?;
    let rem = ctx.build_srem(block, sum, seven)?;

    let x = ctx.get_argument(poly, 0)?;
    let mask = ctx.build_const(block, int64, 0xff)?;
    let low = ctx.build_and(block, x, mask)?;
    let two = ctx.build_const(block, int64, 2)?;
    let shifted = ctx.build_shl(block, low, two)?;
    let mixed = ctx.build_xor(block, rem, shifted)?;
    ctx.set_terminator_return(block, mixed)?;

    let entry = ctx.append_block(main)?;
    let twelve = ctx.build_const(entry, int64, 12)?;
    let result = ctx.build_call(entry, poly, vec![twelve])?;
    ctx.set_terminator_return(entry, result)
}

fn branch(ctx: &mut Context) -> Result<()> {
    let int32 = ctx.int_type(32)?;
    let max = ctx.add_function("max", FunctionSignature::new(vec![int32, int32], int32))?;
    let main = ctx.add_function("main", FunctionSignature::new(vec![], int32))?;

    let entry = ctx.append_block(max)?;
    let left = ctx.append_block(max)?;
    let right = ctx.append_block(max)?;
    let a = ctx.get_argument(max, 0)?;
    let b = ctx.get_argument(max, 1)?;
    let greater = ctx.build_compare(entry, CompareOp::Sgt, a, b)?;
    ctx.set_terminator_cond_branch(entry, greater, left, right)?;
    let a = ctx.get_argument(max, 0)?;
    ctx.set_terminator_return(left, a)?;
    let b = ctx.get_argument(max, 1)?;
    ctx.set_terminator_return(right, b)?;

    let entry = ctx.append_block(main)?;
    let three = ctx.build_const(entry, int32, 3)?;
    let nine = ctx.build_const(entry, int32, 9)?;
    let result = ctx.build_call(entry, max, vec![three, nine])?;
    ctx.set_terminator_return(entry, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_samples_verify() {
        for program in Program::value_variants() {
            let ctx = program.build(false).unwrap();
            assert!(ctx.verify().is_ok(), "{:?}", program);
        }
    }

    #[test]
    fn test_call_sample_ir() {
        let ctx = Program::Call.build(false).unwrap();
        assert_eq!(
            ctx.to_string(),
            "define i32 @foo() {\n\
             bb0:\n\
             \x20 %0 = const i32 0\n\
             \x20 ret %0\n\
             }\n\
             \n\
             define i32 @main() {\n\
             bb0:\n\
             \x20 br bb1\n\
             bb1:\n\
             \x20 %0 = call i32 @foo()\n\
             \x20 ret %0\n\
             }\n"
        );
    }

    #[test]
    fn test_branch_sample_ir() {
        let ir = Program::Branch.build(false).unwrap().to_string();
        assert!(ir.contains("%2 = icmp sgt i32 %arg0, %arg1"));
        assert!(ir.contains("br %2, bb1, bb2"));
        assert!(ir.contains("%2 = call i32 @max(%0, %1)"));
    }
}
