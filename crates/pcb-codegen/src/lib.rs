//! pcb-codegen - Lowering and object emission for the pcb IR
//!
//! Supports multiple backends:
//! - **Cranelift Backend**: pure Rust, always built (default)
//! - **LLVM Backend**: LLVM 17 through inkwell (requires LLVM installed)
//!
//! # Example
//!
//! ```no_run
//! use pcb_codegen::build_and_write;
//! use pcb_ir::{Context, FunctionSignature};
//!
//! let mut ctx = Context::new(true);
//! let int32 = ctx.int_type(32)?;
//! let main = ctx.add_function("main", FunctionSignature::new(vec![], int32))?;
//! let entry = ctx.append_block(main)?;
//! let zero = ctx.build_const(entry, int32, 0)?;
//! ctx.set_terminator_return(entry, zero)?;
//!
//! let report = build_and_write(ctx, "main.o", false)?;
//! assert!(report.object_size > 0);
//! # Ok::<(), pcb_error::Error>(())
//! ```

pub mod cranelift_backend;
pub mod emit;
mod layout;

#[cfg(feature = "llvm")]
pub mod llvm_backend;

pub use cranelift_backend::CraneliftBackend;
pub use emit::{build_and_write, build_and_write_with, EmitReport};

#[cfg(feature = "llvm")]
pub use llvm_backend::LlvmBackend;

use pcb_error::Result;
use pcb_ir::Context;

/// Trait for code generation backends
pub trait CodeGen {
    /// Short backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Lowers a verified context into a relocatable object
    fn generate(&self, ctx: &Context, options: &CompileOptions) -> Result<Artifact>;
}

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name recorded in the emitted module
    pub module_name: String,
    /// Run the backend's optimization pipeline
    pub optimize: bool,
    /// Keep the lowered IR text in the artifact
    pub capture_lowered_ir: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "pcb".to_string(),
            optimize: false,
            capture_lowered_ir: false,
        }
    }
}

/// Output of a backend run
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Object file bytes
    pub object: Vec<u8>,
    /// Lowered (and possibly optimized) IR text, when requested
    pub lowered_ir: Option<String>,
}
