//! The emission pipeline: verify, lower, optionally optimize and print,
//! then write the object file

use crate::{CodeGen, CompileOptions, CraneliftBackend};
use pcb_error::{Error, Result};
use pcb_ir::Context;
use std::fs;
use std::path::Path;
use tracing::{info, info_span};

/// Summary of a successful emission
#[derive(Debug, Clone)]
pub struct EmitReport {
    /// Name of the backend that produced the object
    pub backend: &'static str,
    /// Bytes written to the output path
    pub object_size: usize,
    /// Lowered IR text, when it was requested
    pub lowered_ir: Option<String>,
}

/// Emits `ctx` as an object file at `output` with the Cranelift backend
///
/// The context is consumed whether emission succeeds or not. When
/// `print_lowered_ir` is set the lowered IR is written to stderr and also
/// returned in the report.
pub fn build_and_write(
    ctx: Context,
    output: impl AsRef<Path>,
    print_lowered_ir: bool,
) -> Result<EmitReport> {
    build_and_write_with(&CraneliftBackend::new(), ctx, output, print_lowered_ir)
}

/// Same as [`build_and_write`] with an explicit backend
pub fn build_and_write_with<B: CodeGen + ?Sized>(
    backend: &B,
    ctx: Context,
    output: impl AsRef<Path>,
    print_lowered_ir: bool,
) -> Result<EmitReport> {
    let output = output.as_ref();
    let span = info_span!("emit", backend = backend.name(), output = %output.display());
    let _enter = span.enter();

    ctx.verify()?;

    let options = CompileOptions {
        module_name: module_name(output),
        optimize: ctx.optimize(),
        capture_lowered_ir: print_lowered_ir,
    };
    let artifact = backend.generate(&ctx, &options)?;
    drop(ctx);

    if let Some(ir) = &artifact.lowered_ir {
        eprint!("{}", ir);
    }

    fs::write(output, &artifact.object).map_err(|source| Error::Io {
        path: output.to_path_buf(),
        source,
    })?;
    info!(bytes = artifact.object.len(), "wrote object file");

    Ok(EmitReport {
        backend: backend.name(),
        object_size: artifact.object.len(),
        lowered_ir: artifact.lowered_ir,
    })
}

fn module_name(output: &Path) -> String {
    output
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("pcb")
        .to_string()
}
