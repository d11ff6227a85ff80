//! pcb compiler backend CLI

mod samples;

use clap::{Parser, Subcommand, ValueEnum};
use pcb_codegen::{build_and_write_with, CraneliftBackend, EmitReport};
use pcb_error::{Diagnostic, DiagnosticRenderer, Diagnostics, Result};
use pcb_ir::Context;
use samples::Program;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Code generation backend
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Backend {
    /// Cranelift, pure Rust (default)
    #[default]
    Cranelift,
    /// LLVM 17 (needs the `llvm` feature)
    Llvm,
}

#[derive(Parser)]
#[command(name = "pcb")]
#[command(author = "Guilherme Mendes")]
#[command(version = "0.1.0")]
#[command(about = "IR builder and object emitter", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Builds a sample program into an object file
    Build {
        /// Program to build
        #[arg(value_enum)]
        program: Program,

        /// Output file (default: <program>.o)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Run the backend optimizer
        #[arg(long)]
        opt: bool,

        /// Print the IR before lowering
        #[arg(long)]
        print_ir: bool,

        /// Print the lowered backend IR
        #[arg(long)]
        print_lowered_ir: bool,

        /// Code generation backend
        #[arg(short, long, default_value = "cranelift")]
        backend: Backend,
    },

    /// Prints the IR of a sample program (debug)
    Print {
        /// Program to print
        #[arg(value_enum)]
        program: Program,

        /// Also verify it and print diagnostics
        #[arg(long)]
        check: bool,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(cli.command) {
        let renderer = DiagnosticRenderer::new();
        eprint!("{}", renderer.render(&Diagnostic::from(&err)));
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Build {
            program,
            output,
            opt,
            print_ir,
            print_lowered_ir,
            backend,
        } => {
            let ctx = program.build(opt)?;
            if print_ir {
                ctx.print();
            }

            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.o", program.file_stem())));
            let report = match backend {
                Backend::Cranelift => {
                    build_and_write_with(&CraneliftBackend::new(), ctx, &output, print_lowered_ir)?
                }
                Backend::Llvm => emit_llvm(ctx, &output, print_lowered_ir)?,
            };
            println!(
                "  [ok] {}: {} bytes -> {}",
                report.backend,
                report.object_size,
                output.display()
            );
        }

        Commands::Print { program, check } => {
            let ctx = program.build(false)?;
            print!("{}", ctx);

            if check {
                if !report(&ctx.diagnostics()) {
                    std::process::exit(1);
                }
                println!("  [ok] verified");
            }
        }
    }

    Ok(())
}

/// Renders `diagnostics` to stderr; false when any of them is an error
fn report(diagnostics: &Diagnostics) -> bool {
    if !diagnostics.is_empty() {
        eprint!("{}", diagnostics.render(&DiagnosticRenderer::new()));
    }
    !diagnostics.has_errors()
}

#[cfg(feature = "llvm")]
fn emit_llvm(ctx: Context, output: &Path, print_lowered_ir: bool) -> Result<EmitReport> {
    build_and_write_with(&pcb_codegen::LlvmBackend::new(), ctx, output, print_lowered_ir)
}

#[cfg(not(feature = "llvm"))]
fn emit_llvm(ctx: Context, _output: &Path, _print_lowered_ir: bool) -> Result<EmitReport> {
    ctx.delete();
    Err(pcb_error::Error::backend(
        "llvm",
        "backend not enabled; rebuild with --features llvm",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from(["pcb", "-vv", "build", "arguments", "--opt", "-o", "out.o"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Build {
                program,
                output,
                opt,
                backend,
                ..
            } => {
                assert_eq!(program, Program::Arguments);
                assert_eq!(output, Some(PathBuf::from("out.o")));
                assert!(opt);
                assert!(matches!(backend, Backend::Cranelift));
            }
            Commands::Print { .. } => panic!("expected build"),
        }
    }

    #[test]
    fn test_build_writes_object() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("zero.o");
        run(Commands::Build {
            program: Program::ReturnZero,
            output: Some(output.clone()),
            opt: false,
            print_ir: false,
            print_lowered_ir: false,
            backend: Backend::Cranelift,
        })
        .unwrap();
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn test_check_fails_on_errors() {
        for program in Program::value_variants() {
            assert!(report(&program.build(false).unwrap().diagnostics()));
        }

        let mut ctx = Context::new(false);
        let int32 = ctx.int_type(32).unwrap();
        let main = ctx
            .add_function("main", pcb_ir::FunctionSignature::new(vec![], int32))
            .unwrap();
        ctx.append_block(main).unwrap();
        assert!(!report(&ctx.diagnostics()));
    }
}
