//! pcb-ir - Intermediate Representation of the pcb compiler backend
//!
//! Callers build typed functions out of basic blocks and single-use SSA
//! values, then hand the whole [`Context`] to the emission pipeline in
//! `pcb-codegen`.
//!
//! # Architecture
//!
//! ```text
//! Context
//! ├── Types (interned per context)
//! └── Functions
//!     ├── Signature (consumed at creation)
//!     ├── Value arena (arguments and instruction results)
//!     └── Blocks
//!         ├── Instructions
//!         └── Terminator (br / br cond / ret)
//!         ↓
//!    [Verify]
//!         ↓
//!    [Codegen] (pcb-codegen)
//! ```
//!
//! # Example
//!
//! ```
//! use pcb_ir::{Context, FunctionSignature};
//!
//! let mut ctx = Context::new(false);
//! let int32 = ctx.int_type(32)?;
//! let foo = ctx.add_function("foo", FunctionSignature::new(vec![], int32))?;
//! let entry = ctx.append_block(foo)?;
//! let zero = ctx.build_const(entry, int32, 0)?;
//! ctx.set_terminator_return(entry, zero)?;
//!
//! ctx.verify()?;
//! assert!(ctx.to_string().contains("ret %0"));
//! # Ok::<(), pcb_error::Error>(())
//! ```

pub mod context;
pub mod entity;
pub mod function;
pub mod instruction;
pub mod types;
mod verify;

pub use context::Context;
pub use entity::{BlockId, EntityId, EntityVec, FuncId, ValueId};
pub use function::{Block, BlockRef, Function, FunctionRef, Terminator};
pub use instruction::{BinaryOp, CompareOp, Instruction, Value, ValueData, ValueDef};
pub use types::{FunctionSignature, Type, TypeKind};
