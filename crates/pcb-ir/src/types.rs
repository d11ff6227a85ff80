//! IR Type System
//!
//! Types are interned per [`Context`](crate::Context): asking the same
//! context twice for `i32` yields the same [`Type`], so type equality is a
//! cheap identity comparison.

use crate::entity::ContextId;
use std::collections::HashMap;
use std::fmt;

/// Structural key of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Fixed-width integer, width in bits
    Integer(u32),
}

/// Interned type handle
///
/// Two handles are equal exactly when they were minted by the same context
/// for the same structural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    ctx: ContextId,
    index: u32,
    kind: TypeKind,
}

impl Type {
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Bit width of the integer type
    pub fn width(&self) -> u32 {
        match self.kind {
            TypeKind::Integer(width) => width,
        }
    }

    /// Checks if it is the one-bit integer produced by comparisons
    pub fn is_bool(&self) -> bool {
        self.width() == 1
    }

    /// Checks if an unsigned payload fits in this type
    pub fn fits(&self, value: u64) -> bool {
        let width = self.width();
        width >= 64 || value >> width == 0
    }

    pub(crate) fn context(&self) -> ContextId {
        self.ctx
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Integer(width) => write!(f, "i{}", width),
        }
    }
}

/// Per-context cache from structural key to type identity
#[derive(Debug)]
pub(crate) struct TypeInterner {
    ctx: ContextId,
    ids: HashMap<TypeKind, u32>,
}

impl TypeInterner {
    pub(crate) fn new(ctx: ContextId) -> Self {
        Self {
            ctx,
            ids: HashMap::new(),
        }
    }

    pub(crate) fn intern(&mut self, kind: TypeKind) -> Type {
        let next = self.ids.len() as u32;
        let index = *self.ids.entry(kind).or_insert(next);
        Type {
            ctx: self.ctx,
            index,
            kind,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Function signature: ordered input types plus one output type
///
/// A signature handle is linear: it is either moved into a function by
/// [`Context::add_function`](crate::Context::add_function) or released
/// with [`FunctionSignature::release`]. Reusing one signature for several
/// functions goes through [`FunctionSignature::duplicate`].
#[must_use = "a signature must be consumed by `Context::add_function` or released"]
#[derive(Debug, PartialEq, Eq)]
pub struct FunctionSignature {
    inputs: Vec<Type>,
    output: Type,
}

impl FunctionSignature {
    pub fn new(inputs: Vec<Type>, output: Type) -> Self {
        Self { inputs, output }
    }

    /// Independent handle with the same content
    pub fn duplicate(&self) -> Self {
        Self {
            inputs: self.inputs.clone(),
            output: self.output,
        }
    }

    /// Releases a signature that no function will consume
    pub fn release(self) {}

    pub fn inputs(&self) -> &[Type] {
        &self.inputs
    }

    pub fn output(&self) -> Type {
        self.output
    }

    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    pub(crate) fn belongs_to(&self, ctx: ContextId) -> bool {
        self.output.context() == ctx && self.inputs.iter().all(|ty| ty.context() == ctx)
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", input)?;
        }
        write!(f, ") -> {}", self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interner_identity() {
        let mut interner = TypeInterner::new(ContextId::fresh());
        let a = interner.intern(TypeKind::Integer(32));
        let b = interner.intern(TypeKind::Integer(32));
        let c = interner.intern(TypeKind::Integer(64));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_same_width_different_context() {
        let mut first = TypeInterner::new(ContextId::fresh());
        let mut second = TypeInterner::new(ContextId::fresh());
        assert_ne!(
            first.intern(TypeKind::Integer(8)),
            second.intern(TypeKind::Integer(8))
        );
    }

    #[test]
    fn test_fits() {
        let mut interner = TypeInterner::new(ContextId::fresh());
        let int1 = interner.intern(TypeKind::Integer(1));
        let int8 = interner.intern(TypeKind::Integer(8));
        let int64 = interner.intern(TypeKind::Integer(64));

        assert!(int1.fits(1));
        assert!(!int1.fits(2));
        assert!(int8.fits(255));
        assert!(!int8.fits(256));
        assert!(int64.fits(u64::MAX));
        assert!(int1.is_bool());
    }

    #[test]
    fn test_signature_display_and_duplicate() {
        let mut interner = TypeInterner::new(ContextId::fresh());
        let int32 = interner.intern(TypeKind::Integer(32));
        let int64 = interner.intern(TypeKind::Integer(64));

        let sig = FunctionSignature::new(vec![int32, int64], int32);
        assert_eq!(sig.to_string(), "(i32, i64) -> i32");

        let copy = sig.duplicate();
        assert_eq!(copy, sig);
        assert_eq!(copy.arity(), 2);
        copy.release();
        sig.release();

        let empty = FunctionSignature::new(vec![], int32);
        assert_eq!(empty.to_string(), "() -> i32");
        empty.release();
    }
}
