//! Error taxonomy

use crate::diagnostic::ErrorCode;
use std::path::PathBuf;

/// Error family, see the crate documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments to a single builder call; the IR is unchanged
    Construction,
    /// Malformed caller program
    Structural,
    /// Backend or I/O failure during emission
    Emission,
}

/// Every error the IR builder and the emission pipeline can report
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Construction errors
    #[error("argument index {index} is out of range for a function with {arity} parameter(s)")]
    IndexOutOfRange { index: usize, arity: usize },

    #[error("call to `{callee}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch in {site}: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        site: String,
        expected: String,
        found: String,
    },

    #[error("constant {value} does not fit in i{width}")]
    ConstantOverflow { value: u64, width: u32 },

    #[error("integer width {width} is invalid; widths start at 1")]
    InvalidIntegerWidth { width: u32 },

    // Structural errors
    #[error("block bb{block} of `{function}` is already terminated")]
    BlockAlreadyTerminated { function: String, block: u32 },

    #[error("invalid branch target in `{function}`: {target} is not a block of this function")]
    InvalidBranchTarget { function: String, target: String },

    #[error("block bb{block} of `{function}` has no terminator")]
    UnterminatedBlock { function: String, block: u32 },

    #[error("value {value} was already consumed")]
    UseAfterConsume { value: String },

    #[error("value {value} belongs to `{owner}` and cannot be used in `{user}`")]
    ValueFromOtherFunction {
        value: String,
        owner: String,
        user: String,
    },

    #[error("{handle} handle belongs to a different context")]
    ForeignHandle { handle: &'static str },

    #[error("function `{function}` has no blocks")]
    EmptyFunction { function: String },

    #[error("division by constant zero in block bb{block} of `{function}`")]
    DivisionByZero { function: String, block: u32 },

    // Emission errors
    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("failed to write `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Error::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IndexOutOfRange { .. }
            | Error::ArityMismatch { .. }
            | Error::TypeMismatch { .. }
            | Error::ConstantOverflow { .. }
            | Error::InvalidIntegerWidth { .. } => ErrorKind::Construction,

            Error::BlockAlreadyTerminated { .. }
            | Error::InvalidBranchTarget { .. }
            | Error::UnterminatedBlock { .. }
            | Error::UseAfterConsume { .. }
            | Error::ValueFromOtherFunction { .. }
            | Error::ForeignHandle { .. }
            | Error::EmptyFunction { .. }
            | Error::DivisionByZero { .. } => ErrorKind::Structural,

            Error::BackendFailure { .. } | Error::Io { .. } => ErrorKind::Emission,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::IndexOutOfRange { .. } => ErrorCode::INDEX_OUT_OF_RANGE,
            Error::ArityMismatch { .. } => ErrorCode::ARITY_MISMATCH,
            Error::TypeMismatch { .. } => ErrorCode::TYPE_MISMATCH,
            Error::ConstantOverflow { .. } => ErrorCode::CONSTANT_OVERFLOW,
            Error::InvalidIntegerWidth { .. } => ErrorCode::INVALID_INTEGER_WIDTH,
            Error::BlockAlreadyTerminated { .. } => ErrorCode::BLOCK_ALREADY_TERMINATED,
            Error::InvalidBranchTarget { .. } => ErrorCode::INVALID_BRANCH_TARGET,
            Error::UnterminatedBlock { .. } => ErrorCode::UNTERMINATED_BLOCK,
            Error::UseAfterConsume { .. } => ErrorCode::USE_AFTER_CONSUME,
            Error::ValueFromOtherFunction { .. } => ErrorCode::VALUE_FROM_OTHER_FUNCTION,
            Error::ForeignHandle { .. } => ErrorCode::FOREIGN_HANDLE,
            Error::EmptyFunction { .. } => ErrorCode::EMPTY_FUNCTION,
            Error::DivisionByZero { .. } => ErrorCode::DIVISION_BY_ZERO,
            Error::BackendFailure { .. } => ErrorCode::BACKEND_FAILURE,
            Error::Io { .. } => ErrorCode::IO_FAILURE,
        }
    }

    /// Whether the caller can fix the offending call and keep building
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Construction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = Error::ConstantOverflow { value: 256, width: 8 };
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(err.is_recoverable());

        let err = Error::UnterminatedBlock { function: "main".into(), block: 0 };
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert!(!err.is_recoverable());

        let err = Error::backend("cranelift", "boom");
        assert_eq!(err.kind(), ErrorKind::Emission);
    }

    #[test]
    fn test_error_messages() {
        let err = Error::TypeMismatch {
            site: "return value".into(),
            expected: "i32".into(),
            found: "i64".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch in return value: expected `i32`, found `i64`"
        );

        let err = Error::Io {
            path: PathBuf::from("out.o"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to write `out.o`: denied");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::IndexOutOfRange { index: 3, arity: 1 }.code().to_string(), "EC001");
        assert_eq!(
            Error::DivisionByZero { function: "f".into(), block: 0 }.code().to_string(),
            "ES008"
        );
        assert_eq!(Error::backend("llvm", "x").code().to_string(), "EE001");
    }
}
