//! pcb-error - Errors and diagnostics for the pcb IR builder
//!
//! Every fallible operation of the IR builder and of the emission pipeline
//! reports an [`Error`]. Errors fall into three families:
//!
//! - **Construction**: raised by a builder call whose arguments are wrong
//!   (bad argument index, arity or type mismatch, constant overflow).
//!   The surrounding IR is left untouched.
//! - **Structural**: the caller program is malformed (terminated block,
//!   bad branch target, unterminated block at emission, reused value).
//! - **Emission**: the backend or the file system failed while producing
//!   the object file.
//!
//! # Example
//!
//! ```rust
//! use pcb_error::{Diagnostic, Error, DiagnosticRenderer};
//!
//! let err = Error::IndexOutOfRange { index: 3, arity: 1 };
//! let diagnostic = Diagnostic::from(&err);
//!
//! let renderer = DiagnosticRenderer::new().without_colors();
//! assert!(renderer.render(&diagnostic).starts_with("error[EC001]"));
//! ```

pub mod diagnostic;
pub mod error;

pub use diagnostic::{Diagnostic, DiagnosticRenderer, ErrorCode, Level};
pub use error::{Error, ErrorKind};

/// Default Result type for IR construction and emission
pub type Result<T> = std::result::Result<T, Error>;

/// Collection of diagnostics accumulated while checking a context
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.items.push(Diagnostic::warning(message));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.level == Level::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Renders all diagnostics, one block per diagnostic
    pub fn render(&self, renderer: &DiagnosticRenderer) -> String {
        self.items
            .iter()
            .map(|d| renderer.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let diagnostic = Diagnostic::error(err.to_string()).with_code(err.code());
        match err {
            Error::UnterminatedBlock { .. } => {
                diagnostic.with_help("set a branch or return terminator on every block before emission")
            }
            Error::UseAfterConsume { .. } => {
                diagnostic.with_note("every value is consumed by exactly one instruction or terminator")
            }
            Error::ValueFromOtherFunction { .. } => {
                diagnostic.with_note("values cannot flow between functions; pass them as call arguments")
            }
            Error::EmptyFunction { .. } => {
                diagnostic.with_help("append at least one block; the first block is the entry block")
            }
            _ => diagnostic,
        }
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
