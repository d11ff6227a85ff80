//! Diagnostic - compiler-style error messages
//!
//! IR diagnostics carry no source spans: the IR is built programmatically,
//! so a diagnostic is a level, an optional code, a message, and trailing
//! notes and help lines.

use std::fmt;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Blocks emission
    Error,
    /// Does not block emission
    Warning,
    /// Additional information
    Note,
    /// Fix suggestion
    Help,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
            Level::Help => "help",
        }
    }

    /// Returns the ANSI code for coloring
    pub fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",   // Bold Red
            Level::Warning => "\x1b[1;33m", // Bold Yellow
            Level::Note => "\x1b[1;36m",    // Bold Cyan
            Level::Help => "\x1b[1;32m",    // Bold Green
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    /// Category (C = Construction, S = Structural, E = Emission)
    pub category: char,
    /// Error number
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Construction errors
    pub const INDEX_OUT_OF_RANGE: Self = Self::new('C', 1);
    pub const ARITY_MISMATCH: Self = Self::new('C', 2);
    pub const TYPE_MISMATCH: Self = Self::new('C', 3);
    pub const CONSTANT_OVERFLOW: Self = Self::new('C', 4);
    pub const INVALID_INTEGER_WIDTH: Self = Self::new('C', 5);

    // Structural errors
    pub const BLOCK_ALREADY_TERMINATED: Self = Self::new('S', 1);
    pub const INVALID_BRANCH_TARGET: Self = Self::new('S', 2);
    pub const UNTERMINATED_BLOCK: Self = Self::new('S', 3);
    pub const USE_AFTER_CONSUME: Self = Self::new('S', 4);
    pub const VALUE_FROM_OTHER_FUNCTION: Self = Self::new('S', 5);
    pub const FOREIGN_HANDLE: Self = Self::new('S', 6);
    pub const EMPTY_FUNCTION: Self = Self::new('S', 7);
    pub const DIVISION_BY_ZERO: Self = Self::new('S', 8);

    // Emission errors
    pub const BACKEND_FAILURE: Self = Self::new('E', 1);
    pub const IO_FAILURE: Self = Self::new('E', 2);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A complete diagnostic
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level
    pub level: Level,
    /// Error code (optional)
    pub code: Option<ErrorCode>,
    /// Main message
    pub message: String,
    /// Additional notes
    pub notes: Vec<String>,
    /// Fix suggestions
    pub help: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(Level::Error, message)
    }

    /// Creates a new warning
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(Level::Warning, message)
    }

    fn with_level(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    /// Sets the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Adds a suggestion
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }
}

/// Renders a diagnostic for display
#[derive(Debug, Clone)]
pub struct DiagnosticRenderer {
    use_colors: bool,
}

impl Default for DiagnosticRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticRenderer {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    /// Renders the diagnostic as a string
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let mut output = String::new();

        // error[ES003]: message
        let reset = if self.use_colors { "\x1b[0m" } else { "" };
        let color = if self.use_colors {
            diagnostic.level.color_code()
        } else {
            ""
        };
        let bold = if self.use_colors { "\x1b[1m" } else { "" };

        output.push_str(color);
        output.push_str(diagnostic.level.as_str());

        if let Some(code) = &diagnostic.code {
            output.push('[');
            output.push_str(&code.to_string());
            output.push(']');
        }

        output.push_str(reset);
        output.push_str(bold);
        output.push_str(": ");
        output.push_str(&diagnostic.message);
        output.push_str(reset);
        output.push('\n');

        for note in &diagnostic.notes {
            output.push_str(&format!("  = {}note{}: {}\n", bold, reset, note));
        }

        let green = if self.use_colors { Level::Help.color_code() } else { "" };
        for help in &diagnostic.help {
            output.push_str(&format!("  = {}help{}: {}\n", green, reset, help));
        }

        output
    }
}
