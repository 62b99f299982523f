pub mod languages;
pub mod module_path;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use languages::{LanguageRegistry, LanguageSupport, ModuleContext};

/// Error type for the parsing front end.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ── Span type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl TextRange {
    /// One-based first line.
    pub fn start_line(&self) -> usize {
        self.start_row + 1
    }

    /// One-based last line.
    pub fn end_line(&self) -> usize {
        self.end_row + 1
    }
}

impl From<tree_sitter::Range> for TextRange {
    fn from(r: tree_sitter::Range) -> Self {
        Self {
            start_byte: r.start_byte,
            end_byte: r.end_byte,
            start_row: r.start_point.row,
            start_col: r.start_point.column,
            end_row: r.end_point.row,
            end_col: r.end_point.column,
        }
    }
}

// ── Symbol kind ────────────────────────────────────────────────────

/// Kind of a declared entity, or of the module acting as a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolKind {
    Module,
    Class,
    Interface,
    Enum,
    Function,
    Method,
    Constructor,
    Field,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "Module",
            Self::Class => "Class",
            Self::Interface => "Interface",
            Self::Enum => "Enum",
            Self::Function => "Function",
            Self::Method => "Method",
            Self::Constructor => "Constructor",
            Self::Field => "Field",
        }
    }

    /// Types own members through `DEFINES_METHOD`.
    pub fn is_type(self) -> bool {
        matches!(self, Self::Class | Self::Interface | Self::Enum)
    }

    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method | Self::Constructor)
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Extraction output ──────────────────────────────────────────────

/// Local symbol → fully qualified path, per module.
pub type ImportMap = BTreeMap<String, String>;

/// Variable or field name → declared type text, per scope.
pub type TypeBindings = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    /// Qualified name of the enclosing type, or the module for top-level items.
    pub parent_qn: String,
    pub span: TextRange,
    pub docstring: Option<String>,
    /// False when the declaration sits inside a syntax error region.
    pub parsed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_qn: String,
    pub caller_kind: SymbolKind,
    /// Enclosing type of the caller, when it has one.
    pub enclosing_type: Option<String>,
    /// Literal call text without arguments, e.g. `helper.compute`.
    pub call_text: String,
    pub receiver: Option<String>,
    pub member: String,
    pub span: TextRange,
    pub arg_count: usize,
    pub caller_parsed: bool,
}

impl CallSite {
    pub fn line(&self) -> usize {
        self.span.start_line()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedModule {
    pub module_qn: String,
    pub relative_path: PathBuf,
    pub language: String,
    /// Declared package (Java) when present.
    pub package: Option<String>,
    pub docstring: Option<String>,
    pub line_count: usize,
    pub declarations: Vec<Declaration>,
    pub calls: Vec<CallSite>,
    pub imports: ImportMap,
    /// Keyed by type qn (fields) or callable qn (parameters and locals).
    pub bindings: BTreeMap<String, TypeBindings>,
}

impl ParsedModule {
    pub fn declaration(&self, qualified_name: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|d| d.qualified_name == qualified_name)
    }
}
