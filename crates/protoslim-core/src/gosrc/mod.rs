//! Structural scanning of Go source files.
//!
//! Parsing is done by the tree-sitter Go grammar; this module only lifts the
//! concrete syntax tree into what the projector needs:
//!
//! - the end of the package clause and import block
//! - the boundaries of every top-level declaration
//! - the names and shapes of type specs (struct, interface, anything else)
//! - the doc comment attached to a declaration
//!
//! Every position is a byte offset into the buffer that was parsed, so spans
//! can be sliced out of the original text verbatim.
//!
//! ## Example
//!
//! ```
//! use protoslim_core::gosrc::{parse_file, TypeShape};
//!
//! let src = "package x\n\nimport \"fmt\"\n\ntype Msg struct {\n\tA int\n}\n\nfunc Foo() {}\n";
//! let file = parse_file(src)?;
//! assert_eq!(file.decls.len(), 2);
//! assert_eq!(file.decls[0].specs[0].shape, TypeShape::Struct);
//! # Ok::<(), protoslim_core::gosrc::ParseError>(())
//! ```

mod parser;

use std::fmt;

pub use parser::{parse_file, parse_imports};

/// Syntax error with its location in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    offset: usize,
    line: usize,
    column: usize,
    message: String,
}

impl ParseError {
    /// Creates an error with an explicit location
    pub fn new(offset: usize, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            line,
            column,
            message: message.into(),
        }
    }

    /// Creates an error at `offset`, deriving the 1-based line and column from `src`
    pub fn at(src: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(src.len());
        let before = &src.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        Self::new(offset, line, offset - line_start + 1, message)
    }

    /// Byte offset of the error
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 1-based line number
    pub fn line(&self) -> usize {
        self.line
    }

    /// 1-based byte column
    pub fn column(&self) -> usize {
        self.column
    }

    /// Diagnostic text
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Keyword that introduces a top-level declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// `const`
    Const,
    /// `var`
    Var,
    /// `type`
    Type,
    /// `func`, including methods
    Func,
}

/// Shape of the type on the right-hand side of a type spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    /// `struct { ... }`
    Struct,
    /// `interface { ... }`
    Interface,
    /// Named types, pointers, slices, maps, funcs, ...
    Other,
}

/// One `Name [TypeParams] [=] Type` entry of a type declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    /// Declared name
    pub name: String,
    /// Shape of the declared type
    pub shape: TypeShape,
}

/// A top-level declaration group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    /// Introducing keyword
    pub kind: DeclKind,
    /// Offset of the keyword
    pub start: usize,
    /// Offset one past the last byte of the declaration
    pub end: usize,
    /// Offset of the attached doc comment group, if any
    pub doc_start: Option<usize>,
    /// Type specs; empty unless `kind` is [`DeclKind::Type`]
    pub specs: Vec<TypeSpec>,
}

impl Decl {
    /// Returns true if any spec in this group declares a struct type
    pub fn has_struct(&self) -> bool {
        self.specs.iter().any(|s| s.shape == TypeShape::Struct)
    }

    /// Start of the declaration including its doc comment
    pub fn leading_start(&self) -> usize {
        self.doc_start.unwrap_or(self.start)
    }
}

/// Result of a full parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Top-level declarations after the imports, in source order
    pub decls: Vec<Decl>,
}

impl SourceFile {
    /// Declaration groups that declare at least one struct, in source order
    pub fn struct_decls(&self) -> impl Iterator<Item = &Decl> {
        self.decls.iter().filter(|d| d.has_struct())
    }
}
