//! # protoslim-core
//!
//! A library for reducing protoc-gen-go output to plain API structs.
//!
//! Generated `.pb.go` files carry a lot of runtime machinery: reflection
//! descriptors, getters, enum helpers, and bookkeeping fields injected into
//! every message. This crate rewrites such files in place so that only the
//! import block and the struct declarations remain, with the bookkeeping
//! fields removed.
//!
//! ## Architecture
//!
//! - [`gosrc`]: Go source scanning over tree-sitter (imports, top-level declarations)
//! - [`projector`]: file selection, span extraction, reconstruction, batch writes
//! - [`projector::format`]: external formatter passes run after rewriting
//! - [`config`]: `protoslim.toml` project configuration
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protoslim_core::{Projector, ProjectorConfig};
//! use std::path::Path;
//!
//! let projector = Projector::new(ProjectorConfig::new());
//! let report = projector.run(Path::new("./api"))?;
//! println!("rewrote {} file(s)", report.projected.len());
//! # Ok::<(), protoslim_core::Error>(())
//! ```
//!
//! Projection of a single buffer needs no filesystem at all:
//!
//! ```
//! use protoslim_core::{project_source, StripRules};
//!
//! let src = "package x\n\nimport \"fmt\"\n\ntype Msg struct {\n\tA int\n}\n\nfunc Foo() {}\n";
//! let out = project_source(src, &StripRules::default())?;
//! assert_eq!(out, "package x\n\nimport \"fmt\"\n\ntype Msg struct {\n\tA int\n}\n");
//! # Ok::<(), protoslim_core::gosrc::ParseError>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Formatter`]: plug in other post-pass tools, or none at all
//! - [`StripRules`] / [`ExclusionRules`]: injected rule sets for other codegen conventions

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod gosrc;
pub mod projector;

// Re-export primary types for convenience
pub use config::{FileConfig, CONFIG_FILENAME};
pub use error::{Error, Result};
pub use projector::{
    declaration_spans, import_span, project_source, select_files, CommitMode, ExclusionRules,
    ExternalFormatter, Formatter, ProjectionReport, Projector, ProjectorConfig, Selection,
    StripRules,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
