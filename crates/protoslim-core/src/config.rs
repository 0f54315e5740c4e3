//! Project configuration file.
//!
//! A `protoslim.toml` at the project root (or any file passed explicitly)
//! overrides the built-in rules. Every key is optional:
//!
//! ```toml
//! suffix = ".pb.go"
//! exclude = ["error_code.pb.go"]
//! strip = [
//!     "state         protoimpl.MessageState",
//!     "sizeCache     protoimpl.SizeCache",
//!     "unknownFields protoimpl.UnknownFields",
//! ]
//! commit = "staged"
//!
//! [[formatter]]
//! program = "gofmt"
//! args = ["-w"]
//! ```
//!
//! An empty `formatter` list disables the post-pass entirely.

use crate::error::{Error, Result};
use crate::projector::{
    default_formatters, CommitMode, ExclusionRules, ExternalFormatter, Formatter,
    ProjectorConfig, StripRules,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-project config file
pub const CONFIG_FILENAME: &str = "protoslim.toml";

/// Contents of a config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Generated-file suffix
    pub suffix: Option<String>,
    /// Excluded filename suffixes
    pub exclude: Option<Vec<String>>,
    /// Literals stripped from projected files
    pub strip: Option<Vec<String>>,
    /// Commit mode
    pub commit: Option<CommitMode>,
    /// Post-pass formatters, in order
    #[serde(rename = "formatter")]
    pub formatters: Option<Vec<FormatterConfig>>,
    /// Where this config was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// One external formatter entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatterConfig {
    /// Program name or path
    pub program: String,
    /// Arguments placed before the target path
    #[serde(default)]
    pub args: Vec<String>,
}

impl FileConfig {
    /// Parses config text; `path` is only used for error messages
    pub fn from_toml_str(text: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut config: Self = toml::from_str(text).map_err(|source| Error::ConfigParse {
            path: path.clone(),
            source,
        })?;
        config.source = Some(path);
        Ok(config)
    }

    /// Loads an explicit config file; a missing file is an error
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&text, path)
    }

    /// Loads `protoslim.toml` from `dir` if present, defaults otherwise
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            debug!("No {} in {}, using defaults", CONFIG_FILENAME, dir.display());
            Ok(Self::default())
        }
    }

    /// Builds a projector config, falling back to defaults for unset keys
    pub fn projector_config(&self) -> ProjectorConfig {
        let mut config = ProjectorConfig::default();
        if let Some(suffix) = &self.suffix {
            config.suffix = suffix.clone();
        }
        if let Some(exclude) = &self.exclude {
            config.exclusions = ExclusionRules::new(exclude.iter().cloned());
        }
        if let Some(strip) = &self.strip {
            config.strip = StripRules::new(strip.iter().cloned());
        }
        if let Some(commit) = self.commit {
            config.commit = commit;
        }
        config
    }

    /// Builds the formatter chain, falling back to `gofmt` + `goimports`
    pub fn formatters(&self) -> Vec<Box<dyn Formatter>> {
        match &self.formatters {
            Some(list) => list
                .iter()
                .map(|f| {
                    Box::new(ExternalFormatter::new(f.program.clone(), f.args.iter().cloned()))
                        as Box<dyn Formatter>
                })
                .collect(),
            None => default_formatters(),
        }
    }
}
