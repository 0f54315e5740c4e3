//! Post-pass formatting through external tools.
//!
//! Projection leaves gaps where stripped fields used to be and does not care
//! about import usage; `gofmt` and `goimports` clean that up. The tools are
//! black boxes: they get the target path as their last argument and either
//! succeed (exit code zero) or fail with their combined output attached.
//!
//! Invocations block without a timeout, so a hung tool hangs the batch.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::{debug, trace};

/// A formatting pass over a file or directory tree
pub trait Formatter {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Formats everything under `target` in place
    fn format(&self, target: &Path) -> Result<()>;
}

/// A formatter implemented by running an external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFormatter {
    program: String,
    args: Vec<String>,
}

impl ExternalFormatter {
    /// Creates a formatter that runs `program args... <target>`
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `gofmt -w`
    pub fn gofmt() -> Self {
        Self::new("gofmt", ["-w"])
    }

    /// `goimports -w`
    pub fn goimports() -> Self {
        Self::new("goimports", ["-w"])
    }

    fn command(&self, target: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(target);
        cmd
    }
}

impl Formatter for ExternalFormatter {
    fn name(&self) -> &str {
        &self.program
    }

    fn format(&self, target: &Path) -> Result<()> {
        debug!(
            "Running {} {} {}",
            self.program,
            self.args.join(" "),
            target.display()
        );

        let output = self
            .command(target)
            .output()
            .map_err(|source| Error::FormatterSpawn {
                tool: self.program.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(Error::FormatterFailed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                output: combined,
            });
        }

        if !combined.trim().is_empty() {
            trace!("{} output: {}", self.program, combined.trim_end());
        }
        Ok(())
    }
}

/// `gofmt -w` followed by `goimports -w`
pub fn default_formatters() -> Vec<Box<dyn Formatter>> {
    vec![
        Box::new(ExternalFormatter::gofmt()),
        Box::new(ExternalFormatter::goimports()),
    ]
}
