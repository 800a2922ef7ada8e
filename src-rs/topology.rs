use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::geometry::{parse_geometry, ScreenSet};
use crate::process::{run_with_timeout, RunError};

/// The display-geometry query tool could not deliver its output.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with status {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("failed to read {program} output: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A pinned geometry file could not be read.
#[derive(Debug, Error)]
#[error("failed to read screen config {}: {source}", .path.display())]
pub struct ConfigError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// How to ask the system for its screen layout.
#[derive(Debug, Clone)]
pub struct DisplayQuery {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for DisplayQuery {
    fn default() -> Self {
        Self {
            program: "xrandr".to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl DisplayQuery {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Runs the query tool and parses its stdout.
    ///
    /// A tool that succeeds without printing any geometry yields an empty set.
    pub fn resolve(&self) -> Result<ScreenSet, TopologyError> {
        let stdout = self.run()?;
        let screens = parse_geometry(&stdout);
        debug!(program = %self.program, screens = screens.len(), "display topology resolved");
        Ok(screens)
    }

    fn run(&self) -> Result<String, TopologyError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = run_with_timeout(&mut command, self.timeout).map_err(|err| {
            let program = self.program.clone();
            match err {
                RunError::Spawn(source) => TopologyError::Spawn { program, source },
                RunError::Timeout => TopologyError::Timeout {
                    program,
                    timeout: self.timeout,
                },
                RunError::Io(source) => TopologyError::Io { program, source },
            }
        })?;

        if !output.status.success() {
            return Err(TopologyError::Failed {
                program: self.program.clone(),
                code: output.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Queries the live display layout with the default `xrandr` invocation.
pub fn resolve_topology() -> Result<ScreenSet, TopologyError> {
    DisplayQuery::default().resolve()
}

pub fn load_topology_from_text(text: &str) -> ScreenSet {
    parse_geometry(text)
}

/// Reads a pinned layout, e.g. one saved from `xrandr` on the capturing machine.
pub fn load_topology_from_file(path: &Path) -> Result<ScreenSet, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError {
        path: path.to_path_buf(),
        source,
    })?;
    let screens = load_topology_from_text(&text);
    info!(path = %path.display(), screens = screens.len(), "loaded screen config");
    Ok(screens)
}
