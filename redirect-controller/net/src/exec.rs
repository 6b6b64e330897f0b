//! Kernel command execution.

use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
};
use tracing::trace;

/// Runs host networking tools and writes kernel tunables.
///
/// Implementations are expected to enforce their own timeouts.
#[async_trait::async_trait]
pub trait Exec: Send + Sync {
    /// Runs `program` and returns its standard output. A non-zero exit status
    /// is an error.
    async fn output(&self, program: &str, args: &[String]) -> Result<String, Error>;

    async fn run(&self, program: &str, args: &[String]) -> Result<(), Error> {
        self.output(program, args).await.map(drop)
    }

    async fn write_file(&self, path: &Path, value: &str) -> Result<(), Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected output from `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Executes commands on the host.
#[derive(Clone, Debug, Default)]
pub struct System(());

/// Builds an owned argument list.
pub fn argv<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    args.into_iter().map(|a| a.to_string()).collect()
}

pub(crate) fn render(program: &str, args: &[String]) -> String {
    let mut command = program.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

// === impl System ===

impl System {
    pub fn new() -> Self {
        Self(())
    }
}

#[async_trait::async_trait]
impl Exec for System {
    async fn output(&self, program: &str, args: &[String]) -> Result<String, Error> {
        trace!(command = %render(program, args), "Executing");
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Failed {
                command: render(program, args),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn write_file(&self, path: &Path, value: &str) -> Result<(), Error> {
        trace!(path = %path.display(), %value, "Writing");
        tokio::fs::write(path, value)
            .await
            .map_err(|source| Error::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}
