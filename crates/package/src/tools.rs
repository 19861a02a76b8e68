//! Running the external packaging tools
//!
//! Each stage runs one tool at a time and appends the command with its
//! captured output to the stage's log, whether or not it succeeded.

use async_trait::async_trait;
use chrono::Utc;
use sipforge_errors::{Error, StageError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Pipeline stages that write a log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ExtractArchive,
    ImportObject,
    CreateMix,
    PremisEvent,
    ImportDescription,
    CompileStructmap,
    CompileMets,
    SignMets,
    Compress,
}

impl Stage {
    /// Name of the stage, which is also the tool subcommand where one exists
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ExtractArchive => "extract-archive",
            Self::ImportObject => "import-object",
            Self::CreateMix => "create-mix",
            Self::PremisEvent => "premis-event",
            Self::ImportDescription => "import-description",
            Self::CompileStructmap => "compile-structmap",
            Self::CompileMets => "compile-mets",
            Self::SignMets => "sign-mets",
            Self::Compress => "compress",
        }
    }

    #[must_use]
    pub fn log_name(self) -> String {
        format!("{}.log", self.name())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Captured result of a finished tool
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a tool command line to completion
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `command`, whose first element is the program
    ///
    /// A nonzero exit is not an error at this level.
    async fn run(&self, command: &[String]) -> Result<ToolOutput, Error>;
}

/// Runs tools as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessToolRunner {
    virtualenv: Option<PathBuf>,
}

impl ProcessToolRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run tools from the virtualenv at `path`
    #[must_use]
    pub fn with_virtualenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.virtualenv = Some(path.into());
        self
    }

    fn search_path(&self) -> Option<OsString> {
        let venv = self.virtualenv.as_ref()?;
        let mut paths = vec![venv.join("bin")];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).ok()
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, command: &[String]) -> Result<ToolOutput, Error> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::invalid_argument("empty tool command"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let (Some(venv), Some(path)) = (&self.virtualenv, self.search_path()) {
            cmd.env("PATH", path).env("VIRTUAL_ENV", venv);
        }

        let output = cmd.output().await.map_err(|e| StageError::SpawnFailed {
            program: program.clone(),
            message: e.to_string(),
        })?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Append-only log of one stage's invocations
#[derive(Debug, Clone)]
pub struct StageLog {
    path: PathBuf,
}

impl StageLog {
    #[must_use]
    pub fn new(log_dir: &Path, stage: Stage) -> Self {
        Self {
            path: log_dir.join(stage.log_name()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one invocation record
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the log cannot be written.
    pub async fn append(&self, command: &[String], stdout: &[u8], stderr: &[u8]) -> Result<(), Error> {
        let mut record = format!(
            "\n===COMMAND===\n{}\n{}\n===STDOUT===\n",
            Utc::now().to_rfc3339(),
            command.join(" ")
        )
        .into_bytes();
        record.extend_from_slice(stdout);
        record.extend_from_slice(b"\n===STDERR===\n");
        record.extend_from_slice(stderr);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))?;
        file.write_all(&record)
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))?;
        file.flush()
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))
    }
}

/// Run one tool invocation for `stage`, logging it, and fail on a nonzero
/// exit
///
/// Returns the captured stdout.
///
/// # Errors
///
/// Returns `StageError::Failed` with the captured output on a nonzero exit,
/// or an error if the tool could not be run or the log written.
pub async fn run_stage(
    runner: &dyn ToolRunner,
    log_dir: &Path,
    stage: Stage,
    command: Vec<String>,
) -> Result<String, Error> {
    debug!(stage = %stage, command = %command.join(" "), "running tool");
    let output = runner.run(&command).await?;
    StageLog::new(log_dir, stage)
        .append(&command, &output.stdout, &output.stderr)
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.success() {
        return Err(StageError::Failed {
            stage: stage.name().to_string(),
            command,
            exit_code: output.exit_code,
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }
    debug!(stage = %stage, "tool completed");
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct Scripted {
        output: ToolOutput,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ToolRunner for Scripted {
        async fn run(&self, command: &[String]) -> Result<ToolOutput, Error> {
            self.seen.lock().unwrap().push(command.to_vec());
            Ok(self.output.clone())
        }
    }

    fn command() -> Vec<String> {
        vec!["compile-structmap".to_string(), "--workspace".to_string(), "/w".to_string()]
    }

    #[tokio::test]
    async fn successful_stage_is_logged() {
        let temp = tempdir().unwrap();
        let runner = Scripted {
            output: ToolOutput {
                exit_code: Some(0),
                stdout: b"done".to_vec(),
                stderr: b"warn".to_vec(),
            },
            seen: Mutex::new(Vec::new()),
        };

        let stdout = run_stage(&runner, temp.path(), Stage::CompileStructmap, command())
            .await
            .unwrap();
        assert_eq!(stdout, "done");

        let log = std::fs::read_to_string(temp.path().join("compile-structmap.log")).unwrap();
        assert!(log.starts_with("\n===COMMAND===\n"));
        assert!(log.contains("compile-structmap --workspace /w\n===STDOUT===\ndone\n===STDERR===\nwarn"));
        assert_eq!(runner.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_stage_is_logged_and_raised() {
        let temp = tempdir().unwrap();
        let runner = Scripted {
            output: ToolOutput {
                exit_code: Some(2),
                stdout: Vec::new(),
                stderr: b"boom".to_vec(),
            },
            seen: Mutex::new(Vec::new()),
        };

        for _ in 0..2 {
            let err = run_stage(&runner, temp.path(), Stage::CompileStructmap, command())
                .await
                .unwrap_err();
            match err {
                Error::Stage(StageError::Failed {
                    exit_code, stderr, ..
                }) => {
                    assert_eq!(exit_code, Some(2));
                    assert_eq!(stderr, "boom");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        let log = std::fs::read_to_string(temp.path().join("compile-structmap.log")).unwrap();
        assert_eq!(log.matches("===COMMAND===").count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_captures_output() {
        let runner = ProcessToolRunner::new();
        let output = runner
            .run(&["sh".to_string(), "-c".to_string(), "echo out; echo err >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let err = ProcessToolRunner::new()
            .run(&["sipforge-no-such-tool".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stage(StageError::SpawnFailed { .. })));
    }
}
