// src/exec/shell.rs

//! Process-backed task runner.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::exec::backend::{RunFuture, RunRequest, RunnerFailure, RunnerOutput, TaskRunner};
use crate::expr::{InputScope, resolve_str};
use crate::fs::{FileSystem, RealFileSystem};

/// Runs a script template as a local process.
///
/// - `{{inputs.parameters.*}}` and `{{workflow.*}}` placeholders in the
///   source are rendered first.
/// - The process is `command[0] command[1..] <source>`; with the default
///   command that is `sh -c <source>`.
/// - Every input is also exported as `DAGWEAVE_INPUT_<NAME>`.
/// - Trimmed stdout is the primary result.
/// - After a successful exit each capture path is read through the
///   [`FileSystem`]. Only files the run created or modified are reported;
///   a missing or untouched file is not.
///
/// Dropping the returned future kills the child process.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    fs: Arc<dyn FileSystem>,
    working_dir: Option<PathBuf>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            fs: Arc::new(RealFileSystem),
            working_dir: None,
        }
    }

    pub fn with_filesystem(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            working_dir: None,
        }
    }

    /// Run processes in `dir`; relative capture paths are resolved against
    /// it too.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn execute(&self, request: RunRequest) -> Result<RunnerOutput, RunnerFailure> {
        let scope = InputScope::new(&request.workflow, &request.inputs);
        let source = resolve_str(&request.script.source, &scope)
            .map_err(|e| RunnerFailure::new(format!("rendering script source: {e}")))?;

        let (program, args) = request
            .script
            .command
            .split_first()
            .ok_or_else(|| RunnerFailure::new("script command is empty"))?;

        if let Some(image) = &request.script.image {
            debug!(task = %request.task, image = %image, "shell runner ignores image");
        }

        info!(
            task = %request.task,
            template = %request.template,
            program = %program,
            "starting task process"
        );

        let before = self.snapshot(&request.capture_paths).await?;

        let mut cmd = Command::new(program);
        cmd.args(args).arg(&source);
        for (name, value) in &request.inputs {
            cmd.env(input_env_var(name), value);
        }
        cmd.env("DAGWEAVE_TASK", &request.task)
            .env("DAGWEAVE_WORKFLOW", &request.workflow.name);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", request.task))
            .map_err(to_failure)?;

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for process of task '{}'", request.task))
            .map_err(to_failure)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(task = %request.task, "stderr: {}", line);
        }

        let code = output.status.code();
        info!(
            task = %request.task,
            exit_code = code,
            success = output.status.success(),
            "task process exited"
        );

        if !output.status.success() {
            let detail = stderr.lines().last().unwrap_or("").trim();
            let mut message = match code {
                Some(c) => format!("process exited with code {c}"),
                None => "process terminated by signal".to_string(),
            };
            if !detail.is_empty() {
                message.push_str(": ");
                message.push_str(detail);
            }
            return Err(RunnerFailure {
                message,
                exit_code: code,
            });
        }

        let result = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let captured = self.capture(&request.task, &request.capture_paths, before).await?;

        Ok(RunnerOutput { result, captured })
    }

    /// Modification time of every capture path before the process starts.
    async fn snapshot(&self, paths: &[String]) -> Result<Vec<Option<SystemTime>>, RunnerFailure> {
        let fs = self.fs.clone();
        let full: Vec<PathBuf> = paths.iter().map(|p| self.resolve_path(p)).collect();

        tokio::task::spawn_blocking(move || full.iter().map(|p| fs.modified(p)).collect::<Vec<_>>())
            .await
            .context("inspecting capture paths")
            .map_err(to_failure)
    }

    async fn capture(
        &self,
        task: &str,
        paths: &[String],
        before: Vec<Option<SystemTime>>,
    ) -> Result<BTreeMap<String, String>, RunnerFailure> {
        let fs = self.fs.clone();
        let task = task.to_string();
        let targets: Vec<(String, PathBuf, Option<SystemTime>)> = paths
            .iter()
            .zip(before)
            .map(|(p, b)| (p.clone(), self.resolve_path(p), b))
            .collect();

        tokio::task::spawn_blocking(move || read_captures(fs.as_ref(), &task, targets))
            .await
            .context("reading capture paths")
            .map_err(to_failure)
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        match &self.working_dir {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p.to_path_buf(),
        }
    }
}

fn read_captures(
    fs: &dyn FileSystem,
    task: &str,
    targets: Vec<(String, PathBuf, Option<SystemTime>)>,
) -> BTreeMap<String, String> {
    let mut captured = BTreeMap::new();

    for (path, full, before) in targets {
        if !fs.is_file(&full) {
            debug!(task = %task, path = %path, "capture path not produced");
            continue;
        }
        // A file left over from an earlier run does not count.
        let modified = fs.modified(&full);
        if before.is_some() && modified == before {
            warn!(task = %task, path = %path, "capture path was not written by this run");
            continue;
        }
        match fs.read_to_string(&full) {
            Ok(value) => {
                captured.insert(path, value.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(e) => {
                warn!(task = %task, path = %path, error = %e, "failed to read capture path");
            }
        }
    }

    captured
}

impl TaskRunner for ShellRunner {
    fn run(&self, request: RunRequest) -> RunFuture<'_> {
        Box::pin(self.execute(request))
    }
}

/// `message-id` -> `DAGWEAVE_INPUT_MESSAGE_ID`
pub fn input_env_var(name: &str) -> String {
    format!(
        "DAGWEAVE_INPUT_{}",
        name.to_ascii_uppercase().replace('-', "_")
    )
}

fn to_failure(err: anyhow::Error) -> RunnerFailure {
    RunnerFailure::new(format!("{err:#}"))
}
