//! External process execution for ffmpeg and ffprobe.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use deid_common::cancel::{CancelToken, ProcessRegistration};
use deid_common::config::ToolsConfig;
use deid_common::error::{DeidError, DeidResult};

/// Runs the transcoder binaries and ties every child to a cancel token.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    cancel: CancelToken,
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A running child with its stderr drained on a background thread.
#[derive(Debug)]
pub struct SpawnedProcess {
    child: Child,
    stderr_task: Option<JoinHandle<String>>,
    _registration: ProcessRegistration,
    program: String,
}

impl FfmpegRunner {
    pub fn new(tools: &ToolsConfig, cancel: CancelToken) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            cancel,
        }
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn ffmpeg_available(&self) -> bool {
        command_exists(&self.ffmpeg)
    }

    pub fn ffprobe_available(&self) -> bool {
        command_exists(&self.ffprobe)
    }

    /// Run ffmpeg to completion. `context` names the operation in errors.
    pub fn run_ffmpeg(&self, args: &[String], context: &str) -> DeidResult<ProcessOutput> {
        self.run(&self.ffmpeg, args, context)
    }

    /// Run ffprobe to completion and return its output.
    pub fn run_ffprobe(&self, args: &[String], context: &str) -> DeidResult<ProcessOutput> {
        self.run(&self.ffprobe, args, context)
    }

    /// Start ffmpeg with the requested pipes. Stderr is always drained.
    pub fn spawn_ffmpeg(
        &self,
        args: &[String],
        pipe_stdin: bool,
        pipe_stdout: bool,
    ) -> DeidResult<SpawnedProcess> {
        self.spawn(&self.ffmpeg, args, pipe_stdin, pipe_stdout)
    }

    fn run(&self, program: &Path, args: &[String], context: &str) -> DeidResult<ProcessOutput> {
        let mut process = self.spawn(program, args, false, true)?;

        let mut stdout = String::new();
        if let Some(out) = process.child.stdout.take() {
            BufReader::new(out)
                .read_to_string(&mut stdout)
                .map_err(|e| DeidError::media(format!("Failed reading {} output: {e}", process.program)))?;
        }

        let (status, stderr) = process.wait()?;
        if !status.success() {
            if self.cancel.is_stopped() {
                return Err(DeidError::Cancelled);
            }
            tracing::debug!(%status, context, stderr = %stderr.trim(), "External tool failed");
            return Err(DeidError::media_with_stderr(
                format!("{context} failed ({status})"),
                &stderr,
            ));
        }

        Ok(ProcessOutput { stdout, stderr })
    }

    fn spawn(
        &self,
        program: &Path,
        args: &[String],
        pipe_stdin: bool,
        pipe_stdout: bool,
    ) -> DeidResult<SpawnedProcess> {
        self.cancel.check()?;

        let program_name = program.display().to_string();
        tracing::debug!(program = %program_name, ?args, "Running external tool");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(if pipe_stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeidError::ToolUnavailable {
                    tool: program_name.clone(),
                }
            } else {
                DeidError::media(format!("Failed to start {program_name}: {e}"))
            }
        })?;

        let registration = self.cancel.register_process(child.id());
        tracing::debug!(pid = child.id(), program = %program_name, "Process started");

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DeidError::media(format!("Failed to capture {program_name} stderr")))?;

        // Drain stderr concurrently to avoid the child blocking on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read stderr: {err}>"),
            }
        });

        Ok(SpawnedProcess {
            child,
            stderr_task: Some(stderr_task),
            _registration: registration,
            program: program_name,
        })
    }
}

impl SpawnedProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Wait for exit and collect the drained stderr.
    pub fn wait(&mut self) -> DeidResult<(ExitStatus, String)> {
        let status = self
            .child
            .wait()
            .map_err(|e| DeidError::media(format!("Failed to wait on {}: {e}", self.program)))?;
        let stderr = self
            .stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default();
        Ok((status, stderr))
    }

    /// Kill the child and reap it. Errors are logged, not returned.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(pid = self.child.id(), error = %e, "Kill failed (process likely exited)");
        }
        if let Err(e) = self.wait() {
            tracing::warn!(error = %e, "Failed to reap killed process");
        }
    }
}

impl Drop for SpawnedProcess {
    fn drop(&mut self) {
        // Not yet waited on: never leave a running child behind.
        if self.stderr_task.is_some() {
            self.kill();
        }
    }
}

/// Whether `binary` can be executed: a path to an existing file, or a bare
/// name found on `PATH`.
pub fn command_exists(binary: &Path) -> bool {
    if binary.components().count() > 1 {
        return binary.is_file();
    }
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {} >/dev/null 2>&1", binary.display()))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_with(ffmpeg: &str) -> FfmpegRunner {
        let tools = ToolsConfig {
            ffmpeg: PathBuf::from(ffmpeg),
            ffprobe: PathBuf::from("ffprobe"),
        };
        FfmpegRunner::new(&tools, CancelToken::new())
    }

    #[test]
    fn test_missing_binary_is_tool_unavailable() {
        let runner = runner_with("/nonexistent/deid-ffmpeg");
        let err = runner.run_ffmpeg(&[], "probe").unwrap_err();
        assert!(matches!(err, DeidError::ToolUnavailable { .. }));
        assert!(!runner.ffmpeg_available());
    }

    #[test]
    fn test_cancelled_runner_refuses_to_spawn() {
        let runner = runner_with("sh");
        runner.cancel_token().request_stop();
        let err = runner.run_ffmpeg(&[], "noop").unwrap_err();
        assert!(err.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr_excerpt() {
        let runner = runner_with("sh");
        let args = vec!["-c".to_string(), "echo broken input >&2; exit 3".to_string()];
        let err = runner.run_ffmpeg(&args, "cut").unwrap_err();
        match err {
            DeidError::Media {
                message,
                stderr_excerpt,
            } => {
                assert!(message.starts_with("cut failed"));
                assert_eq!(stderr_excerpt.as_deref(), Some("broken input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_is_captured_and_process_unregistered() {
        let runner = runner_with("sh");
        let args = vec!["-c".to_string(), "printf hello".to_string()];
        let output = runner.run_ffmpeg(&args, "echo").unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(runner.cancel_token().running_processes(), 0);
    }

    #[test]
    fn test_command_exists() {
        assert!(command_exists(Path::new("sh")));
        assert!(!command_exists(Path::new("/nonexistent/tool")));
    }
}
