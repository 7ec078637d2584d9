//! Local process executor implementation.

use async_trait::async_trait;
use shipit_core::executor::{CommandSpec, Execution, Executor, OutputChunk, OutputStream};
use shipit_core::{Error, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::info;

/// Runs deploy commands as local child processes under a shell.
pub struct LocalProcessExecutor {
    shell: String,
}

impl LocalProcessExecutor {
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for LocalProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for LocalProcessExecutor {
    fn name(&self) -> &'static str {
        "local-process"
    }

    async fn spawn(&self, spec: CommandSpec) -> Result<Box<dyn Execution>> {
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&spec.script)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        info!(job_id = %spec.id, shell = %self.shell, "Spawning deploy process");

        let mut child = command
            .spawn()
            .map_err(|e| Error::ExecutionFailed(format!("failed to spawn process: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .map(|out| BufReader::new(out).lines());
        let stderr = child
            .stderr
            .take()
            .map(|err| BufReader::new(err).lines());

        Ok(Box::new(LocalExecution {
            child,
            stdout,
            stderr,
        }))
    }
}

struct LocalExecution {
    child: Child,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
}

async fn next_stdout_line(lines: &mut Option<Lines<BufReader<ChildStdout>>>) -> Option<String> {
    match lines {
        Some(l) => l.next_line().await.ok().flatten(),
        None => None,
    }
}

async fn next_stderr_line(lines: &mut Option<Lines<BufReader<ChildStderr>>>) -> Option<String> {
    match lines {
        Some(l) => l.next_line().await.ok().flatten(),
        None => None,
    }
}

#[async_trait]
impl Execution for LocalExecution {
    async fn next_chunk(&mut self) -> Option<OutputChunk> {
        loop {
            if self.stdout.is_none() && self.stderr.is_none() {
                return None;
            }

            tokio::select! {
                line = next_stdout_line(&mut self.stdout), if self.stdout.is_some() => {
                    match line {
                        Some(content) => {
                            return Some(OutputChunk::now(OutputStream::Stdout, content + "\n"));
                        }
                        None => self.stdout = None,
                    }
                }
                line = next_stderr_line(&mut self.stderr), if self.stderr.is_some() => {
                    match line {
                        Some(content) => {
                            return Some(OutputChunk::now(OutputStream::Stderr, content + "\n"));
                        }
                        None => self.stderr = None,
                    }
                }
            }
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to wait for process: {e}")))?;
        Ok(status.code())
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Some(pid) = self.child.id() {
            // SIGTERM, so the command can run its own cleanup
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to kill process: {e}")))
    }
}
