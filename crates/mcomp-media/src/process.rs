//! Handle over a spawned external compression process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::transcoder::TranscodeProcess;

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// A running child process.
///
/// The child is killed if the handle is dropped before it exits.
pub struct ChildProcess {
    program: String,
    child: Child,
    stderr_tail: Option<JoinHandle<String>>,
    exited: bool,
}

impl ChildProcess {
    /// Spawn `program` with `args`.
    pub fn spawn<I, S>(program: &str, args: I) -> MediaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        debug!(program, pid = ?child.id(), "Spawned process");

        let stderr_tail = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut tail: Vec<String> = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
                tail.join("\n")
            })
        });

        Ok(Self {
            program: program.to_string(),
            child,
            stderr_tail,
            exited: false,
        })
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn collect_stderr(&mut self) -> Option<String> {
        let handle = self.stderr_tail.take()?;
        match handle.await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

#[async_trait]
impl TranscodeProcess for ChildProcess {
    async fn wait(&mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        self.exited = true;

        if status.success() {
            return Ok(());
        }

        let stderr = self.collect_stderr().await;
        let message = match status.code() {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        };
        Err(MediaError::process_failed(
            self.program.clone(),
            message,
            stderr,
            status.code(),
        ))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> MediaResult<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if self.exited {
            return Ok(());
        }
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid)
            .map_err(|_| MediaError::TerminationFailed(format!("pid {} out of range", pid)))?;

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(MediaError::TerminationFailed(e.to_string())),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> MediaResult<()> {
        if self.exited {
            return Ok(());
        }
        self.child
            .start_kill()
            .map_err(|e| MediaError::TerminationFailed(e.to_string()))
    }

    async fn kill(&mut self) -> MediaResult<()> {
        if self.exited {
            return Ok(());
        }
        if let Err(e) = self.child.kill().await {
            warn!(program = %self.program, "Failed to kill process: {}", e);
            return Err(MediaError::TerminationFailed(e.to_string()));
        }
        self.exited = true;
        Ok(())
    }
}
