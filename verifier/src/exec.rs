//! External command execution.
//!
//! Every command the verifier runs goes through [`CommandExecutor`], which
//! takes the working directory as an explicit argument. The process-wide
//! current directory is never changed, so independent verifications can run
//! side by side.

use crate::cancel::{CancellationToken, Cancelled};
use camino::Utf8Path;
use log::debug;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// How often a running child is checked against its cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors arising from running external commands.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The command was interrupted by its cancellation token.
    #[error("{program} was interrupted: {reason}")]
    Cancelled {
        /// Program that was interrupted.
        program: String,
        /// Why the token fired.
        reason: Cancelled,
    },

    /// Waiting for the process or collecting its output failed.
    #[error("I/O error while running {program}: {source}")]
    Io {
        /// Program being run.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully.
    #[error("`{command}` failed ({status}): {message}")]
    Failed {
        /// Rendered command line.
        command: String,
        /// Rendered exit status.
        status: String,
        /// Trimmed stderr, or stdout when stderr is empty.
        message: String,
    },
}

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs `program` with `args` inside `cwd` and returns the captured output.
    ///
    /// A non-zero exit status is not an error at this level; see
    /// [`run_checked`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] or [`ExecError::Io`] when the process
    /// cannot be run, and [`ExecError::Cancelled`] when `cancel` fires first.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use provenance_verifier::cancel::CancellationToken;
    /// use provenance_verifier::exec::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let cancel = CancellationToken::new();
    /// let output = executor.run("git", &["--version"], Utf8Path::new("."), &cancel)?;
    /// assert!(output.status.success());
    /// # Ok::<(), provenance_verifier::exec::ExecError>(())
    /// ```
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<Output, ExecError>;
}

/// Executes commands on the host system.
///
/// Children are polled so that a cancelled token kills them promptly. Stdout
/// and stderr are drained on helper threads so chatty tools cannot fill a
/// pipe and stall. Collecting that output is polled as well, since a
/// background grandchild can hold the pipes open after the child exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Utf8Path,
        cancel: &CancellationToken,
    ) -> Result<Output, ExecError> {
        cancel.check().map_err(|reason| ExecError::Cancelled {
            program: program.to_owned(),
            reason,
        })?;
        debug!("running `{}` in {cwd}", render_command(program, args));

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);
        let status = wait_for_exit(&mut child, program, cancel)?;

        Ok(Output {
            status,
            stdout: collect(stdout, program, cancel)?,
            stderr: collect(stderr, program, cancel)?,
        })
    }
}

/// Runs a command and returns its stdout, treating a non-zero exit as failure.
///
/// # Errors
///
/// Propagates executor errors and returns [`ExecError::Failed`] with the
/// tool's own error text when the command exits unsuccessfully.
pub fn run_checked(
    executor: &dyn CommandExecutor,
    program: &str,
    args: &[&str],
    cwd: &Utf8Path,
    cancel: &CancellationToken,
) -> Result<String, ExecError> {
    let output = executor.run(program, args, cwd, cancel)?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    Err(ExecError::Failed {
        command: render_command(program, args),
        status: output.status.to_string(),
        message: failure_message(&output),
    })
}

/// Render a command line for logs and error messages.
#[must_use]
pub fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if !trimmed.is_empty() {
        return trimmed.to_owned();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed_stdout = stdout.trim();
    if trimmed_stdout.is_empty() {
        "no output".to_owned()
    } else {
        trimmed_stdout.to_owned()
    }
}

fn wait_for_exit(
    child: &mut Child,
    program: &str,
    cancel: &CancellationToken,
) -> Result<ExitStatus, ExecError> {
    loop {
        if let Err(reason) = cancel.check() {
            // The child may already have exited; either way it must be reaped.
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecError::Cancelled {
                program: program.to_owned(),
                reason,
            });
        }

        let waited = child
            .wait_timeout(poll_slice(cancel))
            .map_err(|source| ExecError::Io {
                program: program.to_owned(),
                source,
            })?;
        if let Some(status) = waited {
            return Ok(status);
        }
    }
}

fn poll_slice(cancel: &CancellationToken) -> Duration {
    cancel
        .remaining()
        .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL))
}

type ReaderResult = std::io::Result<Vec<u8>>;

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<ReaderResult> {
    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let result = reader.read_to_end(&mut buffer).map(|_| buffer);
        // The receiver is gone when the run was cancelled.
        let _ = sender.send(result);
    });
    receiver
}

/// Wait for a reader thread's output, giving up when `cancel` fires.
///
/// A reader left behind on cancellation finishes once the last writer closes
/// the pipe.
fn collect(
    receiver: Option<Receiver<ReaderResult>>,
    program: &str,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ExecError> {
    let Some(receiver) = receiver else {
        return Ok(Vec::new());
    };
    loop {
        cancel.check().map_err(|reason| ExecError::Cancelled {
            program: program.to_owned(),
            reason,
        })?;
        let source = match receiver.recv_timeout(poll_slice(cancel)) {
            Ok(Ok(buffer)) => return Ok(buffer),
            Ok(Err(source)) => source,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => std::io::Error::other("output reader stopped"),
        };
        return Err(ExecError::Io {
            program: program.to_owned(),
            source,
        });
    }
}
