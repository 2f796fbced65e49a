//! PTY-backed execution of assembled command lines.
//!
//! Each invocation runs under `sh -c` with a separate pseudo-terminal
//! pair on every standard stream, so the client tools behave as if a user
//! were driving them while the driver scripts their input and drains
//! their output without blocking. Draining continues until both output
//! streams reach end-of-stream; there is deliberately no overall timeout,
//! the process itself decides how long the operation lives.
//!
//! When no pseudo-terminal can be allocated the executor degrades to a
//! plain blocking invocation, unless a password is configured: password
//! delivery depends on the terminal plumbing, so that combination is
//! refused outright.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::pty::openpty;
use tracing::{debug, warn};

use crate::error::{DriverError, Result};

/// Bytes read from a stream per drain pass.
const READ_CHUNK: usize = 4096;

/// Pause between process launch and delivery of a scripted answer, giving
/// the tool time to print its prompt.
const INPUT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Sleep between drain passes that produced no bytes on either stream.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One command line ready to execute.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ExecRequest<'a> {
    /// Shell command string handed to `sh -c`.
    pub(crate) command_line: &'a str,
    /// Scripted answer written to the child's terminal after the settle
    /// delay (a trailing newline is appended).
    pub(crate) input: Option<&'a str>,
    /// Whether a password is configured; governs the no-PTY policy.
    pub(crate) password_configured: bool,
}

/// Executes the request, appending captured output to the accumulators.
///
/// Returns the process's real exit status; signal terminations map to
/// `128 + signo`.
///
/// # Errors
///
/// [`DriverError::PtyUnsupported`] when no pseudo-terminal could be
/// allocated while a password is configured, and [`DriverError::Io`] when
/// the process cannot be launched at all.
pub(crate) fn run(
    request: ExecRequest<'_>,
    stdout_acc: &mut String,
    stderr_acc: &mut String,
) -> Result<i32> {
    debug!(command = request.command_line, "executing");

    match PtySession::spawn(request.command_line) {
        Ok(session) => session.drive(request.input, stdout_acc, stderr_acc),
        Err(error) => {
            if request.password_configured {
                return Err(DriverError::PtyUnsupported {
                    reason: error.to_string(),
                });
            }
            debug!(error = %error, "no pseudo-terminal available, running detached");
            run_blocking(request.command_line, stdout_acc, stderr_acc)
        }
    }
}

/// Blocking degraded path used when no PTY is available and no password
/// is configured.
pub(crate) fn run_blocking(
    command_line: &str,
    stdout_acc: &mut String,
    stderr_acc: &mut String,
) -> Result<i32> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(command_line)
        .output()?;

    stdout_acc.push_str(&String::from_utf8_lossy(&output.stdout));
    stderr_acc.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(exit_code_from(output.status))
}

/// Non-blocking read side of one pseudo-terminal master.
///
/// Bytes accumulate raw in `buffer`; a single read can end in the middle
/// of a multi-byte character, so decoding waits until the stream is done.
struct PtyStream {
    file: File,
    buffer: Vec<u8>,
    closed: bool,
}

impl PtyStream {
    fn new(file: File) -> Self {
        Self {
            file,
            buffer: Vec::new(),
            closed: false,
        }
    }

    /// One read pass into the buffer; reports whether any bytes arrived.
    ///
    /// `EIO` from a master whose slave side is gone is the PTY way of
    /// signalling end-of-stream and is treated like `Ok(0)`. Unexpected
    /// read failures close the stream as well: once the process runs,
    /// failures are captured, never raised.
    fn drain_chunk(&mut self) -> bool {
        if self.closed {
            return false;
        }

        let mut buf = [0u8; READ_CHUNK];
        match self.file.read(&mut buf) {
            Ok(0) => {
                self.closed = true;
                false
            }
            Ok(count) => {
                self.buffer.extend_from_slice(&buf[..count]);
                true
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => false,
            Err(error) if error.raw_os_error() == Some(nix::libc::EIO) => {
                self.closed = true;
                false
            }
            Err(error) => {
                warn!(error = %error, "terminal read failed, treating stream as closed");
                self.closed = true;
                false
            }
        }
    }
}

/// A spawned child with pseudo-terminals on all three standard streams.
struct PtySession {
    child: Child,
    stdin: File,
    stdout: PtyStream,
    stderr: PtyStream,
}

impl PtySession {
    fn spawn(command_line: &str) -> io::Result<Self> {
        let stdin_pty = openpty(None, None).map_err(io::Error::from)?;
        let stdout_pty = openpty(None, None).map_err(io::Error::from)?;
        let stderr_pty = openpty(None, None).map_err(io::Error::from)?;

        set_nonblocking(&stdin_pty.master)?;
        set_nonblocking(&stdout_pty.master)?;
        set_nonblocking(&stderr_pty.master)?;

        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::from(stdin_pty.slave))
            .stdout(Stdio::from(stdout_pty.slave))
            .stderr(Stdio::from(stderr_pty.slave))
            .spawn()?;

        Ok(Self {
            child,
            stdin: File::from(stdin_pty.master),
            stdout: PtyStream::new(File::from(stdout_pty.master)),
            stderr: PtyStream::new(File::from(stderr_pty.master)),
        })
    }

    fn drive(
        mut self,
        input: Option<&str>,
        stdout_acc: &mut String,
        stderr_acc: &mut String,
    ) -> Result<i32> {
        if let Some(answer) = input {
            // Pick up prompt text that is already waiting, then give the
            // tool time to finish printing before answering.
            self.stdout.drain_chunk();
            std::thread::sleep(INPUT_SETTLE_DELAY);
            self.write_input(answer);
        }

        while !(self.stdout.closed && self.stderr.closed) {
            let out_progress = self.stdout.drain_chunk();
            let err_progress = self.stderr.drain_chunk();
            if !out_progress && !err_progress {
                std::thread::sleep(DRAIN_POLL_INTERVAL);
            }
        }

        drop(self.stdin);
        stdout_acc.push_str(&String::from_utf8_lossy(&self.stdout.buffer));
        stderr_acc.push_str(&String::from_utf8_lossy(&self.stderr.buffer));
        let status = self.child.wait()?;
        debug!(status = %status, "command finished");
        Ok(exit_code_from(status))
    }

    fn write_input(&mut self, answer: &str) {
        let payload = format!("{answer}\n");
        let delivered = self
            .stdin
            .write_all(payload.as_bytes())
            .and_then(|()| self.stdin.flush());
        if let Err(error) = delivered {
            warn!(error = %error, "failed to deliver scripted input");
        }
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_retain(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

fn exit_code_from(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(-1, |signo| 128 + signo))
}
