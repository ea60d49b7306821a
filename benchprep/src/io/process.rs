//! External step invocation with optional timeouts and bounded output.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// One external command: fetch script, build script, or analysis binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Kill the child after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl StepCommand {
    /// Split an argv vector into program and arguments.
    ///
    /// Returns `None` for an empty argv.
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
            cwd: None,
            timeout: None,
        })
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured child process output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// `None` when the child was terminated by a signal (including our own kill on timeout).
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, with truncation notices.
    pub fn combined_log(&self) -> Vec<u8> {
        let mut combined = self.stdout.clone();
        if self.stdout_truncated > 0 {
            combined.extend_from_slice(
                format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated).as_bytes(),
            );
        }
        combined.extend_from_slice(&self.stderr);
        if self.stderr_truncated > 0 {
            combined.extend_from_slice(
                format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated).as_bytes(),
            );
        }
        combined
    }
}

/// Invocation failures. A nonzero exit status is not one of these.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("could not spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("waiting on `{program}` failed: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("capturing output of `{program}` failed: {message}")]
    Capture { program: String, message: String },
}

/// Abstraction over running external steps.
///
/// Pipelines only see this trait; tests substitute scripted invokers that
/// never spawn processes.
pub trait StepInvoker: Sync {
    fn invoke(&self, command: &StepCommand) -> Result<StepOutput, StepError>;
}

/// How long to wait for output pipes to close after killing a timed-out step.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

type CapturedStream = io::Result<(Vec<u8>, usize)>;

/// Invoker that spawns real OS processes and blocks until they exit.
///
/// On unix each step runs in its own process group so a timeout kills the
/// whole tree (e.g. `git` under a fetch script), not just the direct child.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    pub output_limit_bytes: usize,
}

impl ProcessInvoker {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl StepInvoker for ProcessInvoker {
    #[instrument(skip_all, fields(program = %command.program, timeout_secs = command.timeout.map(|t| t.as_secs())))]
    fn invoke(&self, command: &StepCommand) -> Result<StepOutput, StepError> {
        let program = command.program.clone();
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!("spawning child process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                error!(err = %source, "failed to spawn command");
                return Err(StepError::Spawn { program, source });
            }
        };

        let capture_err = |message: &str| StepError::Capture {
            program: command.program.clone(),
            message: message.to_string(),
        };
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| capture_err("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| capture_err("stderr was not piped"))?;

        let limit = self.output_limit_bytes;
        let stdout_rx = spawn_reader(stdout, limit);
        let stderr_rx = spawn_reader(stderr, limit);

        let mut timed_out = false;
        let wait_err = |source| StepError::Wait {
            program: command.program.clone(),
            source,
        };
        let status = match command.timeout {
            Some(timeout) => match child.wait_timeout(timeout).map_err(wait_err)? {
                Some(status) => status,
                None => {
                    warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
                    timed_out = true;
                    kill_tree(&mut child).map_err(wait_err)?;
                    child.wait().map_err(wait_err)?
                }
            },
            None => child.wait().map_err(wait_err)?,
        };

        // A killed step may leave a descendant holding the pipes open; don't wait on it forever.
        let grace = timed_out.then_some(KILL_GRACE);
        let (stdout, stdout_truncated) =
            collect_output(&stdout_rx, grace).map_err(|e| capture_err(e.as_str()))?;
        let (stderr, stderr_truncated) =
            collect_output(&stderr_rx, grace).map_err(|e| capture_err(e.as_str()))?;

        if stdout_truncated > 0 || stderr_truncated > 0 {
            warn!(stdout_truncated, stderr_truncated, "output truncated");
        }

        debug!(exit_code = ?status.code(), timed_out, "command finished");
        Ok(StepOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            timed_out,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, limit: usize) -> Receiver<CapturedStream> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read_stream_limited(stream, limit));
    });
    rx
}

/// Receive a reader's output. With `grace`, give up after that long and keep nothing.
fn collect_output(
    rx: &Receiver<CapturedStream>,
    grace: Option<Duration>,
) -> Result<(Vec<u8>, usize), String> {
    let result = match grace {
        None => rx
            .recv()
            .map_err(|_| "output reader thread panicked".to_string())?,
        Some(grace) => match rx.recv_timeout(grace) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "output pipe still open after kill, abandoning reader"
                );
                return Ok((Vec::new(), 0));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err("output reader thread panicked".to_string());
            }
        },
    };
    result.map_err(|err| format!("read output: {err}"))
}

/// Kill the step and, on unix, every process in its group.
fn kill_tree(child: &mut Child) -> io::Result<()> {
    #[cfg(unix)]
    kill_process_group(child.id());
    match child.kill() {
        Ok(()) => Ok(()),
        // Already reaped by the group kill racing us.
        Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pgid: u32) {
    // SAFETY: kill(2) with a negative pid signals the process group; no memory is shared.
    let rc = unsafe { libc::kill(-(pgid as i32), libc::SIGKILL) };
    if rc != 0 {
        warn!(pgid, err = %io::Error::last_os_error(), "failed to kill process group");
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn from_argv_splits_program() {
        let command = StepCommand::from_argv(argv(&["spotbugs", "a.jar", "-output", "x"]))
            .expect("command");
        assert_eq!(command.program, "spotbugs");
        assert_eq!(command.args, argv(&["a.jar", "-output", "x"]));
        assert_eq!(command.display(), "spotbugs a.jar -output x");
        assert!(StepCommand::from_argv(Vec::new()).is_none());
    }

    #[test]
    fn read_stream_limited_counts_truncated_bytes() {
        let data = vec![b'x'; 100];
        let (kept, truncated) = read_stream_limited(&data[..], 40).expect("read");
        assert_eq!(kept.len(), 40);
        assert_eq!(truncated, 60);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let command = StepCommand::from_argv(argv(&["benchprep-definitely-not-a-command"]))
            .expect("command");
        let err = ProcessInvoker::new(1024)
            .invoke(&command)
            .expect_err("spawn should fail");
        assert!(matches!(err, StepError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let command = StepCommand::from_argv(argv(&["sh", "-c", "echo out; echo err >&2; exit 3"]))
            .expect("command");
        let output = ProcessInvoker::new(1024).invoke(&command).expect("invoke");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[cfg(unix)]
    #[test]
    fn runs_in_requested_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("marker");
        let command = StepCommand::from_argv(argv(&["cat", "marker.txt"]))
            .expect("command")
            .current_dir(temp.path());
        let output = ProcessInvoker::new(1024).invoke(&command).expect("invoke");
        assert!(output.success());
        assert_eq!(output.stdout, b"here");
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_child() {
        let command = StepCommand::from_argv(argv(&["sleep", "5"]))
            .expect("command")
            .timeout(Some(Duration::from_millis(100)));
        let output = ProcessInvoker::new(1024).invoke(&command).expect("invoke");
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_grandchildren_holding_pipes() {
        let command = StepCommand::from_argv(argv(&["sh", "-c", "sleep 5; echo done"]))
            .expect("command")
            .timeout(Some(Duration::from_millis(200)));
        let started = std::time::Instant::now();
        let output = ProcessInvoker::new(1024).invoke(&command).expect("invoke");
        let elapsed = started.elapsed();
        assert!(output.timed_out);
        assert!(elapsed < Duration::from_secs(3), "invoke blocked for {elapsed:?}");
        assert!(!String::from_utf8_lossy(&output.stdout).contains("done"));
    }

    #[test]
    fn collect_output_gives_up_after_grace() {
        let (_tx, rx) = mpsc::channel::<CapturedStream>();
        let started = std::time::Instant::now();
        let (kept, truncated) =
            collect_output(&rx, Some(Duration::from_millis(50))).expect("collect");
        assert!(kept.is_empty());
        assert_eq!(truncated, 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
