//! Blocking process execution with line-oriented output streaming.

use crate::error::ProcessError;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

const DEFAULT_MAX_CAPTURED_LINES: usize = 1024;

/// Receives process lifecycle events and output lines as they arrive.
///
/// Lines from standard output and standard error are merged into a single
/// stream and delivered on the thread that called
/// [`ProcessRunner::run`], in arrival order.
pub trait LineHandler {
    /// Called once after the process has been spawned.
    fn started(&mut self, pid: u32) {
        let _ = pid;
    }

    /// Called for each output line as the process emits it.
    fn line(&mut self, line: &str);

    /// Called once when output ends, with the error if a stream failed
    /// before draining completely.
    fn stream_closed(&mut self, error: Option<&std::io::Error>) {
        let _ = error;
    }
}

/// The result of running one external process to completion.
#[derive(Debug)]
pub struct ProcessOutcome {
    lines: Vec<String>,
    pid: u32,
    stopped: bool,
    exit_code: Option<i32>,
}

impl ProcessOutcome {
    /// Returns `true` if the process exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The exit code, or `None` if the process was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// The captured output lines, oldest dropped past the configured maximum.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The first captured output line, or an empty string if there was none.
    pub fn first_line(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or("")
    }

    /// The operating system process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns `true` if output capture stopped before the streams were
    /// fully drained.
    pub fn stopped(&self) -> bool {
        self.stopped
    }
}

/// Runs external toolchain processes, blocking until each one exits.
///
/// Standard output and standard error are read by dedicated threads so
/// neither pipe can fill and stall the child, while the handler observes
/// every line from the calling thread.
pub struct ProcessRunner {
    cwd: Option<PathBuf>,
    max_captured_lines: usize,
}

enum StreamEvent {
    Line(String),
    Failed(std::io::Error),
}

impl ProcessRunner {
    /// Creates a runner inheriting the current working directory.
    pub fn new() -> Self {
        Self {
            cwd: None,
            max_captured_lines: DEFAULT_MAX_CAPTURED_LINES,
        }
    }

    /// Sets the working directory child processes run in.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets the maximum number of output lines kept in the outcome.
    pub fn with_max_captured_lines(mut self, max: usize) -> Self {
        self.max_captured_lines = max;
        self
    }

    /// Runs `command` with `args`, streaming output to `handler`, and
    /// blocks until the process exits.
    pub fn run(
        &self,
        command: &str,
        args: &[String],
        handler: &mut dyn LineHandler,
    ) -> Result<ProcessOutcome, ProcessError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| ProcessError::Spawn {
            command: command.to_string(),
            source: e,
        })?;
        let pid = child.id();
        handler.started(pid);

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        // The loop below ends once every sender is dropped
        drop(tx);

        let mut lines: VecDeque<String> = VecDeque::new();
        let mut stream_error = None;
        for event in rx {
            match event {
                StreamEvent::Line(line) => {
                    handler.line(&line);
                    if self.max_captured_lines > 0 {
                        if lines.len() == self.max_captured_lines {
                            lines.pop_front();
                        }
                        lines.push_back(line);
                    }
                }
                StreamEvent::Failed(e) => {
                    if stream_error.is_none() {
                        stream_error = Some(e);
                    }
                }
            }
        }
        for reader in readers {
            let _ = reader.join();
        }
        handler.stream_closed(stream_error.as_ref());

        let status = child.wait().map_err(|e| ProcessError::Wait {
            command: command.to_string(),
            source: e,
        })?;

        Ok(ProcessOutcome {
            lines: lines.into(),
            pid,
            stopped: stream_error.is_some(),
            exit_code: status.code(),
        })
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_reader(
    stream: impl Read + Send + 'static,
    tx: mpsc::Sender<StreamEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(StreamEvent::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(StreamEvent::Failed(e));
                    return;
                }
            }
        }
    })
}
