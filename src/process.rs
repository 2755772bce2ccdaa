//! External program execution.
//!
//! Every interaction with `git`, `tar` and the container engine goes through
//! the [`CommandRunner`] trait. The production implementation is
//! [`SystemRunner`]; tests substitute a scripted runner so orchestration can
//! be exercised without spawning real processes.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::error::{Result, ShipError};

/// Exit status of an external program.
///
/// `code` is `None` when the process was terminated by a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandStatus {
    code: Option<i32>,
}

impl CommandStatus {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<ExitStatus> for CommandStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// A program invocation: the program name and its argument vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Program name as a lossy UTF-8 string, for messages.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Result of a captured (non-streamed) invocation.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Which output stream of a child process a line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Capability to run external programs.
///
/// `Err` is reserved for failures to run the program at all; a program that
/// runs and exits non-zero is reported through [`CommandStatus`].
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing stderr for error reporting.
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;

    /// Run to completion, handing each output line to `on_line` as soon as
    /// the child writes it.
    fn stream(
        &self,
        command: &CommandSpec,
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<CommandStatus>;
}

/// Runs commands as real child processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let output = command
            .to_command()
            .output()
            .map_err(|source| ShipError::Spawn {
                program: command.program_name(),
                source,
            })?;

        Ok(CommandOutput {
            status: output.status.into(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }

    fn stream(
        &self,
        command: &CommandSpec,
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<CommandStatus> {
        let mut child = command
            .to_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ShipError::Spawn {
                program: command.program_name(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes are drained concurrently so a chatty stderr cannot block
        // the child while we wait on stdout.
        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            if let Some(stdout) = stdout {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stdout, OutputStream::Stdout, tx));
            }
            if let Some(stderr) = stderr {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stderr, OutputStream::Stderr, tx));
            }
            drop(tx);

            for (stream, line) in rx {
                on_line(stream, &line);
            }
        });

        let status = child.wait().map_err(|source| ShipError::Spawn {
            program: command.program_name(),
            source,
        })?;

        Ok(status.into())
    }
}

fn forward_lines(
    reader: impl Read,
    stream: OutputStream,
    tx: mpsc::Sender<(OutputStream, String)>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
        }
    }
}
