//! Build engine invocation.

use std::ffi::{OsStr, OsString};
use std::io::{self, Write};

use crate::discovery::DEFAULT_DESCRIPTOR;
use crate::error::{Result, ShipError};
use crate::process::{CommandRunner, CommandSpec, OutputStream};
use crate::tag::Tag;
use crate::workspace::Workspace;

/// Engine invoked when none is configured.
pub const DEFAULT_ENGINE: &str = "docker";

/// Receives build output as it is produced.
///
/// Implementations must tolerate calls from several worker threads.
pub trait OutputSink: Send + Sync {
    fn line(&self, tag: &Tag, stream: OutputStream, line: &str);
}

/// Writes engine stdout to our stdout and engine stderr to our stderr.
///
/// With `prefixed` set every line is labelled with its tag, which keeps
/// interleaved output from parallel builds readable.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleSink {
    prefixed: bool,
}

impl ConsoleSink {
    pub fn new(prefixed: bool) -> Self {
        Self { prefixed }
    }
}

impl OutputSink for ConsoleSink {
    fn line(&self, tag: &Tag, stream: OutputStream, line: &str) {
        let result = match stream {
            OutputStream::Stdout => write_line(&mut io::stdout().lock(), self.prefixed, tag, line),
            OutputStream::Stderr => write_line(&mut io::stderr().lock(), self.prefixed, tag, line),
        };
        if let Some(err) = unreported_write_error(result) {
            eprintln!("Warning: failed to forward output of {tag}: {err}");
        }
    }
}

fn write_line(out: &mut impl Write, prefixed: bool, tag: &Tag, line: &str) -> io::Result<()> {
    if prefixed {
        writeln!(out, "[{tag}] {line}")
    } else {
        writeln!(out, "{line}")
    }
}

/// Write errors worth a warning. A reader that hung up is not one.
fn unreported_write_error(result: io::Result<()>) -> Option<io::Error> {
    result.err().filter(|err| err.kind() != io::ErrorKind::BrokenPipe)
}

/// Runs the container build engine against a workspace.
pub struct BuildExecutor<'r> {
    runner: &'r dyn CommandRunner,
    engine: OsString,
    descriptor: OsString,
}

impl<'r> BuildExecutor<'r> {
    pub fn new(runner: &'r dyn CommandRunner) -> Self {
        Self {
            runner,
            engine: OsString::from(DEFAULT_ENGINE),
            descriptor: OsString::from(DEFAULT_DESCRIPTOR),
        }
    }

    pub fn engine(mut self, engine: impl AsRef<OsStr>) -> Self {
        self.engine = engine.as_ref().to_os_string();
        self
    }

    pub fn descriptor(mut self, descriptor: impl AsRef<OsStr>) -> Self {
        self.descriptor = descriptor.as_ref().to_os_string();
        self
    }

    /// `<engine> build --tag <tag> --file <context>/<descriptor> <workspace>`
    ///
    /// The descriptor comes from the scanned tree; the build context is the
    /// extracted revision.
    pub fn command(&self, workspace: &Workspace, tag: &Tag) -> CommandSpec {
        let descriptor = workspace.context().absolute_path().join(&self.descriptor);
        CommandSpec::new(&self.engine)
            .arg("build")
            .arg("--tag")
            .arg(tag.to_string())
            .arg("--file")
            .arg(descriptor)
            .arg(workspace.path())
    }

    /// Build `workspace` as `tag`, forwarding every output line to `sink`.
    pub fn build(&self, workspace: &Workspace, tag: &Tag, sink: &dyn OutputSink) -> Result<()> {
        let command = self.command(workspace, tag);
        let status = self
            .runner
            .stream(&command, &mut |stream, line| sink.line(tag, stream, line))?;

        if !status.success() {
            return Err(ShipError::BuildFailure {
                tag: tag.to_string(),
                status,
            });
        }
        Ok(())
    }
}
