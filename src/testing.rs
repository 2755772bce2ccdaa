//! Test doubles shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git2::{Oid, Repository, Signature};

use crate::error::Result;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, CommandStatus, OutputStream};

/// What a scripted command does when invoked.
pub(crate) struct Reply {
    pub code: i32,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            code: 0,
            lines: Vec::new(),
        }
    }

    pub fn fail(code: i32) -> Self {
        Self {
            code,
            lines: vec![format!("scripted failure ({code})")],
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self {
            code: 0,
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

type Handler = Box<dyn Fn(&CommandSpec) -> Reply + Send + Sync>;

/// A [`CommandRunner`] that answers from a script instead of spawning
/// processes. Commands match on program name plus one argument; unmatched
/// commands succeed silently. Every invocation is recorded.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    handlers: Vec<(String, String, Handler)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        program: &str,
        arg: &str,
        handler: impl Fn(&CommandSpec) -> Reply + Send + Sync + 'static,
    ) -> Self {
        self.handlers
            .push((program.to_string(), arg.to_string(), Box::new(handler)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    pub fn count(&self, program: &str, arg: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches(c, program, arg))
            .count()
    }

    fn dispatch(&self, command: &CommandSpec) -> Reply {
        self.calls.lock().unwrap().push(command.clone());
        self.handlers
            .iter()
            .find(|(program, arg, _)| matches(command, program, arg))
            .map(|(_, _, handler)| handler(command))
            .unwrap_or_else(Reply::ok)
    }
}

fn matches(command: &CommandSpec, program: &str, arg: &str) -> bool {
    command.program() == program && command.get_args().iter().any(|a| a == arg)
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let reply = self.dispatch(command);
        Ok(CommandOutput {
            status: CommandStatus::from_code(reply.code),
            stderr: reply.lines.join("\n"),
        })
    }

    fn stream(
        &self,
        command: &CommandSpec,
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<CommandStatus> {
        let reply = self.dispatch(command);
        for line in &reply.lines {
            on_line(OutputStream::Stdout, line);
        }
        Ok(CommandStatus::from_code(reply.code))
    }
}

/// Argument following `flag` in a recorded command.
pub(crate) fn arg_after(command: &CommandSpec, flag: &str) -> PathBuf {
    let args = command.get_args();
    let index = args.iter().position(|a| a == flag).unwrap();
    PathBuf::from(&args[index + 1])
}

/// Last argument of a recorded command.
pub(crate) fn last_arg(command: &CommandSpec) -> PathBuf {
    PathBuf::from(command.get_args().last().unwrap())
}

/// Create a bare repository at `path` with one commit on `master`, tagged
/// `v1`, containing the given top-level files.
pub(crate) fn init_bare_repo(path: &Path, files: &[(&str, &str)]) -> Oid {
    let repo = Repository::init_bare(path).unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, content) in files {
        let blob = repo.blob(content.as_bytes()).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
    }
    let tree_id = builder.write().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("shipmate", "shipmate@example.com").unwrap();
    let commit = repo
        .commit(Some("refs/heads/master"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    repo.reference("refs/tags/v1", commit, true, "release")
        .unwrap();
    commit
}
