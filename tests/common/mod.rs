#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git2::{Oid, Repository, Signature};
use shipmate::build::OutputSink;
use shipmate::error::Result;
use shipmate::process::{CommandOutput, CommandRunner, CommandSpec, CommandStatus, OutputStream};
use shipmate::tag::Tag;

/// Stand-in for `git`, `tar` and the build engine.
///
/// `tar -x` unpacks a fixed set of files into its `-C` destination, the
/// engine prints two lines per build, and everything else succeeds unless
/// scripted to fail.
#[derive(Default)]
pub struct FakeRunner {
    files: Vec<(String, String)>,
    failing_tags: HashSet<String>,
    failing_extracts: HashSet<String>,
    fail_fetch: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
            .with_file("app.txt", "hello\n")
            .with_file("Dockerfile", "FROM scratch\nCOPY app.txt /\n")
    }

    pub fn with_file(mut self, name: &str, content: &str) -> Self {
        self.files.push((name.to_string(), content.to_string()));
        self
    }

    /// Make the build of `tag` exit non-zero.
    pub fn failing_build(mut self, tag: &str) -> Self {
        self.failing_tags.insert(tag.to_string());
        self
    }

    /// Make extraction fail for workspaces under the context `dir_name`.
    pub fn failing_extract(mut self, dir_name: &str) -> Self {
        self.failing_extracts.insert(dir_name.to_string());
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(" build --tag "))
            .collect()
    }

    fn reply(&self, command: &CommandSpec) -> (i32, Vec<String>) {
        self.calls.lock().unwrap().push(command.to_string());
        let args: Vec<String> = command
            .get_args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let has = |flag: &str| args.iter().any(|a| a == flag);
        let after = |flag: &str| {
            let index = args.iter().position(|a| a == flag).unwrap();
            PathBuf::from(&args[index + 1])
        };

        if has("fetch") && self.fail_fetch {
            return (128, vec!["fatal: unable to access remote".to_string()]);
        }

        if command.program() == "tar" && has("-x") {
            let dest = after("-C");
            let context = dest.parent().and_then(Path::file_name).unwrap();
            if self.failing_extracts.contains(&*context.to_string_lossy()) {
                return (2, vec!["tar: short read".to_string()]);
            }
            for (name, content) in &self.files {
                fs::write(dest.join(name), content).unwrap();
            }
            return (0, Vec::new());
        }

        if has("build") && has("--tag") {
            let tag = after("--tag").to_string_lossy().into_owned();
            if self.failing_tags.contains(&tag) {
                return (1, vec![format!("error building {tag}")]);
            }
            return (0, vec![format!("Step 1/2 for {tag}"), "Successfully built".to_string()]);
        }

        (0, Vec::new())
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let (code, lines) = self.reply(command);
        Ok(CommandOutput {
            status: CommandStatus::from_code(code),
            stderr: lines.join("\n"),
        })
    }

    fn stream(
        &self,
        command: &CommandSpec,
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<CommandStatus> {
        let (code, lines) = self.reply(command);
        let stream = if code == 0 {
            OutputStream::Stdout
        } else {
            OutputStream::Stderr
        };
        for line in &lines {
            on_line(stream, line);
        }
        Ok(CommandStatus::from_code(code))
    }
}

/// Collects build output as `[tag] line`.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<String>>);

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl OutputSink for RecordingSink {
    fn line(&self, tag: &Tag, _stream: OutputStream, line: &str) {
        self.0.lock().unwrap().push(format!("[{tag}] {line}"));
    }
}

/// Create a bare repository with one commit on `master`, tagged `v1`.
pub fn bare_repo(path: &Path, files: &[(&str, &str)]) -> Oid {
    let repo = Repository::init_bare(path).unwrap();
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, content) in files {
        let blob = repo.blob(content.as_bytes()).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
    }
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let commit = repo
        .commit(Some("refs/heads/master"), &sig, &sig, "Initial commit", &tree, &[])
        .unwrap();
    repo.reference("refs/tags/v1", commit, true, "release").unwrap();
    commit
}

/// Put a `Dockerfile` in each of `dirs` under `root` (`""` is the root).
pub fn write_contexts(root: &Path, dirs: &[&str]) {
    for dir in dirs {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Dockerfile"), "FROM scratch\n").unwrap();
    }
}
