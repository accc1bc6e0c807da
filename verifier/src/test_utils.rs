//! Shared test utilities for the verifier crate.
//!
//! Provides canned process output, a replaying [`StubExecutor`], a URL-keyed
//! [`StubHttpClient`], and builders for registry documents and npm-style
//! tarballs.

use crate::cancel::CancellationToken;
use crate::exec::{CommandExecutor, ExecError};
use crate::http::{HttpClient, HttpError};
use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with the given stdout.
pub fn output_with_stdout(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

type Effect = Box<dyn FnOnce(&Utf8Path)>;

/// Represents an expected command invocation for testing.
pub struct ExpectedCall {
    /// The program to execute (e.g., "git").
    pub program: String,
    /// The arguments to pass to the program.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output, ExecError>,
    effect: Option<Effect>,
}

impl ExpectedCall {
    /// Expect `program args` and return `result`.
    pub fn new(program: &str, args: &[&str], result: Result<Output, ExecError>) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result,
            effect: None,
        }
    }

    /// Expect `program args` and succeed with `stdout`.
    pub fn succeeds(program: &str, args: &[&str], stdout: &str) -> Self {
        Self::new(program, args, Ok(output_with_stdout(stdout)))
    }

    /// Expect `program args` and exit with status 1 and `stderr`.
    pub fn fails(program: &str, args: &[&str], stderr: &str) -> Self {
        Self::new(program, args, Ok(failure_output(stderr)))
    }

    /// Run `effect` against the working directory when the call is replayed.
    ///
    /// Used to simulate tools that write files, such as `npm pack`.
    #[must_use]
    pub fn with_effect(mut self, effect: impl FnOnce(&Utf8Path) + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

impl fmt::Debug for ExpectedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedCall")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("result", &self.result)
            .field("has_effect", &self.effect.is_some())
            .finish()
    }
}

/// A command invocation observed by [`StubExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program that was run.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory the command ran in.
    pub cwd: Utf8PathBuf,
}

impl Invocation {
    /// Render the invocation as a single command line.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Replays expected invocations in order and records every call together with
/// its working directory. A cancelled token stops a call before it is
/// recorded, as it would stop a real process before spawning.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    seen: RefCell<Vec<Invocation>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Returns every invocation made so far.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.seen.borrow().clone()
    }

    /// Returns the distinct working directories used, in first-use order.
    pub fn working_dirs(&self) -> Vec<Utf8PathBuf> {
        let mut dirs: Vec<Utf8PathBuf> = Vec::new();
        for invocation in self.seen.borrow().iter() {
            if !dirs.contains(&invocation.cwd) {
                dirs.push(invocation.cwd.clone());
            }
        }
        dirs
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let expected = self.expected.borrow();
        assert!(
            expected.is_empty(),
            "expected no further command invocations, {} remain: {:?}",
            expected.len(),
            expected.front()
        );
    }
}

impl CommandExecutor for StubExecutor {
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
        let invocation = Invocation {
            program: program.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            cwd: cwd.to_owned(),
        };
        self.seen.borrow_mut().push(invocation.clone());

        let call = self
            .expected
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                panic!(
                    "unexpected command invocation: {}",
                    invocation.command_line()
                )
            });

        assert_eq!(call.program, program);
        assert_eq!(call.args, invocation.args);

        if let Some(effect) = call.effect {
            effect(cwd);
        }
        call.result
    }
}

/// Canned response served by [`StubHttpClient`].
#[derive(Debug, Clone)]
pub enum StubResponse {
    /// Respond with the given body.
    Body(Vec<u8>),
    /// Respond with HTTP 404.
    NotFound,
    /// Fail the request with the given reason.
    Fail(String),
}

/// A stub `HttpClient` serving canned responses keyed by URL.
///
/// Unknown URLs answer 404. Every requested URL is recorded.
#[derive(Debug, Default)]
pub struct StubHttpClient {
    responses: HashMap<String, StubResponse>,
    requested: RefCell<Vec<String>>,
}

impl StubHttpClient {
    /// Creates a client with no configured responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    #[must_use]
    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses
            .insert(url.to_owned(), StubResponse::Body(body.into()));
        self
    }

    /// Serve `response` for `url`.
    #[must_use]
    pub fn with_response(mut self, url: &str, response: StubResponse) -> Self {
        self.responses.insert(url.to_owned(), response);
        self
    }

    /// Returns every URL requested so far.
    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl HttpClient for StubHttpClient {
    fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, HttpError> {
        self.requested.borrow_mut().push(url.to_owned());
        cancel.check().map_err(|reason| HttpError::Cancelled {
            url: url.to_owned(),
            reason,
        })?;
        match self.responses.get(url) {
            Some(StubResponse::Body(body)) => Ok(body.clone()),
            Some(StubResponse::Fail(reason)) => Err(HttpError::Request {
                url: url.to_owned(),
                reason: reason.clone(),
            }),
            Some(StubResponse::NotFound) | None => Err(HttpError::NotFound {
                url: url.to_owned(),
            }),
        }
    }
}

/// Builds a gzip-compressed tarball with every file under `package/`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn npm_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    let entries: Vec<(String, &[u8])> = files
        .iter()
        .map(|(path, data)| (format!("package/{path}"), *data))
        .collect();
    raw_tarball(&entries)
}

/// Builds a gzip-compressed tarball with the given member paths verbatim.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn raw_tarball<P: AsRef<str>>(files: &[(P, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        let name = header.as_old_mut().name.as_mut_slice();
        let bytes = path.as_ref().as_bytes();
        assert!(bytes.len() < name.len(), "fixture path too long");
        name[..bytes.len()].copy_from_slice(bytes);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, *data).expect("append tar entry");
    }
    let encoder = builder.into_inner().expect("finish tar archive");
    encoder.finish().expect("finish gzip stream")
}

/// Builder for registry package documents.
///
/// Produces a document with a single published version tagged `latest`.
#[derive(Debug, Clone)]
pub struct RegistryDocument {
    name: String,
    version: String,
    repository: Option<serde_json::Value>,
    git_head: Option<String>,
    tarball: Option<String>,
    extra_versions: Vec<String>,
}

impl RegistryDocument {
    /// Start a document for `name` at `version`.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            repository: None,
            git_head: None,
            tarball: None,
            extra_versions: Vec::new(),
        }
    }

    /// Declare a `git` repository at `url`.
    #[must_use]
    pub fn git_repository(self, url: &str) -> Self {
        self.repository(serde_json::json!({ "type": "git", "url": url }))
    }

    /// Use `value` verbatim as the repository field.
    #[must_use]
    pub fn repository(mut self, value: serde_json::Value) -> Self {
        self.repository = Some(value);
        self
    }

    /// Record `sha` as the version's `gitHead`.
    #[must_use]
    pub fn git_head(mut self, sha: &str) -> Self {
        self.git_head = Some(sha.to_owned());
        self
    }

    /// Record `url` as the version's `dist.tarball`.
    #[must_use]
    pub fn tarball(mut self, url: &str) -> Self {
        self.tarball = Some(url.to_owned());
        self
    }

    /// Publish an additional untagged version with no metadata of interest.
    #[must_use]
    pub fn also_published(mut self, version: &str) -> Self {
        self.extra_versions.push(version.to_owned());
        self
    }

    /// Render the document as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let mut record = serde_json::json!({
            "name": self.name,
            "version": self.version,
        });
        if let Some(repository) = &self.repository {
            record["repository"] = repository.clone();
        }
        if let Some(sha) = &self.git_head {
            record["gitHead"] = serde_json::Value::String(sha.clone());
        }
        let mut dist = serde_json::json!({ "shasum": "0000000000000000000000000000000000000000" });
        if let Some(url) = &self.tarball {
            dist["tarball"] = serde_json::Value::String(url.clone());
        }
        record["dist"] = dist;

        let mut versions = serde_json::Map::new();
        for extra in &self.extra_versions {
            versions.insert(
                extra.clone(),
                serde_json::json!({ "name": self.name, "version": extra }),
            );
        }
        versions.insert(self.version.clone(), record);

        serde_json::json!({
            "name": self.name,
            "dist-tags": { "latest": self.version },
            "versions": versions,
        })
    }

    /// Render the document as JSON bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}
