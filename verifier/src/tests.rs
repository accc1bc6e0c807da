//! Tests for the verifier CLI entrypoint.

use super::*;
use camino::Utf8PathBuf;
use provenance_verifier::descriptor::DescriptorError;
use provenance_verifier::test_utils::{
    ExpectedCall, RegistryDocument, StubExecutor, StubHttpClient, npm_tarball,
};
use rstest::{fixture, rstest};
use std::path::PathBuf;
use tempfile::TempDir;

const REGISTRY: &str = "https://registry.test";
const TARBALL_URL: &str = "https://registry.test/widget/-/widget-1.0.0.tgz";
const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

/// Config directory that may not exist.
struct FixedConfigDir(Option<PathBuf>);

impl ConfigDirs for FixedConfigDir {
    fn config_dir(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

struct Sandbox {
    _dir: TempDir,
    root: Utf8PathBuf,
    allocator: TempDirAllocator,
}

#[fixture]
fn sandbox() -> Sandbox {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
    let workspaces = root.join("workspaces");
    std::fs::create_dir(&workspaces).expect("create workspaces dir");
    Sandbox {
        _dir: dir,
        allocator: TempDirAllocator::within(workspaces),
        root,
    }
}

fn cli_for(descriptor: &str) -> Cli {
    Cli {
        descriptor: descriptor.to_owned(),
        registry: Some(REGISTRY.to_owned()),
        quiet: true,
        ..Cli::default()
    }
}

fn published() -> Vec<u8> {
    npm_tarball(&[("package.json", b"{}"), ("index.js", b"exports.ok = true;\n")])
}

fn passing_executor() -> StubExecutor {
    let tarball = published();
    StubExecutor::new(vec![
        ExpectedCall::succeeds("git", &["init", "--quiet"], ""),
        ExpectedCall::succeeds(
            "git",
            &["remote", "add", "origin", "https://github.com/acme/widget"],
            "",
        ),
        ExpectedCall::succeeds("git", &["fetch", "--depth", "1", "origin", SHA], ""),
        ExpectedCall::succeeds("git", &["checkout", "--quiet", "FETCH_HEAD"], ""),
        ExpectedCall::succeeds("npm", &["pack"], "widget-1.0.0.tgz\n").with_effect(move |cwd| {
            std::fs::write(cwd.join("widget-1.0.0.tgz"), tarball).expect("write artifact");
        }),
    ])
}

fn registry_http() -> StubHttpClient {
    let document = RegistryDocument::new("widget", "1.0.0")
        .git_repository("github:acme/widget")
        .git_head(SHA)
        .tarball(TARBALL_URL);
    StubHttpClient::new()
        .with_body("https://registry.test/widget", document.to_bytes())
        .with_body(TARBALL_URL, published())
}

fn run_captured(cli: &Cli, capabilities: &Capabilities<'_>) -> (Result<bool>, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let result = temp_env::with_vars(
        [("NPM_CONFIG_REGISTRY", None::<&str>), ("npm_config_registry", None)],
        || run(cli, capabilities, &mut stdout, &mut stderr),
    );
    (
        result,
        String::from_utf8(stdout).expect("stdout was not UTF-8"),
        String::from_utf8(stderr).expect("stderr was not UTF-8"),
    )
}

#[test]
fn exit_code_for_run_result_returns_zero_on_success() {
    let mut stderr = Vec::new();
    let exit_code = exit_code_for_run_result(Ok(true), &mut stderr);
    assert_eq!(exit_code, 0);
    assert!(stderr.is_empty());
}

#[test]
fn exit_code_for_run_result_returns_one_on_failed_verification() {
    let mut stderr = Vec::new();
    let exit_code = exit_code_for_run_result(Ok(false), &mut stderr);
    assert_eq!(exit_code, 1);
    assert!(stderr.is_empty());
}

#[test]
fn exit_code_for_run_result_prints_error_and_returns_one() {
    let err = VerifierError::from(DescriptorError::Empty);

    let mut stderr = Vec::new();
    let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
    assert_eq!(exit_code, 1);

    let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
    assert!(stderr_text.contains("package descriptor is empty"));
}

#[rstest]
fn passing_run_prints_human_report(sandbox: Sandbox) {
    let executor = passing_executor();
    let http = registry_http();
    let capabilities = Capabilities {
        executor: &executor,
        http: &http,
        allocator: &sandbox.allocator,
        dirs: &FixedConfigDir(None),
    };

    let (result, stdout, stderr) = run_captured(&cli_for("widget"), &capabilities);

    assert!(result.expect("run succeeds"));
    assert!(stdout.contains("widget@1.0.0: published tarball matches its source"));
    assert!(stderr.is_empty(), "quiet run wrote progress: {stderr}");
    executor.assert_finished();
}

#[rstest]
fn json_run_prints_parseable_report(sandbox: Sandbox) {
    let executor = passing_executor();
    let http = registry_http();
    let capabilities = Capabilities {
        executor: &executor,
        http: &http,
        allocator: &sandbox.allocator,
        dirs: &FixedConfigDir(None),
    };
    let cli = Cli {
        json: true,
        ..cli_for("widget@latest")
    };

    let (result, stdout, _) = run_captured(&cli, &capabilities);

    assert!(result.expect("run succeeds"));
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(value["passed"], serde_json::Value::Bool(true));
    assert_eq!(value["metadata"]["repoUrl"], "https://github.com/acme/widget");
    assert_eq!(value["report"]["transitions"][0]["key"], "registry");
}

#[rstest]
fn progress_lines_go_to_stderr_unless_quiet(sandbox: Sandbox) {
    let executor = passing_executor();
    let http = registry_http();
    let capabilities = Capabilities {
        executor: &executor,
        http: &http,
        allocator: &sandbox.allocator,
        dirs: &FixedConfigDir(None),
    };
    let cli = Cli {
        quiet: false,
        ..cli_for("widget")
    };

    let (_, _, stderr) = run_captured(&cli, &capabilities);

    assert!(stderr.contains("[working] Resolve registry metadata"));
    assert!(stderr.contains("[skipped] Install dependencies: direct pack succeeded"));
}

#[rstest]
fn malformed_descriptor_is_an_error(sandbox: Sandbox) {
    let executor = StubExecutor::new(Vec::new());
    let http = StubHttpClient::new();
    let capabilities = Capabilities {
        executor: &executor,
        http: &http,
        allocator: &sandbox.allocator,
        dirs: &FixedConfigDir(None),
    };

    let (result, stdout, _) = run_captured(&cli_for("@/widget"), &capabilities);

    assert!(matches!(result, Err(VerifierError::Descriptor(_))));
    assert!(stdout.is_empty());
}

#[rstest]
fn broken_config_file_is_an_error(sandbox: Sandbox) {
    let path = sandbox.root.join("config.toml");
    std::fs::write(&path, "colour = \"blue\"\n").expect("write config");
    let executor = StubExecutor::new(Vec::new());
    let http = StubHttpClient::new();
    let capabilities = Capabilities {
        executor: &executor,
        http: &http,
        allocator: &sandbox.allocator,
        dirs: &FixedConfigDir(None),
    };
    let cli = Cli {
        config: Some(path),
        ..cli_for("widget")
    };

    let (result, _, _) = run_captured(&cli, &capabilities);

    assert!(matches!(result, Err(VerifierError::Config(_))));
}

#[rstest]
fn registry_flag_overrides_environment_and_file(sandbox: Sandbox) {
    let config_dir = sandbox.root.join("config");
    std::fs::create_dir(&config_dir).expect("create config dir");
    std::fs::write(
        config_dir.join("config.toml"),
        "registry_url = \"https://from-file.test\"\n",
    )
    .expect("write config");
    let dirs = FixedConfigDir(Some(config_dir.into_std_path_buf()));

    let from_env = temp_env::with_var("NPM_CONFIG_REGISTRY", Some("https://from-env.test"), || {
        let file_only = load_config(&Cli::default(), &dirs).expect("load");
        let flagged = load_config(&cli_for("widget"), &dirs).expect("load");
        (file_only.registry_url, flagged.registry_url)
    });

    assert_eq!(from_env.0, "https://from-env.test");
    assert_eq!(from_env.1, REGISTRY);
}

#[rstest]
#[case::no_timeout(None, false)]
#[case::with_timeout(Some(30), true)]
fn cancellation_deadline_follows_timeout(#[case] timeout: Option<u64>, #[case] has_deadline: bool) {
    let token = cancellation_for(timeout);
    assert_eq!(token.deadline().is_some(), has_deadline);
    assert!(!token.is_cancelled());
}
