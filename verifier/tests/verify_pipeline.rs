//! Workspace lifecycle across the outcomes of a verification run.

use camino::Utf8PathBuf;
use provenance_verifier::cancel::CancellationToken;
use provenance_verifier::config::VerifierConfig;
use provenance_verifier::progress::{StageKey, StageStatus};
use provenance_verifier::test_utils::{
    ExpectedCall, RegistryDocument, StubExecutor, StubHttpClient, npm_tarball,
};
use provenance_verifier::verifier::Verifier;
use provenance_verifier::workspace::TempDirAllocator;
use rstest::rstest;

const TARBALL_URL: &str = "https://registry.test/widget/-/widget-1.0.0.tgz";
const REPO_URL: &str = "https://github.com/acme/widget.git";
const SHA: &str = "fedcba9876543210fedcba9876543210fedcba98";
const ARTIFACT: &str = "widget-1.0.0.tgz";

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Matches,
    CheckoutFails,
    InstallFails,
    CompareFails,
}

fn published_files() -> [(&'static str, &'static [u8]); 2] {
    [("package.json", b"{\"name\":\"widget\"}"), ("index.js", b"exports.answer = 42;\n")]
}

fn pack(files: &[(&str, &[u8])]) -> ExpectedCall {
    let tarball = npm_tarball(files);
    ExpectedCall::succeeds("npm", &["pack"], &format!("{ARTIFACT}\n")).with_effect(move |cwd| {
        std::fs::write(cwd.join(ARTIFACT), tarball).expect("write artifact");
    })
}

fn calls_for(outcome: Outcome) -> Vec<ExpectedCall> {
    let mut calls = vec![
        ExpectedCall::succeeds("git", &["init", "--quiet"], ""),
        ExpectedCall::succeeds("git", &["remote", "add", "origin", REPO_URL], ""),
    ];
    if let Outcome::CheckoutFails = outcome {
        calls.push(ExpectedCall::fails(
            "git",
            &["fetch", "--depth", "1", "origin", SHA],
            "fatal: remote error: upload-pack: not our ref",
        ));
        return calls;
    }
    calls.extend([
        ExpectedCall::succeeds("git", &["fetch", "--depth", "1", "origin", SHA], ""),
        ExpectedCall::succeeds("git", &["checkout", "--quiet", "FETCH_HEAD"], ""),
    ]);
    match outcome {
        Outcome::Matches => calls.push(pack(&published_files())),
        Outcome::CompareFails => calls.push(pack(&[("package.json", b"{\"name\":\"widget\"}")])),
        Outcome::InstallFails => calls.extend([
            ExpectedCall::fails("npm", &["pack"], "sh: rollup: command not found"),
            ExpectedCall::succeeds("npm", &["--version"], "9.8.1\n"),
            ExpectedCall::fails("npm", &["ci"], "npm ERR! missing package-lock.json"),
        ]),
        Outcome::CheckoutFails => {}
    }
    calls
}

#[rstest]
#[case::matches(Outcome::Matches, None)]
#[case::checkout_fails(Outcome::CheckoutFails, Some(StageKey::Checkout))]
#[case::install_fails(Outcome::InstallFails, Some(StageKey::Install))]
#[case::compare_fails(Outcome::CompareFails, Some(StageKey::Compare))]
fn workspace_is_removed_after_every_outcome(
    #[case] outcome: Outcome,
    #[case] failed: Option<StageKey>,
) {
    let parent = tempfile::tempdir().expect("temp dir");
    let parent_path = Utf8PathBuf::from_path_buf(parent.path().to_path_buf()).expect("utf-8 path");
    let document = RegistryDocument::new("widget", "1.0.0")
        .git_repository("git+https://github.com/acme/widget.git")
        .git_head(SHA)
        .tarball(TARBALL_URL);
    let http = StubHttpClient::new()
        .with_body("https://registry.test/widget", document.to_bytes())
        .with_body(TARBALL_URL, npm_tarball(&published_files()));
    let executor = StubExecutor::new(calls_for(outcome));
    let allocator = TempDirAllocator::within(parent_path);
    let config = VerifierConfig {
        registry_url: "https://registry.test".to_owned(),
        ..VerifierConfig::default()
    };

    let verification = Verifier::new(&executor, &http, &allocator, &config)
        .verify_str("widget@1.0.0", &CancellationToken::new())
        .expect("verification runs");

    executor.assert_finished();
    assert_eq!(executor.working_dirs().len(), 1, "one workspace per run");
    assert_eq!(verification.passed, failed.is_none());
    if let Some(key) = failed {
        assert_eq!(verification.report.stage(key).status, StageStatus::Fail);
    }
    let leftovers = std::fs::read_dir(parent.path()).expect("read parent").count();
    assert_eq!(leftovers, 0, "workspace was not removed");
}
