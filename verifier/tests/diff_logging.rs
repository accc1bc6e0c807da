//! Log output emitted while comparing manifests.
//!
//! `logtest` installs a process-wide logger, so this binary holds a single
//! test.

use camino::Utf8PathBuf;
use logtest::Logger;
use provenance_verifier::cancel::CancellationToken;
use provenance_verifier::compare::Comparator;
use provenance_verifier::test_utils::{StubHttpClient, npm_tarball};

const TARBALL_URL: &str = "https://registry.test/widget/-/widget-1.0.0.tgz";

#[test]
fn comparison_logs_summary_and_each_differing_path() {
    let mut logger = Logger::start();

    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
    let local = root.join("widget-1.0.0.tgz");
    std::fs::write(
        &local,
        npm_tarball(&[("package.json", b"{}"), ("index.js", b"patched\n"), ("debug.log", b"x")]),
    )
    .expect("write local tarball");
    let http = StubHttpClient::new().with_body(
        TARBALL_URL,
        npm_tarball(&[
            ("package.json", b"{}"),
            ("index.js", b"original\n"),
            ("README.md", b"# widget\n"),
        ]),
    );
    let cancel = CancellationToken::new();

    let diff = Comparator::new(&http, &cancel)
        .compare(&local, TARBALL_URL)
        .expect("compare");
    assert_eq!(diff.summary(), "1 added, 1 removed, 1 modified");

    let mut messages = Vec::new();
    while let Some(record) = logger.pop() {
        messages.push(record.args().to_string());
    }

    let expected = [
        "comparing 3 rebuilt file(s) with 3 published file(s)",
        "manifest diff: 1 added, 1 removed, 1 modified",
        "  added: debug.log",
        "  removed: README.md",
        "  modified: index.js",
    ];
    for line in expected {
        assert!(
            messages.iter().any(|message| message == line),
            "missing log line '{line}' in {messages:?}"
        );
    }
}
