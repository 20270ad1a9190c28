use std::fs;
use std::time::Duration;
use mockito::{Matcher, Server};
use tempfile::tempdir;
use toolver::fetch::{digest_bytes, partial_path};
use toolver::{Error, Fetcher, RetryPolicy, ToolDescriptor};

fn fast_fetcher(max_retries: u32) -> Fetcher {
    let policy = RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
    };
    Fetcher::new(policy, Duration::from_secs(10)).unwrap()
}

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_server_error_uses_every_attempt() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/tool.tar.gz")
        .with_status(500)
        .expect(4)
        .create();

    let dir = tempdir().unwrap();
    let dest = dir.path().join("tool.tar.gz");
    let err = fast_fetcher(3)
        .fetch(&format!("{}/tool.tar.gz", server.url()), &dest, None)
        .unwrap_err();

    mock.assert();
    match err {
        Error::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*source, Error::Transport { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.exists());
}

#[test]
fn test_not_found_is_not_retried() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/missing.zip")
        .with_status(404)
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    let err = fast_fetcher(3)
        .fetch(&format!("{}/missing.zip", server.url()), &dir.path().join("missing.zip"), None)
        .unwrap_err();

    mock.assert();
    assert!(matches!(err, Error::FatalHttp { status: 404, .. }));
}

#[test]
fn test_too_many_requests_is_retried() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/busy.zip")
        .with_status(429)
        .expect(2)
        .create();

    let dir = tempdir().unwrap();
    let err = fast_fetcher(1)
        .fetch(&format!("{}/busy.zip", server.url()), &dir.path().join("busy.zip"), None)
        .unwrap_err();

    mock.assert();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));
}

#[test]
fn test_download_verifies_digest() {
    let content = body(10_000);
    let mut server = Server::new();
    server
        .mock("GET", "/node.tar.gz")
        .with_status(200)
        .with_body(&content)
        .create();

    let dir = tempdir().unwrap();
    let dest = dir.path().join("node.tar.gz");
    let expected = digest_bytes(&content).to_uppercase();
    let result = fast_fetcher(0)
        .fetch(&format!("{}/node.tar.gz", server.url()), &dest, Some(&expected))
        .unwrap();

    assert_eq!(result.bytes_written, 10_000);
    assert_eq!(result.attempts_used, 1);
    assert!(!result.resumed);
    assert_eq!(result.digest, digest_bytes(&content));
    assert_eq!(fs::read(&dest).unwrap(), content);
    assert!(!partial_path(&dest).exists());
}

#[test]
fn test_digest_mismatch_deletes_partial_and_retries() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/go.tar.gz")
        .with_status(200)
        .with_body("tampered")
        .expect(3)
        .create();

    let dir = tempdir().unwrap();
    let dest = dir.path().join("go.tar.gz");
    let err = fast_fetcher(2)
        .fetch(&format!("{}/go.tar.gz", server.url()), &dest, Some(&"0".repeat(64)))
        .unwrap_err();

    mock.assert();
    match err {
        Error::RetriesExhausted { source, .. } => {
            assert!(matches!(*source, Error::DigestMismatch { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.exists());
    assert!(!partial_path(&dest).exists());
}

#[test]
fn test_resumed_download_is_byte_identical() {
    let content = body(4096);
    let split = 1500;
    let mut server = Server::new();
    server
        .mock("GET", "/jdk.zip")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_body(&content)
        .create();
    let resumed = server
        .mock("GET", "/jdk.zip")
        .match_header("range", format!("bytes={}-", split).as_str())
        .with_status(206)
        .with_body(&content[split..])
        .expect(1)
        .create();

    let url = format!("{}/jdk.zip", server.url());
    let fetcher = fast_fetcher(0);
    let dir = tempdir().unwrap();

    let single = dir.path().join("single.zip");
    fetcher.fetch(&url, &single, None).unwrap();

    let interrupted = dir.path().join("interrupted.zip");
    fs::write(partial_path(&interrupted), &content[..split]).unwrap();
    let result = fetcher
        .fetch(&url, &interrupted, Some(&digest_bytes(&content)))
        .unwrap();

    resumed.assert();
    assert!(result.resumed);
    assert_eq!(result.digest, digest_bytes(&content));
    assert_eq!(fs::read(&interrupted).unwrap(), fs::read(&single).unwrap());
}

#[test]
fn test_unsatisfiable_range_restarts_from_scratch() {
    let content = body(2048);
    let mut server = Server::new();
    let rejected = server
        .mock("GET", "/gradle.zip")
        .match_header("range", Matcher::Regex("^bytes=".to_string()))
        .with_status(416)
        .expect(1)
        .create();
    let fresh = server
        .mock("GET", "/gradle.zip")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_body(&content)
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    let dest = dir.path().join("gradle.zip");
    fs::write(partial_path(&dest), b"stale bytes from another file").unwrap();
    let result = fast_fetcher(0)
        .fetch(&format!("{}/gradle.zip", server.url()), &dest, None)
        .unwrap();

    rejected.assert();
    fresh.assert();
    assert!(!result.resumed);
    assert_eq!(fs::read(&dest).unwrap(), content);
}

#[test]
fn test_checksum_file_formats() {
    let hash = "ab".repeat(32);
    let mut server = Server::new();
    server
        .mock("GET", "/go.tar.gz.sha256")
        .with_status(200)
        .with_body(format!("{}  go1.21.5.linux-amd64.tar.gz\n", hash.to_uppercase()))
        .create();

    let checksum = fast_fetcher(0)
        .fetch_checksum(&format!("{}/go.tar.gz.sha256", server.url()))
        .unwrap();
    assert_eq!(checksum, hash);
}

#[test]
fn test_partial_version_resolves_against_listing() {
    let mut server = Server::new();
    let listing = server
        .mock("GET", "/dist/index.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"version":"v20.9.0"},{"version":"v18.19.0"},{"version":"v20.10.0"}]"#)
        .expect(3)
        .create();

    let json = format!(
        r#"{{
            "name": "node",
            "releasesUrl": "{}/dist/index.json",
            "downloadUrl": "{}/dist/v{{version}}/node-v{{version}}.tar.gz",
            "versionRegex": "^v?\\d+\\.\\d+\\.\\d+$"
        }}"#,
        server.url(),
        server.url()
    );
    let node = ToolDescriptor::from_json("node", &json).unwrap();
    let fetcher = fast_fetcher(0);

    assert_eq!(node.resolve_version("20", &fetcher).unwrap().version, "20.10.0");
    assert_eq!(node.resolve_version("18.19.0", &fetcher).unwrap().version, "18.19.0");
    assert!(matches!(
        node.resolve_version("99.1", &fetcher),
        Err(Error::NotFound { .. })
    ));
    listing.assert();
}

#[test]
fn test_unreachable_listing_passes_complete_versions_through() {
    let json = r#"{
        "name": "go",
        "releasesUrl": "http://127.0.0.1:9/versions.json",
        "downloadUrl": "http://127.0.0.1:9/go{version}.tar.gz"
    }"#;
    let go = ToolDescriptor::from_json("go", json).unwrap();
    let fetcher = fast_fetcher(0);

    assert_eq!(go.resolve_version("1.21.5", &fetcher).unwrap().version, "1.21.5");
    assert!(go.resolve_version("1.21", &fetcher).is_err());
}
