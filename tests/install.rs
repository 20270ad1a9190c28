use std::fs;
use std::time::Duration;
use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::{Server, ServerGuard};
use tempfile::tempdir;
use toolver::fetch::digest_bytes;
use toolver::{Catalog, Error, Fetcher, Installer, RetryPolicy, Store, ToolDescriptor};

fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn catalog(server: &ServerGuard, extra: &str) -> Catalog {
    let json = format!(
        r#"{{
            "name": "demo",
            "displayName": "Demo",
            "downloadUrl": "{}/dist/demo-{{version}}.tar.gz",
            "downloadType": "tar.gz",
            "versionRegex": "^\\d+\\.\\d+\\.\\d+$",
            "staticVersions": ["1.2.0", "1.3.0", "0.9.1"],
            "envVars": {{"DEMO_HOME": "."}},
            "pathDirs": ["bin"]
            {}
        }}"#,
        server.url(),
        extra
    );
    let mut catalog = Catalog::default();
    catalog.insert(ToolDescriptor::from_json("demo", &json).unwrap());
    catalog
}

fn fetcher() -> Fetcher {
    let policy = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(1),
    };
    Fetcher::new(policy, Duration::from_secs(10)).unwrap()
}

#[test]
fn test_install_resolves_partial_and_strips_root() {
    let archive = tarball(&[
        ("demo-1.3.0/bin/demo", b"#!/bin/sh\necho demo\n"),
        ("demo-1.3.0/README", b"demo"),
    ]);
    let mut server = Server::new();
    let download = server
        .mock("GET", "/dist/demo-1.3.0.tar.gz")
        .with_status(200)
        .with_body(&archive)
        .expect(1)
        .create();

    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, "");
    let fetcher = fetcher();
    let installed = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "1")
        .unwrap();

    download.assert();
    assert_eq!(installed.version.key(), "1.3.0");
    assert_eq!(installed.path, root.path().join("demo").join("1.3.0"));
    assert!(installed.path.join("bin").join("demo").is_file());
    assert!(installed.path.join("README").is_file());
    assert!(installed.warnings.is_empty());
    assert_eq!(store.list_installed("demo").unwrap(), vec!["1.3.0"]);
    assert_eq!(fs::read_dir(store.downloads_dir()).unwrap().count(), 0);
}

#[test]
fn test_install_refuses_existing_version() {
    let server = Server::new();
    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    fs::create_dir_all(store.version_dir("demo", "1.2.0")).unwrap();

    let catalog = catalog(&server, "");
    let fetcher = fetcher();
    let err = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "1.2.0")
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyInstalled { .. }));
}

#[test]
fn test_corrupt_archive_leaves_nothing_addressable() {
    let mut server = Server::new();
    server
        .mock("GET", "/dist/demo-1.2.0.tar.gz")
        .with_status(200)
        .with_body("not a gzip stream")
        .create();

    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, "");
    let fetcher = fetcher();
    let err = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "1.2.0")
        .unwrap_err();

    assert!(matches!(err, Error::ExtractionFailure { .. }), "{err}");
    assert!(!store.version_dir("demo", "1.2.0").exists());
    let leftovers: Vec<_> = fs::read_dir(store.tool_dir("demo"))
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert!(leftovers.is_empty());
    assert!(store.list_installed("demo").unwrap().is_empty());
}

#[test]
fn test_invalid_version_is_rejected_before_download() {
    let server = Server::new();
    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, "");
    let fetcher = fetcher();
    let err = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "latest-nightly")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidExpression { .. }), "{err}");
    assert!(!store.tool_dir("demo").exists());
}

#[test]
fn test_checksum_is_verified() {
    let archive = tarball(&[("demo/bin/demo", b"demo")]);
    let mut server = Server::new();
    server
        .mock("GET", "/dist/demo-0.9.1.tar.gz")
        .with_status(200)
        .with_body(&archive)
        .create();
    server
        .mock("GET", "/dist/demo-0.9.1.tar.gz.sha256")
        .with_status(200)
        .with_body(format!("{}  demo-0.9.1.tar.gz\n", digest_bytes(&archive)))
        .create();

    let extra = format!(
        r#", "checksumUrl": "{}/dist/demo-{{version}}.tar.gz.sha256""#,
        server.url()
    );
    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, &extra);
    let fetcher = fetcher();
    let installed = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "0.9.1")
        .unwrap();
    assert_eq!(installed.fetch.digest, digest_bytes(&archive));
}

#[test]
fn test_unavailable_checksum_fails_install() {
    let mut server = Server::new();
    let download = server
        .mock("GET", "/dist/demo-0.9.1.tar.gz")
        .with_status(200)
        .with_body(tarball(&[("demo/bin/demo", b"demo")]))
        .expect(0)
        .create();
    server
        .mock("GET", "/dist/demo-0.9.1.tar.gz.sha256")
        .with_status(404)
        .create();

    let extra = format!(
        r#", "checksumUrl": "{}/dist/demo-{{version}}.tar.gz.sha256""#,
        server.url()
    );
    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, &extra);
    let fetcher = fetcher();
    let err = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "0.9.1")
        .unwrap_err();

    download.assert();
    assert!(matches!(err, Error::ChecksumUnavailable { .. }), "{err}");
    assert!(err.to_string().contains("--skip-checksum"));
    assert!(!store.tool_dir("demo").exists());
}

#[test]
fn test_garbled_checksum_fails_install() {
    let mut server = Server::new();
    server
        .mock("GET", "/dist/demo-0.9.1.tar.gz.sha256")
        .with_status(200)
        .with_body("<html>moved</html>")
        .create();

    let extra = format!(
        r#", "checksumUrl": "{}/dist/demo-{{version}}.tar.gz.sha256""#,
        server.url()
    );
    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, &extra);
    let fetcher = fetcher();
    let err = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "0.9.1")
        .unwrap_err();
    assert!(matches!(err, Error::ChecksumUnavailable { .. }), "{err}");
    assert!(store.list_installed("demo").unwrap().is_empty());
}

#[test]
fn test_skip_checksum_installs_with_warning() {
    let mut server = Server::new();
    server
        .mock("GET", "/dist/demo-0.9.1.tar.gz")
        .with_status(200)
        .with_body(tarball(&[("demo/bin/demo", b"demo")]))
        .create();
    let checksum = server
        .mock("GET", "/dist/demo-0.9.1.tar.gz.sha256")
        .expect(0)
        .create();

    let extra = format!(
        r#", "checksumUrl": "{}/dist/demo-{{version}}.tar.gz.sha256""#,
        server.url()
    );
    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, &extra);
    let fetcher = fetcher();
    let installed = Installer::new(&store, &catalog, &fetcher)
        .with_skip_checksum(true)
        .install("demo", "0.9.1")
        .unwrap();

    checksum.assert();
    assert!(installed.path.join("bin").join("demo").is_file());
    assert!(installed.warnings[0].contains("Skipping checksum verification"));
}

#[cfg(unix)]
#[test]
fn test_installed_directory_is_world_readable() {
    use std::os::unix::fs::PermissionsExt;

    let mut server = Server::new();
    server
        .mock("GET", "/dist/demo-1.2.0.tar.gz")
        .with_status(200)
        .with_body(tarball(&[("demo/bin/demo", b"demo")]))
        .create();

    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, "");
    let fetcher = fetcher();
    let installed = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "1.2.0")
        .unwrap();

    let mode = fs::metadata(&installed.path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn test_missing_dependency_is_a_warning() {
    let archive = tarball(&[("demo/bin/demo", b"demo")]);
    let mut server = Server::new();
    server
        .mock("GET", "/dist/demo-1.2.0.tar.gz")
        .with_status(200)
        .with_body(&archive)
        .create();

    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    let catalog = catalog(&server, r#", "dependencies": ["java"]"#);
    let fetcher = fetcher();
    let installed = Installer::new(&store, &catalog, &fetcher)
        .install("demo", "1.2.0")
        .unwrap();

    assert_eq!(installed.warnings.len(), 1);
    assert!(installed.warnings[0].contains("toolver install java"));
}

#[cfg(unix)]
#[test]
fn test_uninstall_active_version_removes_alias() {
    use toolver::{Activator, ResolvedVersion, Scope};

    let server = Server::new();
    let root = tempdir().unwrap();
    let store = Store::new(root.path());
    fs::create_dir_all(store.version_dir("demo", "1.2.0").join("bin")).unwrap();
    fs::create_dir_all(store.version_dir("demo", "1.3.0").join("bin")).unwrap();

    let catalog = catalog(&server, "");
    let demo = catalog.get("demo").unwrap();
    Activator::new(&store, &catalog)
        .activate(demo, &ResolvedVersion::new("1.3.0", None), Scope::Session)
        .unwrap();

    let fetcher = fetcher();
    let installer = Installer::new(&store, &catalog, &fetcher);
    installer.uninstall("demo", "1.3.0").unwrap();

    assert!(store.current("demo").is_none());
    assert!(fs::symlink_metadata(store.current_path("demo")).is_err());
    assert_eq!(store.list_installed("demo").unwrap(), vec!["1.2.0"]);
    assert!(matches!(
        installer.uninstall("demo", "1.3.0"),
        Err(Error::NotInstalled { .. })
    ));
}
