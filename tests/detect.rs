use std::fs;
use tempfile::tempdir;
use toolver::{Catalog, Detector};

fn detector() -> Detector {
    Detector::from_catalog(&Catalog::builtin().unwrap())
}

#[test]
fn test_nearest_declaration_wins() {
    let dir = tempdir().unwrap();
    let child = dir.path().join("services").join("api");
    fs::create_dir_all(&child).unwrap();
    fs::write(dir.path().join(".nvmrc"), "18.19.0\n").unwrap();
    fs::write(child.join(".nvmrc"), "v20.10.0\n").unwrap();

    let found = detector().detect_one(&child, "node").unwrap();
    assert_eq!(found.version, "20.10.0");
    assert_eq!(found.source, fs::canonicalize(child.join(".nvmrc")).unwrap());

    let from_root = detector().detect_one(dir.path(), "node").unwrap();
    assert_eq!(from_root.version, "18.19.0");
}

#[test]
fn test_go_mod_found_from_subdirectory() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("go.mod"),
        "module example.com/svc\n\ngo 1.21\n\nrequire github.com/pkg/errors v0.9.1\n",
    )
    .unwrap();
    let sub = dir.path().join("internal").join("handlers");
    fs::create_dir_all(&sub).unwrap();

    let found = detector().detect_one(&sub, "go").unwrap();
    assert_eq!(found.tool, "go");
    assert_eq!(found.version, "1.21");
}

#[test]
fn test_detect_all_reports_each_tool_once() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(".sdkmanrc"), "java=21.0.2-tem\ngradle=8.5\n").unwrap();
    fs::write(dir.path().join(".node-version"), "20.10.0").unwrap();
    fs::write(
        dir.path().join("rust-toolchain.toml"),
        "[toolchain]\nchannel = \"1.75.0\"\n",
    )
    .unwrap();
    fs::write(dir.path().join(".python-version"), "3.12.1\n").unwrap();

    let mut found: Vec<(String, String)> = detector()
        .detect_all(dir.path())
        .into_iter()
        .map(|d| (d.tool, d.version))
        .collect();
    found.sort();

    assert_eq!(
        found,
        vec![
            ("java".to_string(), "21".to_string()),
            ("node".to_string(), "20.10.0".to_string()),
            ("python".to_string(), "3.12.1".to_string()),
            ("rust".to_string(), "1.75.0".to_string()),
        ]
    );
}

#[test]
fn test_global_json_with_custom_tool() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("global.json"),
        r#"{ "sdk": { "version": "8.0.100" } }"#,
    )
    .unwrap();

    let detector = Detector::new().with_tool("dotnet", &["global.json"]);
    let found = detector.detect_one(dir.path(), "dotnet").unwrap();
    assert_eq!(found.version, "8.0.100");
}

#[test]
fn test_builtin_dotnet_and_ruby_declarations() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("global.json"),
        r#"{ "sdk": { "version": "8.0.100", "rollForward": "latestFeature" } }"#,
    )
    .unwrap();
    fs::write(dir.path().join(".ruby-version"), "3.2.2\n").unwrap();
    let sub = dir.path().join("src").join("Api");
    fs::create_dir_all(&sub).unwrap();

    assert_eq!(detector().detect_one(&sub, "dotnet").unwrap().version, "8.0.100");
    assert_eq!(detector().detect_one(&sub, "ruby").unwrap().version, "3.2.2");
}

#[test]
fn test_empty_directory_detects_nothing() {
    let dir = tempdir().unwrap();
    let detector = Detector::new().with_tool("node", &[".nvmrc"]);
    assert!(detector.detect_all(dir.path()).is_empty());
}
