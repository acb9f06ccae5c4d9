use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use docmark::config::{load_config, ArtifactNaming};

fn write_config(body: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("docmark.toml");
    fs::write(&path, body).unwrap();
    (tmp, path)
}

const MINIMAL: &str = r#"
[search]
endpoint = "https://acme.search.windows.net"
index = "documents"

[storage]
bucket = "documents"
"#;

#[test]
fn minimal_config_gets_defaults() {
    let (_tmp, path) = write_config(MINIMAL);
    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.server.bind, "127.0.0.1:5002");
    assert_eq!(cfg.search.top, 50);
    assert_eq!(cfg.search.timeout_secs, 30);
    assert_eq!(cfg.search.api_version, "2023-11-01");
    assert_eq!(cfg.storage.region, "us-east-1");
    assert_eq!(cfg.storage.endpoint_url, None);
    assert_eq!(cfg.storage.artifact_naming, ArtifactNaming::PerDocument);
    assert_eq!(cfg.storage.url_ttl_secs, 3600);
    assert!(cfg.auth.users.is_empty());
}

#[test]
fn full_config_parses() {
    let (_tmp, path) = write_config(
        r#"
[server]
bind = "0.0.0.0:8080"

[search]
endpoint = "https://acme.search.windows.net"
index = "documents"
top = 20

[storage]
bucket = "documents"
region = "eu-central-1"
endpoint_url = "http://localhost:9000"
artifact_naming = "per_query"
url_ttl_secs = 600

[[auth.users]]
username = "admin"
password_env = "ADMIN_PASSWORD"

[[auth.users]]
username = "viewer"
password_env = "VIEWER_PASSWORD"
"#,
    );
    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.server.bind, "0.0.0.0:8080");
    assert_eq!(cfg.search.top, 20);
    assert_eq!(cfg.storage.artifact_naming, ArtifactNaming::PerQuery);
    assert_eq!(cfg.storage.url_ttl_secs, 600);
    assert_eq!(cfg.auth.users.len(), 2);
    assert_eq!(cfg.auth.users[1].password_env, "VIEWER_PASSWORD");
}

#[test]
fn rejects_out_of_range_ttl() {
    let (_tmp, path) = write_config(&format!("{}url_ttl_secs = 0\n", MINIMAL));
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("url_ttl_secs"));

    let (_tmp, path) = write_config(&format!("{}url_ttl_secs = 604801\n", MINIMAL));
    assert!(load_config(&path).is_err());
}

#[test]
fn rejects_duplicate_users() {
    let (_tmp, path) = write_config(&format!(
        "{}\n[[auth.users]]\nusername = \"a\"\npassword_env = \"A\"\n\
         [[auth.users]]\nusername = \"a\"\npassword_env = \"B\"\n",
        MINIMAL
    ));
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn rejects_unknown_naming_scheme() {
    let (_tmp, path) = write_config(&format!("{}artifact_naming = \"per_user\"\n", MINIMAL));
    assert!(load_config(&path).is_err());
}

#[test]
fn missing_file_names_path() {
    let err = load_config(std::path::Path::new("/nonexistent/docmark.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/docmark.toml"));
}
