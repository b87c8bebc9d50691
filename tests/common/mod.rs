//! Common test utilities and helpers for repoharvest tests
use repoharvest::config::AccountConfig;
use repoharvest::{Config, GitHubEnumerator};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub use std::time::Instant;

/// Test configuration helper
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("repoharvest");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        Self {
            temp_dir,
            config_dir,
        }
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.config_dir.join("config.yml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }
}

/// Account entry builder
pub fn account(name: &str, token: &str, option: &str) -> AccountConfig {
    AccountConfig {
        name: name.to_string(),
        token: token.to_string(),
        option: option.to_string(),
        validate_name: false,
        backup_repos: true,
    }
}

/// Configuration with no accounts, pointed at a mock server
pub fn empty_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.organizations.clear();
    config.users.clear();
    config.api.base_url = base_url.to_string();
    config
}

pub fn enumerator(server: &MockServer, timeout: Duration) -> GitHubEnumerator {
    GitHubEnumerator::with_base_url(&server.uri(), timeout).expect("valid mock server URL")
}

/// Repository listing body with the given full names
pub fn repo_list(full_names: &[&str]) -> Value {
    Value::Array(
        full_names
            .iter()
            .enumerate()
            .map(|(id, full_name)| {
                let (owner, name) = full_name.split_once('/').unwrap_or(("", full_name));
                json!({
                    "id": id + 1,
                    "name": name,
                    "full_name": full_name,
                    "owner": { "login": owner },
                    "private": false,
                    "fork": false,
                })
            })
            .collect(),
    )
}

/// Answer `GET /orgs/{org}/repos?type={repo_type}` for requests carrying `token`
pub async fn mount_org(
    server: &MockServer,
    org: &str,
    repo_type: &str,
    token: &str,
    response: ResponseTemplate,
) {
    Mock::given(method("GET"))
        .and(path(format!("/orgs/{}/repos", org)))
        .and(query_param("type", repo_type))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

/// Answer `GET /user/repos?affiliation={affiliation}` for requests carrying `token`
pub async fn mount_user(
    server: &MockServer,
    affiliation: &str,
    token: &str,
    response: ResponseTemplate,
) {
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("affiliation", affiliation))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

pub fn ok_json(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}
