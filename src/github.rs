use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::{Client, Request, Url};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::account::{AccountKind, AccountSpec};
use crate::config::ApiConfig;
use crate::discovery::RepositorySource;
use crate::error::EnumerationError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";
const MAX_LOGIN_LEN: usize = 39;

/// GitHub REST client that lists repositories one account at a time.
///
/// The underlying HTTP client holds no credentials; every request gets the bearer
/// token of the account it was built for.
#[derive(Clone)]
pub struct GitHubEnumerator {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

/// The only part of a repository object we consume
#[derive(Debug, Deserialize)]
struct RepositoryEntry {
    #[serde(default)]
    full_name: Option<FullName>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FullName {
    Text(String),
    Other(serde_json::Value),
}

impl GitHubEnumerator {
    /// Create an enumerator from the API section of the configuration
    pub fn new(api: &ApiConfig) -> Result<Self> {
        Self::with_base_url(&api.base_url, api.timeout_duration())
    }

    /// Create an enumerator against an arbitrary API root (GitHub Enterprise, tests)
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Listing URL for an account: `/orgs/{identity}/repos?type=..` or `/user/repos?affiliation=..`
    pub fn repos_url(&self, account: &AccountSpec) -> Result<Url, EnumerationError> {
        let mut url = self.base_url.clone();

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                EnumerationError::RequestBuild(format!(
                    "API base URL cannot carry a path: {}",
                    self.base_url
                ))
            })?;
            segments.pop_if_empty();

            match account.kind() {
                AccountKind::Organization => {
                    if !is_valid_login(&account.identity) {
                        return Err(EnumerationError::RequestBuild(format!(
                            "'{}' is not a valid organization login",
                            account.identity
                        )));
                    }
                    segments.extend(["orgs", account.identity.as_str(), "repos"]);
                }
                AccountKind::User => {
                    segments.extend(["user", "repos"]);
                }
            }
        }

        let (key, value) = account.query.query_pair();
        url.query_pairs_mut().append_pair(key, &value);

        Ok(url)
    }

    /// Build the authenticated listing request for exactly this account
    pub fn build_request(&self, account: &AccountSpec) -> Result<Request, EnumerationError> {
        let url = self.repos_url(account)?;

        self.client
            .get(url)
            .bearer_auth(account.token.expose())
            .header(ACCEPT, GITHUB_JSON)
            .build()
            .map_err(|e| EnumerationError::RequestBuild(e.to_string()))
    }

    fn classify(&self, error: reqwest::Error) -> EnumerationError {
        if error.is_timeout() {
            EnumerationError::Timeout(self.timeout)
        } else if error.is_builder() {
            EnumerationError::RequestBuild(error.to_string())
        } else {
            EnumerationError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl RepositorySource for GitHubEnumerator {
    async fn list_repositories(
        &self,
        account: &AccountSpec,
    ) -> Result<Vec<String>, EnumerationError> {
        let request = self.build_request(account)?;

        let (key, value) = account.query.query_pair();
        info!("Listing repositories for {} using {}={}", account.id, key, value);

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            warn!("GitHub returned HTTP {} for {}", status.as_u16(), account.id);
            debug!("Error body for {}: {}", account.id, body);
            return Err(EnumerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let repositories = parse_repositories(account, &body)?;

        info!("Found {} repositories for {}", repositories.len(), account.id);
        Ok(repositories)
    }

    fn provider_name(&self) -> &'static str {
        "GitHub"
    }
}

/// Decode a repository listing body, keeping response order.
///
/// Entries without a string `full_name` are skipped; with `validate_name` set, so are
/// entries whose full name does not contain the account identity.
pub fn parse_repositories(
    account: &AccountSpec,
    body: &str,
) -> Result<Vec<String>, EnumerationError> {
    let entries: Vec<RepositoryEntry> =
        serde_json::from_str(body).map_err(|e| EnumerationError::Parse(e.to_string()))?;

    let mut names = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let full_name = match entry.full_name {
            Some(FullName::Text(name)) => name,
            Some(FullName::Other(value)) => {
                warn!(
                    "Skipping entry {} for {}: full_name is not a string ({})",
                    index, account.id, value
                );
                continue;
            }
            None => {
                warn!(
                    "Skipping entry {} for {}: full_name is missing",
                    index, account.id
                );
                continue;
            }
        };

        if account.validate_name && !full_name.contains(&account.identity) {
            debug!(
                "Excluding {} for {}: name does not contain '{}'",
                full_name, account.id, account.identity
            );
            continue;
        }

        names.push(full_name);
    }

    Ok(names)
}

/// GitHub logins: alphanumerics separated by single hyphens, at most 39 characters
fn is_valid_login(login: &str) -> bool {
    static LOGIN_RE: OnceLock<Regex> = OnceLock::new();
    let re = LOGIN_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*$").expect("valid regex"));

    login.len() <= MAX_LOGIN_LEN && re.is_match(login)
}
