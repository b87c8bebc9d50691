use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::{AccountConfig, Config};
use crate::error::ConfigError;

/// Which configuration section an account came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Organization,
    User,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Organization => "organization",
            AccountKind::User => "user",
        }
    }
}

/// Stable key of an account: its kind plus its configuration label
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId {
    pub kind: AccountKind,
    pub label: String,
}

impl AccountId {
    pub fn new(kind: AccountKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AccountKind::Organization => write!(f, "organizations/{}", self.label),
            AccountKind::User => write!(f, "users/{}", self.label),
        }
    }
}

/// Secret credential. Never printed, not even through `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Raw token value, for building the Authorization header only
    pub fn expose(&self) -> &str {
        self.0.trim()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Organization repository type filter (`type=` query parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoType {
    All,
    Public,
    Private,
    Forks,
    Sources,
    Member,
}

const REPO_TYPES: &str = "all, public, private, forks, sources, member";

impl RepoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::All => "all",
            RepoType::Public => "public",
            RepoType::Private => "private",
            RepoType::Forks => "forks",
            RepoType::Sources => "sources",
            RepoType::Member => "member",
        }
    }
}

impl FromStr for RepoType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(RepoType::All),
            "public" => Ok(RepoType::Public),
            "private" => Ok(RepoType::Private),
            "forks" => Ok(RepoType::Forks),
            "sources" => Ok(RepoType::Sources),
            "member" => Ok(RepoType::Member),
            _ => Err(ConfigError::UnsupportedOption {
                kind: AccountKind::Organization.as_str(),
                option: s.to_string(),
                allowed: REPO_TYPES,
            }),
        }
    }
}

/// User affiliation filter (`affiliation=` query parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    Owner,
    Collaborator,
    OrganizationMember,
}

const AFFILIATIONS: &str = "owner, collaborator, organization_member";

impl Affiliation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Affiliation::Owner => "owner",
            Affiliation::Collaborator => "collaborator",
            Affiliation::OrganizationMember => "organization_member",
        }
    }
}

impl FromStr for Affiliation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Affiliation::Owner),
            "collaborator" => Ok(Affiliation::Collaborator),
            "organization_member" => Ok(Affiliation::OrganizationMember),
            _ => Err(ConfigError::UnsupportedOption {
                kind: AccountKind::User.as_str(),
                option: s.to_string(),
                allowed: AFFILIATIONS,
            }),
        }
    }
}

/// Listing mode of an account, already validated for its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoQuery {
    Type(RepoType),
    Affiliation(Vec<Affiliation>),
}

impl RepoQuery {
    /// Query parameter name and value sent to GitHub
    pub fn query_pair(&self) -> (&'static str, String) {
        match self {
            RepoQuery::Type(repo_type) => ("type", repo_type.as_str().to_string()),
            RepoQuery::Affiliation(affiliations) => (
                "affiliation",
                affiliations
                    .iter()
                    .map(Affiliation::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

/// Immutable credential and query policy for one organization or user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSpec {
    pub id: AccountId,
    pub identity: String,
    pub token: Token,
    pub query: RepoQuery,
    pub validate_name: bool,
    pub backup_enabled: bool,
}

impl AccountSpec {
    /// Build a spec from one configuration entry whose token has already been resolved.
    ///
    /// An empty `option` falls back to `default_repo_type` for organizations and to
    /// `owner` for users.
    pub fn from_entry(
        id: AccountId,
        entry: &AccountConfig,
        token: Token,
        default_repo_type: RepoType,
    ) -> Result<Self, ConfigError> {
        if entry.backup_repos && token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }

        let option = entry.option.trim();
        let query = match id.kind {
            AccountKind::Organization if option.is_empty() => RepoQuery::Type(default_repo_type),
            AccountKind::Organization => RepoQuery::Type(option.parse()?),
            AccountKind::User if option.is_empty() => {
                RepoQuery::Affiliation(vec![Affiliation::Owner])
            }
            AccountKind::User => RepoQuery::Affiliation(
                option
                    .split(',')
                    .map(str::parse::<Affiliation>)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        Ok(Self {
            id,
            identity: entry.name.trim().to_string(),
            token,
            query,
            validate_name: entry.validate_name,
            backup_enabled: entry.backup_repos,
        })
    }

    pub fn kind(&self) -> AccountKind {
        self.id.kind
    }
}

/// An entry that could not be turned into an [`AccountSpec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAccount {
    pub id: AccountId,
    pub error: ConfigError,
}

/// Every account known to the process, in configuration order
/// (organizations first, then users, each sorted by label).
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub accounts: Vec<AccountSpec>,
    pub rejected: Vec<RejectedAccount>,
    /// Entries with `backup_repos: false`; never validated or enumerated
    pub disabled: Vec<AccountId>,
}

impl Roster {
    /// Build the roster from configuration. Invalid enabled entries are rejected
    /// individually; disabled entries are skipped without looking at token or option.
    pub fn from_config(config: &Config) -> Self {
        let default_repo_type = config.org_repo_type.parse().unwrap_or_else(|e| {
            warn!("Ignoring org_repo_type: {}; falling back to 'all'", e);
            RepoType::All
        });

        let sections = [
            (AccountKind::Organization, &config.organizations),
            (AccountKind::User, &config.users),
        ];

        let mut roster = Roster::default();

        for (kind, entries) in sections {
            for (label, entry) in entries {
                let id = AccountId::new(kind, label.clone());

                if !entry.backup_repos {
                    info!("Account {} has backup disabled, skipping", id);
                    roster.disabled.push(id);
                    continue;
                }

                let built = resolve_token(&entry.token).and_then(|token| {
                    AccountSpec::from_entry(id.clone(), entry, token, default_repo_type)
                });

                match built {
                    Ok(spec) => {
                        debug!("Account {} ({}) enabled", spec.id, spec.identity);
                        roster.accounts.push(spec);
                    }
                    Err(error) => {
                        warn!("Excluding account {}: {}", id, error);
                        roster.rejected.push(RejectedAccount { id, error });
                    }
                }
            }
        }

        roster
    }

    /// Accounts that take part in scheduled enumeration
    pub fn enabled(&self) -> impl Iterator<Item = &AccountSpec> {
        self.accounts.iter().filter(|account| account.backup_enabled)
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }
}

/// Expand `$VAR` / `${VAR}` references in a configured token
fn resolve_token(raw: &str) -> Result<Token, ConfigError> {
    shellexpand::env(raw)
        .map(|expanded| Token::new(expanded.into_owned()))
        .map_err(|e| ConfigError::UnresolvedToken(e.var_name))
}
