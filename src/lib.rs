//! repoharvest - Scheduled GitHub Repository Enumeration
//!
//! repoharvest lists the repositories of a set of GitHub organizations and users, each
//! with its own token and listing options, on a cron schedule. Every tick produces a
//! report mapping each account to its repository names or to the error it hit, ready
//! for a backup step to consume.
//!
//! ## Core Features
//!
//! - **Per-account credentials**: every request carries only its own account's token
//! - **Organization and user listings**: `type=` and `affiliation=` filters per account
//! - **Failure isolation**: one account's error never affects another's result
//! - **Non-overlapping schedule**: ticks that come due mid-run are skipped
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`account`]: Account specs and the roster built from configuration
//! - [`github`]: GitHub REST enumeration
//! - [`scheduler`]: Periodic fan-out across accounts
//! - [`report`]: Per-tick aggregation

pub mod account;
pub mod config;
pub mod discovery;
pub mod error;
pub mod github;
pub mod report;
pub mod scheduler;

pub use account::{AccountId, AccountKind, AccountSpec, Roster};
pub use config::Config;
pub use discovery::RepositorySource;
pub use error::{ConfigError, EnumerationError, ErrorKind};
pub use github::GitHubEnumerator;
pub use report::{EnumerationResult, ResultAggregator, TickOutcome, TickReport};
pub use scheduler::{Scheduler, SchedulerStatus, ShutdownHandle};
