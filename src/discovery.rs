//! Repository enumeration abstraction layer
//!
//! The scheduler only talks to a [`RepositorySource`]. The GitHub implementation lives
//! in [`crate::github`]; tests substitute their own sources.

use async_trait::async_trait;

use crate::account::AccountSpec;
use crate::error::EnumerationError;

/// Lists the repositories of one account
///
/// Implementations must use only the credentials of the account passed in, and must
/// not retry on their own: retrying is the scheduler's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Repository full names (`owner/repo`) in the order the provider returned them
    async fn list_repositories(&self, account: &AccountSpec)
        -> Result<Vec<String>, EnumerationError>;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}
