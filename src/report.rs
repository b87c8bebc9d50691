//! Tick aggregation - per-account enumeration outcomes merged into one report
//!
//! A [`TickReport`] is what the downstream backup step consumes: the tick outcome plus
//! every account's repository list or error, untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::account::{AccountId, AccountSpec, RejectedAccount};
use crate::error::{EnumerationError, ErrorKind};

/// Outcome of one account within one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationResult {
    pub account: AccountId,
    pub identity: String,
    pub outcome: Result<Vec<String>, EnumerationError>,
}

impl EnumerationResult {
    pub fn new(account: &AccountSpec, outcome: Result<Vec<String>, EnumerationError>) -> Self {
        Self {
            account: account.id.clone(),
            identity: account.identity.clone(),
            outcome,
        }
    }

    /// Repository full names; empty when the account failed
    pub fn repositories(&self) -> &[String] {
        match &self.outcome {
            Ok(names) => names,
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&EnumerationError> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Classification of a whole tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// Every enabled account succeeded (vacuously true with no accounts)
    FullSuccess,
    /// Some accounts failed, some succeeded
    PartialSuccess,
    /// Every enabled account failed
    TotalFailure,
}

impl TickOutcome {
    pub fn classify(results: &[EnumerationResult]) -> Self {
        let failed = results.iter().filter(|r| !r.is_success()).count();

        if failed == 0 {
            TickOutcome::FullSuccess
        } else if failed == results.len() {
            TickOutcome::TotalFailure
        } else {
            TickOutcome::PartialSuccess
        }
    }
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TickOutcome::FullSuccess => "full success",
            TickOutcome::PartialSuccess => "partial success",
            TickOutcome::TotalFailure => "total failure",
        };
        f.write_str(label)
    }
}

/// Everything one tick produced
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: DateTime<Utc>,
    pub outcome: TickOutcome,
    pub duration: Duration,
    pub results: Vec<EnumerationResult>,
    pub rejected: Vec<RejectedAccount>,
}

/// Error as exposed to report consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<&EnumerationError> for ErrorSummary {
    fn from(error: &EnumerationError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            status: error.status(),
        }
    }
}

/// Per-account entry of the produced mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountListing {
    pub repositories: Vec<String>,
    pub error: Option<ErrorSummary>,
}

#[derive(Serialize)]
struct ReportView {
    tick: DateTime<Utc>,
    outcome: TickOutcome,
    duration_ms: u64,
    accounts: BTreeMap<String, AccountListing>,
    rejected: BTreeMap<String, ErrorSummary>,
}

impl TickReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn total_repositories(&self) -> usize {
        self.results.iter().map(|r| r.repositories().len()).sum()
    }

    /// Look up one account's result
    pub fn result_for(&self, id: &AccountId) -> Option<&EnumerationResult> {
        self.results.iter().find(|r| &r.account == id)
    }

    /// Mapping from account id (`organizations/<label>`, `users/<label>`) to its listing
    pub fn accounts(&self) -> BTreeMap<String, AccountListing> {
        self.results
            .iter()
            .map(|result| {
                (
                    result.account.to_string(),
                    AccountListing {
                        repositories: result.repositories().to_vec(),
                        error: result.error().map(ErrorSummary::from),
                    },
                )
            })
            .collect()
    }

    /// Serialize the report for machine consumers
    pub fn to_json(&self) -> serde_json::Result<String> {
        let rejected = self
            .rejected
            .iter()
            .map(|r| {
                (
                    r.id.to_string(),
                    ErrorSummary {
                        kind: ErrorKind::Config,
                        message: r.error.to_string(),
                        status: None,
                    },
                )
            })
            .collect();

        let view = ReportView {
            tick: self.tick,
            outcome: self.outcome,
            duration_ms: self.duration.as_millis() as u64,
            accounts: self.accounts(),
            rejected,
        };

        serde_json::to_string_pretty(&view)
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Tick {} finished with {} in {:.2}s: {} accounts ok, {} failed, {} repositories",
            self.tick.format("%Y-%m-%d %H:%M:%S UTC"),
            self.outcome,
            self.duration.as_secs_f64(),
            self.succeeded(),
            self.failed(),
            self.total_repositories()
        )?;

        for result in &self.results {
            match &result.outcome {
                Ok(names) => {
                    writeln!(
                        f,
                        "  {} ({}): {} repositories",
                        result.account,
                        result.identity,
                        names.len()
                    )?;
                    for name in names {
                        writeln!(f, "    {}", name)?;
                    }
                }
                Err(error) => {
                    writeln!(f, "  {} ({}): {}", result.account, result.identity, error)?;
                }
            }
        }

        for rejected in &self.rejected {
            writeln!(f, "  {} excluded: {}", rejected.id, rejected.error)?;
        }

        Ok(())
    }
}

/// Collects the per-account results of one tick and classifies them
#[derive(Debug)]
pub struct ResultAggregator {
    tick: DateTime<Utc>,
    started: Instant,
    results: Vec<(usize, EnumerationResult)>,
}

impl ResultAggregator {
    pub fn new(tick: DateTime<Utc>) -> Self {
        Self {
            tick,
            started: Instant::now(),
            results: Vec::new(),
        }
    }

    /// Record the result of the account at `position` in roster order
    pub fn record(&mut self, position: usize, result: EnumerationResult) {
        self.results.push((position, result));
    }

    /// Build the report. Results are put back in roster order regardless of completion order.
    pub fn finish(mut self, rejected: Vec<RejectedAccount>) -> TickReport {
        self.results.sort_by_key(|(position, _)| *position);
        let results: Vec<EnumerationResult> =
            self.results.into_iter().map(|(_, result)| result).collect();

        TickReport {
            tick: self.tick,
            outcome: TickOutcome::classify(&results),
            duration: self.started.elapsed(),
            results,
            rejected,
        }
    }
}
