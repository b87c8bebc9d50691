//! End-to-end enumeration ticks against a mock GitHub API
mod common;

use assert_matches::assert_matches;
use common::*;
use repoharvest::{
    AccountId, AccountKind, Config, EnumerationError, ErrorKind, Roster, Scheduler, TickOutcome,
    TickReport,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Run one immediate tick over the accounts of `config`
async fn run_tick(config: &Config, server: &MockServer, timeout: Duration) -> TickReport {
    let schedule = config.schedule().unwrap();
    Scheduler::new(
        schedule,
        Roster::from_config(config),
        Arc::new(enumerator(server, timeout)),
    )
    .run_once()
    .await
    .expect("fresh scheduler has no tick in progress")
}

fn org(label: &str) -> AccountId {
    AccountId::new(AccountKind::Organization, label)
}

fn user(label: &str) -> AccountId {
    AccountId::new(AccountKind::User, label)
}

#[tokio::test]
async fn test_org_and_user_full_success() {
    let server = MockServer::start().await;
    mount_org(
        &server,
        "acme",
        "all",
        "T1",
        ok_json(repo_list(&["acme/a", "acme/b", "acme/c"])),
    )
    .await;
    mount_user(
        &server,
        "owner",
        "T2",
        ok_json(repo_list(&["alice/x", "alice/y"])),
    )
    .await;

    let mut config = empty_config(&server.uri());
    config
        .organizations
        .insert("1st".to_string(), account("acme", "T1", "all"));
    config
        .users
        .insert("1st".to_string(), account("alice", "T2", "owner"));

    let report = run_tick(&config, &server, TIMEOUT).await;

    assert_eq!(report.outcome, TickOutcome::FullSuccess);
    assert_eq!(report.results.len(), 2);
    assert_eq!(
        report.result_for(&org("1st")).unwrap().repositories(),
        ["acme/a", "acme/b", "acme/c"]
    );
    assert_eq!(
        report.result_for(&user("1st")).unwrap().repositories(),
        ["alice/x", "alice/y"]
    );
    assert_eq!(report.total_repositories(), 5);

    // Same label in both sections stays distinct
    let accounts = report.accounts();
    assert!(accounts.contains_key("organizations/1st"));
    assert!(accounts.contains_key("users/1st"));
}

#[tokio::test]
async fn test_unauthorized_account_is_isolated() {
    let server = MockServer::start().await;
    mount_org(
        &server,
        "acme",
        "all",
        "T1",
        ok_json(repo_list(&["acme/a", "acme/b", "acme/c"])),
    )
    .await;
    mount_user(
        &server,
        "owner",
        "BAD",
        ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
    )
    .await;

    let mut config = empty_config(&server.uri());
    config
        .organizations
        .insert("1st".to_string(), account("acme", "T1", "all"));
    config
        .users
        .insert("1st".to_string(), account("alice", "BAD", "owner"));

    let report = run_tick(&config, &server, TIMEOUT).await;

    assert_eq!(report.outcome, TickOutcome::PartialSuccess);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.result_for(&org("1st")).unwrap().repositories().len(), 3);

    let failed = report.result_for(&user("1st")).unwrap();
    assert_matches!(
        failed.error(),
        Some(EnumerationError::Api { status: 401, body }) if body.contains("Bad credentials")
    );

    let listing = &report.accounts()["users/1st"];
    assert!(listing.repositories.is_empty());
    assert_eq!(listing.error.as_ref().unwrap().status, Some(401));
}

#[tokio::test]
async fn test_validate_name_filters_foreign_repositories() {
    let server = MockServer::start().await;
    mount_org(
        &server,
        "Acme",
        "all",
        "T1",
        ok_json(repo_list(&["Acme/core", "Other/fork-of-core", "Acme/web"])),
    )
    .await;

    let mut config = empty_config(&server.uri());
    let mut entry = account("Acme", "T1", "");
    entry.validate_name = true;
    config.organizations.insert("main".to_string(), entry);

    let report = run_tick(&config, &server, TIMEOUT).await;

    assert_eq!(report.outcome, TickOutcome::FullSuccess);
    assert_eq!(
        report.result_for(&org("main")).unwrap().repositories(),
        ["Acme/core", "Acme/web"]
    );
}

#[tokio::test]
async fn test_entries_without_string_full_name_are_skipped() {
    let server = MockServer::start().await;
    let body = json!([
        { "full_name": "alice/kept" },
        { "name": "no-full-name" },
        { "full_name": 42 },
        { "full_name": null },
        { "full_name": "alice/also-kept" }
    ]);
    mount_user(&server, "owner,collaborator", "T2", ok_json(body)).await;

    let mut config = empty_config(&server.uri());
    config
        .users
        .insert("me".to_string(), account("alice", "T2", "owner,collaborator"));

    let report = run_tick(&config, &server, TIMEOUT).await;

    assert_eq!(report.outcome, TickOutcome::FullSuccess);
    assert_eq!(
        report.result_for(&user("me")).unwrap().repositories(),
        ["alice/kept", "alice/also-kept"]
    );
}

#[tokio::test]
async fn test_slow_account_times_out_without_blocking_others() {
    let server = MockServer::start().await;
    mount_org(
        &server,
        "slow",
        "public",
        "T1",
        ok_json(repo_list(&["slow/a"])).set_delay(Duration::from_secs(3)),
    )
    .await;
    mount_org(&server, "fast", "public", "T2", ok_json(repo_list(&["fast/a"]))).await;

    let mut config = empty_config(&server.uri());
    config
        .organizations
        .insert("fast".to_string(), account("fast", "T2", "public"));
    config
        .organizations
        .insert("slow".to_string(), account("slow", "T1", "public"));

    let started = Instant::now();
    let report = run_tick(&config, &server, Duration::from_millis(300)).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.outcome, TickOutcome::PartialSuccess);
    assert_matches!(
        report.result_for(&org("slow")).unwrap().error(),
        Some(EnumerationError::Timeout(_))
    );
    assert_eq!(
        report.result_for(&org("fast")).unwrap().repositories(),
        ["fast/a"]
    );
}

#[tokio::test]
async fn test_every_account_failing_is_total_failure() {
    let server = MockServer::start().await;
    mount_org(
        &server,
        "acme",
        "all",
        "T1",
        ResponseTemplate::new(500).set_body_string("boom"),
    )
    .await;
    mount_user(
        &server,
        "owner",
        "T2",
        ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"),
    )
    .await;

    let mut config = empty_config(&server.uri());
    config
        .organizations
        .insert("1st".to_string(), account("acme", "T1", "all"));
    config
        .users
        .insert("1st".to_string(), account("alice", "T2", "owner"));

    let report = run_tick(&config, &server, TIMEOUT).await;

    assert_eq!(report.outcome, TickOutcome::TotalFailure);
    assert_eq!(
        report.result_for(&org("1st")).unwrap().error().unwrap().kind(),
        ErrorKind::Api
    );
    assert_eq!(
        report.result_for(&user("1st")).unwrap().error().unwrap().kind(),
        ErrorKind::Parse
    );
}

#[tokio::test]
async fn test_disabled_and_rejected_accounts_send_no_requests() {
    let server = MockServer::start().await;
    mount_org(&server, "acme", "all", "T1", ok_json(repo_list(&["acme/a"]))).await;

    let mut config = empty_config(&server.uri());
    config
        .organizations
        .insert("1st".to_string(), account("acme", "T1", "all"));

    // Disabled entries are skipped before their token or option is looked at
    let mut disabled = account("paused", "${REPOHARVEST_IT_NEVER_SET}", "bogus");
    disabled.backup_repos = false;
    config.organizations.insert("2nd".to_string(), disabled);

    config
        .organizations
        .insert("3rd".to_string(), account("broken", "", "all"));
    config
        .users
        .insert("1st".to_string(), account("alice", "T2", "everything"));

    let report = run_tick(&config, &server, TIMEOUT).await;

    assert_eq!(report.outcome, TickOutcome::FullSuccess);
    assert_eq!(report.results.len(), 1);
    assert!(report.result_for(&org("2nd")).is_none());

    let rejected: Vec<String> = report.rejected.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(rejected, ["organizations/3rd", "users/1st"]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_no_enabled_accounts_is_full_success() {
    let server = MockServer::start().await;
    let config = empty_config(&server.uri());

    let report = run_tick(&config, &server, TIMEOUT).await;

    assert_eq!(report.outcome, TickOutcome::FullSuccess);
    assert!(report.results.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_yaml_config_to_report() {
    let server = MockServer::start().await;
    mount_org(
        &server,
        "acme",
        "sources",
        "org-token",
        ok_json(repo_list(&["acme/core"])),
    )
    .await;
    mount_user(
        &server,
        "owner",
        "user-token",
        ok_json(repo_list(&["alice/dotfiles"])),
    )
    .await;

    let env = TestEnvironment::new();
    let config_path = env.create_test_config(&format!(
        r#"
organizations:
  1st:
    name: acme
    token: org-token
    option: sources
users:
  1st:
    name: alice
    token: user-token
update_interval: "0 0 */6 * * *"
api:
  base_url: "{}"
  timeout: 5
"#,
        server.uri()
    ));

    let config = Config::load(&config_path).unwrap();
    let report = run_tick(&config, &server, config.api.timeout_duration()).await;

    assert_eq!(report.outcome, TickOutcome::FullSuccess);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["outcome"], "full_success");
    assert_eq!(
        json["accounts"]["organizations/1st"]["repositories"],
        json!(["acme/core"])
    );
    assert_eq!(
        json["accounts"]["users/1st"]["repositories"],
        json!(["alice/dotfiles"])
    );
}
