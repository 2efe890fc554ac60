//! GitHub REST client against a mock server

use mockito::{Matcher, Server};
use repolens_mcp::repolens::errors::RepositoryError;
use repolens_mcp::repolens::repository_manager::providers::{GithubClient, RemoteSource};
use repolens_mcp::repolens::RepositoryIdentifier;

const REPO_JSON: &str = r#"{
    "name": "demo",
    "full_name": "octo/demo",
    "owner": {"login": "octo"},
    "description": "A demo repository",
    "stargazers_count": 1234,
    "forks_count": 56,
    "language": "Rust",
    "default_branch": "trunk",
    "clone_url": "https://github.com/octo/demo.git",
    "updated_at": "2024-05-01T10:00:00Z",
    "pushed_at": "2024-05-02T11:00:00Z"
}"#;

const ISSUES_JSON: &str = r#"[
    {
        "number": 12,
        "title": "Widget crashes",
        "body": "Steps to reproduce",
        "state": "open",
        "user": {"login": "alice"},
        "created_at": "2024-04-01T00:00:00Z",
        "updated_at": "2024-04-10T00:00:00Z",
        "html_url": "https://github.com/octo/demo/issues/12"
    },
    {
        "number": 13,
        "title": "Fix crash",
        "body": null,
        "state": "open",
        "user": {"login": "bob"},
        "created_at": "2024-04-02T00:00:00Z",
        "updated_at": "2024-04-11T00:00:00Z",
        "html_url": "https://github.com/octo/demo/pull/13",
        "pull_request": {"url": "https://api.github.com/repos/octo/demo/pulls/13"}
    }
]"#;

const PULLS_JSON: &str = r#"[
    {
        "number": 13,
        "title": "Fix crash",
        "body": null,
        "state": "open",
        "user": null,
        "created_at": "2024-04-02T00:00:00Z",
        "updated_at": "2024-04-11T00:00:00Z",
        "html_url": "https://github.com/octo/demo/pull/13"
    }
]"#;

fn id() -> RepositoryIdentifier {
    RepositoryIdentifier::parse("octo/demo").unwrap()
}

fn client(server: &Server, token: Option<&str>) -> GithubClient {
    GithubClient::new(token.map(str::to_string))
        .expect("client")
        .with_api_base_url(server.url())
}

#[tokio::test]
async fn test_fetch_metadata_maps_fields() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/octo/demo")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(REPO_JSON)
        .create_async()
        .await;

    let metadata = client(&server, None).fetch_metadata(&id()).await.expect("metadata");
    mock.assert_async().await;

    assert_eq!(metadata.full_name, "octo/demo");
    assert_eq!(metadata.stars, 1234);
    assert_eq!(metadata.forks, 56);
    assert_eq!(metadata.default_branch, "trunk");
    assert_eq!(metadata.language.as_deref(), Some("Rust"));
    assert_eq!(
        metadata.pushed_at.map(|t| t.to_rfc3339()),
        Some("2024-05-02T11:00:00+00:00".to_string())
    );
}

#[tokio::test]
async fn test_token_is_sent_when_configured() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/octo/demo")
        .match_query(Matcher::Any)
        .match_header("authorization", "token secret-token")
        .with_status(200)
        .with_body(REPO_JSON)
        .create_async()
        .await;

    client(&server, Some("secret-token"))
        .fetch_metadata(&id())
        .await
        .expect("metadata");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_not_found_maps_to_repository_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/demo")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"message": "Not Found"}"#)
        .create_async()
        .await;

    let err = client(&server, None).fetch_metadata(&id()).await.unwrap_err();
    assert_eq!(err, RepositoryError::RepositoryNotFound("octo/demo".to_string()));
}

#[tokio::test]
async fn test_exhausted_quota_maps_to_rate_limit_with_reset_time() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/demo")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-reset", "1700000000")
        .with_body(r#"{"message": "API rate limit exceeded"}"#)
        .create_async()
        .await;

    let err = client(&server, None).fetch_metadata(&id()).await.unwrap_err();
    match err {
        RepositoryError::RateLimitExceeded { reset_at } => {
            assert_eq!(reset_at.timestamp(), 1_700_000_000)
        }
        other => panic!("expected RateLimitExceeded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limited() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/demo")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "30")
        .create_async()
        .await;

    let err = client(&server, None).fetch_metadata(&id()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::RateLimitExceeded { .. }));
}

#[tokio::test]
async fn test_other_failures_map_to_remote_unavailable() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/demo")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_header("x-ratelimit-remaining", "4000")
        .with_body(r#"{"message": "Repository access blocked"}"#)
        .create_async()
        .await;
    let err = client(&server, None).fetch_metadata(&id()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::RemoteUnavailable(_)));

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/demo")
        .match_query(Matcher::Any)
        .with_status(502)
        .create_async()
        .await;
    let err = client(&server, None).fetch_metadata(&id()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::RemoteUnavailable(_)));
}

#[tokio::test]
async fn test_unreachable_host_is_remote_unavailable() {
    let client = GithubClient::new(None)
        .expect("client")
        .with_api_base_url("http://127.0.0.1:9");
    let err = client.fetch_metadata(&id()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::RemoteUnavailable(_)));
}

#[tokio::test]
async fn test_fetch_activity_separates_pull_requests_and_tolerates_empty_contributors() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/demo/issues")
        .match_query(Matcher::UrlEncoded("state".into(), "all".into()))
        .with_status(200)
        .with_body(ISSUES_JSON)
        .create_async()
        .await;
    server
        .mock("GET", "/repos/octo/demo/pulls")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(PULLS_JSON)
        .create_async()
        .await;
    server
        .mock("GET", "/repos/octo/demo/contributors")
        .match_query(Matcher::Any)
        .with_status(204)
        .create_async()
        .await;

    let activity = client(&server, None)
        .fetch_activity(&id(), 30)
        .await
        .expect("activity");

    assert_eq!(activity.issues.len(), 1);
    assert_eq!(activity.issues[0].number, 12);
    assert_eq!(activity.issues[0].author, "alice");
    assert!(!activity.issues[0].is_pull_request);
    assert_eq!(activity.pull_requests.len(), 1);
    assert!(activity.pull_requests[0].is_pull_request);
    assert_eq!(activity.pull_requests[0].author, "unknown");
    assert!(activity.contributors.is_empty());
}

#[tokio::test]
async fn test_failing_contributors_endpoint_fails_activity() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/octo/demo/issues")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    server
        .mock("GET", "/repos/octo/demo/pulls")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    server
        .mock("GET", "/repos/octo/demo/contributors")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let err = client(&server, None)
        .fetch_activity(&id(), 30)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::RemoteUnavailable(_)));
}

#[tokio::test]
async fn test_contributors_are_mapped_and_anonymous_skipped() {
    let mut server = Server::new_async().await;
    for path in ["/repos/octo/demo/issues", "/repos/octo/demo/pulls"] {
        server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
    }
    server
        .mock("GET", "/repos/octo/demo/contributors")
        .match_query(Matcher::UrlEncoded("per_page".into(), "10".into()))
        .with_status(200)
        .with_body(
            r#"[{"login": "alice", "contributions": 120}, {"type": "Anonymous", "contributions": 5}, {"login": "bob", "contributions": 30}]"#,
        )
        .create_async()
        .await;

    let activity = client(&server, None)
        .fetch_activity(&id(), 30)
        .await
        .expect("activity");
    let logins: Vec<(&str, u64)> = activity
        .contributors
        .iter()
        .map(|c| (c.login.as_str(), c.contribution_count))
        .collect();
    assert_eq!(logins, vec![("alice", 120), ("bob", 30)]);
}
