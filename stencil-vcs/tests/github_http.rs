//! GitHub provider against a local mock of the REST API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use stencil_composer::PullRequestComposer;
use stencil_core::{FileChange, FileChangeSet, RepositoryLocation, Reviewer, TemplateInfo};
use stencil_vcs::{GithubProvider, StaticCredentials, SubmissionError, TreeReader, VcsProvider};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const TARGET: &str = "https://github.com/acme/svc/tree/main";
const BRANCH: &str = "svc/template-upgrade-v2";
const NEW_TREE: &str = "tree-for-changes";

#[derive(Default)]
struct Recorded {
    /// branch name → head commit sha
    branches: HashMap<String, String>,
    /// commit sha → tree sha
    commits: HashMap<String, String>,
    /// (head branch, number)
    pulls: Vec<(String, u64)>,
    ref_creates: usize,
    pull_creates: usize,
    rate_limit_first_pull: bool,
    reviewer_status: Option<StatusCode>,
    review_requests: Vec<Value>,
}

#[derive(Clone, Default)]
struct MockState {
    inner: Arc<Mutex<Recorded>>,
}

impl MockState {
    fn with<R>(&self, f: impl FnOnce(&mut Recorded) -> R) -> R {
        f(&mut self.inner.lock().expect("mock state lock"))
    }
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

async fn get_tree(Path((_owner, _repo, _reference)): Path<(String, String, String)>) -> Response {
    reply(
        StatusCode::OK,
        json!({
            "truncated": false,
            "tree": [
                { "path": "README.md", "type": "blob" },
                { "path": "app", "type": "tree" },
                { "path": "app/a.txt", "type": "blob" },
                { "path": "app/sub", "type": "tree" },
                { "path": "app/sub/b.txt", "type": "blob" },
                { "path": "application.yaml", "type": "blob" },
            ],
        }),
    )
}

async fn get_ref(
    State(state): State<MockState>,
    Path((_owner, _repo, branch)): Path<(String, String, String)>,
) -> Response {
    if branch == "main" {
        return reply(StatusCode::OK, json!({ "object": { "sha": "base-commit" } }));
    }
    match state.with(|r| r.branches.get(&branch).cloned()) {
        Some(sha) => reply(StatusCode::OK, json!({ "object": { "sha": sha } })),
        None => reply(StatusCode::NOT_FOUND, json!({ "message": "Not Found" })),
    }
}

async fn get_commit(
    State(state): State<MockState>,
    Path((_owner, _repo, sha)): Path<(String, String, String)>,
) -> Response {
    let tree = if sha == "base-commit" {
        Some("base-tree".to_string())
    } else {
        state.with(|r| r.commits.get(&sha).cloned())
    };
    match tree {
        Some(tree) => reply(StatusCode::OK, json!({ "sha": sha, "tree": { "sha": tree } })),
        None => reply(StatusCode::NOT_FOUND, json!({ "message": "Not Found" })),
    }
}

async fn post_tree(Json(body): Json<Value>) -> Response {
    assert_eq!(body["base_tree"], "base-tree");
    reply(StatusCode::CREATED, json!({ "sha": NEW_TREE }))
}

async fn post_commit(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let tree = body["tree"].as_str().unwrap_or_default().to_string();
    let sha = state.with(|r| {
        let sha = format!("commit-{}", r.commits.len() + 1);
        r.commits.insert(sha.clone(), tree);
        sha
    });
    reply(StatusCode::CREATED, json!({ "sha": sha }))
}

async fn post_ref(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let name = body["ref"]
        .as_str()
        .unwrap_or_default()
        .trim_start_matches("refs/heads/")
        .to_string();
    let sha = body["sha"].as_str().unwrap_or_default().to_string();
    state.with(|r| {
        r.ref_creates += 1;
        if r.branches.contains_key(&name) {
            return reply(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "message": "Reference already exists" }),
            );
        }
        r.branches.insert(name.clone(), sha.clone());
        reply(
            StatusCode::CREATED,
            json!({ "ref": format!("refs/heads/{name}"), "object": { "sha": sha } }),
        )
    })
}

async fn list_pulls(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let head = query.get("head").cloned().unwrap_or_default();
    let found: Vec<Value> = state.with(|r| {
        r.pulls
            .iter()
            .filter(|(branch, _)| head == format!("acme:{branch}"))
            .map(|(_, number)| {
                json!({ "number": number, "html_url": format!("https://github.com/acme/svc/pull/{number}") })
            })
            .collect()
    });
    reply(StatusCode::OK, Value::Array(found))
}

async fn create_pull(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let head = body["head"].as_str().unwrap_or_default().to_string();
    state.with(|r| {
        r.pull_creates += 1;
        if r.rate_limit_first_pull && r.pull_creates == 1 {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, "0")],
                Json(json!({ "message": "You have exceeded a secondary rate limit" })),
            )
                .into_response();
        }
        if r.pulls.iter().any(|(branch, _)| *branch == head) {
            return reply(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "message": "Validation Failed" }),
            );
        }
        let number = 42 + r.pulls.len() as u64;
        r.pulls.push((head, number));
        reply(
            StatusCode::CREATED,
            json!({ "number": number, "html_url": format!("https://github.com/acme/svc/pull/{number}") }),
        )
    })
}

async fn request_reviewers(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.with(|r| {
        r.review_requests.push(body);
        let status = r.reviewer_status.unwrap_or(StatusCode::CREATED);
        reply(status, json!({}))
    })
}

async fn spawn_mock_server(state: MockState) -> (String, oneshot::Sender<()>) {
    let app = Router::new()
        .route("/repos/{owner}/{repo}/git/trees/{*reference}", get(get_tree))
        .route("/repos/{owner}/{repo}/git/trees", post(post_tree))
        .route("/repos/{owner}/{repo}/git/ref/heads/{*branch}", get(get_ref))
        .route("/repos/{owner}/{repo}/git/commits/{sha}", get(get_commit))
        .route("/repos/{owner}/{repo}/git/commits", post(post_commit))
        .route("/repos/{owner}/{repo}/git/refs", post(post_ref))
        .route("/repos/{owner}/{repo}/pulls", get(list_pulls).post(create_pull))
        .route(
            "/repos/{owner}/{repo}/pulls/{number}/requested_reviewers",
            post(request_reviewers),
        )
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server listener");
    let address: SocketAddr = listener.local_addr().expect("mock listener local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("run mock server");
    });
    (format!("http://{address}"), shutdown_tx)
}

fn provider(api_base: &str) -> GithubProvider {
    GithubProvider::new(
        "github.com",
        Some(api_base),
        None,
        Arc::new(StaticCredentials::new(Some("test-token".into()))),
        Arc::new(PullRequestComposer::new().expect("composer")),
    )
    .expect("provider")
}

fn info() -> TemplateInfo {
    TemplateInfo {
        owner: "acme".into(),
        repo: "templates".into(),
        branch: None,
        display_name: "Node Service".into(),
        previous_version: "1".into(),
        current_version: "2".into(),
        component_name: "svc".into(),
    }
}

fn changes() -> FileChangeSet {
    let mut changes = FileChangeSet::new();
    changes.insert("README.md", FileChange::Update("# svc\n".into()));
    changes
}

#[tokio::test]
async fn listing_keeps_only_blobs_under_the_subtree() {
    let (base, _shutdown) = spawn_mock_server(MockState::default()).await;
    let location = RepositoryLocation::new("github.com", "acme", "svc")
        .expect("location")
        .with_branch("main")
        .with_path("app");

    let files = provider(&base).list_files(&location).await.expect("list files");

    assert_eq!(files, ["a.txt", "sub/b.txt"]);
}

#[tokio::test]
async fn rate_limited_pull_creation_resumes_on_the_next_attempt() {
    let state = MockState::default();
    state.with(|r| r.rate_limit_first_pull = true);
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;
    let github = provider(&base);

    let first = github
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect_err("first attempt is rate limited");
    assert!(first.is_rate_limited(), "unexpected error: {first}");

    let pull = github
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect("second attempt opens the pull request");

    assert_eq!(pull.number, 42);
    state.with(|r| {
        assert_eq!(r.ref_creates, 2);
        assert_eq!(r.pull_creates, 2);
        assert_eq!(r.branches.get(BRANCH).map(String::as_str), Some("commit-1"));
    });
}

#[tokio::test]
async fn open_pull_from_an_earlier_attempt_is_reused() {
    let state = MockState::default();
    state.with(|r| {
        r.branches.insert(BRANCH.into(), "earlier".into());
        r.commits.insert("earlier".into(), NEW_TREE.into());
        r.pulls.push((BRANCH.into(), 7));
    });
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;

    let pull = provider(&base)
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect("existing pull request is returned");

    assert_eq!(pull.number, 7);
    assert_eq!(pull.url, "https://github.com/acme/svc/pull/7");
}

#[tokio::test]
async fn branch_with_other_content_is_reported_as_existing() {
    let state = MockState::default();
    state.with(|r| {
        r.branches.insert(BRANCH.into(), "foreign".into());
        r.commits.insert("foreign".into(), "foreign-tree".into());
    });
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;

    let err = provider(&base)
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect_err("branch holds different content");

    assert!(
        matches!(&err, SubmissionError::BranchExists { branch, .. } if branch == BRANCH),
        "unexpected error: {err}"
    );
    state.with(|r| assert_eq!(r.pull_creates, 0));
}

#[tokio::test]
async fn reviewer_failure_still_returns_the_pull_request() {
    let state = MockState::default();
    state.with(|r| r.reviewer_status = Some(StatusCode::INTERNAL_SERVER_ERROR));
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;

    let pull = provider(&base)
        .create_pull_request(TARGET, &changes(), &info(), Some(&Reviewer("octocat".into())))
        .await
        .expect("reviewer errors are not fatal");

    assert_eq!(pull.number, 42);
    state.with(|r| {
        assert_eq!(r.review_requests.len(), 1);
        assert_eq!(r.review_requests[0]["reviewers"], json!(["octocat"]));
    });
}
