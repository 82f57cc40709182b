//! GitLab provider against a local mock of the v4 API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use stencil_composer::PullRequestComposer;
use stencil_core::{FileChange, FileChangeSet, RepositoryLocation, Reviewer, TemplateInfo};
use stencil_vcs::{GitlabProvider, StaticCredentials, SubmissionError, TreeReader, VcsProvider};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const TARGET: &str = "https://gitlab.com/acme/svc/-/tree/main";
const BRANCH: &str = "svc/template-upgrade-v2";

#[derive(Default)]
struct Recorded {
    /// branch name → head commit message
    branches: HashMap<String, String>,
    /// (source branch, iid)
    merge_requests: Vec<(String, u64)>,
    tree_pages: Vec<String>,
    commit_posts: usize,
    mr_posts: usize,
    rate_limit_first_mr: bool,
    reviewer_status: Option<StatusCode>,
    reviewer_updates: Vec<(String, Value)>,
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

fn mr_json(iid: u64) -> Value {
    json!({ "iid": iid, "web_url": format!("https://gitlab.com/acme/svc/-/merge_requests/{iid}") })
}

async fn list_tree(
    State(state): State<MockState>,
    Path(project): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    assert_eq!(project, "acme/svc");
    let page = query.get("page").cloned().unwrap_or_else(|| "1".into());
    state.with(|r| r.tree_pages.push(page.clone()));
    let (entries, next) = match page.as_str() {
        "1" => (
            json!([
                { "path": "app", "type": "tree" },
                { "path": "app/a.txt", "type": "blob" },
            ]),
            "2",
        ),
        _ => (
            json!([
                { "path": "app/sub/b.txt", "type": "blob" },
                { "path": "README.md", "type": "blob" },
            ]),
            "",
        ),
    };
    (StatusCode::OK, [("x-next-page", next)], Json(entries)).into_response()
}

async fn post_commit(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let branch = body["branch"].as_str().unwrap_or_default().to_string();
    let message = body["commit_message"].as_str().unwrap_or_default().to_string();
    state.with(|r| {
        r.commit_posts += 1;
        if r.branches.contains_key(&branch) {
            return reply(
                StatusCode::BAD_REQUEST,
                json!({ "message": format!("A branch called '{branch}' already exists") }),
            );
        }
        r.branches.insert(branch, message.clone());
        reply(StatusCode::CREATED, json!({ "id": "abc123", "message": message }))
    })
}

async fn get_branch(
    State(state): State<MockState>,
    Path((_project, branch)): Path<(String, String)>,
) -> Response {
    match state.with(|r| r.branches.get(&branch).cloned()) {
        Some(message) => reply(
            StatusCode::OK,
            json!({ "name": branch, "commit": { "id": "abc123", "message": message } }),
        ),
        None => reply(StatusCode::NOT_FOUND, json!({ "message": "404 Branch Not Found" })),
    }
}

async fn list_merge_requests(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let source = query.get("source_branch").cloned().unwrap_or_default();
    let found: Vec<Value> = state.with(|r| {
        r.merge_requests
            .iter()
            .filter(|(branch, _)| *branch == source)
            .map(|(_, iid)| mr_json(*iid))
            .collect()
    });
    reply(StatusCode::OK, Value::Array(found))
}

async fn create_merge_request(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let source = body["source_branch"].as_str().unwrap_or_default().to_string();
    assert_eq!(body["target_branch"], "main");
    state.with(|r| {
        r.mr_posts += 1;
        if r.rate_limit_first_mr && r.mr_posts == 1 {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, "0")],
                Json(json!({ "message": "Retry later" })),
            )
                .into_response();
        }
        if r.merge_requests.iter().any(|(branch, _)| *branch == source) {
            return reply(
                StatusCode::CONFLICT,
                json!({ "message": ["Another open merge request already exists for this source branch"] }),
            );
        }
        let iid = 5 + r.merge_requests.len() as u64;
        r.merge_requests.push((source, iid));
        reply(StatusCode::CREATED, mr_json(iid))
    })
}

async fn update_merge_request(
    State(state): State<MockState>,
    Path((_project, iid)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    state.with(|r| {
        r.reviewer_updates.push((iid, body));
        let status = r.reviewer_status.unwrap_or(StatusCode::OK);
        reply(status, json!({}))
    })
}

async fn find_users(Query(query): Query<HashMap<String, String>>) -> Response {
    match query.get("username").map(String::as_str) {
        Some("alice") => reply(StatusCode::OK, json!([{ "id": 11, "username": "alice" }])),
        _ => reply(StatusCode::OK, json!([])),
    }
}

async fn spawn_mock_server(state: MockState) -> (String, oneshot::Sender<()>) {
    let app = Router::new()
        .route("/api/v4/projects/{project}/repository/tree", get(list_tree))
        .route("/api/v4/projects/{project}/repository/commits", post(post_commit))
        .route(
            "/api/v4/projects/{project}/repository/branches/{branch}",
            get(get_branch),
        )
        .route(
            "/api/v4/projects/{project}/merge_requests",
            get(list_merge_requests).post(create_merge_request),
        )
        .route(
            "/api/v4/projects/{project}/merge_requests/{iid}",
            put(update_merge_request),
        )
        .route("/api/v4/users", get(find_users))
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
    (format!("http://{address}/api/v4"), shutdown_tx)
}

fn provider(api_base: &str) -> GitlabProvider {
    GitlabProvider::new(
        "gitlab.com",
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
async fn listing_follows_next_page_and_keeps_the_subtree() {
    let state = MockState::default();
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;
    let location = RepositoryLocation::new("gitlab.com", "acme", "svc")
        .expect("location")
        .with_branch("main")
        .with_path("app");

    let files = provider(&base).list_files(&location).await.expect("list files");

    assert_eq!(files, ["a.txt", "sub/b.txt"]);
    state.with(|r| assert_eq!(r.tree_pages, ["1", "2"]));
}

#[tokio::test]
async fn rate_limited_merge_request_resumes_on_the_next_attempt() {
    let state = MockState::default();
    state.with(|r| r.rate_limit_first_mr = true);
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;
    let gitlab = provider(&base);

    let first = gitlab
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect_err("first attempt is rate limited");
    assert!(first.is_rate_limited(), "unexpected error: {first}");

    let mr = gitlab
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect("second attempt opens the merge request");

    assert_eq!(mr.number, 5);
    state.with(|r| {
        assert_eq!(r.commit_posts, 2);
        assert_eq!(r.mr_posts, 2);
    });
}

#[tokio::test]
async fn open_merge_request_from_an_earlier_attempt_is_reused() {
    let state = MockState::default();
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;
    let gitlab = provider(&base);
    let opened = gitlab
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect("first attempt");

    let again = gitlab
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect("rerun returns the open merge request");

    assert_eq!(again.number, opened.number);
    assert_eq!(again.url, opened.url);
    state.with(|r| assert_eq!(r.merge_requests.len(), 1));
}

#[tokio::test]
async fn branch_with_a_foreign_head_is_reported_as_existing() {
    let state = MockState::default();
    state.with(|r| {
        r.branches.insert(BRANCH.into(), "hand-made fix".into());
    });
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;

    let err = provider(&base)
        .create_pull_request(TARGET, &changes(), &info(), None)
        .await
        .expect_err("branch belongs to someone else");

    assert!(
        matches!(&err, SubmissionError::BranchExists { branch, .. } if branch == BRANCH),
        "unexpected error: {err}"
    );
    state.with(|r| assert_eq!(r.mr_posts, 0));
}

#[tokio::test]
async fn reviewer_failure_still_returns_the_merge_request() {
    let state = MockState::default();
    state.with(|r| r.reviewer_status = Some(StatusCode::INTERNAL_SERVER_ERROR));
    let (base, _shutdown) = spawn_mock_server(state.clone()).await;

    let mr = provider(&base)
        .create_pull_request(TARGET, &changes(), &info(), Some(&Reviewer("alice".into())))
        .await
        .expect("reviewer errors are not fatal");

    assert_eq!(mr.number, 5);
    state.with(|r| {
        assert_eq!(r.reviewer_updates.len(), 1);
        assert_eq!(r.reviewer_updates[0].0, "5");
        assert_eq!(r.reviewer_updates[0].1["reviewer_ids"], json!([11]));
    });
}
