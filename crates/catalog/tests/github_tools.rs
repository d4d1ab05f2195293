#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

use toolbridge_catalog::{build_registry, CatalogOptions, Family};
use toolbridge_core::{
    ArgToken, BridgeError, CallRequest, DispatchEngine, ExecutionContext, FaultKind,
    ProcessOutput, ProgramInvocation, RemoteClient, RemoteFault, SubprocessInvoker,
};

/// Keeps every invocation and answers with fixed stdout.
struct RecordingInvoker {
    invocations: Mutex<Vec<ProgramInvocation>>,
    stdout: String,
}

impl RecordingInvoker {
    fn answering(stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            invocations: Mutex::new(Vec::new()),
            stdout: stdout.to_string(),
        })
    }

    fn last(&self) -> ProgramInvocation {
        self.invocations.lock().last().cloned().expect("no invocation")
    }

    fn last_argv(&self) -> Vec<String> {
        self.last().values().map(str::to_string).collect()
    }

    fn count(&self) -> usize {
        self.invocations.lock().len()
    }
}

#[async_trait]
impl SubprocessInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        invocation: &ProgramInvocation,
        _ctx: &ExecutionContext,
    ) -> Result<ProcessOutput, BridgeError> {
        self.invocations.lock().push(invocation.clone());
        Ok(ProcessOutput {
            program: invocation.program.to_string(),
            code: Some(0),
            stdout: self.stdout.clone(),
            stderr: String::new(),
        })
    }
}

struct NoRemote;

#[async_trait]
impl RemoteClient for NoRemote {
    async fn call(&self, operation: &str, _params: &Value) -> Result<Value, RemoteFault> {
        Err(RemoteFault::new(
            FaultKind::Other,
            format!("unexpected remote call {}", operation),
        ))
    }
}

fn engine(invoker: Arc<RecordingInvoker>) -> DispatchEngine {
    let registry = build_registry(&[Family::Github], &CatalogOptions::default()).unwrap();
    DispatchEngine::new(Arc::new(registry), invoker, Arc::new(NoRemote))
}

async fn call(engine: &DispatchEngine, tool: &str, args: Value) -> toolbridge_core::ResultEnvelope {
    engine.dispatch(CallRequest::new(tool, args)).await
}

#[tokio::test]
async fn test_issue_list_requests_json_fields() {
    let invoker = RecordingInvoker::answering(r#"[{"number":1,"title":"Bug"}]"#);
    let engine = engine(invoker.clone());

    let out = call(
        &engine,
        "github_issue_list",
        json!({"repo": "octo/hello", "state": "open"}),
    )
    .await;

    assert_eq!(out.data(), Some(&json!([{"number": 1, "title": "Bug"}])));
    assert_eq!(
        invoker.last_argv(),
        vec![
            "issue",
            "list",
            "-R",
            "octo/hello",
            "--state",
            "open",
            "--limit",
            "30",
            "--json",
            "number,title,state,author,labels,createdAt,url",
        ]
    );
}

#[tokio::test]
async fn test_pr_merge_method_and_branch_deletion() {
    let invoker = RecordingInvoker::answering("Merged pull request #42");
    let engine = engine(invoker.clone());

    let out = call(
        &engine,
        "github_pr_merge",
        json!({"repo": "octo/hello", "number": 42, "method": "squash", "delete_branch": true}),
    )
    .await;

    assert!(out.is_success());
    assert_eq!(
        invoker.last_argv(),
        vec!["pr", "merge", "42", "-R", "octo/hello", "--squash", "--delete-branch"]
    );

    call(
        &engine,
        "github_pr_merge",
        json!({"repo": "octo/hello", "number": 7}),
    )
    .await;
    assert_eq!(
        invoker.last_argv(),
        vec!["pr", "merge", "7", "-R", "octo/hello", "--merge"]
    );
}

#[tokio::test]
async fn test_issue_close_reason_and_labels() {
    let invoker = RecordingInvoker::answering("");
    let engine = engine(invoker.clone());

    call(
        &engine,
        "github_issue_close",
        json!({"repo": "octo/hello", "number": 3, "reason": "not_planned"}),
    )
    .await;
    assert_eq!(
        invoker.last_argv(),
        vec!["issue", "close", "3", "-R", "octo/hello", "--reason", "not planned"]
    );

    call(
        &engine,
        "github_issue_create",
        json!({"repo": "octo/hello", "title": "Crash", "labels": ["bug", "p1"]}),
    )
    .await;
    assert_eq!(
        invoker.last_argv(),
        vec![
            "issue",
            "create",
            "-R",
            "octo/hello",
            "--title",
            "Crash",
            "--label",
            "bug,p1",
        ]
    );
}

#[tokio::test]
async fn test_release_without_notes_generates_them() {
    let invoker = RecordingInvoker::answering("https://github.com/octo/hello/releases/v1.0.0");
    let engine = engine(invoker.clone());

    call(
        &engine,
        "github_release_create",
        json!({"repo": "octo/hello", "tag": "v1.0.0", "draft": true}),
    )
    .await;

    assert_eq!(
        invoker.last_argv(),
        vec![
            "release",
            "create",
            "v1.0.0",
            "-R",
            "octo/hello",
            "--generate-notes",
            "--draft",
        ]
    );
}

#[tokio::test]
async fn test_positional_that_looks_like_a_flag_is_rejected() {
    let invoker = RecordingInvoker::answering("");
    let engine = engine(invoker.clone());

    let out = call(
        &engine,
        "github_release_create",
        json!({"repo": "octo/hello", "tag": "--help"}),
    )
    .await;

    let message = out.message().unwrap();
    assert!(message.contains("'tag'"), "{}", message);
    assert_eq!(invoker.count(), 0);
}

#[tokio::test]
async fn test_bad_repo_slug_never_invokes() {
    let invoker = RecordingInvoker::answering("");
    let engine = engine(invoker.clone());

    for repo in ["octo", "octo/hello;rm -rf /", "../etc/passwd", "-R/x"] {
        let out = call(&engine, "github_repo_view", json!({ "repo": repo })).await;
        assert!(!out.is_success(), "{} was accepted", repo);
    }
    assert_eq!(invoker.count(), 0);
}

#[tokio::test]
async fn test_gist_content_goes_through_scratch_file() {
    let invoker = RecordingInvoker::answering("https://gist.github.com/abc");
    let engine = engine(invoker.clone());

    let out = call(
        &engine,
        "github_gist_create",
        json!({"filename": "notes.md", "content": "# $(whoami)\n", "public": true}),
    )
    .await;

    assert_eq!(out.data(), Some(&json!("https://gist.github.com/abc")));
    let invocation = invoker.last();
    let scratch = invocation.scratch.clone().unwrap();
    assert_eq!(scratch.file_name, "notes.md");
    assert_eq!(scratch.contents, "# $(whoami)\n");
    assert_eq!(
        invocation.args,
        vec![
            ArgToken::Value("gist".into()),
            ArgToken::Value("create".into()),
            ArgToken::ScratchPath,
            ArgToken::Value("--public".into()),
        ]
    );
}

#[tokio::test]
async fn test_search_query_follows_end_of_flags() {
    let invoker = RecordingInvoker::answering("[]");
    let engine = engine(invoker.clone());

    call(
        &engine,
        "github_search_issues",
        json!({"query": "-label:bug is:open", "limit": 5}),
    )
    .await;

    let argv = invoker.last_argv();
    assert_eq!(&argv[..4], &["search", "issues", "--limit", "5"]);
    assert_eq!(&argv[argv.len() - 2..], &["--", "-label:bug is:open"]);
}

#[tokio::test]
async fn test_workflow_run_reports_trigger() {
    let invoker = RecordingInvoker::answering("");
    let engine = engine(invoker.clone());

    let out = call(
        &engine,
        "github_workflow_run",
        json!({"repo": "octo/hello", "workflow": "ci.yml", "ref": "main"}),
    )
    .await;

    assert_eq!(out.data(), Some(&json!("Workflow ci.yml triggered")));
    assert_eq!(
        invoker.last_argv(),
        vec!["workflow", "run", "ci.yml", "-R", "octo/hello", "--ref", "main"]
    );
}

#[tokio::test]
async fn test_branch_list_decodes_json_lines() {
    let invoker = RecordingInvoker::answering(
        "{\"name\":\"main\",\"protected\":true}\n{\"name\":\"dev\",\"protected\":false}\n",
    );
    let engine = engine(invoker.clone());

    let out = call(&engine, "github_branch_list", json!({"repo": "octo/hello"})).await;

    assert_eq!(
        out.data(),
        Some(&json!([
            {"name": "main", "protected": true},
            {"name": "dev", "protected": false}
        ]))
    );
    assert_eq!(
        invoker.last_argv(),
        vec![
            "api",
            "repos/octo/hello/branches",
            "--paginate",
            "--jq",
            ".[] | {name, protected}",
        ]
    );
}

#[tokio::test]
async fn test_notifications_are_truncated_to_limit() {
    let invoker = RecordingInvoker::answering(r#"[{"id":"1"},{"id":"2"},{"id":"3"}]"#);
    let engine = engine(invoker.clone());

    let out = call(&engine, "github_notifications", json!({"limit": 2})).await;

    assert_eq!(out.data(), Some(&json!([{"id": "1"}, {"id": "2"}])));
    assert_eq!(invoker.last_argv(), vec!["api", "notifications"]);
}

#[tokio::test]
async fn test_user_view_endpoint() {
    let invoker = RecordingInvoker::answering(r#"{"login":"octocat"}"#);
    let engine = engine(invoker.clone());

    call(&engine, "github_user_view", json!({})).await;
    assert_eq!(invoker.last_argv(), vec!["api", "user"]);

    call(&engine, "github_user_view", json!({"username": "octo-cat"})).await;
    assert_eq!(invoker.last_argv(), vec!["api", "users/octo-cat"]);

    let out = call(&engine, "github_user_view", json!({"username": "../orgs"})).await;
    assert!(!out.is_success());
    assert_eq!(invoker.count(), 2);
}
