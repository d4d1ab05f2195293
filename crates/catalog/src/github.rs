//! Tools backed by the `gh` command-line program.
//!
//! Every tool runs `gh` with an argument vector; nothing is passed through a
//! shell. Listing tools request `--json` output with a fixed field list.

use serde_json::json;
use toolbridge_core::{
    ArgvBuilder, BridgeError, OutputSpec, ParamContract, ParamSpec, ParamType, ProgramInvocation,
    RegisteredTool, ScratchInput, ToolDescriptor, ToolPlan, ValidatedArgs,
};

use crate::common::{
    limit_token, login, number_token, opt_positional, positional, repo_slug,
};

pub const PROGRAM: &str = "gh";
const DEFAULT_LIMIT: i64 = 30;
const DEFAULT_RUN_LIMIT: i64 = 20;

const REPO_LIST_FIELDS: &str = "name,description,url,isPrivate,updatedAt";
const REPO_VIEW_FIELDS: &str =
    "name,description,url,homepageUrl,isPrivate,defaultBranchRef,stargazerCount,forkCount";
const ISSUE_LIST_FIELDS: &str = "number,title,state,author,labels,createdAt,url";
const ISSUE_VIEW_FIELDS: &str =
    "number,title,body,state,author,labels,assignees,comments,createdAt,url";
const PR_LIST_FIELDS: &str = "number,title,state,author,baseRefName,headRefName,createdAt,url";
const PR_VIEW_FIELDS: &str =
    "number,title,body,state,author,baseRefName,headRefName,commits,files,comments,reviews,url";
const RUN_LIST_FIELDS: &str =
    "databaseId,displayTitle,status,conclusion,workflowName,createdAt,url";
const SEARCH_REPO_FIELDS: &str = "fullName,description,url,stargazersCount,updatedAt";
const SEARCH_ISSUE_FIELDS: &str = "number,title,repository,state,url,createdAt";
const BRANCH_FILTER: &str = ".[] | {name, protected}";

fn gh(argv: ArgvBuilder, output: OutputSpec) -> Result<ToolPlan, BridgeError> {
    Ok(ToolPlan::program(
        ProgramInvocation::new(PROGRAM, argv.build()),
        output,
    ))
}

fn repo() -> ParamSpec {
    ParamSpec::string("Repository in owner/repo format").required()
}

fn number(what: &str) -> ParamSpec {
    ParamSpec::integer(format!("{} number", what)).required()
}

fn limit(default: i64, what: &str) -> ParamSpec {
    ParamSpec::integer(format!("Max {} to return (default: {})", what, default))
        .default_value(json!(default))
}

fn tool(
    name: &str,
    description: &str,
    params: ParamContract,
    translate: fn(&ValidatedArgs) -> Result<ToolPlan, BridgeError>,
) -> RegisteredTool {
    RegisteredTool::new(ToolDescriptor::new(name, description, params), translate)
}

pub fn tools() -> Vec<RegisteredTool> {
    vec![
        tool(
            "github_repo_list",
            "List repositories for the authenticated user or an organization",
            ParamContract::new()
                .param(
                    "owner",
                    ParamSpec::string("Organization or user (defaults to the authenticated user)"),
                )
                .param("limit", limit(DEFAULT_LIMIT, "repos")),
            repo_list,
        ),
        tool(
            "github_repo_view",
            "Get details about a repository",
            ParamContract::new().param("repo", repo()),
            repo_view,
        ),
        tool(
            "github_repo_clone",
            "Clone a repository",
            ParamContract::new()
                .param("repo", repo())
                .param("directory", ParamSpec::string("Local directory to clone into")),
            repo_clone,
        ),
        tool(
            "github_issue_list",
            "List issues in a repository",
            ParamContract::new()
                .param("repo", repo())
                .param(
                    "state",
                    ParamSpec::string("Issue state filter").one_of(&["open", "closed", "all"]),
                )
                .param("label", ParamSpec::string("Filter by label"))
                .param("limit", limit(DEFAULT_LIMIT, "issues")),
            issue_list,
        ),
        tool(
            "github_issue_view",
            "View a specific issue",
            ParamContract::new()
                .param("repo", repo())
                .param("number", number("Issue")),
            issue_view,
        ),
        tool(
            "github_issue_create",
            "Create a new issue",
            ParamContract::new()
                .param("repo", repo())
                .param("title", ParamSpec::string("Issue title").required())
                .param("body", ParamSpec::string("Issue body"))
                .param(
                    "labels",
                    ParamSpec::array_of(ParamType::String, "Labels to add"),
                )
                .param(
                    "assignees",
                    ParamSpec::array_of(ParamType::String, "Users to assign"),
                ),
            issue_create,
        ),
        tool(
            "github_issue_close",
            "Close an issue",
            ParamContract::new()
                .param("repo", repo())
                .param("number", number("Issue"))
                .param(
                    "reason",
                    ParamSpec::string("Close reason").one_of(&["completed", "not_planned"]),
                ),
            issue_close,
        ),
        tool(
            "github_issue_comment",
            "Add a comment to an issue",
            ParamContract::new()
                .param("repo", repo())
                .param("number", number("Issue"))
                .param("body", ParamSpec::string("Comment text").required()),
            issue_comment,
        ),
        tool(
            "github_pr_list",
            "List pull requests in a repository",
            ParamContract::new()
                .param("repo", repo())
                .param(
                    "state",
                    ParamSpec::string("PR state filter")
                        .one_of(&["open", "closed", "merged", "all"]),
                )
                .param("base", ParamSpec::string("Filter by base branch"))
                .param("limit", limit(DEFAULT_LIMIT, "pull requests")),
            pr_list,
        ),
        tool(
            "github_pr_view",
            "View a specific pull request",
            ParamContract::new()
                .param("repo", repo())
                .param("number", number("PR")),
            pr_view,
        ),
        tool(
            "github_pr_create",
            "Create a new pull request",
            ParamContract::new()
                .param("repo", repo())
                .param("title", ParamSpec::string("PR title").required())
                .param("body", ParamSpec::string("PR description"))
                .param("base", ParamSpec::string("Base branch"))
                .param("head", ParamSpec::string("Head branch to merge from").required())
                .param("draft", ParamSpec::boolean("Create as draft PR")),
            pr_create,
        ),
        tool(
            "github_pr_merge",
            "Merge a pull request",
            ParamContract::new()
                .param("repo", repo())
                .param("number", number("PR"))
                .param(
                    "method",
                    ParamSpec::string("Merge method").one_of(&["merge", "squash", "rebase"]),
                )
                .param(
                    "delete_branch",
                    ParamSpec::boolean("Delete branch after merge"),
                ),
            pr_merge,
        ),
        tool(
            "github_pr_review",
            "Submit a review on a pull request",
            ParamContract::new()
                .param("repo", repo())
                .param("number", number("PR"))
                .param(
                    "event",
                    ParamSpec::string("Review action")
                        .one_of(&["APPROVE", "REQUEST_CHANGES", "COMMENT"])
                        .required(),
                )
                .param("body", ParamSpec::string("Review comment")),
            pr_review,
        ),
        tool(
            "github_pr_comment",
            "Add a comment to a pull request",
            ParamContract::new()
                .param("repo", repo())
                .param("number", number("PR"))
                .param("body", ParamSpec::string("Comment text").required()),
            pr_comment,
        ),
        tool(
            "github_branch_list",
            "List branches in a repository",
            ParamContract::new().param("repo", repo()),
            branch_list,
        ),
        tool(
            "github_release_list",
            "List releases in a repository",
            ParamContract::new()
                .param("repo", repo())
                .param("limit", limit(DEFAULT_LIMIT, "releases")),
            release_list,
        ),
        tool(
            "github_release_create",
            "Create a new release",
            ParamContract::new()
                .param("repo", repo())
                .param("tag", ParamSpec::string("Tag name for the release").required())
                .param("title", ParamSpec::string("Release title"))
                .param(
                    "notes",
                    ParamSpec::string("Release notes (generated when omitted)"),
                )
                .param("draft", ParamSpec::boolean("Create as draft"))
                .param("prerelease", ParamSpec::boolean("Mark as prerelease")),
            release_create,
        ),
        tool(
            "github_gist_create",
            "Create a new gist",
            ParamContract::new()
                .param("filename", ParamSpec::string("Filename for the gist").required())
                .param("content", ParamSpec::string("Content of the gist").required())
                .param("description", ParamSpec::string("Gist description"))
                .param(
                    "public",
                    ParamSpec::boolean("Make gist public (default: false)"),
                ),
            gist_create,
        ),
        tool(
            "github_gist_list",
            "List your gists",
            ParamContract::new().param("limit", limit(DEFAULT_LIMIT, "gists")),
            gist_list,
        ),
        tool(
            "github_workflow_list",
            "List GitHub Actions workflows",
            ParamContract::new().param("repo", repo()),
            workflow_list,
        ),
        tool(
            "github_workflow_run",
            "Trigger a workflow run",
            ParamContract::new()
                .param("repo", repo())
                .param(
                    "workflow",
                    ParamSpec::string("Workflow file name or ID").required(),
                )
                .param("ref", ParamSpec::string("Branch or tag to run on")),
            workflow_run,
        ),
        tool(
            "github_run_list",
            "List recent workflow runs",
            ParamContract::new()
                .param("repo", repo())
                .param("workflow", ParamSpec::string("Filter by workflow name"))
                .param("limit", limit(DEFAULT_RUN_LIMIT, "runs")),
            run_list,
        ),
        tool(
            "github_search_repos",
            "Search for repositories",
            ParamContract::new()
                .param("query", ParamSpec::string("Search query").required())
                .param("limit", limit(DEFAULT_LIMIT, "results")),
            search_repos,
        ),
        tool(
            "github_search_issues",
            "Search for issues and PRs",
            ParamContract::new()
                .param("query", ParamSpec::string("Search query").required())
                .param("limit", limit(DEFAULT_LIMIT, "results")),
            search_issues,
        ),
        tool(
            "github_user_view",
            "View user profile",
            ParamContract::new().param(
                "username",
                ParamSpec::string("GitHub username (defaults to the authenticated user)"),
            ),
            user_view,
        ),
        tool(
            "github_notifications",
            "List your notifications",
            ParamContract::new().param("limit", limit(DEFAULT_LIMIT, "notifications")),
            notifications,
        ),
    ]
}

fn repo_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["repo", "list"])
        .opt_arg(opt_positional(args, "owner")?)
        .value("--limit", limit_token(args, DEFAULT_LIMIT))
        .value("--json", REPO_LIST_FIELDS);
    gh(argv, OutputSpec::json())
}

fn repo_view(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["repo", "view"])
        .arg(repo_slug(args, "repo")?)
        .value("--json", REPO_VIEW_FIELDS);
    gh(argv, OutputSpec::json())
}

fn repo_clone(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["repo", "clone"])
        .arg(repo_slug(args, "repo")?)
        .opt_arg(opt_positional(args, "directory")?);
    gh(argv, OutputSpec::text())
}

fn issue_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["issue", "list"])
        .value("-R", repo_slug(args, "repo")?)
        .opt_value("--state", args.str("state"))
        .opt_value("--label", args.str("label"))
        .value("--limit", limit_token(args, DEFAULT_LIMIT))
        .value("--json", ISSUE_LIST_FIELDS);
    gh(argv, OutputSpec::json())
}

fn issue_view(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["issue", "view"])
        .arg(number_token(args, "number")?)
        .value("-R", repo_slug(args, "repo")?)
        .value("--json", ISSUE_VIEW_FIELDS);
    gh(argv, OutputSpec::json())
}

fn issue_create(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["issue", "create"])
        .value("-R", repo_slug(args, "repo")?)
        .value("--title", args.require_str("title")?)
        .opt_value("--body", args.str("body"))
        .joined("--label", &args.str_list("labels"), ',')
        .joined("--assignee", &args.str_list("assignees"), ',');
    gh(argv, OutputSpec::text())
}

fn issue_close(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let reason = args.str("reason").map(|r| match r {
        "not_planned" => "not planned",
        other => other,
    });
    let argv = ArgvBuilder::new(&["issue", "close"])
        .arg(number_token(args, "number")?)
        .value("-R", repo_slug(args, "repo")?)
        .opt_value("--reason", reason);
    gh(argv, OutputSpec::text())
}

fn issue_comment(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["issue", "comment"])
        .arg(number_token(args, "number")?)
        .value("-R", repo_slug(args, "repo")?)
        .value("--body", args.require_str("body")?);
    gh(argv, OutputSpec::text())
}

fn pr_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["pr", "list"])
        .value("-R", repo_slug(args, "repo")?)
        .opt_value("--state", args.str("state"))
        .opt_value("--base", args.str("base"))
        .value("--limit", limit_token(args, DEFAULT_LIMIT))
        .value("--json", PR_LIST_FIELDS);
    gh(argv, OutputSpec::json())
}

fn pr_view(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["pr", "view"])
        .arg(number_token(args, "number")?)
        .value("-R", repo_slug(args, "repo")?)
        .value("--json", PR_VIEW_FIELDS);
    gh(argv, OutputSpec::json())
}

fn pr_create(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["pr", "create"])
        .value("-R", repo_slug(args, "repo")?)
        .value("--title", args.require_str("title")?)
        .value("--head", args.require_str("head")?)
        .opt_value("--base", args.str("base"))
        .opt_value("--body", args.str("body"))
        .switch("--draft", args.flag("draft"));
    gh(argv, OutputSpec::text())
}

fn pr_merge(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["pr", "merge"])
        .arg(number_token(args, "number")?)
        .value("-R", repo_slug(args, "repo")?)
        .choice(
            args.str("method"),
            &[("squash", "--squash"), ("rebase", "--rebase")],
            "--merge",
        )
        .switch("--delete-branch", args.flag("delete_branch"));
    gh(argv, OutputSpec::text())
}

fn pr_review(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["pr", "review"])
        .arg(number_token(args, "number")?)
        .value("-R", repo_slug(args, "repo")?)
        .choice(
            args.str("event"),
            &[
                ("APPROVE", "--approve"),
                ("REQUEST_CHANGES", "--request-changes"),
            ],
            "--comment",
        )
        .opt_value("--body", args.str("body"));
    gh(argv, OutputSpec::text())
}

fn pr_comment(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["pr", "comment"])
        .arg(number_token(args, "number")?)
        .value("-R", repo_slug(args, "repo")?)
        .value("--body", args.require_str("body")?);
    gh(argv, OutputSpec::text())
}

fn branch_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let endpoint = format!("repos/{}/branches", repo_slug(args, "repo")?);
    let argv = ArgvBuilder::new(&["api"])
        .arg(endpoint)
        .flag("--paginate")
        .value("--jq", BRANCH_FILTER);
    gh(argv, OutputSpec::json_lines())
}

fn release_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["release", "list"])
        .value("-R", repo_slug(args, "repo")?)
        .value("--limit", limit_token(args, DEFAULT_LIMIT));
    gh(argv, OutputSpec::auto())
}

fn release_create(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["release", "create"])
        .arg(positional(args, "tag")?)
        .value("-R", repo_slug(args, "repo")?)
        .opt_value("--title", args.str("title"))
        .value_or_flag("--notes", args.str("notes"), "--generate-notes")
        .switch("--draft", args.flag("draft"))
        .switch("--prerelease", args.flag("prerelease"));
    gh(argv, OutputSpec::text())
}

fn gist_create(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let scratch = ScratchInput {
        file_name: args.require_str("filename")?.to_string(),
        contents: args.require_str("content")?.to_string(),
    };
    let argv = ArgvBuilder::new(&["gist", "create"])
        .scratch_path()
        .opt_value("--desc", args.str("description"))
        .switch("--public", args.flag("public"));
    Ok(ToolPlan::program(
        ProgramInvocation::new(PROGRAM, argv.build()).with_scratch(scratch),
        OutputSpec::text(),
    ))
}

fn gist_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["gist", "list"]).value("--limit", limit_token(args, DEFAULT_LIMIT));
    gh(argv, OutputSpec::auto())
}

fn workflow_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["workflow", "list"]).value("-R", repo_slug(args, "repo")?);
    gh(argv, OutputSpec::auto())
}

fn workflow_run(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let workflow = positional(args, "workflow")?;
    let argv = ArgvBuilder::new(&["workflow", "run"])
        .arg(workflow)
        .value("-R", repo_slug(args, "repo")?)
        .opt_value("--ref", args.str("ref"));
    gh(
        argv,
        OutputSpec::text().replaced_with(format!("Workflow {} triggered", workflow)),
    )
}

fn run_list(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["run", "list"])
        .value("-R", repo_slug(args, "repo")?)
        .opt_value("--workflow", args.str("workflow"))
        .value("--limit", limit_token(args, DEFAULT_RUN_LIMIT))
        .value("--json", RUN_LIST_FIELDS);
    gh(argv, OutputSpec::json())
}

fn search(
    kind: &'static str,
    fields: &'static str,
    args: &ValidatedArgs,
) -> Result<ToolPlan, BridgeError> {
    let argv = ArgvBuilder::new(&["search", kind])
        .value("--limit", limit_token(args, DEFAULT_LIMIT))
        .value("--json", fields)
        .end_of_flags()
        .arg(args.require_str("query")?);
    gh(argv, OutputSpec::json())
}

fn search_repos(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    search("repos", SEARCH_REPO_FIELDS, args)
}

fn search_issues(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    search("issues", SEARCH_ISSUE_FIELDS, args)
}

fn user_view(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    let endpoint = match login(args, "username")? {
        Some(name) => format!("users/{}", name),
        None => "user".to_string(),
    };
    gh(ArgvBuilder::new(&["api"]).arg(endpoint), OutputSpec::json())
}

fn notifications(args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
    gh(
        ArgvBuilder::new(&["api", "notifications"]),
        OutputSpec::json().limited(args.i64("limit")),
    )
}
