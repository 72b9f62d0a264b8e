// Project tools: projects, posts (tasks) and their comments

use super::{page_json, paging, paging_properties, parse_args, respond, with_properties};
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_array, json_schema_object, json_schema_string, Tool, ToolContext};
use anyhow::Result;
use dooray_sdk::api::{CreatePostRequest, PostFilter, PostUsers, Priority, UpdatePostRequest};
use dooray_sdk::{Body, DoorayClient};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Largest page size Dooray accepts for post listings.
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListArgs {
    page: Option<u32>,
    size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PostArgs {
    project_id: String,
    post_id: String,
}

fn post_properties() -> Value {
    json!({
        "project_id": json_schema_string("Project ID"),
        "post_id": json_schema_string("Post (task) ID")
    })
}

fn priority_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["high", "normal", "low"],
        "description": "Priority"
    })
}

fn mime_type_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["text/x-markdown", "text/html"],
        "description": "Body format (default: text/x-markdown)"
    })
}

fn comment_body(content: String, mime_type: Option<&str>) -> Body {
    match mime_type {
        Some("text/html") => Body::html(content),
        _ => Body::markdown(content),
    }
}

fn workflow_class_schema() -> Value {
    json!({
        "type": "string",
        "description": "Comma-separated workflow classes: backlog, registered, working, closed"
    })
}

/// Tool to list projects the caller belongs to
pub struct ProjectListProjectsTool {
    client: Arc<DoorayClient>,
}

impl ProjectListProjectsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for ProjectListProjectsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_list_projects".to_string(),
            description: "List the projects you are a member of.".to_string(),
            input_schema: json_schema_object(paging_properties(), vec![]),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ListArgs = parse_args("dooray_project_list_projects", arguments)?;
        let page = self.client.projects().list(paging(args.page, args.size)).await;
        respond(page.map(page_json))
    }
}

/// Tool to list posts of a project
pub struct ProjectListPostsTool {
    client: Arc<DoorayClient>,
}

impl ProjectListPostsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListPostsArgs {
    project_id: String,
    page: Option<u32>,
    size: Option<u32>,
    workflow_classes: Option<String>,
    subjects: Option<String>,
    order: Option<String>,
}

#[async_trait::async_trait]
impl Tool for ProjectListPostsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_list_posts".to_string(),
            description: "List posts (tasks) of a project, optionally filtered by workflow class or subject.".to_string(),
            input_schema: json_schema_object(
                with_properties(
                    json!({
                        "project_id": json_schema_string("Project ID"),
                        "workflow_classes": workflow_class_schema(),
                        "subjects": json_schema_string("Subject search keyword"),
                        "order": {
                            "type": "string",
                            "enum": ["createdAt", "-createdAt", "postUpdatedAt", "-postUpdatedAt"],
                            "description": "Sort order (default: -createdAt)"
                        }
                    }),
                    paging_properties(),
                ),
                vec!["project_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ListPostsArgs = parse_args("dooray_project_list_posts", arguments)?;
        let filter = PostFilter {
            page: Some(args.page.unwrap_or(0)),
            size: Some(args.size.unwrap_or(20)),
            post_workflow_classes: args.workflow_classes,
            subjects: args.subjects,
            order: args.order,
        };
        let posts = self.client.projects().posts(&args.project_id, &filter).await;
        respond(posts.map(page_json))
    }
}

/// Tool to read one post
pub struct ProjectGetPostTool {
    client: Arc<DoorayClient>,
}

impl ProjectGetPostTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for ProjectGetPostTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_get_post".to_string(),
            description: "Get the details of a post (task).".to_string(),
            input_schema: json_schema_object(post_properties(), vec!["project_id", "post_id"]),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: PostArgs = parse_args("dooray_project_get_post", arguments)?;
        respond(self.client.projects().post(&args.project_id, &args.post_id).await)
    }
}

/// Tool to mark a post as done
pub struct ProjectSetPostDoneTool {
    client: Arc<DoorayClient>,
}

impl ProjectSetPostDoneTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for ProjectSetPostDoneTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_set_post_done".to_string(),
            description: "Mark a post (task) as done.".to_string(),
            input_schema: json_schema_object(post_properties(), vec!["project_id", "post_id"]),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: PostArgs = parse_args("dooray_project_set_post_done", arguments)?;
        respond(self.client.projects().set_done(&args.project_id, &args.post_id).await)
    }
}

/// Tool to create a post
pub struct ProjectCreatePostTool {
    client: Arc<DoorayClient>,
}

impl ProjectCreatePostTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CreatePostArgs {
    project_id: String,
    subject: String,
    body: String,
    #[serde(default)]
    to_member_ids: Vec<String>,
    #[serde(default)]
    cc_member_ids: Vec<String>,
    priority: Option<Priority>,
}

#[async_trait::async_trait]
impl Tool for ProjectCreatePostTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_create_post".to_string(),
            description: "Create a post (task) in a project.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "project_id": json_schema_string("Project ID"),
                    "subject": {"type": "string", "minLength": 1, "description": "Post subject"},
                    "body": json_schema_string("Post body (Markdown)"),
                    "to_member_ids": json_schema_array(json!({"type": "string"}), "Assignee member IDs"),
                    "cc_member_ids": json_schema_array(json!({"type": "string"}), "Watcher member IDs"),
                    "priority": priority_schema()
                }),
                vec!["project_id", "subject", "body"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: CreatePostArgs = parse_args("dooray_project_create_post", arguments)?;
        let request = CreatePostRequest {
            subject: args.subject,
            body: Body::markdown(args.body),
            users: PostUsers {
                to: args.to_member_ids,
                cc: args.cc_member_ids,
            },
            priority: args.priority,
        };
        respond(self.client.projects().create_post(&args.project_id, &request).await)
    }
}

/// Tool to edit a post
pub struct ProjectUpdatePostTool {
    client: Arc<DoorayClient>,
}

impl ProjectUpdatePostTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct UpdatePostArgs {
    project_id: String,
    post_id: String,
    subject: Option<String>,
    body: Option<String>,
    priority: Option<Priority>,
}

#[async_trait::async_trait]
impl Tool for ProjectUpdatePostTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_update_post".to_string(),
            description: "Change the subject, body or priority of a post (task). Omitted fields are kept.".to_string(),
            input_schema: json_schema_object(
                with_properties(
                    post_properties(),
                    json!({
                        "subject": {"type": "string", "minLength": 1, "description": "New subject"},
                        "body": json_schema_string("New body (Markdown)"),
                        "priority": priority_schema()
                    }),
                ),
                vec!["project_id", "post_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: UpdatePostArgs = parse_args("dooray_project_update_post", arguments)?;
        let request = UpdatePostRequest {
            subject: args.subject,
            body: args.body.map(Body::markdown),
            priority: args.priority,
        };
        if request.is_empty() {
            return Ok(CallToolResult::error(
                "Provide at least one of subject, body or priority",
            ));
        }
        respond(
            self.client
                .projects()
                .update_post(&args.project_id, &args.post_id, &request)
                .await,
        )
    }
}

/// Tool to move a post to another workflow state
pub struct ProjectSetWorkflowTool {
    client: Arc<DoorayClient>,
}

impl ProjectSetWorkflowTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct SetWorkflowArgs {
    project_id: String,
    post_id: String,
    workflow_id: String,
}

#[async_trait::async_trait]
impl Tool for ProjectSetWorkflowTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_set_post_workflow".to_string(),
            description: "Move a post (task) to another workflow state.".to_string(),
            input_schema: json_schema_object(
                with_properties(
                    post_properties(),
                    json!({ "workflow_id": json_schema_string("Target workflow ID") }),
                ),
                vec!["project_id", "post_id", "workflow_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: SetWorkflowArgs = parse_args("dooray_project_set_post_workflow", arguments)?;
        respond(
            self.client
                .projects()
                .set_workflow(&args.project_id, &args.post_id, &args.workflow_id)
                .await,
        )
    }
}

/// Tool to list the comments of a post
pub struct ProjectGetCommentsTool {
    client: Arc<DoorayClient>,
}

impl ProjectGetCommentsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListCommentsArgs {
    project_id: String,
    post_id: String,
    page: Option<u32>,
    size: Option<u32>,
}

#[async_trait::async_trait]
impl Tool for ProjectGetCommentsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_get_post_comments".to_string(),
            description: "List the comments of a post (task).".to_string(),
            input_schema: json_schema_object(
                with_properties(post_properties(), paging_properties()),
                vec!["project_id", "post_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ListCommentsArgs = parse_args("dooray_project_get_post_comments", arguments)?;
        let comments = self
            .client
            .projects()
            .comments(&args.project_id, &args.post_id, paging(args.page, args.size))
            .await;
        respond(comments.map(page_json))
    }
}

/// Tool to comment on a post
pub struct ProjectCreateCommentTool {
    client: Arc<DoorayClient>,
}

impl ProjectCreateCommentTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CreateCommentArgs {
    project_id: String,
    post_id: String,
    content: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[async_trait::async_trait]
impl Tool for ProjectCreateCommentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_create_post_comment".to_string(),
            description: "Add a comment to a post (task).".to_string(),
            input_schema: json_schema_object(
                with_properties(
                    post_properties(),
                    json!({
                        "content": {"type": "string", "minLength": 1, "description": "Comment text"},
                        "mime_type": mime_type_schema()
                    }),
                ),
                vec!["project_id", "post_id", "content"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: CreateCommentArgs = parse_args("dooray_project_create_post_comment", arguments)?;
        let body = comment_body(args.content, args.mime_type.as_deref());
        respond(
            self.client
                .projects()
                .create_comment(&args.project_id, &args.post_id, body)
                .await,
        )
    }
}

/// Tool to edit a comment
pub struct ProjectUpdateCommentTool {
    client: Arc<DoorayClient>,
}

impl ProjectUpdateCommentTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateCommentArgs {
    project_id: String,
    post_id: String,
    log_id: String,
    content: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[async_trait::async_trait]
impl Tool for ProjectUpdateCommentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_update_post_comment".to_string(),
            description: "Replace the text of a comment on a post (task).".to_string(),
            input_schema: json_schema_object(
                with_properties(
                    post_properties(),
                    json!({
                        "log_id": json_schema_string("Comment ID"),
                        "content": {"type": "string", "minLength": 1, "description": "New comment text"},
                        "mime_type": mime_type_schema()
                    }),
                ),
                vec!["project_id", "post_id", "log_id", "content"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: UpdateCommentArgs = parse_args("dooray_project_update_post_comment", arguments)?;
        let body = comment_body(args.content, args.mime_type.as_deref());
        respond(
            self.client
                .projects()
                .update_comment(&args.project_id, &args.post_id, &args.log_id, body)
                .await,
        )
    }
}

/// Tool to delete a comment
pub struct ProjectDeleteCommentTool {
    client: Arc<DoorayClient>,
}

impl ProjectDeleteCommentTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CommentArgs {
    project_id: String,
    post_id: String,
    log_id: String,
}

#[async_trait::async_trait]
impl Tool for ProjectDeleteCommentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_delete_post_comment".to_string(),
            description: "Delete a comment from a post (task).".to_string(),
            input_schema: json_schema_object(
                with_properties(post_properties(), json!({ "log_id": json_schema_string("Comment ID") })),
                vec!["project_id", "post_id", "log_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: CommentArgs = parse_args("dooray_project_delete_post_comment", arguments)?;
        let deleted = self
            .client
            .projects()
            .delete_comment(&args.project_id, &args.post_id, &args.log_id)
            .await;
        respond(deleted.map(|_| json!({ "deleted": true, "logId": args.log_id })))
    }
}

/// Tool that pages through every post of a project, reporting progress per
/// page. The only streaming tool.
pub struct ProjectExportPostsTool {
    client: Arc<DoorayClient>,
}

impl ProjectExportPostsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ExportArgs {
    project_id: String,
    workflow_classes: Option<String>,
    page_size: Option<u32>,
    max_posts: Option<usize>,
}

#[async_trait::async_trait]
impl Tool for ProjectExportPostsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_project_export_posts".to_string(),
            description: "Fetch every post of a project page by page. Progress is reported after each page.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "project_id": json_schema_string("Project ID"),
                    "workflow_classes": workflow_class_schema(),
                    "page_size": {"type": "integer", "minimum": 1, "maximum": MAX_PAGE_SIZE, "description": "Posts per request (default: 100)"},
                    "max_posts": {"type": "integer", "minimum": 1, "description": "Stop after this many posts"}
                }),
                vec!["project_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, ctx: ToolContext) -> Result<CallToolResult> {
        let args: ExportArgs = parse_args("dooray_project_export_posts", arguments)?;
        let size = args.page_size.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let limit = args.max_posts.unwrap_or(usize::MAX);

        let mut posts: Vec<Value> = Vec::new();
        let mut total: Option<u64> = None;
        let mut page = 0u32;

        loop {
            if ctx.is_cancelled() {
                anyhow::bail!("export cancelled after {} posts", posts.len());
            }

            let filter = PostFilter {
                page: Some(page),
                size: Some(size),
                post_workflow_classes: args.workflow_classes.clone(),
                subjects: None,
                order: Some("createdAt".to_string()),
            };
            let batch = match self.client.projects().posts(&args.project_id, &filter).await {
                Ok(batch) => batch,
                Err(e) if e.is_api_error() => return Ok(CallToolResult::error(e.to_string())),
                Err(e) => return Err(e.into()),
            };

            total = batch.total_count.or(total);
            let fetched = batch.items.len();
            posts.extend(batch.items);
            posts.truncate(limit);

            let goal = total.map(|t| (t as usize).min(limit)).unwrap_or(limit);
            let message = format!("fetched page {}", page + 1);
            ctx.report_progress(
                posts.len() as f64,
                (goal != usize::MAX).then_some(goal as f64),
                Some(message.as_str()),
            );
            tracing::debug!(project_id = %args.project_id, page, fetched, collected = posts.len(), "Exported post page");

            if fetched < size as usize || posts.len() >= goal {
                break;
            }
            page += 1;
        }

        Ok(CallToolResult::json(&json!({
            "projectId": args.project_id,
            "totalCount": total,
            "count": posts.len(),
            "posts": posts,
        })))
    }

    fn streaming(&self) -> bool {
        true
    }
}
