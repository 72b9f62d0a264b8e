// Wiki tools: browse and edit Dooray wiki pages

use super::{page_json, paging, paging_properties, parse_args, respond, with_properties};
use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_object, json_schema_string, Tool, ToolContext};
use anyhow::Result;
use dooray_sdk::api::{CreateWikiPageRequest, UpdateWikiPageRequest};
use dooray_sdk::{Body, DoorayClient};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Tool to list wiki projects
pub struct WikiListProjectsTool {
    client: Arc<DoorayClient>,
}

impl WikiListProjectsTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    page: Option<u32>,
    size: Option<u32>,
}

#[async_trait::async_trait]
impl Tool for WikiListProjectsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_wiki_list_projects".to_string(),
            description: "List the wiki projects you can access.".to_string(),
            input_schema: json_schema_object(paging_properties(), vec![]),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ListArgs = parse_args("dooray_wiki_list_projects", arguments)?;
        let page = self.client.wiki().list(paging(args.page, args.size)).await;
        respond(page.map(page_json))
    }
}

/// Tool to list pages of a wiki
pub struct WikiListPagesTool {
    client: Arc<DoorayClient>,
}

impl WikiListPagesTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListPagesArgs {
    wiki_id: String,
    parent_page_id: Option<String>,
}

#[async_trait::async_trait]
impl Tool for WikiListPagesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_wiki_list_pages".to_string(),
            description: "List pages of a wiki. Without parent_page_id the top-level pages are returned.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "wiki_id": json_schema_string("Wiki ID"),
                    "parent_page_id": json_schema_string("Only list children of this page")
                }),
                vec!["wiki_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: ListPagesArgs = parse_args("dooray_wiki_list_pages", arguments)?;
        let pages = self
            .client
            .wiki()
            .pages(&args.wiki_id, args.parent_page_id.as_deref())
            .await;
        respond(pages.map(page_json))
    }
}

/// Tool to read one wiki page
pub struct WikiGetPageTool {
    client: Arc<DoorayClient>,
}

impl WikiGetPageTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct PageArgs {
    wiki_id: String,
    page_id: String,
}

#[async_trait::async_trait]
impl Tool for WikiGetPageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_wiki_get_page".to_string(),
            description: "Get a wiki page including its body.".to_string(),
            input_schema: json_schema_object(
                json!({
                    "wiki_id": json_schema_string("Wiki ID"),
                    "page_id": json_schema_string("Page ID")
                }),
                vec!["wiki_id", "page_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: PageArgs = parse_args("dooray_wiki_get_page", arguments)?;
        respond(self.client.wiki().page(&args.wiki_id, &args.page_id).await)
    }
}

/// Tool to create a wiki page
pub struct WikiCreatePageTool {
    client: Arc<DoorayClient>,
}

impl WikiCreatePageTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CreatePageArgs {
    wiki_id: String,
    subject: String,
    content: String,
    parent_page_id: Option<String>,
}

fn page_body_properties() -> Value {
    json!({
        "subject": {"type": "string", "minLength": 1, "description": "Page title"},
        "content": json_schema_string("Page body in Markdown")
    })
}

#[async_trait::async_trait]
impl Tool for WikiCreatePageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_wiki_create_page".to_string(),
            description: "Create a wiki page with a Markdown body.".to_string(),
            input_schema: json_schema_object(
                with_properties(
                    json!({
                        "wiki_id": json_schema_string("Wiki ID"),
                        "parent_page_id": json_schema_string("Parent page ID")
                    }),
                    page_body_properties(),
                ),
                vec!["wiki_id", "subject", "content"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: CreatePageArgs = parse_args("dooray_wiki_create_page", arguments)?;
        let request = CreateWikiPageRequest {
            subject: args.subject,
            body: Body::markdown(args.content),
            parent_page_id: args.parent_page_id,
        };
        respond(self.client.wiki().create_page(&args.wiki_id, &request).await)
    }
}

/// Tool to replace the subject and body of a wiki page
pub struct WikiUpdatePageTool {
    client: Arc<DoorayClient>,
}

impl WikiUpdatePageTool {
    pub fn new(client: Arc<DoorayClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct UpdatePageArgs {
    wiki_id: String,
    page_id: String,
    subject: String,
    content: String,
}

#[async_trait::async_trait]
impl Tool for WikiUpdatePageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "dooray_wiki_update_page".to_string(),
            description: "Replace the title and Markdown body of a wiki page.".to_string(),
            input_schema: json_schema_object(
                with_properties(
                    json!({
                        "wiki_id": json_schema_string("Wiki ID"),
                        "page_id": json_schema_string("Page ID")
                    }),
                    page_body_properties(),
                ),
                vec!["wiki_id", "page_id", "subject", "content"],
            ),
        }
    }

    async fn execute(&self, arguments: Value, _ctx: ToolContext) -> Result<CallToolResult> {
        let args: UpdatePageArgs = parse_args("dooray_wiki_update_page", arguments)?;
        let request = UpdateWikiPageRequest {
            subject: args.subject,
            body: Body::markdown(args.content),
        };
        respond(
            self.client
                .wiki()
                .update_page(&args.wiki_id, &args.page_id, &request)
                .await,
        )
    }
}
