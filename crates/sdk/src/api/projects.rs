//! Project (task tracker) API endpoints.

use crate::client::DoorayClient;
use crate::error::DoorayResult;
use crate::types::{Body, Page, Paging};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Projects API for projects, posts and post comments.
pub struct ProjectsApi<'a> {
    client: &'a DoorayClient,
}

impl<'a> ProjectsApi<'a> {
    pub(crate) fn new(client: &'a DoorayClient) -> Self {
        Self { client }
    }

    /// List projects the token owner is a member of.
    pub async fn list(&self, paging: Paging) -> DoorayResult<Page> {
        let query = ProjectsQuery {
            member: "me",
            paging,
        };
        let response = self
            .client
            .http
            .get_with_query(&["project", "v1", "projects"], &query)
            .await?;
        Ok(response.into_page())
    }

    /// List posts of a project.
    pub async fn posts(&self, project_id: &str, filter: &PostFilter) -> DoorayResult<Page> {
        let response = self
            .client
            .http
            .get_with_query(&["project", "v1", "projects", project_id, "posts"], filter)
            .await?;
        Ok(response.into_page())
    }

    /// Get a single post.
    pub async fn post(&self, project_id: &str, post_id: &str) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .get(&["project", "v1", "projects", project_id, "posts", post_id])
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Create a post.
    pub async fn create_post(&self, project_id: &str, request: &CreatePostRequest) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(&["project", "v1", "projects", project_id, "posts"], request)
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Update the subject, body or priority of a post. Absent fields are left as they are.
    pub async fn update_post(
        &self,
        project_id: &str,
        post_id: &str,
        request: &UpdatePostRequest,
    ) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .put(&["project", "v1", "projects", project_id, "posts", post_id], request)
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Move a post to another workflow state.
    pub async fn set_workflow(
        &self,
        project_id: &str,
        post_id: &str,
        workflow_id: &str,
    ) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(
                &["project", "v1", "projects", project_id, "posts", post_id, "set-workflow"],
                &json!({ "workflowId": workflow_id }),
            )
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Mark a post as done.
    pub async fn set_done(&self, project_id: &str, post_id: &str) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(
                &["project", "v1", "projects", project_id, "posts", post_id, "set-done"],
                &json!({}),
            )
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// List comments of a post.
    pub async fn comments(
        &self,
        project_id: &str,
        post_id: &str,
        paging: Paging,
    ) -> DoorayResult<Page> {
        let response = self
            .client
            .http
            .get_with_query(
                &["project", "v1", "projects", project_id, "posts", post_id, "logs"],
                &paging,
            )
            .await?;
        Ok(response.into_page())
    }

    /// Add a comment to a post.
    pub async fn create_comment(
        &self,
        project_id: &str,
        post_id: &str,
        body: Body,
    ) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(
                &["project", "v1", "projects", project_id, "posts", post_id, "logs"],
                &json!({ "body": body }),
            )
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Replace the body of a comment.
    pub async fn update_comment(
        &self,
        project_id: &str,
        post_id: &str,
        log_id: &str,
        body: Body,
    ) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .put(
                &["project", "v1", "projects", project_id, "posts", post_id, "logs", log_id],
                &json!({ "body": body }),
            )
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Delete a comment.
    pub async fn delete_comment(&self, project_id: &str, post_id: &str, log_id: &str) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .delete(&["project", "v1", "projects", project_id, "posts", post_id, "logs", log_id])
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }
}

#[derive(Serialize)]
struct ProjectsQuery {
    member: &'static str,
    #[serde(flatten)]
    paging: Paging,
}

/// Filter for listing project posts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Comma-separated workflow classes (`backlog`, `registered`, `working`, `closed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_workflow_classes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<String>,
    /// Sort order, e.g. `-createdAt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

/// Post priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// Assignees and watchers of a post, as organization member ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostUsers {
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "member_refs")]
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "member_refs")]
    pub cc: Vec<String>,
}

impl PostUsers {
    pub fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty()
    }
}

/// Request to create a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub subject: String,
    pub body: Body,
    #[serde(default, skip_serializing_if = "PostUsers::is_empty")]
    pub users: PostUsers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

/// Request to update a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl UpdatePostRequest {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.body.is_none() && self.priority.is_none()
    }
}

/// Dooray wraps each member as `{"type": "member", "member": {"organizationMemberId": ..}}`.
mod member_refs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct MemberRef {
        #[serde(rename = "type")]
        kind: String,
        member: Member,
    }

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Member {
        organization_member_id: String,
    }

    pub fn serialize<S: Serializer>(ids: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        ids.iter()
            .map(|id| MemberRef {
                kind: "member".to_string(),
                member: Member {
                    organization_member_id: id.clone(),
                },
            })
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let refs = Vec::<MemberRef>::deserialize(deserializer)?;
        Ok(refs.into_iter().map(|r| r.member.organization_member_id).collect())
    }
}
