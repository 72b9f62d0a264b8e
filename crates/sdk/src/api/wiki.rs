//! Wiki API endpoints.

use crate::client::DoorayClient;
use crate::error::DoorayResult;
use crate::types::{Body, Page, Paging};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wiki API for browsing and editing wiki pages.
pub struct WikiApi<'a> {
    client: &'a DoorayClient,
}

impl<'a> WikiApi<'a> {
    pub(crate) fn new(client: &'a DoorayClient) -> Self {
        Self { client }
    }

    /// List wiki projects visible to the token owner.
    pub async fn list(&self, paging: Paging) -> DoorayResult<Page> {
        let response = self
            .client
            .http
            .get_with_query(&["wiki", "v1", "wikis"], &paging)
            .await?;
        Ok(response.into_page())
    }

    /// List pages of a wiki, optionally only the children of `parent_page_id`.
    pub async fn pages(&self, wiki_id: &str, parent_page_id: Option<&str>) -> DoorayResult<Page> {
        let query = PagesQuery { parent_page_id };
        let response = self
            .client
            .http
            .get_with_query(&["wiki", "v1", "wikis", wiki_id, "pages"], &query)
            .await?;
        Ok(response.into_page())
    }

    /// Get a single page including its body.
    pub async fn page(&self, wiki_id: &str, page_id: &str) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .get(&["wiki", "v1", "wikis", wiki_id, "pages", page_id])
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Create a page.
    pub async fn create_page(
        &self,
        wiki_id: &str,
        request: &CreateWikiPageRequest,
    ) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .post(&["wiki", "v1", "wikis", wiki_id, "pages"], request)
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }

    /// Update a page's subject and body.
    pub async fn update_page(
        &self,
        wiki_id: &str,
        page_id: &str,
        request: &UpdateWikiPageRequest,
    ) -> DoorayResult<Value> {
        let response = self
            .client
            .http
            .put(&["wiki", "v1", "wikis", wiki_id, "pages", page_id], request)
            .await?;
        Ok(response.into_result().unwrap_or(Value::Null))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PagesQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_page_id: Option<&'a str>,
}

/// Request to create a wiki page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWikiPageRequest {
    pub subject: String,
    pub body: Body,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_page_id: Option<String>,
}

/// Request to update a wiki page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWikiPageRequest {
    pub subject: String,
    pub body: Body,
}
