//! Wire types shared by every Dooray endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `header` block present on every Dooray response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeader {
    pub is_successful: bool,
    #[serde(default)]
    pub result_code: i64,
    #[serde(default)]
    pub result_message: Option<String>,
}

/// Response envelope: `{header, result, totalCount?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorayResponse<T> {
    pub header: ResponseHeader,
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<T> DoorayResponse<T> {
    /// The `result` member, if the endpoint returned one.
    pub fn into_result(self) -> Option<T> {
        self.result
    }
}

impl<T> DoorayResponse<Vec<T>> {
    pub fn into_page(self) -> Page<T> {
        Page {
            items: self.result.unwrap_or_default(),
            total_count: self.total_count,
        }
    }
}

/// A page of results from a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T = Value> {
    pub items: Vec<T>,
    pub total_count: Option<u64>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Paging parameters accepted by Dooray list endpoints.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Paging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl Paging {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
        }
    }
}

/// Body of a message, comment or page: `{mimeType, content}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub mime_type: String,
    pub content: String,
}

impl Body {
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            mime_type: "text/x-markdown".to_string(),
            content: content.into(),
        }
    }

    pub fn html(content: impl Into<String>) -> Self {
        Self {
            mime_type: "text/html".to_string(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_deserializes_camel_case() {
        let json = r#"{
            "header": {"isSuccessful": true, "resultCode": 0, "resultMessage": ""},
            "result": [{"id": "1"}],
            "totalCount": 1
        }"#;

        let response: DoorayResponse<Vec<Value>> = serde_json::from_str(json).unwrap();
        assert!(response.header.is_successful);
        assert_eq!(response.total_count, Some(1));
        assert_eq!(response.result.unwrap().len(), 1);
    }

    #[test]
    fn test_envelope_without_result() {
        let json = r#"{"header": {"isSuccessful": true, "resultCode": 0}}"#;

        let response: DoorayResponse<Value> = serde_json::from_str(json).unwrap();
        assert!(response.result.is_none());
        assert!(response.header.result_message.is_none());
    }
}
