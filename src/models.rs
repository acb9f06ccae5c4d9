//! Search hit types.
//!
//! Field names follow the search index schema, so hits deserialize straight
//! from the search service response and serialize back out with the same
//! names plus the fields the assembler adds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One document returned by the search service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Blob name of the stored document; the document identifier.
    pub metadata_storage_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    #[serde(rename = "Category", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Extracted text of the document.
    #[serde(default)]
    pub content: String,
    /// Anything else the service returned (e.g. `@search.score`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchHit {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            metadata_storage_name: name.into(),
            ..Default::default()
        }
    }
}

/// A hit as returned to the client: the original fields plus a view link
/// and a highlighted snippet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedHit {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub view_url: String,
    pub highlighted_content: String,
}
