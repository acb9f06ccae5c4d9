//! Highlighted artifact cache.
//!
//! Every highlight request regenerates the artifact and overwrites the
//! stored copy; there is no query-aware lookup. With the default
//! [`ArtifactNaming::PerDocument`] scheme the last query wins, so two users
//! searching the same document with different queries may see each other's
//! highlights. [`ArtifactNaming::PerQuery`] keys the artifact by a query
//! fingerprint instead.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::annotate::{self, AnnotateOutcome};
use crate::blob::BlobStore;
use crate::config::ArtifactNaming;
use crate::query::Query;

/// Name prefix of derived artifacts.
pub const ARTIFACT_PREFIX: &str = "highlighted_";

/// What happened to a document on its way through the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// A highlighted artifact was written under the returned name.
    Highlighted,
    /// Nothing to highlight (empty query); the original is served.
    Unchanged,
    /// Format not annotatable; the original is served.
    Unsupported,
    /// Annotation failed; the original is served.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Blob to serve: the artifact, or the original document.
    pub blob_name: String,
    pub status: ArtifactStatus,
}

/// Derived blob name for `doc_id` under the given naming scheme.
pub fn artifact_name(doc_id: &str, query: &Query, naming: ArtifactNaming) -> String {
    match naming {
        ArtifactNaming::PerDocument => format!("{}{}", ARTIFACT_PREFIX, doc_id),
        ArtifactNaming::PerQuery => {
            format!("{}{}_{}", ARTIFACT_PREFIX, query.fingerprint(), doc_id)
        }
    }
}

pub struct ArtifactCache {
    store: Arc<dyn BlobStore>,
    naming: ArtifactNaming,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn BlobStore>, naming: ArtifactNaming) -> Self {
        Self { store, naming }
    }

    /// Annotates `raw` for `query` and stores the result.
    ///
    /// Returns `Err` only when the upload fails; annotation problems are
    /// reported through [`ArtifactStatus`] with the original name.
    pub async fn get_or_create(
        &self,
        doc_id: &str,
        raw: Vec<u8>,
        query: &Query,
    ) -> Result<CachedArtifact> {
        let original = |status| CachedArtifact {
            blob_name: doc_id.to_string(),
            status,
        };

        if query.is_empty() {
            return Ok(original(ArtifactStatus::Unchanged));
        }

        let name = doc_id.to_string();
        let q = query.clone();
        let outcome = tokio::task::spawn_blocking(move || annotate::annotate(&name, &raw, &q))
            .await
            .unwrap_or_else(|e| AnnotateOutcome::Failed(format!("annotation task: {}", e)));

        match outcome {
            AnnotateOutcome::Annotated(bytes) => {
                let target = artifact_name(doc_id, query, self.naming);
                self.store
                    .put(&target, bytes)
                    .await
                    .with_context(|| format!("Failed to store artifact {}", target))?;
                tracing::info!(doc = %doc_id, artifact = %target, "stored highlighted artifact");
                Ok(CachedArtifact {
                    blob_name: target,
                    status: ArtifactStatus::Highlighted,
                })
            }
            AnnotateOutcome::Unsupported => Ok(original(ArtifactStatus::Unsupported)),
            AnnotateOutcome::Failed(detail) => {
                tracing::warn!(doc = %doc_id, error = %detail, "highlighting failed, serving original");
                Ok(original(ArtifactStatus::Failed(detail)))
            }
        }
    }
}
