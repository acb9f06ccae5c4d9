//! Result assembly: turns raw search hits into viewable, highlighted results.
//!
//! Hits are processed one at a time in search order. For each hit:
//!
//! 1. `file_type` is normalized to the lower-cased extension of the stored name.
//! 2. Annotatable documents are downloaded and passed through the
//!    [`ArtifactCache`], which writes the highlighted artifact.
//! 3. A view URL is issued for the artifact (or the original).
//! 4. The hit's text is highlighted for the inline snippet.
//!
//! A failure in step 2 never fails the batch. The hit falls back to a URL for
//! the original document and its text is returned without markers.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::annotate::{self, DocumentKind};
use crate::auth::Identity;
use crate::blob::BlobStore;
use crate::cache::{ArtifactCache, ArtifactStatus, CachedArtifact};
use crate::grant::AccessUrlIssuer;
use crate::highlight::highlight;
use crate::models::{EnrichedHit, SearchHit};
use crate::query::Query;

pub struct ResultAssembler {
    store: Arc<dyn BlobStore>,
    cache: ArtifactCache,
    issuer: Arc<dyn AccessUrlIssuer>,
}

impl ResultAssembler {
    pub fn new(
        store: Arc<dyn BlobStore>,
        cache: ArtifactCache,
        issuer: Arc<dyn AccessUrlIssuer>,
    ) -> Self {
        Self {
            store,
            cache,
            issuer,
        }
    }

    pub async fn assemble(
        &self,
        identity: &Identity,
        hits: Vec<SearchHit>,
        query: &Query,
    ) -> Vec<EnrichedHit> {
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            out.push(self.enrich(identity, hit, query).await);
        }
        out
    }

    async fn enrich(&self, identity: &Identity, mut hit: SearchHit, query: &Query) -> EnrichedHit {
        let name = hit.metadata_storage_name.clone();
        hit.file_type = Some(annotate::extension(&name));

        let annotatable = DocumentKind::from_name(&name).is_some() && !query.is_empty();
        let (blob, degraded) = if annotatable {
            match self.highlighted(&name, query).await {
                Ok(CachedArtifact {
                    blob_name,
                    status: ArtifactStatus::Failed(_),
                }) => (blob_name, true),
                Ok(artifact) => (artifact.blob_name, false),
                Err(e) => {
                    tracing::warn!(doc = %name, error = %format!("{:#}", e), "serving original document");
                    (name.clone(), true)
                }
            }
        } else {
            (name.clone(), false)
        };

        let grant = self.issuer.issue(identity, &blob);
        let highlighted_content = if degraded {
            hit.content.clone()
        } else {
            highlight(&hit.content, query)
        };

        EnrichedHit {
            hit,
            view_url: grant.url,
            highlighted_content,
        }
    }

    async fn highlighted(&self, name: &str, query: &Query) -> Result<CachedArtifact> {
        let raw = self
            .store
            .get(name)
            .await
            .with_context(|| format!("Failed to download {}", name))?;
        self.cache.get_or_create(name, raw, query).await
    }
}
