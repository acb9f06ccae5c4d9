//! Time-limited, read-only view URLs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::auth::Identity;
use crate::s3::S3Location;
use crate::sigv4::{self, Credentials};

/// Default validity of an issued URL.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Longest validity S3 accepts for a presigned URL (7 days).
pub const MAX_TTL_SECS: u64 = 604_800;

/// Signed capability to read one blob, displayed inline.
///
/// Grants are handed to the caller and never persisted or revoked; they
/// simply expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessGrant {
    pub blob_name: String,
    pub expires_at: DateTime<Utc>,
    pub issued_to: String,
    pub url: String,
}

/// Issues access URLs for blobs. Does not check that the blob exists.
pub trait AccessUrlIssuer: Send + Sync {
    fn issue(&self, identity: &Identity, blob_name: &str) -> AccessGrant;
}

/// Issues S3 presigned `GET` URLs with `response-content-disposition=inline`.
pub struct S3Presigner {
    location: S3Location,
    creds: Credentials,
    ttl_secs: u64,
}

impl S3Presigner {
    pub fn new(location: S3Location, creds: Credentials, ttl_secs: u64) -> Self {
        Self {
            location,
            creds,
            ttl_secs: ttl_secs.clamp(1, MAX_TTL_SECS),
        }
    }

    /// Issue a grant as of `now`.
    pub fn issue_at(&self, identity: &Identity, blob_name: &str, now: DateTime<Utc>) -> AccessGrant {
        let path = self.location.object_path(blob_name);
        let target = self.location.target("GET", &path);
        let url = sigv4::presign(
            &target,
            &self.location.region,
            &self.creds,
            &[("response-content-disposition", "inline")],
            self.ttl_secs,
            now,
        );
        AccessGrant {
            blob_name: blob_name.to_string(),
            expires_at: now + Duration::seconds(self.ttl_secs as i64),
            issued_to: identity.as_str().to_string(),
            url,
        }
    }
}

impl AccessUrlIssuer for S3Presigner {
    fn issue(&self, identity: &Identity, blob_name: &str) -> AccessGrant {
        let grant = self.issue_at(identity, blob_name, Utc::now());
        tracing::debug!(
            blob = %grant.blob_name,
            user = %grant.issued_to,
            expires_at = %grant.expires_at,
            "issued access url"
        );
        grant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArtifactNaming, StorageConfig};
    use chrono::TimeZone;

    fn presigner(ttl: u64) -> S3Presigner {
        let storage = StorageConfig {
            bucket: "docs".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            artifact_naming: ArtifactNaming::PerDocument,
            url_ttl_secs: ttl,
        };
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        S3Presigner::new(S3Location::from_config(&storage), creds, ttl)
    }

    #[test]
    fn grant_is_inline_read_with_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let grant = presigner(DEFAULT_TTL_SECS).issue_at(&Identity::new("alice"), "highlighted_a.pdf", now);
        assert_eq!(grant.blob_name, "highlighted_a.pdf");
        assert_eq!(grant.issued_to, "alice");
        assert_eq!(grant.expires_at, now + Duration::hours(1));
        assert!(grant
            .url
            .starts_with("https://docs.s3.us-east-1.amazonaws.com/highlighted_a.pdf?"));
        assert!(grant.url.contains("X-Amz-Expires=3600"));
        assert!(grant.url.contains("response-content-disposition=inline"));
        assert!(grant.url.contains("X-Amz-Signature="));
    }

    #[test]
    fn issuances_at_different_instants_differ() {
        let p = presigner(DEFAULT_TTL_SECS);
        let who = Identity::new("bob");
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let a = p.issue_at(&who, "x.docx", t0);
        let b = p.issue_at(&who, "x.docx", t0 + Duration::seconds(1));
        assert_ne!(a.url, b.url);
        assert_eq!(p.issue_at(&who, "x.docx", t0).url, a.url);
    }

    #[test]
    fn ttl_is_clamped_to_s3_maximum() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let grant = presigner(10 * MAX_TTL_SECS).issue_at(&Identity::new("c"), "y.pdf", now);
        assert!(grant.url.contains("X-Amz-Expires=604800"));
    }
}
