//! AWS Signature Version 4 for S3.
//!
//! Two flavors are needed: header signing for the requests the service makes
//! itself (object reads and artifact writes), and query-string presigning for
//! the time-limited view URLs handed to browsers.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for signing.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Payload hash used for presigned URLs, where the body is not known.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// AWS credentials.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// The resource a signature covers.
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub method: &'a str,
    /// `http` or `https`.
    pub scheme: &'a str,
    /// Host header value, including a port when non-default.
    pub host: &'a str,
    /// Already URI-encoded absolute path (the canonical URI).
    pub path: &'a str,
}

/// Signs a request with an `Authorization` header.
///
/// Returns the headers to send: `Authorization`, `x-amz-content-sha256`,
/// `x-amz-date`, and `x-amz-security-token` when a session token is set.
/// `host` is signed but left for the HTTP client to send.
pub fn sign_headers(
    target: &Target<'_>,
    region: &str,
    creds: &Credentials,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), target.host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers = signed_header_list(&headers);
    let canonical_request = canonical_request(
        target,
        "",
        &canonical_headers(&headers),
        &signed_headers,
        payload_hash,
    );

    let credential_scope = credential_scope(&date_stamp, region);
    let signature = signature(creds, &date_stamp, region, &amz_date, &credential_scope, &canonical_request);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, creds.access_key_id, credential_scope, signed_headers, signature
    );

    let mut out: Vec<(String, String)> = headers.into_iter().filter(|(k, _)| k != "host").collect();
    out.push(("Authorization".to_string(), authorization));
    out
}

/// Builds a presigned URL valid for `expires_secs` from `now`.
///
/// `extra_params` are response overrides such as
/// `response-content-disposition`; they are covered by the signature.
pub fn presign(
    target: &Target<'_>,
    region: &str,
    creds: &Credentials,
    extra_params: &[(&str, &str)],
    expires_secs: u64,
    now: DateTime<Utc>,
) -> String {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let credential_scope = credential_scope(&date_stamp, region);

    let mut params: Vec<(String, String)> = vec![
        ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
        (
            "X-Amz-Credential".to_string(),
            format!("{}/{}", creds.access_key_id, credential_scope),
        ),
        ("X-Amz-Date".to_string(), amz_date.clone()),
        ("X-Amz-Expires".to_string(), expires_secs.to_string()),
        ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
    ];
    if let Some(ref token) = creds.session_token {
        params.push(("X-Amz-Security-Token".to_string(), token.clone()));
    }
    for (k, v) in extra_params {
        params.push((k.to_string(), v.to_string()));
    }

    // Canonical query string: encoded pairs sorted by encoded key.
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    let canonical_querystring = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let headers = vec![("host".to_string(), target.host.to_string())];
    let canonical_request = canonical_request(
        target,
        &canonical_querystring,
        &canonical_headers(&headers),
        "host",
        UNSIGNED_PAYLOAD,
    );
    let signature = signature(creds, &date_stamp, region, &amz_date, &credential_scope, &canonical_request);

    format!(
        "{}://{}{}?{}&X-Amz-Signature={}",
        target.scheme, target.host, target.path, canonical_querystring, signature
    )
}

fn credential_scope(date_stamp: &str, region: &str) -> String {
    format!("{}/{}/{}/aws4_request", date_stamp, region, SERVICE)
}

fn signed_header_list(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

fn canonical_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect()
}

fn canonical_request(
    target: &Target<'_>,
    canonical_querystring: &str,
    canonical_headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        target.method,
        target.path,
        canonical_querystring,
        canonical_headers,
        signed_headers,
        payload_hash
    )
}

fn signature(
    creds: &Credentials,
    date_stamp: &str,
    region: &str,
    amz_date: &str,
    credential_scope: &str,
    canonical_request: &str,
) -> String {
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );
    let signing_key = derive_signing_key(&creds.secret_access_key, date_stamp, region, SERVICE);
    hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
}

/// Compute the hex-encoded SHA-256 hash of data.
pub fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986.
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
pub fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Encodes an object key for use in a path, keeping `/` separators.
pub fn encode_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}
