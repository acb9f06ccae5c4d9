//! # docmark
//!
//! A search front-end that serves documents with the query's terms
//! highlighted inline.
//!
//! Search itself is delegated to an external full-text index. docmark
//! post-processes each hit: it regenerates the matched document with every
//! query term highlighted in its own color, stores the result next to the
//! original in object storage, and returns a short-lived URL to view it,
//! along with a highlighted text snippet.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────────────────────┐
//! │  HTTP    │──▶│ Search index │──▶│ ResultAssembler (per hit)    │
//! │ (axum)   │   │  (filtered)  │   │  blob get → annotate → put   │
//! └──────────┘   └──────────────┘   │  → presign → snippet         │
//!                                   └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`palette`] | Term index → color, per rendering context |
//! | [`query`] | Query term sequence |
//! | [`highlight`] | `<mark>` wrapping of text snippets |
//! | [`annotate`] | DOCX run highlights and PDF highlight annotations |
//! | [`blob`] | Blob store trait and in-memory store |
//! | [`s3`] | S3-compatible blob store |
//! | [`sigv4`] | AWS Signature V4 |
//! | [`cache`] | Highlighted artifact naming and storage |
//! | [`grant`] | Time-limited view URLs |
//! | [`assemble`] | Per-hit enrichment with graceful fallback |
//! | [`search`] | Search service client and facets |
//! | [`filter`] | OData filter builder |
//! | [`auth`] | HTTP Basic authentication |
//! | [`server`] | HTTP server |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Search hit types |

pub mod annotate;
pub mod assemble;
pub mod auth;
pub mod blob;
pub mod cache;
pub mod config;
pub mod filter;
pub mod grant;
pub mod highlight;
pub mod models;
pub mod palette;
pub mod query;
pub mod s3;
pub mod search;
pub mod server;
pub mod sigv4;
