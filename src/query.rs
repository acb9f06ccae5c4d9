//! Query term sequence.

use sha2::{Digest, Sha256};

/// Ordered, whitespace-separated terms of a user query.
///
/// Term position drives color assignment, so the order is exactly the order
/// the terms were typed in. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    terms: Vec<String>,
}

impl Query {
    pub fn parse(input: &str) -> Self {
        Self {
            terms: input.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms lower-cased, paired with their color index.
    pub fn indexed_lowercase(&self) -> Vec<(usize, String)> {
        self.terms
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.to_lowercase()))
            .collect()
    }

    /// Lower-cased terms joined by single spaces.
    pub fn normalized(&self) -> String {
        self.terms
            .iter()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Short stable digest of [`normalized`](Query::normalized).
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.normalized().as_bytes());
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.terms.join(" "))
    }
}
