use crate::error::{Error, Result};
use crate::tokenizer::{term_counts, TermCounts};
use serde::{Deserialize, Serialize};

/// A raw input document, one per record of the data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub body: String,
}

impl Document {
    pub fn new(url: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { url: url.into(), title: title.into(), body: body.into() }
    }

    /// Decode one raw JSON record. `record` is the ordinal used in diagnostics.
    pub fn from_json(raw: &[u8], record: usize) -> Result<Self> {
        let doc: Document = serde_json::from_slice(raw)
            .map_err(|e| Error::Decode { record, reason: e.to_string() })?;
        if doc.url.trim().is_empty() {
            return Err(Error::Decode { record, reason: "`url` must not be empty".into() });
        }
        Ok(doc)
    }
}

/// A document after normalization, as stored in a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedDocument {
    pub url: String,
    /// Raw title, kept for presenting results.
    pub title: String,
    pub title_terms: TermCounts,
    pub body_terms: TermCounts,
}

impl TokenizedDocument {
    /// Title and body are normalized independently.
    pub fn analyze(doc: &Document) -> Self {
        Self {
            url: doc.url.clone(),
            title: doc.title.clone(),
            title_terms: term_counts(&doc.title),
            body_terms: term_counts(&doc.body),
        }
    }

    /// Distinct terms over both fields.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.title_terms
            .keys()
            .chain(self.body_terms.keys().filter(|t| !self.title_terms.contains_key(*t)))
            .map(String::as_str)
    }
}
