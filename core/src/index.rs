use crate::document::{Document, TokenizedDocument};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Set of document urls for one term.
pub type PostingList = HashSet<String>;

/// Inverted index over one disjoint partition of the corpus.
///
/// Every url in a posting list is a key of `docs`, and a url appears at most once per list.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardIndex {
    pub docs: HashMap<String, TokenizedDocument>,
    pub postings: HashMap<String, PostingList>,
}

impl ShardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a shard from a batch of documents. Duplicate urls keep their first occurrence.
    pub fn build<I>(batch: I) -> Self
    where
        I: IntoIterator<Item = Document>,
    {
        let mut shard = Self::new();
        for doc in batch {
            shard.insert(&doc);
        }
        shard
    }

    /// Add one document. Returns false, leaving the shard untouched, if the url is already present.
    pub fn insert(&mut self, doc: &Document) -> bool {
        if self.docs.contains_key(&doc.url) {
            return false;
        }
        let tokenized = TokenizedDocument::analyze(doc);
        for term in tokenized.terms() {
            self.postings
                .entry(term.to_string())
                .or_default()
                .insert(doc.url.clone());
        }
        self.docs.insert(doc.url.clone(), tokenized);
        true
    }

    pub fn posting(&self, term: &str) -> Option<&PostingList> {
        self.postings.get(term)
    }

    pub fn document(&self, url: &str) -> Option<&TokenizedDocument> {
        self.docs.get(url)
    }

    /// All urls of the shard, the universe for negation.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }
}
