use crate::document::TokenizedDocument;
use crate::error::Result;
use crate::index::ShardIndex;
use crate::query::{parse, Node};
use std::collections::HashSet;

/// Urls matched in one shard, borrowed from it.
pub type UrlSet<'a> = HashSet<&'a str>;

/// Evaluate a parse tree against one shard. Negation is relative to every document of the shard.
pub fn evaluate<'a>(node: &Node, shard: &'a ShardIndex) -> UrlSet<'a> {
    match node {
        Node::Word(term) => shard
            .posting(term)
            .map(|urls| urls.iter().map(String::as_str).collect())
            .unwrap_or_default(),
        Node::And(left, right) => {
            let left = evaluate(left, shard);
            if left.is_empty() {
                return left;
            }
            let right = evaluate(right, shard);
            left.intersection(&right).copied().collect()
        }
        Node::Or(left, right) => {
            let mut urls = evaluate(left, shard);
            urls.extend(evaluate(right, shard));
            urls
        }
        Node::Not(operand) => {
            let excluded = evaluate(operand, shard);
            shard.urls().filter(|url| !excluded.contains(url)).collect()
        }
    }
}

/// Documents matching `node`, in no particular order.
pub fn matching_documents<'a>(node: &Node, shard: &'a ShardIndex) -> Vec<&'a TokenizedDocument> {
    evaluate(node, shard)
        .into_iter()
        .filter_map(|url| shard.document(url))
        .collect()
}

/// Parse and evaluate `query` against one shard.
pub fn search<'a>(query: &str, shard: &'a ShardIndex) -> Result<Vec<&'a TokenizedDocument>> {
    let root = parse(query)?;
    Ok(matching_documents(&root, shard))
}

/// Presentable result line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub title: String,
    pub url: String,
}

/// Matching documents as hits sorted by url.
pub fn hits(node: &Node, shard: &ShardIndex) -> Vec<Hit> {
    let mut hits: Vec<Hit> = matching_documents(node, shard)
        .into_iter()
        .map(|doc| Hit { title: doc.title.clone(), url: doc.url.clone() })
        .collect();
    hits.sort_by(|a, b| a.url.cmp(&b.url));
    hits
}
