//! Sharded boolean full-text search.
//!
//! Documents are split round-robin into independent shards that are built and written in
//! parallel ([`ingest`]); queries are compiled once ([`query`]) and evaluated against every
//! shard concurrently ([`dispatch`]).

pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod index;
pub mod ingest;
pub mod persist;
pub mod query;
pub mod search;
pub mod tokenizer;

pub use config::{IndexConfig, SearchConfig};
pub use document::{Document, TokenizedDocument};
pub use error::{Error, Result};
pub use index::ShardIndex;
pub use query::{CompiledQuery, Node};
