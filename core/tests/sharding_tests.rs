use shardex_core::dispatch::{run_session, serve, MemorySink};
use shardex_core::ingest;
use shardex_core::persist::{load_all, save_shard, shard_path};
use shardex_core::query::{parse, Node};
use shardex_core::search::evaluate;
use shardex_core::{Document, IndexConfig, SearchConfig, ShardIndex};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn corpus() -> Vec<Document> {
    let titles = [
        "red fox",
        "blue fox",
        "lazy dog",
        "quick brown fox",
        "café au lait",
        "dog days",
    ];
    titles
        .iter()
        .enumerate()
        .map(|(i, t)| {
            Document::new(format!("http://example.org/{i}"), *t, format!("entry number {i}"))
        })
        .collect()
}

fn jsonl(docs: &[Document]) -> String {
    docs.iter().map(|d| serde_json::to_string(d).unwrap() + "\n").collect()
}

#[test]
fn round_trip_preserves_every_posting() {
    let dir = tempdir().unwrap();
    let original = ShardIndex::build(corpus());
    let path = shard_path(dir.path().join("index").to_str().unwrap(), 0);
    save_shard(&original, 0, &path).unwrap();
    let loaded = load_all(dir.path().join("index").to_str().unwrap()).unwrap();
    assert_eq!(loaded.len(), 1);
    for term in original.postings.keys() {
        let node = Node::word(term.clone());
        assert_eq!(evaluate(&node, &loaded[0].index), evaluate(&node, &original), "term {term}");
    }
}

#[test]
fn partitioned_shards_answer_like_one_shard() {
    let docs = corpus();
    let whole = ShardIndex::build(docs.clone());
    let left = ShardIndex::build(docs.iter().step_by(2).cloned());
    let right = ShardIndex::build(docs.iter().skip(1).step_by(2).cloned());

    for query in ["fox", "dog or cafe", "not fox", "fox and not red", "entry and (lazy or blue)"] {
        let node = parse(query).unwrap();
        let expected: HashSet<&str> = evaluate(&node, &whole);
        let mut union = evaluate(&node, &left);
        union.extend(evaluate(&node, &right));
        assert_eq!(union, expected, "query `{query}`");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingestion_partitions_every_decoded_document_once() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.jsonl");
    let docs = corpus();
    let mut raw = jsonl(&docs).into_bytes();
    raw.extend_from_slice(b"{\"title\":\"no url\",\"body\":\"\"}\n\nnot even json\n");
    raw.extend_from_slice(b"{\"url\":\"latin1\",\"title\":\"caf\xe9\",\"body\":\"\"}\n");
    fs::write(&data, raw).unwrap();

    let prefix = dir.path().join("index");
    let config = IndexConfig::new(&data).with_prefix(prefix.to_str().unwrap()).with_workers(3);
    let reports = ingest::run(&config).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports.iter().map(|r| r.skipped).sum::<usize>(), 3);

    let shards = load_all(prefix.to_str().unwrap()).unwrap();
    assert_eq!(shards.len(), 3);
    let mut seen = HashSet::new();
    for shard in &shards {
        for url in shard.index.urls() {
            assert!(seen.insert(url.to_string()), "{url} is in two shards");
        }
    }
    let expected: HashSet<String> = docs.into_iter().map(|d| d.url).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn cap_applies_to_the_whole_stream() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("records");
    fs::create_dir_all(&data).unwrap();
    let docs = corpus();
    fs::write(data.join("a.jsonl"), jsonl(&docs[..3])).unwrap();
    fs::write(data.join("b.jsonl"), jsonl(&docs[3..])).unwrap();

    let prefix = dir.path().join("capped");
    let config = IndexConfig::new(&data)
        .with_prefix(prefix.to_str().unwrap())
        .with_workers(2)
        .with_max_documents(Some(4));
    let reports = ingest::run(&config).await.unwrap();
    assert_eq!(reports.iter().map(|r| r.documents).sum::<usize>(), 4);
    assert_eq!(reports[0].documents, 2);
    assert_eq!(reports[1].documents, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn index_then_search_end_to_end() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.jsonl");
    fs::write(
        &data,
        jsonl(&[Document::new("u1", "red fox", ""), Document::new("u2", "blue fox", "")]),
    )
    .unwrap();
    let prefix = dir.path().join("index");
    let config = IndexConfig::new(&data).with_prefix(prefix.to_str().unwrap()).with_workers(2);
    ingest::run(&config).await.unwrap();

    let sink = Arc::new(MemorySink::default());
    let search = SearchConfig { pattern: prefix.to_str().unwrap().to_string(), workers: 2 };
    let input: &[u8] = b"fox and red\nfox and not red\nfox or red\n";
    let stats = serve(&search, input, sink.clone()).await.unwrap();
    assert_eq!(stats.queries, 3);
    assert_eq!(sink.urls_for("fox and red"), vec!["u1"]);
    assert_eq!(sink.urls_for("fox and not red"), vec!["u2"]);
    assert_eq!(sink.urls_for("fox or red"), vec!["u1", "u2"]);
}

#[tokio::test]
async fn more_shards_than_workers() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("many");
    let prefix = prefix.to_str().unwrap();
    for (i, doc) in corpus().into_iter().enumerate() {
        save_shard(&ShardIndex::build([doc]), i, &shard_path(prefix, i)).unwrap();
    }
    let shards = load_all(prefix).unwrap();
    assert_eq!(shards.len(), 6);

    let sink = Arc::new(MemorySink::default());
    let input: &[u8] = b"fox\ndog\n";
    run_session(input, shards, 2, sink.clone()).await.unwrap();
    assert_eq!(sink.results().len(), 12);
    assert_eq!(sink.urls_for("fox").len(), 3);
    assert_eq!(sink.urls_for("dog").len(), 2);
}
