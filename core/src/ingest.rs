//! Parallel shard construction.
//!
//! A dispatcher routes raw records round-robin to a fixed set of workers. Each worker buffers
//! the records it owns and, once told to stop, decodes them, builds its shard and writes it to
//! its own path. The dispatcher waits for every worker's report before returning.

use crate::config::{IndexConfig, RECORD_QUEUE_DEPTH};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::index::ShardIndex;
use crate::persist::{save_shard, shard_path};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// One undecoded line of the data stream. Not necessarily valid UTF-8.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// 1-based position among routed records.
    pub record: usize,
    pub raw: Vec<u8>,
}

/// Completion report of one ingestion worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardReport {
    pub shard: usize,
    pub path: PathBuf,
    pub documents: usize,
    /// Records that failed to decode or repeated a url already in the shard.
    pub skipped: usize,
}

struct WorkerInbox {
    records: mpsc::Sender<RawRecord>,
    stop: oneshot::Sender<()>,
}

pub struct IngestPool {
    inboxes: Vec<WorkerInbox>,
    done: mpsc::Receiver<Result<ShardReport>>,
    handles: Vec<JoinHandle<()>>,
    routed: usize,
    max_documents: Option<usize>,
}

impl IngestPool {
    /// Start `config.workers` workers; worker `i` owns `<prefix>_<i>.idx`.
    pub fn spawn(config: &IndexConfig) -> Result<Self> {
        config.validate()?;
        let (done_tx, done) = mpsc::channel(config.workers);
        let mut inboxes = Vec::with_capacity(config.workers);
        let mut handles = Vec::with_capacity(config.workers);
        for shard in 0..config.workers {
            let (records_tx, records_rx) = mpsc::channel(RECORD_QUEUE_DEPTH);
            let (stop_tx, stop_rx) = oneshot::channel();
            let path = shard_path(&config.prefix, shard);
            let worker = run_worker(shard, path, records_rx, stop_rx, done_tx.clone());
            handles.push(tokio::spawn(worker));
            inboxes.push(WorkerInbox { records: records_tx, stop: stop_tx });
        }
        tracing::info!(workers = config.workers, prefix = %config.prefix, "ingestion pool started");
        Ok(Self { inboxes, done, handles, routed: 0, max_documents: config.max_documents })
    }

    /// Whether the global document cap has been reached.
    pub fn is_full(&self) -> bool {
        self.max_documents.is_some_and(|max| self.routed >= max)
    }

    pub fn routed(&self) -> usize {
        self.routed
    }

    /// Hand the next record to worker `i mod N`. Returns false once the cap is reached.
    pub async fn route(&mut self, raw: Vec<u8>) -> Result<bool> {
        if self.is_full() {
            return Ok(false);
        }
        let worker = self.routed % self.inboxes.len();
        self.routed += 1;
        let record = RawRecord { record: self.routed, raw };
        self.inboxes[worker]
            .records
            .send(record)
            .await
            .map_err(|_| Error::WorkerLost { worker })?;
        Ok(true)
    }

    /// Signal every worker to stop and wait until all of them have written their shard.
    pub async fn finish(mut self) -> Result<Vec<ShardReport>> {
        let expected = self.inboxes.len();
        for inbox in self.inboxes.drain(..) {
            // A worker that already exited reports through `done` or its handle.
            let _ = inbox.stop.send(());
        }

        let mut reports = Vec::with_capacity(expected);
        let mut failure = None;
        while reports.len() + usize::from(failure.is_some()) < expected {
            match self.done.recv().await {
                Some(Ok(report)) => reports.push(report),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "shard worker failed");
                    failure.get_or_insert(e);
                }
                None => break,
            }
        }
        for (worker, handle) in self.handles.into_iter().enumerate() {
            if handle.await.is_err() {
                failure.get_or_insert(Error::WorkerLost { worker });
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if reports.len() < expected {
            return Err(Error::WorkerLost { worker: reports.len() });
        }
        reports.sort_by_key(|r| r.shard);
        Ok(reports)
    }
}

async fn run_worker(
    shard: usize,
    path: PathBuf,
    mut records: mpsc::Receiver<RawRecord>,
    mut stop: oneshot::Receiver<()>,
    done: mpsc::Sender<Result<ShardReport>>,
) {
    let mut batch = Vec::new();
    loop {
        tokio::select! {
            biased;
            Some(record) = records.recv() => batch.push(record),
            _ = &mut stop => break,
        }
    }
    // Records already queued before the stop are still ours; nothing new gets in.
    records.close();
    while let Ok(record) = records.try_recv() {
        batch.push(record);
    }
    tracing::debug!(shard, records = batch.len(), "worker stopping");

    let report = match tokio::task::spawn_blocking(move || finalize(shard, &path, batch)).await {
        Ok(report) => report,
        Err(_) => Err(Error::WorkerLost { worker: shard }),
    };
    let _ = done.send(report).await;
}

/// Decode a worker's batch, build its shard and persist it.
pub fn finalize(shard: usize, path: &Path, batch: Vec<RawRecord>) -> Result<ShardReport> {
    let mut index = ShardIndex::new();
    let mut skipped = 0;
    for raw in batch {
        match Document::from_json(&raw.raw, raw.record) {
            Ok(doc) => {
                if !index.insert(&doc) {
                    tracing::warn!(
                        shard,
                        record = raw.record,
                        url = %doc.url,
                        "duplicate url skipped"
                    );
                    skipped += 1;
                }
            }
            Err(e) => {
                tracing::warn!(shard, error = %e, "record skipped");
                skipped += 1;
            }
        }
    }
    save_shard(&index, shard, path)?;
    Ok(ShardReport { shard, path: path.to_path_buf(), documents: index.num_docs(), skipped })
}

/// Route every non-blank line of `reader` until it is exhausted or the cap is hit.
///
/// Lines are routed as raw bytes; a line that is not valid UTF-8 fails later, in its worker,
/// as a skipped record.
pub async fn ingest_reader<R>(reader: R, pool: &mut IngestPool, source: &Path) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.split(b'\n');
    while let Some(mut line) = lines.next_segment().await.map_err(|e| Error::io(source, e))? {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        if !pool.route(line).await? {
            break;
        }
    }
    Ok(())
}

/// Data files behind `path`: the file itself, or every `.json`/`.jsonl` file under a directory.
pub fn data_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "no such file or directory");
        return Err(Error::io(path, missing));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| {
            let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf());
            Error::io(at, e.into())
        })?;
        let p = entry.path();
        let extension = p.extension().and_then(|s| s.to_str());
        if p.is_file() && matches!(extension, Some("json" | "jsonl")) {
            files.push(p.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Build and persist all shards for `config`.
pub async fn run(config: &IndexConfig) -> Result<Vec<ShardReport>> {
    config.validate()?;
    let files = data_files(&config.data_path)?;
    let mut pool = IngestPool::spawn(config)?;
    for file in &files {
        if pool.is_full() {
            break;
        }
        let f = tokio::fs::File::open(file).await.map_err(|e| Error::io(file, e))?;
        tracing::info!(file = %file.display(), "reading records");
        ingest_reader(BufReader::new(f), &mut pool, file).await?;
    }
    let routed = pool.routed();
    let reports = pool.finish().await?;
    let documents: usize = reports.iter().map(|r| r.documents).sum();
    let skipped: usize = reports.iter().map(|r| r.skipped).sum();
    tracing::info!(routed, documents, skipped, shards = reports.len(), "ingestion complete");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::load_shard;
    use tempfile::tempdir;

    fn record(record: usize, url: &str) -> RawRecord {
        let raw = format!(r#"{{"url":"{url}","title":"t {url}","body":"b"}}"#);
        RawRecord { record, raw: raw.into_bytes() }
    }

    #[test]
    fn finalize_skips_bad_and_duplicate_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index_0.idx");
        let batch = vec![
            record(1, "u1"),
            RawRecord { record: 2, raw: b"{broken".to_vec() },
            record(3, "u1"),
            record(4, "u2"),
        ];
        let report = finalize(0, &path, batch).unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(load_shard(&path).unwrap().index.num_docs(), 2);
    }

    #[tokio::test]
    async fn routes_round_robin_and_honors_the_cap() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("index");
        let config = IndexConfig::new("unused")
            .with_prefix(prefix.to_str().unwrap())
            .with_workers(2)
            .with_max_documents(Some(3));
        let mut pool = IngestPool::spawn(&config).unwrap();
        for i in 0..5 {
            let routed = pool.route(record(0, &format!("u{i}")).raw).await.unwrap();
            assert_eq!(routed, i < 3);
        }
        let reports = pool.finish().await.unwrap();
        assert_eq!(reports.iter().map(|r| r.documents).collect::<Vec<_>>(), vec![2, 1]);

        let first = load_shard(&shard_path(prefix.to_str().unwrap(), 0)).unwrap();
        assert!(first.index.document("u0").is_some());
        assert!(first.index.document("u2").is_some());
        let second = load_shard(&shard_path(prefix.to_str().unwrap(), 1)).unwrap();
        assert!(second.index.document("u1").is_some());
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("index");
        let config =
            IndexConfig::new("unused").with_prefix(prefix.to_str().unwrap()).with_workers(1);
        let mut pool = IngestPool::spawn(&config).unwrap();
        let stream: &[u8] = b"{\"url\":\"u1\",\"title\":\"a\",\"body\":\"\"}\r\n\
            {\"url\":\"u2\",\"title\":\"caf\xe9\",\"body\":\"\"}\n\
            \n\
            {\"url\":\"u3\",\"title\":\"c\",\"body\":\"\"}";
        ingest_reader(stream, &mut pool, Path::new("stream")).await.unwrap();
        assert_eq!(pool.routed(), 3);

        let reports = pool.finish().await.unwrap();
        assert_eq!(reports[0].documents, 2);
        assert_eq!(reports[0].skipped, 1);
        let shard = load_shard(&shard_path(prefix.to_str().unwrap(), 0)).unwrap();
        assert!(shard.index.document("u1").is_some());
        assert!(shard.index.document("u2").is_none());
        assert!(shard.index.document("u3").is_some());
    }

    #[test]
    fn data_files_walks_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("nested/a.json"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let files = data_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("b.jsonl"), dir.path().join("nested/a.json")]);
        assert!(matches!(data_files(&dir.path().join("missing")), Err(Error::Io { .. })));
    }
}
