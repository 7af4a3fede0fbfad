//! Cross-shard query dispatch.
//!
//! Idle workers publish themselves on a shared availability queue and wait for exactly one
//! assignment. For every query the dispatcher takes one available worker per shard, so a single
//! query fans out over up to `workers` shards at once. Results are emitted as each task resolves.

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::persist::{load_all, LoadedShard};
use crate::query::CompiledQuery;
use crate::search::{hits, Hit};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Hits of one query in one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardHits {
    pub query: String,
    pub shard: String,
    pub hits: Vec<Hit>,
}

/// Receives results from search workers, possibly from several workers at once.
pub trait ResultSink: Send + Sync + 'static {
    fn shard_hits(&self, result: ShardHits);

    fn query_rejected(&self, query: &str, error: &Error);
}

/// Prints results on stdout, one block per shard.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ResultSink for StdoutSink {
    fn shard_hits(&self, result: ShardHits) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let found = result.hits.len();
        let _ = writeln!(out, "[{}] {}: {found} result(s) found", result.shard, result.query);
        for hit in &result.hits {
            let _ = writeln!(out, "  {}\t{}", hit.title, hit.url);
        }
        let _ = out.flush();
    }

    fn query_rejected(&self, query: &str, error: &Error) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{query}: {error}");
        let _ = out.flush();
    }
}

/// Keeps results in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<ShardHits>>,
    rejected: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn results(&self) -> Vec<ShardHits> {
        self.results.lock().clone()
    }

    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().clone()
    }

    /// Urls found for `query` over all shards, sorted.
    pub fn urls_for(&self, query: &str) -> Vec<String> {
        let mut urls: Vec<String> = self
            .results
            .lock()
            .iter()
            .filter(|r| r.query == query)
            .flat_map(|r| r.hits.iter().map(|h| h.url.clone()))
            .collect();
        urls.sort();
        urls
    }
}

impl ResultSink for MemorySink {
    fn shard_hits(&self, result: ShardHits) {
        self.results.lock().push(result);
    }

    fn query_rejected(&self, query: &str, _error: &Error) {
        self.rejected.lock().push(query.to_string());
    }
}

/// Evaluation of one query against one shard.
pub struct SearchTask {
    pub shard: Arc<LoadedShard>,
    pub query: Arc<CompiledQuery>,
}

enum Assignment {
    Search(SearchTask),
    Terminate,
}

#[derive(Clone)]
struct WorkerSlot {
    id: usize,
    tasks: mpsc::Sender<Assignment>,
}

pub struct SearchPool {
    available: mpsc::Receiver<WorkerSlot>,
    handles: Vec<JoinHandle<()>>,
}

impl SearchPool {
    pub fn spawn(workers: usize, sink: Arc<dyn ResultSink>) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config("at least one search worker is required".into()));
        }
        let (available_tx, available) = mpsc::channel(workers);
        let handles = (0..workers)
            .map(|id| {
                let (tasks, inbox) = mpsc::channel(1);
                let slot = WorkerSlot { id, tasks };
                tokio::spawn(run_worker(slot, inbox, available_tx.clone(), sink.clone()))
            })
            .collect();
        tracing::info!(workers, "search pool started");
        Ok(Self { available, handles })
    }

    async fn next_worker(&mut self) -> Result<WorkerSlot> {
        self.available.recv().await.ok_or(Error::WorkerLost { worker: 0 })
    }

    /// Assign `query` to one worker per shard, waiting for workers to free up as needed.
    pub async fn dispatch(
        &mut self,
        query: &Arc<CompiledQuery>,
        shards: &[Arc<LoadedShard>],
    ) -> Result<()> {
        for shard in shards {
            let worker = self.next_worker().await?;
            let task = SearchTask { shard: shard.clone(), query: query.clone() };
            worker
                .tasks
                .send(Assignment::Search(task))
                .await
                .map_err(|_| Error::WorkerLost { worker: worker.id })?;
        }
        Ok(())
    }

    /// Terminate every worker once it is idle and wait for all of them to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        for _ in 0..self.handles.len() {
            let Some(worker) = self.available.recv().await else {
                break;
            };
            let _ = worker.tasks.send(Assignment::Terminate).await;
        }
        let mut lost = None;
        for (worker, handle) in self.handles.into_iter().enumerate() {
            if handle.await.is_err() {
                lost.get_or_insert(Error::WorkerLost { worker });
            }
        }
        tracing::info!("search pool stopped");
        lost.map_or(Ok(()), Err)
    }
}

async fn run_worker(
    slot: WorkerSlot,
    mut inbox: mpsc::Receiver<Assignment>,
    available: mpsc::Sender<WorkerSlot>,
    sink: Arc<dyn ResultSink>,
) {
    let id = slot.id;
    loop {
        if available.send(slot.clone()).await.is_err() {
            break;
        }
        match inbox.recv().await {
            Some(Assignment::Search(task)) => {
                let shard = task.shard.name();
                let found = hits(&task.query.root, &task.shard.index);
                tracing::debug!(
                    worker = id,
                    %shard,
                    query = %task.query.text,
                    hits = found.len(),
                    "task done"
                );
                sink.shard_hits(ShardHits { query: task.query.text.clone(), shard, hits: found });
            }
            Some(Assignment::Terminate) | None => break,
        }
    }
}

/// Counters of a finished search session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub queries: usize,
    pub rejected: usize,
}

/// Answer one query per input line until the input ends or a line reads `exit`.
pub async fn run_session<R>(
    input: R,
    shards: Vec<LoadedShard>,
    workers: usize,
    sink: Arc<dyn ResultSink>,
) -> Result<SessionStats>
where
    R: AsyncBufRead + Unpin,
{
    let shards: Vec<Arc<LoadedShard>> = shards.into_iter().map(Arc::new).collect();
    let mut pool = SearchPool::spawn(workers, sink.clone())?;
    let mut stats = SessionStats::default();
    let mut lines = input.split(b'\n');

    let outcome = loop {
        let raw = match lines.next_segment().await {
            Ok(Some(raw)) => raw,
            Ok(None) => break Ok(()),
            Err(e) => break Err(Error::io("<input>", e)),
        };
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                let shown = String::from_utf8_lossy(e.as_bytes()).trim().to_string();
                let error = Error::syntax(0, "query is not valid UTF-8");
                reject(sink.as_ref(), &mut stats, &shown, &error);
                continue;
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("exit") {
            break Ok(());
        }
        match CompiledQuery::compile(text) {
            Ok(query) => {
                stats.queries += 1;
                if let Err(e) = pool.dispatch(&Arc::new(query), &shards).await {
                    break Err(e);
                }
            }
            Err(e) => reject(sink.as_ref(), &mut stats, text, &e),
        }
    };

    pool.shutdown().await?;
    outcome.map(|_| stats)
}

fn reject(sink: &dyn ResultSink, stats: &mut SessionStats, query: &str, error: &Error) {
    tracing::warn!(query, error = %error, "query rejected");
    stats.rejected += 1;
    sink.query_rejected(query, error);
}

/// Load the shards named by `config` and run a session over them.
pub async fn serve<R>(
    config: &SearchConfig,
    input: R,
    sink: Arc<dyn ResultSink>,
) -> Result<SessionStats>
where
    R: AsyncBufRead + Unpin,
{
    config.validate()?;
    let pattern = config.pattern.clone();
    let shards = tokio::task::spawn_blocking(move || load_all(&pattern))
        .await
        .map_err(|_| Error::WorkerLost { worker: 0 })??;
    run_session(input, shards, config.workers, sink).await
}
