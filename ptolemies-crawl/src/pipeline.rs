//! The bounded, concurrently-staged pipeline wiring fetch through extract,
//! chunk, score, embed and the two stores together. Generalizes the
//! teacher's sequential, single-evaluation `PipelineExecutor` into a
//! channel-per-stage pipeline: each stage's worker-pool size *is* its
//! concurrency limit, and the channel capacity between stages is the
//! backpressure bound.

use crate::cancel::CancellationToken;
use crate::checkpoint::{self, Checkpoint};
use crate::error::SupervisorError;
use crate::supervisor::{classify_failure, FailureDisposition, Supervisor};
use ptolemies_cache::Cache;
use ptolemies_core::config::Tunables;
use ptolemies_core::ids::{DocumentId, SourceId};
use ptolemies_core::model::{Category, ChunkRecord, Edge, GraphNode, Source};
use ptolemies_embed::Embedder;
use ptolemies_ingest::chunk::{self, ChunkerConfig};
use ptolemies_ingest::extract;
use ptolemies_ingest::fetch::{FetchResult, Fetcher};
use ptolemies_ingest::score::{self, ScoringConfig};
use ptolemies_store::graph::{Direction, GraphStore};
use ptolemies_store::vector::VectorStore;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{info, warn};

pub struct PipelineResources {
    pub vector: Arc<VectorStore>,
    pub graph: Arc<GraphStore>,
    pub embedder: Arc<Embedder>,
    pub cache: Arc<Cache>,
}

struct FetchJob {
    depth: u32,
    url: String,
    known_hash: Option<String>,
}

struct ExtractJob {
    depth: u32,
    url: String,
    document_id: DocumentId,
    body: Vec<u8>,
    content_hash: String,
    changed: bool,
}

struct ScoreJob {
    depth: u32,
    url: String,
    document_id: DocumentId,
    changed: bool,
    raw_chunks: Vec<chunk::RawChunk>,
    has_code: bool,
}

struct EmbedJob {
    depth: u32,
    url: String,
    document_id: DocumentId,
    changed: bool,
    records: Vec<ChunkRecord>,
    /// Raw chunks produced before the quality filter, for crawl stats (§4.4:
    /// below-threshold chunks are dropped but still counted as produced).
    produced: u64,
}

struct StoreJob {
    depth: u32,
    url: String,
    document_id: DocumentId,
    changed: bool,
    records: Vec<ChunkRecord>,
    vectors: Vec<Option<Vec<f32>>>,
    model_name: String,
    produced: u64,
}

enum SupervisorEvent {
    JobDone { depth: u32, url: String },
    FailedPermanent { depth: u32, url: String },
    FailedTransient { depth: u32, url: String },
    NotModified { depth: u32, url: String },
    DocumentHash { url: String, hash: String },
    Outlinks { depth: u32, outlinks: Vec<String> },
    ChunksProduced { produced: u64, stored: u64 },
    StoreFatal { source: SupervisorError },
}

/// Wraps a receiver so a fixed pool of workers can share one queue — the
/// mechanism behind each stage's "parallelism = N" number.
type SharedRx<T> = Arc<AsyncMutex<mpsc::Receiver<T>>>;

async fn recv_shared<T>(rx: &SharedRx<T>) -> Option<T> {
    rx.lock().await.recv().await
}

pub struct Pipeline {
    resources: PipelineResources,
    tunables: Tunables,
}

impl Pipeline {
    pub fn new(resources: PipelineResources, tunables: Tunables) -> Self {
        Self { resources, tunables }
    }

    /// Resolves dangling `vector_staged` intents left over from a crash
    /// between the vector commit and the graph commit, by checking whether
    /// the graph side actually landed.
    pub async fn reconcile_intents(&self) -> Result<usize, SupervisorError> {
        let pending = self.resources.vector.pending_intents().await?;
        let mut resolved = 0usize;
        for (document_id, _extraction_version) in pending {
            let has_graph_side = self
                .resources
                .graph
                .neighbors(document_id.as_str(), Some(&["has_chunk".to_string()]), Direction::Outgoing, 1, 1)
                .await
                .map(|edges| !edges.is_empty())
                .unwrap_or(false);
            if has_graph_side {
                self.resources.vector.complete_intent(document_id).await?;
            } else {
                self.resources.vector.rollback_intent(document_id).await?;
            }
            resolved += 1;
        }
        if resolved > 0 {
            info!(resolved, "reconciled dangling intents");
        }
        Ok(resolved)
    }

    /// Crawls one source to completion (frontier empty, `max_pages` hit, an
    /// unrecoverable store error, or cancellation), checkpointing as it
    /// goes, and returns the final checkpoint.
    pub async fn run_source(
        &self,
        source: &Source,
        fetcher: Arc<Fetcher>,
        checkpoint: Checkpoint,
        state_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<Checkpoint, SupervisorError> {
        let source_id = source.source_id.clone();
        let mut supervisor = Supervisor::new(source_id.as_str(), &source.seed_url, source.crawl_policy.clone(), checkpoint);

        let capacity = self.tunables.stage_queue_capacity;
        let cpu_parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        let (fetch_tx, fetch_rx) = mpsc::channel::<FetchJob>(capacity);
        let (extract_tx, extract_rx) = mpsc::channel::<ExtractJob>(capacity);
        let (score_tx, score_rx) = mpsc::channel::<ScoreJob>(capacity);
        let (embed_tx, embed_rx) = mpsc::channel::<EmbedJob>(capacity);
        let (store_tx, store_rx) = mpsc::channel::<StoreJob>(capacity);
        let (event_tx, mut event_rx) = mpsc::channel::<SupervisorEvent>(capacity * 4);

        let extract_rx: SharedRx<ExtractJob> = Arc::new(AsyncMutex::new(extract_rx));
        let score_rx: SharedRx<ScoreJob> = Arc::new(AsyncMutex::new(score_rx));
        let embed_rx: SharedRx<EmbedJob> = Arc::new(AsyncMutex::new(embed_rx));
        let fetch_rx: SharedRx<FetchJob> = Arc::new(AsyncMutex::new(fetch_rx));
        let store_rx: SharedRx<StoreJob> = Arc::new(AsyncMutex::new(store_rx));

        let mut workers = Vec::new();

        for _ in 0..self.tunables.concurrent_requests.max(1) {
            workers.push(tokio::spawn(fetch_worker(
                fetch_rx.clone(),
                extract_tx.clone(),
                event_tx.clone(),
                fetcher.clone(),
                source_id.clone(),
            )));
        }
        drop(extract_tx);

        for _ in 0..cpu_parallelism.max(1) {
            workers.push(tokio::spawn(extract_worker(
                extract_rx.clone(),
                score_tx.clone(),
                event_tx.clone(),
                self.tunables.max_chars,
                self.tunables.min_chars,
            )));
        }
        drop(score_tx);

        for _ in 0..cpu_parallelism.max(1) {
            workers.push(tokio::spawn(score_worker(
                score_rx.clone(),
                embed_tx.clone(),
                event_tx.clone(),
                source_id.clone(),
                source.category,
                self.tunables.topics_k,
                self.tunables.min_quality,
            )));
        }
        drop(embed_tx);

        for _ in 0..self.tunables.embed_parallelism.max(1) {
            workers.push(tokio::spawn(embed_worker(
                embed_rx.clone(),
                store_tx.clone(),
                event_tx.clone(),
                self.resources.embedder.clone(),
            )));
        }
        drop(store_tx);

        // store stage runs single-threaded: cross-store commit ordering
        // matters more than store throughput here.
        workers.push(tokio::spawn(store_worker(
            store_rx.clone(),
            event_tx.clone(),
            self.resources.vector.clone(),
            self.resources.graph.clone(),
            self.resources.cache.clone(),
        )));
        drop(event_tx);

        let mut in_flight: u64 = 0;
        let mut aborted = false;

        'dispatch: loop {
            if cancel.is_cancelled() {
                break;
            }
            let pending_capacity = capacity.saturating_sub(in_flight as usize);
            if pending_capacity > 0 {
                let batch = supervisor.next_batch(pending_capacity);
                for (depth, url) in batch {
                    let known_hash = supervisor.document_hash(&url).cloned();
                    if fetch_tx
                        .send(FetchJob { depth, url, known_hash })
                        .await
                        .is_err()
                    {
                        break 'dispatch;
                    }
                    in_flight += 1;
                }
            }

            if supervisor.is_done() && in_flight == 0 {
                break;
            }
            if in_flight == 0 {
                // frontier not done but nothing queued (e.g. depth cutoff
                // pruned everything) — nothing left to dispatch.
                break;
            }

            match event_rx.recv().await {
                Some(event) => {
                    if self.apply_event(&mut supervisor, event, &mut in_flight).await {
                        aborted = true;
                        break;
                    }
                    if supervisor.should_checkpoint(self.tunables.checkpoint_every_n_urls as u64) {
                        supervisor.touch();
                        checkpoint::save(state_dir, supervisor.source_id(), supervisor.checkpoint()).await?;
                    }
                }
                None => break,
            }
        }

        drop(fetch_tx);
        for worker in workers {
            let _ = worker.await;
        }
        // drain any trailing events emitted while workers were shutting down
        while let Ok(event) = event_rx.try_recv() {
            let _ = self.apply_event(&mut supervisor, event, &mut in_flight).await;
        }

        supervisor.touch();
        checkpoint::save(state_dir, supervisor.source_id(), supervisor.checkpoint()).await?;

        if aborted {
            return Err(SupervisorError::CrawlAborted {
                source_id: source_id.as_str().to_string(),
            });
        }
        Ok(supervisor.into_checkpoint())
    }

    /// Applies one `SupervisorEvent`, returns `true` if the crawl must abort.
    async fn apply_event(&self, supervisor: &mut Supervisor, event: SupervisorEvent, in_flight: &mut u64) -> bool {
        match event {
            SupervisorEvent::JobDone { .. } => {
                *in_flight = in_flight.saturating_sub(1);
            }
            SupervisorEvent::FailedPermanent { url, .. } => {
                supervisor.record_failure(FailureDisposition::SkipPermanently);
                warn!(url, "permanently skipping url");
            }
            SupervisorEvent::FailedTransient { url, .. } => {
                supervisor.record_failure(FailureDisposition::RetryNextCrawl);
                warn!(url, "transient failure, will retry next crawl");
            }
            SupervisorEvent::NotModified { .. } => {
                supervisor.record_not_modified();
            }
            SupervisorEvent::DocumentHash { url, hash } => {
                supervisor.set_document_hash(&url, hash);
            }
            SupervisorEvent::Outlinks { depth, outlinks } => {
                supervisor.offer_outlinks(depth, &outlinks);
            }
            SupervisorEvent::ChunksProduced { produced, stored } => {
                supervisor.record_chunks(produced, stored);
                supervisor.record_fetched();
            }
            SupervisorEvent::StoreFatal { source } => {
                warn!(error = %source, "unrecoverable store error, aborting crawl");
                return true;
            }
        }
        false
    }
}

async fn fetch_worker(
    rx: SharedRx<FetchJob>,
    extract_tx: mpsc::Sender<ExtractJob>,
    events: mpsc::Sender<SupervisorEvent>,
    fetcher: Arc<Fetcher>,
    source_id: SourceId,
) {
    while let Some(job) = recv_shared(&rx).await {
        let FetchJob { depth, url, known_hash } = job;
        match fetcher.fetch(&url, known_hash.as_deref()).await {
            Ok(FetchResult::NotModified) => {
                let _ = events.send(SupervisorEvent::NotModified { depth, url: url.clone() }).await;
                let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
            }
            Ok(FetchResult::Fetched(outcome)) => {
                let content_hash = blake3::hash(&outcome.body).to_hex().to_string();
                let changed = known_hash.as_deref() != Some(content_hash.as_str());
                let document_id = DocumentId::derive(&source_id, &url);
                let _ = events
                    .send(SupervisorEvent::DocumentHash {
                        url: url.clone(),
                        hash: content_hash.clone(),
                    })
                    .await;
                if extract_tx
                    .send(ExtractJob {
                        depth,
                        url: url.clone(),
                        document_id,
                        body: outcome.body,
                        content_hash,
                        changed,
                    })
                    .await
                    .is_err()
                {
                    let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
                }
            }
            Err(err) => {
                let disposition = classify_failure(&err);
                let event = match disposition {
                    FailureDisposition::SkipPermanently => SupervisorEvent::FailedPermanent { depth, url: url.clone() },
                    FailureDisposition::RetryNextCrawl => SupervisorEvent::FailedTransient { depth, url: url.clone() },
                };
                let _ = events.send(event).await;
                let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
            }
        }
    }
}

async fn extract_worker(
    rx: SharedRx<ExtractJob>,
    score_tx: mpsc::Sender<ScoreJob>,
    events: mpsc::Sender<SupervisorEvent>,
    max_chars: usize,
    min_chars: usize,
) {
    let chunker_config = ChunkerConfig { max_chars, min_chars };
    while let Some(job) = recv_shared(&rx).await {
        let ExtractJob {
            depth,
            url,
            document_id,
            body,
            content_hash: _,
            changed,
        } = job;

        match extract::extract(&url, &body, "") {
            Ok(extraction) => {
                let raw_chunks = chunk::chunk(&extraction.text, &chunker_config);
                let has_code = !extraction.code_blocks.is_empty();
                let _ = events
                    .send(SupervisorEvent::Outlinks {
                        depth,
                        outlinks: extraction.outlinks,
                    })
                    .await;
                if raw_chunks.is_empty() {
                    let _ = events.send(SupervisorEvent::ChunksProduced { produced: 0, stored: 0 }).await;
                    let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
                    continue;
                }
                if score_tx
                    .send(ScoreJob {
                        depth,
                        url: url.clone(),
                        document_id,
                        changed,
                        raw_chunks,
                        has_code,
                    })
                    .await
                    .is_err()
                {
                    let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
                }
            }
            Err(err) => {
                warn!(url, error = %err, "extraction failed, skipping url");
                let _ = events.send(SupervisorEvent::FailedPermanent { depth, url: url.clone() }).await;
                let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
            }
        }
    }
}

async fn score_worker(
    rx: SharedRx<ScoreJob>,
    embed_tx: mpsc::Sender<EmbedJob>,
    events: mpsc::Sender<SupervisorEvent>,
    source_id: SourceId,
    category: Category,
    topics_k: usize,
    min_quality: f64,
) {
    let mut scoring_config = ScoringConfig::default();
    scoring_config.topics_k = topics_k;

    while let Some(job) = recv_shared(&rx).await {
        let ScoreJob {
            depth,
            url,
            document_id,
            changed,
            raw_chunks,
            has_code,
        } = job;

        let produced = raw_chunks.len() as u64;

        // Chunks scoring below min_quality are dropped here (§4.4) rather
        // than stored and filtered later, so surviving chunk_index/total_chunks
        // are renumbered to stay contiguous over what actually gets stored.
        let surviving: Vec<(chunk::RawChunk, score::ScoredChunk)> = raw_chunks
            .into_iter()
            .filter_map(|raw| {
                let scored = score::score(&raw.content, has_code, &scoring_config);
                if scored.score < min_quality {
                    None
                } else {
                    Some((raw, scored))
                }
            })
            .collect();

        if surviving.is_empty() {
            let _ = events.send(SupervisorEvent::ChunksProduced { produced, stored: 0 }).await;
            let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
            continue;
        }

        let total_chunks = surviving.len();
        let records: Vec<ChunkRecord> = surviving
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (raw, scored))| ChunkRecord {
                document_id: document_id.clone(),
                source_id: source_id.clone(),
                category,
                content: raw.content,
                chunk_index,
                total_chunks,
                quality_score: scored.score,
                topics: scored.topics,
                extraction_version: extract::EXTRACTION_VERSION,
            })
            .collect();

        if embed_tx
            .send(EmbedJob {
                depth,
                url: url.clone(),
                document_id,
                changed,
                records,
                produced,
            })
            .await
            .is_err()
        {
            let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
        }
    }
}

async fn embed_worker(
    rx: SharedRx<EmbedJob>,
    store_tx: mpsc::Sender<StoreJob>,
    events: mpsc::Sender<SupervisorEvent>,
    embedder: Arc<Embedder>,
) {
    while let Some(job) = recv_shared(&rx).await {
        let EmbedJob {
            depth,
            url,
            document_id,
            changed,
            records,
            produced,
        } = job;

        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let outcome = embedder.embed(&texts).await;

        if store_tx
            .send(StoreJob {
                depth,
                url: url.clone(),
                document_id,
                changed,
                records,
                vectors: outcome.vectors,
                model_name: embedder.model_name(),
                produced,
            })
            .await
            .is_err()
        {
            let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
        }
    }
}

async fn store_worker(
    rx: SharedRx<StoreJob>,
    events: mpsc::Sender<SupervisorEvent>,
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    cache: Arc<Cache>,
) {
    while let Some(job) = recv_shared(&rx).await {
        let StoreJob {
            depth,
            url,
            document_id,
            changed,
            records,
            vectors,
            model_name,
            produced,
        } = job;

        if changed {
            // a content change tombstones the document's previous
            // generation before the new one lands, so stale chunks/nodes
            // never linger alongside fresh ones with the same extraction
            // version.
            if let Err(err) = vector.tombstone_document(document_id.clone()).await {
                let _ = events.send(SupervisorEvent::StoreFatal { source: err.into() }).await;
                let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
                continue;
            }
            if let Err(err) = graph.tombstone_by_document(document_id.as_str()).await {
                let _ = events.send(SupervisorEvent::StoreFatal { source: err.into() }).await;
                let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
                continue;
            }
        }

        let chunk_ids = match vector.upsert_chunks(records.clone()).await {
            Ok(ids) => ids,
            Err(err) => {
                let _ = events.send(SupervisorEvent::StoreFatal { source: err.into() }).await;
                let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
                continue;
            }
        };

        let mut stored = 0u64;
        for (chunk_id, vector_opt) in chunk_ids.iter().zip(vectors.into_iter()) {
            if let Some(vec) = vector_opt {
                if vector
                    .upsert_embedding(chunk_id.clone(), vec, model_name.clone())
                    .await
                    .is_ok()
                {
                    stored += 1;
                }
            }
        }

        let mut nodes = vec![GraphNode {
            node_id: document_id.to_string(),
            label: "document".to_string(),
            attrs: BTreeMap::from([("url".to_string(), serde_json::json!(url))]),
        }];
        let mut edges = Vec::new();
        let mut seen_topics = std::collections::HashSet::new();
        for (record, chunk_id) in records.iter().zip(chunk_ids.iter()) {
            nodes.push(GraphNode {
                node_id: chunk_id.to_string(),
                label: "chunk".to_string(),
                attrs: BTreeMap::from([
                    ("chunk_index".to_string(), serde_json::json!(record.chunk_index)),
                    ("quality_score".to_string(), serde_json::json!(record.quality_score)),
                ]),
            });
            edges.push(Edge::HasChunk {
                document_id: document_id.clone(),
                chunk_id: chunk_id.clone(),
            });
            edges.push(Edge::SourceHasChunk {
                source_id: record.source_id.clone(),
                chunk_id: chunk_id.clone(),
            });
            for topic in &record.topics {
                if seen_topics.insert(topic.clone()) {
                    nodes.push(GraphNode {
                        node_id: format!("topic:{topic}"),
                        label: "topic".to_string(),
                        attrs: BTreeMap::new(),
                    });
                }
                edges.push(Edge::CoversTopic {
                    chunk_id: chunk_id.clone(),
                    topic_name: topic.clone(),
                    weight: 1.0,
                });
            }
        }

        if let Err(err) = graph.upsert_nodes(nodes).await {
            let _ = events.send(SupervisorEvent::StoreFatal { source: err.into() }).await;
            let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
            continue;
        }
        if let Err(err) = graph.upsert_edges(edges).await {
            let _ = events.send(SupervisorEvent::StoreFatal { source: err.into() }).await;
            let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
            continue;
        }
        if let Err(err) = vector.complete_intent(document_id).await {
            let _ = events.send(SupervisorEvent::StoreFatal { source: err.into() }).await;
            let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
            continue;
        }

        cache.invalidate("q:");

        let _ = events.send(SupervisorEvent::ChunksProduced { produced, stored }).await;
        let _ = events.send(SupervisorEvent::JobDone { depth, url }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_rx_type_compiles() {
        // structural smoke test: verifying the channel/type plumbing above
        // type-checks under the compiler's eyes is exercised by every other
        // test in this crate that constructs a `Pipeline`.
        let _ = std::marker::PhantomData::<SharedRx<FetchJob>>;
    }
}
