//! Drives the real fetch/extract/chunk/embed/store pipeline end to end
//! against a mock origin, the way `ptolemies crawl` does it, without going
//! through the CLI binary itself (a bin crate exposes no public API for an
//! external test file to call into).

use httpmock::MockServer;
use ptolemies_cache::Cache;
use ptolemies_core::config::EngineConfig;
use ptolemies_core::model::{Category, Priority, Source};
use ptolemies_crawl::checkpoint::Checkpoint;
use ptolemies_crawl::cancel::CancellationToken;
use ptolemies_crawl::{Pipeline, PipelineResources};
use ptolemies_embed::{Embedder, MockEmbedder};
use ptolemies_ingest::fetch::{Fetcher, FetcherConfig};
use ptolemies_store::graph::GraphStore;
use ptolemies_store::vector::VectorStore;
use std::sync::Arc;

const DIM: usize = 16;

fn policy(max_depth: u32, max_pages: u32) -> ptolemies_core::model::CrawlPolicy {
    ptolemies_core::model::CrawlPolicy {
        max_depth,
        max_pages,
        delay_ms: 0,
        respect_robots: true,
        user_agent: None,
    }
}

async fn resources() -> (PipelineResources, Arc<VectorStore>, Arc<GraphStore>) {
    let vector = Arc::new(VectorStore::open(":memory:", DIM).await.unwrap());
    let graph = Arc::new(GraphStore::connect("sqlite::memory:").await.unwrap());
    let embedder = Arc::new(Embedder::new(Arc::new(MockEmbedder::new(DIM)), 10));
    let cache = Arc::new(Cache::new(16).unwrap());
    (
        PipelineResources {
            vector: vector.clone(),
            graph: graph.clone(),
            embedder,
            cache,
        },
        vector,
        graph,
    )
}

fn tunables() -> ptolemies_core::config::Tunables {
    let mut t = EngineConfig::load(None).unwrap().tunables;
    t.embedding_dimension = DIM;
    t
}

#[tokio::test]
async fn fresh_crawl_of_one_source_yields_two_chunks() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/robots.txt");
        then.status(404);
    });
    let body = "A. B. C. ".repeat(222); // ~2000 chars, no outlinks
    server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/docs/");
        then.status(200).body(format!("<html><body>{body}</body></html>"));
    });

    let seed_url = server.url("/docs/");
    let source = Source::new("testsrc", "Test Source", seed_url.clone(), Category::Backend, Priority::Medium, policy(1, 1));

    let (resources, vector, graph) = resources().await;
    let pipeline = Pipeline::new(resources, tunables());
    pipeline.reconcile_intents().await.unwrap();

    let fetcher = Arc::new(Fetcher::new(FetcherConfig::default()).unwrap());
    let state_dir = tempfile::tempdir().unwrap();
    let checkpoint = Checkpoint::new(&seed_url);

    let result = pipeline
        .run_source(&source, fetcher, checkpoint, state_dir.path(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.counters.fetched, 1);
    assert_eq!(result.counters.failed_permanent, 0);
    assert_eq!(result.counters.failed_transient, 0);
    assert_eq!(result.counters.chunks_stored, 2);

    let chunks = vector.all_active_chunks().await.unwrap();
    assert_eq!(chunks.len(), 2);
    let embeddings = vector.all_embeddings().await.unwrap();
    assert_eq!(embeddings.len(), 2);

    let documents = graph.query_by_label("document", usize::MAX).await.unwrap();
    assert_eq!(documents.len(), 1);
    let chunk_nodes = graph.query_by_label("chunk", usize::MAX).await.unwrap();
    assert_eq!(chunk_nodes.len(), 2);
}

#[tokio::test]
async fn robots_disallow_yields_no_chunks() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/robots.txt");
        then.status(200).body("User-agent: *\nDisallow: /\n");
    });
    let page = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/docs/");
        then.status(200).body("should never be fetched");
    });

    let seed_url = server.url("/docs/");
    let source = Source::new("testsrc", "Test Source", seed_url.clone(), Category::Backend, Priority::Medium, policy(1, 1));

    let (resources, vector, graph) = resources().await;
    let pipeline = Pipeline::new(resources, tunables());

    let fetcher = Arc::new(Fetcher::new(FetcherConfig::default()).unwrap());
    let state_dir = tempfile::tempdir().unwrap();
    let checkpoint = Checkpoint::new(&seed_url);

    let result = pipeline
        .run_source(&source, fetcher, checkpoint, state_dir.path(), CancellationToken::new())
        .await
        .unwrap();

    page.assert_hits(0);
    assert_eq!(result.counters.fetched, 0);
    assert_eq!(result.counters.failed_permanent, 1);

    assert!(vector.all_active_chunks().await.unwrap().is_empty());
    assert!(graph.query_by_label("document", usize::MAX).await.unwrap().is_empty());
}
