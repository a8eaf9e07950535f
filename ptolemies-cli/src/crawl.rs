use crate::context::EngineContext;
use crate::error::CliError;
use ptolemies_core::model::Source;
use ptolemies_crawl::checkpoint::{self, Checkpoint};
use ptolemies_crawl::{CancellationToken, Pipeline, PipelineResources};
use ptolemies_ingest::fetch::{Fetcher, FetcherConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A `crawl` invocation always re-seeds the frontier at the source's seed
/// URL so a completed prior checkpoint doesn't look "done" forever. What
/// carries over from the prior run depends on `--incremental`:
/// non-incremental starts with empty `document_hashes` (forcing a full
/// refetch, no conditional requests); incremental keeps them (so unchanged
/// pages come back as 304s). A checkpoint left mid-crawl by a crash or
/// cancellation (non-empty frontier) is always resumed as-is, regardless of
/// the flag — finishing an interrupted run takes priority.
fn prepare_checkpoint(prior: Checkpoint, seed_url: &str, incremental: bool) -> Checkpoint {
    if !prior.frontier.is_empty() {
        return prior;
    }
    if incremental {
        Checkpoint {
            frontier: vec![(0, seed_url.to_string())],
            visited: Default::default(),
            document_hashes: prior.document_hashes,
            counters: Default::default(),
            ..prior
        }
    } else {
        Checkpoint::new(seed_url)
    }
}

fn fetcher_for(source: &Source) -> Result<Arc<Fetcher>, CliError> {
    let policy = &source.crawl_policy;
    let config = FetcherConfig {
        user_agent: policy.user_agent.clone().unwrap_or_else(|| FetcherConfig::default().user_agent),
        timeout: std::time::Duration::from_secs(30),
        respect_robots: policy.respect_robots,
        delay_ms: policy.delay_ms,
    };
    let fetcher = Fetcher::new(config)?;
    Ok(Arc::new(fetcher))
}

/// Runs `crawl --source <id>|--all [--incremental]`. Returns the process
/// exit code: 0 all sources clean, 2 some URLs failed on at least one
/// source, 3 a source aborted on a store-fatal error.
pub async fn run(ctx: &EngineContext, source_filter: Option<&str>, all: bool, incremental: bool) -> Result<i32, CliError> {
    let sources: Vec<Source> = ctx
        .config
        .sources
        .iter()
        .filter(|s| all || source_filter == Some(s.source_id.as_str()))
        .map(|cfg| Source::new(cfg.source_id.clone(), cfg.display_name.clone(), cfg.seed_url.clone(), cfg.category, cfg.priority, cfg.crawl_policy()))
        .collect();

    if sources.is_empty() {
        if let Some(id) = source_filter {
            return Err(CliError::UnknownSource { source_id: id.to_string() });
        }
        warn!("no sources configured, nothing to crawl");
        return Ok(0);
    }

    let resources = PipelineResources {
        vector: ctx.vector.clone(),
        graph: ctx.graph.clone(),
        embedder: ctx.embedder.clone(),
        cache: ctx.cache.clone(),
    };
    let pipeline = Pipeline::new(resources, ctx.config.tunables.clone());
    pipeline.reconcile_intents().await?;

    let mut any_partial = false;

    for source in &sources {
        let fetcher = fetcher_for(source)?;
        let prior = checkpoint::load(&ctx.config.state_dir, source.source_id.as_str(), &source.seed_url).await?;
        let checkpoint = prepare_checkpoint(prior, &source.seed_url, incremental);
        let cancel = CancellationToken::new();

        info!(source = source.source_id.as_str(), incremental, "starting crawl");
        match pipeline.run_source(source, fetcher, checkpoint, &ctx.config.state_dir, cancel).await {
            Ok(checkpoint) => {
                let counters = &checkpoint.counters;
                info!(
                    source = source.source_id.as_str(),
                    fetched = counters.fetched,
                    failed_permanent = counters.failed_permanent,
                    failed_transient = counters.failed_transient,
                    chunks_stored = counters.chunks_stored,
                    "crawl finished"
                );
                if counters.failed_permanent > 0 || counters.failed_transient > 0 {
                    any_partial = true;
                }
            }
            Err(err) => {
                error!(source = source.source_id.as_str(), error = %err, "crawl aborted");
                return Ok(3);
            }
        }
    }

    Ok(if any_partial { 2 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumes_interrupted_crawl_regardless_of_incremental() {
        let mut prior = Checkpoint::new("https://example.com/");
        prior.frontier.push((1, "https://example.com/a".to_string()));
        prior.visited.insert("https://example.com/".to_string());

        let resumed = prepare_checkpoint(prior.clone(), "https://example.com/", false);
        assert_eq!(resumed.frontier, prior.frontier);
        assert_eq!(resumed.visited, prior.visited);
    }

    #[test]
    fn incremental_reseeds_frontier_and_keeps_document_hashes() {
        let mut prior = Checkpoint::new("https://example.com/");
        prior.frontier.clear();
        prior.visited.insert("https://example.com/".to_string());
        prior.document_hashes.insert("https://example.com/".to_string(), "abc123".to_string());
        prior.counters.fetched = 5;

        let next = prepare_checkpoint(prior, "https://example.com/", true);
        assert_eq!(next.frontier, vec![(0, "https://example.com/".to_string())]);
        assert!(next.visited.is_empty());
        assert_eq!(next.document_hashes.get("https://example.com/"), Some(&"abc123".to_string()));
        assert_eq!(next.counters.fetched, 0);
    }

    #[test]
    fn non_incremental_discards_prior_state_entirely() {
        let mut prior = Checkpoint::new("https://example.com/");
        prior.frontier.clear();
        prior.document_hashes.insert("https://example.com/".to_string(), "abc123".to_string());

        let next = prepare_checkpoint(prior, "https://example.com/", false);
        assert_eq!(next.frontier, vec![(0, "https://example.com/".to_string())]);
        assert!(next.document_hashes.is_empty());
    }
}
