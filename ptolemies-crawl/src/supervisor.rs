//! Per-source frontier and progress tracking: canonicalization, domain
//! filtering, BFS-by-depth scheduling, and failure-policy classification.
//! Generalizes the teacher's single `HashSet<String>` resume tracker into
//! the full frontier/visited/counters state that gets checkpointed.

use crate::checkpoint::Checkpoint;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use ptolemies_core::model::CrawlPolicy;
use std::collections::VecDeque;

/// Lowercases the host, strips the fragment, collapses a trailing slash
/// (except for the bare root path), and sorts query keys, so equivalent
/// URLs collide in `visited`/`document_hashes`.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = url::Url::parse(raw).ok()?;
    url.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        url.set_host(Some(&lowered)).ok()?;
    }

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    Some(url.to_string())
}

fn same_domain(seed_host: &str, candidate: &str) -> bool {
    url::Url::parse(candidate)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .is_some_and(|h| h == seed_host)
}

/// What to do with a fetch failure, per the crawl's retry policy: permanent
/// failures are recorded and never retried this crawl; transient ones stay
/// in the failed-this-run bucket and get picked up again on the next crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    SkipPermanently,
    RetryNextCrawl,
}

pub fn classify_failure<E: HasErrorKind>(error: &E) -> FailureDisposition {
    match error.kind() {
        ErrorKind::PermanentExternal | ErrorKind::DataShape => FailureDisposition::SkipPermanently,
        ErrorKind::TransientExternal | ErrorKind::StoreFatal | ErrorKind::Caller => FailureDisposition::RetryNextCrawl,
    }
}

pub struct Supervisor {
    source_id: String,
    seed_host: String,
    policy: CrawlPolicy,
    checkpoint: Checkpoint,
}

impl Supervisor {
    pub fn new(source_id: impl Into<String>, seed_url: &str, policy: CrawlPolicy, checkpoint: Checkpoint) -> Self {
        let seed_host = url::Url::parse(seed_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        Self {
            source_id: source_id.into(),
            seed_host,
            policy,
            checkpoint,
        }
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn into_checkpoint(self) -> Checkpoint {
        self.checkpoint
    }

    /// Total URLs this crawl has committed to fetching: visited plus
    /// whatever remains queued. Used against `max_pages`.
    fn committed_count(&self) -> usize {
        self.checkpoint.visited.len() + self.checkpoint.frontier.len()
    }

    pub fn is_done(&self) -> bool {
        self.checkpoint.frontier.is_empty() || self.checkpoint.visited.len() >= self.policy.max_pages as usize
    }

    /// Pops up to `n` frontier entries respecting `max_pages`, marking each
    /// as visited immediately so concurrent workers never double-dispatch
    /// the same URL.
    pub fn next_batch(&mut self, n: usize) -> Vec<(u32, String)> {
        let mut batch = Vec::with_capacity(n);
        let mut frontier: VecDeque<(u32, String)> = self.checkpoint.frontier.drain(..).collect();
        while batch.len() < n && self.checkpoint.visited.len() < self.policy.max_pages as usize {
            let Some((depth, url)) = frontier.pop_front() else {
                break;
            };
            if self.checkpoint.visited.contains(&url) {
                continue;
            }
            self.checkpoint.visited.insert(url.clone());
            batch.push((depth, url));
        }
        self.checkpoint.frontier = frontier.into_iter().collect();
        batch
    }

    /// Filters `outlinks` to same-domain, within-depth, not-yet-visited
    /// canonical URLs and appends them to the frontier.
    pub fn offer_outlinks(&mut self, from_depth: u32, outlinks: &[String]) {
        if from_depth + 1 > self.policy.max_depth {
            return;
        }
        for raw in outlinks {
            if self.committed_count() >= self.policy.max_pages as usize {
                break;
            }
            let Some(canonical) = canonicalize_url(raw) else {
                continue;
            };
            if !same_domain(&self.seed_host, &canonical) {
                continue;
            }
            if self.checkpoint.visited.contains(&canonical) {
                continue;
            }
            if self.checkpoint.frontier.iter().any(|(_, u)| u == &canonical) {
                continue;
            }
            self.checkpoint.frontier.push((from_depth + 1, canonical));
        }
    }

    pub fn record_fetched(&mut self) {
        self.checkpoint.counters.fetched += 1;
    }

    pub fn record_not_modified(&mut self) {
        self.checkpoint.counters.not_modified += 1;
    }

    pub fn record_failure(&mut self, disposition: FailureDisposition) {
        match disposition {
            FailureDisposition::SkipPermanently => self.checkpoint.counters.failed_permanent += 1,
            FailureDisposition::RetryNextCrawl => self.checkpoint.counters.failed_transient += 1,
        }
    }

    pub fn record_chunks(&mut self, produced: u64, stored: u64) {
        self.checkpoint.counters.chunks_produced += produced;
        self.checkpoint.counters.chunks_stored += stored;
    }

    pub fn document_hash(&self, url: &str) -> Option<&String> {
        self.checkpoint.document_hashes.get(url)
    }

    pub fn set_document_hash(&mut self, url: &str, hash: String) {
        self.checkpoint.document_hashes.insert(url.to_string(), hash);
    }

    pub fn should_checkpoint(&self, every_n_urls: u64) -> bool {
        every_n_urls > 0 && self.checkpoint.counters.fetched % every_n_urls == 0
    }

    pub fn touch(&mut self) {
        self.checkpoint.updated_at = chrono::Utc::now();
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CrawlPolicy {
        CrawlPolicy {
            max_depth: 2,
            max_pages: 10,
            delay_ms: 0,
            respect_robots: true,
            user_agent: Some("test-agent".to_string()),
        }
    }

    #[test]
    fn canonicalizes_host_case_fragment_and_trailing_slash() {
        let a = canonicalize_url("https://Example.com/Docs/#section").unwrap();
        let b = canonicalize_url("https://example.com/Docs").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sorts_query_keys() {
        let a = canonicalize_url("https://example.com/p?b=2&a=1").unwrap();
        let b = canonicalize_url("https://example.com/p?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn next_batch_marks_visited_and_respects_max_pages() {
        let mut checkpoint = Checkpoint::new("https://example.com/");
        let mut supervisor = Supervisor::new("ex", "https://example.com/", policy(), checkpoint.clone());
        let batch = supervisor.next_batch(5);
        assert_eq!(batch.len(), 1);
        assert!(supervisor.checkpoint().visited.contains("https://example.com/"));
        checkpoint.visited = supervisor.checkpoint().visited.clone();
    }

    #[test]
    fn offer_outlinks_filters_off_domain_and_over_depth() {
        let mut supervisor = Supervisor::new("ex", "https://example.com/", policy(), Checkpoint::new("https://example.com/"));
        supervisor.next_batch(1);
        supervisor.offer_outlinks(
            0,
            &[
                "https://example.com/a".to_string(),
                "https://other.com/b".to_string(),
            ],
        );
        assert_eq!(supervisor.checkpoint().frontier.len(), 1);
        assert_eq!(supervisor.checkpoint().frontier[0].1, "https://example.com/a");
    }

    #[test]
    fn offer_outlinks_respects_max_depth() {
        let mut policy = policy();
        policy.max_depth = 0;
        let mut supervisor = Supervisor::new("ex", "https://example.com/", policy, Checkpoint::new("https://example.com/"));
        supervisor.next_batch(1);
        supervisor.offer_outlinks(0, &["https://example.com/a".to_string()]);
        assert!(supervisor.checkpoint().frontier.is_empty());
    }

    #[test]
    fn classify_failure_matches_disposition() {
        use ptolemies_ingest::fetch::FetchError;
        let permanent = FetchError::RobotsDisallowed { url: "u".into() };
        let transient = FetchError::Timeout { url: "u".into() };
        assert_eq!(classify_failure(&permanent), FailureDisposition::SkipPermanently);
        assert_eq!(classify_failure(&transient), FailureDisposition::RetryNextCrawl);
    }
}
