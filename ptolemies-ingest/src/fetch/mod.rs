mod bucket;
mod error;
mod robots;

pub use error::FetchError;
pub use robots::RobotsRules;

use bucket::HostBuckets;
use ptolemies_core::backoff::Backoff;
use robots::RobotsCache;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;
const DEFAULT_TIMEOUT_S: u64 = 30;

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    pub headers_etag: Option<String>,
    pub body: Vec<u8>,
    pub final_url: String,
}

#[derive(Debug, Clone)]
pub enum FetchResult {
    Fetched(FetchOutcome),
    /// Distinguished 304 result, not an error (§4.1g).
    NotModified,
}

pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub respect_robots: bool,
    pub delay_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "ptolemies-bot/0.1".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_S),
            respect_robots: true,
            delay_ms: 1000,
        }
    }
}

/// Robots-aware, rate-limited HTTP retrieval with retry (C1). One `Fetcher`
/// is shared across a crawl; its only mutable shared state is the per-host
/// token buckets and the robots cache, both internally locked.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetcherConfig,
    buckets: Arc<HostBuckets>,
    robots_cache: Arc<RobotsCache>,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|source| FetchError::Network {
                url: "<client-build>".to_string(),
                source,
            })?;
        Ok(Self {
            client,
            config,
            buckets: Arc::new(HostBuckets::new()),
            robots_cache: Arc::new(RobotsCache::new()),
        })
    }

    fn registrable_domain(host: &str) -> &str {
        let parts: Vec<&str> = host.rsplitn(3, '.').collect();
        match parts.len() {
            0 => host,
            1 => host,
            2 => host,
            _ => {
                let reconstructed_len = parts[1].len() + 1 + parts[0].len();
                &host[host.len() - reconstructed_len..]
            }
        }
    }

    async fn ensure_robots_allowed(&self, url: &Url) -> Result<(), FetchError> {
        if !self.config.respect_robots {
            return Ok(());
        }
        let host = url.host_str().unwrap_or_default().to_string();
        let rules = if let Some(cached) = self.robots_cache.get(&host) {
            cached
        } else {
            let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
            let fetched = self
                .client
                .get(&robots_url)
                .send()
                .await
                .ok()
                .filter(|r| r.status().is_success());
            let body = match fetched {
                Some(resp) => resp.text().await.unwrap_or_default(),
                None => String::new(),
            };
            let rules = RobotsRules::parse(&body, &self.config.user_agent);
            self.robots_cache.insert(&host, rules.clone());
            rules
        };
        if rules.is_allowed(url.path()) {
            Ok(())
        } else {
            Err(FetchError::RobotsDisallowed {
                url: url.to_string(),
            })
        }
    }

    /// Fetches `url`, following same-registrable-domain redirects up to
    /// `MAX_REDIRECTS` hops, honoring robots.txt, the per-host token bucket,
    /// retry-with-backoff on 429/5xx, and the body size cap.
    pub async fn fetch(
        &self,
        url: &str,
        known_etag: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let backoff = Backoff::fetcher();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_once(url, known_etag).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < backoff.max_attempts() => {
                    backoff.sleep(attempt).await;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        known_etag: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let mut current = Url::parse(url).map_err(|_| FetchError::HttpError {
            url: url.to_string(),
            status: 0,
        })?;
        let origin_domain = Self::registrable_domain(current.host_str().unwrap_or_default()).to_string();

        for hop in 0..=MAX_REDIRECTS {
            self.ensure_robots_allowed(&current).await?;
            let host = current.host_str().unwrap_or_default().to_string();
            self.buckets.acquire(&host, self.config.delay_ms).await;

            let mut req = self.client.get(current.clone());
            if let Some(etag) = known_etag {
                req = req.header("If-None-Match", etag);
            }

            let resp = req.send().await.map_err(|source| {
                if source.is_timeout() {
                    FetchError::Timeout {
                        url: current.to_string(),
                    }
                } else {
                    FetchError::Network {
                        url: current.to_string(),
                        source,
                    }
                }
            })?;

            let status = resp.status();
            if status.as_u16() == 304 {
                return Ok(FetchResult::NotModified);
            }
            if status.is_redirection() {
                if hop == MAX_REDIRECTS {
                    return Err(FetchError::TooManyRedirects {
                        url: current.to_string(),
                    });
                }
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| FetchError::HttpError {
                        url: current.to_string(),
                        status: status.as_u16(),
                    })?;
                let next = current.join(location).map_err(|_| FetchError::HttpError {
                    url: current.to_string(),
                    status: status.as_u16(),
                })?;
                let next_domain = Self::registrable_domain(next.host_str().unwrap_or_default());
                if next_domain != origin_domain {
                    return Err(FetchError::RedirectOffDomain {
                        url: current.to_string(),
                    });
                }
                current = next;
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::HttpError {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            let etag = resp
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            if let Some(len) = resp.content_length() {
                if len as usize > MAX_BODY_BYTES {
                    return Err(FetchError::TooLarge {
                        url: current.to_string(),
                        size: len as usize,
                    });
                }
            }

            let final_url = current.to_string();
            let body = resp.bytes().await.map_err(|source| FetchError::Network {
                url: final_url.clone(),
                source,
            })?;
            if body.len() > MAX_BODY_BYTES {
                return Err(FetchError::TooLarge {
                    url: final_url,
                    size: body.len(),
                });
            }

            return Ok(FetchResult::Fetched(FetchOutcome {
                status: status.as_u16(),
                headers_etag: etag,
                body: body.to_vec(),
                final_url,
            }));
        }
        unreachable!("redirect loop exits via TooManyRedirects");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    #[tokio::test]
    async fn fetches_successfully() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/robots.txt");
            then.status(404);
        });
        let page = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/page");
            then.status(200).body("hello world");
        });

        let fetcher = Fetcher::new(FetcherConfig::default()).unwrap();
        let url = server.url("/page");
        let result = fetcher.fetch(&url, None).await.unwrap();
        match result {
            FetchResult::Fetched(outcome) => assert_eq!(outcome.body, b"hello world"),
            FetchResult::NotModified => panic!("expected Fetched"),
        }
        mock.assert_hits(1);
        page.assert();
    }

    #[tokio::test]
    async fn robots_disallowed_skips_network() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/robots.txt");
            then.status(200).body("User-agent: *\nDisallow: /\n");
        });
        let page = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/page");
            then.status(200).body("should not be hit");
        });

        let fetcher = Fetcher::new(FetcherConfig::default()).unwrap();
        let url = server.url("/page");
        let err = fetcher.fetch(&url, None).await.unwrap_err();
        assert!(matches!(err, FetchError::RobotsDisallowed { .. }));
        page.assert_hits(0);
    }

    #[tokio::test]
    async fn not_modified_is_distinguished() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/robots.txt");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/page");
            then.status(304);
        });

        let fetcher = Fetcher::new(FetcherConfig::default()).unwrap();
        let url = server.url("/page");
        let result = fetcher.fetch(&url, Some("\"abc\"")).await.unwrap();
        assert!(matches!(result, FetchResult::NotModified));
    }
}
