//! Per-upstream request spacing, applied as client middleware.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::Extensions;
use reqwest::Url;
use reqwest_middleware::{Middleware, Next};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// (base URL env override, default base, minimum spacing in ms)
const UPSTREAM_SPACING: [(&str, &str, u64); 5] = [
    // The INPI crawler fronts a single scraper instance.
    ("PHARMYRUS_INPI_BASE", crate::config::INPI_BASE, 2_000),
    ("PHARMYRUS_GOOGLE_PATENTS_BASE", crate::config::GOOGLE_PATENTS_BASE, 1_000),
    ("PHARMYRUS_SERPAPI_BASE", crate::config::SERPAPI_BASE, 200),
    ("PHARMYRUS_EPO_BASE", crate::config::EPO_BASE, 200),
    ("PHARMYRUS_PUBCHEM_BASE", crate::config::PUBCHEM_BASE, 200),
];

const FALLBACK_SPACING: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct Spacing {
    prefix: String,
    interval: Duration,
}

/// Hands out send slots per upstream so that consecutive requests to one
/// upstream are at least its interval apart, in arrival order.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    rules: Vec<Spacing>,
    fallback: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    fn new(rules: Vec<Spacing>, fallback: Duration) -> Self {
        Self {
            rules,
            fallback,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    fn for_upstreams() -> Self {
        let rules = UPSTREAM_SPACING
            .iter()
            .map(|(env_var, default, ms)| Spacing {
                prefix: crate::sources::env_base(*default, env_var).into_owned(),
                interval: Duration::from_millis(*ms),
            })
            .collect();
        Self::new(rules, FALLBACK_SPACING)
    }

    /// Longest matching prefix wins; unmatched URLs are spaced per origin.
    fn bucket(&self, url: &Url) -> (String, Duration) {
        let raw = url.as_str();
        match self
            .rules
            .iter()
            .filter(|rule| raw.starts_with(rule.prefix.as_str()))
            .max_by_key(|rule| rule.prefix.len())
        {
            Some(rule) => (rule.prefix.clone(), rule.interval),
            None => {
                let host = url.host_str().unwrap_or("unknown-host");
                (format!("{}://{host}", url.scheme()), self.fallback)
            }
        }
    }

    pub(crate) async fn wait_for_url(&self, url: &Url) {
        let (bucket, interval) = self.bucket(url);
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(&bucket).map_or(now, |next| (*next).max(now));
            slots.insert(bucket, slot + interval);
            slot
        };
        sleep_until(slot).await;
    }
}

fn global_limiter() -> Arc<RateLimiter> {
    static LIMITER: OnceLock<Arc<RateLimiter>> = OnceLock::new();
    LIMITER
        .get_or_init(|| Arc::new(RateLimiter::for_upstreams()))
        .clone()
}

#[derive(Clone, Debug)]
pub(crate) struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub(crate) fn new() -> Self {
        Self {
            limiter: global_limiter(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        self.limiter.wait_for_url(req.url()).await;
        next.run(req, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rules: &[(&str, u64)], fallback_ms: u64) -> RateLimiter {
        RateLimiter::new(
            rules
                .iter()
                .map(|(prefix, ms)| Spacing {
                    prefix: prefix.to_string(),
                    interval: Duration::from_millis(*ms),
                })
                .collect(),
            Duration::from_millis(fallback_ms),
        )
    }

    #[tokio::test]
    async fn concurrent_requests_to_one_upstream_are_spaced() {
        let limiter = limiter(&[("https://crawler.test/api/data/inpi", 60)], 1);
        let url = Url::parse("https://crawler.test/api/data/inpi/patents?medicine=x").unwrap();

        let start = Instant::now();
        tokio::join!(
            limiter.wait_for_url(&url),
            limiter.wait_for_url(&url),
            limiter.wait_for_url(&url),
        );
        assert!(start.elapsed() >= Duration::from_millis(110), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn upstreams_sharing_a_host_do_not_block_each_other() {
        let limiter = limiter(
            &[
                ("https://crawler.test/api/data/inpi", 200),
                ("https://crawler.test/api/data/epo", 200),
            ],
            1,
        );
        let inpi = Url::parse("https://crawler.test/api/data/inpi/patents").unwrap();
        let epo = Url::parse("https://crawler.test/api/data/epo/search").unwrap();

        let start = Instant::now();
        limiter.wait_for_url(&inpi).await;
        limiter.wait_for_url(&epo).await;
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn buckets_prefer_longest_prefix_then_origin() {
        let limiter = limiter(
            &[("https://ops.test/3.2", 10), ("https://ops.test/3.2/rest-services", 20)],
            5,
        );
        let url = Url::parse("https://ops.test/3.2/rest-services/family").unwrap();
        assert_eq!(
            limiter.bucket(&url),
            ("https://ops.test/3.2/rest-services".to_string(), Duration::from_millis(20))
        );
        let url = Url::parse("https://elsewhere.test/x").unwrap();
        assert_eq!(
            limiter.bucket(&url),
            ("https://elsewhere.test".to_string(), Duration::from_millis(5))
        );
    }

    #[test]
    fn default_table_covers_every_upstream() {
        let overridden = UPSTREAM_SPACING
            .iter()
            .any(|(env_var, _, _)| std::env::var_os(env_var).is_some());
        if overridden {
            return;
        }
        let limiter = RateLimiter::for_upstreams();
        for (url, ms) in [
            ("https://serpapi.com/search.json?q=x", 200),
            ("https://patents.google.com/patent/BR112012008823B1/en", 1_000),
            ("https://ops.epo.org/3.2/auth/accesstoken", 200),
            ("https://crawler3-production.up.railway.app/api/data/inpi/patents", 2_000),
        ] {
            let (_, interval) = limiter.bucket(&Url::parse(url).unwrap());
            assert_eq!(interval, Duration::from_millis(ms), "{url}");
        }
    }
}
