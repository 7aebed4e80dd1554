// src/session/mod.rs
//! Field resolution session: acquire a rate-limit token for the page's
//! domain, fetch it, resolve every template field against the snapshot, move
//! on. Pages are independent; a failed or cancelled page never affects the
//! others or the limiter's bucket state.

use crate::fetch::{FetchedPage, PageFetcher};
use crate::limiter::{CancelToken, DomainRateLimiter, DomainStats};
use crate::page::PageSnapshot;
use crate::resolver::{FieldResolution, Resolver};
use crate::template::Template;
use crate::utils::error::RateLimitError;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Resolved { fields: Vec<FieldResolution> },
    FetchFailed { error: String },
    RateLimited { error: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub index: usize,
    pub url: String,
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

impl PageRecord {
    pub fn fields(&self) -> Option<&[FieldResolution]> {
        match &self.outcome {
            PageOutcome::Resolved { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldResolution> {
        self.fields()?.iter().find(|f| f.field == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub template: String,
    pub template_version: String,
    pub records: Vec<PageRecord>,
    pub rate_limits: BTreeMap<String, DomainStats>,
}

impl SessionReport {
    pub fn resolved_pages(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Resolved { .. }))
    }

    /// Pages that could not be fetched or were refused by the limiter.
    pub fn failed_pages(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::FetchFailed { .. } | PageOutcome::RateLimited { .. }))
    }

    pub fn cancelled_pages(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Cancelled))
    }

    pub fn resolved_fields(&self) -> usize {
        self.records
            .iter()
            .filter_map(PageRecord::fields)
            .map(|fields| fields.iter().filter(|f| f.is_resolved()).count())
            .sum()
    }

    fn count(&self, predicate: impl Fn(&PageOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

pub struct ResolutionSession<F> {
    template: Arc<Template>,
    resolver: Arc<Resolver>,
    limiter: Arc<DomainRateLimiter>,
    fetcher: Arc<F>,
    cancel: CancelToken,
}

impl<F> Clone for ResolutionSession<F> {
    fn clone(&self) -> Self {
        Self {
            template: Arc::clone(&self.template),
            resolver: Arc::clone(&self.resolver),
            limiter: Arc::clone(&self.limiter),
            fetcher: Arc::clone(&self.fetcher),
            cancel: self.cancel.clone(),
        }
    }
}

/// Parses and resolves synchronously; the snapshot is dropped before the
/// caller awaits again.
fn resolve_fetched(resolver: &Resolver, template: &Template, fetched: FetchedPage) -> Vec<FieldResolution> {
    let mut snapshot = PageSnapshot::parse(&fetched.url, &fetched.html);
    if let Some(geometry) = fetched.geometry {
        snapshot = snapshot.with_geometry(geometry);
    }
    resolver.resolve_page(&template.fields, &snapshot).fields
}

impl<F: PageFetcher + 'static> ResolutionSession<F> {
    /// Session limited by the template's `rate_limiting` block.
    pub fn new(template: Template, resolver: Resolver, fetcher: F) -> Self {
        let limiter = DomainRateLimiter::new(template.rate_limiting.clone());
        Self {
            template: Arc::new(template),
            resolver: Arc::new(resolver),
            limiter: Arc::new(limiter),
            fetcher: Arc::new(fetcher),
            cancel: CancelToken::never(),
        }
    }

    /// Shares a limiter across sessions, e.g. several templates on one site.
    pub fn with_limiter(mut self, limiter: Arc<DomainRateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.limiter
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub async fn resolve_page(&self, index: usize, address: &str) -> PageRecord {
        let record = |outcome| PageRecord { index, url: address.to_string(), outcome };
        if self.cancel.is_cancelled() {
            return record(PageOutcome::Cancelled);
        }

        match self.limiter.acquire_url(address, &self.cancel).await {
            Ok(waited) => tracing::debug!("Token for {} after {:?}", address, waited),
            Err(RateLimitError::Cancelled { .. }) => return record(PageOutcome::Cancelled),
            Err(e) => {
                tracing::error!("Skipping {}: {}", address, e);
                return record(PageOutcome::RateLimited { error: e.to_string() });
            }
        }

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return record(PageOutcome::Cancelled),
            fetched = self.fetcher.fetch(address) => fetched,
        };
        let fetched = match fetched {
            Ok(page) => page,
            Err(e) => {
                tracing::error!("Failed to fetch {}: {}", address, e);
                return record(PageOutcome::FetchFailed { error: e.to_string() });
            }
        };

        let fields = resolve_fetched(&self.resolver, &self.template, fetched);
        record(PageOutcome::Resolved { fields })
    }

    /// Resolves pages one after another, in order.
    pub async fn run(&self, addresses: &[String]) -> SessionReport {
        tracing::info!("Resolving {} page(s) with template '{}'", addresses.len(), self.template.name);
        let mut records = Vec::with_capacity(addresses.len());
        for (index, address) in addresses.iter().enumerate() {
            records.push(self.resolve_page(index, address).await);
        }
        self.report(records)
    }

    /// Resolves pages with `workers` tasks pulling from a shared queue.
    /// Records come back in input order.
    pub async fn run_concurrent(&self, addresses: &[String], workers: usize) -> SessionReport {
        let workers = workers.clamp(1, addresses.len().max(1));
        tracing::info!(
            "Resolving {} page(s) with template '{}' on {} worker(s)",
            addresses.len(),
            self.template.name,
            workers
        );
        let queue: VecDeque<(usize, String)> = addresses.iter().cloned().enumerate().collect();
        let queue = Arc::new(tokio::sync::Mutex::new(queue));

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let session = self.clone();
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut done = Vec::new();
                    loop {
                        let next = queue.lock().await.pop_front();
                        let Some((index, address)) = next else { break };
                        tracing::debug!("Worker {} took page {} ({})", worker, index, address);
                        done.push(session.resolve_page(index, &address).await);
                    }
                    done
                })
            })
            .collect();

        let mut records = Vec::with_capacity(addresses.len());
        for handle in handles {
            match handle.await {
                Ok(done) => records.extend(done),
                Err(e) => tracing::error!("Resolution worker failed: {}", e),
            }
        }
        records.sort_by_key(|r| r.index);
        self.report(records)
    }

    fn report(&self, records: Vec<PageRecord>) -> SessionReport {
        let report = SessionReport {
            template: self.template.name.clone(),
            template_version: self.template.version.clone(),
            records,
            rate_limits: self.limiter.stats(),
        };
        tracing::info!(
            "Session finished. Resolved: {}, Failed: {}, Cancelled: {}",
            report.resolved_pages(),
            report.failed_pages(),
            report.cancelled_pages()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::{cancel_pair, RateLimitConfig};
    use crate::patterns::PatternRegistry;
    use crate::resolver::{ResolutionStatus, ResolverConfig};
    use crate::template::FieldDefinition;
    use crate::utils::error::FetchError;
    use std::collections::HashMap;
    use std::time::Duration;

    struct MapFetcher {
        pages: HashMap<String, String>,
    }

    impl PageFetcher for MapFetcher {
        async fn fetch(&self, address: &str) -> Result<FetchedPage, FetchError> {
            self.pages
                .get(address)
                .map(|html| FetchedPage::new(address, html.clone()))
                .ok_or_else(|| FetchError::NotFound(address.to_string()))
        }
    }

    fn session(rate: RateLimitConfig) -> ResolutionSession<MapFetcher> {
        let mut template = Template::new(
            "people",
            vec![
                FieldDefinition::new("name").with_selector("h1"),
                FieldDefinition::new("email").with_label("Email").with_pattern("email"),
            ],
        );
        template.rate_limiting = rate;
        let pages = (0..4)
            .map(|i| {
                (
                    format!("https://firm.com/p/{}", i),
                    format!("<h1>Person {}</h1><p><b>Email:</b> p{}@firm.com</p>", i, i),
                )
            })
            .collect();
        let resolver = Resolver::new(Arc::new(PatternRegistry::new()), ResolverConfig::default());
        ResolutionSession::new(template, resolver, MapFetcher { pages })
    }

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://firm.com/p/{}", i)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_run_resolves_each_page() {
        let session = session(RateLimitConfig::new(10.0, 10));
        let report = session.run(&addresses(2)).await;
        assert_eq!(report.resolved_pages(), 2);
        assert_eq!(report.resolved_fields(), 4);
        let email = report.records[1].field("email").unwrap();
        assert_eq!(email.value.as_deref(), Some("p1@firm.com"));
        assert_eq!(email.status, ResolutionStatus::Resolved);
        assert_eq!(report.rate_limits["firm.com"].granted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_is_isolated() {
        let session = session(RateLimitConfig::new(10.0, 10));
        let mut pages = addresses(2);
        pages.insert(1, "https://firm.com/missing".to_string());
        let report = session.run(&pages).await;
        assert_eq!(report.resolved_pages(), 2);
        assert_eq!(report.failed_pages(), 1);
        assert!(matches!(report.records[1].outcome, PageOutcome::FetchFailed { .. }));
        assert_eq!(report.records[2].field("name").unwrap().value.as_deref(), Some("Person 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_respects_rate_and_order() {
        let session = session(RateLimitConfig::new(1.0, 2).with_timeout(0.0));
        let start = tokio::time::Instant::now();
        let report = session.run_concurrent(&addresses(4), 4).await;
        let indexes: Vec<usize> = report.records.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
        assert_eq!(report.resolved_pages(), 4);
        // two immediate tokens, then one per second
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(report.rate_limits["firm.com"].delayed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_timeout_skips_page() {
        let session = session(RateLimitConfig::new(0.1, 1).with_timeout(1.0));
        let report = session.run(&addresses(2)).await;
        assert_eq!(report.resolved_pages(), 1);
        assert!(matches!(report.records[1].outcome, PageOutcome::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_remaining_pages() {
        let (handle, token) = cancel_pair();
        let session = session(RateLimitConfig::new(0.5, 1).with_timeout(0.0)).with_cancel(token);
        let runner = {
            let session = session.clone();
            tokio::spawn(async move { session.run(&addresses(3)).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.cancel();
        let report = runner.await.unwrap();
        assert_eq!(report.resolved_pages(), 1);
        assert_eq!(report.cancelled_pages(), 2);
    }

    #[test]
    fn test_record_serialization_is_flat() {
        let record = PageRecord {
            index: 0,
            url: "u".to_string(),
            outcome: PageOutcome::FetchFailed { error: "boom".to_string() },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "fetch_failed");
        assert_eq!(json["error"], "boom");
    }
}
