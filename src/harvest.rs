//! The harvesting loop: discovery, prioritized fetching, extraction and filtering.

use crate::config::HarvestConfig;
use crate::dedupe::Deduper;
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::filter::{match_name, Filter, FilterContext};
use crate::scraper::ContentScraper;
use crate::search::{Discovery, SearchProvider};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{
    AcceptedContact, CandidateLink, FetchOutcome, HarvestReport, Phase, Query, TargetReport,
    Termination,
};
use crate::{HarvestError, Result};
use chrono::Utc;
use futures::{stream, StreamExt};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// External request to end a run at the next link boundary.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Result of offering a contact to a `ContactSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    Duplicate,
    QuotaReached,
}

/// Accepted contacts keyed by lowercase email, in discovery order, never above quota.
#[derive(Debug)]
pub struct ContactSet {
    quota: usize,
    keys: HashSet<String>,
    contacts: Vec<AcceptedContact>,
}

impl ContactSet {
    pub fn new(quota: usize) -> Self {
        Self {
            quota,
            keys: HashSet::new(),
            contacts: Vec::new(),
        }
    }

    /// Checks the quota and inserts in one step.
    pub fn insert(&mut self, contact: AcceptedContact) -> Insertion {
        if self.keys.contains(&contact.key()) {
            return Insertion::Duplicate;
        }
        if self.is_full() {
            return Insertion::QuotaReached;
        }
        self.keys.insert(contact.key());
        self.contacts.push(contact);
        Insertion::Added
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= self.quota
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn into_contacts(self) -> Vec<AcceptedContact> {
        self.contacts
    }
}

/// Whether `host` equals or is a subdomain of one of the preferred domains.
pub fn is_preferred(host: &str, preferred: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    preferred.iter().any(|domain| {
        let domain = domain.trim_start_matches('.').to_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

/// Moves links on preferred hosts ahead of the rest, keeping relative order.
pub fn prioritize(links: Vec<CandidateLink>, preferred: &[String]) -> Vec<CandidateLink> {
    let (mut first, rest): (Vec<_>, Vec<_>) = links
        .into_iter()
        .partition(|link| is_preferred(link.host(), preferred));
    first.extend(rest);
    first
}

/// Groups links by host in order of first appearance.
fn group_by_host(links: Vec<CandidateLink>) -> Vec<(String, Vec<CandidateLink>)> {
    let mut groups: Vec<(String, Vec<CandidateLink>)> = Vec::new();
    for link in links {
        match groups.iter_mut().find(|(host, _)| host == link.host()) {
            Some((_, group)) => group.push(link),
            None => groups.push((link.host().to_string(), vec![link])),
        }
    }
    groups
}

/// Drives discovery and page fetching until the quota is met or the sources run dry.
pub struct Harvester {
    config: HarvestConfig,
    transport: Arc<dyn Transport>,
    discovery: Vec<Arc<dyn Discovery>>,
    scraper: ContentScraper,
    extractor: Extractor,
    filter: Filter,
    stop: StopSignal,
}

impl Harvester {
    pub fn new(
        config: HarvestConfig,
        transport: Arc<dyn Transport>,
        discovery: Vec<Arc<dyn Discovery>>,
    ) -> Self {
        let filter = Filter::new(&config.filter);
        Self {
            config,
            transport,
            discovery,
            scraper: ContentScraper::new(),
            extractor: Extractor::new(),
            filter,
            stop: StopSignal::new(),
        }
    }

    /// Builds a harvester that talks HTTP through `reqwest` to the configured providers.
    pub fn from_config(config: HarvestConfig) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        let discovery = config
            .providers
            .iter()
            .map(|provider| {
                SearchProvider::new(provider, &config.filter)
                    .map(|p| Arc::new(p) as Arc<dyn Discovery>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(config, transport, discovery))
    }

    /// Handle that ends the current run at the next link boundary.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Shares an existing signal instead of the harvester's own.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Runs one harvest. State such as visited URLs and backoff is scoped to this call.
    ///
    /// Never fails: every pipeline error degrades into fewer contacts.
    pub async fn run(&self, query: &Query) -> HarvestReport {
        info!(field = %query.field, author = ?query.author, quota = self.config.quota, "Starting harvest");
        let run = Run::new(self, query);
        let termination = run.execute().await;
        let report = run.into_report(termination);
        info!(
            contacts = report.contacts.len(),
            attempts = report.fetch_attempts,
            termination = ?report.termination,
            "Harvest finished"
        );
        report
    }
}

/// State owned by a single run.
struct Run<'a> {
    harvester: &'a Harvester,
    query: &'a Query,
    targets: Mutex<Vec<Arc<Fetcher>>>,
    visited: Mutex<Deduper>,
    contacts: Mutex<ContactSet>,
}

impl<'a> Run<'a> {
    fn new(harvester: &'a Harvester, query: &'a Query) -> Self {
        Self {
            harvester,
            query,
            targets: Mutex::new(Vec::new()),
            visited: Mutex::new(Deduper::new()),
            contacts: Mutex::new(ContactSet::new(harvester.config.quota)),
        }
    }

    async fn execute(&self) -> Termination {
        let mut phase = Phase::Discovering;

        for term in self.query.search_terms() {
            for provider in &self.harvester.discovery {
                if let Some(termination) = self.finished().await {
                    transition(&mut phase, Phase::Done(termination));
                    return termination;
                }

                let fetcher = self.fetcher(&format!("discovery:{}", provider.name())).await;
                if fetcher.is_exhausted() {
                    debug!(provider = provider.name(), "Provider exhausted, skipping");
                    continue;
                }

                transition(&mut phase, Phase::Discovering);
                let Some(hrefs) = self.discover(provider.as_ref(), &term, &fetcher).await else {
                    continue;
                };

                let links = self.prepare_links(provider.origin(), &term, hrefs);
                if links.is_empty() {
                    continue;
                }

                transition(&mut phase, Phase::Fetching);
                self.drain(links).await;
            }
        }

        let termination = self.finished().await.unwrap_or(Termination::SourcesExhausted);
        transition(&mut phase, Phase::Done(termination));
        termination
    }

    async fn finished(&self) -> Option<Termination> {
        if self.contacts.lock().await.is_full() {
            Some(Termination::QuotaMet)
        } else if self.harvester.stop.is_stopped() {
            Some(Termination::Stopped)
        } else {
            None
        }
    }

    /// Returns the run-scoped fetcher of `target`, creating it on first use.
    async fn fetcher(&self, target: &str) -> Arc<Fetcher> {
        let mut targets = self.targets.lock().await;
        if let Some(fetcher) = targets.iter().find(|f| f.target() == target) {
            return fetcher.clone();
        }
        let fetcher = Arc::new(Fetcher::from_config(
            target,
            self.harvester.transport.clone(),
            &self.harvester.config,
        ));
        targets.push(fetcher.clone());
        fetcher
    }

    /// Queries one provider, re-asking while it is throttled but not circuit-broken.
    async fn discover(
        &self,
        provider: &dyn Discovery,
        term: &str,
        fetcher: &Fetcher,
    ) -> Option<Vec<String>> {
        let max_attempts = self.harvester.config.rate_limit.failure_threshold.max(1);
        for _ in 0..max_attempts {
            match provider.search(term, fetcher).await {
                Ok(hrefs) if hrefs.is_empty() => {
                    warn!(provider = provider.name(), query = term, "No links discovered");
                    return None;
                }
                Ok(hrefs) => {
                    info!(provider = provider.name(), query = term, links = hrefs.len(), "Links discovered");
                    return Some(hrefs);
                }
                Err(HarvestError::Throttled { .. })
                    if !fetcher.is_exhausted() && !self.harvester.stop.is_stopped() =>
                {
                    debug!(provider = provider.name(), "Discovery throttled, retrying");
                }
                Err(e @ HarvestError::EmptyDiscovery { .. }) => {
                    warn!(provider = provider.name(), "{}", e);
                    return None;
                }
                Err(e) => {
                    warn!(provider = provider.name(), query = term, error = %e, "Discovery failed");
                    return None;
                }
            }
        }
        None
    }

    /// Resolves, de-duplicates and orders one discovery batch.
    fn prepare_links(&self, origin: &Url, term: &str, hrefs: Vec<String>) -> Vec<CandidateLink> {
        let mut seen = HashSet::new();
        let links = hrefs
            .iter()
            .enumerate()
            .filter_map(|(rank, href)| CandidateLink::resolve(href, origin, term, rank))
            .filter(|link| seen.insert(link.clone()))
            .collect();
        prioritize(links, &self.harvester.config.preferred_domains)
    }

    /// Fetches every link, one flow per host, `concurrent_hosts` flows at a time.
    async fn drain(&self, links: Vec<CandidateLink>) {
        let groups = group_by_host(links);
        stream::iter(groups)
            .map(|(host, links)| self.drain_host(host, links))
            .buffer_unordered(self.harvester.config.concurrent_hosts.max(1))
            .collect::<Vec<()>>()
            .await;
    }

    async fn drain_host(&self, host: String, links: Vec<CandidateLink>) {
        let fetcher = self.fetcher(&host).await;
        let total = links.len();

        for (index, link) in links.into_iter().enumerate() {
            if self.finished().await.is_some() {
                return;
            }
            if fetcher.is_exhausted() {
                warn!(host = %host, skipped = total - index, "Host exhausted, dropping its remaining links");
                return;
            }

            {
                let mut visited = self.visited.lock().await;
                if visited.seen(link.url().as_str()) {
                    debug!(url = %link.url(), "Already visited");
                    continue;
                }
                visited.mark(link.url().as_str());
            }

            if let Some(html) = self.fetch_page(&fetcher, &link).await {
                self.collect(&html, &link).await;
            }
        }
    }

    /// Fetches one link, re-attempting it in place while throttled and not circuit-broken.
    async fn fetch_page(&self, fetcher: &Fetcher, link: &CandidateLink) -> Option<String> {
        loop {
            match fetcher.fetch(link.url().as_str()).await {
                FetchOutcome::Success(html) => return Some(html),
                FetchOutcome::Throttled
                    if !fetcher.is_exhausted() && !self.harvester.stop.is_stopped() =>
                {
                    debug!(
                        url = %link.url(),
                        delay_ms = fetcher.rate_state().delay.as_millis() as u64,
                        "Throttled, retrying after backoff"
                    );
                }
                FetchOutcome::Throttled => {
                    warn!(url = %link.url(), "Abandoning throttled link");
                    return None;
                }
                FetchOutcome::Failed(reason) => {
                    warn!(url = %link.url(), reason = %reason, "Abandoning link");
                    return None;
                }
            }
        }
    }

    /// Extracts and filters one page, then offers the accepted emails to the result set.
    async fn collect(&self, html: &str, link: &CandidateLink) {
        let harvester = self.harvester;
        let text = harvester.scraper.page_text(html);
        let found = harvester.extractor.extract(&text);
        debug!(url = %link.url(), emails = found.emails.len(), names = found.names.len(), "Extracted candidates");

        let names: Vec<&String> = found
            .names
            .iter()
            .filter(|name| harvester.filter.accept_name(name))
            .collect();
        let author = self.query.author.as_deref();
        let context = FilterContext::for_author(author);

        let mut contacts = self.contacts.lock().await;
        for email in &found.emails {
            if !harvester.filter.accept_email(email, &context) {
                debug!(email = %email, "Rejected candidate");
                continue;
            }

            let name = author.map(str::to_string).or_else(|| {
                names
                    .iter()
                    .filter_map(|name| match_name(email, name).map(|strength| (strength, *name)))
                    .min_by_key(|(strength, _)| Reverse(*strength))
                    .map(|(_, name)| name.clone())
            });

            let contact = AcceptedContact {
                email: email.clone(),
                author: name,
                source_url: link.url().to_string(),
                discovered_at: Utc::now(),
            };
            match contacts.insert(contact) {
                Insertion::Added => info!(email = %email, url = %link.url(), "Accepted contact"),
                Insertion::Duplicate => debug!(email = %email, "Duplicate contact"),
                Insertion::QuotaReached => break,
            }
        }
    }

    fn into_report(self, termination: Termination) -> HarvestReport {
        let targets: Vec<TargetReport> = self
            .targets
            .into_inner()
            .iter()
            .map(|fetcher| TargetReport {
                target: fetcher.target().to_string(),
                state: fetcher.rate_state(),
                exhausted: fetcher.is_exhausted(),
                attempts: fetcher.attempts(),
            })
            .collect();
        let fetch_attempts = targets.iter().map(|t| t.attempts).sum();

        HarvestReport {
            contacts: self.contacts.into_inner().into_contacts(),
            quota: self.harvester.config.quota,
            termination,
            targets,
            fetch_attempts,
        }
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    if *phase != next {
        debug!(from = ?phase, to = ?next, "Phase change");
        *phase = next;
    }
}
