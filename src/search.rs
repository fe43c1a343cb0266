use crate::config::{FilterRules, ProviderConfig};
use crate::fetcher::Fetcher;
use crate::filter::Filter;
use crate::scraper::ContentScraper;
use crate::types::FetchOutcome;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// A source of candidate links for a search term.
///
/// Requests go through the `Fetcher` handed in by the orchestrator, so every
/// provider is rate-controlled as its own target.
#[async_trait]
pub trait Discovery: Send + Sync {
    fn name(&self) -> &str;

    /// Base against which relative links returned by `search` are resolved.
    fn origin(&self) -> &Url;

    /// Returns candidate hrefs in result order.
    ///
    /// # Errors
    ///
    /// `Throttled` and `Transport` when the results page could not be fetched,
    /// `EmptyDiscovery` when it held no usable link.
    async fn search(&self, query: &str, fetcher: &Fetcher) -> Result<Vec<String>>;
}

/// The `SearchProvider` struct queries an HTML search results page and collects its result links.
pub struct SearchProvider {
    name: String,
    url_template: String,
    origin: Url,
    scraper: ContentScraper,
    filter: Filter,
}

impl SearchProvider {
    /// Creates a new `SearchProvider`.
    ///
    /// # Arguments
    ///
    /// * `config` - Name and URL template (with a `{query}` placeholder) of the results page.
    /// * `rules` - Phrase lists used to drop navigation links by their anchor text.
    ///
    /// # Returns
    ///
    /// A `Result` containing the provider, or an error if the template is not a valid URL.
    pub fn new(config: &ProviderConfig, rules: &FilterRules) -> Result<Self> {
        let origin = Url::parse(&config.url_template.replace("{query}", ""))?;
        Ok(Self {
            name: config.name.clone(),
            url_template: config.url_template.clone(),
            origin,
            scraper: ContentScraper::new(),
            filter: Filter::new(rules),
        })
    }

    /// Builds the results page URL for `query`.
    pub fn search_url(&self, query: &str) -> String {
        self.url_template.replace("{query}", &urlencoding::encode(query))
    }

    /// Extracts result links from a results page.
    ///
    /// # Arguments
    ///
    /// * `html` - The results page.
    ///
    /// # Returns
    ///
    /// Unwrapped, de-duplicated hrefs in page order.
    pub fn extract_links(&self, html: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.scraper
            .anchors(html)
            .into_iter()
            .filter(|anchor| !self.filter.is_irrelevant(&anchor.text))
            .filter_map(|anchor| {
                let href = self.clean_redirect_url(&anchor.href);
                if self.is_valid_link(&href) {
                    Some(href)
                } else {
                    debug!(provider = %self.name, href = %href, "Skipping link");
                    None
                }
            })
            .filter(|href| seen.insert(href.clone()))
            .collect()
    }

    /// Unwraps search engine redirect links (`/url?q=...`, `/l/?uddg=...`).
    fn clean_redirect_url(&self, href: &str) -> String {
        let Some((path, query)) = href.split_once('?') else {
            return href.to_string();
        };
        if !(path.ends_with("/url") || path.ends_with("/l/") || path.ends_with("/l")) {
            return href.to_string();
        }

        query
            .split('&')
            .find_map(|pair| {
                pair.strip_prefix("q=")
                    .or_else(|| pair.strip_prefix("url="))
                    .or_else(|| pair.strip_prefix("uddg="))
            })
            .and_then(|target| urlencoding::decode(target).ok())
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|| href.to_string())
    }

    /// Checks whether a link can lead to a candidate page.
    fn is_valid_link(&self, href: &str) -> bool {
        let invalid_patterns = [
            "javascript:",
            "mailto:",
            "tel:",
            "google.com/search",
            "accounts.google",
            "webcache.googleusercontent",
            "/advanced_search",
            "/preferences",
            "/settings",
            "/login",
            "/signup",
        ];
        let lower = href.to_lowercase();
        !href.starts_with('#') && !invalid_patterns.iter().any(|pattern| lower.contains(pattern))
    }
}

#[async_trait]
impl Discovery for SearchProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> &Url {
        &self.origin
    }

    async fn search(&self, query: &str, fetcher: &Fetcher) -> Result<Vec<String>> {
        let url = self.search_url(query);
        debug!(provider = %self.name, url = %url, "Search URL");

        match fetcher.fetch(&url).await {
            FetchOutcome::Success(html) => {
                let links = self.extract_links(&html);
                if links.is_empty() {
                    Err(HarvestError::EmptyDiscovery {
                        query: query.to_string(),
                    })
                } else {
                    Ok(links)
                }
            }
            FetchOutcome::Throttled => Err(HarvestError::Throttled {
                target: fetcher.target().to_string(),
            }),
            FetchOutcome::Failed(reason) => Err(HarvestError::Transport(reason)),
        }
    }
}
