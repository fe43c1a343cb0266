use crate::{HarvestError, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides, e.g.
/// `SCHOLARMAIL_RATE_LIMIT__FLOOR_MS=2000`.
pub const ENV_PREFIX: &str = "SCHOLARMAIL";

/// Upper bound for `rate_limit.failure_factor`.
pub const MAX_FAILURE_FACTOR: f64 = 10.0;

/// The `HarvestConfig` struct holds every knob of a harvesting run.
/// It includes the topic and quota, rate limiting, filter rules, discovery providers and output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// The research field to search for.
    pub field: String,
    /// Optional author whose mailbox is being looked for.
    pub author: Option<String>,
    /// The maximum number of distinct contacts to collect.
    pub quota: usize,
    /// The adaptive backoff settings applied to every target.
    pub rate_limit: RateLimit,
    /// Generic-mailbox and boilerplate rules.
    pub filter: FilterRules,
    /// Hosts drained before all others (suffix match on the host name).
    pub preferred_domains: Vec<String>,
    /// User-agent strings rotated across requests.
    pub user_agents: Vec<String>,
    /// Timeout for a single HTTP request, in milliseconds.
    pub request_timeout_ms: u64,
    /// Status codes treated as an explicit rate-limit signal.
    pub throttle_statuses: Vec<u16>,
    /// The number of page hosts drained concurrently.
    pub concurrent_hosts: usize,
    /// Search result pages queried during discovery.
    pub providers: Vec<ProviderConfig>,
    /// Where the CSV report is written.
    pub output: PathBuf,
}

/// The `RateLimit` struct holds the adaptive delay settings for one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Politeness minimum between two requests, in milliseconds.
    pub floor_ms: u64,
    /// Upper bound for the backed-off delay, in milliseconds.
    pub ceiling_ms: u64,
    /// Delay used for the first request, clamped into `[floor, ceiling]`.
    pub initial_ms: u64,
    /// Consecutive throttles after which the target is abandoned.
    pub failure_threshold: u32,
    /// Consecutive transport failures after which the target is abandoned.
    pub failure_budget: u32,
    /// Multiplier applied to the delay after a transport failure.
    pub failure_factor: f64,
}

/// Phrase lists consulted by the `Filter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Local parts denoting institutional mailboxes.
    pub generic_prefixes: Vec<String>,
    /// Navigation and boilerplate phrases, matched case-insensitively.
    pub irrelevant_phrases: Vec<String>,
}

/// A search results page used as a discovery source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Results page URL with a `{query}` placeholder.
    pub url_template: String,
}

impl HarvestConfig {
    /// Loads configuration from defaults, an optional file and the environment, in that order.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional configuration file; its format is taken from the extension.
    ///
    /// # Returns
    ///
    /// A validated `HarvestConfig`, or an error if a layer cannot be read or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&HarvestConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config: HarvestConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the constraints the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        let rate = &self.rate_limit;
        if rate.floor_ms == 0 {
            return Err(HarvestError::InvalidConfig("rate_limit.floor_ms must be positive".into()));
        }
        if rate.ceiling_ms < rate.floor_ms {
            return Err(HarvestError::InvalidConfig(
                "rate_limit.ceiling_ms must not be below floor_ms".into(),
            ));
        }
        if rate.failure_threshold == 0 || rate.failure_budget == 0 {
            return Err(HarvestError::InvalidConfig(
                "failure_threshold and failure_budget must be at least 1".into(),
            ));
        }
        if !(1.0..=MAX_FAILURE_FACTOR).contains(&rate.failure_factor) {
            return Err(HarvestError::InvalidConfig(format!(
                "rate_limit.failure_factor must be between 1.0 and {}",
                MAX_FAILURE_FACTOR
            )));
        }
        if self.user_agents.is_empty() {
            return Err(HarvestError::InvalidConfig("user_agents must not be empty".into()));
        }
        if self.concurrent_hosts == 0 {
            return Err(HarvestError::InvalidConfig("concurrent_hosts must be at least 1".into()));
        }
        if let Some(provider) = self.providers.iter().find(|p| !p.url_template.contains("{query}")) {
            return Err(HarvestError::InvalidConfig(format!(
                "provider '{}' has no {{query}} placeholder",
                provider.name
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RateLimit {
    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }

    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }
}

impl Default for HarvestConfig {
    /// Provides default values for the `HarvestConfig` struct.
    ///
    /// # Returns
    ///
    /// A `HarvestConfig` instance with default settings.
    fn default() -> Self {
        Self {
            field: String::new(),
            author: None,
            quota: crate::DEFAULT_QUOTA,
            rate_limit: RateLimit::default(),
            filter: FilterRules::default(),
            preferred_domains: to_strings(&[
                "arxiv.org",
                "biorxiv.org",
                "medrxiv.org",
                "ncbi.nlm.nih.gov",
                "europepmc.org",
                "semanticscholar.org",
                "edu",
            ]),
            user_agents: to_strings(&[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
            ]),
            request_timeout_ms: crate::DEFAULT_TIMEOUT.as_millis() as u64,
            throttle_statuses: vec![429],
            concurrent_hosts: crate::DEFAULT_CONCURRENT_HOSTS,
            providers: vec![
                ProviderConfig::new("scholar", "https://scholar.google.com/scholar?q={query}"),
                ProviderConfig::new("pubmed", "https://pubmed.ncbi.nlm.nih.gov/?term={query}"),
                ProviderConfig::new(
                    "researchgate",
                    "https://www.researchgate.net/search/publication?q={query}",
                ),
                ProviderConfig::new("duckduckgo", "https://html.duckduckgo.com/html/?q={query}"),
            ],
            output: PathBuf::from("emails.csv"),
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            floor_ms: 1_000,
            ceiling_ms: 60_000,
            initial_ms: 1_000,
            failure_threshold: crate::DEFAULT_FAILURE_THRESHOLD,
            failure_budget: 5,
            failure_factor: 1.25,
        }
    }
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            generic_prefixes: to_strings(&[
                "info", "support", "admin", "administrator", "contact", "office", "help",
                "helpdesk", "webmaster", "noreply", "no-reply", "donotreply", "do-not-reply",
                "postmaster", "hostmaster", "abuse", "privacy", "press", "media", "news",
                "marketing", "sales", "admissions", "enquiries", "inquiries", "hello",
                "team", "jobs", "careers", "library", "registrar", "it",
            ]),
            irrelevant_phrases: to_strings(&[
                "helpful links", "service catalog", "information technology", "about us",
                "student portal", "email services", "contact us", "administrative offices",
                "calendar", "admissions", "resources", "support", "apply",
                "default.aspx", "faq", "news", "policies", "support team",
                "directions", "services", "external links", "university email",
                "technology services", "quick links", "campus map", "departments",
                "staff directory", "student life", "faculty support", "events",
                "user agreement", "privacy policy", "disclaimer", "legal information",
                "terms of service", "login", "create account", "newsletter",
                "job openings", "career opportunities", "volunteer", "partners",
                "sponsors", "press releases", "media contact", "homepage",
                "university rankings", "academic programs", "research labs", "syllabus",
                "alumni", "testimonials", "case studies", "webinar", "podcast",
                "technical support", "ticket system", "open positions", "complaints",
                "copyright", "financial aid", "scholarships", "conference schedule",
            ]),
        }
    }
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), crate::DEFAULT_TIMEOUT);
        assert!(config.rate_limit.floor() > Duration::ZERO);
    }

    #[test]
    fn test_rejects_zero_floor_and_inverted_bounds() {
        let mut config = HarvestConfig::default();
        config.rate_limit.floor_ms = 0;
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));

        let mut config = HarvestConfig::default();
        config.rate_limit.ceiling_ms = 10;
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_out_of_range_failure_factor() {
        for factor in [0.5, 1e300, f64::INFINITY, f64::NAN] {
            let mut config = HarvestConfig::default();
            config.rate_limit.failure_factor = factor;
            assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_rejects_empty_user_agent_pool() {
        let mut config = HarvestConfig::default();
        config.user_agents.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let mut config = HarvestConfig::default();
        config.providers.push(ProviderConfig::new("broken", "https://example.com/search"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
field = "protein folding"
quota = 3
preferred_domains = ["arxiv.org"]

[rate_limit]
floor_ms = 250
ceiling_ms = 5000

[filter]
generic_prefixes = ["info"]
"#
        )
        .unwrap();

        let config = HarvestConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.field, "protein folding");
        assert_eq!(config.quota, 3);
        assert_eq!(config.rate_limit.floor_ms, 250);
        assert_eq!(config.rate_limit.ceiling_ms, 5000);
        // untouched keys keep their defaults
        assert_eq!(config.rate_limit.failure_threshold, crate::DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(config.filter.generic_prefixes, vec!["info".to_string()]);
        assert!(!config.filter.irrelevant_phrases.is_empty());
        assert_eq!(config.preferred_domains, vec!["arxiv.org".to_string()]);
    }
}
