use crate::rate::RateState;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use url::Url;

/// What a run is looking for: a field of study and, optionally, one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub field: String,
    pub author: Option<String>,
}

impl Query {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            author: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        self.author = if author.trim().is_empty() {
            None
        } else {
            Some(author.trim().to_string())
        };
        self
    }

    /// The search terms tried against every discovery provider, in order.
    pub fn search_terms(&self) -> Vec<String> {
        let field = self.field.trim();
        let mut terms = Vec::with_capacity(3);
        if let Some(author) = &self.author {
            terms.push(format!("\"{}\" {}", author, field));
        }
        terms.push(format!("{} researchers", field));
        terms.push(format!("site:edu {} researchers", field));
        terms
    }
}

/// A link returned by discovery, already resolved to an absolute URL.
///
/// Equality and hashing only look at the resolved URL.
#[derive(Debug, Clone)]
pub struct CandidateLink {
    url: Url,
    pub source_query: String,
    pub rank: usize,
}

impl CandidateLink {
    /// Resolves `href` against `base` and normalizes it.
    ///
    /// Returns `None` for anything that is not an http(s) URL.
    pub fn resolve(href: &str, base: &Url, source_query: &str, rank: usize) -> Option<Self> {
        let url = crate::dedupe::normalize_url(href, Some(base))?;
        Some(Self {
            url,
            source_query: source_query.to_string(),
            rank,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Lowercase host name, used as the rate-limiting target for page fetches.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl PartialEq for CandidateLink {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for CandidateLink {}

impl Hash for CandidateLink {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// A string pulled out of page text that has not been filtered yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawCandidate {
    EmailLike(String),
    NameLike(String),
}

/// A contact that passed every filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedContact {
    pub email: String,
    pub author: Option<String>,
    pub source_url: String,
    pub discovered_at: DateTime<Utc>,
}

impl AcceptedContact {
    /// Uniqueness key of a contact within one result set.
    pub fn key(&self) -> String {
        self.email.to_lowercase()
    }
}

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    Throttled,
    Failed(String),
}

/// Phase of the harvesting state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Discovering,
    Fetching,
    Done(Termination),
}

/// Why a run reached `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    QuotaMet,
    SourcesExhausted,
    Stopped,
}

/// Final backoff state of one target at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub state: RateState,
    pub exhausted: bool,
    pub attempts: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    /// Accepted contacts in discovery order, never more than the quota.
    pub contacts: Vec<AcceptedContact>,
    pub quota: usize,
    pub termination: Termination,
    pub targets: Vec<TargetReport>,
    /// Total number of requests issued across all targets.
    pub fetch_attempts: usize,
}

impl HarvestReport {
    pub fn target(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target == name)
    }

    /// Reports an unmet quota when the run ran out of sources.
    pub fn shortfall(&self) -> Option<HarvestError> {
        if self.termination == Termination::SourcesExhausted && self.contacts.len() < self.quota {
            Some(HarvestError::ExhaustedSources {
                found: self.contacts.len(),
                quota: self.quota,
            })
        } else {
            None
        }
    }
}
