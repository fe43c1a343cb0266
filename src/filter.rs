//! Relevance and genericness rules applied to raw candidates.

use crate::config::FilterRules;

/// Per-query context for email acceptance.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterContext<'a> {
    /// When set, an email is only accepted if it plausibly belongs to this author.
    pub author: Option<&'a str>,
}

impl<'a> FilterContext<'a> {
    pub fn for_author(author: Option<&'a str>) -> Self {
        Self { author }
    }
}

/// Decides which candidates become contacts. The phrase lists are injected at
/// construction and are all matched case-insensitively.
#[derive(Debug, Clone)]
pub struct Filter {
    generic_prefixes: Vec<String>,
    irrelevant_phrases: Vec<String>,
}

impl Filter {
    pub fn new(rules: &FilterRules) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            generic_prefixes: lower(&rules.generic_prefixes),
            irrelevant_phrases: lower(&rules.irrelevant_phrases),
        }
    }

    /// Whether `text` contains any configured boilerplate phrase.
    pub fn is_irrelevant(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.irrelevant_phrases.iter().any(|phrase| text.contains(phrase.as_str()))
    }

    /// Whether the local part denotes an institutional mailbox.
    ///
    /// A prefix matches the whole local part or a leading segment followed by a
    /// non-letter, so `info@`, `info.cs@` and `noreply2@` match while `informatics@` does not.
    pub fn is_generic(&self, email: &str) -> bool {
        let local = email.split('@').next().unwrap_or_default().to_lowercase();
        self.generic_prefixes.iter().any(|prefix| {
            local
                .strip_prefix(prefix.as_str())
                .map(|rest| rest.chars().next().map_or(true, |c| !c.is_alphabetic()))
                .unwrap_or(false)
        })
    }

    pub fn accept_email(&self, email: &str, context: &FilterContext<'_>) -> bool {
        if !email.contains('@') || self.is_generic(email) || self.is_irrelevant(email) {
            return false;
        }
        match context.author {
            Some(author) => email_belongs_to(email, author),
            None => true,
        }
    }

    pub fn accept_name(&self, name: &str) -> bool {
        let words = name.split_whitespace().count();
        (2..=4).contains(&words) && !self.is_irrelevant(name)
    }
}

/// Lowercase letters and digits only.
fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// How strongly a name matches an address; ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NameMatch {
    Surname,
    Full,
}

/// Heuristic ownership check between an address and a person's name.
///
/// `Full` when the compacted name occurs anywhere in the compacted address
/// (`jane.doe@`), `Surname` when only the last name of at least two letters does
/// (`jdoe@`, `doe.j@`).
pub fn match_name(email: &str, name: &str) -> Option<NameMatch> {
    let address = compact(email);
    let full = compact(name);
    if full.is_empty() {
        return None;
    }
    if address.contains(&full) {
        return Some(NameMatch::Full);
    }
    name.split_whitespace()
        .last()
        .map(compact)
        .filter(|surname| surname.chars().count() >= 2 && address.contains(surname.as_str()))
        .map(|_| NameMatch::Surname)
}

/// Strict check used for the author constraint.
///
/// The compacted full name must occur in the address, or the first-name
/// initial must directly precede the surname (`jsmith@` for John Smith).
pub fn email_belongs_to(email: &str, name: &str) -> bool {
    let address = compact(email);
    let full = compact(name);
    if full.is_empty() {
        return false;
    }
    if address.contains(&full) {
        return true;
    }

    let words: Vec<String> = name.split_whitespace().map(compact).filter(|w| !w.is_empty()).collect();
    match (words.first(), words.last()) {
        (Some(first), Some(surname)) if words.len() >= 2 && surname.chars().count() >= 2 => {
            let initial: String = first.chars().take(1).collect();
            address.contains(&format!("{}{}", initial, surname))
        }
        _ => false,
    }
}
