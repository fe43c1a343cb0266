use crate::types::RawCandidate;
use regex::Regex;
use std::collections::BTreeSet;

/// Conservative email grammar: word characters, dots and hyphens around `@`,
/// ending in an alphabetic label of at least two characters.
const EMAIL_PATTERN: &str = r"[\w.\-]+@[\w\-]+(?:\.[\w\-]+)*\.[A-Za-z]{2,}\b";

/// Two or more capitalized words, allowing hyphenated parts and one middle initial.
const NAME_PATTERN: &str = r"\b[A-Z][a-z]+(?:-[A-Z][a-z]+)?(?:\s+[A-Z]\.)?(?:\s+[A-Z][a-z]+(?:-[A-Z][a-z]+)?)+\b";

/// File names such as `logo@2x.png` look like addresses.
const IMAGE_SUFFIXES: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];

/// Emails and names found in one page, in order of first appearance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub emails: Vec<String>,
    pub names: Vec<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.names.is_empty()
    }

    /// The same data as tagged candidates.
    pub fn candidates(&self) -> impl Iterator<Item = RawCandidate> + '_ {
        self.emails
            .iter()
            .cloned()
            .map(RawCandidate::EmailLike)
            .chain(self.names.iter().cloned().map(RawCandidate::NameLike))
    }
}

/// Pulls email-like and name-like strings out of page text.
///
/// Extraction never fails; text without matches yields an empty result.
pub struct Extractor {
    email_regex: Regex,
    name_regex: Regex,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Extractor {
            email_regex: Regex::new(EMAIL_PATTERN).expect("email pattern is valid"),
            name_regex: Regex::new(NAME_PATTERN).expect("name pattern is valid"),
        }
    }

    pub fn extract(&self, text: &str) -> Extraction {
        Extraction {
            emails: self.extract_emails(text),
            names: self.extract_names(text),
        }
    }

    pub fn extract_emails(&self, text: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.email_regex
            .find_iter(text)
            .map(|m| m.as_str().trim_start_matches(&['.', '-'][..]).to_string())
            .filter(|email| {
                let lower = email.to_lowercase();
                !email.starts_with('@') && !IMAGE_SUFFIXES.iter().any(|s| lower.ends_with(s))
            })
            .filter(|email| seen.insert(email.to_lowercase()))
            .collect()
    }

    pub fn extract_names(&self, text: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.name_regex
            .find_iter(text)
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_email_and_name_from_sentence() {
        let extractor = Extractor::new();
        let found = extractor.extract("Contact Dr. Jane Doe at jane.doe@university.edu for details.");

        assert_eq!(found.emails, vec!["jane.doe@university.edu".to_string()]);
        assert!(found.names.contains(&"Jane Doe".to_string()));
    }

    #[test]
    fn test_no_matches_yields_empty_sets() {
        let extractor = Extractor::new();
        let found = extractor.extract("nothing to see here, just lowercase words.");
        assert!(found.is_empty());
        assert!(extractor.extract("").is_empty());
    }

    #[test]
    fn test_emails_are_unique_case_insensitively() {
        let extractor = Extractor::new();
        let emails = extractor
            .extract_emails("j.roe@lab.org, J.Roe@Lab.org; k-li@cs.mit.edu. logo@2x.png");

        assert_eq!(emails, vec!["j.roe@lab.org".to_string(), "k-li@cs.mit.edu".to_string()]);
    }

    #[test]
    fn test_trailing_punctuation_is_not_part_of_the_domain() {
        let extractor = Extractor::new();
        let emails = extractor.extract_emails("Write to ada@math.ox.ac.uk.");
        assert_eq!(emails, vec!["ada@math.ox.ac.uk".to_string()]);
    }

    #[test]
    fn test_names_allow_initials_and_hyphens() {
        let extractor = Extractor::new();
        let names = extractor.extract_names("Work by Mary J. Smith-Jones and Alan Turing appeared.");

        assert!(names.contains(&"Mary J. Smith-Jones".to_string()));
        assert!(names.contains(&"Alan Turing".to_string()));
    }

    #[test]
    fn test_candidates_are_tagged() {
        let extractor = Extractor::new();
        let found = extractor.extract("Grace Hopper grace@navy.mil");
        let candidates: Vec<_> = found.candidates().collect();

        assert!(candidates.contains(&RawCandidate::EmailLike("grace@navy.mil".into())));
        assert!(candidates.contains(&RawCandidate::NameLike("Grace Hopper".into())));
    }
}
