use scraper::{ElementRef, Html, Selector};
use tracing::instrument;

/// Elements whose text never reaches the extractor.
const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];

/// An anchor found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub href: String,
    pub text: String,
}

/// The `ContentScraper` struct reduces HTML documents to the text and links the pipeline needs.
pub struct ContentScraper {
    /// Selector for every anchor carrying an `href`.
    anchors: Selector,
    /// Selector for the document body.
    body: Selector,
}

impl Default for ContentScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentScraper {
    pub fn new() -> Self {
        Self {
            anchors: Selector::parse("a[href]").expect("anchor selector is valid"),
            body: Selector::parse("body").expect("body selector is valid"),
        }
    }

    /// Extracts the visible text of an HTML document.
    ///
    /// Script and style content is skipped, whitespace is collapsed, and the targets
    /// of `mailto:` links are appended so addresses hidden behind link text still appear.
    ///
    /// # Arguments
    ///
    /// * `html` - The HTML string to be parsed.
    ///
    /// # Returns
    ///
    /// The page text; empty when the document has none.
    #[instrument(skip(self, html), fields(html_length = html.len()))]
    pub fn page_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let root = document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element());

        let mut text = String::new();
        collect_text(root, &mut text);

        for address in self.mailto_addresses(&document) {
            text.push(' ');
            text.push_str(&address);
        }

        self.clean_text(&text)
    }

    /// Returns every anchor of the document with its collapsed link text.
    pub fn anchors(&self, html: &str) -> Vec<Anchor> {
        let document = Html::parse_document(html);
        document
            .select(&self.anchors)
            .filter_map(|element| {
                let href = element.value().attr("href")?.trim();
                if href.is_empty() {
                    return None;
                }
                Some(Anchor {
                    href: href.to_string(),
                    text: self.clean_text(&element.text().collect::<Vec<_>>().join(" ")),
                })
            })
            .collect()
    }

    fn mailto_addresses(&self, document: &Html) -> Vec<String> {
        document
            .select(&self.anchors)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| {
                let target = href.trim();
                let prefix = target.get(..7)?;
                if !prefix.eq_ignore_ascii_case("mailto:") {
                    return None;
                }
                let address = target[7..].split('?').next().unwrap_or_default();
                urlencoding::decode(address).ok().map(|a| a.into_owned())
            })
            .filter(|address| address.contains('@'))
            .collect()
    }

    /// Normalizes whitespace to single spaces.
    fn clean_text(&self, text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child) = ElementRef::wrap(child) {
            if !SKIPPED_ELEMENTS.contains(&child.value().name()) {
                collect_text(child, out);
            }
        }
    }
}
