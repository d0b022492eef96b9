//! Citation-number bookkeeping and final-answer renumbering.
//!
//! Each distinct URL seen during one agent run gets a stable number,
//! assigned in first-encounter order across every query of that run.
//! After the run, [`renumber`] rewrites the final answer so only the
//! citations actually referenced survive, renumbered sequentially, with
//! their resolved URLs attached in the sources section.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Sentinel returned when no usable information was found, and when a
/// final answer cannot substantiate its citations.
pub const NO_INFORMATION: &str = "No relevant information found.";

/// Literal heading that separates main content from the sources list.
const SOURCES_DELIMITER: &str = "Sources:";

/// Minimum length of a sources section for the answer to be salvageable.
const MIN_SOURCES_LEN: usize = 10;

/// Matches a bare citation marker like `[3]`.
#[allow(clippy::unwrap_used)]
static CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Matches a citation marker with an optional attached URL, `[3](https://…)`.
#[allow(clippy::unwrap_used)]
static CITATION_WITH_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\](\([^)]*\))?").unwrap());

/// Bidirectional URL ↔ citation-number mapping for one agent run.
///
/// Numbers start at 1 and are never reused or reassigned within a run.
#[derive(Debug, Clone, Default)]
pub struct CitationRegistry {
    by_url: HashMap<String, usize>,
    by_number: BTreeMap<usize, String>,
    next: usize,
}

impl CitationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_url: HashMap::new(),
            by_number: BTreeMap::new(),
            next: 1,
        }
    }

    /// Returns the citation number for `url`, assigning the next unused
    /// number on first encounter.
    pub fn assign(&mut self, url: &str) -> usize {
        if let Some(&number) = self.by_url.get(url) {
            return number;
        }
        let number = self.next;
        self.next += 1;
        self.by_url.insert(url.to_string(), number);
        self.by_number.insert(number, url.to_string());
        number
    }

    /// Looks up the URL for a citation number.
    #[must_use]
    pub fn url_for(&self, number: usize) -> Option<&str> {
        self.by_number.get(&number).map(String::as_str)
    }

    /// Looks up the citation number for a URL.
    #[must_use]
    pub fn number_for(&self, url: &str) -> Option<usize> {
        self.by_url.get(url).copied()
    }

    /// Number of distinct URLs registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    /// Returns `true` if no URLs have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

/// A renumbered final answer with its resolved source mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbered {
    /// The rewritten answer text.
    pub text: String,
    /// New citation number → URL, for every citation surviving in `text`.
    pub sources: BTreeMap<usize, String>,
}

/// Renumbers the citations in a final answer.
///
/// Splits on the literal `Sources:` heading; when the heading is absent
/// or the sources section is too short to be meaningful, the whole
/// answer is replaced with [`NO_INFORMATION`] — an answer that cannot
/// substantiate its citations is worse than no answer.
///
/// Otherwise, the distinct citation numbers referenced anywhere in the
/// answer that resolve in `registry` are remapped to 1, 2, 3, … in
/// ascending order of their original number. Markers in the main
/// content become `[new]`; markers in the sources section become
/// `[new](url)`. Markers that do not resolve are removed from the
/// output and omitted from the returned mapping.
#[must_use]
pub fn renumber(answer: &str, registry: &CitationRegistry) -> Renumbered {
    let Some((main, sources_section)) = answer.split_once(SOURCES_DELIMITER) else {
        return rejected();
    };
    if sources_section.len() <= MIN_SOURCES_LEN {
        return rejected();
    }

    // Distinct referenced numbers across the entire answer, ascending.
    let referenced: BTreeSet<usize> = CITATION
        .captures_iter(answer)
        .filter_map(|caps| caps[1].parse().ok())
        .collect();

    // A marker that already carries an attached URL names its own
    // source. Those take precedence over the registry, so output that
    // has been renumbered once maps to the same URLs on a repeat pass.
    let mut attached: HashMap<usize, String> = HashMap::new();
    for caps in CITATION_WITH_URL.captures_iter(sources_section) {
        if let (Ok(number), Some(suffix)) = (caps[1].parse::<usize>(), caps.get(2)) {
            let url = suffix.as_str().trim_start_matches('(').trim_end_matches(')');
            attached.entry(number).or_insert_with(|| url.to_string());
        }
    }

    let mut old_to_new: HashMap<usize, usize> = HashMap::new();
    let mut sources: BTreeMap<usize, String> = BTreeMap::new();
    for old in referenced {
        let url = attached
            .get(&old)
            .map(String::as_str)
            .or_else(|| registry.url_for(old));
        if let Some(url) = url {
            let new = old_to_new.len() + 1;
            old_to_new.insert(old, new);
            sources.insert(new, url.to_string());
        }
    }

    let new_main = CITATION.replace_all(main, |caps: &Captures<'_>| {
        caps[1]
            .parse()
            .ok()
            .and_then(|old: usize| old_to_new.get(&old))
            .map_or_else(String::new, |new| format!("[{new}]"))
    });

    let new_sources_section =
        CITATION_WITH_URL.replace_all(sources_section, |caps: &Captures<'_>| {
            let Some(&new) = caps[1]
                .parse()
                .ok()
                .and_then(|old: usize| old_to_new.get(&old))
            else {
                return String::new();
            };
            // An already-attached URL under an unchanged number is left
            // alone so a second pass is a no-op.
            let old: usize = match caps[1].parse() {
                Ok(n) => n,
                Err(_) => return String::new(),
            };
            if old == new && caps.get(2).is_some() {
                return caps[0].to_string();
            }
            sources
                .get(&new)
                .map_or_else(String::new, |url| format!("[{new}]({url})"))
        });

    Renumbered {
        text: format!("{new_main}{SOURCES_DELIMITER}{new_sources_section}"),
        sources,
    }
}

fn rejected() -> Renumbered {
    Renumbered {
        text: NO_INFORMATION.to_string(),
        sources: BTreeMap::new(),
    }
}
