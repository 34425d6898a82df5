//! Record types flowing through the review pipeline.
//!
//! Required fields are validated when a record is constructed. The citation
//! degree counts of a [`PaperRecord`] are never stored: they are derived from
//! the reference sets whenever they are read or serialized, so they cannot
//! drift from the sets they describe.


use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Structured findings extracted from one paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Short summary of the paper.
    #[serde(default)]
    pub summary: String,
    /// Methodological issues or assumptions.
    #[serde(default)]
    pub method_issues: String,
    /// Declared conflicts of interest.
    #[serde(default)]
    pub conflict_of_interest: String,
    /// Open questions and future research directions, in order.
    #[serde(default)]
    pub future_research: Vec<String>,
}

impl Analysis {
    /// True when no field carries any content.
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.method_issues.is_empty()
            && self.conflict_of_interest.is_empty()
            && self.future_research.is_empty()
    }
}

/// One retrieved (and possibly analyzed) paper.
///
/// Identity is the `url`. Outgoing references are raw keys (titles or urls)
/// exactly as supplied by the fetch service; incoming references are urls of
/// papers in the same working set and are only ever written by the graph
/// builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PaperData", try_from = "PaperData")]
pub struct PaperRecord {
    url: String,
    /// Paper title.
    pub name: String,
    /// Authors in publication order.
    pub authors: Vec<String>,
    /// Publication date, when known.
    pub publication_date: Option<NaiveDate>,
    /// Full text or abstract.
    pub content: String,
    /// Analysis fields, empty until the analysis stage has run.
    pub analysis: Analysis,
    out_references: BTreeSet<String>,
    in_references: BTreeSet<String>,
}

impl PaperRecord {
    /// Create a record, rejecting a blank url or title.
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Result<Self, ValidationError> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return Err(ValidationError::new("url", "cannot be empty"));
        }
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::new("name", "cannot be empty"));
        }

        Ok(Self {
            url,
            name,
            authors: Vec::new(),
            publication_date: None,
            content: String::new(),
            analysis: Analysis::default(),
            out_references: BTreeSet::new(),
            in_references: BTreeSet::new(),
        })
    }

    /// Set the author list
    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors
            .into_iter()
            .map(Into::into)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        self
    }

    /// Set the publication date
    pub fn with_publication_date(mut self, date: NaiveDate) -> Self {
        self.publication_date = Some(date);
        self
    }

    /// Set the paper content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the analysis fields
    pub fn with_analysis(mut self, analysis: Analysis) -> Self {
        self.analysis = analysis;
        self
    }

    /// Add raw outgoing reference keys. Blank keys are ignored.
    pub fn with_out_references<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            self.add_out_reference(key);
        }
        self
    }

    /// Add one raw outgoing reference key; returns false if blank or already present.
    pub fn add_out_reference(&mut self, key: impl Into<String>) -> bool {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return false;
        }
        self.out_references.insert(key)
    }

    /// Unique identity of this paper.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw outgoing reference keys.
    pub fn out_references(&self) -> &BTreeSet<String> {
        &self.out_references
    }

    /// Urls of working-set papers that cite this one.
    pub fn in_references(&self) -> &BTreeSet<String> {
        &self.in_references
    }

    /// Out-degree.
    pub fn num_out(&self) -> usize {
        self.out_references.len()
    }

    /// In-degree within the current working set.
    pub fn num_in(&self) -> usize {
        self.in_references.len()
    }

    /// Normalized title used as an alternate resolution key.
    pub fn title_key(&self) -> String {
        normalize_title(&self.name)
    }

    pub(crate) fn clear_in_references(&mut self) {
        self.in_references.clear();
    }

    pub(crate) fn add_in_reference(&mut self, citing_url: &str) {
        self.in_references.insert(citing_url.to_string());
    }
}

/// Serialized form of a [`PaperRecord`], including the derived degree counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperData {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub method_issues: String,
    #[serde(default)]
    pub conflict_of_interest: String,
    #[serde(default)]
    pub future_research: Vec<String>,
    #[serde(default)]
    pub out_references: Vec<String>,
    #[serde(default)]
    pub num_out: usize,
    #[serde(default)]
    pub in_references: Vec<String>,
    #[serde(default)]
    pub num_in: usize,
}

impl From<PaperRecord> for PaperData {
    fn from(record: PaperRecord) -> Self {
        Self {
            num_out: record.num_out(),
            num_in: record.num_in(),
            name: record.name,
            url: record.url,
            authors: record.authors,
            publication_date: record.publication_date,
            content: record.content,
            summary: record.analysis.summary,
            method_issues: record.analysis.method_issues,
            conflict_of_interest: record.analysis.conflict_of_interest,
            future_research: record.analysis.future_research,
            out_references: record.out_references.into_iter().collect(),
            in_references: record.in_references.into_iter().collect(),
        }
    }
}

impl TryFrom<PaperData> for PaperRecord {
    type Error = ValidationError;

    // Counts in the payload are ignored; they are recomputed from the sets.
    fn try_from(data: PaperData) -> Result<Self, Self::Error> {
        let mut record = PaperRecord::new(data.url, data.name)?
            .with_authors(data.authors)
            .with_content(data.content)
            .with_analysis(Analysis {
                summary: data.summary,
                method_issues: data.method_issues,
                conflict_of_interest: data.conflict_of_interest,
                future_research: data.future_research,
            })
            .with_out_references(data.out_references);
        record.publication_date = data.publication_date;
        for url in data.in_references.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            record.add_in_reference(url);
        }
        Ok(record)
    }
}

/// One planned section of the literature review.
///
/// The title is the join key between the outline, source retrieval and the
/// assembled output; it is compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSection {
    title: String,
    /// Guidance for what belongs in the section.
    pub description: String,
}

impl ReviewSection {
    /// Create a section, rejecting a blank title.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::new("title", "cannot be empty"));
        }
        Ok(Self {
            title,
            description: description.into().trim().to_string(),
        })
    }

    /// Section title as proposed.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Case-insensitive identity of the section.
    pub fn key(&self) -> String {
        section_key(&self.title)
    }
}

/// A review section paired with its generated body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenSection {
    pub title: String,
    pub description: String,
    /// Generated text; empty when writing failed.
    pub body: String,
    /// Citation keys of the sources handed to the writer.
    pub sources: Vec<String>,
    /// True when the writer failed and `body` is a placeholder.
    #[serde(default)]
    pub failed: bool,
}

/// A stored passage retrieved for section writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Citation key: the url of the paper the passage came from.
    pub paper_url: String,
    pub paper_name: String,
    pub authors: Vec<String>,
    pub text: String,
    /// Relevance score against the query that retrieved it.
    pub score: f64,
}

/// Normalize a title for matching across inconsistent reference strings.
///
/// Lowercases, keeps alphanumerics and collapses everything else to single
/// spaces.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Case-insensitive section identity.
pub fn section_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
