//! Citation graph over one request's working set.
//!
//! A [`ReferenceGraph`] owns the working set for the duration of a request.
//! Building it resolves every paper's raw outgoing reference keys against the
//! papers in the same set and rewrites `in_references` from scratch, so
//! building twice over the same records yields the same graph.
//!
//! Resolution is a best-effort string match: a key resolves when it equals a
//! paper's url or, optionally, its normalized title. When several papers
//! share a title the first one in working-set order wins. Keys that resolve
//! to nothing are kept as external sinks; they are expected, not errors.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::model::{normalize_title, PaperRecord};

/// How raw reference keys are matched to papers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Also match a key against each paper's normalized title.
    pub match_titles: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { match_titles: true }
    }
}

/// Lookup from resolvable keys to positions in the working set.
struct KeyIndex {
    by_url: HashMap<String, usize>,
    by_title: HashMap<String, usize>,
}

impl KeyIndex {
    fn new(papers: &[PaperRecord], options: ResolveOptions) -> Self {
        let mut by_url = HashMap::with_capacity(papers.len());
        let mut by_title = HashMap::new();

        for (position, paper) in papers.iter().enumerate() {
            by_url.entry(url_key(paper.url())).or_insert(position);
            if options.match_titles {
                let title = paper.title_key();
                if !title.is_empty() {
                    by_title.entry(title).or_insert(position);
                }
            }
        }

        Self { by_url, by_title }
    }

    fn resolve(&self, raw: &str) -> Option<usize> {
        if let Some(&position) = self.by_url.get(&url_key(raw)) {
            return Some(position);
        }
        if self.by_title.is_empty() {
            return None;
        }
        self.by_title.get(&normalize_title(raw)).copied()
    }
}

fn url_key(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Resolved citation structure of one working set.
#[derive(Debug, Clone)]
pub struct ReferenceGraph {
    papers: Vec<PaperRecord>,
    positions: HashMap<String, usize>,
    external: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceGraph {
    /// Resolve references across `papers` and build the graph.
    pub fn build(mut papers: Vec<PaperRecord>, options: ResolveOptions) -> Self {
        let index = KeyIndex::new(&papers, options);

        let mut resolved: Vec<(usize, String)> = Vec::new();
        let mut external: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for paper in &papers {
            for key in paper.out_references() {
                match index.resolve(key) {
                    Some(target) if papers[target].url() == paper.url() => {}
                    Some(target) => resolved.push((target, paper.url().to_string())),
                    None => {
                        external
                            .entry(key.clone())
                            .or_default()
                            .insert(paper.url().to_string());
                    }
                }
            }
        }

        for paper in papers.iter_mut() {
            paper.clear_in_references();
        }
        for (target, citing) in &resolved {
            papers[*target].add_in_reference(citing);
        }

        debug!(
            papers = papers.len(),
            resolved_edges = resolved.len(),
            external_keys = external.len(),
            "Reference graph built"
        );

        let positions = papers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.url().to_string(), i))
            .rev()
            .collect();

        Self {
            papers,
            positions,
            external,
        }
    }

    /// Resolve a working set in place and hand the records back.
    pub fn resolve(papers: Vec<PaperRecord>, options: ResolveOptions) -> Vec<PaperRecord> {
        Self::build(papers, options).into_papers()
    }

    /// Papers in working-set order.
    pub fn papers(&self) -> &[PaperRecord] {
        &self.papers
    }

    /// Look up a paper by url.
    pub fn get(&self, url: &str) -> Option<&PaperRecord> {
        self.positions.get(url).map(|&i| &self.papers[i])
    }

    /// Number of papers in the graph.
    pub fn len(&self) -> usize {
        self.papers.len()
    }

    /// Whether the graph has no papers.
    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// Resolved edges as `(citing_url, cited_url)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.papers.iter().flat_map(|cited| {
            cited
                .in_references()
                .iter()
                .map(move |citing| (citing.as_str(), cited.url()))
        })
    }

    /// Unresolved reference keys, each with the urls of the papers citing it.
    pub fn external_references(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.external
    }

    /// Give the resolved records back to the caller.
    pub fn into_papers(self) -> Vec<PaperRecord> {
        self.papers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paper(url: &str, name: &str, refs: &[&str]) -> PaperRecord {
        PaperRecord::new(url, name)
            .unwrap()
            .with_out_references(refs.iter().copied())
    }

    fn in_refs(graph: &ReferenceGraph, url: &str) -> Vec<String> {
        graph
            .get(url)
            .unwrap()
            .in_references()
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn test_three_paper_chain_in_degrees() {
        let graph = ReferenceGraph::build(
            vec![
                paper("A", "Paper A", &["B", "C"]),
                paper("B", "Paper B", &["C"]),
                paper("C", "Paper C", &[]),
            ],
            ResolveOptions::default(),
        );

        assert_eq!(graph.get("A").unwrap().num_in(), 0);
        assert_eq!(graph.get("B").unwrap().num_in(), 1);
        assert_eq!(graph.get("C").unwrap().num_in(), 2);
        assert_eq!(in_refs(&graph, "B"), vec!["A"]);
        assert_eq!(in_refs(&graph, "C"), vec!["A", "B"]);
        assert_eq!(graph.edges().count(), 3);
    }

    #[test]
    fn test_dangling_reference_is_external() {
        let graph = ReferenceGraph::build(
            vec![paper("A", "Paper A", &["external-paper-X"])],
            ResolveOptions::default(),
        );

        let a = graph.get("A").unwrap();
        assert_eq!(a.num_out(), 1);
        assert_eq!(a.num_in(), 0);
        assert_eq!(graph.edges().count(), 0);

        let citing = graph.external_references().get("external-paper-X").unwrap();
        assert!(citing.contains("A"));
    }

    #[test]
    fn test_self_reference_dropped() {
        let graph = ReferenceGraph::build(
            vec![paper("A", "Paper A", &["A", "Paper A", "B"]), paper("B", "Paper B", &[])],
            ResolveOptions::default(),
        );

        let a = graph.get("A").unwrap();
        assert!(!a.in_references().contains("A"));
        assert_eq!(a.num_in(), 0);
        assert_eq!(a.num_out(), 3);
        assert!(graph.external_references().is_empty());
    }

    #[test]
    fn test_resolves_by_normalized_title() {
        let graph = ReferenceGraph::build(
            vec![
                paper(
                    "https://arxiv.org/abs/1",
                    "Attention Is All You Need",
                    &["attention is all you need."],
                ),
                paper("https://arxiv.org/abs/2", "BERT", &["Attention is All You Need"]),
            ],
            ResolveOptions::default(),
        );

        assert_eq!(
            in_refs(&graph, "https://arxiv.org/abs/1"),
            vec!["https://arxiv.org/abs/2"]
        );
    }

    #[test]
    fn test_title_matching_can_be_disabled() {
        let graph = ReferenceGraph::build(
            vec![paper("u1", "Graph Networks", &[]), paper("u2", "Other", &["Graph Networks"])],
            ResolveOptions {
                match_titles: false,
            },
        );

        assert_eq!(graph.get("u1").unwrap().num_in(), 0);
        assert!(graph.external_references().contains_key("Graph Networks"));
    }

    #[test]
    fn test_url_match_ignores_trailing_slash() {
        let graph = ReferenceGraph::build(
            vec![
                paper("https://example.org/p1", "One", &[]),
                paper("https://example.org/p2", "Two", &["https://example.org/p1/"]),
            ],
            ResolveOptions::default(),
        );
        assert_eq!(graph.get("https://example.org/p1").unwrap().num_in(), 1);
    }

    #[test]
    fn test_ambiguous_title_resolves_to_first() {
        let graph = ReferenceGraph::build(
            vec![
                paper("first", "Survey", &[]),
                paper("second", "Survey", &[]),
                paper("citer", "Citer", &["survey"]),
            ],
            ResolveOptions::default(),
        );

        assert_eq!(graph.get("first").unwrap().num_in(), 1);
        assert_eq!(graph.get("second").unwrap().num_in(), 0);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let papers = vec![
            paper("A", "Paper A", &["B", "C", "X"]),
            paper("B", "Paper B", &["Paper C"]),
            paper("C", "Paper C", &["A"]),
        ];

        let once = ReferenceGraph::resolve(papers, ResolveOptions::default());
        let twice = ReferenceGraph::resolve(once.clone(), ResolveOptions::default());

        assert_eq!(once, twice);
    }

    #[test]
    fn test_stale_in_references_are_recomputed() {
        let mut b = paper("B", "Paper B", &[]);
        b.add_in_reference("Z");

        let graph = ReferenceGraph::build(
            vec![paper("A", "Paper A", &["B"]), b],
            ResolveOptions::default(),
        );

        assert_eq!(in_refs(&graph, "B"), vec!["A"]);
    }

    #[test]
    fn test_degree_invariant_holds() {
        let papers: Vec<PaperRecord> = (0..50)
            .map(|i| {
                let refs: Vec<String> = (0..5)
                    .map(|k| format!("P{}", (i * 7 + k * 3) % 60))
                    .collect();
                PaperRecord::new(format!("P{}", i), format!("Title {}", i))
                    .unwrap()
                    .with_out_references(refs)
            })
            .collect();

        let graph = ReferenceGraph::build(papers, ResolveOptions::default());

        for p in graph.papers() {
            assert_eq!(p.num_in(), p.in_references().len());
            assert_eq!(p.num_out(), p.out_references().len());
            assert!(!p.in_references().contains(p.url()));
        }
        let total_in: usize = graph.papers().iter().map(|p| p.num_in()).sum();
        assert_eq!(total_in, graph.edges().count());
    }

    #[test]
    fn test_empty_graph() {
        let graph = ReferenceGraph::build(Vec::new(), ResolveOptions::default());
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert!(graph.get("anything").is_none());
    }
}
