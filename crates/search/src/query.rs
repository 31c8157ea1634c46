//! Ranking pages against a free-text query.
//!
//! Every (query token, index word, occurrence) triple that matches under
//! [`classify`] contributes its weight to the occurrence's page. Pages need a
//! summed weight of at least [`MIN_PAGE_WEIGHT`]; the final score adds
//! [`EXACT_MATCH_BONUS`] per exact match and must reach [`MIN_FINAL_SCORE`].

use crate::consts::{EXACT_MATCH_BONUS, MAX_RESULTS, MIN_FINAL_SCORE, MIN_PAGE_WEIGHT, NO_CONTEXT};
use crate::context::extract_context;
use crate::index::SearchIndex;
use crate::text::{classify, tokenize};
use std::collections::HashMap;
use tracing::instrument;

/// One ranked page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub page_id: u32,
    /// Summed match weight plus the exact-match bonus.
    pub score: u32,
    /// Index words that matched, in the order they were first matched.
    pub matched_words: Vec<String>,
    pub exact_matches: u32,
    pub context: String,
}

struct PageTally<'a> {
    page_id: u32,
    weight: u32,
    exact_matches: u32,
    matched_words: Vec<&'a str>,
    first_context: &'a str,
}

impl SearchIndex {
    /// Rank pages for `query`, best first, at most [`MAX_RESULTS`].
    ///
    /// Queries without a usable token (three letters or more) yield nothing.
    #[instrument(skip(self))]
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        // Insertion order doubles as the tie-break order.
        let mut tallies: Vec<PageTally> = Vec::new();
        let mut positions: HashMap<u32, usize> = HashMap::new();

        for token in &tokens {
            for entry in self.words() {
                let Some(kind) = classify(token, &entry.word) else {
                    continue;
                };
                for occurrence in &entry.occurrences {
                    let position = *positions.entry(occurrence.page_id).or_insert_with(|| {
                        tallies.push(PageTally {
                            page_id: occurrence.page_id,
                            weight: 0,
                            exact_matches: 0,
                            matched_words: Vec::new(),
                            first_context: &occurrence.context,
                        });
                        tallies.len() - 1
                    });
                    let tally = &mut tallies[position];
                    tally.weight += kind.weight();
                    if kind.is_exact() {
                        tally.exact_matches += 1;
                    }
                    if !tally.matched_words.contains(&entry.word.as_str()) {
                        tally.matched_words.push(&entry.word);
                    }
                }
            }
        }

        let mut ranked: Vec<(u32, PageTally)> = tallies
            .into_iter()
            .filter(|tally| tally.weight >= MIN_PAGE_WEIGHT)
            .map(|tally| (tally.weight + EXACT_MATCH_BONUS * tally.exact_matches, tally))
            .collect();
        // `sort_by` is stable, so equal scores keep first-touched order.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let results: Vec<SearchResult> = ranked
            .into_iter()
            .filter(|(score, _)| *score >= MIN_FINAL_SCORE)
            .take(MAX_RESULTS)
            .map(|(score, tally)| SearchResult {
                page_id: tally.page_id,
                score,
                context: self.result_context(&tally, query),
                matched_words: tally.matched_words.into_iter().map(str::to_string).collect(),
                exact_matches: tally.exact_matches,
            })
            .collect();
        tracing::debug!(tokens = tokens.len(), results = results.len(), "Search complete");
        results
    }

    /// Prefer a window over the page's own OCR text; fall back to the
    /// snippet cached with the first matching occurrence.
    fn result_context(&self, tally: &PageTally, query: &str) -> String {
        if let Some(text) = self.page(tally.page_id).and_then(|page| page.text.as_deref()) {
            return extract_context(text, query);
        }
        match tally.first_context.trim() {
            "" => NO_CONTEXT.to_string(),
            context => context.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Occurrence, Page, WordEntry};
    use rstest::rstest;

    fn entry(word: &str, pages: &[u32]) -> WordEntry {
        WordEntry {
            word: word.to_string(),
            occurrences: pages
                .iter()
                .map(|&page_id| Occurrence { page_id, context: format!("...{word}...") })
                .collect(),
        }
    }

    fn index(words: Vec<WordEntry>) -> SearchIndex {
        SearchIndex::from_parts(words, Vec::<Page>::new())
    }

    #[rstest]
    #[case("")]
    #[case("a b")]
    #[case("på og i")]
    #[case("!!! ??? 123")]
    fn short_or_empty_queries_yield_nothing(#[case] query: &str) {
        let index = index(vec![entry("på", &[1]), entry("og", &[2])]);
        assert!(index.search(query).is_empty());
    }

    #[test]
    fn udstodning_example_scores_six() {
        let index = SearchIndex::from_json(
            r#"{"words": {"udstødning": [{"pageId": 1, "context": "...udstødningsrøret sidder bag motoren..."}]}}"#,
        )
        .unwrap();
        let results = index.search("udstødningsrør");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].page_id, 1);
        assert_eq!(results[0].score, 6);
        assert_eq!(results[0].exact_matches, 0);
        assert_eq!(results[0].matched_words, vec!["udstødning"]);
        assert_eq!(results[0].context, "...udstødningsrøret sidder bag motoren...");
    }

    #[test]
    fn exact_match_outranks_prefix_match() {
        let exact = index(vec![entry("motor", &[1])]).search("motor");
        let prefix = index(vec![entry("motor", &[1])]).search("motoren");
        assert_eq!(exact[0].score, 15);
        assert_eq!(exact[0].exact_matches, 1);
        assert_eq!(prefix[0].score, 6);
        assert!(exact[0].score > prefix[0].score);
    }

    #[test]
    fn weak_matches_are_filtered() {
        // A single "word extends query" hit weighs 4: kept by the page
        // threshold, dropped by the final score threshold.
        assert!(index(vec![entry("motoren", &[1])]).search("motor").is_empty());
        // Two of them on the same page reach 8.
        let results = index(vec![entry("motoren", &[1]), entry("motorer", &[1])]).search("motor");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 8);
        // Substring matches alone never reach the page threshold.
        assert!(index(vec![entry("nbremsen", &[1])]).search("bremse").is_empty());
    }

    #[test]
    fn results_are_sorted_with_stable_ties() {
        let index = index(vec![
            entry("gear", &[3, 1]),
            entry("kobling", &[2]),
            entry("gearkasse", &[2]),
            entry("gearet", &[2]),
        ]);
        let results = index.search("gear kobling");
        let ids: Vec<u32> = results.iter().map(|r| r.page_id).collect();
        // Page 2: kobling exact (10+5) + two prefix hits (4+4) = 23.
        // Pages 3 and 1 tie on 15 and keep first-touched order.
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.score >= MIN_FINAL_SCORE));
    }

    #[test]
    fn results_are_capped() {
        let pages: Vec<u32> = (0..50).collect();
        let index = index(vec![entry("bremse", &pages)]);
        let results = index.search("bremse");
        assert_eq!(results.len(), MAX_RESULTS);
        assert_eq!(results[0].page_id, 0);
    }

    #[test]
    fn words_without_occurrences_never_appear() {
        let index = index(vec![entry("bremse", &[])]);
        assert!(index.search("bremse").is_empty());
    }

    #[test]
    fn each_pair_counts_once() {
        // "motor" vs "motor" is exact; it must not also count as a prefix hit.
        let results = index(vec![entry("motor", &[4])]).search("motor");
        assert_eq!(results[0].score, 15);
    }

    #[test]
    fn page_text_is_preferred_for_context() {
        let index = SearchIndex::from_parts(
            vec![entry("bremse", &[0])],
            vec![Page {
                id: 0,
                chapter: "1".to_string(),
                page: "1".to_string(),
                image_path: "images/page_001.jpg".to_string(),
                text: Some("Kontroller bremse og kobling".to_string()),
            }],
        );
        let results = index.search("bremse");
        assert_eq!(results[0].context, "Kontroller bremse og kobling");
    }

    #[test]
    fn blank_cached_context_uses_sentinel() {
        let index = index(vec![WordEntry {
            word: "bremse".to_string(),
            occurrences: vec![Occurrence { page_id: 1, context: String::new() }],
        }]);
        assert_eq!(index.search("bremse")[0].context, NO_CONTEXT);
    }
}
