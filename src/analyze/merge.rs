// src/analyze/merge.rs
//! Candidate merging: exactly one winner per category.

use crate::analyze::CandidateKeyword;
use std::collections::HashMap;

/// Keep the highest-confidence candidate per category. Ties go to the
/// candidate seen first. Output is sorted by descending confidence; the sort
/// is stable, so equal confidences keep first-seen order.
pub fn best_per_category<I>(candidates: I) -> Vec<CandidateKeyword>
where
    I: IntoIterator<Item = CandidateKeyword>,
{
    let mut winners: Vec<CandidateKeyword> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();

    for c in candidates {
        match slot.get(&c.category) {
            Some(&i) => {
                if c.confidence > winners[i].confidence {
                    winners[i] = c;
                }
            }
            None => {
                slot.insert(c.category.clone(), winners.len());
                winners.push(c);
            }
        }
    }

    winners.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    winners
}

/// Union several candidate lists (in priority order) and reduce to one per category.
pub fn merge_candidates<I>(lists: I) -> Vec<CandidateKeyword>
where
    I: IntoIterator<Item = Vec<CandidateKeyword>>,
{
    best_per_category(lists.into_iter().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::CandidateSource;
    use crate::taxonomy::Polarity;

    fn cand(category: &str, keyword: &str, confidence: f64, source: CandidateSource) -> CandidateKeyword {
        CandidateKeyword {
            category: category.into(),
            keyword: keyword.into(),
            confidence,
            evidence: String::new(),
            rationale: String::new(),
            source,
            weight: 3,
            polarity: Polarity::Unfavorable,
        }
    }

    #[test]
    fn keeps_max_per_category() {
        let text = vec![
            cand("lighting", "well-lit", 0.7, CandidateSource::Text),
            cand("emotional", "unsafe", 0.8, CandidateSource::Text),
        ];
        let ctx = vec![
            cand("lighting", "unlit", 0.75, CandidateSource::PublicData),
            cand("emotional", "reassuring", 0.75, CandidateSource::PublicData),
        ];
        let out = merge_candidates([text, ctx]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].keyword, "unsafe");
        assert_eq!(out[1].keyword, "unlit");
    }

    #[test]
    fn ties_go_to_first_seen() {
        let out = merge_candidates([
            vec![cand("lighting", "well-lit", 0.8, CandidateSource::Text)],
            vec![cand("lighting", "unlit", 0.8, CandidateSource::Context)],
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].keyword, "well-lit");
        assert_eq!(out[0].source, CandidateSource::Text);
    }

    #[test]
    fn never_two_in_one_category_and_winner_is_max() {
        let mut all = Vec::new();
        let confs = [0.71, 0.93, 0.8, 0.93, 0.7, 0.9, 0.75];
        for (i, c) in confs.iter().enumerate() {
            let cat = if i % 2 == 0 { "a" } else { "b" };
            all.push(cand(cat, &format!("k{i}"), *c, CandidateSource::Text));
        }
        let out = best_per_category(all.clone());
        assert_eq!(out.len(), 2);
        for w in &out {
            let max = all
                .iter()
                .filter(|c| c.category == w.category)
                .map(|c| c.confidence)
                .fold(f64::MIN, f64::max);
            assert_eq!(w.confidence, max);
        }
        // b: 0.93 (k1) and 0.93 (k3) tie → k1 kept
        assert!(out.iter().any(|c| c.keyword == "k1"));
    }
}
