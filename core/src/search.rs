//! Ranking over the index read contract: vector-space (lnn.ltc) search,
//! mixture-smoothed language-model search, and product aggregation search.
//! Every entry point is a pure function of the query and the reader.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::Result;
use crate::reader::IndexReader;
use crate::ReviewId;

/// Vector-space results feeding the product aggregation stage.
const PRODUCT_POOL: usize = 30;

pub struct Searcher<'a> {
    reader: &'a IndexReader,
}

impl<'a> Searcher<'a> {
    pub fn new(reader: &'a IndexReader) -> Self {
        Self { reader }
    }

    /// lnn.ltc ranking: document side scores log-tf only, the query side
    /// carries log-tf times idf, cosine-normalized. Candidates are the union
    /// of the query terms' posting lists; descending score, ties broken by
    /// ascending review id.
    ///
    /// When idf zeroes the entire query vector (every term occurs in every
    /// review) the query falls back to normalized log-tf weights, so such
    /// queries still rank by document term frequency.
    pub fn vector_space_search<S: AsRef<str>>(
        &self,
        query: &[S],
        k: usize,
    ) -> Result<Vec<(ReviewId, f64)>> {
        let hist = query_histogram(query);
        if hist.is_empty() {
            return Ok(Vec::new());
        }
        let n = self.reader.num_reviews() as f64;

        let parts: Vec<(&str, f64, f64)> = hist
            .iter()
            .map(|(term, &qtf)| {
                let ltf = 1.0 + (qtf as f64).log10();
                let df = self.reader.token_document_frequency(term) as f64;
                let idf = if df > 0.0 { (n / df).log10() } else { 0.0 };
                (term.as_str(), ltf, idf)
            })
            .collect();

        let mut weights: Vec<(&str, f64)> =
            parts.iter().map(|&(term, ltf, idf)| (term, ltf * idf)).collect();
        let mut norm = l2(weights.iter().map(|&(_, w)| w));
        if norm == 0.0 {
            weights = parts.iter().map(|&(term, ltf, _)| (term, ltf)).collect();
            norm = l2(weights.iter().map(|&(_, w)| w));
        }
        if norm > 0.0 {
            for (_, w) in &mut weights {
                *w /= norm;
            }
        }

        // dot product accumulated straight off the posting lists; terms with
        // zero weight still contribute their postings to the candidate set
        let mut scores: HashMap<ReviewId, f64> = HashMap::new();
        for &(term, weight) in &weights {
            for (review_id, tf) in self.reader.reviews_with_token(term)? {
                let doc_weight = 1.0 + (tf as f64).log10();
                *scores.entry(review_id).or_insert(0.0) += doc_weight * weight;
            }
        }
        Ok(rank_reviews(scores, k))
    }

    /// Mixture language model: per-review maximum-likelihood estimate
    /// interpolated with the corpus background model by `lambda`. Repeated
    /// query terms multiply in once per occurrence.
    pub fn language_model_search<S: AsRef<str>>(
        &self,
        query: &[S],
        lambda: f64,
        k: usize,
    ) -> Result<Vec<(ReviewId, f64)>> {
        let terms: Vec<String> = query.iter().map(|t| t.as_ref().to_lowercase()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let distinct: HashSet<&str> = terms.iter().map(String::as_str).collect();
        let total = self.reader.total_tokens() as f64;

        // one posting-list decode per distinct term
        let mut term_postings: HashMap<&str, HashMap<ReviewId, u32>> = HashMap::new();
        let mut background: HashMap<&str, f64> = HashMap::new();
        let mut candidates: HashSet<ReviewId> = HashSet::new();
        for &term in &distinct {
            let postings = self.reader.reviews_with_token(term)?;
            candidates.extend(postings.iter().map(|&(review_id, _)| review_id));
            term_postings.insert(term, postings.into_iter().collect());
            let cf = self.reader.token_collection_frequency(term) as f64;
            background.insert(term, if total > 0.0 { cf / total } else { 0.0 });
        }

        let mut scores: HashMap<ReviewId, f64> = HashMap::new();
        for &review_id in &candidates {
            let length = self.reader.review_metadata(review_id)?.length as f64;
            let mut score = 1.0;
            for term in &terms {
                let tf = term_postings
                    .get(term.as_str())
                    .and_then(|m| m.get(&review_id))
                    .copied()
                    .unwrap_or(0) as f64;
                let ml = if tf > 0.0 && length > 0.0 { tf / length } else { 0.0 };
                let bg = background.get(term.as_str()).copied().unwrap_or(0.0);
                score *= lambda * ml + (1.0 - lambda) * bg;
            }
            scores.insert(review_id, score);
        }
        Ok(rank_reviews(scores, k))
    }

    /// Product aggregation: positional weights over the top vector-space
    /// reviews, blended with a helpfulness-discounted quality score computed
    /// over every review of each candidate product. Returns product ids,
    /// descending score, ties broken by ascending product id.
    pub fn product_search<S: AsRef<str>>(&self, query: &[S], k: usize) -> Result<Vec<String>> {
        let top = self.vector_space_search(query, PRODUCT_POOL)?;
        let n = top.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        // rank weights (n - i) / (n(n+1)/2) sum to 1; a product mentioned by
        // several top reviews accumulates theirs
        let denominator = (n * (n + 1) / 2) as f64;
        let mut rank_weight: HashMap<String, f64> = HashMap::new();
        for (i, &(review_id, _)) in top.iter().enumerate() {
            let weight = (n - i) as f64 / denominator;
            let product_id = self.reader.review_metadata(review_id)?.product_id;
            *rank_weight.entry(product_id).or_insert(0.0) += weight;
        }

        let mut quality: HashMap<&str, f64> = HashMap::new();
        let mut quality_sum = 0.0;
        for product_id in rank_weight.keys() {
            let mut kept: Vec<f64> = Vec::new();
            for review_id in self.reader.reviews_of_product(product_id)? {
                let meta = self.reader.review_metadata(review_id)?;
                // numerator > denominator marks malformed helpfulness
                if meta.helpfulness_numerator > meta.helpfulness_denominator {
                    continue;
                }
                let helpfulness = if meta.helpfulness_denominator == 0 {
                    0.0
                } else {
                    meta.helpfulness_numerator as f64 / meta.helpfulness_denominator as f64
                };
                kept.push(meta.score as f64 * helpfulness);
            }
            let q = quality_of(&mut kept);
            quality_sum += q;
            quality.insert(product_id.as_str(), q);
        }

        let mut ranked: Vec<(&String, f64)> = rank_weight
            .iter()
            .map(|(product_id, &weight)| {
                let normalized = if quality_sum > 0.0 {
                    quality.get(product_id.as_str()).copied().unwrap_or(0.0) / quality_sum
                } else {
                    0.0
                };
                (product_id, (weight + normalized) / 2.0)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        Ok(ranked.into_iter().take(k).map(|(id, _)| id.clone()).collect())
    }
}

/// Case-folded term histogram of a query.
fn query_histogram<S: AsRef<str>>(query: &[S]) -> BTreeMap<String, u32> {
    let mut hist = BTreeMap::new();
    for term in query {
        *hist.entry(term.as_ref().to_lowercase()).or_insert(0) += 1;
    }
    hist
}

fn l2(weights: impl Iterator<Item = f64>) -> f64 {
    weights.map(|w| w * w).sum::<f64>().sqrt()
}

fn rank_reviews(scores: HashMap<ReviewId, f64>, k: usize) -> Vec<(ReviewId, f64)> {
    let mut ranked: Vec<(ReviewId, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(k);
    ranked
}

/// Mean/median blend of the kept per-review scores; 0 when none survive the
/// helpfulness filter.
fn quality_of(scores: &mut [f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = scores.len() / 2;
    let median = if scores.len() % 2 == 0 {
        (scores[mid - 1] + scores[mid]) / 2.0
    } else {
        scores[mid]
    };
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean + median) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_case_folds_and_counts() {
        let hist = query_histogram(&["The", "dog", "the"]);
        assert_eq!(hist.get("the"), Some(&2));
        assert_eq!(hist.get("dog"), Some(&1));
    }

    #[test]
    fn quality_blends_mean_and_median() {
        let mut scores = vec![5.0, 1.0, 3.0];
        assert_eq!(quality_of(&mut scores), 3.0);

        // even length: median is the mean of the middle pair
        let mut scores = vec![4.0, 0.0];
        // mean 2.0, median 2.0
        assert_eq!(quality_of(&mut scores), 2.0);

        let mut empty = Vec::new();
        assert_eq!(quality_of(&mut empty), 0.0);
    }
}
