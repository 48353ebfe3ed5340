//! Ranking of reviews and products
//!
//! Scores only rely on the statistics exposed by [IndexReader].

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BinaryHeap, HashMap},
};

use serde::Serialize;

use crate::{base::ReviewId, reader::IndexReader};

/// Weight of the review score in product ranking
const PRODUCT_SCORE_WEIGHT: f64 = 0.8;

/// Helpfulness of a review with no vote
const DEFAULT_HELPFULNESS: f64 = 0.5;

#[derive(Serialize, Debug, Clone)]
pub struct ScoredDocument<K> {
    pub key: K,
    pub score: f64,
}

impl<K: std::fmt::Display> std::fmt::Display for ScoredDocument<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.key, self.score)
    }
}

impl<K: Ord> PartialEq for ScoredDocument<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for ScoredDocument<K> {}

impl<K: Ord> PartialOrd for ScoredDocument<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Better documents come first: higher scores, then smaller keys
impl<K: Ord> Ord for ScoredDocument<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.key.cmp(&other.key))
    }
}

pub struct TopScoredDocuments<K: Ord> {
    /// The top of the heap is the worst kept document
    heap: BinaryHeap<ScoredDocument<K>>,
    top_k: usize,
}

impl<K: Ord> TopScoredDocuments<K> {
    pub fn new(top_k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(top_k + 1),
            top_k,
        }
    }

    /// Add a new candidate, and returns the new lower bound on scores
    pub fn add(&mut self, candidate: K, score: f64) -> f64 {
        let document = ScoredDocument {
            key: candidate,
            score,
        };
        if self.heap.len() < self.top_k {
            self.heap.push(document);
        } else if let Some(worst) = self.heap.peek() {
            if document < *worst {
                self.heap.pop();
                self.heap.push(document);
            }
        }

        // Returns the minimum score
        match self.heap.peek() {
            Some(worst) if self.heap.len() >= self.top_k => worst.score,
            // If the heap is not full, returns -infinity
            _ => f64::NEG_INFINITY,
        }
    }

    /// Documents, best first
    pub fn into_sorted_vec(self) -> Vec<ScoredDocument<K>> {
        self.heap.into_sorted_vec()
    }
}

fn top_k<K: Ord>(scores: impl IntoIterator<Item = (K, f64)>, k: usize) -> Vec<ScoredDocument<K>> {
    let mut top = TopScoredDocuments::new(k);
    for (key, score) in scores {
        top.add(key, score);
    }
    top.into_sorted_vec()
}

/// Number of occurrences of each (lower-cased) query token
fn query_frequencies(query: &[&str]) -> BTreeMap<String, u32> {
    let mut frequencies = BTreeMap::new();
    for token in query {
        *frequencies.entry(token.to_lowercase()).or_insert(0) += 1;
    }
    frequencies
}

/// lnn.ltc scores of the reviews matching at least one query token
pub fn vector_space_scores(reader: &IndexReader, query: &[&str]) -> HashMap<ReviewId, f64> {
    let review_count = reader.review_count() as f64;

    let mut weights = Vec::new();
    for (token, frequency) in query_frequencies(query) {
        let document_frequency = reader.term_frequency(&token);
        if document_frequency == 0 {
            continue;
        }
        let weight = (1. + (frequency as f64).log10())
            * (review_count / document_frequency as f64).log10();
        weights.push((token, weight));
    }

    let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    let mut scores = HashMap::new();
    for (token, weight) in weights {
        let weight = if norm > 0. { weight / norm } else { 0. };
        for posting in reader.postings(&token) {
            *scores.entry(posting.review_id).or_insert(0.) +=
                (1. + (posting.count as f64).log10()) * weight;
        }
    }
    scores
}

/// Ranks reviews with the vector space model (lnn.ltc)
pub fn vector_space_search(
    reader: &IndexReader,
    query: &[&str],
    k: usize,
) -> Vec<ScoredDocument<ReviewId>> {
    top_k(vector_space_scores(reader, query), k)
}

/// Ranks reviews with a mixture of the review and collection language
/// models, `lambda` being the weight of the review model
pub fn language_model_search(
    reader: &IndexReader,
    query: &[&str],
    lambda: f64,
    k: usize,
) -> Vec<ScoredDocument<ReviewId>> {
    let total_tokens = reader.total_token_count() as f64;
    if total_tokens == 0. {
        return Vec::new();
    }

    let frequencies = query_frequencies(query);
    let mut collection = Vec::with_capacity(frequencies.len());
    // Term frequencies of each review, indexed as the query tokens
    let mut reviews = HashMap::<ReviewId, Vec<u32>>::new();
    for (ix, (token, frequency)) in frequencies.iter().enumerate() {
        collection.push((
            reader.term_collection_frequency(token) as f64 / total_tokens,
            *frequency as i32,
        ));
        for posting in reader.postings(token) {
            reviews
                .entry(posting.review_id)
                .or_insert_with(|| vec![0; frequencies.len()])[ix] = posting.count;
        }
    }

    let scores = reviews.into_iter().map(|(review_id, counts)| {
        let length = reader.review_length(review_id).unwrap_or(0).max(1) as f64;
        let score = counts
            .iter()
            .zip(collection.iter())
            .map(|(count, (p_collection, frequency))| {
                (lambda * (*count as f64) / length + (1. - lambda) * p_collection)
                    .powi(*frequency)
            })
            .product::<f64>();
        (review_id, score)
    });
    top_k(scores, k)
}

/// Ranks products by the mean score of their matching reviews, where the
/// vector space score is weighted by the review score and helpfulness
pub fn product_search(reader: &IndexReader, query: &[&str], k: usize) -> Vec<ScoredDocument<String>> {
    let mut products = HashMap::<String, (f64, u32)>::new();
    for (review_id, rank) in vector_space_scores(reader, query) {
        let metadata = match reader.review_metadata(review_id) {
            Some(metadata) => metadata,
            None => continue,
        };
        let helpfulness = if metadata.helpfulness_denominator == 0 {
            DEFAULT_HELPFULNESS
        } else {
            metadata.helpfulness_numerator as f64 / metadata.helpfulness_denominator as f64
        };
        let score = PRODUCT_SCORE_WEIGHT * (rank * metadata.score as f64 / 5.)
            + (1. - PRODUCT_SCORE_WEIGHT) * (helpfulness * rank);

        let entry = products.entry(metadata.product_id).or_insert((0., 0));
        entry.0 += score;
        entry.1 += 1;
    }

    top_k(
        products
            .into_iter()
            .map(|(product, (sum, count))| (product, sum / count as f64)),
        k,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap() {
        let mut top = TopScoredDocuments::new(3);
        assert_eq!(top.add(0u32, 0.1), f64::NEG_INFINITY);
        assert_eq!(top.add(1, 0.2), f64::NEG_INFINITY);
        assert_eq!(top.add(2, 0.3), 0.1);
        assert_eq!(top.add(3, 0.05), 0.1);
        assert_eq!(top.add(4, 0.5), 0.2);

        let keys: Vec<u32> = top.into_sorted_vec().iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![4, 2, 1]);
    }

    #[test]
    fn test_ties() {
        let documents = top_k(vec![(7u32, 1.), (3, 1.), (5, 2.), (1, 1.)], 3);
        let keys: Vec<u32> = documents.iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![5, 1, 3]);
    }

    #[test]
    fn test_equality() {
        let document = |key: u32, score: f64| ScoredDocument { key, score };
        assert_eq!(document(1, f64::NAN), document(1, f64::NAN));
        assert_ne!(document(1, 0.), document(1, -0.));
        assert_ne!(document(1, 0.5), document(2, 0.5));
        assert_eq!(document(1, 0.5).cmp(&document(1, 0.5)), Ordering::Equal);
        assert!(document(1, 0.) < document(1, -0.));
    }

    #[test]
    fn test_empty() {
        assert!(top_k(vec![(1u32, 1.)], 0).is_empty());
    }
}
