use std::collections::BTreeMap;

use log::info;
use rand::{rngs::StdRng, SeedableRng};
use temp_dir::TempDir;

use crate::corpus::{create_products, create_review, create_vocabulary};
use review_index::{
    base::{Count, IndexInformation, ReviewId},
    builder::{BuilderOptions, Indexer},
    corpus::ReviewRecord,
    reader::{IndexReader, Posting},
};

/// An index built from random reviews, along with the expected content
pub struct TestIndex {
    pub dir: TempDir,
    pub reviews: Vec<ReviewRecord>,
    pub information: IndexInformation,
    /// Reviews (with counts) of each token
    pub tokens: BTreeMap<String, BTreeMap<ReviewId, Count>>,
    /// Reviews of each product
    pub products: BTreeMap<String, Vec<ReviewId>>,
}

impl TestIndex {
    pub fn new(
        vocabulary_size: usize,
        product_count: usize,
        review_count: usize,
        lambda_words: f64,
        seed: Option<u64>,
        options: &BuilderOptions,
    ) -> Self {
        let mut rng = if let Some(seed) = seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        };

        let vocabulary = create_vocabulary(vocabulary_size, 8, &mut rng);
        let products = create_products(product_count, &mut rng);
        let reviews: Vec<ReviewRecord> = (0..review_count)
            .map(|_| create_review(lambda_words, &vocabulary, &products, &mut rng))
            .collect();

        Self::from_reviews(reviews, options)
    }

    pub fn from_reviews(reviews: Vec<ReviewRecord>, options: &BuilderOptions) -> Self {
        let dir = TempDir::new().expect("Could not create temporary directory");
        let information = Indexer::new(dir.path(), options)
            .build(&reviews)
            .expect("Error while building the index");
        info!("Index built in {}", dir.path().display());

        let mut tokens = BTreeMap::<String, BTreeMap<ReviewId, Count>>::new();
        let mut products = BTreeMap::<String, Vec<ReviewId>>::new();
        for (ix, review) in reviews.iter().enumerate() {
            let review_id = (ix + 1) as ReviewId;
            for token in review.tokens() {
                *tokens
                    .entry(token)
                    .or_default()
                    .entry(review_id)
                    .or_insert(0) += 1;
            }
            products
                .entry(review.product_id.clone())
                .or_default()
                .push(review_id);
        }

        Self {
            dir,
            reviews,
            information,
            tokens,
            products,
        }
    }

    pub fn reader(&self, in_memory: bool) -> IndexReader {
        IndexReader::open(self.dir.path(), self.information.wildcard, in_memory)
            .expect("Error while opening the index")
    }

    /// Expected postings of a token
    pub fn expected_postings(&self, token: &str) -> Vec<Posting> {
        self.tokens
            .get(token)
            .map(|reviews| {
                reviews
                    .iter()
                    .map(|(review_id, count)| Posting {
                        review_id: *review_id,
                        count: *count,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tokens matching a wildcard pattern, by brute force
    pub fn expected_terms(&self, pattern: &str) -> Vec<String> {
        self.tokens
            .keys()
            .filter(|token| glob_matches(pattern.as_bytes(), token.as_bytes()))
            .cloned()
            .collect()
    }
}

/// Recursive glob matching where `*` matches any (possibly empty) sequence
fn glob_matches(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|start| glob_matches(rest, &text[start..])),
        Some((c, rest)) => text.first() == Some(c) && glob_matches(rest, &text[1..]),
    }
}

/// Checks every token and product against the expected content
pub fn check_index(data: &TestIndex, reader: &IndexReader) {
    assert_eq!(reader.review_count() as usize, data.reviews.len());
    assert_eq!(
        reader.total_token_count(),
        data.reviews.iter().map(|r| r.tokens().count() as u64).sum::<u64>()
    );

    for (token, reviews) in data.tokens.iter() {
        let observed = reader.postings(token);
        assert_eq!(observed, data.expected_postings(token), "postings of {}", token);
        assert_eq!(reader.term_frequency(token), reviews.len() as u64, "df of {}", token);
        assert_eq!(
            reader.term_collection_frequency(token),
            reviews.values().map(|c| *c as u64).sum::<u64>(),
            "cf of {}",
            token
        );
    }

    for (product, reviews) in data.products.iter() {
        assert_eq!(&reader.product_reviews(product), reviews, "reviews of {}", product);
    }

    for (ix, review) in data.reviews.iter().enumerate() {
        let metadata = reader
            .review_metadata((ix + 1) as ReviewId)
            .expect("missing review");
        assert_eq!(metadata.product_id, review.product_id);
        assert_eq!(metadata.score, review.score);
        assert_eq!(metadata.helpfulness_numerator, review.helpfulness_numerator);
        assert_eq!(metadata.helpfulness_denominator, review.helpfulness_denominator);
        assert_eq!(metadata.length as usize, review.tokens().count());
    }
}
