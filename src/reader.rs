//! Read access to a built index
//!
//! Review identifiers are 1-based. Out of range identifiers and unknown
//! terms give empty results; patterns containing `*` are resolved through
//! the wildcard structure the index was built with.

use std::{collections::BTreeMap, path::Path};

use log::info;
use serde::Serialize;

use crate::{
    base::{
        Count, IndexInformation, Len, ReviewId, TermId, INFORMATION_CBOR, PRODUCTS_DICT,
        PRODUCTS_POSTINGS, PRODUCTS_TABLE, REVIEWS_FILE, TOKENS_DICT, TOKENS_POSTINGS,
        TOKENS_TABLE,
    },
    dictionary::TermDictionary,
    error::OpenError,
    postings::PostingFile,
    reviews::{ReviewStore, StoredReview},
    utils::buffer::open_buffer,
    wildcard::{matching_terms, open_wildcard_index, WildcardIndex, WildcardKind},
};

/// A review containing a term
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub review_id: ReviewId,
    pub count: Count,
}

/// Metadata of a review
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReviewMetadata {
    pub product_id: String,
    pub score: u8,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub length: u32,
}

pub struct IndexReader {
    information: IndexInformation,
    reviews: ReviewStore,
    tokens: TermDictionary,
    products: TermDictionary,
    token_postings: PostingFile,
    product_postings: PostingFile,
    wildcard: Box<dyn WildcardIndex>,
}

fn open_postings(
    folder: &Path,
    name: &str,
    dictionary: &TermDictionary,
    in_memory: bool,
) -> Result<PostingFile, OpenError> {
    let path = folder.join(name);
    let postings = PostingFile::new(open_buffer(&path, in_memory)?);
    if dictionary.max_posting_offset() > postings.len() as u64 {
        return Err(OpenError::corrupt(&path, "posting offsets exceed the file size"));
    }
    Ok(postings)
}

impl IndexReader {
    /// Opens an index built with the given wildcard structure
    ///
    /// When `in_memory` is false, posting files are memory-mapped.
    pub fn open(folder: &Path, wildcard: WildcardKind, in_memory: bool) -> Result<Self, OpenError> {
        let information = IndexInformation::load(folder)?;
        if information.wildcard != wildcard {
            return Err(OpenError::WildcardMismatch {
                built: information.wildcard,
                requested: wildcard,
            });
        }

        let reviews = ReviewStore::open(&folder.join(REVIEWS_FILE))?;
        let tokens = TermDictionary::open(&folder.join(TOKENS_DICT), &folder.join(TOKENS_TABLE))?;
        let products =
            TermDictionary::open(&folder.join(PRODUCTS_DICT), &folder.join(PRODUCTS_TABLE))?;
        let block_size = information.dictionary_block_size as usize;
        if reviews.review_count() != information.review_count
            || tokens.len() != information.token_count as usize
            || products.len() != information.product_count as usize
            || tokens.block_size() != block_size
            || products.block_size() != block_size
        {
            return Err(OpenError::corrupt(
                &folder.join(INFORMATION_CBOR),
                "index files do not match the index information",
            ));
        }

        let token_postings = open_postings(folder, TOKENS_POSTINGS, &tokens, in_memory)?;
        let product_postings = open_postings(folder, PRODUCTS_POSTINGS, &products, in_memory)?;
        let wildcard = open_wildcard_index(wildcard, folder, tokens.len(), in_memory)?;

        info!(
            "Opened index {} ({} reviews, {} tokens, {} products)",
            folder.display(),
            reviews.review_count(),
            tokens.len(),
            products.len()
        );

        Ok(Self {
            information,
            reviews,
            tokens,
            products,
            token_postings,
            product_postings,
            wildcard,
        })
    }

    pub fn information(&self) -> &IndexInformation {
        &self.information
    }

    pub fn wildcard_kind(&self) -> WildcardKind {
        self.wildcard.kind()
    }

    /// Token identifiers matching the (exact or wildcard) query
    fn resolve(&self, token: &str) -> Vec<TermId> {
        let token = token.to_lowercase();
        if token.contains('*') {
            matching_terms(self.wildcard.as_ref(), &token, &self.tokens)
        } else {
            self.tokens.lookup(&token).into_iter().collect()
        }
    }

    /// Tokens matching a query, in increasing order
    pub fn matching_terms(&self, token: &str) -> Vec<String> {
        self.resolve(token)
            .into_iter()
            .filter_map(|id| self.tokens.term(id))
            .collect()
    }

    /// Number of reviews containing the token (summed over matching tokens
    /// for wildcard queries)
    pub fn term_frequency(&self, token: &str) -> u64 {
        self.resolve(token)
            .into_iter()
            .map(|id| self.tokens.document_frequency(id) as u64)
            .sum()
    }

    /// Number of occurrences of the token in the whole collection
    pub fn term_collection_frequency(&self, token: &str) -> u64 {
        self.resolve(token)
            .into_iter()
            .map(|id| self.tokens.collection_frequency(id))
            .sum()
    }

    fn token_postings(&self, id: TermId) -> Vec<Posting> {
        match self.tokens.posting_offset(id) {
            Some(offset) => self
                .token_postings
                .counted(offset, self.tokens.document_frequency(id))
                .into_iter()
                .map(|(review_id, count)| Posting { review_id, count })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Reviews containing the token, ordered by review
    ///
    /// For wildcard queries, the counts of all the matching tokens are
    /// summed for each review.
    pub fn postings(&self, token: &str) -> Vec<Posting> {
        let ids = self.resolve(token);
        match ids.as_slice() {
            [] => Vec::new(),
            [id] => self.token_postings(*id),
            _ => {
                let mut merged = BTreeMap::<ReviewId, Count>::new();
                for &id in ids.iter() {
                    for posting in self.token_postings(id) {
                        *merged.entry(posting.review_id).or_insert(0) += posting.count;
                    }
                }
                merged
                    .into_iter()
                    .map(|(review_id, count)| Posting { review_id, count })
                    .collect()
            }
        }
    }

    /// Reviews of a product (the product id is case-sensitive)
    pub fn product_reviews(&self, product_id: &str) -> Vec<ReviewId> {
        self.products
            .lookup(product_id)
            .and_then(|id| {
                let offset = self.products.posting_offset(id)?;
                Some(
                    self.product_postings
                        .ids(offset, self.products.document_frequency(id)),
                )
            })
            .unwrap_or_default()
    }

    fn review(&self, review_id: ReviewId) -> Option<StoredReview> {
        if review_id == 0 {
            return None;
        }
        self.reviews.get(review_id as usize - 1)
    }

    pub fn review_metadata(&self, review_id: ReviewId) -> Option<ReviewMetadata> {
        let review = self.review(review_id)?;
        Some(ReviewMetadata {
            product_id: self.product_of(&review)?,
            score: review.score,
            helpfulness_numerator: review.helpfulness_numerator,
            helpfulness_denominator: review.helpfulness_denominator,
            length: review.length,
        })
    }

    fn product_of(&self, review: &StoredReview) -> Option<String> {
        self.products.term_at(
            review.product_block as usize,
            review.product_position as usize,
        )
    }

    pub fn product_id(&self, review_id: ReviewId) -> Option<String> {
        self.product_of(&self.review(review_id)?)
    }

    pub fn review_score(&self, review_id: ReviewId) -> Option<u8> {
        self.review(review_id).map(|r| r.score)
    }

    pub fn review_helpfulness_numerator(&self, review_id: ReviewId) -> Option<u16> {
        self.review(review_id).map(|r| r.helpfulness_numerator)
    }

    pub fn review_helpfulness_denominator(&self, review_id: ReviewId) -> Option<u16> {
        self.review(review_id).map(|r| r.helpfulness_denominator)
    }

    pub fn review_length(&self, review_id: ReviewId) -> Option<u32> {
        self.review(review_id).map(|r| r.length)
    }

    pub fn review_count(&self) -> u32 {
        self.reviews.review_count()
    }

    /// Total number of tokens (with repetitions)
    pub fn total_token_count(&self) -> u64 {
        self.reviews.total_tokens()
    }
}
