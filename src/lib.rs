//! Disk-resident inverted index over product reviews.
//!
//! An index is built once from a stream of reviews ([builder::Indexer]) and
//! is then opened read-only through [reader::IndexReader]. Exact and wildcard
//! term lookups are supported, the latter either through a bigram index or a
//! permuterm (rotated) lexicon.

pub mod base;
pub mod builder;
pub mod compress;
pub mod corpus;
pub mod dictionary;
pub mod error;
pub mod postings;
pub mod reader;
pub mod reviews;
pub mod search;
pub mod sort;
pub mod utils;
pub mod wildcard;
