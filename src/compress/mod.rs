//! Methods for compressing the posting lists
//!
//! Every list stored on disk is a sequence of [varint]-encoded integers;
//! ascending identifiers are stored as gaps ([postings]).

pub mod postings;
pub mod varint;
