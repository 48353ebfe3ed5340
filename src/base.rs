use std::{fs::File, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, OpenError};
use crate::wildcard::WildcardKind;

/// Index of a term (token or product id) in its dictionary
pub type TermId = u32;

/// Review identifier (1-based when exposed, 0-based internally)
pub type ReviewId = u32;

/// Occurrence count of a token in a review
pub type Count = u32;

pub const INFORMATION_CBOR: &str = "information.cbor";
pub const REVIEWS_FILE: &str = "reviews.dat";
pub const TOKENS_DICT: &str = "tokens.dict";
pub const TOKENS_TABLE: &str = "tokens.table";
pub const TOKENS_POSTINGS: &str = "tokens.postings";
pub const PRODUCTS_DICT: &str = "products.dict";
pub const PRODUCTS_TABLE: &str = "products.table";
pub const PRODUCTS_POSTINGS: &str = "products.postings";
pub const BIGRAMS_POSTINGS: &str = "bigrams.postings";
pub const BIGRAMS_OFFSETS: &str = "bigrams.offsets";
pub const ROTATIONS_FILE: &str = "rotations.dat";
pub const RUNS_DIRECTORY: &str = "runs";

/// Marks object that have a length
pub trait Len {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Global information about a built index, written once every other file
/// is complete
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexInformation {
    pub review_count: u32,
    pub total_tokens: u64,
    pub token_count: u32,
    pub product_count: u32,
    pub dictionary_block_size: u16,
    pub wildcard: WildcardKind,
}

impl IndexInformation {
    pub fn save(&self, folder: &Path) -> Result<(), BuildError> {
        let info_file = File::options()
            .write(true)
            .truncate(true)
            .create(true)
            .open(folder.join(INFORMATION_CBOR))?;

        ciborium::ser::into_writer(self, info_file)
            .map_err(|e| BuildError::Information(e.to_string()))
    }

    pub fn load(folder: &Path) -> Result<Self, OpenError> {
        let path = folder.join(INFORMATION_CBOR);
        let info_file = OpenError::open(&path)?;

        ciborium::de::from_reader(info_file).map_err(|e| OpenError::Information(e.to_string()))
    }
}
