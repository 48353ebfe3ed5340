//! Index construction
//!
//! The build reads the reviews twice. The first pass collects the token and
//! product vocabularies, which fixes the term identifiers. The second pass
//! writes the review metadata and feeds the external sorters with
//! (product, review) pairs and (token, review, count) trios. Sorted runs are
//! then turned into posting lists and dictionaries.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
};

use derivative::Derivative;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::{
    base::{
        IndexInformation, ReviewId, TermId, PRODUCTS_DICT, PRODUCTS_POSTINGS, PRODUCTS_TABLE,
        REVIEWS_FILE, RUNS_DIRECTORY, TOKENS_DICT, TOKENS_POSTINGS, TOKENS_TABLE,
    },
    corpus::ReviewSource,
    dictionary::TermDictionary,
    error::BuildError,
    postings::{PostingListBuilder, PostingStatistics, PostingTuple},
    reviews::{ReviewWriter, StoredReview},
    sort::{ExternalSorter, Pair, Trio},
    utils::block::TupleReader,
    wildcard::{build_wildcard_index, WildcardKind},
};

const DEFAULT_PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Blocks a sorter needs to merge runs (two inputs and one output)
const MIN_SORT_BLOCKS: usize = 3;

fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(DEFAULT_PROGRESS_TEMPLATE)
        .progress_chars("=> ")
}

#[derive(Derivative, Clone, Debug)]
#[derivative(Default)]
pub struct BuilderOptions {
    /// Number of terms per front-coded dictionary block (1 to 255)
    #[derivative(Default(value = "10"))]
    pub dictionary_block_size: usize,

    /// Memory (in bytes) used to sort tuples before flushing a run
    #[derivative(Default(value = "5_000_000"))]
    pub memory_budget: usize,

    /// Size (in bytes) of a read or write block when streaming runs
    #[derivative(Default(value = "4000"))]
    pub io_block_size: usize,

    /// Structure used for wildcard queries
    pub wildcard: WildcardKind,

    /// Show progress bars
    #[derivative(Default(value = "false"))]
    pub progress: bool,
}

impl BuilderOptions {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.dictionary_block_size == 0 || self.dictionary_block_size > u8::MAX as usize {
            return Err(BuildError::InvalidOptions(format!(
                "dictionary block size should be between 1 and 255 (got {})",
                self.dictionary_block_size
            )));
        }
        if self.io_block_size == 0 {
            return Err(BuildError::InvalidOptions(
                "I/O block size should be positive".to_string(),
            ));
        }
        if self.memory_budget / self.io_block_size < 2 * MIN_SORT_BLOCKS {
            return Err(BuildError::InvalidOptions(format!(
                "a memory budget of {} bytes holds less than 6 blocks of {} bytes",
                self.memory_budget, self.io_block_size
            )));
        }
        Ok(())
    }

    fn progress_bar(&self, length: Option<u64>) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        match length {
            Some(length) => {
                let progress = ProgressBar::new(length);
                progress.set_style(pb_style());
                progress
            }
            None => ProgressBar::new_spinner(),
        }
    }
}

/// State of one build, threaded through the pipeline stages
struct BuildContext<'a> {
    folder: &'a Path,
    work_folder: PathBuf,
    options: &'a BuilderOptions,
    tokens: Vec<String>,
    products: Vec<String>,
    token_ids: HashMap<String, TermId>,
    product_ids: HashMap<String, TermId>,
    review_count: u32,
    total_tokens: u64,
}

impl<'a> BuildContext<'a> {
    fn new(folder: &'a Path, options: &'a BuilderOptions) -> Self {
        Self {
            folder,
            work_folder: folder.join(RUNS_DIRECTORY),
            options,
            tokens: Vec::new(),
            products: Vec::new(),
            token_ids: HashMap::new(),
            product_ids: HashMap::new(),
            review_count: 0,
            total_tokens: 0,
        }
    }

    /// First pass: sorted token and product vocabularies
    fn collect_vocabulary<S: ReviewSource + ?Sized>(&mut self, source: &S) -> Result<(), BuildError> {
        let progress = self.options.progress_bar(None);
        progress.set_message("collecting vocabulary");

        let mut tokens = BTreeSet::new();
        let mut products = BTreeSet::new();
        for review in source.reviews()? {
            let review = review?;
            tokens.extend(review.tokens());
            products.insert(review.product_id);
            self.review_count += 1;
            progress.inc(1);
        }
        progress.finish();

        self.tokens = tokens.into_iter().collect();
        self.products = products.into_iter().collect();
        self.token_ids = ids(&self.tokens);
        self.product_ids = ids(&self.products);

        info!(
            "Vocabulary: {} tokens, {} products",
            self.tokens.len(),
            self.products.len()
        );
        Ok(())
    }

    fn build_wildcard(&self) -> Result<(), BuildError> {
        info!("Building the {} wildcard index", self.options.wildcard);
        build_wildcard_index(
            self.options.wildcard,
            &self.tokens,
            self.folder,
            &self.work_folder,
            self.options,
        )
    }

    /// Second pass: writes the review metadata and sorts the posting tuples
    ///
    /// Returns the sorted (product, review) and (token, review, count) runs
    fn generate_tuples<S: ReviewSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<(PathBuf, PathBuf), BuildError> {
        let options = self.options;
        let block_size = options.dictionary_block_size as TermId;
        // Both sorters are alive until the end of the pass
        let sort_budget = options.memory_budget / 2;
        let mut pairs = ExternalSorter::<Pair>::new(
            &self.work_folder,
            "products",
            sort_budget,
            options.io_block_size,
        );
        let mut trios = ExternalSorter::<Trio>::new(
            &self.work_folder,
            "tokens",
            sort_budget,
            options.io_block_size,
        );
        let mut reviews = ReviewWriter::create(&self.folder.join(REVIEWS_FILE))?;

        let progress = options.progress_bar(Some(self.review_count as u64));
        progress.set_message("sorting postings");

        for (ix, review) in source.reviews()?.enumerate() {
            let review = review?;
            let review_id = review_id(ix)?;
            let changed = || BuildError::Corpus {
                line: ix + 1,
                message: "the reviews changed between the two passes".to_string(),
            };

            let product = *self.product_ids.get(&review.product_id).ok_or_else(changed)?;
            pairs.push(Pair(product, review_id))?;

            let mut counts = BTreeMap::<TermId, u32>::new();
            let mut length = 0u32;
            for token in review.tokens() {
                let token = *self.token_ids.get(&token).ok_or_else(changed)?;
                *counts.entry(token).or_insert(0) += 1;
                length += 1;
            }
            for (token, count) in counts {
                trios.push(Trio(token, review_id, count))?;
            }

            reviews.add(&StoredReview {
                product_block: product / block_size,
                product_position: (product % block_size) as u8,
                helpfulness_numerator: review.helpfulness_numerator,
                helpfulness_denominator: review.helpfulness_denominator,
                score: review.score,
                length,
            })?;
            progress.inc(1);
        }
        progress.finish();

        let (review_count, total_tokens) = reviews.finish()?;
        self.review_count = review_count;
        self.total_tokens = total_tokens;
        debug!(
            "{} reviews, {} tokens: sorting {} pairs and {} trios",
            review_count,
            total_tokens,
            pairs.len(),
            trios.len()
        );

        Ok((pairs.finish()?, trios.finish()?))
    }

    /// Turns a sorted run into a posting file, and removes the run
    fn write_postings<T: PostingTuple>(
        &self,
        run: &Path,
        output: &str,
        term_count: usize,
        weighted: bool,
    ) -> Result<PostingStatistics, BuildError> {
        let mut reader = TupleReader::<T>::open(run, self.options.io_block_size)?;
        let statistics = PostingListBuilder::create(
            &self.folder.join(output),
            term_count,
            weighted,
            self.options.io_block_size,
        )?
        .write_run(&mut reader)?;
        drop(reader);
        fs::remove_file(run)?;

        info!("Wrote {} ({} bytes)", output, statistics.end_offset);
        Ok(statistics)
    }

    fn write_dictionary(
        &self,
        terms: &[String],
        statistics: &PostingStatistics,
        dict: &str,
        table: &str,
    ) -> Result<(), BuildError> {
        let dictionary =
            TermDictionary::build(terms, self.options.dictionary_block_size, statistics)?;
        dictionary.write(&self.folder.join(dict), &self.folder.join(table))?;
        Ok(())
    }

    fn information(&self) -> IndexInformation {
        IndexInformation {
            review_count: self.review_count,
            total_tokens: self.total_tokens,
            token_count: self.tokens.len() as u32,
            product_count: self.products.len() as u32,
            dictionary_block_size: self.options.dictionary_block_size as u16,
            wildcard: self.options.wildcard,
        }
    }
}

/// Identifier of the review at the given (0-based) position
fn review_id(position: usize) -> Result<ReviewId, BuildError> {
    position
        .checked_add(1)
        .and_then(|id| ReviewId::try_from(id).ok())
        .ok_or(BuildError::TooManyReviews(position))
}

fn ids(terms: &[String]) -> HashMap<String, TermId> {
    terms
        .iter()
        .enumerate()
        .map(|(ix, term)| (term.clone(), ix as TermId))
        .collect()
}

/// Builds an index in a folder
pub struct Indexer {
    folder: PathBuf,
    options: BuilderOptions,
}

impl Indexer {
    pub fn new(folder: &Path, options: &BuilderOptions) -> Self {
        Self {
            folder: folder.to_path_buf(),
            options: options.clone(),
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Removes the index folder and everything it contains
    ///
    /// Used to discard a failed build. Removing a folder that does not
    /// exist is not an error.
    pub fn remove(&self) -> Result<(), BuildError> {
        match fs::remove_dir_all(&self.folder) {
            Ok(()) => {
                info!("Removed index {}", self.folder.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Builds the index, consuming the reviews twice
    ///
    /// On error, the folder content is unusable and should be discarded.
    pub fn build<S: ReviewSource + ?Sized>(&self, source: &S) -> Result<IndexInformation, BuildError> {
        self.options.validate()?;
        fs::create_dir_all(&self.folder)?;

        let mut context = BuildContext::new(&self.folder, &self.options);
        fs::create_dir_all(&context.work_folder)?;

        context.collect_vocabulary(source)?;
        context.build_wildcard()?;

        let (pairs, trios) = context.generate_tuples(source)?;
        let product_statistics =
            context.write_postings::<Pair>(&pairs, PRODUCTS_POSTINGS, context.products.len(), false)?;
        let token_statistics =
            context.write_postings::<Trio>(&trios, TOKENS_POSTINGS, context.tokens.len(), true)?;

        context.write_dictionary(&context.tokens, &token_statistics, TOKENS_DICT, TOKENS_TABLE)?;
        context.write_dictionary(
            &context.products,
            &product_statistics,
            PRODUCTS_DICT,
            PRODUCTS_TABLE,
        )?;

        // Written last: its presence marks a complete index
        let information = context.information();
        information.save(&self.folder)?;
        fs::remove_dir_all(&context.work_folder)?;

        info!(
            "Index built in {}: {} reviews, {} tokens",
            self.folder.display(),
            information.review_count,
            information.total_tokens
        );
        Ok(information)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::ReviewRecord;
    use temp_dir::TempDir;

    #[test]
    fn test_options() {
        assert!(BuilderOptions::default().validate().is_ok());
        assert_eq!(BuilderOptions::default().dictionary_block_size, 10);

        let options = BuilderOptions {
            dictionary_block_size: 256,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(BuildError::InvalidOptions(_))));

        // Each of the two tuple sorters needs 3 blocks
        let options = BuilderOptions {
            memory_budget: 250,
            io_block_size: 50,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(BuildError::InvalidOptions(_))));
        let options = BuilderOptions {
            memory_budget: 300,
            io_block_size: 50,
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_review_id() {
        assert_eq!(review_id(0).unwrap(), 1);
        assert_eq!(review_id(u32::MAX as usize - 1).unwrap(), u32::MAX);
        assert!(matches!(
            review_id(u32::MAX as usize),
            Err(BuildError::TooManyReviews(_))
        ));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("index");
        let indexer = Indexer::new(&folder, &BuilderOptions::default());
        indexer
            .build(&vec![ReviewRecord::new("P1", 5, (0, 0), "some text")])
            .unwrap();
        assert!(folder.join(crate::base::INFORMATION_CBOR).exists());

        indexer.remove().unwrap();
        assert!(!folder.exists());
        // Already removed
        indexer.remove().unwrap();
    }

    #[test]
    fn test_build_files() {
        let dir = TempDir::new().unwrap();
        let reviews = vec![
            ReviewRecord::new("P1", 5, (1, 2), "Great product, great price"),
            ReviewRecord::new("P2", 3, (0, 0), "Average"),
        ];
        let information = Indexer::new(dir.path(), &BuilderOptions::default())
            .build(&reviews)
            .unwrap();

        assert_eq!(information.review_count, 2);
        assert_eq!(information.total_tokens, 5);
        assert_eq!(information.token_count, 4);
        assert_eq!(information.product_count, 2);
        assert!(!dir.path().join(RUNS_DIRECTORY).exists());
        for file in [
            TOKENS_DICT,
            TOKENS_TABLE,
            TOKENS_POSTINGS,
            PRODUCTS_DICT,
            PRODUCTS_TABLE,
            PRODUCTS_POSTINGS,
            crate::base::BIGRAMS_OFFSETS,
            crate::base::BIGRAMS_POSTINGS,
            REVIEWS_FILE,
            crate::base::INFORMATION_CBOR,
        ] {
            assert!(dir.path().join(file).exists(), "{} is missing", file);
        }
    }
}
