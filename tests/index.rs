use std::fs::{self, File};

use rstest::rstest;
use temp_dir::TempDir;

use helpers::index::{check_index, TestIndex};
use review_index::{
    base::{IndexInformation, INFORMATION_CBOR, REVIEWS_FILE, TOKENS_TABLE},
    builder::{BuilderOptions, Indexer},
    corpus::ReviewRecord,
    error::OpenError,
    reader::{IndexReader, Posting},
    wildcard::WildcardKind,
};

/// Initialize the logger
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_corpus() -> Vec<ReviewRecord> {
    vec![
        ReviewRecord::new("B0001", 5, (2, 3), "foo bar foo"),
        ReviewRecord::new("B0002", 1, (0, 0), "Bar baz"),
        ReviewRecord::new("B0001", 4, (1, 1), "FOO qux"),
    ]
}

#[test]
fn test_small() {
    init_logger();
    let data = TestIndex::from_reviews(small_corpus(), &BuilderOptions::default());
    let reader = data.reader(true);

    assert_eq!(reader.term_frequency("foo"), 2);
    assert_eq!(reader.term_collection_frequency("foo"), 3);
    assert_eq!(
        reader.postings("foo"),
        vec![
            Posting {
                review_id: 1,
                count: 2
            },
            Posting {
                review_id: 3,
                count: 1
            }
        ]
    );
    // Tokens are case-insensitive, product ids are not
    assert_eq!(reader.postings("Foo"), reader.postings("foo"));
    assert_eq!(reader.product_reviews("B0001"), vec![1, 3]);
    assert!(reader.product_reviews("b0001").is_empty());

    assert_eq!(reader.product_id(2).as_deref(), Some("B0002"));
    assert_eq!(reader.review_score(1), Some(5));
    assert_eq!(reader.review_helpfulness_numerator(1), Some(2));
    assert_eq!(reader.review_helpfulness_denominator(1), Some(3));
    assert_eq!(reader.review_length(2), Some(2));
    assert_eq!(reader.review_count(), 3);
    assert_eq!(reader.total_token_count(), 7);

    check_index(&data, &reader);
}

#[test]
fn test_unknown() {
    let data = TestIndex::from_reviews(small_corpus(), &BuilderOptions::default());
    let reader = data.reader(false);

    assert_eq!(reader.term_frequency("zzz"), 0);
    assert_eq!(reader.term_collection_frequency("zzz"), 0);
    assert!(reader.postings("zzz").is_empty());
    assert!(reader.postings("").is_empty());
    assert!(reader.product_reviews("B9999").is_empty());

    // Review identifiers start at 1
    assert_eq!(reader.review_metadata(0), None);
    assert_eq!(reader.review_metadata(4), None);
    assert_eq!(reader.product_id(0), None);
    assert_eq!(reader.review_score(4), None);
    assert_eq!(reader.review_length(u32::MAX), None);
    assert!(reader.review_metadata(3).is_some());
}

#[test]
fn test_empty() {
    let data = TestIndex::from_reviews(Vec::new(), &BuilderOptions::default());
    let reader = data.reader(false);

    assert_eq!(reader.review_count(), 0);
    assert_eq!(reader.total_token_count(), 0);
    assert!(reader.postings("foo").is_empty());
    assert!(reader.matching_terms("*").is_empty());
    assert_eq!(reader.review_metadata(1), None);
}

#[test]
fn test_empty_reviews() {
    // Reviews without tokens still get an identifier and metadata
    let reviews = vec![
        ReviewRecord::new("P", 3, (0, 1), "!!!"),
        ReviewRecord::new("P", 2, (0, 0), "word"),
    ];
    let data = TestIndex::from_reviews(reviews, &BuilderOptions::default());
    let reader = data.reader(true);

    assert_eq!(reader.review_length(1), Some(0));
    assert_eq!(reader.product_reviews("P"), vec![1, 2]);
    check_index(&data, &reader);
}

#[rstest]
fn test_random(
    #[values(WildcardKind::Bigram, WildcardKind::Permuterm)] wildcard: WildcardKind,
    #[values((5_000_000, 4000), (1200, 120), (144, 24))] sizes: (usize, usize),
    #[values(1, 4, 10)] dictionary_block_size: usize,
) {
    init_logger();
    let (memory_budget, io_block_size) = sizes;
    let options = BuilderOptions {
        dictionary_block_size,
        memory_budget,
        io_block_size,
        wildcard,
        ..Default::default()
    };
    let data = TestIndex::new(200, 30, 300, 8., Some(10), &options);

    for in_memory in [true, false] {
        let reader = data.reader(in_memory);
        check_index(&data, &reader);
    }
}

#[test]
fn test_missing_file() {
    let data = TestIndex::from_reviews(small_corpus(), &BuilderOptions::default());
    fs::remove_file(data.dir.path().join(TOKENS_TABLE)).unwrap();

    let result = IndexReader::open(data.dir.path(), WildcardKind::Bigram, true);
    assert!(matches!(result, Err(OpenError::Missing { .. })));

    let dir = TempDir::new().unwrap();
    let result = IndexReader::open(dir.path(), WildcardKind::Bigram, true);
    assert!(matches!(result, Err(OpenError::Missing { .. })));
}

#[test]
fn test_wildcard_mismatch() {
    let data = TestIndex::from_reviews(small_corpus(), &BuilderOptions::default());
    let result = IndexReader::open(data.dir.path(), WildcardKind::Permuterm, true);
    assert!(matches!(
        result,
        Err(OpenError::WildcardMismatch {
            built: WildcardKind::Bigram,
            requested: WildcardKind::Permuterm
        })
    ));
}

#[test]
fn test_truncated_reviews() {
    let data = TestIndex::from_reviews(small_corpus(), &BuilderOptions::default());
    let path = data.dir.path().join(REVIEWS_FILE);
    let length = fs::metadata(&path).unwrap().len();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(length - 5)
        .unwrap();

    let result = IndexReader::open(data.dir.path(), WildcardKind::Bigram, true);
    assert!(matches!(result, Err(OpenError::Corrupt { .. })));
}

#[test]
fn test_incomplete_build() {
    // Without the information file, the index is not complete
    let data = TestIndex::from_reviews(small_corpus(), &BuilderOptions::default());
    fs::remove_file(data.dir.path().join(INFORMATION_CBOR)).unwrap();
    let result = IndexReader::open(data.dir.path(), WildcardKind::Bigram, true);
    assert!(matches!(result, Err(OpenError::Missing { .. })));
}

#[test]
fn test_invalid_options() {
    let dir = TempDir::new().unwrap();
    let options = BuilderOptions {
        dictionary_block_size: 0,
        ..Default::default()
    };
    let result = Indexer::new(dir.path(), &options).build(&small_corpus());
    assert!(result.is_err());
    assert!(!dir.path().join(INFORMATION_CBOR).exists());
}

#[test]
fn test_remove_index() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("reviews");
    let indexer = Indexer::new(&folder, &BuilderOptions::default());
    indexer.build(&small_corpus()).unwrap();
    assert!(IndexReader::open(&folder, WildcardKind::Bigram, true).is_ok());

    indexer.remove().unwrap();
    let result = IndexReader::open(&folder, WildcardKind::Bigram, true);
    assert!(matches!(result, Err(OpenError::Missing { .. })));
}

#[test]
fn test_block_size_mismatch() {
    let data = TestIndex::from_reviews(small_corpus(), &BuilderOptions::default());
    let mut information = IndexInformation::load(data.dir.path()).unwrap();
    information.dictionary_block_size = 4;
    information.save(data.dir.path()).unwrap();

    let result = IndexReader::open(data.dir.path(), WildcardKind::Bigram, true);
    assert!(matches!(result, Err(OpenError::Corrupt { .. })));
}
