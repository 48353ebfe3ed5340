use rand::{distributions::Alphanumeric, seq::SliceRandom, Rng, RngCore};
use rand_distr::{Distribution, Poisson};

use review_index::corpus::ReviewRecord;

/// Random words, some of them upper-cased
pub fn create_vocabulary(size: usize, max_length: usize, rng: &mut dyn RngCore) -> Vec<String> {
    (0..size)
        .map(|_| {
            let length = rng.gen_range(1..=max_length);
            (0..length)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect()
        })
        .collect()
}

pub fn create_products(count: usize, rng: &mut dyn RngCore) -> Vec<String> {
    (0..count)
        .map(|_| format!("B{:09}", rng.gen_range(0..1_000_000_000u32)))
        .collect()
}

/// Creates a review whose length follows a Poisson distribution
pub fn create_review(
    lambda_words: f64,
    vocabulary: &[String],
    products: &[String],
    rng: &mut dyn RngCore,
) -> ReviewRecord {
    let poi = Poisson::new(lambda_words).unwrap();
    let num_words = poi.sample(rng) as usize;

    let words: Vec<&str> = (0..num_words)
        .map(|_| vocabulary.choose(rng).unwrap().as_str())
        .collect();
    let separators = [" ", ", ", ". ", " - ", "!\n"];
    let mut text = String::new();
    for word in words {
        if !text.is_empty() {
            text.push_str(separators.choose(rng).unwrap());
        }
        text.push_str(word);
    }

    let denominator = rng.gen_range(0..10u16);
    ReviewRecord::new(
        products.choose(rng).unwrap(),
        rng.gen_range(1..=5),
        (rng.gen_range(0..=denominator), denominator),
        &text,
    )
}
