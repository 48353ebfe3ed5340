//! Bigram index
//!
//! Each term is bracketed as `$term$`, and every pair of consecutive
//! characters points to the terms containing it. Term lists are stored as
//! gap-encoded postings, and an offset table (one more entry than the
//! number of bigrams) delimits them.

use std::{
    collections::{BTreeSet, HashSet},
    fs::{self, File},
    io::{BufWriter, Cursor, Write},
    path::Path,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use super::{WildcardIndex, WildcardKind};
use crate::{
    base::{TermId, BIGRAMS_OFFSETS, BIGRAMS_POSTINGS},
    builder::BuilderOptions,
    dictionary::TermDictionary,
    error::{BuildError, OpenError},
    postings::{PostingFile, PostingListBuilder},
    sort::{ExternalSorter, Pair},
    utils::{block::TupleReader, buffer::open_buffer},
};

/// Symbols that can appear in a bigram, `$` marking the term boundaries
pub const ALPHABET: &[u8; 37] = b"$0123456789abcdefghijklmnopqrstuvwxyz";

pub const BIGRAM_COUNT: usize = ALPHABET.len() * ALPHABET.len();

#[inline]
fn symbol(c: u8) -> Option<u32> {
    match c {
        b'$' => Some(0),
        b'0'..=b'9' => Some((c - b'0') as u32 + 1),
        b'a'..=b'z' => Some((c - b'a') as u32 + 11),
        _ => None,
    }
}

/// Index of a bigram, `None` if one of the characters is not in the
/// alphabet
#[inline]
pub fn bigram_id(first: u8, second: u8) -> Option<u32> {
    Some(symbol(first)? * ALPHABET.len() as u32 + symbol(second)?)
}

/// Distinct bigrams of `$term$`
pub fn term_bigrams(term: &str) -> BTreeSet<u32> {
    let bracketed = format!("${}$", term);
    bracketed
        .as_bytes()
        .windows(2)
        .filter_map(|w| bigram_id(w[0], w[1]))
        .collect()
}

pub(crate) fn build<S: AsRef<str>>(
    terms: &[S],
    folder: &Path,
    work_folder: &Path,
    options: &BuilderOptions,
) -> Result<(), BuildError> {
    let mut sorter = ExternalSorter::<Pair>::new(
        work_folder,
        "bigrams",
        options.memory_budget,
        options.io_block_size,
    );
    for (id, term) in terms.iter().enumerate() {
        for bigram in term_bigrams(term.as_ref()) {
            sorter.push(Pair(bigram, id as TermId))?;
        }
    }
    let pairs = sorter.len();
    let run = sorter.finish()?;

    let mut reader = TupleReader::<Pair>::open(&run, options.io_block_size)?;
    let statistics = PostingListBuilder::create(
        &folder.join(BIGRAMS_POSTINGS),
        BIGRAM_COUNT,
        false,
        options.io_block_size,
    )?
    .write_run(&mut reader)?;
    drop(reader);
    fs::remove_file(&run)?;

    let file = File::options()
        .write(true)
        .create(true)
        .truncate(true)
        .open(folder.join(BIGRAMS_OFFSETS))?;
    let mut out = BufWriter::new(file);
    for offset in statistics.offsets.iter() {
        out.write_u64::<BigEndian>(*offset)?;
    }
    out.write_u64::<BigEndian>(statistics.end_offset)?;
    out.flush()?;

    info!(
        "Bigram index: {} (bigram, term) pairs, {} bytes",
        pairs, statistics.end_offset
    );
    Ok(())
}

pub struct BigramIndex {
    postings: PostingFile,
    /// Start of each bigram term list, plus the end of the last one
    offsets: Vec<u64>,
    term_count: usize,
}

impl BigramIndex {
    pub fn open(folder: &Path, term_count: usize, in_memory: bool) -> Result<Self, OpenError> {
        let offsets_path = folder.join(BIGRAMS_OFFSETS);
        let data = OpenError::read(&offsets_path)?;
        if data.len() != (BIGRAM_COUNT + 1) * 8 {
            return Err(OpenError::corrupt(
                &offsets_path,
                format!("expected {} offsets", BIGRAM_COUNT + 1),
            ));
        }

        let mut cursor = Cursor::new(&data[..]);
        let mut offsets = Vec::with_capacity(BIGRAM_COUNT + 1);
        for _ in 0..=BIGRAM_COUNT {
            let offset = cursor
                .read_u64::<BigEndian>()
                .map_err(|e| OpenError::io(&offsets_path, e))?;
            if offsets.last().map_or(false, |last| *last > offset) {
                return Err(OpenError::corrupt(&offsets_path, "offsets are not increasing"));
            }
            offsets.push(offset);
        }

        let postings_path = folder.join(BIGRAMS_POSTINGS);
        let postings = PostingFile::new(open_buffer(&postings_path, in_memory)?);
        if offsets.last().copied() != Some(postings.len() as u64) {
            return Err(OpenError::corrupt(
                &postings_path,
                "size does not match the offset table",
            ));
        }

        Ok(Self {
            postings,
            offsets,
            term_count,
        })
    }

    /// Terms containing the bigram
    fn terms(&self, bigram: u32) -> HashSet<TermId> {
        let bigram = bigram as usize;
        self.postings
            .ids_between(self.offsets[bigram], self.offsets[bigram + 1])
            .into_iter()
            .filter(|id| (*id as usize) < self.term_count)
            .collect()
    }
}

impl WildcardIndex for BigramIndex {
    fn kind(&self) -> WildcardKind {
        WildcardKind::Bigram
    }

    fn candidates(&self, pattern: &str, _dictionary: &TermDictionary) -> HashSet<TermId> {
        let bracketed = format!("${}$", pattern);
        let fragments: Vec<&[u8]> = bracketed.as_bytes().split(|c| *c == b'*').collect();

        if fragments.iter().any(|f| f.len() >= 2) {
            // Terms must contain every bigram of the fragments
            let mut candidates: Option<HashSet<TermId>> = None;
            for window in fragments.iter().filter(|f| f.len() >= 2).flat_map(|f| f.windows(2)) {
                let bigram = match bigram_id(window[0], window[1]) {
                    Some(bigram) => bigram,
                    None => return HashSet::new(),
                };
                let terms = self.terms(bigram);
                let merged = match candidates {
                    None => terms,
                    Some(mut current) => {
                        current.retain(|id| terms.contains(id));
                        current
                    }
                };
                if merged.is_empty() {
                    return merged;
                }
                candidates = Some(merged);
            }
            candidates.unwrap_or_default()
        } else {
            // No fragment holds a bigram: take every bigram that can be
            // formed around the lone character, and keep their union
            let lone = fragments
                .iter()
                .rev()
                .find(|f| f.len() == 1 && **f != b"$")
                .map_or(b'$', |f| f[0]);

            let mut candidates = HashSet::new();
            for &c in ALPHABET.iter() {
                for (first, second) in [(c, lone), (lone, c)] {
                    if let Some(bigram) = bigram_id(first, second) {
                        candidates.extend(self.terms(bigram));
                    }
                }
            }
            candidates
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet() {
        for (ix, c) in ALPHABET.iter().enumerate() {
            assert_eq!(symbol(*c), Some(ix as u32));
        }
        assert_eq!(symbol(b'A'), None);
        assert_eq!(symbol(b'-'), None);
        assert_eq!(bigram_id(b'$', b'$'), Some(0));
        assert_eq!(bigram_id(b'z', b'z'), Some(BIGRAM_COUNT as u32 - 1));
        assert_eq!(bigram_id(b'a', b'b'), Some(11 * 37 + 12));
    }

    #[test]
    fn test_term_bigrams() {
        let expected: BTreeSet<u32> = [(b'$', b'c'), (b'c', b'a'), (b'a', b't'), (b't', b'$')]
            .iter()
            .filter_map(|(a, b)| bigram_id(*a, *b))
            .collect();
        assert_eq!(term_bigrams("cat"), expected);

        // Repeated bigrams are only listed once
        assert_eq!(term_bigrams("aaaa").len(), 3);
    }
}
