//! Front-coded term dictionary
//!
//! Terms are sorted and grouped in blocks of `B` terms. The first term of a
//! block (its head) is stored in full; the following ones only store the
//! suffix that differs from their predecessor. The last term of a full
//! block does not store its length, which is inferred from the start of the
//! next block head (or the end of the string blob).
//!
//! Two files are used: the concatenated strings (`.dict`) and the row table
//! (`.table`) holding, for each term, its statistics, its posting offset and
//! its front-coding information.

use std::{
    cmp::Ordering,
    fs::File,
    io::{self, BufWriter, Cursor, Write},
    path::Path,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::{
    base::{Len, TermId},
    error::{BuildError, OpenError},
    postings::PostingStatistics,
};

/// Flag set when the row table holds collection frequencies
const FLAG_WEIGHTED: u8 = 1;

/// Front-coding information of a row, depending on its position in the
/// block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Head { length: u16, start: u32 },
    Interior { length: u16, prefix: u16 },
    Last { prefix: u16 },
}

#[derive(Debug, Clone, PartialEq)]
struct Row {
    frequency: u32,
    collection_frequency: u64,
    posting_offset: u64,
    entry: Entry,
}

pub struct TermDictionary {
    blob: Vec<u8>,
    rows: Vec<Row>,
    block_size: usize,
    weighted: bool,
}

#[inline]
fn shared_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

impl TermDictionary {
    /// Builds the dictionary from strictly ascending terms and the
    /// statistics of their posting lists
    pub fn build<S: AsRef<str>>(
        terms: &[S],
        block_size: usize,
        statistics: &PostingStatistics,
    ) -> Result<Self, BuildError> {
        if block_size == 0 || block_size > u8::MAX as usize {
            return Err(BuildError::InvalidOptions(format!(
                "dictionary block size should be between 1 and 255 (got {})",
                block_size
            )));
        }
        if statistics.offsets.len() != terms.len() {
            return Err(BuildError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} terms but {} posting lists",
                    terms.len(),
                    statistics.offsets.len()
                ),
            )));
        }

        let weighted = !statistics.collection_frequencies.is_empty();
        let mut blob = Vec::new();
        let mut rows = Vec::with_capacity(terms.len());
        let mut previous: &[u8] = &[];

        for (ix, term) in terms.iter().enumerate() {
            let term = term.as_ref().as_bytes();
            let length = u16::try_from(term.len()).map_err(|_| BuildError::TermTooLong {
                term: String::from_utf8_lossy(term).into_owned(),
                length: term.len(),
            })?;
            debug_assert!(ix == 0 || previous < term, "terms should be strictly ascending");

            let position = ix % block_size;
            let entry = if position == 0 {
                let start = u32::try_from(blob.len()).map_err(|_| {
                    BuildError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "dictionary strings exceed 4GB",
                    ))
                })?;
                blob.extend_from_slice(term);
                Entry::Head { length, start }
            } else {
                let prefix = shared_prefix(previous, term);
                blob.extend_from_slice(&term[prefix..]);
                if position == block_size - 1 {
                    Entry::Last {
                        prefix: prefix as u16,
                    }
                } else {
                    Entry::Interior {
                        length,
                        prefix: prefix as u16,
                    }
                }
            };

            rows.push(Row {
                frequency: statistics.document_frequencies[ix],
                collection_frequency: if weighted {
                    statistics.collection_frequencies[ix]
                } else {
                    0
                },
                posting_offset: statistics.offsets[ix],
                entry,
            });
            previous = term;
        }

        debug!(
            "Built dictionary with {} terms ({} bytes of strings)",
            rows.len(),
            blob.len()
        );

        Ok(Self {
            blob,
            rows,
            block_size,
            weighted,
        })
    }

    /// Writes the string blob and the row table
    pub fn write(&self, dict_path: &Path, table_path: &Path) -> io::Result<()> {
        std::fs::write(dict_path, &self.blob)?;

        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(table_path)?;
        let mut out = BufWriter::new(file);

        out.write_u32::<BigEndian>(self.rows.len() as u32)?;
        out.write_u16::<BigEndian>(self.block_size as u16)?;
        out.write_u8(if self.weighted { FLAG_WEIGHTED } else { 0 })?;

        for row in self.rows.iter() {
            out.write_u32::<BigEndian>(row.frequency)?;
            if self.weighted {
                out.write_u64::<BigEndian>(row.collection_frequency)?;
            }
            out.write_u64::<BigEndian>(row.posting_offset)?;
            match row.entry {
                Entry::Head { length, start } => {
                    out.write_u16::<BigEndian>(length)?;
                    out.write_u32::<BigEndian>(start)?;
                }
                Entry::Interior { length, prefix } => {
                    out.write_u16::<BigEndian>(length)?;
                    out.write_u16::<BigEndian>(prefix)?;
                }
                Entry::Last { prefix } => out.write_u16::<BigEndian>(prefix)?,
            }
        }
        out.flush()
    }

    /// Loads a dictionary in memory and checks that every term can be
    /// decoded
    pub fn open(dict_path: &Path, table_path: &Path) -> Result<Self, OpenError> {
        let blob = OpenError::read(dict_path)?;
        let table = OpenError::read(table_path)?;
        let truncated = |_: io::Error| OpenError::corrupt(table_path, "truncated row table");

        let mut cursor = Cursor::new(&table[..]);
        let count = cursor.read_u32::<BigEndian>().map_err(truncated)? as usize;
        let block_size = cursor.read_u16::<BigEndian>().map_err(truncated)? as usize;
        let weighted = cursor.read_u8().map_err(truncated)? & FLAG_WEIGHTED != 0;
        if block_size == 0 {
            return Err(OpenError::corrupt(table_path, "block size is 0"));
        }

        let mut rows = Vec::with_capacity(count.min(table.len()));
        for ix in 0..count {
            let frequency = cursor.read_u32::<BigEndian>().map_err(truncated)?;
            let collection_frequency = if weighted {
                cursor.read_u64::<BigEndian>().map_err(truncated)?
            } else {
                0
            };
            let posting_offset = cursor.read_u64::<BigEndian>().map_err(truncated)?;

            let position = ix % block_size;
            let entry = if position == 0 {
                Entry::Head {
                    length: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                    start: cursor.read_u32::<BigEndian>().map_err(truncated)?,
                }
            } else if position == block_size - 1 {
                Entry::Last {
                    prefix: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                }
            } else {
                Entry::Interior {
                    length: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                    prefix: cursor.read_u16::<BigEndian>().map_err(truncated)?,
                }
            };

            rows.push(Row {
                frequency,
                collection_frequency,
                posting_offset,
                entry,
            });
        }
        if (cursor.position() as usize) != table.len() {
            return Err(OpenError::corrupt(table_path, "trailing bytes after the rows"));
        }

        let dictionary = Self {
            blob,
            rows,
            block_size,
            weighted,
        };

        // Every block must be decodable
        for block in 0..dictionary.block_count() {
            let mut terms = dictionary.block_terms(block);
            let mut previous: Option<Vec<u8>> = None;
            for _ in dictionary.block_range(block) {
                let term = terms
                    .advance()
                    .ok_or_else(|| OpenError::corrupt(dict_path, format!("block {} cannot be decoded", block)))?;
                if std::str::from_utf8(term).is_err() {
                    return Err(OpenError::corrupt(dict_path, "term is not valid UTF-8"));
                }
                if previous.as_deref().map_or(false, |p| p >= term) {
                    return Err(OpenError::corrupt(dict_path, "terms are not sorted"));
                }
                previous = Some(term.to_vec());
            }
        }

        Ok(dictionary)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        (self.rows.len() + self.block_size - 1) / self.block_size
    }

    /// True if the dictionary stores collection frequencies
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    fn block_range(&self, block: usize) -> std::ops::Range<usize> {
        let start = block * self.block_size;
        start..(start + self.block_size).min(self.rows.len())
    }

    /// Start of the strings of a block within the blob
    fn block_start(&self, block: usize) -> Option<usize> {
        match self.rows.get(block * self.block_size)?.entry {
            Entry::Head { start, .. } => Some(start as usize),
            _ => None,
        }
    }

    fn head(&self, block: usize) -> Option<&[u8]> {
        match self.rows.get(block * self.block_size)?.entry {
            Entry::Head { length, start } => self
                .blob
                .get(start as usize..start as usize + length as usize),
            _ => None,
        }
    }

    fn block_terms(&self, block: usize) -> BlockTerms<'_> {
        BlockTerms {
            dictionary: self,
            block,
            next: block * self.block_size,
            end: self.block_range(block).end,
            cursor: 0,
            term: Vec::new(),
        }
    }

    /// Reconstructs the term at a position within a block
    pub fn term_at(&self, block: usize, position: usize) -> Option<String> {
        if position >= self.block_size {
            return None;
        }
        let mut terms = self.block_terms(block);
        for _ in 0..position {
            terms.advance()?;
        }
        let term = terms.advance()?;
        String::from_utf8(term.to_vec()).ok()
    }

    /// Term with the given identifier
    pub fn term(&self, id: TermId) -> Option<String> {
        let id = id as usize;
        self.term_at(id / self.block_size, id % self.block_size)
    }

    /// Identifier of a term, if it is in the dictionary
    pub fn lookup(&self, term: &str) -> Option<TermId> {
        let term = term.as_bytes();

        // Finds the last block whose head is not greater than the term
        let mut low = 0;
        let mut high = self.block_count();
        while low < high {
            let mid = low + (high - low) / 2;
            match self.head(mid)?.cmp(term) {
                Ordering::Equal => return Some((mid * self.block_size) as TermId),
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
            }
        }
        if low == 0 {
            return None;
        }

        let block = low - 1;
        let mut terms = self.block_terms(block);
        for id in self.block_range(block) {
            match terms.advance()?.cmp(term) {
                Ordering::Equal => return Some(id as TermId),
                Ordering::Greater => return None,
                Ordering::Less => {}
            }
        }
        None
    }

    /// Number of reviews containing the term (0 if unknown)
    pub fn document_frequency(&self, id: TermId) -> u32 {
        self.rows.get(id as usize).map_or(0, |row| row.frequency)
    }

    /// Total number of occurrences of the term (0 if unknown)
    pub fn collection_frequency(&self, id: TermId) -> u64 {
        self.rows
            .get(id as usize)
            .map_or(0, |row| row.collection_frequency)
    }

    /// Start of the posting list of the term
    pub fn posting_offset(&self, id: TermId) -> Option<u64> {
        self.rows.get(id as usize).map(|row| row.posting_offset)
    }

    /// Largest posting offset (used to check posting files)
    pub(crate) fn max_posting_offset(&self) -> u64 {
        self.rows
            .iter()
            .map(|row| row.posting_offset)
            .max()
            .unwrap_or(0)
    }
}

impl Len for TermDictionary {
    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Sequential decoding of the terms of a block
struct BlockTerms<'a> {
    dictionary: &'a TermDictionary,
    block: usize,
    /// Next row to decode
    next: usize,
    end: usize,
    /// Position of the next suffix in the blob
    cursor: usize,
    term: Vec<u8>,
}

impl<'a> BlockTerms<'a> {
    /// Decodes the next term, `None` at the end of the block or if the
    /// data is inconsistent
    fn advance(&mut self) -> Option<&[u8]> {
        if self.next >= self.end {
            return None;
        }
        let blob = &self.dictionary.blob;
        let (prefix, suffix_end) = match self.dictionary.rows[self.next].entry {
            Entry::Head { length, start } => {
                self.cursor = start as usize;
                (0, start as usize + length as usize)
            }
            Entry::Interior { length, prefix } => {
                let length = (length as usize).checked_sub(prefix as usize)?;
                (prefix as usize, self.cursor + length)
            }
            Entry::Last { prefix } => {
                let end = if self.block + 1 < self.dictionary.block_count() {
                    self.dictionary.block_start(self.block + 1)?
                } else {
                    blob.len()
                };
                (prefix as usize, end)
            }
        };

        if prefix > self.term.len() || suffix_end < self.cursor {
            return None;
        }
        let suffix = blob.get(self.cursor..suffix_end)?;
        self.term.truncate(prefix);
        self.term.extend_from_slice(suffix);
        self.cursor = suffix_end;
        self.next += 1;
        Some(&self.term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use temp_dir::TempDir;

    fn statistics(count: usize, weighted: bool) -> PostingStatistics {
        PostingStatistics {
            offsets: (0..count as u64).map(|i| i * 3).collect(),
            document_frequencies: (0..count as u32).map(|i| i + 1).collect(),
            collection_frequencies: if weighted {
                (0..count as u64).map(|i| 2 * i + 5).collect()
            } else {
                Vec::new()
            },
            end_offset: 3 * count as u64,
        }
    }

    fn vocabulary() -> Vec<String> {
        let mut terms: Vec<String> = [
            "a", "ab", "abc", "abd", "b", "bad", "badge", "badger", "bat", "batch", "c", "car",
            "card", "care", "careful", "cat", "catalog", "dog", "dogma", "z", "zz", "zzz", "zzzz",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        terms.sort();
        terms
    }

    #[rstest]
    fn test_roundtrip(
        #[values(1, 2, 3, 4, 10, 23, 50)] block_size: usize,
        #[values(true, false)] weighted: bool,
    ) {
        let terms = vocabulary();
        let stats = statistics(terms.len(), weighted);
        let built = TermDictionary::build(&terms, block_size, &stats).unwrap();

        let dir = TempDir::new().unwrap();
        let (dict, table) = (dir.path().join("t.dict"), dir.path().join("t.table"));
        built.write(&dict, &table).unwrap();
        let dictionary = TermDictionary::open(&dict, &table).unwrap();

        assert_eq!(dictionary.len(), terms.len());
        assert_eq!(dictionary.is_weighted(), weighted);
        for (ix, term) in terms.iter().enumerate() {
            let id = ix as TermId;
            assert_eq!(
                dictionary.term_at(ix / block_size, ix % block_size).as_ref(),
                Some(term)
            );
            assert_eq!(dictionary.lookup(term), Some(id), "lookup of {}", term);
            assert_eq!(dictionary.document_frequency(id), stats.document_frequencies[ix]);
            assert_eq!(dictionary.posting_offset(id), Some(stats.offsets[ix]));
            if weighted {
                assert_eq!(dictionary.collection_frequency(id), stats.collection_frequencies[ix]);
            }
        }

        for missing in ["", "aa", "abe", "ca", "cards", "zzzzz", "0", "~"] {
            assert_eq!(dictionary.lookup(missing), None, "lookup of {}", missing);
        }
        assert_eq!(dictionary.document_frequency(terms.len() as TermId), 0);
        assert_eq!(dictionary.posting_offset(terms.len() as TermId), None);
    }

    #[test]
    fn test_layout() {
        let terms = ["car", "card", "care", "cat"];
        let built = TermDictionary::build(&terms[..], 3, &statistics(4, true)).unwrap();
        // Block 0: car (head), card (prefix 3), care (last, prefix 3)
        // Block 1: cat (head)
        assert_eq!(built.blob, b"cardecat".to_vec());
        assert_eq!(built.rows[1].entry, Entry::Interior { length: 4, prefix: 3 });
        assert_eq!(built.rows[2].entry, Entry::Last { prefix: 3 });
        assert_eq!(built.rows[3].entry, Entry::Head { length: 3, start: 5 });
        assert_eq!(built.term(2).as_deref(), Some("care"));
        assert_eq!(built.term_at(0, 3), None);
        assert_eq!(built.term_at(1, 1), None);
    }

    #[test]
    fn test_empty() {
        let dir = TempDir::new().unwrap();
        let (dict, table) = (dir.path().join("t.dict"), dir.path().join("t.table"));
        let terms: Vec<String> = Vec::new();
        TermDictionary::build(&terms, 10, &PostingStatistics::default())
            .unwrap()
            .write(&dict, &table)
            .unwrap();

        let dictionary = TermDictionary::open(&dict, &table).unwrap();
        assert_eq!(dictionary.len(), 0);
        assert_eq!(dictionary.lookup("a"), None);
        assert_eq!(dictionary.term(0), None);
    }

    #[test]
    fn test_corrupt() {
        let dir = TempDir::new().unwrap();
        let (dict, table) = (dir.path().join("t.dict"), dir.path().join("t.table"));
        let terms = vocabulary();
        TermDictionary::build(&terms, 4, &statistics(terms.len(), true))
            .unwrap()
            .write(&dict, &table)
            .unwrap();

        // Truncated strings
        let blob = std::fs::read(&dict).unwrap();
        std::fs::write(&dict, &blob[..blob.len() / 2]).unwrap();
        assert!(matches!(
            TermDictionary::open(&dict, &table),
            Err(OpenError::Corrupt { .. })
        ));

        // Truncated table
        std::fs::write(&dict, &blob).unwrap();
        let rows = std::fs::read(&table).unwrap();
        std::fs::write(&table, &rows[..rows.len() - 3]).unwrap();
        assert!(matches!(
            TermDictionary::open(&dict, &table),
            Err(OpenError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_too_long() {
        let terms = vec!["x".repeat(70_000)];
        assert!(matches!(
            TermDictionary::build(&terms, 10, &statistics(1, false)),
            Err(BuildError::TermTooLong { length: 70_000, .. })
        ));
    }
}
