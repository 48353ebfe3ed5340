//! Posting lists built from a sorted run of tuples
//!
//! A posting list gathers the tuples sharing the same first field. The
//! second field (an identifier) is gap-encoded; token postings store the
//! occurrence count after each identifier.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use log::debug;

use crate::{
    base::{Count, ReviewId},
    compress::{
        postings::{CountedGapDecoder, GapDecoder, GapEncoder},
        varint::write_varint,
    },
    sort::{Pair, Trio, Tuple},
    utils::{block::TupleReader, buffer::Buffer},
};

/// A tuple that can be turned into a posting
pub trait PostingTuple: Tuple {
    /// The (ascending) identifier within a posting list
    fn id(&self) -> u32;

    /// Number of occurrences, if postings are weighted
    fn count(&self) -> Option<Count>;
}

impl PostingTuple for Pair {
    #[inline]
    fn id(&self) -> u32 {
        self.1
    }

    #[inline]
    fn count(&self) -> Option<Count> {
        None
    }
}

impl PostingTuple for Trio {
    #[inline]
    fn id(&self) -> u32 {
        self.1
    }

    #[inline]
    fn count(&self) -> Option<Count> {
        Some(self.2)
    }
}

/// Per-term information gathered while writing the postings
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PostingStatistics {
    /// Start of each posting list in the posting file
    pub offsets: Vec<u64>,
    /// Number of entries of each posting list
    pub document_frequencies: Vec<u32>,
    /// Sum of the counts (empty for unweighted postings)
    pub collection_frequencies: Vec<u64>,
    /// Size of the posting file
    pub end_offset: u64,
}

impl PostingStatistics {
    fn with_capacity(term_count: usize, weighted: bool) -> Self {
        Self {
            offsets: Vec::with_capacity(term_count),
            document_frequencies: Vec::with_capacity(term_count),
            collection_frequencies: if weighted {
                Vec::with_capacity(term_count)
            } else {
                Vec::new()
            },
            end_offset: 0,
        }
    }

    /// Registers a term without any posting
    fn push_empty(&mut self, weighted: bool) {
        self.offsets.push(self.end_offset);
        self.document_frequencies.push(0);
        if weighted {
            self.collection_frequencies.push(0);
        }
    }
}

/// Streams a sorted run into a posting file
pub struct PostingListBuilder<W: Write> {
    writer: W,
    encoder: GapEncoder,
    statistics: PostingStatistics,
    weighted: bool,
    term_count: usize,
}

impl PostingListBuilder<BufWriter<File>> {
    /// Creates a builder writing to `path`, buffering one I/O block
    pub fn create(path: &Path, term_count: usize, weighted: bool, io_block_size: usize) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(
            BufWriter::with_capacity(io_block_size.max(1), file),
            term_count,
            weighted,
        ))
    }
}

impl<W: Write> PostingListBuilder<W> {
    pub fn new(writer: W, term_count: usize, weighted: bool) -> Self {
        Self {
            writer,
            encoder: GapEncoder::new(),
            statistics: PostingStatistics::with_capacity(term_count, weighted),
            weighted,
            term_count,
        }
    }

    /// Consumes a sorted run and writes one posting list per term
    ///
    /// Terms that do not appear in the run get an empty posting list
    /// starting at the current offset.
    pub fn write_run<T: PostingTuple>(mut self, run: &mut TupleReader<T>) -> io::Result<PostingStatistics> {
        while let Some(first) = run.read()? {
            let term = first.key() as usize;
            if term >= self.term_count {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("term {} out of range (at most {})", term, self.term_count),
                ));
            }
            if term < self.statistics.offsets.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("run is not sorted (term {})", term),
                ));
            }

            while self.statistics.offsets.len() < term {
                self.statistics.push_empty(self.weighted);
            }

            self.statistics.offsets.push(self.statistics.end_offset);
            self.encoder.reset();

            let mut frequency = 0u32;
            let mut occurrences = 0u64;
            let mut current = Some(first);
            while let Some(tuple) = current {
                self.statistics.end_offset += self.encoder.push(&mut self.writer, tuple.id())? as u64;
                if self.weighted {
                    let count = tuple.count().unwrap_or(1);
                    self.statistics.end_offset += write_varint(&mut self.writer, count)? as u64;
                    occurrences += count as u64;
                }
                frequency += 1;

                // One tuple of lookahead to detect the end of the group
                let same_term = matches!(run.peek()?, Some(next) if next.key() == first.key());
                current = if same_term { run.read()? } else { None };
            }

            debug!(
                "term {}: {} postings at {}",
                term,
                frequency,
                self.statistics.offsets[term]
            );
            self.statistics.document_frequencies.push(frequency);
            if self.weighted {
                self.statistics.collection_frequencies.push(occurrences);
            }
        }

        while self.statistics.offsets.len() < self.term_count {
            self.statistics.push_empty(self.weighted);
        }

        self.writer.flush()?;
        Ok(self.statistics)
    }
}

/// Read access to a posting file
pub struct PostingFile {
    buffer: Box<dyn Buffer>,
}

impl PostingFile {
    pub fn new(buffer: Box<dyn Buffer>) -> Self {
        Self { buffer }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Weighted postings (review, count) of a list with `frequency` entries
    pub fn counted(&self, offset: u64, frequency: u32) -> Vec<(ReviewId, Count)> {
        // An entry takes at most 8 bytes
        let start = offset as usize;
        let data = self
            .buffer
            .slice(start, start.saturating_add(frequency as usize * 8));
        CountedGapDecoder::new(data)
            .take(frequency as usize)
            .collect()
    }

    /// Unweighted postings of a list with `frequency` entries
    pub fn ids(&self, offset: u64, frequency: u32) -> Vec<u32> {
        let start = offset as usize;
        let data = self
            .buffer
            .slice(start, start.saturating_add(frequency as usize * 4));
        GapDecoder::new(data).take(frequency as usize).collect()
    }

    /// Unweighted postings stored in `[start, end)`
    pub fn ids_between(&self, start: u64, end: u64) -> Vec<u32> {
        GapDecoder::new(self.buffer.slice(start as usize, end as usize)).collect()
    }
}
