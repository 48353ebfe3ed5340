//! Fixed-width storage of per-review metadata
//!
//! The file starts with the number of reviews (u32) and the total number
//! of tokens (u64), followed by one 14-byte row per review.

use std::{
    fs::File,
    io::{self, BufWriter, Cursor, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{base::Len, error::OpenError};

const HEADER_SIZE: usize = 12;
const ROW_SIZE: usize = 14;

/// Metadata of one review, as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredReview {
    /// Product id, as a (block, position) in the product dictionary
    pub product_block: u32,
    pub product_position: u8,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub score: u8,
    /// Number of tokens
    pub length: u32,
}

impl StoredReview {
    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_u32::<BigEndian>(self.product_block)?;
        out.write_u8(self.product_position)?;
        out.write_u16::<BigEndian>(self.helpfulness_numerator)?;
        out.write_u16::<BigEndian>(self.helpfulness_denominator)?;
        out.write_u8(self.score)?;
        out.write_u32::<BigEndian>(self.length)
    }

    fn read_from(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(Self {
            product_block: cursor.read_u32::<BigEndian>()?,
            product_position: cursor.read_u8()?,
            helpfulness_numerator: cursor.read_u16::<BigEndian>()?,
            helpfulness_denominator: cursor.read_u16::<BigEndian>()?,
            score: cursor.read_u8()?,
            length: cursor.read_u32::<BigEndian>()?,
        })
    }
}

/// Appends reviews to the review file
pub struct ReviewWriter {
    out: BufWriter<File>,
    count: u32,
    total_tokens: u64,
}

impl ReviewWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::new(file);

        // The header is written when closing
        out.write_all(&[0; HEADER_SIZE])?;
        Ok(Self {
            out,
            count: 0,
            total_tokens: 0,
        })
    }

    pub fn add(&mut self, review: &StoredReview) -> io::Result<()> {
        self.count = self.count.checked_add(1).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "too many reviews")
        })?;
        self.total_tokens += review.length as u64;
        review.write_to(&mut self.out)
    }

    /// Writes the header and returns (review count, total tokens)
    pub fn finish(self) -> io::Result<(u32, u64)> {
        let mut file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        file.write_u32::<BigEndian>(self.count)?;
        file.write_u64::<BigEndian>(self.total_tokens)?;
        file.flush()?;
        Ok((self.count, self.total_tokens))
    }
}

/// In-memory copy of the review file
pub struct ReviewStore {
    data: Vec<u8>,
    count: u32,
    total_tokens: u64,
}

impl ReviewStore {
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        let data = OpenError::read(path)?;
        let corrupt = |reason: String| OpenError::Corrupt {
            path: PathBuf::from(path),
            reason,
        };

        if data.len() < HEADER_SIZE {
            return Err(corrupt(format!("{} bytes is too short for a header", data.len())));
        }
        let mut cursor = Cursor::new(&data[..HEADER_SIZE]);
        let count = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| corrupt(e.to_string()))?;
        let total_tokens = cursor
            .read_u64::<BigEndian>()
            .map_err(|e| corrupt(e.to_string()))?;

        let expected = HEADER_SIZE + ROW_SIZE * count as usize;
        if data.len() != expected {
            return Err(corrupt(format!(
                "expected {} bytes for {} reviews, got {}",
                expected,
                count,
                data.len()
            )));
        }

        Ok(Self {
            data,
            count,
            total_tokens,
        })
    }

    pub fn review_count(&self) -> u32 {
        self.count
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Review at the given 0-based index
    pub fn get(&self, index: usize) -> Option<StoredReview> {
        if index >= self.count as usize {
            return None;
        }
        let start = HEADER_SIZE + index * ROW_SIZE;
        StoredReview::read_from(&self.data[start..start + ROW_SIZE]).ok()
    }
}

impl Len for ReviewStore {
    fn len(&self) -> usize {
        self.count as usize
    }
}
