//! Gap encoding of ascending identifier lists

use std::io::{self, Write};

use super::varint::{decode_varint, write_varint};

/// Writes an ascending list of identifiers: the first one as is, the
/// following ones as the difference with their predecessor
#[derive(Default)]
pub struct GapEncoder {
    last: Option<u32>,
}

impl GapEncoder {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Starts a new list
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Writes the next identifier, returning the number of written bytes
    pub fn push<W: Write + ?Sized>(&mut self, writer: &mut W, id: u32) -> io::Result<usize> {
        let value = match self.last {
            None => id,
            Some(last) => id.checked_sub(last).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("identifiers are not ascending ({} after {})", id, last),
                )
            })?,
        };
        self.last = Some(id);
        write_varint(writer, value)
    }
}

/// Iterates over a gap-encoded identifier list
pub struct GapDecoder<'a> {
    data: &'a [u8],
    last: u32,
}

impl<'a> GapDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, last: 0 }
    }

    fn next_value(&mut self) -> Option<u32> {
        let (value, read) = decode_varint(self.data)?;
        self.data = &self.data[read..];
        Some(value)
    }
}

impl<'a> Iterator for GapDecoder<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let gap = self.next_value()?;
        self.last = self.last.checked_add(gap)?;
        Some(self.last)
    }
}

/// Iterates over a gap-encoded identifier list where each identifier is
/// followed by a (plain) count
pub struct CountedGapDecoder<'a> {
    inner: GapDecoder<'a>,
}

impl<'a> CountedGapDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: GapDecoder::new(data),
        }
    }
}

impl<'a> Iterator for CountedGapDecoder<'a> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.inner.next()?;
        let count = self.inner.next_value()?;
        Some((id, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_gaps() {
        let ids = vec![3, 4, 70, 70_000, 5_000_000];
        let mut data = Vec::new();
        let mut encoder = GapEncoder::new();
        for &id in &ids {
            encoder.push(&mut data, id).unwrap();
        }
        // 3, 1, 66 (2 bytes), 69930 (3 bytes), 4930000 (4 bytes)
        assert_eq!(data.len(), 1 + 1 + 2 + 3 + 4);
        assert_eq!(GapDecoder::new(&data).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn test_counted_gaps() {
        let postings = vec![(1, 2), (3, 1), (100, 500)];
        let mut data = Vec::new();
        let mut encoder = GapEncoder::new();
        for &(id, count) in &postings {
            encoder.push(&mut data, id).unwrap();
            write_varint(&mut data, count).unwrap();
        }
        assert_eq!(CountedGapDecoder::new(&data).collect::<Vec<_>>(), postings);
    }

    #[test]
    fn test_random_lists() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let mut postings = Vec::new();
            let mut id = rng.gen_range(0..1000u32);
            for _ in 0..rng.gen_range(0..100) {
                postings.push((id, rng.gen_range(1..100_000u32)));
                id += rng.gen_range(1..50_000);
            }

            let mut data = Vec::new();
            let mut encoder = GapEncoder::new();
            for &(id, count) in &postings {
                encoder.push(&mut data, id).unwrap();
                write_varint(&mut data, count).unwrap();
            }
            assert_eq!(CountedGapDecoder::new(&data).collect::<Vec<_>>(), postings);

            let mut data = Vec::new();
            encoder.reset();
            for &(id, _) in &postings {
                encoder.push(&mut data, id).unwrap();
            }
            let ids: Vec<u32> = postings.iter().map(|(id, _)| *id).collect();
            assert_eq!(GapDecoder::new(&data).collect::<Vec<_>>(), ids);
        }
    }

    #[test]
    fn test_not_ascending() {
        let mut data = Vec::new();
        let mut encoder = GapEncoder::new();
        encoder.push(&mut data, 10).unwrap();
        assert!(encoder.push(&mut data, 9).is_err());

        encoder.reset();
        assert!(encoder.push(&mut data, 9).is_ok());
    }
}
