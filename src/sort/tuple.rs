use std::fmt::Debug;

use byteorder::{BigEndian, ByteOrder};

/// A fixed-width record that can be sorted on disk
///
/// Tuples are ordered by their first field, then by the second one.
pub trait Tuple: Copy + Ord + Debug + Send {
    /// Number of bytes of the serialized tuple
    const SIZE: usize;

    /// The field tuples are grouped by
    fn key(&self) -> u32;

    fn write_to(&self, buffer: &mut [u8]);
    fn read_from(buffer: &[u8]) -> Self;
}

/// Two fields: (product id, review) or (bigram, term)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair(pub u32, pub u32);

impl Tuple for Pair {
    const SIZE: usize = 8;

    #[inline]
    fn key(&self) -> u32 {
        self.0
    }

    fn write_to(&self, buffer: &mut [u8]) {
        BigEndian::write_u32(&mut buffer[0..4], self.0);
        BigEndian::write_u32(&mut buffer[4..8], self.1);
    }

    fn read_from(buffer: &[u8]) -> Self {
        Pair(
            BigEndian::read_u32(&buffer[0..4]),
            BigEndian::read_u32(&buffer[4..8]),
        )
    }
}

/// Three fields: (token, review, occurrences)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Trio(pub u32, pub u32, pub u32);

impl Tuple for Trio {
    const SIZE: usize = 12;

    #[inline]
    fn key(&self) -> u32 {
        self.0
    }

    fn write_to(&self, buffer: &mut [u8]) {
        BigEndian::write_u32(&mut buffer[0..4], self.0);
        BigEndian::write_u32(&mut buffer[4..8], self.1);
        BigEndian::write_u32(&mut buffer[8..12], self.2);
    }

    fn read_from(buffer: &[u8]) -> Self {
        Trio(
            BigEndian::read_u32(&buffer[0..4]),
            BigEndian::read_u32(&buffer[4..8]),
            BigEndian::read_u32(&buffer[8..12]),
        )
    }
}
