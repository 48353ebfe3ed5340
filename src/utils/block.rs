//! Streaming of fixed-width tuples through fixed-size byte blocks
//!
//! Readers and writers own their block buffer: at most one block per
//! stream is resident in memory.

use std::{
    fs::File,
    io::{self, Read, Write},
    marker::PhantomData,
    path::Path,
};

use crate::sort::Tuple;

/// Number of bytes of a block holding whole tuples
#[inline]
pub fn block_capacity<T: Tuple>(io_block_size: usize) -> usize {
    (io_block_size / T::SIZE).max(1) * T::SIZE
}

/// Writes tuples to a file, one block at a time
pub struct TupleWriter<T: Tuple> {
    file: File,
    block: Vec<u8>,
    capacity: usize,
    written: u64,
    _marker: PhantomData<T>,
}

impl<T: Tuple> TupleWriter<T> {
    pub fn create(path: &Path, io_block_size: usize) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let capacity = block_capacity::<T>(io_block_size);

        Ok(Self {
            file,
            block: Vec::with_capacity(capacity),
            capacity,
            written: 0,
            _marker: PhantomData,
        })
    }

    pub fn write(&mut self, tuple: &T) -> io::Result<()> {
        if self.block.len() + T::SIZE > self.capacity {
            self.flush_block()?;
        }
        let start = self.block.len();
        self.block.resize(start + T::SIZE, 0);
        tuple.write_to(&mut self.block[start..]);
        self.written += 1;
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if !self.block.is_empty() {
            self.file.write_all(&self.block)?;
            self.block.clear();
        }
        Ok(())
    }

    /// Flushes the last block and returns the number of written tuples
    pub fn finish(mut self) -> io::Result<u64> {
        self.flush_block()?;
        self.file.flush()?;
        Ok(self.written)
    }
}

/// Reads tuples from a file, one block at a time
pub struct TupleReader<T: Tuple> {
    file: File,
    block: Vec<u8>,
    position: usize,
    filled: usize,
    peeked: Option<T>,
    exhausted: bool,
}

impl<T: Tuple> TupleReader<T> {
    pub fn open(path: &Path, io_block_size: usize) -> io::Result<Self> {
        let file = File::options().read(true).open(path)?;
        Ok(Self {
            file,
            block: vec![0; block_capacity::<T>(io_block_size)],
            position: 0,
            filled: 0,
            peeked: None,
            exhausted: false,
        })
    }

    /// Reads the next block, returns false if the end of file was reached
    fn fill_block(&mut self) -> io::Result<bool> {
        let mut filled = 0;
        while filled < self.block.len() {
            match self.file.read(&mut self.block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled % T::SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "run file ends with a truncated tuple",
            ));
        }

        self.position = 0;
        self.filled = filled;
        Ok(filled > 0)
    }

    fn read_next(&mut self) -> io::Result<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.position >= self.filled && !self.fill_block()? {
            self.exhausted = true;
            return Ok(None);
        }

        let tuple = T::read_from(&self.block[self.position..self.position + T::SIZE]);
        self.position += T::SIZE;
        Ok(Some(tuple))
    }

    /// Returns the next tuple without consuming it
    pub fn peek(&mut self) -> io::Result<Option<&T>> {
        if self.peeked.is_none() {
            self.peeked = self.read_next()?;
        }
        Ok(self.peeked.as_ref())
    }

    pub fn read(&mut self) -> io::Result<Option<T>> {
        match self.peeked.take() {
            Some(tuple) => Ok(Some(tuple)),
            None => self.read_next(),
        }
    }
}
