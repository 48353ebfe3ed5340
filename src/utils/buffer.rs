//! Read-only views over posting files
//!
//! Postings are read by slicing a buffer at a known offset, so concurrent
//! readers never share a file cursor.

use memmap2::{Mmap, MmapOptions};
use std::path::Path;

use crate::error::OpenError;

pub trait Buffer: Send + Sync {
    /// The whole content of the buffer
    fn data(&'_ self) -> &'_ [u8];

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the bytes in `[start, end)`, clipped to the buffer size
    fn slice(&'_ self, start: usize, end: usize) -> &'_ [u8] {
        let data = self.data();
        let end = end.min(data.len());
        let start = start.min(end);
        &data[start..end]
    }
}

/// Stores the data in memory
pub struct MemoryBuffer {
    data: Vec<u8>,
}

impl MemoryBuffer {
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        Ok(Self {
            data: OpenError::read(path)?,
        })
    }
}

impl Buffer for MemoryBuffer {
    fn data(&'_ self) -> &'_ [u8] {
        &self.data
    }
}

/// Uses a memory map
pub struct MmapBuffer {
    /// Empty files cannot be mapped
    mmap: Option<Mmap>,
}

impl MmapBuffer {
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        let file = OpenError::open(path)?;
        let length = file.metadata().map_err(|e| OpenError::io(path, e))?.len();
        if length == 0 {
            return Ok(Self { mmap: None });
        }

        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| OpenError::io(path, e))?;
        Ok(Self { mmap: Some(mmap) })
    }
}

impl Buffer for MmapBuffer {
    fn data(&'_ self) -> &'_ [u8] {
        match &self.mmap {
            Some(mmap) => &mmap[..],
            None => &[],
        }
    }
}

/// Opens a posting file, either in memory or memory-mapped
pub fn open_buffer(path: &Path, in_memory: bool) -> Result<Box<dyn Buffer>, OpenError> {
    if in_memory {
        Ok(Box::new(MemoryBuffer::open(path)?))
    } else {
        Ok(Box::new(MmapBuffer::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn test_buffers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"0123456789").unwrap();

        for in_memory in [true, false] {
            let buffer = open_buffer(&path, in_memory).unwrap();
            assert_eq!(buffer.len(), 10);
            assert_eq!(buffer.slice(2, 5), b"234");
            assert_eq!(buffer.slice(8, 20), b"89");
            assert!(buffer.slice(12, 20).is_empty());
        }
    }

    #[test]
    fn test_empty_and_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert!(MmapBuffer::open(&path).unwrap().is_empty());

        let missing = dir.path().join("missing");
        assert!(matches!(
            MmapBuffer::open(&missing),
            Err(OpenError::Missing { .. })
        ));
    }
}
