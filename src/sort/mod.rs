//! Bounded-memory sort of fixed-width tuples
//!
//! Tuples are accumulated in memory up to the memory budget, then sorted
//! and flushed as a run. Runs are merged M-1 at a time (M being the number
//! of I/O blocks that fit in the budget) until a single run remains.

mod tuple;

pub use tuple::{Pair, Trio, Tuple};

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    fs,
    io,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::utils::block::{TupleReader, TupleWriter};

pub struct ExternalSorter<T: Tuple> {
    folder: PathBuf,
    prefix: String,
    buffer: Vec<T>,
    /// Maximum number of tuples held in memory
    capacity: usize,
    io_block_size: usize,
    /// Number of runs merged together
    fan_in: usize,
    runs: Vec<PathBuf>,
    count: u64,
}

impl<T: Tuple> ExternalSorter<T> {
    /// Creates a sorter whose runs are stored in `folder`
    ///
    /// The run buffer is allocated once and never exceeds the budget. The
    /// fan-in is derived from the budget: `memory_budget / io_block_size`
    /// blocks fit in memory, one of them being used for output.
    pub fn new(folder: &Path, prefix: &str, memory_budget: usize, io_block_size: usize) -> Self {
        let blocks = memory_budget / io_block_size.max(1);
        let capacity = (memory_budget / std::mem::size_of::<T>().max(T::SIZE)).max(1);
        Self {
            folder: folder.to_path_buf(),
            prefix: prefix.to_string(),
            buffer: Vec::with_capacity(capacity),
            capacity,
            io_block_size,
            fan_in: blocks.saturating_sub(1).max(2),
            runs: Vec::new(),
            count: 0,
        }
    }

    fn run_path(&self, generation: usize, index: usize) -> PathBuf {
        self.folder
            .join(format!("{}_{}_{}.run", self.prefix, generation, index))
    }

    pub fn push(&mut self, tuple: T) -> io::Result<()> {
        self.buffer.push(tuple);
        self.count += 1;
        if self.buffer.len() >= self.capacity {
            self.flush_run()?;
        }
        Ok(())
    }

    /// Number of tuples pushed so far
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sorts the in-memory tuples and writes them as a new run
    fn flush_run(&mut self) -> io::Result<()> {
        self.buffer.sort_unstable();
        let path = self.run_path(0, self.runs.len());
        debug!(
            "[{}] writing run {} ({} tuples)",
            self.prefix,
            self.runs.len(),
            self.buffer.len()
        );

        let mut writer = TupleWriter::<T>::create(&path, self.io_block_size)?;
        for tuple in self.buffer.iter() {
            writer.write(tuple)?;
        }
        writer.finish()?;

        self.buffer.clear();
        self.runs.push(path);
        Ok(())
    }

    /// Merges all the runs and returns the path of the final sorted run
    ///
    /// The caller owns the returned file and should remove it once consumed.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        if !self.buffer.is_empty() || self.runs.is_empty() {
            self.flush_run()?;
        }
        // Releases the memory before merging
        self.buffer = Vec::new();

        let mut runs = std::mem::take(&mut self.runs);
        let mut generation = 0;
        while runs.len() > 1 {
            generation += 1;
            debug!(
                "[{}] merge generation {}: {} runs, fan-in {}",
                self.prefix,
                generation,
                runs.len(),
                self.fan_in
            );

            let mut merged = Vec::with_capacity(runs.len() / self.fan_in + 1);
            for (index, group) in runs.chunks(self.fan_in).enumerate() {
                let output = self.run_path(generation, index);
                merge_runs::<T>(group, &output, self.io_block_size)?;
                for path in group {
                    fs::remove_file(path)?;
                }
                merged.push(output);
            }
            runs = merged;
        }

        info!(
            "[{}] sorted {} tuples in {} merge generation(s)",
            self.prefix, self.count, generation
        );

        // There is always at least one run at this point
        runs.pop().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "external sort produced no run")
        })
    }
}

/// k-way merge of sorted runs into `output`, returns the number of tuples
fn merge_runs<T: Tuple>(inputs: &[PathBuf], output: &Path, io_block_size: usize) -> io::Result<u64> {
    let mut readers = inputs
        .iter()
        .map(|path| TupleReader::<T>::open(path, io_block_size))
        .collect::<io::Result<Vec<_>>>()?;

    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (ix, reader) in readers.iter_mut().enumerate() {
        if let Some(tuple) = reader.read()? {
            heap.push(Reverse((tuple, ix)));
        }
    }

    let mut writer = TupleWriter::<T>::create(output, io_block_size)?;
    while let Some(Reverse((tuple, ix))) = heap.pop() {
        writer.write(&tuple)?;
        if let Some(next) = readers[ix].read()? {
            heap.push(Reverse((next, ix)));
        }
    }

    writer.finish()
}

/// Reads a whole run (test helper)
#[cfg(test)]
pub(crate) fn read_run<T: Tuple>(path: &Path) -> io::Result<Vec<T>> {
    let mut reader = TupleReader::<T>::open(path, 4096)?;
    let mut tuples = Vec::new();
    while let Some(tuple) = reader.read()? {
        tuples.push(tuple);
    }
    Ok(tuples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rstest::rstest;
    use temp_dir::TempDir;

    #[rstest]
    #[case(1_000_000, 4000)]
    // 10 trios per run, fan-in 2
    #[case(120, 36)]
    // 2 trios per run, fan-in 3: several generations
    #[case(24, 6)]
    fn test_sort_trios(#[case] memory_budget: usize, #[case] io_block_size: usize) {
        let dir = TempDir::new().unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let mut expected = Vec::new();
        let mut sorter = ExternalSorter::<Trio>::new(dir.path(), "trios", memory_budget, io_block_size);
        for _ in 0..500 {
            let trio = Trio(rng.gen_range(0..20), rng.gen_range(0..50), rng.gen_range(1..5));
            expected.push(trio);
            sorter.push(trio).unwrap();
        }
        assert_eq!(sorter.len(), 500);

        let path = sorter.finish().unwrap();
        expected.sort();
        assert_eq!(read_run::<Trio>(&path).unwrap(), expected);

        // Only the final run is left
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    fn resident<T: Tuple>(sorter: &ExternalSorter<T>) -> usize {
        sorter.buffer.capacity() * std::mem::size_of::<T>()
    }

    #[rstest]
    #[case(5_000_000)]
    #[case(1000)]
    #[case(100)]
    fn test_budget(#[case] memory_budget: usize) {
        let dir = TempDir::new().unwrap();
        // Sorters running together share the budget
        let mut pairs = ExternalSorter::<Pair>::new(dir.path(), "pairs", memory_budget / 2, 10);
        let mut trios = ExternalSorter::<Trio>::new(dir.path(), "trios", memory_budget / 2, 10);

        for i in 0..(memory_budget / Trio::SIZE) as u32 + 10 {
            pairs.push(Pair(i % 7, i)).unwrap();
            trios.push(Trio(i % 7, i, 1)).unwrap();
            assert!(resident(&pairs) + resident(&trios) <= memory_budget);
        }
        assert!(resident(&pairs) <= memory_budget / 2);
        assert!(resident(&trios) <= memory_budget / 2);
    }

    #[test]
    fn test_sort_empty() {
        let dir = TempDir::new().unwrap();
        let sorter = ExternalSorter::<Pair>::new(dir.path(), "pairs", 64, 16);
        let path = sorter.finish().unwrap();
        assert!(read_run::<Pair>(&path).unwrap().is_empty());
    }

    #[test]
    fn test_sort_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut sorter = ExternalSorter::<Pair>::new(dir.path(), "pairs", 16, 8);
        for pair in [Pair(3, 1), Pair(1, 2), Pair(3, 1), Pair(1, 1), Pair(2, 0)] {
            sorter.push(pair).unwrap();
        }
        let path = sorter.finish().unwrap();
        assert_eq!(
            read_run::<Pair>(&path).unwrap(),
            vec![Pair(1, 1), Pair(1, 2), Pair(2, 0), Pair(3, 1), Pair(3, 1)]
        );
    }
}
