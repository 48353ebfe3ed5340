//! Permuterm (rotated) lexicon
//!
//! Every rotation of `$term` is indexed, sorted by its text. Only the
//! (term, rotation) pairs are stored: the rotation text is rebuilt from the
//! dictionary when searching. A pattern `X*Y` is rotated into `Y$X*`, so
//! that matching terms are those having a rotation starting with `Y$X`.

use std::{
    cmp::Ordering,
    collections::HashSet,
    fs::File,
    io::{BufWriter, Cursor, Write},
    path::Path,
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use super::{WildcardIndex, WildcardKind};
use crate::{
    base::{TermId, ROTATIONS_FILE},
    dictionary::TermDictionary,
    error::{BuildError, OpenError},
};

const ENTRY_SIZE: usize = 6;

/// A rotation of a term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub term: TermId,
    /// Index of the first character of `$term` in the rotation
    pub index: u16,
}

/// Iterates over the bytes of the rotation of `$term` starting at `index`
fn rotation_bytes(term: &[u8], index: usize) -> impl Iterator<Item = u8> + '_ {
    let marked = std::iter::once(b'$').chain(term.iter().copied());
    let length = term.len() + 1;
    marked.cycle().skip(index).take(length)
}

/// Key searched for a pattern: the longest literal fragment of the rotated
/// `$pattern` (rotated after its first wildcard)
pub fn search_key(pattern: &str) -> Vec<u8> {
    let marked: Vec<u8> = std::iter::once(b'$').chain(pattern.bytes()).collect();
    let rotated: Vec<u8> = match marked.iter().position(|c| *c == b'*') {
        Some(star) => marked[star + 1..]
            .iter()
            .chain(marked[..=star].iter())
            .copied()
            .collect(),
        None => marked,
    };

    let mut longest: &[u8] = &[];
    for fragment in rotated.split(|c| *c == b'*') {
        if fragment.len() > longest.len() {
            longest = fragment;
        }
    }
    longest.to_vec()
}

pub(crate) fn build<S: AsRef<str>>(terms: &[S], folder: &Path) -> Result<(), BuildError> {
    let mut rotations = Vec::with_capacity(terms.iter().map(|t| t.as_ref().len() + 1).sum());
    for (id, term) in terms.iter().enumerate() {
        let length = term.as_ref().len();
        if length > u16::MAX as usize {
            return Err(BuildError::TermTooLong {
                term: term.as_ref().to_string(),
                length,
            });
        }
        for index in 0..=length {
            rotations.push(Rotation {
                term: id as TermId,
                index: index as u16,
            });
        }
    }

    // Rotations are compared without materializing them
    rotations.sort_by(|a, b| {
        let a_term = terms[a.term as usize].as_ref().as_bytes();
        let b_term = terms[b.term as usize].as_ref().as_bytes();
        rotation_bytes(a_term, a.index as usize).cmp(rotation_bytes(b_term, b.index as usize))
    });

    let file = File::options()
        .write(true)
        .create(true)
        .truncate(true)
        .open(folder.join(ROTATIONS_FILE))?;
    let mut out = BufWriter::new(file);
    out.write_u32::<BigEndian>(rotations.len() as u32)?;
    for rotation in rotations.iter() {
        out.write_u32::<BigEndian>(rotation.term)?;
        out.write_u16::<BigEndian>(rotation.index)?;
    }
    out.flush()?;

    info!("Permuterm index: {} rotations", rotations.len());
    Ok(())
}

pub struct PermutermIndex {
    rotations: Vec<Rotation>,
}

impl PermutermIndex {
    pub fn open(folder: &Path, term_count: usize) -> Result<Self, OpenError> {
        let path = folder.join(ROTATIONS_FILE);
        let data = OpenError::read(&path)?;
        let mut cursor = Cursor::new(&data[..]);
        let count = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| OpenError::corrupt(&path, "missing header"))? as usize;
        if data.len() != 4 + count * ENTRY_SIZE {
            return Err(OpenError::corrupt(
                &path,
                format!("expected {} rotations", count),
            ));
        }

        let mut rotations = Vec::with_capacity(count);
        for _ in 0..count {
            let term = cursor.read_u32::<BigEndian>().map_err(|e| OpenError::io(&path, e))?;
            let index = cursor.read_u16::<BigEndian>().map_err(|e| OpenError::io(&path, e))?;
            if term as usize >= term_count {
                return Err(OpenError::corrupt(&path, format!("unknown term {}", term)));
            }
            rotations.push(Rotation { term, index });
        }

        Ok(Self { rotations })
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }

    /// Compares the rotation with the key, `Equal` if it starts with the key
    fn compare(&self, position: usize, key: &[u8], dictionary: &TermDictionary) -> Ordering {
        let rotation = self.rotations[position];
        let term = match dictionary.term(rotation.term) {
            Some(term) => term,
            None => return Ordering::Less,
        };
        // A rotation shorter than the key compares as smaller
        rotation_bytes(term.as_bytes(), rotation.index as usize)
            .take(key.len())
            .cmp(key.iter().copied())
    }

    /// Finds a rotation starting with the key
    pub fn search(&self, key: &[u8], dictionary: &TermDictionary) -> Option<usize> {
        let (mut low, mut high) = (0, self.rotations.len());
        while low < high {
            let mid = low + (high - low) / 2;
            match self.compare(mid, key, dictionary) {
                Ordering::Equal => return Some(mid),
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
            }
        }
        None
    }
}

impl WildcardIndex for PermutermIndex {
    fn kind(&self) -> WildcardKind {
        WildcardKind::Permuterm
    }

    fn candidates(&self, pattern: &str, dictionary: &TermDictionary) -> HashSet<TermId> {
        let key = search_key(pattern);
        let mut candidates = HashSet::new();
        let hit = match self.search(&key, dictionary) {
            Some(hit) => hit,
            None => return candidates,
        };

        // All the matching rotations are contiguous around the hit
        candidates.insert(self.rotations[hit].term);
        for position in (0..hit).rev() {
            if self.compare(position, &key, dictionary) != Ordering::Equal {
                break;
            }
            candidates.insert(self.rotations[position].term);
        }
        for position in hit + 1..self.rotations.len() {
            if self.compare(position, &key, dictionary) != Ordering::Equal {
                break;
            }
            candidates.insert(self.rotations[position].term);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation(term: &str, index: usize) -> String {
        String::from_utf8(rotation_bytes(term.as_bytes(), index).collect()).unwrap()
    }

    #[test]
    fn test_rotations() {
        assert_eq!(rotation("cat", 0), "$cat");
        assert_eq!(rotation("cat", 1), "cat$");
        assert_eq!(rotation("cat", 3), "t$ca");
        assert_eq!(rotation("", 0), "$");
    }

    #[test]
    fn test_search_key() {
        assert_eq!(search_key("ca*"), b"$ca".to_vec());
        assert_eq!(search_key("*at"), b"at$".to_vec());
        assert_eq!(search_key("c*t"), b"t$c".to_vec());
        assert_eq!(search_key("a*b*cd"), b"cd$a".to_vec());
        assert_eq!(search_key("*"), b"$".to_vec());
        assert_eq!(search_key("cat"), b"$cat".to_vec());
    }
}
