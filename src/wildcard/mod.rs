//! Wildcard term resolution
//!
//! Two structures can be built alongside the token dictionary. Both return
//! a superset of the matching terms, which is then filtered by matching
//! each candidate against the pattern.

pub mod bigram;
mod pattern;
pub mod permuterm;

pub use pattern::WildcardPattern;

use std::{collections::HashSet, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    base::TermId,
    builder::BuilderOptions,
    dictionary::TermDictionary,
    error::{BuildError, OpenError},
};

/// The structure used to answer wildcard queries
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WildcardKind {
    /// Maps each pair of characters to the terms containing it
    #[default]
    Bigram,
    /// Sorted rotations of every term
    Permuterm,
}

impl fmt::Display for WildcardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bigram => write!(f, "bigram"),
            Self::Permuterm => write!(f, "permuterm"),
        }
    }
}

impl FromStr for WildcardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bigram" => Ok(Self::Bigram),
            "permuterm" | "rotated" => Ok(Self::Permuterm),
            _ => Err(format!(
                "unknown wildcard structure '{}' (valid: bigram, permuterm)",
                s
            )),
        }
    }
}

pub trait WildcardIndex: Send + Sync {
    fn kind(&self) -> WildcardKind;

    /// Returns a superset of the terms matching the (lower-cased) pattern
    fn candidates(&self, pattern: &str, dictionary: &TermDictionary) -> HashSet<TermId>;
}

/// Builds the wildcard structure for the (sorted) token vocabulary
pub fn build_wildcard_index<S: AsRef<str>>(
    kind: WildcardKind,
    terms: &[S],
    folder: &Path,
    work_folder: &Path,
    options: &BuilderOptions,
) -> Result<(), BuildError> {
    match kind {
        WildcardKind::Bigram => bigram::build(terms, folder, work_folder, options),
        WildcardKind::Permuterm => permuterm::build(terms, folder),
    }
}

pub fn open_wildcard_index(
    kind: WildcardKind,
    folder: &Path,
    term_count: usize,
    in_memory: bool,
) -> Result<Box<dyn WildcardIndex>, OpenError> {
    Ok(match kind {
        WildcardKind::Bigram => Box::new(bigram::BigramIndex::open(folder, term_count, in_memory)?),
        WildcardKind::Permuterm => Box::new(permuterm::PermutermIndex::open(folder, term_count)?),
    })
}

/// Terms matching the pattern, in increasing order
pub fn matching_terms(
    index: &dyn WildcardIndex,
    pattern: &str,
    dictionary: &TermDictionary,
) -> Vec<TermId> {
    let matcher = WildcardPattern::new(pattern);
    let mut terms: Vec<TermId> = index
        .candidates(pattern, dictionary)
        .into_iter()
        .filter(|id| {
            dictionary
                .term(*id)
                .map_or(false, |term| matcher.matches(&term))
        })
        .collect();
    terms.sort_unstable();
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!("bigram".parse::<WildcardKind>(), Ok(WildcardKind::Bigram));
        assert_eq!("Permuterm".parse::<WildcardKind>(), Ok(WildcardKind::Permuterm));
        assert!("trigram".parse::<WildcardKind>().is_err());
        assert_eq!(WildcardKind::Permuterm.to_string(), "permuterm");
        assert_eq!(WildcardKind::default(), WildcardKind::Bigram);
    }
}
