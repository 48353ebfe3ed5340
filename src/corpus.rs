//! Review records and their sources
//!
//! [ReviewFile] reads the SNAP Amazon review format, where each review is
//! a set of `field: value` lines starting with `product/productId`.

use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// A review, as given to the indexer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ReviewRecord {
    pub product_id: String,
    /// Score between 0 and 5
    pub score: u8,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub text: String,
}

impl ReviewRecord {
    pub fn new(product_id: &str, score: u8, helpfulness: (u16, u16), text: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            score,
            helpfulness_numerator: helpfulness.0,
            helpfulness_denominator: helpfulness.1,
            text: text.to_string(),
        }
    }

    /// Case-folded tokens of the review text
    pub fn tokens(&self) -> impl Iterator<Item = String> + '_ {
        tokenize(&self.text)
    }
}

/// Splits a text on every character that is not an ASCII letter or digit,
/// and lower-cases the tokens
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

pub type ReviewIterator<'a> = Box<dyn Iterator<Item = Result<ReviewRecord, BuildError>> + 'a>;

/// An ordered sequence of reviews that can be read several times
pub trait ReviewSource {
    /// Starts a new pass over the reviews
    fn reviews(&self) -> Result<ReviewIterator<'_>, BuildError>;
}

impl ReviewSource for [ReviewRecord] {
    fn reviews(&self) -> Result<ReviewIterator<'_>, BuildError> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}

impl ReviewSource for Vec<ReviewRecord> {
    fn reviews(&self) -> Result<ReviewIterator<'_>, BuildError> {
        self.as_slice().reviews()
    }
}

/// Reviews stored in a SNAP formatted text file
pub struct ReviewFile {
    path: PathBuf,
}

impl ReviewFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl ReviewSource for ReviewFile {
    fn reviews(&self) -> Result<ReviewIterator<'_>, BuildError> {
        let file = File::options().read(true).open(&self.path)?;
        Ok(Box::new(ReviewParser::new(BufReader::new(file))))
    }
}

const PRODUCT_ID: &str = "product/productId:";
const HELPFULNESS: &str = "review/helpfulness:";
const SCORE: &str = "review/score:";
const TEXT: &str = "review/text:";

/// Parses reviews from SNAP formatted lines
pub struct ReviewParser<R: BufRead> {
    lines: Lines<R>,
    line: usize,
    current: Option<ReviewRecord>,
    /// True while reading the (multi-line) review text
    in_text: bool,
}

impl<R: BufRead> ReviewParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            current: None,
            in_text: false,
        }
    }

    fn error(&self, message: String) -> BuildError {
        BuildError::Corpus {
            line: self.line,
            message,
        }
    }

    /// Handles one line of the current review
    fn parse_field(&mut self, line: &str) -> Result<(), BuildError> {
        if let Some(value) = line.strip_prefix(HELPFULNESS) {
            let value = value.trim();
            let parsed = value
                .split_once('/')
                .and_then(|(a, b)| Some((a.trim().parse().ok()?, b.trim().parse().ok()?)));
            let (numerator, denominator) =
                parsed.ok_or_else(|| self.error(format!("invalid helpfulness '{}'", value)))?;
            if let Some(review) = self.current.as_mut() {
                review.helpfulness_numerator = numerator;
                review.helpfulness_denominator = denominator;
            }
            self.in_text = false;
        } else if let Some(value) = line.strip_prefix(SCORE) {
            let value = value.trim();
            let score = value
                .parse::<f32>()
                .ok()
                .filter(|s| (0. ..6.).contains(s))
                .ok_or_else(|| self.error(format!("invalid score '{}'", value)))?;
            if let Some(review) = self.current.as_mut() {
                review.score = score as u8;
            }
            self.in_text = false;
        } else if let Some(value) = line.strip_prefix(TEXT) {
            if let Some(review) = self.current.as_mut() {
                review.text = value.trim_start().to_string();
            }
            self.in_text = true;
        } else if line.starts_with("review/") || line.starts_with("product/") {
            self.in_text = false;
        } else if self.in_text {
            if let Some(review) = self.current.as_mut() {
                review.text.push('\n');
                review.text.push_str(line);
            }
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for ReviewParser<R> {
    type Item = Result<ReviewRecord, BuildError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next() {
                None => return self.current.take().map(Ok),
                Some(Err(e)) => return Some(Err(e.into())),
                Some(Ok(line)) => line,
            };
            self.line += 1;

            if let Some(product_id) = line.strip_prefix(PRODUCT_ID) {
                let review = ReviewRecord {
                    product_id: product_id.trim().to_string(),
                    ..Default::default()
                };
                self.in_text = false;
                if let Some(finished) = self.current.replace(review) {
                    return Some(Ok(finished));
                }
            } else if self.current.is_some() {
                if let Err(e) = self.parse_field(&line) {
                    return Some(Err(e));
                }
            }
        }
    }
}
