/// A wildcard pattern where `*` matches any (possibly empty) sequence
///
/// Patterns are anchored: the whole text must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    pattern: Vec<u8>,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.as_bytes().to_vec(),
        }
    }

    /// Literal parts of the pattern, between wildcards
    pub fn fragments(&self) -> impl Iterator<Item = &[u8]> {
        self.pattern.split(|c| *c == b'*')
    }

    pub fn matches(&self, text: &str) -> bool {
        let (pattern, text) = (&self.pattern[..], text.as_bytes());
        let (mut p, mut t) = (0, 0);
        // Last star position in the pattern, and text position it was
        // matched at
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            if p < pattern.len() && pattern[p] == b'*' {
                backtrack = Some((p, t));
                p += 1;
            } else if p < pattern.len() && pattern[p] == text[t] {
                p += 1;
                t += 1;
            } else if let Some((star, matched)) = backtrack {
                // The star absorbs one more character
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            } else {
                return false;
            }
        }

        pattern[p..].iter().all(|c| *c == b'*')
    }
}
