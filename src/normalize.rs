/// Default upper bound on query length, in characters.
pub const DEFAULT_MAX_QUERY_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Query must be a non-empty string")]
    Empty,
    #[error("Query is {len} characters long (limit {max})")]
    TooLong { len: usize, max: usize },
}

/// A trimmed, length-checked query. Construct through [`QueryNormalizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery(String);

impl NormalizedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trims the caller's text and enforces the length bound.
///
/// Over-long input is rejected, never truncated, and the text is otherwise
/// passed through untouched: fixing math syntax is the engine's job.
#[derive(Debug, Clone, Copy)]
pub struct QueryNormalizer {
    max_chars: usize,
}

impl QueryNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn normalize(&self, raw: &str) -> Result<NormalizedQuery, NormalizeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NormalizeError::Empty);
        }

        let len = trimmed.chars().count();
        if len > self.max_chars {
            return Err(NormalizeError::TooLong {
                len,
                max: self.max_chars,
            });
        }

        Ok(NormalizedQuery(trimmed.to_string()))
    }
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUERY_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_but_does_not_rewrite() {
        let q = QueryNormalizer::default().normalize("  integrate x^2 dx \n").unwrap();
        assert_eq!(q.as_str(), "integrate x^2 dx");

        let q = QueryNormalizer::default().normalize("2 +  2").unwrap();
        assert_eq!(q.as_str(), "2 +  2");
    }

    #[test]
    fn blank_input_is_rejected() {
        for raw in ["", "   ", "\t\n"] {
            assert_eq!(
                QueryNormalizer::default().normalize(raw),
                Err(NormalizeError::Empty)
            );
        }
    }

    #[test]
    fn length_is_counted_in_characters_after_trimming() {
        let normalizer = QueryNormalizer::new(3);
        assert!(normalizer.normalize("  πππ  ").is_ok());
        assert_eq!(
            normalizer.normalize("ππππ"),
            Err(NormalizeError::TooLong { len: 4, max: 3 })
        );
    }
}
