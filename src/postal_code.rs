//! Postal code and forward sortation area (FSA) extraction from free-text addresses.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Canada Post never uses D, F, I, O, Q, U, W or Z as the first letter.
pub const CANADA_FSA_PATTERN: &str = r"[ABCEGHJ-NPRSTVXY]\d[ABCEGHJ-NPRSTV-Z]";
pub const CANADA_POSTAL_CODE_PATTERN: &str =
    r"[ABCEGHJ-NPRSTVXY]\d[ABCEGHJ-NPRSTV-Z][ -]?\d[ABCEGHJ-NPRSTV-Z]\d";
pub const CANADA_FSA_LEN: usize = 3;

static CANADA: LazyLock<PostalPatterns> = LazyLock::new(|| {
    PostalPatterns::new(CANADA_FSA_PATTERN, CANADA_POSTAL_CODE_PATTERN, CANADA_FSA_LEN).unwrap()
});

/// The regional patterns used to pull postal codes out of addresses.
/// Both patterns are matched case-insensitively.
#[derive(Clone, Debug)]
pub struct PostalPatterns {
    fsa: Regex,
    postal_code: Regex,
    /// Where the normalized postal code gets its separating space
    fsa_len: usize,
}

impl PostalPatterns {
    pub fn new(fsa: &str, postal_code: &str, fsa_len: usize) -> Result<Self, regex::Error> {
        Ok(PostalPatterns {
            fsa: RegexBuilder::new(fsa).case_insensitive(true).build()?,
            postal_code: RegexBuilder::new(postal_code)
                .case_insensitive(true)
                .build()?,
            fsa_len,
        })
    }

    pub fn canada() -> Self {
        CANADA.clone()
    }

    /// First FSA-looking token in the address, uppercased.
    pub fn fsa(&self, address: &str) -> Option<String> {
        self.fsa
            .find(address)
            .map(|m| m.as_str().to_uppercase())
    }

    /// First full postal code in the address, normalized to `"A1A 1A1"`.
    pub fn postal_code(&self, address: &str) -> Option<String> {
        let found = self.postal_code.find(address)?;

        let compact: String = found
            .as_str()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_uppercase)
            .collect();

        let split = compact
            .char_indices()
            .nth(self.fsa_len)
            .map(|(i, _)| i)
            .unwrap_or(compact.len());
        let (fsa, ldu) = compact.split_at(split);

        if ldu.is_empty() {
            return Some(fsa.to_string());
        }

        Some(format!("{fsa} {ldu}"))
    }
}

#[cfg(test)]
mod tests {
    use super::PostalPatterns;

    #[test]
    fn test_extracts_fsa_and_postal_code() {
        let patterns = PostalPatterns::canada();
        let address = "123 Queen St W, Toronto, ON m5h2n2, Canada";

        assert_eq!(patterns.fsa(address).as_deref(), Some("M5H"));
        assert_eq!(patterns.postal_code(address).as_deref(), Some("M5H 2N2"));
    }

    #[test]
    fn test_accepts_dash_separator() {
        let patterns = PostalPatterns::canada();

        assert_eq!(
            patterns.postal_code("45 Elm Ave, Ottawa K1a-0b1").as_deref(),
            Some("K1A 0B1")
        );
    }

    #[test]
    fn test_no_postal_code_is_none() {
        let patterns = PostalPatterns::canada();
        let address = "123 Main Street, Springfield";

        assert_eq!(patterns.fsa(address), None);
        assert_eq!(patterns.postal_code(address), None);
    }

    #[test]
    fn test_rejects_forbidden_first_letter() {
        let patterns = PostalPatterns::canada();

        assert_eq!(patterns.fsa("D5H 2N2"), None);
        assert_eq!(patterns.postal_code("Z5H 2N2"), None);
    }

    #[test]
    fn test_postal_code_is_idempotent() {
        let patterns = PostalPatterns::canada();

        let once = patterns.postal_code("Unit 4, 90 Bay St, Toronto M5J2J3").unwrap();
        let twice = patterns.postal_code(&once).unwrap();

        assert_eq!(once, "M5J 2J3");
        assert_eq!(once, twice);
    }
}
