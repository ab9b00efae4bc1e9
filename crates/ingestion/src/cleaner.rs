//! Extracted-text cleanup
//!
//! Removes PDF extraction debris before chunking: page numbers, table of
//! contents leaders, bibliographic boilerplate and mis-extracted bullets.

use crate::errors::IngestionError;
use regex_lite::Regex;

/// Compiled cleanup patterns
pub struct TextCleaner {
    toc_leader: Regex,
    isbn: Regex,
    legal_deposit: Regex,
    page_number_line: Regex,
    stray_numbers: Regex,
    bang_bullet: Regex,
    horizontal_space: Regex,
    blank_lines: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, IngestionError> {
        Ok(Self {
            // "1.2 Assessment ........ 14"
            toc_leader: Regex::new(r"(?m)^.*\.{3,}[ \t]*\d+[ \t]*$")?,
            isbn: Regex::new(r"(?i)ISBN[\s:\d\-]+")?,
            // (?i) folds ASCII only, so accented capitals are listed explicitly
            legal_deposit: Regex::new(r"(?i)(?:d[éÉ]p[ôÔ]t l[éÉ]gal|legal deposit).*?\d{4}")?,
            page_number_line: Regex::new(r"(?m)^[ \t]*\d{1,3}[ \t]*$")?,
            stray_numbers: Regex::new(r"(?:[ \t]*\b\d{1,3}\b){2,}")?,
            bang_bullet: Regex::new(r"(?m)^[ \t]*![ \t]*")?,
            horizontal_space: Regex::new(r"[ \t]{2,}")?,
            blank_lines: Regex::new(r"\n(?:[ \t]*\n){2,}")?,
        })
    }

    /// Apply every cleanup step in order
    pub fn clean(&self, text: &str) -> String {
        let text = self.toc_leader.replace_all(text, "");
        let text = self.isbn.replace_all(&text, "");
        let text = self.legal_deposit.replace_all(&text, "");
        let text = self.page_number_line.replace_all(&text, "");
        let text = self.stray_numbers.replace_all(&text, " ");
        let text = self.bang_bullet.replace_all(&text, "• ");
        let text = self.horizontal_space.replace_all(&text, " ");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        text.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(text: &str) -> String {
        TextCleaner::new().unwrap().clean(text)
    }

    #[test]
    fn test_removes_page_numbers() {
        let cleaned = clean("Worry is common.\n  12 \nIt persists.");
        assert_eq!(cleaned, "Worry is common.\n\nIt persists.");
    }

    #[test]
    fn test_removes_stray_number_runs() {
        let cleaned = clean("Section 4 5 6 Overview");
        assert_eq!(cleaned, "Section Overview");
    }

    #[test]
    fn test_removes_toc_and_bibliography() {
        let text = "Contents\n1.1 Assessment ........ 14\nISBN 978-2-9816-0000-1\nDépôt légal 2017\nBody text.";
        let cleaned = clean(text);
        assert!(!cleaned.contains("Assessment"));
        assert!(!cleaned.contains("ISBN"));
        assert!(!cleaned.contains("2017"));
        assert!(cleaned.ends_with("Body text."));
    }

    #[test]
    fn test_removes_upper_case_legal_deposit() {
        let cleaned = clean("DÉPÔT LÉGAL 2017\nBody text.");
        assert_eq!(cleaned, "Body text.");
    }

    #[test]
    fn test_fixes_bang_bullets() {
        let cleaned = clean("Symptoms:\n! restlessness\n  !fatigue");
        assert_eq!(cleaned, "Symptoms:\n• restlessness\n• fatigue");
    }

    #[test]
    fn test_collapses_whitespace() {
        let cleaned = clean("a    b\n\n\n\n\nc");
        assert_eq!(cleaned, "a b\n\nc");
    }
}
