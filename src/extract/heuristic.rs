//! Deciding whether a PDF carries real text or is just page scans.

/// The default minimum number of characters per page a digital PDF should
/// have.
pub const DEFAULT_MIN_CHARS_PER_PAGE: usize = 50;

/// What kind of text layer a PDF appears to have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextLayer {
    /// Enough embedded text to use as-is.
    Digital,
    /// Too little embedded text. The pages need OCR.
    Scanned,
}

/// Classify a PDF based on the text we found in its pages.
///
/// A document is scanned if its trimmed text has fewer than
/// `min_chars_per_page` characters per page on average. This is a coarse
/// guess, and will misclassify a mostly-blank digital document.
pub fn classify(text: &str, page_count: usize, min_chars_per_page: usize) -> TextLayer {
    let chars = text.trim().chars().count();
    if chars < min_chars_per_page.saturating_mul(page_count) {
        TextLayer::Scanned
    } else {
        TextLayer::Digital
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        let text = "x".repeat(49);
        assert_eq!(classify(&text, 1, 50), TextLayer::Scanned);
        let text = "x".repeat(50);
        assert_eq!(classify(&text, 1, 50), TextLayer::Digital);
    }

    #[test]
    fn threshold_scales_with_page_count() {
        let text = "x".repeat(120);
        assert_eq!(classify(&text, 2, 50), TextLayer::Digital);
        assert_eq!(classify(&text, 3, 50), TextLayer::Scanned);
    }

    #[test]
    fn surrounding_whitespace_does_not_count() {
        let text = format!("   {}   \n", "x".repeat(49));
        assert_eq!(classify(&text, 1, 50), TextLayer::Scanned);
    }

    #[test]
    fn characters_are_counted_not_bytes() {
        let text = "é".repeat(50);
        assert_eq!(classify(&text, 1, 50), TextLayer::Digital);
    }

    #[test]
    fn empty_documents_are_digital() {
        assert_eq!(classify("", 0, 50), TextLayer::Digital);
    }
}
