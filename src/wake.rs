//! Wake-phrase matching
//!
//! The gate opens on a two-part rule: the normalized transcript must begin
//! with a fixed greeting prefix and contain an identity marker anywhere
//! after it. The split tolerates trailing transcription noise while still
//! anchoring on the greeting.

/// Default greeting the transcript must start with
pub const WAKE_PREFIX: &str = "hello agent";

/// Default identity marker the transcript must contain
pub const WAKE_MARKER: &str = "this is manwa";

/// Tests transcripts against the wake-phrase grammar
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    prefix: String,
    marker: String,
}

impl PhraseMatcher {
    /// Create a matcher with a custom prefix and marker
    ///
    /// Both are normalized the same way transcripts are.
    #[must_use]
    pub fn new(prefix: &str, marker: &str) -> Self {
        Self {
            prefix: Self::normalize(prefix),
            marker: Self::normalize(marker),
        }
    }

    /// Strip punctuation, lowercase, and collapse whitespace
    #[must_use]
    pub fn normalize(text: &str) -> String {
        let stripped: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Whether the transcript satisfies the wake-phrase grammar
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        let normalized = Self::normalize(transcript);
        normalized.starts_with(&self.prefix) && normalized.contains(&self.marker)
    }

    /// The normalized greeting prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The normalized identity marker
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Default for PhraseMatcher {
    fn default() -> Self {
        Self::new(WAKE_PREFIX, WAKE_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(
            PhraseMatcher::normalize("  HELLO, Agent!  this... is MANWA  "),
            "hello agent this is manwa"
        );
    }

    #[test]
    fn test_full_phrase_matches() {
        let matcher = PhraseMatcher::default();
        assert!(matcher.matches("hello agent, this is manwa"));
        assert!(matcher.matches("HELLO AGENT, this IS manwa, unlock"));
    }

    #[test]
    fn test_prefix_alone_is_rejected() {
        let matcher = PhraseMatcher::default();
        assert!(!matcher.matches("hello agent"));
    }

    #[test]
    fn test_marker_before_prefix_is_rejected() {
        let matcher = PhraseMatcher::default();
        assert!(!matcher.matches("this is manwa, hello agent"));
    }

    #[test]
    fn test_empty_transcript_is_rejected() {
        let matcher = PhraseMatcher::default();
        assert!(!matcher.matches(""));
        assert!(!matcher.matches("   "));
    }

    #[test]
    fn test_custom_phrase() {
        let matcher = PhraseMatcher::new("Hey Nova,", "It's Me.");
        assert!(matcher.matches("hey nova it s me open up"));
        assert!(!matcher.matches("it s me hey nova"));
    }
}
