//! Exclusion rules applied to every entry below the scan root.
//!
//! Each rule is a regular expression tested against the root-relative,
//! `/`-separated path of a candidate entry. A rule matches when it matches
//! starting at position 0; it does not need to consume the whole path, so
//! `build` excludes `build`, `build/out.o` and also `buildscript.sh`.

use regex::RegexSet;

#[derive(Debug, thiserror::Error)]
pub enum ExcludeError {
    #[error("Invalid exclude pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExclusionMatcher {
    patterns: Vec<String>,
    set: RegexSet,
}

impl ExclusionMatcher {
    /// Compiles `patterns` into a matcher.
    ///
    /// Patterns are compiled one at a time first so that an error names the
    /// offending pattern rather than the combined set.
    pub fn new<I, S>(patterns: I) -> Result<Self, ExcludeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();

        let anchored: Vec<String> = patterns.iter().map(|p| format!("^(?:{p})")).collect();

        for (pattern, compiled) in patterns.iter().zip(&anchored) {
            if let Err(source) = regex::Regex::new(compiled) {
                return Err(ExcludeError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                });
            }
        }

        let set = RegexSet::new(&anchored).map_err(|source| ExcludeError::InvalidPattern {
            pattern: patterns.join(", "),
            source,
        })?;

        Ok(Self { patterns, set })
    }

    /// A matcher that excludes nothing.
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: RegexSet::empty(),
        }
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        self.set.is_match(relative_path)
    }

    /// The patterns as supplied, without the anchoring added for matching.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matcher_excludes_nothing() {
        let matcher = ExclusionMatcher::empty();

        assert!(!matcher.matches("anything"));
        assert!(!matcher.matches(""));
    }

    #[test]
    fn test_match_is_anchored_at_start() {
        let matcher = ExclusionMatcher::new(["cache"]).unwrap();

        assert!(matcher.matches("cache"));
        assert!(matcher.matches("cache/entry.bin"));
        assert!(!matcher.matches("sub/cache"));
    }

    #[test]
    fn test_match_is_a_prefix_match_not_a_full_match() {
        let matcher = ExclusionMatcher::new(["build"]).unwrap();

        assert!(matcher.matches("buildscript.sh"));
    }

    #[test]
    fn test_any_pattern_may_match() {
        let matcher = ExclusionMatcher::new([r".*\.tmp$", r"target/"]).unwrap();

        assert!(matcher.matches("a/b/c.tmp"));
        assert!(matcher.matches("target/debug"));
        assert!(!matcher.matches("target"));
        assert!(!matcher.matches("src/main.rs"));
    }

    #[test]
    fn test_alternation_stays_anchored() {
        // Without the non-capturing group the second branch would float.
        let matcher = ExclusionMatcher::new(["a|b"]).unwrap();

        assert!(matcher.matches("b/file"));
        assert!(!matcher.matches("x/b"));
    }

    #[test]
    fn test_invalid_pattern_is_named_in_error() {
        let result = ExclusionMatcher::new(["ok", "(unclosed"]);

        match result {
            Err(ExcludeError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            _ => panic!("Expected InvalidPattern error"),
        }
    }

    #[test]
    fn test_patterns_are_kept_verbatim() {
        let matcher = ExclusionMatcher::new(["x", "y/z"]).unwrap();

        assert_eq!(matcher.patterns(), &["x".to_string(), "y/z".to_string()]);
    }
}
