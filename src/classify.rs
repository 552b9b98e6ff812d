use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use regex::{Regex, RegexBuilder};

use crate::error::MetricsError;

/// Decode percent-escaped segments of a request path so that `%2F` and `/`
/// classify identically. Falls back to the raw path when the decoded bytes
/// are not valid UTF-8; a malformed request must never fail classification.
pub fn decode_path(raw_path: &str) -> Cow<'_, str> {
    match percent_decode_str(raw_path).decode_utf8() {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(raw_path),
    }
}

/// Ordered set of case-insensitive exclusion patterns for request-level
/// metrics. Order is preserved from configuration and matching
/// short-circuits on the first hit.
#[derive(Clone, Debug)]
pub struct ExclusionRules {
    rules: Vec<Regex>,
}

impl ExclusionRules {
    /// Compile exclusion patterns, failing fast on the first invalid one.
    pub fn compile<I, S>(patterns: I) -> Result<Self, MetricsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| MetricsError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(ExclusionRules { rules })
    }

    pub fn is_excluded(&self, decoded_path: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(decoded_path))
    }
}

/// Ordered mapping of grouping patterns to bucket labels for
/// package-download metrics. First match wins, so a catch-all pattern placed
/// last folds default traffic into a named bucket.
#[derive(Clone, Debug)]
pub struct GroupRules {
    rules: Vec<(Regex, String)>,
}

impl GroupRules {
    /// Compile grouping rules in declaration order, failing fast on the
    /// first invalid pattern.
    pub fn compile<I, P, L>(rules: I) -> Result<Self, MetricsError>
    where
        I: IntoIterator<Item = (P, L)>,
        P: AsRef<str>,
        L: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(pattern, label)| {
                let pattern = pattern.as_ref();
                Regex::new(pattern)
                    .map(|regex| (regex, label.into()))
                    .map_err(|source| MetricsError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(GroupRules { rules })
    }

    /// Label of the first rule matching the decoded path, if any.
    pub fn classify(&self, decoded_path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(decoded_path))
            .map(|(_, label)| label.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_groups() -> GroupRules {
        GroupRules::compile([
            ("@scoped/test-package[^/]*9[.]1[.]x", "A"),
            ("@scoped/test-package", "B"),
            ("non-scoped", "C"),
            (".*", "D"),
        ])
        .unwrap()
    }

    #[test]
    fn decode_path_unescapes_scoped_packages() {
        assert_eq!(decode_path("/@scoped%2Ftest-package"), "/@scoped/test-package");
        assert_eq!(decode_path("/plain"), "/plain");
    }

    #[test]
    fn decode_path_falls_back_to_raw_on_invalid_escapes() {
        // %FF is not valid UTF-8 once decoded.
        assert_eq!(decode_path("/bad%FFpath"), "/bad%FFpath");
    }

    #[test]
    fn escaped_and_unescaped_paths_classify_identically() {
        let groups = sample_groups();
        let raw = decode_path("/@scoped%2Ftest-package");
        let plain = decode_path("/@scoped/test-package");
        assert_eq!(groups.classify(&raw), groups.classify(&plain));
        assert_eq!(groups.classify(&raw), Some("B"));
    }

    #[test]
    fn first_matching_group_wins_in_declaration_order() {
        let groups = sample_groups();
        assert_eq!(groups.classify("/@scoped/test-package"), Some("B"));
        assert_eq!(groups.classify("/@scoped/test-package-x9.1.x"), Some("A"));
        assert_eq!(groups.classify("/non-scoped-thing"), Some("C"));
        assert_eq!(groups.classify("/whatever"), Some("D"));
    }

    #[test]
    fn no_rules_classifies_nothing() {
        let groups = GroupRules::compile(Vec::<(&str, &str)>::new()).unwrap();
        assert!(groups.is_empty());
        assert_eq!(groups.classify("/anything"), None);
    }

    #[test]
    fn classification_is_pure() {
        let groups = sample_groups();
        for _ in 0..3 {
            assert_eq!(groups.classify("/whatever"), Some("D"));
        }
    }

    #[test]
    fn exclusions_match_case_insensitively_in_order() {
        let rules =
            ExclusionRules::compile(["^/$", "^/[-]/ping", "[.]ico$"]).unwrap();
        assert!(rules.is_excluded("/"));
        assert!(rules.is_excluded("/-/PING"));
        assert!(rules.is_excluded("/favicon.ICO"));
        assert!(!rules.is_excluded("/some-package"));
    }

    #[test]
    fn invalid_pattern_fails_compilation() {
        let err = ExclusionRules::compile(["*["]).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidPattern { .. }));
        let err = GroupRules::compile([("(unclosed", "X")]).unwrap_err();
        assert!(matches!(err, MetricsError::InvalidPattern { .. }));
    }
}
