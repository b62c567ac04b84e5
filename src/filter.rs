//! Subscription filters: normalization and evaluation
//!
//! A filter restricts which headers reach a handler. Criteria are normalized
//! at build time, so invalid input surfaces [`FilterError`] at subscribe
//! time, never at dispatch time.
//!
//! Combination semantics: `from` always ANDs with the rest; `to` and
//! `broadcast` OR with each other when both are present, so one subscription
//! can ask for "broadcasts or messages directed at me".

use std::fmt;

use regex::Regex;

use crate::error::FilterError;
use crate::header::Header;

/// One normalized matcher inside a criterion list.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact, case-sensitive string equality.
    Exact(String),
    /// Compiled pattern match.
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == candidate,
            Self::Pattern(re) => re.is_match(candidate),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(value) => write!(f, "{value}"),
            Self::Pattern(re) => write!(f, "/{re}/"),
        }
    }
}

/// Unnormalized matcher input accepted by [`FilterBuilder`].
#[derive(Debug, Clone)]
pub enum MatcherSpec {
    /// Exact string.
    Exact(String),
    /// Pattern source to be compiled during normalization.
    Pattern(String),
    /// Pre-compiled pattern.
    Regex(Regex),
}

impl From<&str> for MatcherSpec {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for MatcherSpec {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for MatcherSpec {
    fn from(value: Regex) -> Self {
        Self::Regex(value)
    }
}

/// Normalized, immutable subscription criteria.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    from: Option<Vec<Matcher>>,
    to: Option<Vec<Matcher>>,
    broadcast: bool,
}

impl Filter {
    /// A filter with no criteria; matches every header.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts building a filter.
    #[must_use]
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// Whether no criteria are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none() && !self.broadcast
    }

    /// Evaluates the criteria against a header.
    #[must_use]
    pub fn matches(&self, header: &Header) -> bool {
        if self.is_empty() {
            return true;
        }

        if let Some(from) = &self.from {
            let sender_matches = header
                .from
                .as_deref()
                .is_some_and(|f| from.iter().any(|m| m.matches(f)));
            if !sender_matches {
                return false;
            }
        }

        // A `to` criterion alone fails for broadcast headers.
        let to_result = self.to.as_ref().map(|matchers| {
            header
                .to
                .as_deref()
                .is_some_and(|t| matchers.iter().any(|m| m.matches(t)))
        });
        let broadcast_result = self.broadcast.then(|| header.to.is_none());

        match (to_result, broadcast_result) {
            (None, None) => true,
            (Some(to), None) => to,
            (None, Some(broadcast)) => broadcast,
            (Some(to), Some(broadcast)) => to || broadcast,
        }
    }
}

/// Accumulates raw criteria and normalizes them into a [`Filter`].
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    from: Option<Vec<MatcherSpec>>,
    to: Option<Vec<MatcherSpec>>,
    broadcast: Option<bool>,
}

impl FilterBuilder {
    /// Adds one sender matcher (exact string or pre-compiled pattern).
    #[must_use]
    pub fn from(mut self, matcher: impl Into<MatcherSpec>) -> Self {
        self.from.get_or_insert_with(Vec::new).push(matcher.into());
        self
    }

    /// Adds a sender pattern compiled during normalization.
    #[must_use]
    pub fn from_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.from
            .get_or_insert_with(Vec::new)
            .push(MatcherSpec::Pattern(pattern.into()));
        self
    }

    /// Adds a list of sender matchers; marks the criterion present even when
    /// the list is empty, which normalization rejects.
    #[must_use]
    pub fn from_any(mut self, matchers: impl IntoIterator<Item = MatcherSpec>) -> Self {
        self.from.get_or_insert_with(Vec::new).extend(matchers);
        self
    }

    /// Adds one recipient matcher.
    #[must_use]
    pub fn to(mut self, matcher: impl Into<MatcherSpec>) -> Self {
        self.to.get_or_insert_with(Vec::new).push(matcher.into());
        self
    }

    /// Adds a recipient pattern compiled during normalization.
    #[must_use]
    pub fn to_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.to
            .get_or_insert_with(Vec::new)
            .push(MatcherSpec::Pattern(pattern.into()));
        self
    }

    /// Adds a list of recipient matchers; an empty list is rejected.
    #[must_use]
    pub fn to_any(mut self, matchers: impl IntoIterator<Item = MatcherSpec>) -> Self {
        self.to.get_or_insert_with(Vec::new).extend(matchers);
        self
    }

    /// Requests broadcast messages. `false` normalizes to "criterion absent".
    #[must_use]
    pub fn broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// Normalizes the accumulated criteria.
    ///
    /// # Errors
    ///
    /// `InvalidFilter` for empty strings or empty criterion lists,
    /// `InvalidPattern` for pattern sources that fail to compile.
    pub fn build(self) -> Result<Filter, FilterError> {
        let from = self
            .from
            .map(|specs| normalize(specs, "from"))
            .transpose()?;
        let to = self.to.map(|specs| normalize(specs, "to")).transpose()?;

        Ok(Filter {
            from,
            to,
            broadcast: self.broadcast.unwrap_or(false),
        })
    }
}

fn normalize(
    specs: Vec<MatcherSpec>,
    criterion: &'static str,
) -> Result<Vec<Matcher>, FilterError> {
    if specs.is_empty() {
        return Err(FilterError::InvalidFilter {
            criterion,
            reason: "criterion list is empty".to_string(),
        });
    }

    specs
        .into_iter()
        .map(|spec| match spec {
            MatcherSpec::Exact(value) => {
                if value.is_empty() {
                    Err(FilterError::InvalidFilter {
                        criterion,
                        reason: "empty string matcher".to_string(),
                    })
                } else {
                    Ok(Matcher::Exact(value))
                }
            }
            MatcherSpec::Pattern(source) => Regex::new(&source)
                .map(Matcher::Pattern)
                .map_err(|source| FilterError::InvalidPattern {
                    criterion,
                    source: Box::new(source),
                }),
            MatcherSpec::Regex(re) => Ok(Matcher::Pattern(re)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(from: &str, to: Option<&str>) -> Header {
        let mut h = Header::new("Alert", 1);
        h.from = Some(from.to_string());
        h.to = to.map(str::to_string);
        h
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::empty();
        assert!(filter.matches(&header("any", None)));
        assert!(filter.matches(&header("any", Some("ops"))));
    }

    #[test]
    fn from_exact_and_pattern() {
        let filter = Filter::builder().from("mon").build().unwrap();
        assert!(filter.matches(&header("mon", None)));
        assert!(!filter.matches(&header("other", None)));

        let filter = Filter::builder().from_pattern("^payment-").build().unwrap();
        assert!(filter.matches(&header("payment-gw", None)));
        assert!(filter.matches(&header("payment-processor", None)));
        assert!(!filter.matches(&header("user-svc", None)));
    }

    #[test]
    fn from_list_matches_any_element() {
        let filter = Filter::builder()
            .from("mon")
            .from("audit")
            .build()
            .unwrap();
        assert!(filter.matches(&header("audit", None)));
        assert!(!filter.matches(&header("ops", None)));
    }

    #[test]
    fn to_fails_alone_on_broadcast_headers() {
        let filter = Filter::builder().to("ops").build().unwrap();
        assert!(filter.matches(&header("mon", Some("ops"))));
        assert!(!filter.matches(&header("mon", Some("other"))));
        assert!(!filter.matches(&header("mon", None)));
    }

    #[test]
    fn broadcast_matches_only_null_recipient() {
        let filter = Filter::builder().broadcast(true).build().unwrap();
        assert!(filter.matches(&header("mon", None)));
        assert!(!filter.matches(&header("mon", Some("ops"))));
    }

    #[test]
    fn broadcast_false_is_criterion_absent() {
        let filter = Filter::builder().broadcast(false).build().unwrap();
        assert!(filter.is_empty());
        assert!(filter.matches(&header("mon", Some("ops"))));
    }

    #[test]
    fn to_or_broadcast_combination() {
        let filter = Filter::builder()
            .broadcast(true)
            .to("ops")
            .build()
            .unwrap();
        assert!(filter.matches(&header("mon", None)));
        assert!(filter.matches(&header("mon", Some("ops"))));
        assert!(!filter.matches(&header("mon", Some("other"))));
    }

    #[test]
    fn from_always_ands_with_the_rest() {
        let filter = Filter::builder()
            .from("mon")
            .to("ops")
            .build()
            .unwrap();
        assert!(filter.matches(&header("mon", Some("ops"))));
        assert!(!filter.matches(&header("mon", Some("other"))));
        assert!(!filter.matches(&header("intruder", Some("ops"))));

        let filter = Filter::builder()
            .from("mon")
            .broadcast(true)
            .build()
            .unwrap();
        assert!(filter.matches(&header("mon", None)));
        assert!(!filter.matches(&header("mon", Some("ops"))));
        assert!(!filter.matches(&header("intruder", None)));
    }

    #[test]
    fn from_and_to_or_broadcast() {
        let filter = Filter::builder()
            .from("mon")
            .to("ops")
            .broadcast(true)
            .build()
            .unwrap();
        assert!(filter.matches(&header("mon", None)));
        assert!(filter.matches(&header("mon", Some("ops"))));
        assert!(!filter.matches(&header("mon", Some("other"))));
        assert!(!filter.matches(&header("intruder", None)));
    }

    #[test]
    fn normalization_rejects_invalid_input() {
        assert!(matches!(
            Filter::builder().from("").build(),
            Err(FilterError::InvalidFilter { criterion: "from", .. })
        ));
        assert!(matches!(
            Filter::builder().to_any(Vec::new()).build(),
            Err(FilterError::InvalidFilter { criterion: "to", .. })
        ));
        assert!(matches!(
            Filter::builder().from_pattern("[unclosed").build(),
            Err(FilterError::InvalidPattern { criterion: "from", .. })
        ));
    }
}
