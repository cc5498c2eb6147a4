use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic pattern is empty")]
    Empty,
    #[error("multi-level wildcard '#' is not supported: {0}")]
    MultiLevelWildcard(String),
    #[error("wildcard must occupy a whole segment: {0}")]
    PartialWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

/// `/`-separated topic pattern where `+` matches exactly one segment.
///
/// Matching is exact on segment count; there is no multi-segment wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, TopicError> {
        if pattern.is_empty() {
            return Err(TopicError::Empty);
        }
        let mut segments = Vec::new();
        for seg in pattern.split('/') {
            if seg == "+" {
                segments.push(Segment::Any);
            } else if seg.contains('#') {
                return Err(TopicError::MultiLevelWildcard(pattern.to_string()));
            } else if seg.contains('+') {
                return Err(TopicError::PartialWildcard(pattern.to_string()));
            } else {
                segments.push(Segment::Literal(seg.to_string()));
            }
        }
        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Index of the last `+` segment; handlers take the identifier from it
    /// unless told otherwise.
    pub fn last_wildcard(&self) -> Option<usize> {
        self.segments.iter().rposition(|s| *s == Segment::Any)
    }

    /// Matches a concrete publish topic.
    ///
    /// Topics that are empty or carry wildcard characters are malformed and
    /// never match.
    pub fn matches<'t>(&self, topic: &'t str) -> Option<TopicMatch<'t>> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return None;
        }
        let parts: Vec<&'t str> = topic.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let all = self.segments.iter().zip(&parts).all(|(seg, part)| match seg {
            Segment::Any => true,
            Segment::Literal(lit) => lit == part,
        });
        all.then_some(TopicMatch { segments: parts })
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A topic that matched a pattern, split into its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMatch<'t> {
    segments: Vec<&'t str>,
}

impl<'t> TopicMatch<'t> {
    /// Segment at `index`, or `None` when absent or empty.
    pub fn segment(&self, index: usize) -> Option<&'t str> {
        self.segments
            .get(index)
            .copied()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
