//! Hierarchical topic patterns (`book.*`, `order.#`, `stock.updated`).
//!
//! Topics are dot-separated words. In a pattern, `*` matches exactly one word
//! and `#` matches zero or more words, the same rules a topic exchange uses.

use core::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicPatternError {
    #[error("topic pattern cannot be empty")]
    Empty,

    #[error("topic pattern '{0}' contains an empty segment")]
    EmptySegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    AnyOne,
    AnyMany,
}

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, TopicPatternError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(TopicPatternError::Empty);
        }

        let segments = pattern
            .split('.')
            .map(|s| match s {
                "" => Err(TopicPatternError::EmptySegment(pattern.to_string())),
                "*" => Ok(Segment::AnyOne),
                "#" => Ok(Segment::AnyMany),
                word => Ok(Segment::Word(word.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Glob form understood by Redis `PSUBSCRIBE`.
    ///
    /// `#` becomes `*` and swallows its neighbouring dot, so `order.#` turns
    /// into `order*` and still covers the bare `order` topic. The glob is wider
    /// than the pattern; subscribers re-check with [`TopicPattern::matches`].
    pub fn to_glob(&self) -> String {
        let mut glob = String::with_capacity(self.raw.len());
        for (i, segment) in self.segments.iter().enumerate() {
            let after_many = i > 0 && self.segments[i - 1] == Segment::AnyMany;
            if i > 0 && !after_many && *segment != Segment::AnyMany {
                glob.push('.');
            }
            match segment {
                Segment::Word(word) => {
                    for c in word.chars() {
                        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                            glob.push('\\');
                        }
                        glob.push(c);
                    }
                }
                Segment::AnyOne | Segment::AnyMany => glob.push('*'),
            }
        }
        glob
    }

    pub fn matches(&self, topic: &str) -> bool {
        let words: Vec<&str> = topic.split('.').collect();
        match_segments(&self.segments, &words)
    }
}

fn match_segments(segments: &[Segment], words: &[&str]) -> bool {
    match segments.split_first() {
        None => words.is_empty(),
        Some((Segment::AnyMany, rest)) => {
            (0..=words.len()).any(|skip| match_segments(rest, &words[skip..]))
        }
        Some((Segment::AnyOne, rest)) => !words.is_empty() && match_segments(rest, &words[1..]),
        Some((Segment::Word(w), rest)) => {
            words.first().is_some_and(|first| first == w) && match_segments(rest, &words[1..])
        }
    }
}

impl FromStr for TopicPattern {
    type Err = TopicPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl core::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}
