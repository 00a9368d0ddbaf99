//! Tag splitting
//!
//! A tag is a `.` delimited routing label such as `app.web.access`.
//! Its segments are addressable by forward index (`0` is the leftmost)
//! and by negative index (`-1` is the rightmost).

/// Delimiter between tag segments
pub const TAG_DELIMITER: char = '.';

/// Ordered segments of a single tag
///
/// Borrows from the tag it was split from and lives only as long as the
/// event being processed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagParts<'a> {
    parts: Vec<&'a str>,
}

impl<'a> TagParts<'a> {
    /// Split a tag strictly on `.`
    ///
    /// An empty tag yields a single empty segment, and consecutive
    /// delimiters yield empty segments in between.
    pub fn split(tag: &'a str) -> Self {
        Self {
            parts: tag.split(TAG_DELIMITER).collect(),
        }
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check if there are no segments
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Get a segment by signed index
    ///
    /// Non-negative indices count from the left, negative indices from the
    /// right (`-1` is the last segment). Out-of-range indices yield `None`.
    pub fn get(&self, index: i64) -> Option<&'a str> {
        let len = self.parts.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        if (0..len).contains(&resolved) {
            self.parts.get(resolved as usize).copied()
        } else {
            None
        }
    }

    /// Iterate over `(forward_index, negative_index, segment)` triples
    pub fn indexed(&self) -> impl Iterator<Item = (i64, i64, &'a str)> + '_ {
        let len = self.parts.len() as i64;
        self.parts
            .iter()
            .enumerate()
            .map(move |(i, part)| (i as i64, i as i64 - len, *part))
    }

    /// Iterate over the segments in order
    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.parts.iter().copied()
    }

    /// Segments as a slice
    pub fn as_slice(&self) -> &[&'a str] {
        &self.parts
    }
}

/// Split a tag into its segments
pub fn split_tag(tag: &str) -> TagParts<'_> {
    TagParts::split(tag)
}
