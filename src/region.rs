use std::ops::{Index, Range};

/// Represents an area within source text.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Region {
    /// The beginning of the range, inclusive.
    pub begin: usize,
    /// The ending of the range, exclusive.
    pub end: usize,
}

impl Region {
    /// Create a new Region from the given range.
    pub fn new(position: Range<usize>) -> Self {
        Self {
            begin: position.start,
            end: position.end,
        }
    }

    /// Access the literal value of a [`Region`].
    ///
    /// # Panics
    ///
    /// Panics when the `Region` is out of bounds in the given source text,
    /// which indicates a defect in whatever produced the `Region`.
    pub fn literal<'source>(&self, source: &'source str) -> &'source str {
        source
            .get(self.begin..self.end)
            .expect("region should always be within source bounds")
    }
}

impl Index<Region> for str {
    type Output = str;

    fn index(&self, region: Region) -> &Self::Output {
        let Region { begin, end } = region;

        &self[begin..end]
    }
}

impl From<Range<usize>> for Region {
    fn from(value: Range<usize>) -> Self {
        Self {
            begin: value.start,
            end: value.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        let source = "Hello, World!";
        let region = Region::new(7..12);

        assert_eq!(region.literal(source), "World");
    }

    #[test]
    fn test_index() {
        let source = "@extends('layout')";

        assert_eq!(&source[Region::new(0..8)], "@extends");
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_literal() {
        let source = "Hello";
        let region = Region::new(2..9);

        region.literal(source);
    }
}
