use std::fmt::Display;

use itertools::Itertools;
use serde::Serialize;

/// The `@SQ` table of an alignment file: reference names and lengths in
/// file order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReferenceHeader {
    names:   Vec<String>,
    lengths: Vec<usize>,
}

impl ReferenceHeader {
    pub fn new<S: Into<String>, I: IntoIterator<Item = (S, usize)>>(entries: I) -> Self {
        let (names, lengths) = entries
            .into_iter()
            .map(|(name, len)| (name.into(), len))
            .unzip();
        Self { names, lengths }
    }

    /// Number of reference sequences.
    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(
        &self,
        idx: usize,
    ) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    pub fn length(
        &self,
        idx: usize,
    ) -> Option<usize> {
        self.lengths.get(idx).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.lengths.iter().copied())
    }

    /// Describes the first difference with `other`, if any.
    pub fn difference(
        &self,
        other: &ReferenceHeader,
    ) -> Option<HeaderDifference> {
        if self.count() != other.count() {
            return Some(HeaderDifference::Count(self.count(), other.count()));
        }
        self.iter()
            .zip(other.iter())
            .enumerate()
            .find_map(|(idx, ((n1, l1), (n2, l2)))| {
                if n1 != n2 {
                    Some(HeaderDifference::Name {
                        idx,
                        left: n1.to_string(),
                        right: n2.to_string(),
                    })
                }
                else if l1 != l2 {
                    Some(HeaderDifference::Length {
                        idx,
                        left: l1,
                        right: l2,
                    })
                }
                else {
                    None
                }
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderDifference {
    Count(usize, usize),
    Name {
        idx:   usize,
        left:  String,
        right: String,
    },
    Length {
        idx:   usize,
        left:  usize,
        right: usize,
    },
}

impl Display for HeaderDifference {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            HeaderDifference::Count(l, r) => {
                write!(f, "{} vs {} reference sequences", l, r)
            },
            HeaderDifference::Name { idx, left, right } => {
                write!(f, "reference {} is named {} vs {}", idx, left, right)
            },
            HeaderDifference::Length { idx, left, right } => {
                write!(f, "reference {} has length {} vs {}", idx, left, right)
            },
        }
    }
}

/// True when every header describes the same reference sequences. An empty
/// or single-element slice is trivially consistent.
pub fn headers_are_consistent(headers: &[ReferenceHeader]) -> bool {
    headers.iter().all_equal()
}

/// First difference between the first header and any other.
pub fn first_header_difference(headers: &[ReferenceHeader]) -> Option<HeaderDifference> {
    let (first, rest) = headers.split_first()?;
    rest.iter().find_map(|h| first.difference(h))
}
