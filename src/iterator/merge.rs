//! Merge Iterator
//!
//! Binary merge tree over sorted sources:
//! ```text
//!                    Pair
//!                  /      \
//!              Pair        Pair
//!             /    \      /    \
//!          s0      s1   s2      s3      (s0 oldest, s3 newest)
//! ```
//! Every pair compares the heads of its two children; on equal keys the
//! newer child's entry is returned and both children advance.

use std::cmp::Ordering;
use std::iter::Peekable;

use crate::entry::{compare_keys, Entry};

/// A boxed sorted source of entries
pub type EntryIter = Box<dyn Iterator<Item = Entry> + Send>;

/// Merges ascending sources into one ascending, duplicate-free sequence
///
/// Tombstones are kept; wrap the result in [`TombstoneFilter`] to hide them.
pub struct MergeIterator {
    node: Node,
}

enum Node {
    Empty,
    Leaf(EntryIter),
    Pair {
        older: Peekable<Box<MergeIterator>>,
        newer: Peekable<Box<MergeIterator>>,
    },
}

impl MergeIterator {
    /// Build the merge tree. `sources` must be ordered oldest → newest and
    /// each must be strictly ascending by key.
    pub fn new(mut sources: Vec<EntryIter>) -> Self {
        let node = match sources.len() {
            0 => Node::Empty,
            1 => match sources.pop() {
                Some(source) => Node::Leaf(source),
                None => Node::Empty,
            },
            len => {
                let newer = sources.split_off(len / 2);
                Node::Pair {
                    older: Box::new(Self::new(sources)).peekable(),
                    newer: Box::new(Self::new(newer)).peekable(),
                }
            }
        };
        Self { node }
    }
}

impl Iterator for MergeIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.node {
            Node::Empty => None,
            Node::Leaf(source) => source.next(),
            Node::Pair { older, newer } => {
                let order = match (older.peek(), newer.peek()) {
                    (None, None) => return None,
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(o), Some(n)) => compare_keys(o.key(), n.key()),
                };

                match order {
                    Ordering::Less => older.next(),
                    Ordering::Greater => newer.next(),
                    Ordering::Equal => {
                        // Shadowed by the newer source
                        older.next();
                        newer.next()
                    }
                }
            }
        }
    }
}

/// Drops tombstones from an entry sequence
pub struct TombstoneFilter<I> {
    inner: I,
}

impl<I> TombstoneFilter<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> Iterator for TombstoneFilter<I>
where
    I: Iterator<Item = Entry>,
{
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find(|entry| !entry.is_tombstone())
    }
}
