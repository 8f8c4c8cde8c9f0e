//! Round-robin interleaving of per-pyramid job streams.

use std::collections::VecDeque;

/// Takes one item from each source in turn until all are exhausted.
///
/// Exhausted sources drop out of the rotation; the rest keep cycling in
/// their starting order.
pub struct RoundRobin<I> {
    sources: VecDeque<I>,
}

impl<I: Iterator> RoundRobin<I> {
    pub fn new(sources: impl IntoIterator<Item = I>) -> Self {
        Self { sources: sources.into_iter().collect() }
    }

    /// Sources that have not been exhausted yet.
    pub fn pending_sources(&self) -> usize {
        self.sources.len()
    }
}

impl<I: Iterator> Iterator for RoundRobin<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(mut source) = self.sources.pop_front() {
            if let Some(item) = source.next() {
                self.sources.push_back(source);
                return Some(item);
            }
        }
        None
    }
}
