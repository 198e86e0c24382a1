//! Bounded round-robin iteration.

/// Cycles over a slice with wraparound, yielding at most `limit` items.
///
/// Each item is paired with its attempt index; the item chosen for attempt
/// `i` is `items[i % items.len()]`. Every item is revisited before the limit
/// is reached as long as `limit >= items.len()`.
#[derive(Debug, Clone)]
pub struct BoundedRoundRobin<'a, T> {
    items: &'a [T],
    next: usize,
    limit: usize,
}

impl<'a, T> BoundedRoundRobin<'a, T> {
    pub fn new(items: &'a [T], limit: usize) -> Self {
        Self {
            items,
            next: 0,
            limit,
        }
    }

    /// Number of items yielded so far.
    pub fn attempts_made(&self) -> usize {
        self.next
    }

    fn remaining(&self) -> usize {
        if self.items.is_empty() {
            0
        } else {
            self.limit.saturating_sub(self.next)
        }
    }
}

impl<'a, T> Iterator for BoundedRoundRobin<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining() == 0 {
            return None;
        }
        let attempt = self.next;
        self.next += 1;
        Some((attempt, &self.items[attempt % self.items.len()]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for BoundedRoundRobin<'_, T> {}
