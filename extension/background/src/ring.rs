use std::collections::VecDeque;

/// Fixed-capacity sequence that evicts its oldest entry on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
	items: VecDeque<T>,
	capacity: usize,
}

impl<T> RingBuffer<T> {
	pub fn new(capacity: usize) -> Self {
		Self {
			items: VecDeque::with_capacity(capacity.min(1024)),
			capacity,
		}
	}

	/// Appends `item`, evicting from the front until the cap holds.
	pub fn push(&mut self, item: T) {
		if self.capacity == 0 {
			return;
		}
		while self.items.len() >= self.capacity {
			self.items.pop_front();
		}
		self.items.push_back(item);
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Empties the buffer and returns how many entries were dropped.
	pub fn clear(&mut self) -> usize {
		let removed = self.items.len();
		self.items.clear();
		removed
	}

	/// Newest-first mutable search.
	pub fn find_latest_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
		self.items.iter_mut().rev().find(|item| pred(item))
	}
}

impl<T: Clone> RingBuffer<T> {
	/// Copies out the last `limit` entries (all when `None`), oldest first.
	pub fn snapshot(&self, limit: Option<usize>) -> Vec<T> {
		let skip = limit.map_or(0, |limit| self.items.len().saturating_sub(limit));
		self.items.iter().skip(skip).cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn overflow_keeps_last_n_in_order() {
		let mut ring = RingBuffer::new(5);
		for i in 0..8 {
			ring.push(i);
		}
		assert_eq!(ring.len(), 5);
		assert_eq!(ring.snapshot(None), vec![3, 4, 5, 6, 7]);
	}

	#[test]
	fn snapshot_limit_takes_newest() {
		let mut ring = RingBuffer::new(10);
		for i in 0..4 {
			ring.push(i);
		}
		assert_eq!(ring.snapshot(Some(2)), vec![2, 3]);
		assert_eq!(ring.snapshot(Some(99)), vec![0, 1, 2, 3]);
	}

	#[test]
	fn snapshot_is_detached_from_later_pushes() {
		let mut ring = RingBuffer::new(3);
		ring.push("a");
		let view = ring.snapshot(None);
		ring.push("b");
		ring.push("c");
		ring.push("d");
		assert_eq!(view, vec!["a"]);
	}

	#[test]
	fn clear_reports_removed() {
		let mut ring = RingBuffer::new(3);
		ring.push(1);
		ring.push(2);
		assert_eq!(ring.clear(), 2);
		assert!(ring.is_empty());
	}

	#[test]
	fn zero_capacity_stores_nothing() {
		let mut ring = RingBuffer::new(0);
		ring.push(1);
		assert!(ring.is_empty());
	}
}
