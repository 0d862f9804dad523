use std::collections::{HashSet, VecDeque};

/// Bounded set of recently seen keys. When full, the oldest key is
/// forgotten first.
#[derive(Debug)]
pub struct RecentEvents {
    capacity: usize,
    order:    VecDeque<String>,
    seen:     HashSet<String>,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `true` if the key was not seen recently.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.to_string());
        self.seen.insert(key.to_string());
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize { self.order.len() }
}
