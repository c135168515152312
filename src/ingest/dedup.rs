use std::collections::{HashSet, VecDeque};
use std::sync::RwLock;

/// Bounded, insertion-ordered set of recent content hashes.
///
/// `add` is idempotent; once the window holds `capacity` hashes, adding a new
/// one evicts the oldest by first insertion. Lookups take a shared lock,
/// mutation an exclusive one.
pub struct DedupWindow {
    inner: RwLock<Inner>,
}

struct Inner {
    hashes: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                hashes: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.hashes.contains(hash)
    }

    pub fn add(&self, hash: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if !inner.hashes.insert(hash.to_string()) {
            return;
        }
        inner.order.push_back(hash.to_string());

        if inner.order.len() > inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.hashes.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
