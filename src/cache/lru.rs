//! LRU Recency Module
//!
//! Tracks access order for LRU eviction in O(1) per operation.
//!
//! Keys live in a doubly linked list laid out over a slab of reusable slots.
//! The cache stores each entry's slot index, so touching, removing, and
//! evicting never scan the list: they follow at most two links.
//! Front = most recently used, back = least recently used.

/// Sentinel index meaning "no neighbor".
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K> {
    key: K,
    prev: usize,
    next: usize,
}

// == Recency List ==
/// Intrusive access-order list backing LRU eviction.
#[derive(Debug)]
pub struct RecencyList<K> {
    /// Slab of nodes; `None` marks a free slot
    slots: Vec<Option<Node<K>>>,
    /// Indices of free slots available for reuse
    free: Vec<usize>,
    /// Most recently used slot, or NIL when empty
    head: usize,
    /// Least recently used slot, or NIL when empty
    tail: usize,
    /// Number of live nodes
    len: usize,
}

impl<K> Default for RecencyList<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> RecencyList<K> {
    // == Constructor ==
    /// Creates a new empty recency list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    // == Insert ==
    /// Adds a new key at the front (most recent) and returns its slot index.
    ///
    /// The returned index stays valid until the key is removed through
    /// [`remove`](Self::remove) or [`pop_oldest`](Self::pop_oldest).
    pub fn insert(&mut self, key: K) -> usize {
        let node = Node {
            key,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.link_front(idx);
        self.len += 1;
        idx
    }

    // == Touch ==
    /// Marks the slot as most recently used (moves it to the front).
    pub fn touch(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    // == Remove ==
    /// Removes the slot and returns its key. Returns `None` for a free slot.
    pub fn remove(&mut self, idx: usize) -> Option<K> {
        self.slots.get(idx)?.as_ref()?;
        self.unlink(idx);
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        self.len -= 1;
        Some(node.key)
    }

    // == Pop Oldest ==
    /// Removes and returns the least recently used key.
    pub fn pop_oldest(&mut self) -> Option<K> {
        if self.tail == NIL {
            return None;
        }
        self.remove(self.tail)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&K> {
        if self.tail == NIL {
            return None;
        }
        self.slots[self.tail].as_ref().map(|node| &node.key)
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // == Internal Links ==
    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.slots[idx].as_mut().expect("occupied recency slot");
            node.prev = NIL;
            node.next = old_head;
        }
        if old_head != NIL {
            if let Some(node) = self.slots[old_head].as_mut() {
                node.prev = idx;
            }
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.slots[idx].as_ref().expect("occupied recency slot");
            (node.prev, node.next)
        };
        if prev != NIL {
            if let Some(node) = self.slots[prev].as_mut() {
                node.next = next;
            }
        } else {
            self.head = next;
        }
        if next != NIL {
            if let Some(node) = self.slots[next].as_mut() {
                node.prev = prev;
            }
        } else {
            self.tail = prev;
        }
    }
}
